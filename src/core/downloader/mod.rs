pub mod client;
pub mod error;
pub mod manager;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{host_of, HttpTransport, Transport};
pub use error::FetchError;
pub use manager::{
    DownloadManager, DownloadStatsSnapshot, FetchHandle, FetchOutcome, FetchRequest,
    LocalFileInfo,
};
