pub mod algorithm;
pub mod cache;

pub use algorithm::{git_object_id, IntegrityAlgorithm};
pub use cache::{ChecksumCache, HashCacheEntry};
