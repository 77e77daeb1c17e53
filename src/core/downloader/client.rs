use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::FetchError;

/// Moves the bytes behind a URL into a local file.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write the resource to `dest`, returning the number of bytes written.
    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// Streaming HTTP transport over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let transfer_error = |e: reqwest::Error| FetchError::Transfer {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transfer_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Scope the handle so it is closed before the caller renames the file.
        let written = {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| FetchError::io(dest, e))?;
            let mut body = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(transfer_error)?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| FetchError::io(dest, e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| FetchError::io(dest, e))?;
            written
        };

        debug!("Transferred {} bytes: {} -> {:?}", written, url, dest);
        Ok(written)
    }
}

/// Host component used to key per-host limits; non-URLs share one bucket.
pub fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "local".to_string())
}
