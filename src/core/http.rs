use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

use crate::core::config::CoreConfig;

/// Shared client for manifest requests and artifact transfers.
///
/// Compression is disabled so downloaded bytes are exactly what the
/// published checksums were computed over.
pub fn build_http_client(config: &CoreConfig) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(default_headers)
        .timeout(config.request_timeout())
        .build()
}
