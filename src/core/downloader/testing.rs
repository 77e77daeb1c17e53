use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::client::Transport;
use super::error::FetchError;

pub(crate) enum MockResponse {
    Body(Vec<u8>),
    NotFound,
    Fail(&'static str),
}

/// Scripted transport: queued responses first, then `payload` forever.
pub(crate) struct MockTransport {
    payload: Vec<u8>,
    responses: Mutex<VecDeque<MockResponse>>,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            responses: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn then(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self.responses.lock().unwrap().pop_front();
        let result = match response.unwrap_or_else(|| MockResponse::Body(self.payload.clone())) {
            MockResponse::Body(body) => tokio::fs::write(dest, &body)
                .await
                .map(|_| body.len() as u64)
                .map_err(|e| FetchError::io(dest, e)),
            MockResponse::NotFound => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            MockResponse::Fail(message) => Err(FetchError::Transfer {
                url: url.to_string(),
                message: message.to_string(),
            }),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Canned reply for one request path: `(path, status, body)`.
pub(crate) type CannedRoute = (&'static str, u16, &'static [u8]);

/// Serve `routes` over plain HTTP/1.1 on an ephemeral local port and return
/// the base URL. Unknown paths get an empty 404.
pub(crate) async fn serve_canned(routes: Vec<CannedRoute>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/");
                let (status, body) = routes
                    .iter()
                    .find(|(route, ..)| *route == path)
                    .map(|&(_, status, body)| (status, body))
                    .unwrap_or((404, &b""[..]));

                let reply = format!(
                    "HTTP/1.1 {status} Canned\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Client for [`serve_canned`]; skips any proxy configured in the environment.
pub(crate) fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
