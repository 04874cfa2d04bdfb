//! Fetches listings and data files from the remote server with a small retry budget.

use std::{net::SocketAddr, time::Duration};

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Url};
use tracing::warn;

use crate::error::{Error, Result};

/// Retries beyond the first attempt.
pub const RETRIES: usize = 3;
/// Failures are mostly dropped TLS connections, so a short pause is enough.
pub const RETRY_DELAY: Duration = Duration::from_millis(10);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Anything that can turn a URL into a response body.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// The address a source's host was resolved to for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub addr: SocketAddr,
}

/// Resolves the host of `base_url` once, so a whole cycle talks to the same address.
pub async fn resolve_endpoint(base_url: &str) -> Result<Endpoint> {
    let resolution_error = |host: &str, message: String| Error::Resolution {
        host: host.to_string(),
        message,
    };

    let url = Url::parse(base_url).map_err(|e| resolution_error(base_url, e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| resolution_error(base_url, "URL has no host".to_string()))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(443);

    let addr = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| resolution_error(&host, e.to_string()))?
        .next()
        .ok_or_else(|| resolution_error(&host, "no addresses returned".to_string()))?;

    Ok(Endpoint { host, addr })
}

/// HTTP GET with a fixed retry budget.
///
/// Certificate validation is switched off on purpose: the open-data server presents a
/// certificate chain we do not validate, and requests are pinned to an IP address for
/// the cycle anyway. Only public data is fetched and nothing is ever sent.
pub struct HttpFetcher {
    client: Client,
    retries: usize,
    delay: Duration,
}

impl HttpFetcher {
    pub fn new(endpoint: Option<&Endpoint>) -> Result<Self> {
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

        if let Some(endpoint) = endpoint {
            builder = builder.resolve(&endpoint.host, endpoint.addr);
        }

        let client = builder.build().map_err(|e| Error::Resolution {
            host: endpoint.map(|e| e.host.clone()).unwrap_or_default(),
            message: e.to_string(),
        })?;

        Ok(HttpFetcher {
            client,
            retries: RETRIES,
            delay: RETRY_DELAY,
        })
    }

    async fn fetch_once(&self, url: &str) -> reqwest::Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempts > self.retries => {
                    return Err(Error::Download {
                        url: url.to_string(),
                        attempts,
                        message: e.to_string(),
                    })
                }
                Err(e) => {
                    warn!(url, attempt = attempts, error = %e, "request failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        self.fetch_with_retry(url).boxed()
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory stand-in for the remote server.

    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use super::*;

    #[derive(Default)]
    pub struct FakeFetcher {
        pages: HashMap<String, Vec<u8>>,
        failures: Mutex<HashMap<String, usize>>,
        hits: Mutex<HashMap<String, usize>>,
        requests: AtomicUsize,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        /// Lets the next `times` requests for `url` fail before its page is served.
        pub fn failing(self, url: &str, times: usize) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(url.to_string(), times);
            self
        }

        pub fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }

        pub fn requests_to(&self, url: &str) -> usize {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    impl Fetch for FakeFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;

            let failing = match self.failures.lock().unwrap().get_mut(url) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            };

            let result = if failing {
                Err(Error::Download {
                    url: url.to_string(),
                    attempts: RETRIES + 1,
                    message: "503 Service Unavailable".to_string(),
                })
            } else {
                self.pages.get(url).cloned().ok_or_else(|| Error::Download {
                    url: url.to_string(),
                    attempts: RETRIES + 1,
                    message: "404 Not Found".to_string(),
                })
            };
            async move { result }.boxed()
        }
    }
}

// -- Tests -------------------------------------------------------------------
