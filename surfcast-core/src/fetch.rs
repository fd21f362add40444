use async_trait::async_trait;
use reqwest::Client;
use std::{fmt::Debug, time::Duration};
use tracing::debug;

use crate::error::FetchError;

/// Retrieves raw model output. One call is one outbound request; nothing is
/// cached and nothing is retried.
#[async_trait]
pub trait RawFetcher: Send + Sync + Debug {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

#[async_trait]
impl RawFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|cause| FetchError::Transport {
                url: url.to_string(),
                cause,
            })?;

        let status = res.status();
        let body = res.bytes().await.map_err(|cause| FetchError::Transport {
            url: url.to_string(),
            cause,
        })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_body(&String::from_utf8_lossy(&body)),
            });
        }

        Ok(body.to_vec())
    }
}

/// Run one fetch under a hard wall-clock deadline covering the request and
/// the body download. The in-flight request is dropped when it expires.
pub async fn fetch_bounded(
    fetcher: &dyn RawFetcher,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let timed_out = || FetchError::Timeout {
        url: url.to_string(),
        timeout,
    };

    if timeout.is_zero() {
        return Err(timed_out());
    }

    let body = tokio::time::timeout(timeout, fetcher.fetch(url))
        .await
        .map_err(|_| timed_out())??;

    debug!(url, bytes = body.len(), "fetched raw model data");
    Ok(body)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
