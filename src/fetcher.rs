use std::time::{Duration, Instant};

use log::{debug, info};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: Url, timeout: Duration },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: Url, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

/// Anything that can hand the monitor a fresh copy of the listing page.
pub(crate) trait PageSource {
    async fn fetch(&self) -> Result<String, FetchError>;
}

pub struct Fetcher {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(url: Url) -> Result<Self, reqwest::Error> {
        Self::with_timeout(url, FETCH_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Fetcher { client, url, timeout })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn classify(&self, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout {
                url: self.url.clone(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Transport {
                url: self.url.clone(),
                source,
            }
        }
    }
}

impl PageSource for Fetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        let started = Instant::now();
        debug!("GET {}", self.url);

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            info!("GET {} -> {} after {:?}", self.url, status, started.elapsed());
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        info!(
            "GET {} -> {} ({} bytes) in {:?}",
            self.url,
            status,
            body.len(),
            started.elapsed()
        );

        Ok(body)
    }
}
