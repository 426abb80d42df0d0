use crate::error::FeedError;
use crate::models::{SnapshotMap, WireSnapshot};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const DATA_PATH: &str = "/data";

/// Source of full price snapshots.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<SnapshotMap, FeedError>;

    /// Where the feed reads from, for user-facing messages.
    fn endpoint(&self) -> &str;
}

/// `GET {base_url}/data`, no query string, no auth.
pub struct HttpPriceFeed {
    client: Client,
    base_url: String,
    url: String,
    history_limit: usize,
}

impl HttpPriceFeed {
    pub fn new(base_url: &str, timeout: Duration, history_limit: usize) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FeedError::Request {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            url: data_url(base_url),
            history_limit,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn fetch_snapshot(&self) -> Result<SnapshotMap, FeedError> {
        let request_err = |source: reqwest::Error| FeedError::Request {
            url: self.url.clone(),
            source,
        };

        let response = self.client.get(&self.url).send().await.map_err(request_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(request_err)?;
        decode_snapshot(&body, self.history_limit).map_err(|source| FeedError::Malformed {
            url: self.url.clone(),
            source,
        })
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

pub fn data_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), DATA_PATH)
}

/// Parses a `/data` body, bounding every series to `history_limit`.
pub fn decode_snapshot(body: &[u8], history_limit: usize) -> Result<SnapshotMap, serde_json::Error> {
    let raw: WireSnapshot = serde_json::from_slice(body)?;
    Ok(SnapshotMap::from_wire(raw, history_limit))
}
