use thiserror::Error;

/// Anything that stops a snapshot from reaching the store.
///
/// Every variant is a transient transport failure: the refresh loop reports
/// it and tries again on the next tick.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("malformed snapshot from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FeedError {
    /// The single message shown to the user, whatever went wrong.
    pub fn user_message(base_url: &str) -> String {
        format!("Failed to fetch data. Make sure the price server is running at {base_url}")
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
