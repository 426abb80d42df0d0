use crate::error::ConfigError;
use crate::models::SERIES_WINDOW;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const DEFAULT_CONFIG_FILE: &str = "price-pulse.json";

// CONFIGURATION STRUCTS

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String, // e.g., "http://localhost:8080"; "/data" is appended
    pub assets: Vec<String>, // chart order
    pub refresh_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            assets: vec!["BTC-USD".to_string(), "ETH-USD".to_string()],
            refresh_interval_ms: 1000,
            request_timeout_ms: 5000,
            history_limit: SERIES_WINDOW,
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Live two-asset price tracker", long_about = None)]
pub struct Cli {
    /// JSON config file (defaults to ./price-pulse.json if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Price server base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Refresh period in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Tracked asset id; repeat to track several
    #[arg(long = "asset")]
    pub assets: Vec<String>,

    /// Fetch once, print a summary table and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

impl AppConfig {
    /// Reads a JSON config file. Missing keys take their defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read(path).await.map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_slice(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Defaults, then the config file, then CLI flags.
    ///
    /// An explicitly named file must exist; the default one is optional.
    pub async fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let base = match &cli.config {
            Some(path) => Self::load(path).await?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if fs::try_exists(default_path).await.unwrap_or(false) {
                    Self::load(default_path).await?
                } else {
                    Self::default()
                }
            }
        };

        let config = base.with_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(url) = &cli.base_url {
            self.base_url = url.clone();
        }
        if let Some(ms) = cli.interval_ms {
            self.refresh_interval_ms = ms;
        }
        if !cli.assets.is_empty() {
            self.assets = cli.assets.clone();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.assets.is_empty() {
            return Err(ConfigError::Invalid("at least one asset must be tracked".into()));
        }
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid("refresh_interval_ms must be positive".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be positive".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
