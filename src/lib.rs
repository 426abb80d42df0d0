//! Live price tracker for a pair of assets.
//!
//! Polls a price server for full snapshots, keeps a bounded window per
//! asset, and derives change, statistics and a merged chart timeline from
//! whatever snapshot is current.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod feed;
pub mod models;
pub mod price_change;
pub mod refresh;
pub mod series_store;
pub mod statistics;
pub mod summary_table;
pub mod timeline;
pub mod tui;

pub use config::{AppConfig, Cli};
pub use error::{ConfigError, FeedError};
pub use feed::{HttpPriceFeed, PriceFeed};
pub use models::{AssetSeries, PriceSample, SnapshotMap};
pub use refresh::{DashboardState, RefreshHandle, RefreshStatus, spawn_refresh_loop};
