use anyhow::{Result, bail};
use clap::Parser;
use std::sync::Arc;

use price_pulse::refresh::RefreshCycle;
use price_pulse::{AppConfig, Cli, HttpPriceFeed, PriceFeed, RefreshStatus, spawn_refresh_loop};
use price_pulse::{summary_table, tui};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The dashboard owns the terminal, so stay quiet there unless asked.
    let default_filter = if cli.once { "info" } else { "off" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = AppConfig::resolve(&cli).await?;
    log::info!("Tracking {:?} from {}", config.assets, config.base_url);

    let feed: Arc<dyn PriceFeed> = Arc::new(HttpPriceFeed::new(
        &config.base_url,
        config.request_timeout(),
        config.history_limit,
    )?);

    if cli.once {
        return run_once(feed, &config).await;
    }

    let handle = spawn_refresh_loop(feed, config.refresh_interval(), config.history_limit);
    tui::run_tui(handle, config.assets).await
}

async fn run_once(feed: Arc<dyn PriceFeed>, config: &AppConfig) -> Result<()> {
    let mut cycle = RefreshCycle::new(feed, config.history_limit);
    let state = cycle.refresh().await;

    if let RefreshStatus::Error(message) = &state.status {
        bail!("{message}");
    }

    println!("\n{}", summary_table::render(&state, &config.assets));
    Ok(())
}
