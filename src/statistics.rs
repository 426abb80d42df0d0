use crate::models::AssetSeries;
use serde::Serialize;
use ta::Next;
use ta::indicators::{SimpleMovingAverage, StandardDeviation};

/// Number of trailing samples in the short moving average.
pub const SMA_PERIOD: usize = 10;

/// Point-in-time summary of one asset's retained window.
///
/// `high` and `low` span the whole window, not a calendar day.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct SeriesStatistics {
    pub current: f64,
    pub high: f64,
    pub low: f64,
    pub sma10: f64,
    /// Population standard deviation over the whole window.
    pub volatility: f64,
    pub sample_count: usize,
}

/// Summarises `series`. `None` means there is no data to summarise.
pub fn calculate_statistics(series: &AssetSeries) -> Option<SeriesStatistics> {
    let prices = series.prices();
    let current = *prices.last()?;

    let (low, high) = prices
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| {
            (lo.min(p), hi.max(p))
        });

    Some(SeriesStatistics {
        current,
        high,
        low,
        sma10: trailing_mean(&prices, SMA_PERIOD)?,
        volatility: population_std_dev(&prices)?,
        sample_count: prices.len(),
    })
}

/// Mean of the last `min(period, len)` prices.
fn trailing_mean(prices: &[f64], period: usize) -> Option<f64> {
    let window = period.min(prices.len());
    let mut sma = SimpleMovingAverage::new(window).ok()?;

    let mut last = None;
    for &price in &prices[prices.len() - window..] {
        last = Some(sma.next(price));
    }
    last
}

fn population_std_dev(prices: &[f64]) -> Option<f64> {
    let mut sd = StandardDeviation::new(prices.len()).ok()?;

    let mut last = None;
    for &price in prices {
        last = Some(sd.next(price));
    }
    last
}
