//! Derived values for one state record, ready to render.

use crate::models::AssetSeries;
use crate::price_change::{ChangeResult, calculate_change};
use crate::refresh::DashboardState;
use crate::statistics::{SeriesStatistics, calculate_statistics};
use crate::timeline::{MergedChartPoint, merge_snapshot};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct AssetPanel {
    pub asset_id: String,
    pub latest_price: Option<f64>,
    pub change: Option<ChangeResult>,
    pub statistics: Option<SeriesStatistics>,
}

impl AssetPanel {
    pub fn from_series(asset_id: &str, series: &AssetSeries) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            latest_price: series.latest_price(),
            change: calculate_change(series),
            statistics: calculate_statistics(series),
        }
    }
}

/// Recomputed in full from the state's snapshot on every refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub panels: Vec<AssetPanel>,
    pub chart: Vec<MergedChartPoint>,
}

impl DashboardView {
    pub fn build<S: AsRef<str>>(state: &DashboardState, asset_ids: &[S]) -> Self {
        let empty = AssetSeries::default();
        let panels = asset_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                AssetPanel::from_series(id, state.snapshot.get(id).unwrap_or(&empty))
            })
            .collect();

        Self {
            panels,
            chart: merge_snapshot(&state.snapshot, asset_ids),
        }
    }

    /// Lowest and highest non-zero charted value, for axis bounds.
    pub fn price_bounds(&self) -> Option<(f64, f64)> {
        self.chart
            .iter()
            .flat_map(|p| p.values_by_asset.values().copied())
            .filter(|v| *v != 0.0)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }
}

// --- Formatting ---

/// `$64,012.50` style, two decimals.
pub fn format_price(value: f64) -> String {
    if !value.is_finite() {
        return format!("${value}");
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", value.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}.{frac}")
}

/// `+$10.00` / `-$3.25`, and the percentage to match.
pub fn format_change(change: &ChangeResult) -> (String, String) {
    let plus = if change.is_up() { "+" } else { "" };
    (
        format!("{plus}{}", format_price(change.absolute_change)),
        format!("{plus}{:.2}%", change.percent_change),
    )
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(dt) => dt.format("%d-%m-%Y %H:%M:%S").to_string(),
        None => "Never".to_string(),
    }
}
