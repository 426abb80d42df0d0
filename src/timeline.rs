//! Merges independent asset series onto one chart timeline.
//!
//! Series are aligned by sample index, not by timestamp: slot `i` holds the
//! `i`-th sample of every series. When feeds tick at different rates a slot
//! can pair samples taken at unrelated times.

use crate::models::{AssetSeries, SnapshotMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One x-axis position on the merged chart.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MergedChartPoint {
    /// `HH:MM:SS` (UTC) of `timestamp`.
    pub slot_label: String,
    /// A series with no sample at this slot contributes `0.0`.
    pub values_by_asset: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl MergedChartPoint {
    pub fn value(&self, asset_id: &str) -> f64 {
        self.values_by_asset.get(asset_id).copied().unwrap_or(0.0)
    }
}

/// Merges the configured assets of `snapshot`, in the order given.
/// Assets absent from the snapshot behave as empty series.
pub fn merge_snapshot<S: AsRef<str>>(snapshot: &SnapshotMap, asset_ids: &[S]) -> Vec<MergedChartPoint> {
    let empty = AssetSeries::default();
    let series: Vec<(&str, &AssetSeries)> = asset_ids
        .iter()
        .map(|id| {
            let id = id.as_ref();
            (id, snapshot.get(id).unwrap_or(&empty))
        })
        .collect();
    merge_series(&series)
}

/// Walks every index up to the longest series and emits one slot per index.
///
/// The slot time comes from the first series (in the given order) that has
/// a sample at that index. The result is sorted by slot time; the sort is
/// stable so equal times keep index order.
pub fn merge_series(series: &[(&str, &AssetSeries)]) -> Vec<MergedChartPoint> {
    let max_len = series.iter().map(|(_, s)| s.len()).max().unwrap_or(0);

    let mut points: Vec<MergedChartPoint> = (0..max_len)
        .filter_map(|i| {
            let timestamp = series.iter().find_map(|(_, s)| s.get(i))?.timestamp;
            let values_by_asset = series
                .iter()
                .map(|(id, s)| (id.to_string(), s.get(i).map_or(0.0, |p| p.price)))
                .collect();

            Some(MergedChartPoint {
                slot_label: format_slot_label(timestamp),
                values_by_asset,
                timestamp,
            })
        })
        .collect();

    points.sort_by_key(|p| p.timestamp);
    points
}

fn format_slot_label(ts: DateTime<Utc>) -> String {
    ts.format("%H:%M:%S").to_string()
}
