//! Owner of the per-asset price history.
//!
//! The store is the only mutable piece of market state. Everything downstream
//! reads a [`SnapshotMap`] copy and computes fresh values from it.

use crate::models::{AssetSeries, SnapshotMap};

#[derive(Debug, Clone)]
pub struct SeriesStore {
    limit: usize,
    empty: AssetSeries,
    current: SnapshotMap,
}

impl SeriesStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            empty: AssetSeries::new(limit),
            current: SnapshotMap::new(),
        }
    }

    /// Replaces the stored series for `asset_id` wholesale.
    ///
    /// Anything beyond the window keeps only the newest `limit` samples.
    pub fn update(&mut self, asset_id: &str, series: AssetSeries) {
        let series = if series.len() > self.limit || series.limit() != self.limit {
            AssetSeries::from_samples(series.samples().to_vec(), self.limit)
        } else {
            series
        };
        self.current.insert(asset_id, series);
    }

    /// Current series for `asset_id`, or an empty one if it was never seen.
    pub fn get(&self, asset_id: &str) -> &AssetSeries {
        self.current.get(asset_id).unwrap_or(&self.empty)
    }

    /// Swaps in a complete refresh result. Assets missing from `snapshot`
    /// are dropped, matching what the upstream reported this cycle.
    pub fn apply_snapshot(&mut self, snapshot: SnapshotMap) {
        self.current = SnapshotMap::new();
        for (asset_id, series) in snapshot {
            self.update(&asset_id, series);
        }
    }

    /// Read-only copy for downstream consumers.
    pub fn snapshot(&self) -> SnapshotMap {
        self.current.clone()
    }
}
