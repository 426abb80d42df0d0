use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Most recent samples retained per asset.
pub const SERIES_WINDOW: usize = 100;

// --- Samples ---

/// One observed trade price for one asset, exactly as the upstream reports it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PriceSample {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Price", deserialize_with = "deserialize_price")]
    pub price: f64,
    #[serde(rename = "ProductID", default)]
    pub asset_id: String,
}

impl PriceSample {
    pub fn new(asset_id: impl Into<String>, timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            price,
            asset_id: asset_id.into(),
        }
    }
}

// The upstream parses trade prices out of strings, so accept either form.
struct PriceVisitor;

impl<'de> Visitor<'de> for PriceVisitor {
    type Value = f64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        finite(v)
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let price = v.trim().parse::<f64>().map_err(E::custom)?;
        finite(price)
    }
}

fn finite<E: de::Error>(price: f64) -> Result<f64, E> {
    if price.is_finite() {
        Ok(price)
    } else {
        Err(E::custom(format!("price must be finite, got {price}")))
    }
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(PriceVisitor)
}

// --- Series ---

/// Bounded history of one asset's samples, in the order they were delivered.
///
/// Holds at most `limit` samples. When the bound is exceeded the oldest
/// samples are evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSeries {
    samples: Vec<PriceSample>,
    limit: usize,
}

impl AssetSeries {
    pub const fn new(limit: usize) -> Self {
        Self {
            samples: Vec::new(),
            limit,
        }
    }

    /// Builds a series from samples delivered oldest-to-newest, keeping the
    /// last `limit` of them. Delivery order is kept even where timestamps
    /// step backwards.
    pub fn from_samples(mut samples: Vec<PriceSample>, limit: usize) -> Self {
        if let Some(w) = samples.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
            log::debug!(
                "Series for {} steps back in time at {}",
                w[1].asset_id,
                w[1].timestamp
            );
        }
        if samples.len() > limit {
            let excess = samples.len() - limit;
            samples.drain(..excess);
        }
        Self { samples, limit }
    }

    /// Appends a sample, evicting the oldest one once the window is full.
    ///
    /// Returns `false` (and drops the sample) if it is older than the
    /// current newest sample.
    pub fn push(&mut self, sample: PriceSample) -> bool {
        if let Some(last) = self.samples.last() {
            if sample.timestamp < last.timestamp {
                log::debug!(
                    "Dropping out-of-order sample for {} at {}",
                    sample.asset_id,
                    sample.timestamp
                );
                return false;
            }
        }
        if self.limit == 0 {
            return false;
        }
        if self.samples.len() >= self.limit {
            let excess = self.samples.len() + 1 - self.limit;
            self.samples.drain(..excess);
        }
        self.samples.push(sample);
        true
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.price).collect()
    }

    pub fn get(&self, index: usize) -> Option<&PriceSample> {
        self.samples.get(index)
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.last()
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.latest().map(|s| s.price)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for AssetSeries {
    fn default() -> Self {
        Self::new(SERIES_WINDOW)
    }
}

// --- Snapshots ---

/// Raw `/data` body: asset id -> samples, oldest first. A `null` series
/// reads as empty.
pub type WireSnapshot = HashMap<String, Option<Vec<PriceSample>>>;

/// Every asset series from one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotMap {
    series: BTreeMap<String, AssetSeries>,
}

impl SnapshotMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_wire(raw: WireSnapshot, limit: usize) -> Self {
        let series = raw
            .into_iter()
            .map(|(asset_id, samples)| {
                let series = AssetSeries::from_samples(samples.unwrap_or_default(), limit);
                (asset_id, series)
            })
            .collect();
        Self { series }
    }

    pub fn insert(&mut self, asset_id: impl Into<String>, series: AssetSeries) {
        self.series.insert(asset_id.into(), series);
    }

    pub fn get(&self, asset_id: &str) -> Option<&AssetSeries> {
        self.series.get(asset_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssetSeries)> {
        self.series.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl IntoIterator for SnapshotMap {
    type Item = (String, AssetSeries);
    type IntoIter = std::collections::btree_map::IntoIter<String, AssetSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.into_iter()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn series(asset_id: &str, points: &[(i64, f64)]) -> AssetSeries {
        let samples = points
            .iter()
            .map(|&(t, p)| PriceSample::new(asset_id, at(t), p))
            .collect();
        AssetSeries::from_samples(samples, SERIES_WINDOW)
    }

    pub fn constant_series(asset_id: &str, price: f64, len: usize) -> AssetSeries {
        let points: Vec<(i64, f64)> = (0..len as i64).map(|t| (t, price)).collect();
        series(asset_id, &points)
    }

    pub fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }
}
