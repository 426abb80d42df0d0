use crate::models::AssetSeries;
use serde::Serialize;

/// Move between the two most recent samples.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ChangeResult {
    pub absolute_change: f64,
    pub percent_change: f64,
}

impl ChangeResult {
    pub fn is_up(&self) -> bool {
        self.absolute_change >= 0.0
    }
}

/// `None` until the series has at least two samples.
///
/// A previous price of zero yields a non-finite `percent_change`; it is
/// passed through as is.
pub fn calculate_change(series: &AssetSeries) -> Option<ChangeResult> {
    let samples = series.samples();
    let [.., previous, current] = samples else {
        return None;
    };

    let absolute_change = current.price - previous.price;
    Some(ChangeResult {
        absolute_change,
        percent_change: absolute_change / previous.price * 100.0,
    })
}
