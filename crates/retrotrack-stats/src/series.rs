use serde::Serialize;

use crate::{descriptive::DescriptiveStats, percentiles::Percentiles};

/// Percentiles reported when the caller has no preference.
pub const DEFAULT_PERCENTILES: [f64; 4] = [25.0, 50.0, 75.0, 90.0];

/// Summary of one `(elapsed minutes, score)` series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesReport {
    pub first_minute: f64,
    pub last_minute: f64,
    pub scores: DescriptiveStats,
    pub percentiles: Percentiles,
}

impl SeriesReport {
    /// Summarizes a series. Points need not be sorted.
    ///
    /// Returns `None` for a series without any usable score.
    #[must_use]
    pub fn new<I>(points: I, percentile_points: &[f64]) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut first_minute = f64::INFINITY;
        let mut last_minute = f64::NEG_INFINITY;
        let mut scores = vec![];
        for (minute, score) in points {
            if score.is_nan() {
                continue;
            }
            first_minute = first_minute.min(minute);
            last_minute = last_minute.max(minute);
            scores.push(score);
        }
        scores.sort_by(f64::total_cmp);

        Some(Self {
            first_minute,
            last_minute,
            scores: DescriptiveStats::from_sorted(&scores)?,
            percentiles: Percentiles::from_sorted(&scores, percentile_points),
        })
    }

    /// Minutes between the first and the last point.
    #[must_use]
    pub fn span_minutes(&self) -> f64 {
        self.last_minute - self.first_minute
    }
}
