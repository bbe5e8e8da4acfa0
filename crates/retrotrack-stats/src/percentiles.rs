use serde::Serialize;

/// Precomputed percentile values of a set of scores.
///
/// # Examples
///
/// ```
/// use retrotrack_stats::percentiles::Percentiles;
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
/// let percentiles = Percentiles::new(&values, &[25.0, 50.0, 75.0]);
///
/// assert_eq!(percentiles.get(50.0), Some(6.0));
/// assert_eq!(percentiles.get(25.0), Some(3.0));
/// assert_eq!(percentiles.get(90.0), None); // not precomputed
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Percentiles {
    /// `(percentile, value)` pairs in the order they were requested.
    values: Vec<(f64, f64)>,
}

impl Percentiles {
    /// Computes percentiles of values sorted in ascending order.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted.
    #[must_use]
    pub fn from_sorted(sorted_values: &[f64], percentile_points: &[f64]) -> Self {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );

        let values = percentile_points
            .iter()
            .map(|&p| (p, compute_percentile(sorted_values, p)))
            .collect();
        Self { values }
    }

    /// Computes percentiles of unsorted values. NaN values are ignored.
    #[must_use]
    pub fn new(values: &[f64], percentile_points: &[f64]) -> Self {
        let mut sorted = values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect::<Vec<_>>();
        sorted.sort_by(f64::total_cmp);
        Self::from_sorted(&sorted, percentile_points)
    }

    #[must_use]
    pub fn get(&self, percentile: f64) -> Option<f64> {
        self.values
            .iter()
            .find(|(p, _)| (p - percentile).abs() < f64::EPSILON)
            .map(|&(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values.iter().copied()
    }
}

/// Nearest-rank percentile: the value at index `floor(n * p / 100)`, clamped to the last value.
///
/// Returns NaN for empty input.
///
/// ```
/// use retrotrack_stats::percentiles::compute_percentile;
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(compute_percentile(&values, 50.0), 3.0);
/// assert_eq!(compute_percentile(&values, 100.0), 5.0);
/// ```
#[expect(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn compute_percentile(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }
    let idx = ((sorted_values.len() as f64 * percentile) / 100.0) as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_nan() {
        let percentiles = Percentiles::new(&[], &[50.0]);
        assert!(percentiles.get(50.0).unwrap().is_nan());
    }

    #[test]
    fn test_keeps_requested_order() {
        let percentiles = Percentiles::new(&[3.0, 1.0, 2.0], &[90.0, 0.0]);
        assert_eq!(percentiles.iter().collect::<Vec<_>>(), vec![(90.0, 3.0), (0.0, 1.0)]);
    }

    #[test]
    fn test_nan_values_are_ignored() {
        let percentiles = Percentiles::new(&[1.0, f64::NAN, 3.0, 2.0], &[50.0, 100.0]);
        assert_eq!(percentiles.get(50.0), Some(2.0));
        assert_eq!(percentiles.get(100.0), Some(3.0));

        let only_nan = Percentiles::new(&[f64::NAN], &[50.0]);
        assert!(only_nan.get(50.0).unwrap().is_nan());
    }
}
