//! Combining per-worker and per-session series into one chronological series.

use crate::{error::TelemetryError, extremum::RunningExtremum, sample::Sample, sink::SampleSink};

/// Reads every sink and returns all samples sorted by `elapsed_minutes`.
///
/// The sort is stable: samples with equal times keep the order of `sinks`, then write order.
/// Samples from parallel workers interleave arbitrarily in wall-clock time, so the result is
/// sorted explicitly rather than assumed sorted.
pub fn merge<'a, I, S>(sinks: I) -> Result<Vec<Sample>, TelemetryError>
where
    I: IntoIterator<Item = &'a S>,
    S: SampleSink + ?Sized + 'a,
{
    let mut samples = vec![];
    for sink in sinks {
        samples.extend(sink.export()?);
    }
    sort_series(&mut samples);
    Ok(samples)
}

/// Stable sort by elapsed time.
pub fn sort_series(samples: &mut [Sample]) {
    samples.sort_by(|a, b| a.elapsed_minutes.total_cmp(&b.elapsed_minutes));
}

/// Shifts a session-relative series onto the campaign timeline.
///
/// `offset_minutes` is the cumulative duration of the earlier sessions, see
/// [`PriorCampaign`](crate::reconcile::PriorCampaign).
#[must_use]
pub fn offset_series(samples: &[Sample], offset_minutes: f64) -> Vec<Sample> {
    samples
        .iter()
        .map(|s| Sample::new(s.elapsed_minutes + offset_minutes, s.score))
        .collect()
}

/// Best score stored in any of `sinks`, or `None` if they are all empty.
pub fn historical_max<'a, I, S>(sinks: I) -> Result<Option<f64>, TelemetryError>
where
    I: IntoIterator<Item = &'a S>,
    S: SampleSink + ?Sized + 'a,
{
    let mut extremum = RunningExtremum::new();
    for sink in sinks {
        for sample in sink.export()? {
            extremum.observe(sample.score);
        }
    }
    Ok(extremum.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CsvSampleSink, MemorySampleSink};

    fn sink(samples: &[(f64, f64)]) -> MemorySampleSink {
        samples.iter().copied().map(Sample::from).collect()
    }

    #[test]
    fn test_merge_sorts_across_sinks() {
        let sinks = [
            sink(&[(0.0, 5.0), (2.0, 9.0)]),
            sink(&[(1.0, 7.0)]),
            sink(&[(3.0, 2.0)]),
        ];

        let merged = merge(&sinks).unwrap();

        assert_eq!(
            merged,
            vec![
                Sample::new(0.0, 5.0),
                Sample::new(1.0, 7.0),
                Sample::new(2.0, 9.0),
                Sample::new(3.0, 2.0),
            ]
        );
    }

    #[test]
    fn test_merge_is_stable_for_ties() {
        let sinks = [
            sink(&[(1.0, 1.0), (1.0, 2.0)]),
            sink(&[(0.5, 0.0), (1.0, 3.0)]),
        ];

        let scores = merge(&sinks)
            .unwrap()
            .into_iter()
            .map(|s| s.score)
            .collect::<Vec<_>>();

        assert_eq!(scores, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let sinks = [
            sink(&[(4.0, 1.0), (0.1, 2.0), (2.5, 3.0)]),
            sink(&[(2.5, 4.0), (0.0, 5.0)]),
        ];

        assert_eq!(merge(&sinks).unwrap(), merge(&sinks).unwrap());
    }

    #[test]
    fn test_merge_empty() {
        let sinks: [MemorySampleSink; 0] = [];
        assert!(merge(&sinks).unwrap().is_empty());
    }

    #[test]
    fn test_merge_trait_objects() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = CsvSampleSink::new(dir.path().join("w0.csv"));
        csv.record(Sample::new(2.0, 20.0)).unwrap();
        let memory = sink(&[(1.0, 10.0)]);

        let sinks: Vec<Box<dyn SampleSink>> = vec![Box::new(csv), Box::new(memory)];
        let merged = merge(sinks.iter().map(|s| &**s)).unwrap();

        assert_eq!(merged, vec![Sample::new(1.0, 10.0), Sample::new(2.0, 20.0)]);
    }

    #[test]
    fn test_merge_propagates_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // a directory exists at the sink path
        let sinks = [CsvSampleSink::new(dir.path())];
        assert!(matches!(
            merge(&sinks),
            Err(TelemetryError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn test_offset_series() {
        let series = [Sample::new(0.0, 1.0), Sample::new(1.5, 2.0)];
        assert_eq!(
            offset_series(&series, 120.0),
            vec![Sample::new(120.0, 1.0), Sample::new(121.5, 2.0)]
        );
    }

    #[test]
    fn test_historical_max() {
        let sinks = [sink(&[(0.0, -5.0), (1.0, 12.0)]), sink(&[(0.0, 7.0)])];
        assert_eq!(historical_max(&sinks).unwrap(), Some(12.0));

        let empty: [MemorySampleSink; 1] = [MemorySampleSink::new()];
        assert_eq!(historical_max(&empty).unwrap(), None);
    }
}
