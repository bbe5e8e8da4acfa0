use std::path::PathBuf;

use anyhow::Context;
use retrotrack_stats::series::{DEFAULT_PERCENTILES, SeriesReport};
use retrotrack_telemetry::sink::read_series_csv;
use serde::Serialize;

use crate::util::Output;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ReportArg {
    /// Series to summarize, e.g. the initial and the continued session
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct InputReport {
    path: PathBuf,
    samples: usize,
    /// `None` for a series without samples
    report: Option<SeriesReport>,
}

pub(crate) fn run(arg: &ReportArg) -> anyhow::Result<()> {
    let reports = arg
        .inputs
        .iter()
        .map(|path| -> anyhow::Result<InputReport> {
            let samples = read_series_csv(path)
                .with_context(|| format!("Failed to read series: {}", path.display()))?;
            let report = SeriesReport::new(
                samples.iter().map(|s| (s.elapsed_minutes, s.score)),
                &DEFAULT_PERCENTILES,
            );
            Ok(InputReport {
                path: path.clone(),
                samples: samples.len(),
                report,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Output::create(arg.output.as_deref())?.json(&reports)
}
