use std::path::PathBuf;

use anyhow::Context;
use retrotrack_telemetry::{CsvSampleSink, SessionLedger, merge, offset_series, reconcile};

use crate::util::Output;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct MergeArg {
    /// Sample tables to merge
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Minutes added to every sample
    #[arg(long, conflicts_with = "ledger")]
    offset: Option<f64>,
    /// Place the series after the sessions recorded in this ledger
    #[arg(long)]
    ledger: Option<PathBuf>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &MergeArg) -> anyhow::Result<()> {
    let MergeArg {
        inputs,
        offset,
        ledger,
        output,
    } = arg;

    for input in inputs {
        anyhow::ensure!(input.is_file(), "Sample table not found: {}", input.display());
    }
    let sinks = inputs.iter().map(CsvSampleSink::new).collect::<Vec<_>>();
    let samples = merge(&sinks).context("Failed to read sample tables")?;

    let offset = match (offset, ledger) {
        (Some(offset), _) => *offset,
        (None, Some(ledger)) => {
            reconcile(&SessionLedger::new(ledger)).map_or(0.0, |p| p.prior_cumulative_minutes)
        }
        (None, None) => 0.0,
    };
    let samples = offset_series(&samples, offset);

    let out = Output::create(output.as_deref())?;
    let out_name = out.name().to_owned();
    out.series(&samples)?;

    eprintln!(
        "Merged {} samples from {} tables into {out_name}",
        samples.len(),
        inputs.len(),
    );
    Ok(())
}
