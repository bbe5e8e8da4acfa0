use std::{io, path::PathBuf};

use anyhow::Context;
use retrotrack_telemetry::{
    Campaign, CsvSampleSink, RecorderConfig, SessionLedger, SessionRecorder, StepHook, StepInfo,
    historical_max,
};

use crate::{
    config::{CampaignArgs, CampaignConfig},
    util::{print_campaign_start, print_campaign_summary},
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct RecordArg {
    #[clap(flatten)]
    campaign: CampaignArgs,
    /// Index of the worker feeding this recorder
    #[arg(long, default_value_t = 0)]
    worker: usize,
    /// Sample table path (default: derived from the campaign config)
    #[arg(long)]
    sink: Option<PathBuf>,
    /// Leave the ledger to another process. Workers other than 0 never write it.
    #[arg(long)]
    no_ledger: bool,
}

impl RecordArg {
    /// Only one process per session may write the ledger: worker 0, unless told otherwise.
    fn writes_ledger(&self) -> bool {
        self.worker == 0 && !self.no_ledger
    }
}

pub(crate) fn run(arg: &RecordArg) -> anyhow::Result<()> {
    let config = arg.campaign.resolve()?;
    let campaign = Campaign::begin(SessionLedger::new(&config.ledger));
    print_campaign_start(&campaign);

    let session = config.session_for(&campaign, &[arg.worker]);
    let sink_path = arg
        .sink
        .clone()
        .unwrap_or_else(|| config.sink_path(session, arg.worker));
    let mut recorder = SessionRecorder::new(
        CsvSampleSink::new(&sink_path),
        RecorderConfig {
            log_interval: config.log_interval,
            worker: arg.worker,
        },
    )
    .started_at(campaign.timer().started())
    .with_historical_max(previous_max(&config, campaign.session_index())?);

    let steps = record_lines(io::stdin().lock(), &mut recorder)?;

    eprintln!();
    eprintln!("Recording completed");
    eprintln!("  Steps:   {steps}");
    eprintln!("  Samples: {}", sink_path.display());
    if let Some(max_score) = recorder.max_score() {
        eprintln!("  Max score: {max_score}");
    }
    if recorder.dropped_samples() > 0 {
        eprintln!("  Dropped samples: {}", recorder.dropped_samples());
    }

    let ledger_path = campaign.ledger().path().to_owned();
    if !arg.writes_ledger() {
        eprintln!(
            "Ledger left to the orchestrating process: {}",
            ledger_path.display()
        );
        return Ok(());
    }
    let summary = campaign
        .finish()
        .with_context(|| format!("Failed to update ledger: {}", ledger_path.display()))?;
    print_campaign_summary(&summary, &ledger_path);

    Ok(())
}

/// Best score of the earlier sessions of the campaign.
pub(crate) fn previous_max(config: &CampaignConfig, session: usize) -> anyhow::Result<Option<f64>> {
    let sinks = config
        .previous_sink_paths(session)?
        .into_iter()
        .map(CsvSampleSink::new)
        .collect::<Vec<_>>();
    let max = historical_max(&sinks).context("Failed to read earlier sample tables")?;
    Ok(max)
}

/// Feeds every JSON line of `reader` to `hook` until the input ends or the hook asks to stop.
///
/// Blank lines are skipped. Lines that are not step metadata are logged and skipped.
fn record_lines<R, H>(reader: R, hook: &mut H) -> anyhow::Result<u64>
where
    R: io::BufRead,
    H: StepHook,
{
    let mut steps = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read step metadata")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let info = match serde_json::from_str::<StepInfo>(line) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(line = index + 1, "skipping unreadable step metadata: {e}");
                continue;
            }
        };
        steps += 1;
        if !hook.on_step(&info) {
            break;
        }
    }
    Ok(steps)
}
