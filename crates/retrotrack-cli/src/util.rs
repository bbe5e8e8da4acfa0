use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use retrotrack_telemetry::{
    Campaign, CampaignSummary, LedgerState, Sample, ledger::TIMESTAMP_FORMAT, sink::write_series,
};

/// Destination of a command's result: a file, or stdout when no path is given.
pub(crate) struct Output {
    writer: Box<dyn Write>,
    name: String,
}

impl Output {
    /// Opens `path` for writing, creating missing parent directories.
    pub(crate) fn create(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self {
                writer: Box::new(io::stdout().lock()),
                name: "stdout".to_owned(),
            });
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self {
            writer: Box::new(BufWriter::new(file)),
            name: path.display().to_string(),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Writes `value` as pretty-printed JSON followed by a newline.
    pub(crate) fn json<T>(mut self, value: &T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut self.writer, value)
            .with_context(|| format!("Failed to write JSON to {}", self.name))?;
        writeln!(self.writer).with_context(|| format!("Failed to write to {}", self.name))?;
        self.finish()
    }

    /// Writes `samples` as a two-column series table with header.
    pub(crate) fn series(mut self, samples: &[Sample]) -> anyhow::Result<()> {
        write_series(&mut self.writer, samples)
            .with_context(|| format!("Failed to write series to {}", self.name))?;
        self.finish()
    }

    fn finish(mut self) -> anyhow::Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush output to {}", self.name))
    }
}

/// Tells the operator what the ledger said before the session starts.
pub(crate) fn print_campaign_start(campaign: &Campaign) {
    match campaign.state() {
        LedgerState::Resumed(prior) => {
            eprintln!(
                "Resuming campaign started at {}",
                prior.prior_start.format(TIMESTAMP_FORMAT)
            );
            eprintln!(
                "  Previous sessions: {} ({:.2} minutes, last ended {})",
                prior.sessions,
                prior.prior_cumulative_minutes,
                prior.prior_end.format(TIMESTAMP_FORMAT)
            );
        }
        LedgerState::Fresh => eprintln!("No previous training ledger; starting a new campaign"),
        LedgerState::Unreadable => {
            eprintln!("Previous training ledger is unreadable; starting a new campaign");
        }
    }
    eprintln!(
        "Session started at {}",
        campaign.timer().started_at().format(TIMESTAMP_FORMAT)
    );
}

pub(crate) fn print_campaign_summary(summary: &CampaignSummary, ledger: &Path) {
    eprintln!();
    eprintln!("Session finished");
    eprintln!(
        "  Start:    {}",
        summary.session.start.format(TIMESTAMP_FORMAT)
    );
    eprintln!("  End:      {}", summary.session.end.format(TIMESTAMP_FORMAT));
    eprintln!("  Session:  {:.2} minutes", summary.session.duration_minutes);
    eprintln!("  Campaign: {:.2} minutes", summary.total_minutes);
    eprintln!(
        "  Ledger:   {} ({})",
        ledger.display(),
        if summary.continuation {
            "continuation appended"
        } else {
            "primary block written"
        }
    );
}
