//! One session of a campaign, from reconciliation to the ledger update.
//!
//! ```rust,ignore
//! let campaign = Campaign::begin(SessionLedger::new("trainLog.txt"));
//! let recorders = (0..workers)
//!     .map(|worker| {
//!         SessionRecorder::new(CsvSampleSink::new(sink_path(worker)), config)
//!             .started_at(campaign.timer().started())
//!     })
//!     .collect::<Vec<_>>();
//! // ... the trainer calls `on_step` on each recorder ...
//! let summary = campaign.finish()?;
//! ```

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use chrono::{Local, NaiveDateTime};

use crate::{
    error::TelemetryError,
    ledger::{SessionLedger, SessionSummary},
    reconcile::{PriorCampaign, reconcile},
};

/// Wall-clock and monotonic start of the current session.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimer {
    started_at: NaiveDateTime,
    started: Instant,
}

impl SessionTimer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started_at: Local::now().naive_local(),
            started: Instant::now(),
        }
    }

    /// Monotonic start, shared by every recorder of the session.
    #[must_use]
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Local wall-clock start, as written to the ledger.
    #[must_use]
    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    #[must_use]
    pub fn elapsed_minutes(&self) -> f64 {
        self.started.elapsed().as_secs_f64() / 60.0
    }

    /// Summary of the session if it ended now.
    #[must_use]
    pub fn finish(&self) -> SessionSummary {
        SessionSummary::new(
            self.started_at,
            Local::now().naive_local(),
            self.elapsed_minutes(),
        )
    }
}

/// What the ledger said when the session began.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::IsVariant)]
pub enum LedgerState {
    /// No ledger, or an empty one.
    Fresh,
    Resumed(PriorCampaign),
    /// A ledger exists but could not be read or parsed.
    Unreadable,
}

/// Outcome of [`Campaign::finish`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CampaignSummary {
    pub session: SessionSummary,
    /// Duration of every session of the campaign, this one included.
    pub total_minutes: f64,
    /// Whether the session was appended as a continuation block.
    pub continuation: bool,
}

/// The current session of a training campaign.
#[derive(Debug)]
pub struct Campaign {
    ledger: SessionLedger,
    state: LedgerState,
    timer: SessionTimer,
}

impl Campaign {
    /// Reconciles `ledger` and starts the session clock.
    #[must_use]
    pub fn begin(ledger: SessionLedger) -> Self {
        let state = match reconcile(&ledger) {
            Some(prior) => LedgerState::Resumed(prior),
            None if ledger.has_content().unwrap_or(true) => LedgerState::Unreadable,
            None => LedgerState::Fresh,
        };
        Self {
            ledger,
            state,
            timer: SessionTimer::start(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    #[must_use]
    pub fn prior(&self) -> Option<&PriorCampaign> {
        match &self.state {
            LedgerState::Resumed(prior) => Some(prior),
            LedgerState::Fresh | LedgerState::Unreadable => None,
        }
    }

    /// Zero-based index of this session within the campaign.
    #[must_use]
    pub fn session_index(&self) -> usize {
        self.prior().map_or(0, |p| p.sessions)
    }

    /// Minutes to add to this session's samples to place them on the campaign timeline.
    #[must_use]
    pub fn campaign_offset_minutes(&self) -> f64 {
        self.prior().map_or(0.0, |p| p.prior_cumulative_minutes)
    }

    #[must_use]
    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    #[must_use]
    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    /// Ends the session and records it in the ledger.
    ///
    /// A fresh campaign gets a primary block; a resumed one gets a continuation block. An
    /// unreadable ledger is first moved aside to `<ledger>.corrupt` (or `<ledger>.corrupt.<n>` if
    /// that is taken), so it is never overwritten.
    pub fn finish(self) -> Result<CampaignSummary, TelemetryError> {
        let session = self.timer.finish();
        let continuation = match self.state {
            LedgerState::Resumed(_) => {
                self.ledger.append_continuation(&session)?;
                true
            }
            LedgerState::Unreadable => {
                let aside = corrupt_path(self.ledger.path());
                fs::rename(self.ledger.path(), &aside)
                    .map_err(|e| TelemetryError::storage(self.ledger.path(), e))?;
                tracing::warn!(
                    moved_to = %aside.display(),
                    "unreadable ledger moved aside; starting a new campaign"
                );
                self.ledger.write_primary(&session)?;
                false
            }
            LedgerState::Fresh => {
                self.ledger.write_primary(&session)?;
                false
            }
        };
        Ok(CampaignSummary {
            session,
            total_minutes: self.campaign_offset_minutes() + session.duration_minutes,
            continuation,
        })
    }
}

/// First free name among `<ledger>.corrupt`, `<ledger>.corrupt.1`, `<ledger>.corrupt.2`, ...
fn corrupt_path(path: &Path) -> PathBuf {
    let mut base = OsString::from(path.as_os_str());
    base.push(".corrupt");
    let mut aside = PathBuf::from(&base);
    let mut n = 1;
    while aside.exists() {
        let mut name = base.clone();
        name.push(format!(".{n}"));
        aside = PathBuf::from(name);
        n += 1;
    }
    aside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_campaign_writes_primary() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SessionLedger::new(dir.path().join("trainLog.txt"));

        let campaign = Campaign::begin(ledger.clone());
        assert!(campaign.state().is_fresh());
        assert_eq!(campaign.session_index(), 0);
        assert!(campaign.campaign_offset_minutes().abs() < f64::EPSILON);

        let summary = campaign.finish().unwrap();
        assert!(!summary.continuation);

        let parsed = ledger.read().unwrap().unwrap();
        assert_eq!(parsed.primary, summary.session);
        assert!(parsed.continuations.is_empty());
    }

    #[test]
    fn test_resumed_campaign_appends_continuation() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SessionLedger::new(dir.path().join("trainLog.txt"));
        let first = Campaign::begin(ledger.clone()).finish().unwrap();

        let campaign = Campaign::begin(ledger.clone());
        assert!(campaign.state().is_resumed());
        assert_eq!(campaign.session_index(), 1);
        let prior = *campaign.prior().unwrap();
        assert_eq!(prior.prior_start, first.session.start);

        let second = campaign.finish().unwrap();
        assert!(second.continuation);

        let parsed = ledger.read().unwrap().unwrap();
        assert_eq!(parsed.block_count(), 2);
        assert_eq!(parsed.primary.start, first.session.start);
        assert_eq!(parsed.last_end(), second.session.end);
    }

    #[test]
    fn test_unreadable_ledger_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trainLog.txt");
        fs::write(&path, "Inicio del entrenamiento: 2024-01-01 00:00:00\nFin del").unwrap();

        let campaign = Campaign::begin(SessionLedger::new(&path));
        assert!(campaign.state().is_unreadable());
        assert!(campaign.prior().is_none());
        campaign.finish().unwrap();

        let aside = dir.path().join("trainLog.txt.corrupt");
        assert_eq!(
            fs::read_to_string(aside).unwrap(),
            "Inicio del entrenamiento: 2024-01-01 00:00:00\nFin del"
        );
        assert!(SessionLedger::new(&path).read().unwrap().is_some());
    }

    #[test]
    fn test_repeated_unreadable_ledgers_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trainLog.txt");

        for garbage in ["garbage one", "garbage two", "garbage three"] {
            fs::write(&path, garbage).unwrap();
            let campaign = Campaign::begin(SessionLedger::new(&path));
            assert!(campaign.state().is_unreadable());
            campaign.finish().unwrap();
        }

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("trainLog.txt.corrupt"), "garbage one");
        assert_eq!(read("trainLog.txt.corrupt.1"), "garbage two");
        assert_eq!(read("trainLog.txt.corrupt.2"), "garbage three");
        assert!(SessionLedger::new(&path).read().unwrap().is_some());
    }

    #[test]
    fn test_summary_matches_ledger_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SessionLedger::new(dir.path().join("trainLog.txt"));
        let first = Campaign::begin(ledger.clone()).finish().unwrap();
        let second = Campaign::begin(ledger.clone()).finish().unwrap();

        let parsed = ledger.read().unwrap().unwrap();
        assert_eq!(parsed.primary, first.session);
        assert_eq!(parsed.continuations, vec![second.session]);
        assert!((parsed.cumulative_minutes() - second.total_minutes).abs() < 1e-12);
    }

    #[test]
    fn test_timer_summary_is_whole_seconds() {
        let timer = SessionTimer::start();
        let summary = timer.finish();
        assert_eq!(summary.start.and_utc().timestamp_subsec_nanos(), 0);
        assert!(summary.end >= summary.start);
        assert!(summary.duration_minutes >= 0.0);
    }
}
