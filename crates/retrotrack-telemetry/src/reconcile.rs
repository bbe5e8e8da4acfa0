use chrono::NaiveDateTime;

use crate::ledger::{Ledger, SessionLedger};

/// What earlier sessions of a campaign left behind in the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorCampaign {
    /// Start of the primary block. The campaign clock origin never moves.
    pub prior_start: NaiveDateTime,
    /// End of the most recently appended block.
    pub prior_end: NaiveDateTime,
    /// Primary duration plus every continuation duration.
    pub prior_cumulative_minutes: f64,
    /// Number of sessions already recorded.
    pub sessions: usize,
}

impl From<&Ledger> for PriorCampaign {
    fn from(ledger: &Ledger) -> Self {
        Self {
            prior_start: ledger.primary.start,
            prior_end: ledger.last_end(),
            prior_cumulative_minutes: ledger.cumulative_minutes(),
            sessions: ledger.block_count(),
        }
    }
}

/// Recovers the campaign state from `ledger`.
///
/// Returns `None` for a fresh campaign. A ledger that cannot be read or parsed is also treated as
/// a fresh campaign after logging a warning: starting a new session matters more than exact
/// bookkeeping of the old ones.
///
/// Continuation blocks that start before their predecessor ended are logged but still counted.
pub fn reconcile(ledger: &SessionLedger) -> Option<PriorCampaign> {
    let ledger = match ledger.read() {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            tracing::info!(path = %ledger.path().display(), "no previous training ledger");
            return None;
        }
        Err(e) => {
            tracing::warn!("{e}; starting without prior history");
            return None;
        }
    };

    for index in ledger.chronology_gaps() {
        let block = &ledger.continuations[index];
        tracing::warn!(
            continuation = index + 1,
            start = %block.start,
            "continuation starts before the previous session ended"
        );
    }

    Some(PriorCampaign::from(&ledger))
}
