use serde::{Deserialize, Serialize};

/// One telemetry point: a score observed some minutes into a session.
///
/// `elapsed_minutes` is relative to the start of the session that produced the sample. Use
/// [`offset_series`](crate::aggregate::offset_series) to move a series onto the campaign
/// timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub elapsed_minutes: f64,
    pub score: f64,
}

impl Sample {
    #[must_use]
    pub const fn new(elapsed_minutes: f64, score: f64) -> Self {
        Self {
            elapsed_minutes,
            score,
        }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((elapsed_minutes, score): (f64, f64)) -> Self {
        Self::new(elapsed_minutes, score)
    }
}
