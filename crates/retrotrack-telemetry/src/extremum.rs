/// Running maximum of the scores observed in one session.
///
/// Starts unset (internally negative infinity). [`get`](Self::get) returns `None` until the
/// first observation, so the sentinel never leaks to callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningExtremum {
    max_score: f64,
    initialized: bool,
}

impl Default for RunningExtremum {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningExtremum {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_score: f64::NEG_INFINITY,
            initialized: false,
        }
    }

    /// Records `score` and returns the maximum so far.
    ///
    /// A NaN score is not an observation; it leaves the state untouched and is never returned
    /// unless nothing else has been observed.
    pub fn observe(&mut self, score: f64) -> f64 {
        if !score.is_nan() {
            self.max_score = self.max_score.max(score);
            self.initialized = true;
        }
        self.max_score
    }

    /// The maximum observed so far, or `None` before the first observation.
    #[must_use]
    pub fn get(&self) -> Option<f64> {
        self.initialized.then_some(self.max_score)
    }
}
