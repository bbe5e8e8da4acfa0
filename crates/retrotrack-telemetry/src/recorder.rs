//! Per-worker bridge between a live optimization loop and its telemetry.
//!
//! The external trainer calls [`StepHook::on_step`] once per optimization step. A
//! [`SessionRecorder`] turns each call into one durable [`Sample`] and, every
//! `log_interval` steps, one progress line:
//!
//! ```text
//! INFO retrotrack_telemetry::recorder: training progress worker=2 step=5000 elapsed=0:41:07 current_score=3200 max_score=11450
//! ```
//!
//! Recorders own all of their state. A trainer with N parallel environments builds N
//! recorders, each with its own sink, and the series are merged afterwards by
//! [`merge`](crate::aggregate::merge).
//!
//! # Failure policy
//!
//! Telemetry never stops training. A sample the sink cannot store is counted in
//! [`dropped_samples`](SessionRecorder::dropped_samples), logged, and lost. Step metadata without a
//! score is recorded as score `0`. Missing `lives`/`done` information is never treated as the
//! end of a game.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::TelemetryError, extremum::RunningExtremum, sample::Sample, sink::SampleSink,
};

/// Metadata the trainer reports for one step of one environment.
///
/// Every field is optional; unknown fields are ignored when deserializing.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub score: Option<f64>,
    pub lives: Option<u32>,
    pub done: Option<bool>,
}

impl StepInfo {
    #[must_use]
    pub fn with_score(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }

    pub fn score(&self) -> Result<f64, TelemetryError> {
        self.score.ok_or(TelemetryError::MissingField { field: "score" })
    }
}

/// Capability a trainer calls back into after every optimization step.
pub trait StepHook {
    /// Observes one step.
    ///
    /// # Returns
    ///
    /// Whether the trainer should continue.
    fn on_step(&mut self, info: &StepInfo) -> bool;
}

impl<H> StepHook for &mut H
where
    H: StepHook + ?Sized,
{
    fn on_step(&mut self, info: &StepInfo) -> bool {
        (**self).on_step(info)
    }
}

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Stop request shared between an operator and any number of recorders.
///
/// Recorders never set it themselves.
#[derive(Debug, Default, Clone)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Number of steps between two progress lines. `0` is treated as `1`.
    pub log_interval: u64,
    /// Index of the parallel worker this recorder observes. Only used in log lines.
    pub worker: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            log_interval: 1000,
            worker: 0,
        }
    }
}

/// Records one worker's samples for one session.
#[derive(Debug)]
pub struct SessionRecorder<S, C = SystemClock> {
    sink: S,
    clock: C,
    started: Instant,
    log_interval: u64,
    worker: usize,
    extremum: RunningExtremum,
    historical_max: Option<f64>,
    step_count: u64,
    current_score: Option<f64>,
    dropped_samples: u64,
    missing_scores: u64,
    stop: Option<StopSignal>,
}

impl<S> SessionRecorder<S>
where
    S: SampleSink,
{
    /// Creates a recorder whose session starts now.
    pub fn new(sink: S, config: RecorderConfig) -> Self {
        Self::with_clock(sink, config, SystemClock)
    }
}

impl<S, C> SessionRecorder<S, C>
where
    S: SampleSink,
    C: Clock,
{
    /// Creates a recorder reading time from `clock`. The session starts at `clock.now()`.
    pub fn with_clock(sink: S, config: RecorderConfig, clock: C) -> Self {
        let started = clock.now();
        Self {
            sink,
            clock,
            started,
            log_interval: config.log_interval.max(1),
            worker: config.worker,
            extremum: RunningExtremum::new(),
            historical_max: None,
            step_count: 0,
            current_score: None,
            dropped_samples: 0,
            missing_scores: 0,
            stop: None,
        }
    }

    /// Measures elapsed time from `started` instead of the construction time.
    ///
    /// All recorders of one session should share the same start.
    #[must_use]
    pub fn started_at(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    /// Seeds the best score of earlier sessions of the campaign.
    ///
    /// The session maximum still starts unset; this only adds `campaign_max` to progress lines.
    #[must_use]
    pub fn with_historical_max(mut self, historical_max: Option<f64>) -> Self {
        self.historical_max = historical_max;
        self
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    #[must_use]
    pub fn current_score(&self) -> Option<f64> {
        self.current_score
    }

    /// Best score of this session.
    #[must_use]
    pub fn max_score(&self) -> Option<f64> {
        self.extremum.get()
    }

    /// Best score of the whole campaign, including earlier sessions.
    #[must_use]
    pub fn campaign_max(&self) -> Option<f64> {
        match (self.historical_max, self.extremum.get()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Number of samples lost because the sink failed.
    #[must_use]
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    #[must_use]
    pub fn worker(&self) -> usize {
        self.worker
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn extract_score(&mut self, info: &StepInfo) -> f64 {
        match info.score() {
            Ok(score) => score,
            Err(e) => {
                self.missing_scores += 1;
                if self.missing_scores == 1 {
                    tracing::warn!(worker = self.worker, "{e}; recording score 0");
                }
                0.0
            }
        }
    }

    fn log_progress(&self, elapsed: Duration, score: f64, max_score: f64) {
        let elapsed = format_elapsed(elapsed);
        match self.campaign_max() {
            Some(campaign_max) if self.historical_max.is_some() => tracing::info!(
                worker = self.worker,
                step = self.step_count,
                %elapsed,
                current_score = score,
                max_score,
                campaign_max,
                "training progress"
            ),
            _ => tracing::info!(
                worker = self.worker,
                step = self.step_count,
                %elapsed,
                current_score = score,
                max_score,
                "training progress"
            ),
        }
    }
}

impl<S, C> StepHook for SessionRecorder<S, C>
where
    S: SampleSink,
    C: Clock,
{
    fn on_step(&mut self, info: &StepInfo) -> bool {
        self.step_count += 1;

        let score = self.extract_score(info);
        self.current_score = Some(score);
        let max_score = self.extremum.observe(score);

        let elapsed = self.clock.now().saturating_duration_since(self.started);
        let sample = Sample::new(elapsed.as_secs_f64() / 60.0, score);
        if let Err(e) = self.sink.record(sample) {
            self.dropped_samples += 1;
            tracing::warn!(
                worker = self.worker,
                dropped = self.dropped_samples,
                "dropping telemetry sample: {e}"
            );
        }

        if self.step_count % self.log_interval == 0 {
            self.log_progress(elapsed, score, max_score);
        }

        !self.stop.as_ref().is_some_and(StopSignal::is_requested)
    }
}

/// Formats a duration as `H:MM:SS`, truncating fractions of a second.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        io,
        path::PathBuf,
        rc::Rc,
        sync::{Arc, Mutex},
    };

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::sink::MemorySampleSink;

    #[derive(Debug, Clone)]
    struct ManualClock(Rc<Cell<Instant>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Rc::new(Cell::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.0.get()
        }
    }

    #[derive(Debug, Default)]
    struct UnavailableSink;

    impl SampleSink for UnavailableSink {
        fn record(&mut self, _sample: Sample) -> Result<(), TelemetryError> {
            Err(TelemetryError::storage(
                PathBuf::from("unavailable.csv"),
                std::io::Error::other("disk full"),
            ))
        }

        fn export(&self) -> Result<Vec<Sample>, TelemetryError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_records_session_relative_samples() {
        let clock = ManualClock::new();
        let mut recorder = SessionRecorder::with_clock(
            MemorySampleSink::new(),
            RecorderConfig::default(),
            clock.clone(),
        );

        clock.advance(Duration::from_secs(30));
        assert!(recorder.on_step(&StepInfo::with_score(10.0)));
        clock.advance(Duration::from_secs(90));
        assert!(recorder.on_step(&StepInfo::with_score(4.0)));

        assert_eq!(
            recorder.sink().samples(),
            [Sample::new(0.5, 10.0), Sample::new(2.0, 4.0)]
        );
        assert_eq!(recorder.step_count(), 2);
        assert_eq!(recorder.current_score(), Some(4.0));
        assert_eq!(recorder.max_score(), Some(10.0));
    }

    #[test]
    fn test_started_at_shares_session_origin() {
        let clock = ManualClock::new();
        let origin = clock.now();
        clock.advance(Duration::from_secs(60));
        let mut recorder = SessionRecorder::with_clock(
            MemorySampleSink::new(),
            RecorderConfig::default(),
            clock.clone(),
        )
        .started_at(origin);

        recorder.on_step(&StepInfo::with_score(1.0));

        assert_eq!(recorder.sink().samples(), [Sample::new(1.0, 1.0)]);
    }

    #[test]
    fn test_missing_score_is_zero_and_continues() {
        let mut recorder = SessionRecorder::new(MemorySampleSink::new(), RecorderConfig::default());

        let info = StepInfo {
            score: None,
            lives: None,
            done: Some(true),
        };
        assert!(recorder.on_step(&info));
        assert!(recorder.on_step(&StepInfo::default()));

        assert_eq!(recorder.current_score(), Some(0.0));
        assert_eq!(recorder.max_score(), Some(0.0));
        assert!(recorder.sink().samples().iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn test_storage_failure_does_not_stop_training() {
        let mut recorder = SessionRecorder::new(
            UnavailableSink,
            RecorderConfig {
                log_interval: 1,
                worker: 3,
            },
        );

        assert!(recorder.on_step(&StepInfo::with_score(5.0)));
        assert!(recorder.on_step(&StepInfo::with_score(8.0)));

        assert_eq!(recorder.dropped_samples(), 2);
        assert_eq!(recorder.max_score(), Some(8.0));
    }

    #[test]
    fn test_stop_signal_is_honored() {
        let stop = StopSignal::new();
        let mut recorder = SessionRecorder::new(MemorySampleSink::new(), RecorderConfig::default())
            .with_stop_signal(stop.clone());

        assert!(recorder.on_step(&StepInfo::with_score(1.0)));
        stop.request_stop();
        assert!(!recorder.on_step(&StepInfo::with_score(2.0)));
        // the step that observed the stop is still recorded
        assert_eq!(recorder.sink().samples().len(), 2);
    }

    #[test]
    fn test_campaign_max_includes_history() {
        let mut recorder = SessionRecorder::new(MemorySampleSink::new(), RecorderConfig::default())
            .with_historical_max(Some(50.0));
        assert_eq!(recorder.campaign_max(), Some(50.0));
        assert_eq!(recorder.max_score(), None);

        recorder.on_step(&StepInfo::with_score(20.0));
        assert_eq!(recorder.campaign_max(), Some(50.0));
        assert_eq!(recorder.max_score(), Some(20.0));

        recorder.on_step(&StepInfo::with_score(70.0));
        assert_eq!(recorder.campaign_max(), Some(70.0));
    }

    #[derive(Debug, Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn lines_containing(&self, needle: &str) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|line| line.contains(needle))
                .map(str::to_owned)
                .collect()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn with_captured_logs(f: impl FnOnce()) -> CapturedLogs {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        logs
    }

    #[test]
    fn test_progress_line_every_log_interval() {
        let clock = ManualClock::new();
        let mut recorder = SessionRecorder::with_clock(
            MemorySampleSink::new(),
            RecorderConfig {
                log_interval: 3,
                worker: 4,
            },
            clock.clone(),
        );

        let logs = with_captured_logs(|| {
            for score in [5.0, 9.0, 2.0, 1.0, 3.0, 4.0, 8.0] {
                clock.advance(Duration::from_secs(61));
                recorder.on_step(&StepInfo::with_score(score));
            }
        });

        let lines = logs.lines_containing("training progress");
        assert_eq!(lines.len(), 2);
        for field in [
            "worker=4",
            "step=3",
            "elapsed=0:03:03",
            "current_score=2.0",
            "max_score=9.0",
        ] {
            assert!(lines[0].contains(field), "{field} missing from {}", lines[0]);
        }
        assert!(lines[1].contains("step=6"));
        assert!(lines[1].contains("elapsed=0:06:06"));
        assert!(lines[1].contains("current_score=4.0"));
        assert!(!lines[1].contains("campaign_max"));
    }

    #[test]
    fn test_progress_line_reports_campaign_max() {
        let mut recorder = SessionRecorder::new(
            MemorySampleSink::new(),
            RecorderConfig {
                log_interval: 1,
                worker: 0,
            },
        )
        .with_historical_max(Some(50.0));

        let logs = with_captured_logs(|| {
            recorder.on_step(&StepInfo::with_score(20.0));
        });

        let lines = logs.lines_containing("training progress");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("max_score=20.0"));
        assert!(lines[0].contains("campaign_max=50.0"));
    }

    #[test]
    fn test_zero_log_interval_is_clamped() {
        let mut recorder = SessionRecorder::new(
            MemorySampleSink::new(),
            RecorderConfig {
                log_interval: 0,
                worker: 0,
            },
        );
        assert!(recorder.on_step(&StepInfo::with_score(1.0)));
    }

    #[test]
    fn test_step_info_from_json() {
        let info: StepInfo =
            serde_json::from_str(r#"{"score": 120, "lives": 3, "level": 2}"#).unwrap();
        assert_eq!(info.score, Some(120.0));
        assert_eq!(info.lives, Some(3));
        assert_eq!(info.done, None);

        let info: StepInfo = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            info.score(),
            Err(TelemetryError::MissingField { field: "score" })
        ));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(999)), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "0:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(26 * 3600 + 5)), "26:00:05");
    }
}
