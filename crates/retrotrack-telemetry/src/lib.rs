//! Telemetry and continuation bookkeeping for long-running training campaigns.
//!
//! A training campaign runs for days and spans many processes: a run is stopped or crashes,
//! the model is reloaded and training continues. This crate observes the optimization loop of
//! each process and keeps enough durable state to present the whole campaign as one timeline.
//!
//! # Components
//!
//! - [`sink`] - append-only sample stores, one per worker and session
//! - [`extremum`] - running maximum score of a session
//! - [`recorder`] - the per-step hook a trainer calls back into
//! - [`ledger`] - the human-readable record of session start/end/duration
//! - [`reconcile`] - recovery of the campaign state from the ledger at start-up
//! - [`aggregate`] - merging of sample streams into one time-ordered series
//! - [`campaign`] - ties the above together for one session
//!
//! # Control Flow
//!
//! ```text
//! Ledger ──reconcile──▶ PriorCampaign (or fresh)
//!                           │
//!              ┌────────────┼────────────┐
//!     SessionRecorder   SessionRecorder   ...   one per parallel worker
//!              │            │
//!         CsvSampleSink CsvSampleSink     one file per worker and session
//!              └─────merge──┘
//!                    │
//!              series for plotting, then the ledger gets this session's block
//! ```
//!
//! # Failure Policy
//!
//! Nothing here may stop training. Failed sample writes are logged and counted, a malformed
//! ledger is treated as a fresh campaign, and missing step metadata falls back to defaults.
//!
//! # Logging
//!
//! Everything is reported through [`tracing`]. Installing a subscriber is up to the binary.

pub use self::{
    aggregate::{historical_max, merge, offset_series},
    campaign::{Campaign, CampaignSummary, LedgerState, SessionTimer},
    error::TelemetryError,
    extremum::RunningExtremum,
    ledger::{Ledger, SessionLedger, SessionSummary},
    reconcile::{PriorCampaign, reconcile},
    recorder::{RecorderConfig, SessionRecorder, StepHook, StepInfo, StopSignal},
    sample::Sample,
    sink::{CsvSampleSink, MemorySampleSink, SampleSink},
};

pub mod aggregate;
pub mod campaign;
mod error;
pub mod extremum;
pub mod ledger;
pub mod reconcile;
pub mod recorder;
mod sample;
pub mod sink;
