use std::{io, path::PathBuf};

/// Errors raised by the telemetry subsystem.
///
/// None of these is allowed to abort a training loop. [`SessionRecorder`](crate::recorder::SessionRecorder)
/// and [`reconcile`](crate::reconcile::reconcile) recover from them locally; the remaining
/// APIs surface them so that callers outside the hot path can decide.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum TelemetryError {
    /// A durable read or write failed (disk full, permission denied, file locked, ...).
    #[display("storage unavailable: {}: {source}", path.display())]
    StorageUnavailable { path: PathBuf, source: io::Error },
    /// The ledger text does not have the expected structure.
    #[display("malformed ledger {} at line {line}: {reason}", path.display())]
    MalformedLedger {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    /// Step metadata lacks a field the recorder expects.
    #[display("step metadata has no `{field}` field")]
    MissingField { field: &'static str },
}

impl TelemetryError {
    pub(crate) fn storage<P>(path: P, source: io::Error) -> Self
    where
        P: Into<PathBuf>,
    {
        Self::StorageUnavailable {
            path: path.into(),
            source,
        }
    }
}
