//! Human-readable record of the sessions of a training campaign.
//!
//! The ledger is a plain text file written for people first. The first session of a campaign
//! writes a primary block of three lines; each resumed session appends one continuation line:
//!
//! ```text
//! Inicio del entrenamiento: 2024-01-01 00:00:00
//! Fin del entrenamiento: 2024-01-01 02:00:00
//! Duración del entrenamiento: 120.00 minutos en total.
//! Continuación: inicio 2024-01-02 09:00:00, fin 2024-01-02 09:30:00, duración 30.00 minutos.
//! ```
//!
//! # Parsing
//!
//! Labels differ between the scripts that wrote existing ledgers, so the parser never relies on
//! them or on column offsets. It looks for a timestamp on the first two lines, for a number
//! followed by a minutes unit on the third line, and for the `inicio`/`fin`/`duración` keywords on
//! continuation lines. Lines that do not look like continuations (free-form notes) are
//! ignored. A continuation line that cannot be read makes the whole ledger malformed, since
//! it is usually the trace of a write cut short by a crash.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write as _},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{NaiveDateTime, SubsecRound as _};
use regex::Regex;

use crate::error::TelemetryError;

/// Format of every timestamp in the ledger.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const START_LABEL: &str = "Inicio del entrenamiento";
const END_LABEL: &str = "Fin del entrenamiento";
const DURATION_LABEL: &str = "Duración del entrenamiento";

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})").expect("Invalid timestamp regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*min").expect("Invalid duration regex")
});

static CONTINUATION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*continuaci[oó]n").expect("Invalid continuation prefix regex")
});

static CONTINUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)inicio\s+(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})",
        r".*?fin\s+(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})",
        r".*?duraci[oó]n\s+(-?\d+(?:\.\d+)?)\s*min",
    ))
    .expect("Invalid continuation regex")
});

/// Start, end and duration of one completed session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_minutes: f64,
}

impl SessionSummary {
    /// Creates a summary at the ledger's resolution.
    ///
    /// Timestamps are truncated to whole seconds and the duration is rounded to hundredths of a
    /// minute, so a summary reads back from the ledger exactly as it was written. Negative or
    /// NaN durations become zero.
    #[must_use]
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, duration_minutes: f64) -> Self {
        Self {
            start: start.trunc_subsecs(0),
            end: end.trunc_subsecs(0),
            duration_minutes: round_minutes(duration_minutes),
        }
    }

    fn write_primary(&self, f: &mut impl fmt::Write) -> fmt::Result {
        writeln!(f, "{START_LABEL}: {}", self.start.format(TIMESTAMP_FORMAT))?;
        writeln!(f, "{END_LABEL}: {}", self.end.format(TIMESTAMP_FORMAT))?;
        writeln!(
            f,
            "{DURATION_LABEL}: {:.2} minutos en total.",
            self.duration_minutes
        )
    }

    fn write_continuation(&self, f: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            f,
            "Continuación: inicio {}, fin {}, duración {:.2} minutos.",
            self.start.format(TIMESTAMP_FORMAT),
            self.end.format(TIMESTAMP_FORMAT),
            self.duration_minutes
        )
    }
}

/// Error found while parsing ledger text.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("line {line}: {reason}")]
pub struct LedgerParseError {
    pub line: usize,
    pub reason: String,
}

impl LedgerParseError {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Parsed content of a ledger: the primary block and the continuations in append order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub primary: SessionSummary,
    pub continuations: Vec<SessionSummary>,
}

impl Ledger {
    #[must_use]
    pub fn new(primary: SessionSummary) -> Self {
        Self {
            primary,
            continuations: vec![],
        }
    }

    /// Parses ledger text.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(ledger))` - the text holds a primary block
    /// * `Ok(None)` - the text is empty or blank
    /// * `Err(_)` - the text is not a ledger, or was cut short
    pub fn parse(text: &str) -> Result<Option<Self>, LedgerParseError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let Some(first) = lines.next() else {
            return Ok(None);
        };
        if CONTINUATION_PREFIX.is_match(first.1) {
            return Err(LedgerParseError::new(
                first.0,
                "continuation found before the primary block",
            ));
        }
        let start = parse_timestamp_line(first, "start")?;
        let end = parse_timestamp_line(
            lines
                .next()
                .ok_or_else(|| LedgerParseError::new(first.0 + 1, "missing end line"))?,
            "end",
        )?;
        let (duration_line_no, duration_line) = lines
            .next()
            .ok_or_else(|| LedgerParseError::new(first.0 + 2, "missing duration line"))?;
        let duration_text = DURATION
            .captures(duration_line)
            .and_then(|c| c.get(1))
            .ok_or_else(|| LedgerParseError::new(duration_line_no, "no duration in minutes"))?;
        let duration_minutes = parse_minutes(duration_line_no, duration_text.as_str())?;

        let mut ledger = Self::new(SessionSummary::new(start, end, duration_minutes));
        for (line_no, line) in lines {
            if !CONTINUATION_PREFIX.is_match(line) {
                tracing::debug!(line = line_no, "ignoring non-ledger line");
                continue;
            }
            ledger
                .continuations
                .push(parse_continuation(line_no, line)?);
        }
        Ok(Some(ledger))
    }

    /// Primary block followed by the continuations, in append order.
    pub fn blocks(&self) -> impl Iterator<Item = &SessionSummary> {
        std::iter::once(&self.primary).chain(&self.continuations)
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        1 + self.continuations.len()
    }

    /// Sum of the durations of every block.
    #[must_use]
    pub fn cumulative_minutes(&self) -> f64 {
        self.blocks().map(|b| b.duration_minutes).sum()
    }

    /// End of the most recently appended block.
    #[must_use]
    pub fn last_end(&self) -> NaiveDateTime {
        self.continuations.last().unwrap_or(&self.primary).end
    }

    /// Indices (into [`continuations`](Self::continuations)) of blocks that start before the
    /// previous block ended.
    ///
    /// Such blocks usually come from a skewed clock or a hand-edited ledger. They are reported,
    /// not corrected.
    #[must_use]
    pub fn chronology_gaps(&self) -> Vec<usize> {
        let mut previous_end = self.primary.end;
        let mut gaps = vec![];
        for (i, block) in self.continuations.iter().enumerate() {
            if block.start < previous_end {
                gaps.push(i);
            }
            previous_end = block.end;
        }
        gaps
    }
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.primary.write_primary(f)?;
        for block in &self.continuations {
            block.write_continuation(f)?;
        }
        Ok(())
    }
}

fn round_minutes(minutes: f64) -> f64 {
    // `abs` turns the -0.0 left by rounding tiny negatives into 0.0
    ((minutes * 100.0).round() / 100.0).max(0.0).abs()
}

fn parse_minutes(line_no: usize, text: &str) -> Result<f64, LedgerParseError> {
    let minutes: f64 = text
        .parse()
        .map_err(|e| LedgerParseError::new(line_no, format!("invalid duration: {e}")))?;
    if minutes < 0.0 {
        return Err(LedgerParseError::new(
            line_no,
            format!("negative duration: {text}"),
        ));
    }
    Ok(minutes)
}

fn parse_timestamp_line(
    (line_no, line): (usize, &str),
    what: &str,
) -> Result<NaiveDateTime, LedgerParseError> {
    let text = TIMESTAMP
        .find(line)
        .map(|m| m.as_str())
        .ok_or_else(|| LedgerParseError::new(line_no, format!("no {what} timestamp")))?;
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|e| LedgerParseError::new(line_no, format!("invalid {what} timestamp: {e}")))
}

fn parse_continuation(line_no: usize, line: &str) -> Result<SessionSummary, LedgerParseError> {
    let captures = CONTINUATION
        .captures(line)
        .ok_or_else(|| LedgerParseError::new(line_no, "incomplete continuation"))?;
    let timestamp = |i: usize| {
        NaiveDateTime::parse_from_str(&captures[i], TIMESTAMP_FORMAT).map_err(|e| {
            LedgerParseError::new(line_no, format!("invalid continuation timestamp: {e}"))
        })
    };
    let start = timestamp(1)?;
    let end = timestamp(2)?;
    let duration_minutes = parse_minutes(line_no, &captures[3])?;
    Ok(SessionSummary::new(start, end, duration_minutes))
}

/// A ledger stored in a text file.
///
/// Only the orchestrating process of a session should write the ledger. Appends from several
/// processes are not serialized.
#[derive(Debug, Clone)]
pub struct SessionLedger {
    path: PathBuf,
}

impl SessionLedger {
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a new campaign, replacing any previous ledger content.
    pub fn write_primary(&self, summary: &SessionSummary) -> Result<(), TelemetryError> {
        let mut text = String::new();
        summary
            .write_primary(&mut text)
            .map_err(|_| TelemetryError::storage(&self.path, io::Error::other("format error")))?;
        self.create_parent()?;
        fs::write(&self.path, text).map_err(|e| TelemetryError::storage(&self.path, e))
    }

    /// Appends a continuation block. The file is created if it does not exist.
    pub fn append_continuation(&self, summary: &SessionSummary) -> Result<(), TelemetryError> {
        let mut text = String::new();
        if self.ends_without_newline()? {
            text.push('\n');
        }
        summary
            .write_continuation(&mut text)
            .map_err(|_| TelemetryError::storage(&self.path, io::Error::other("format error")))?;
        self.create_parent()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(text.as_bytes()))
            .map_err(|e| TelemetryError::storage(&self.path, e))
    }

    /// Reads and parses the ledger.
    ///
    /// A missing or blank file is `Ok(None)`.
    pub fn read(&self) -> Result<Option<Ledger>, TelemetryError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TelemetryError::storage(&self.path, e)),
        };
        Ledger::parse(&text).map_err(|e| TelemetryError::MalformedLedger {
            path: self.path.clone(),
            line: e.line,
            reason: e.reason,
        })
    }

    /// Whether the ledger file exists and holds anything besides whitespace.
    pub fn has_content(&self) -> Result<bool, TelemetryError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(!text.trim().is_empty()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TelemetryError::storage(&self.path, e)),
        }
    }

    fn ends_without_newline(&self) -> Result<bool, TelemetryError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes.last().is_some_and(|&b| b != b'\n')),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TelemetryError::storage(&self.path, e)),
        }
    }

    fn create_parent(&self) -> Result<(), TelemetryError> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| TelemetryError::storage(parent, e))
            }
            None => Ok(()),
        }
    }
}
