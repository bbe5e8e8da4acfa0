//! Append-only stores of [`Sample`]s.
//!
//! A sink belongs to exactly one session-run and one worker. Workers never share a sink, so
//! none of the implementations here lock.
//!
//! # File format
//!
//! [`CsvSampleSink`] writes a two-column CSV table, `elapsed_minutes,score`, preceded by a
//! header row when the file is created:
//!
//! ```text
//! Time (minutes),Score
//! 0.0016,0.0
//! 0.0033,120.0
//! ```
//!
//! Readers accept the table with or without the header row.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use crate::{error::TelemetryError, sample::Sample};

/// Header written as the first row of a fresh sample table.
pub const SERIES_HEADER: [&str; 2] = ["Time (minutes)", "Score"];

/// Durable, append-only storage of one session's samples.
pub trait SampleSink {
    /// Appends a sample.
    ///
    /// When this returns `Ok`, the sample is stored and will survive the process being killed.
    fn record(&mut self, sample: Sample) -> Result<(), TelemetryError>;

    /// Returns every sample recorded so far, in write order.
    fn export(&self) -> Result<Vec<Sample>, TelemetryError>;
}

impl<S> SampleSink for &mut S
where
    S: SampleSink + ?Sized,
{
    fn record(&mut self, sample: Sample) -> Result<(), TelemetryError> {
        (**self).record(sample)
    }

    fn export(&self) -> Result<Vec<Sample>, TelemetryError> {
        (**self).export()
    }
}

impl<S> SampleSink for Box<S>
where
    S: SampleSink + ?Sized,
{
    fn record(&mut self, sample: Sample) -> Result<(), TelemetryError> {
        (**self).record(sample)
    }

    fn export(&self) -> Result<Vec<Sample>, TelemetryError> {
        (**self).export()
    }
}

/// A sample table stored in a CSV file.
///
/// Every [`record`](SampleSink::record) call opens the file in append mode, writes one row and
/// closes it again. Nothing is buffered between calls.
#[derive(Debug, Clone)]
pub struct CsvSampleSink {
    path: PathBuf,
    header: bool,
}

impl CsvSampleSink {
    /// Creates a sink backed by `path`. The file is created lazily on the first write.
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            path: path.into(),
            header: true,
        }
    }

    /// Disables the header row for files created by this sink.
    #[must_use]
    pub fn without_header(mut self) -> Self {
        self.header = false;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, sample: Sample) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new && self.header {
            writer.write_record(SERIES_HEADER)?;
        }
        writer.serialize(sample)?;
        writer.flush()?;
        Ok(())
    }
}

impl SampleSink for CsvSampleSink {
    fn record(&mut self, sample: Sample) -> Result<(), TelemetryError> {
        self.append(sample)
            .map_err(|e| TelemetryError::storage(&self.path, e))
    }

    fn export(&self) -> Result<Vec<Sample>, TelemetryError> {
        match File::open(&self.path) {
            Ok(file) => read_samples(&self.path, file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(TelemetryError::storage(&self.path, e)),
        }
    }
}

/// A sink that keeps its samples in memory.
///
/// Useful when the samples are consumed in-process, and as a test double.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemorySampleSink {
    samples: Vec<Sample>,
}

impl MemorySampleSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl FromIterator<Sample> for MemorySampleSink {
    fn from_iter<T: IntoIterator<Item = Sample>>(iter: T) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl SampleSink for MemorySampleSink {
    fn record(&mut self, sample: Sample) -> Result<(), TelemetryError> {
        self.samples.push(sample);
        Ok(())
    }

    fn export(&self) -> Result<Vec<Sample>, TelemetryError> {
        Ok(self.samples.clone())
    }
}

/// Reads a sample table from a CSV file.
///
/// The header row is optional. Rows that cannot be read as two numbers, such as a line cut
/// short by a crash, are skipped with a warning.
pub fn read_series_csv<P>(path: P) -> Result<Vec<Sample>, TelemetryError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TelemetryError::storage(path, e))?;
    read_samples(path, file)
}

/// Writes a whole series to `path`, replacing any previous content.
///
/// The table starts with [`SERIES_HEADER`].
pub fn write_series_csv<P>(path: P, samples: &[Sample]) -> Result<(), TelemetryError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TelemetryError::storage(parent, e))?;
    }
    let file = File::create(path).map_err(|e| TelemetryError::storage(path, e))?;
    write_series(file, samples).map_err(|e| TelemetryError::storage(path, e))
}

/// Writes a whole series, header first, to an arbitrary writer.
pub fn write_series<W>(writer: W, samples: &[Sample]) -> io::Result<()>
where
    W: io::Write,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(SERIES_HEADER)?;
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()
}

fn read_samples(path: &Path, file: File) -> Result<Vec<Sample>, TelemetryError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut samples = vec![];
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TelemetryError::storage(path, e.into()))?;
        match parse_row(&record) {
            Some(sample) => samples.push(sample),
            // header row
            None if index == 0 => {}
            None => {
                tracing::warn!(
                    path = %path.display(),
                    row = index + 1,
                    "skipping unreadable sample row"
                );
            }
        }
    }
    Ok(samples)
}

fn parse_row(record: &csv::StringRecord) -> Option<Sample> {
    if record.len() != 2 {
        return None;
    }
    let elapsed_minutes = record.get(0)?.trim().parse().ok()?;
    let score = record.get(1)?.trim().parse().ok()?;
    Some(Sample::new(elapsed_minutes, score))
}
