use super::{Sink, SinkFilter};
use crate::error::SinkError;
use crate::format::FormatterManager;
use crate::record::{LogEvent, LogLevel};
use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Which of the two file layouts a sink writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileLogKind {
    /// `<base>/ErrorsLogs/error-<yyyyMMdd>.log`
    Errors,
    /// `<base>/RequestsLogs/request-<yyyyMMdd>.log`
    Requests,
}

impl FileLogKind {
    fn directory(&self) -> &'static str {
        match self {
            Self::Errors => "ErrorsLogs",
            Self::Requests => "RequestsLogs",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Self::Errors => "error",
            Self::Requests => "request",
        }
    }

    fn sink_name(&self) -> &'static str {
        match self {
            Self::Errors => "file-errors",
            Self::Requests => "file-requests",
        }
    }

    fn filter(&self) -> SinkFilter {
        match self {
            Self::Errors => SinkFilter::ExceptionErrors,
            Self::Requests => SinkFilter::RequestMessages,
        }
    }
}

struct OpenFile {
    date: NaiveDate,
    file: File,
}

/// Appends text to one file per UTC day.
///
/// Writes are serialized by an internal mutex; the file for a new day is
/// opened on the first write dated that day.
pub struct DailyFileWriter {
    directory: PathBuf,
    prefix: String,
    current: Mutex<Option<OpenFile>>,
}

impl DailyFileWriter {
    /// Writer producing `<directory>/<prefix>-<yyyyMMdd>.log`
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            current: Mutex::new(None),
        }
    }

    /// Path of the file for `date`
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{}-{}.log", self.prefix, date.format("%Y%m%d")))
    }

    /// Directory holding the files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Append `text` to the file for `date`
    pub fn write(&self, date: NaiveDate, text: &str) -> std::io::Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        let needs_open = current.as_ref().map(|open| open.date != date).unwrap_or(true);
        if needs_open {
            std::fs::create_dir_all(&self.directory)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(date))?;
            *current = Some(OpenFile { date, file });
        }

        match current.as_mut() {
            Some(open) => {
                open.file.write_all(text.as_bytes())?;
                open.file.flush()
            }
            None => Ok(()),
        }
    }
}

/// Writes rendered blocks to the daily error or request log
pub struct FileSink {
    name: String,
    kind: FileLogKind,
    writer: DailyFileWriter,
    formatter: Arc<FormatterManager>,
    filter: SinkFilter,
    minimum_level: Option<LogLevel>,
}

impl FileSink {
    /// Sink for `kind` under `base`
    pub fn new(base: impl AsRef<Path>, kind: FileLogKind, formatter: Arc<FormatterManager>) -> Self {
        let directory = base.as_ref().join(kind.directory());
        Self {
            name: kind.sink_name().to_string(),
            kind,
            writer: DailyFileWriter::new(directory, kind.prefix()),
            formatter,
            filter: kind.filter(),
            minimum_level: None,
        }
    }

    /// Exception sink: `<base>/ErrorsLogs/error-<date>.log`
    pub fn errors(base: impl AsRef<Path>, formatter: Arc<FormatterManager>) -> Self {
        Self::new(base, FileLogKind::Errors, formatter)
    }

    /// Request sink: `<base>/RequestsLogs/request-<date>.log`
    pub fn requests(base: impl AsRef<Path>, formatter: Arc<FormatterManager>) -> Self {
        Self::new(base, FileLogKind::Requests, formatter)
    }

    /// Set a minimum level
    pub fn with_minimum_level(mut self, level: Option<LogLevel>) -> Self {
        self.minimum_level = level;
        self
    }

    /// Layout written by this sink
    pub fn kind(&self) -> FileLogKind {
        self.kind
    }

    /// Path of the file for `date`
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.writer.path_for(date)
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimum_level(&self) -> Option<LogLevel> {
        self.minimum_level
    }

    fn accepts(&self, event: &LogEvent) -> bool {
        self.filter.matches(event)
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        let text = self.formatter.format_log_event(event);
        let date = event.record.timestamp().date_naive();
        self.writer
            .write(date, &text)
            .map_err(|e| SinkError::write(&self.name, e))
    }
}
