//! Output destinations
//!
//! A [`Sink`] decides which events it accepts and delivers them. File and
//! email sinks receive text rendered by the [`FormatterManager`]; collector
//! and APM sinks serialize the event to JSON and hand it to an
//! [`EventTransport`].
//!
//! [`FormatterManager`]: crate::format::FormatterManager

mod email;
mod file;
mod memory;
mod wire;

pub use email::{
    BackgroundMailTransport, EmailOptions, EmailSink, MailMessage, MailTransport,
    MemoryMailTransport,
};
pub use file::{DailyFileWriter, FileLogKind, FileSink};
pub use memory::MemorySink;
pub use wire::{
    apm_payload, collector_payload, ApmSink, BackgroundTransport, CollectorSink, EventTransport,
    MemoryTransport, DEFAULT_QUEUE_CAPACITY,
};

use crate::error::SinkError;
use crate::record::{LogEvent, LogLevel, RecordKind};
use std::fmt;
use std::sync::Arc;

/// Inclusion predicate of a sink
#[derive(Clone)]
pub enum SinkFilter {
    /// Every event
    All,
    /// Exception records at `Error` or above
    ExceptionErrors,
    /// Custom-message records at `Information`, or `Warning` for slow requests
    RequestMessages,
    /// Events at `Error` or above that are not policy-validation rejections
    SystemErrors,
    /// Any predicate
    Custom(Arc<dyn Fn(&LogEvent) -> bool + Send + Sync>),
}

impl SinkFilter {
    /// Whether `event` passes the filter
    pub fn matches(&self, event: &LogEvent) -> bool {
        match self {
            Self::All => true,
            Self::ExceptionErrors => {
                event.kind() == RecordKind::Exception && event.level() >= LogLevel::Error
            }
            Self::RequestMessages => {
                event.kind() == RecordKind::CustomMessage
                    && matches!(event.level(), LogLevel::Information | LogLevel::Warning)
            }
            Self::SystemErrors => {
                event.level() >= LogLevel::Error && !event.record.is_policy_validation()
            }
            Self::Custom(predicate) => predicate(event),
        }
    }
}

impl fmt::Debug for SinkFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::ExceptionErrors => f.write_str("ExceptionErrors"),
            Self::RequestMessages => f.write_str("RequestMessages"),
            Self::SystemErrors => f.write_str("SystemErrors"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// An output destination with its own inclusion filter
pub trait Sink: Send + Sync {
    /// Unique sink name
    fn name(&self) -> &str;

    /// Events below this level are never delivered
    fn minimum_level(&self) -> Option<LogLevel> {
        None
    }

    /// Whether this sink wants `event`
    fn accepts(&self, event: &LogEvent) -> bool;

    /// Deliver `event`; must not block on slow destinations
    fn emit(&self, event: &LogEvent) -> Result<(), SinkError>;
}

/// Minimum level and filter check combined
pub fn should_emit(sink: &dyn Sink, event: &LogEvent) -> bool {
    if let Some(minimum) = sink.minimum_level() {
        if event.level() < minimum {
            return false;
        }
    }
    sink.accepts(event)
}
