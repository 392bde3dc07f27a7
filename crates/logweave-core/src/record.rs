//! Structured log records
//!
//! A [`LogRecord`] is the canonical shape of one log entry. Its kind is fixed
//! by the [`RecordBody`] variant chosen at construction and decides which
//! formatter renders it and which sinks accept it.

use crate::properties::PropertySet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Severity of a log event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, serde::Deserialize)]
pub enum LogLevel {
    /// Very detailed tracing output
    Verbose,
    /// Debugging output
    Debug,
    /// Normal operational messages
    Information,
    /// Something unexpected that did not fail the request
    Warning,
    /// A failure of the current operation
    Error,
    /// A failure of the whole process
    Fatal,
}

impl LogLevel {
    /// Short name as rendered in text blocks
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verbose => "Verbose",
            Self::Debug => "Debug",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind tag of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    /// An error caught by application code
    Exception,
    /// A free-form message, including per-request records from the middleware
    CustomMessage,
    /// A payload logged on behalf of a remote caller
    ApiCall,
}

impl RecordKind {
    /// Name used for the `LogType` tag on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exception => "Exception",
            Self::CustomMessage => "CustomMessage",
            Self::ApiCall => "ApiCall",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields specific to exception records
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Error message
    pub message: String,
    /// Captured call parameters, in declaration order
    pub function_parameters: Vec<(String, Value)>,
    /// Backtrace at the logging site, when captured
    pub stack_trace: Option<String>,
    /// Message of the underlying cause
    pub inner_message: Option<String>,
    /// `Debug` representation of the underlying cause
    pub inner_detail: Option<String>,
    /// Whether the fault is an expected business-rule rejection
    pub is_policy_validation: bool,
}

/// Kind-specific payload of a record
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum RecordBody {
    /// Exception record
    Exception(ExceptionDetails),
    /// Custom message record
    CustomMessage {
        /// Message text
        message: String,
    },
    /// API call record
    ApiCall {
        /// Caller-supplied payload
        payload: BTreeMap<String, Option<String>>,
        /// Whether the remote call reported an exception
        #[serde(rename = "isException")]
        is_exception: bool,
    },
}

/// One structured log entry
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    correlation_id: Option<String>,
    route: Option<String>,
    source: String,
    function_name: String,
    #[serde(flatten)]
    body: RecordBody,
}

impl LogRecord {
    fn with_body(
        level: LogLevel,
        source: impl Into<String>,
        function_name: impl Into<String>,
        body: RecordBody,
    ) -> Self {
        Self {
            timestamp: monotonic_now(),
            level,
            correlation_id: None,
            route: None,
            source: source.into(),
            function_name: function_name.into(),
            body,
        }
    }

    /// Create an exception record at `Error` level
    pub fn exception(
        source: impl Into<String>,
        function_name: impl Into<String>,
        details: ExceptionDetails,
    ) -> Self {
        Self::with_body(
            LogLevel::Error,
            source,
            function_name,
            RecordBody::Exception(details),
        )
    }

    /// Create a custom message record at `Information` level
    pub fn custom_message(
        source: impl Into<String>,
        function_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::with_body(
            LogLevel::Information,
            source,
            function_name,
            RecordBody::CustomMessage {
                message: message.into(),
            },
        )
    }

    /// Create an API call record; `Error` level when the call reported an exception
    pub fn api_call(
        source: impl Into<String>,
        function_name: impl Into<String>,
        payload: BTreeMap<String, Option<String>>,
        is_exception: bool,
    ) -> Self {
        let level = if is_exception {
            LogLevel::Error
        } else {
            LogLevel::Information
        };
        Self::with_body(
            level,
            source,
            function_name,
            RecordBody::ApiCall {
                payload,
                is_exception,
            },
        )
    }

    /// Set the correlation ID (builder style, only if none is set yet)
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.assign_correlation_id(id);
        self
    }

    /// Set the route
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Override the level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Assign a correlation ID if the record does not carry one yet.
    ///
    /// Returns `true` when the ID was assigned.
    pub fn assign_correlation_id(&mut self, id: impl Into<String>) -> bool {
        if self.correlation_id.is_some() {
            return false;
        }
        self.correlation_id = Some(id.into());
        true
    }

    /// Construction time (UTC)
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Severity
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Kind tag
    pub fn kind(&self) -> RecordKind {
        match self.body {
            RecordBody::Exception(_) => RecordKind::Exception,
            RecordBody::CustomMessage { .. } => RecordKind::CustomMessage,
            RecordBody::ApiCall { .. } => RecordKind::ApiCall,
        }
    }

    /// Correlation ID
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Route
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Emitting component
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Emitting operation
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Kind-specific body
    pub fn body(&self) -> &RecordBody {
        &self.body
    }

    /// Primary message text for every kind
    pub fn message(&self) -> String {
        match &self.body {
            RecordBody::Exception(details) => details.message.clone(),
            RecordBody::CustomMessage { message } => message.clone(),
            RecordBody::ApiCall { is_exception, .. } => {
                if *is_exception {
                    "API call reported an exception".to_string()
                } else {
                    "API call".to_string()
                }
            }
        }
    }

    /// Exception details, for exception records
    pub fn exception_details(&self) -> Option<&ExceptionDetails> {
        match &self.body {
            RecordBody::Exception(details) => Some(details),
            _ => None,
        }
    }

    /// Whether this is an exception flagged as a business-rule rejection
    pub fn is_policy_validation(&self) -> bool {
        self.exception_details()
            .map(|d| d.is_policy_validation)
            .unwrap_or(false)
    }
}

/// Native representation of an error attached to an exception event
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorReport {
    /// Display text of the top-level error
    pub message: String,
    /// Display text of every `source()` in the chain, outermost first
    pub chain: Vec<String>,
    /// `Debug` representation of the top-level error
    pub debug: String,
}

impl ErrorReport {
    /// Capture an error and its source chain
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut current = error.source();
        while let Some(cause) = current {
            chain.push(cause.to_string());
            current = cause.source();
        }
        Self {
            message: error.to_string(),
            chain,
            debug: format!("{:?}", error),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for cause in &self.chain {
            write!(f, "\n  caused by: {}", cause)?;
        }
        write!(f, "\n{}", self.debug)
    }
}

/// A record together with its enrichment properties; the unit handed to sinks
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEvent {
    /// The record
    pub record: LogRecord,
    /// Properties attached by enrichers and the middleware
    pub properties: PropertySet,
    /// Native error, for exception events
    pub error: Option<ErrorReport>,
}

impl LogEvent {
    /// Wrap a record with an empty property set
    pub fn new(record: LogRecord) -> Self {
        Self {
            record,
            properties: PropertySet::new(),
            error: None,
        }
    }

    /// Attach a native error report
    pub fn with_error(mut self, error: ErrorReport) -> Self {
        self.error = Some(error);
        self
    }

    /// Shorthand for the record's level
    pub fn level(&self) -> LogLevel {
        self.record.level()
    }

    /// Shorthand for the record's kind
    pub fn kind(&self) -> RecordKind {
        self.record.kind()
    }
}

static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current UTC time, clamped so it never runs backwards within the process.
fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now();
    let micros = now.timestamp_micros();
    let previous = LAST_TIMESTAMP_MICROS.fetch_max(micros, Ordering::AcqRel);
    if previous <= micros {
        return now;
    }
    DateTime::from_timestamp(
        previous.div_euclid(1_000_000),
        (previous.rem_euclid(1_000_000) * 1_000) as u32,
    )
    .unwrap_or(now)
}
