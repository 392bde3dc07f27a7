//! # logweave-core
//!
//! The structured logging pipeline: record model, enrichers, formatters,
//! sinks, the dispatcher that wires them together and the facade handlers
//! call.
//!
//! This crate has no HTTP server dependency. The request/response
//! middleware lives in `logweave-http`; most applications depend on the
//! `logweave` crate, which re-exports both.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod enrich;
mod error;
pub mod facade;
pub mod format;
mod properties;
pub mod record;
pub mod redaction;
pub mod sink;

pub use config::Settings;
pub use context::{
    EnrichmentContext, RequestContext, RequestSnapshot, ResponseSnapshot, TraceContext,
    UploadedFile, UserIdentity,
};
pub use dispatcher::{DispatchReport, Dispatcher, LoggerBuilder, SinkServices};
pub use enrich::{CompositeEnricher, Enricher, EnricherDescriptor};
pub use error::{EnrichError, LogweaveError, Result, SinkError};
pub use facade::{CallerContext, Logger, RemoteFault, ServiceResponse};
pub use format::{Formatter, FormatterManager};
pub use properties::PropertySet;
pub use record::{ErrorReport, ExceptionDetails, LogEvent, LogLevel, LogRecord, RecordBody, RecordKind};
pub use redaction::RedactionPolicy;
pub use sink::{Sink, SinkFilter};
