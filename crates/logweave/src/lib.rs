//! # logweave
//!
//! Structured logging for HTTP services.
//!
//! Every request gets a correlation ID. Records produced while handling it
//! (the request/response record written by the middleware, plus the
//! exceptions and messages application code logs through [`Logger`]) are
//! enriched with request, process and host properties, redacted, rendered
//! and fanned out to the configured sinks.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use logweave::prelude::*;
//! use std::sync::Arc;
//!
//! let settings = Settings::from_env()?;
//! let dispatcher = Arc::new(
//!     LoggerBuilder::from_settings(settings)
//!         .write_to_file("./logs")
//!         .build(SinkServices::new())?,
//! );
//!
//! let stack = LayerStack::new().layer(RequestLoggingLayer::new(dispatcher.clone()));
//! let logger = Logger::new(dispatcher);
//!
//! async fn get_order(req: Request, logger: Logger) -> HandlerResult {
//!     let logger = logger.for_extensions(req.extensions());
//!     logger.log_custom_message("loading order", caller!());
//!     Ok("order".into_response())
//! }
//! ```
//!
//! ## Crates
//!
//! - `logweave-core`: records, enrichers, formatters, sinks, dispatcher and facade
//! - `logweave-http`: middleware chain and the request/response logging layer

pub mod diagnostics;

pub use logweave_core::*;
pub use logweave_http as http;
pub use logweave_http::{
    handler_fn, BoxError, BoxedNext, HandlerResult, IntoResponse, LayerStack, MiddlewareLayer,
    NextService, Request, RequestLoggingLayer, Response,
};

// Re-exports for user convenience
pub use serde;
pub use serde_json;
pub use tracing;

/// Prelude module - import everything you need with `use logweave::prelude::*`
pub mod prelude {
    pub use logweave_core::sink::{
        EmailOptions, EventTransport, MailMessage, MailTransport, MemoryMailTransport, MemorySink,
        MemoryTransport,
    };
    pub use logweave_core::{
        caller, log_error, CallerContext, Dispatcher, LogEvent, LogLevel, Logger, LoggerBuilder,
        LogweaveError, RecordKind, RedactionPolicy, RemoteFault, ServiceResponse, Settings, Sink,
        SinkError, SinkFilter, SinkServices,
    };
    pub use logweave_http::{
        handler_fn, BoxError, BoxedNext, HandlerResult, IntoResponse, LayerStack, MiddlewareLayer,
        Request, RequestLoggingLayer, Response,
    };
}
