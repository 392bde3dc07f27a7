//! # logweave-http
//!
//! Request/response logging for HTTP services built on the `http` crate.
//!
//! [`RequestLoggingLayer`] assigns every request a correlation ID, captures
//! redacted request and response snapshots and hands one structured record
//! per request to a [`logweave_core::Dispatcher`]. Handlers reach the same
//! correlation ID through [`Request::correlation_id`] or by binding a
//! [`logweave_core::Logger`] to the request extensions.
//!
//! Layers compose through [`LayerStack`]; a stack can also be served as a
//! tower service with [`LayerStack::service`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod middleware;
pub mod request;
pub mod response;

pub use error::{BoxError, HandlerResult};
pub use middleware::{
    handler_fn, BoxedNext, LayerStack, MiddlewareLayer, NextService, RequestLoggingLayer,
};
pub use request::Request;
pub use response::{IntoResponse, Response};
