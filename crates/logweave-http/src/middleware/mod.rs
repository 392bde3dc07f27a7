//! Middleware chain and the request/response logging layer
//!
//! # Example
//!
//! ```rust,ignore
//! use logweave_http::middleware::{handler_fn, LayerStack, RequestLoggingLayer};
//!
//! let stack = LayerStack::new().layer(RequestLoggingLayer::new(dispatcher));
//! let response = stack.execute(request, handler_fn(handler)).await?;
//! ```

mod capture;
mod layer;
mod logging;

pub use layer::{handler_fn, BoxedNext, LayerStack, MiddlewareLayer, NextService, ResponseFuture};
pub use logging::{expose_header, RequestLoggingLayer};
