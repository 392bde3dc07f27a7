//! Errors flowing through the middleware chain

use crate::response::Response;

/// Error returned by a downstream handler.
///
/// Layers pass it through untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a handler or middleware
pub type HandlerResult = Result<Response, BoxError>;
