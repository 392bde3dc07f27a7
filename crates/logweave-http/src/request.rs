//! Request type seen by the middleware chain

use bytes::Bytes;
use http::{request::Parts, Extensions, HeaderMap, Method, Uri, Version};
use logweave_core::RequestContext;
use std::sync::Arc;

/// HTTP request with a fully buffered body.
///
/// The body stays readable for every layer: inspecting it never consumes it
/// for the handler further down the chain.
pub struct Request {
    parts: Parts,
    body: Bytes,
}

impl Request {
    /// Create a request from parts and a buffered body
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    /// Get the HTTP method
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Get the URI
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.parts.version
    }

    /// Get the headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Get mutable headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    /// Get request extensions
    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    /// Get mutable extensions
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// Get the query string
    pub fn query_string(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    /// Request head
    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    /// Buffered body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replace the body
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Value of a header as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Shared logging context stored by the logging middleware
    pub fn log_context(&self) -> Option<Arc<RequestContext>> {
        RequestContext::from_extensions(&self.parts.extensions)
    }

    /// Correlation ID assigned to this request
    pub fn correlation_id(&self) -> Option<String> {
        self.log_context()
            .and_then(|ctx| ctx.correlation_id().map(String::from))
    }

    /// Split into head and body
    pub fn into_parts(self) -> (Parts, Bytes) {
        (self.parts, self.body)
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body)
    }
}

impl From<Request> for http::Request<Bytes> {
    fn from(request: Request) -> Self {
        http::Request::from_parts(request.parts, request.body)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("version", &self.parts.version)
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_survives_inspection() {
        let request: Request = http::Request::builder()
            .method(Method::POST)
            .uri("/orders?page=2")
            .body(Bytes::from_static(b"{\"id\":1}"))
            .unwrap()
            .into();

        assert_eq!(request.body().len(), 8);
        assert_eq!(request.body().len(), 8);
        assert_eq!(request.path(), "/orders");
        assert_eq!(request.query_string(), Some("page=2"));

        let (_, body) = request.into_parts();
        assert_eq!(&body[..], b"{\"id\":1}");
    }

    #[test]
    fn test_correlation_id_from_context() {
        let mut request: Request = http::Request::builder()
            .uri("/")
            .body(Bytes::new())
            .unwrap()
            .into();
        assert!(request.correlation_id().is_none());

        let ctx = Arc::new(RequestContext::from_parts(request.parts()));
        ctx.set_correlation_id("abc-123");
        request.extensions_mut().insert(ctx);
        assert_eq!(request.correlation_id().as_deref(), Some("abc-123"));
    }
}
