//! Per-request context threaded through the pipeline
//!
//! The middleware creates one [`RequestContext`] per request and places it in
//! the request extensions as an `Arc`. Handlers pass it to the logging facade
//! and enrichers read it through an [`EnrichmentContext`]; no global state is
//! involved.

use http::{request::Parts, Extensions, HeaderMap, Method, StatusCode, Uri, Version};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

/// W3C `traceparent` header name
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Distributed tracing identifiers active for a request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// Trace ID (32 hex chars)
    pub trace_id: String,
    /// Span ID (16 hex chars)
    pub span_id: String,
    /// Parent span ID, if this is a child span
    pub parent_span_id: Option<String>,
    /// Operation name, if known
    pub operation_name: Option<String>,
    /// Sampled flag
    pub sampled: bool,
}

impl TraceContext {
    /// Parse a W3C `traceparent` header value (`00-<trace>-<span>-<flags>`).
    ///
    /// The span in the header belongs to the caller, so it becomes the
    /// parent and a fresh span ID is generated for this hop.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.trim().split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }
        let (trace_id, parent_span, flags) = (parts[1], parts[2], parts[3]);
        if trace_id.len() != 32 || !is_hex(trace_id) || trace_id.bytes().all(|b| b == b'0') {
            return None;
        }
        if parent_span.len() != 16 || !is_hex(parent_span) {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_lowercase(),
            span_id: generate_span_id(),
            parent_span_id: Some(parent_span.to_lowercase()),
            operation_name: None,
            sampled: flags & 0x01 == 0x01,
        })
    }

    /// Set the operation name
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn generate_span_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

/// Authenticated caller identity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserIdentity {
    /// User name or subject
    pub name: String,
    /// Roles granted to the user
    pub roles: Vec<String>,
    /// Authentication scheme
    pub authentication_type: Option<String>,
}

impl UserIdentity {
    /// Create an identity with no roles
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

/// Immutable view of an inbound request plus its once-assigned correlation ID
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    user: Option<UserIdentity>,
    trace: Option<TraceContext>,
    session_id: Option<String>,
    connection_id: Option<String>,
    route: Option<String>,
    correlation_id: OnceLock<String>,
}

impl RequestContext {
    /// Create a context for a method and URI
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote_addr: None,
            user: None,
            trace: None,
            session_id: None,
            connection_id: None,
            route: None,
            correlation_id: OnceLock::new(),
        }
    }

    /// Build from request parts, picking up the identity, trace context and
    /// remote address other layers may have stored in the extensions
    pub fn from_parts(parts: &Parts) -> Self {
        let mut ctx = Self::new(parts.method.clone(), parts.uri.clone())
            .with_version(parts.version)
            .with_headers(parts.headers.clone());
        ctx.remote_addr = parts.extensions.get::<SocketAddr>().copied();
        ctx.user = parts.extensions.get::<UserIdentity>().cloned();
        ctx.trace = parts.extensions.get::<TraceContext>().cloned().or_else(|| {
            parts
                .headers
                .get(TRACEPARENT_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(TraceContext::from_traceparent)
        });
        ctx
    }

    /// Fetch the shared context the middleware stored in the extensions
    pub fn from_extensions(extensions: &Extensions) -> Option<Arc<RequestContext>> {
        extensions.get::<Arc<RequestContext>>().cloned()
    }

    /// Set the HTTP version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Replace the headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the remote address
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set the authenticated user
    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }

    /// Set the trace context
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Set the session ID
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set the connection ID
    pub fn with_connection_id(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }

    /// Set the matched route template
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Query string
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Remote socket address
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Authenticated user
    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Trace context
    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    /// Session ID
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Connection ID
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Route template, falling back to the raw path
    pub fn route(&self) -> &str {
        self.route.as_deref().unwrap_or_else(|| self.uri.path())
    }

    /// Correlation ID assigned to this request, if any
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.get().map(String::as_str)
    }

    /// Assign the correlation ID.
    ///
    /// The first assignment wins for the lifetime of the request; the
    /// returned value is always the one in effect.
    pub fn set_correlation_id(&self, id: impl Into<String>) -> &str {
        let mut candidate = Some(id.into());
        self.correlation_id
            .get_or_init(|| candidate.take().unwrap_or_default())
    }

    /// Client IP, preferring proxy headers over the socket address.
    ///
    /// Only the first hop of a comma-separated `X-Forwarded-For` is used.
    pub fn client_ip(&self) -> Option<String> {
        ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"]
            .iter()
            .filter_map(|name| self.header(name))
            .filter_map(|v| v.split(',').next())
            .map(str::trim)
            .find(|ip| !ip.is_empty())
            .map(String::from)
            .or_else(|| self.remote_addr.map(|addr| addr.ip().to_string()))
    }
}

/// Uploaded file descriptor captured from a multipart request
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct UploadedFile {
    /// Form field name
    pub field: String,
    /// Client-supplied file name
    pub file_name: String,
}

/// Snapshot of the request taken by the middleware
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Redacted query string
    pub query: Option<String>,
    /// Captured body, redacted and truncated
    pub body: Option<String>,
    /// Names of uploaded files
    pub file_names: Vec<String>,
}

/// Snapshot of the response taken by the middleware
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    /// Status code
    pub status_code: u16,
    /// Redacted headers, when captured
    pub headers: Option<std::collections::BTreeMap<String, String>>,
    /// Captured body, when captured
    pub body: Option<String>,
    /// Elapsed wall-clock time
    pub elapsed_ms: u64,
    /// Content type of the response
    #[serde(skip)]
    pub content_type: Option<String>,
    /// Response headers as sent, for enrichers
    #[serde(skip)]
    pub raw_headers: HeaderMap,
}

impl ResponseSnapshot {
    /// Snapshot with just a status and elapsed time
    pub fn new(status: StatusCode, elapsed_ms: u64) -> Self {
        Self {
            status_code: status.as_u16(),
            elapsed_ms,
            ..Default::default()
        }
    }
}

/// Ambient state visible to enrichers for one event
#[derive(Clone, Copy, Debug, Default)]
pub struct EnrichmentContext<'a> {
    /// Current request, when the event is emitted inside one
    pub request: Option<&'a RequestContext>,
    /// Response snapshot, when the request has completed
    pub response: Option<&'a ResponseSnapshot>,
}

impl<'a> EnrichmentContext<'a> {
    /// No request in scope
    pub fn none() -> Self {
        Self::default()
    }

    /// Inside a request
    pub fn for_request(request: &'a RequestContext) -> Self {
        Self {
            request: Some(request),
            response: None,
        }
    }

    /// Add the completed response
    pub fn with_response(mut self, response: &'a ResponseSnapshot) -> Self {
        self.response = Some(response);
        self
    }
}
