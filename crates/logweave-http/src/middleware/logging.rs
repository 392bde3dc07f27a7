//! Request/response logging middleware
//!
//! Per request the layer:
//!
//! 1. resolves or mints the correlation ID and stores it in the shared
//!    [`RequestContext`] placed in the request extensions,
//! 2. snapshots the request (redacted body, uploaded file names and, when
//!    enabled, the redacted query),
//! 3. runs the rest of the chain,
//! 4. buffers the response, snapshots it and echoes the correlation header,
//! 5. hands one record to the [`Dispatcher`].
//!
//! Handler errors and panics are recorded and then passed on unchanged. A
//! request future dropped before completion still produces a best-effort
//! record.

use super::capture::{
    capture_body, is_excluded_content_type, multipart_boundary, uploaded_files, BodyKind,
};
use super::layer::{BoxedNext, MiddlewareLayer, ResponseFuture};
use crate::request::Request;
use crate::response::Response;
use bytes::Bytes;
use futures_util::FutureExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use logweave_core::config::{CorrelationSettings, MiddlewareSettings};
use logweave_core::enrich::{generate_correlation_id, resolve_correlation_id};
use logweave_core::facade::is_policy_validation;
use logweave_core::{
    Dispatcher, EnrichmentContext, ErrorReport, ExceptionDetails, LogEvent, LogLevel, LogRecord,
    RequestContext, RequestSnapshot, ResponseSnapshot,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SOURCE: &str = "logweave_http::middleware";
const FUNCTION: &str = "RequestLoggingLayer";
const DEFAULT_HEADER: &str = "x-correlation-id";

struct LoggingState {
    dispatcher: Arc<Dispatcher>,
    settings: MiddlewareSettings,
    correlation: CorrelationSettings,
    header: HeaderName,
    include_query: bool,
}

impl LoggingState {
    fn is_excluded_path(&self, path: &str) -> bool {
        self.settings
            .excluded_paths
            .iter()
            .any(|p| !p.is_empty() && path.starts_with(p.as_str()))
    }

    fn is_excluded_status(&self, status: StatusCode) -> bool {
        self.settings.excluded_status_codes.contains(&status.as_u16())
    }

    fn slow_threshold(&self) -> Option<Duration> {
        match self.settings.slow_request_threshold_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Context shared with handlers; reuses one an outer layer already stored
    fn context_for(&self, req: &mut Request) -> Arc<RequestContext> {
        if let Some(ctx) = req.log_context() {
            return ctx;
        }
        let ctx = Arc::new(RequestContext::from_parts(req.parts()));
        req.extensions_mut().insert(ctx.clone());
        ctx
    }

    fn correlation_id(&self, ctx: &RequestContext) -> Option<String> {
        if let Some(id) = ctx.correlation_id() {
            return Some(id.to_string());
        }
        let resolved = resolve_correlation_id(ctx, &self.correlation.header_name)
            .map(|(id, _)| id)
            .or_else(|| {
                self.correlation
                    .generate_if_missing
                    .then(generate_correlation_id)
            })?;
        Some(ctx.set_correlation_id(resolved).to_string())
    }

    fn request_snapshot(&self, req: &Request) -> RequestSnapshot {
        let redaction = self.dispatcher.redaction();
        let mut snapshot = RequestSnapshot {
            method: req.method().to_string(),
            path: req.path().to_string(),
            query: req
                .query_string()
                .filter(|_| self.include_query)
                .map(|q| redaction.redact_query(q)),
            ..Default::default()
        };
        if !self.settings.log_request_body {
            return snapshot;
        }

        let content_type = req.header(header::CONTENT_TYPE.as_str());
        match BodyKind::from_content_type(content_type) {
            BodyKind::Multipart => {
                if let Some(boundary) = content_type.and_then(multipart_boundary) {
                    snapshot.file_names = uploaded_files(req.body(), &boundary)
                        .into_iter()
                        .map(|f| f.file_name)
                        .collect();
                }
            }
            kind => {
                snapshot.body =
                    capture_body(req.body(), kind, redaction, self.settings.max_body_size);
            }
        }
        snapshot
    }

    fn response_snapshot(
        &self,
        head: &http::response::Parts,
        body: &Bytes,
        elapsed: Duration,
    ) -> ResponseSnapshot {
        let content_type = head
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let mut snapshot = ResponseSnapshot::new(head.status, elapsed_ms(elapsed));
        snapshot.raw_headers = head.headers.clone();
        if self.settings.log_response_headers {
            snapshot.headers = Some(self.dispatcher.redaction().redact_headers(&head.headers));
        }
        let excluded =
            is_excluded_content_type(content_type.as_deref(), &self.settings.excluded_content_types);
        if self.settings.log_response_body && !excluded {
            snapshot.body = capture_body(
                body,
                BodyKind::from_content_type(content_type.as_deref()),
                self.dispatcher.redaction(),
                self.settings.max_body_size,
            );
        }
        snapshot.content_type = content_type;
        snapshot
    }

    /// Echo the correlation header and expose it to browsers
    fn stamp(&self, headers: &mut HeaderMap, correlation_id: &str) {
        if !headers.contains_key(&self.header) {
            match HeaderValue::from_str(correlation_id) {
                Ok(value) => {
                    headers.insert(self.header.clone(), value);
                }
                Err(_) => {
                    tracing::warn!(target: "logweave", "Correlation ID is not a valid header value");
                }
            }
        }
        if self.correlation.expose_header {
            expose_header(headers, &self.correlation.header_name);
        }
    }

    fn emit(&self, event: LogEvent, ctx: &RequestContext, response: Option<&ResponseSnapshot>) {
        let enrichment = EnrichmentContext {
            request: Some(ctx),
            response,
        };
        let report = self.dispatcher.dispatch(event, &enrichment);
        if !report.failed.is_empty() {
            tracing::debug!(
                target: "logweave",
                failed = report.failed.len(),
                path = %ctx.path(),
                "Request record not delivered everywhere"
            );
        }
    }

    fn base_record(
        &self,
        ctx: &RequestContext,
        message: String,
        correlation_id: Option<&str>,
    ) -> LogRecord {
        tag_record(LogRecord::custom_message(SOURCE, FUNCTION, message), ctx, correlation_id)
    }

    fn completed(
        &self,
        ctx: &RequestContext,
        correlation_id: Option<&str>,
        request: &RequestSnapshot,
        response: &ResponseSnapshot,
    ) {
        let elapsed = Duration::from_millis(response.elapsed_ms);
        let slow = self.slow_threshold().is_some_and(|t| elapsed > t);
        let message = format!(
            "HTTP {} {} responded {} in {} ms",
            request.method, request.path, response.status_code, response.elapsed_ms
        );
        let level = if slow {
            LogLevel::Warning
        } else {
            LogLevel::Information
        };
        let mut event = LogEvent::new(
            self.base_record(ctx, message, correlation_id)
                .with_level(level),
        );
        add_snapshots(&mut event, request, Some(response));
        event.properties.add_if_absent("IsSlowRequest", slow);
        if slow {
            tracing::debug!(target: "logweave", path = %request.path, elapsed_ms = response.elapsed_ms, "Slow request");
        }
        self.emit(event, ctx, Some(response));
    }

    fn failed(
        &self,
        ctx: &RequestContext,
        correlation_id: Option<&str>,
        request: &RequestSnapshot,
        elapsed: Duration,
        error: ErrorReport,
        is_policy_validation: bool,
    ) {
        let response = ResponseSnapshot::new(StatusCode::INTERNAL_SERVER_ERROR, elapsed_ms(elapsed));
        let details = ExceptionDetails {
            message: format!(
                "HTTP {} {} failed after {} ms: {}",
                request.method, request.path, response.elapsed_ms, error.message
            ),
            inner_message: error.chain.first().cloned(),
            is_policy_validation,
            ..Default::default()
        };
        let record = LogRecord::exception(SOURCE, FUNCTION, details);
        let mut event = LogEvent::new(tag_record(record, ctx, correlation_id)).with_error(error);
        add_snapshots(&mut event, request, Some(&response));
        event.properties.add_if_absent("RequestFailed", true);
        self.emit(event, ctx, Some(&response));
    }

    fn aborted(
        &self,
        ctx: &RequestContext,
        correlation_id: Option<&str>,
        request: &RequestSnapshot,
        elapsed: Duration,
    ) {
        let message = format!(
            "HTTP {} {} aborted after {} ms",
            request.method,
            request.path,
            elapsed_ms(elapsed)
        );
        let mut event = LogEvent::new(
            self.base_record(ctx, message, correlation_id)
                .with_level(LogLevel::Warning),
        );
        add_snapshots(&mut event, request, None);
        event.properties.add_if_absent("ElapsedMs", elapsed_ms(elapsed));
        event.properties.add_if_absent("RequestAborted", true);
        self.emit(event, ctx, None);
    }
}

fn tag_record(record: LogRecord, ctx: &RequestContext, correlation_id: Option<&str>) -> LogRecord {
    let record = record.with_route(ctx.route());
    match correlation_id {
        Some(id) => record.with_correlation_id(id),
        None => record,
    }
}

fn add_snapshots(event: &mut LogEvent, request: &RequestSnapshot, response: Option<&ResponseSnapshot>) {
    if let Ok(value) = serde_json::to_value(request) {
        event.properties.add_if_absent("Request", value);
    }
    if let Some(response) = response {
        if let Ok(value) = serde_json::to_value(response) {
            event.properties.add_if_absent("Response", value);
        }
        event.properties.add_if_absent("StatusCode", response.status_code);
        event.properties.add_if_absent("ElapsedMs", response.elapsed_ms);
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Add `name` to `Access-Control-Expose-Headers`, keeping existing entries.
///
/// Nothing changes when the name, or `*`, is already listed.
pub fn expose_header(headers: &mut HeaderMap, name: &str) {
    let existing: Vec<String> = headers
        .get_all(header::ACCESS_CONTROL_EXPOSE_HEADERS)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if existing
        .iter()
        .any(|v| v == "*" || v.eq_ignore_ascii_case(name))
    {
        return;
    }
    let mut merged = existing;
    merged.push(name.to_string());
    if let Ok(value) = HeaderValue::from_str(&merged.join(", ")) {
        headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
    }
}

/// Emits the aborted record when dropped before being disarmed
struct AbortGuard {
    state: Arc<LoggingState>,
    ctx: Arc<RequestContext>,
    correlation_id: Option<String>,
    request: RequestSnapshot,
    start: Instant,
    armed: bool,
}

impl AbortGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed || std::thread::panicking() {
            return;
        }
        let state = &self.state;
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            state.aborted(
                &self.ctx,
                self.correlation_id.as_deref(),
                &self.request,
                self.start.elapsed(),
            )
        }));
        if outcome.is_err() {
            tracing::warn!(target: "logweave", "Could not record aborted request");
        }
    }
}

/// Logs every request/response pair through a [`Dispatcher`]
#[derive(Clone)]
pub struct RequestLoggingLayer {
    state: Arc<LoggingState>,
}

impl RequestLoggingLayer {
    /// Layer using the middleware and correlation settings of `dispatcher`
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let settings = dispatcher.settings().middleware.clone();
        let correlation = dispatcher.settings().correlation.clone();
        Self::with_settings(dispatcher, settings, correlation)
    }

    /// Layer with explicit settings
    pub fn with_settings(
        dispatcher: Arc<Dispatcher>,
        settings: MiddlewareSettings,
        correlation: CorrelationSettings,
    ) -> Self {
        let header = HeaderName::from_bytes(correlation.header_name.as_bytes()).unwrap_or_else(|_| {
            tracing::warn!(
                target: "logweave",
                header = %correlation.header_name,
                "Invalid correlation header name, using {}",
                DEFAULT_HEADER
            );
            HeaderName::from_static(DEFAULT_HEADER)
        });
        let include_query = dispatcher.settings().enrichers.http.include_query_string;
        Self {
            state: Arc::new(LoggingState {
                dispatcher,
                settings,
                correlation,
                header,
                include_query,
            }),
        }
    }

    /// Middleware settings in use
    pub fn settings(&self) -> &MiddlewareSettings {
        &self.state.settings
    }
}

impl MiddlewareLayer for RequestLoggingLayer {
    fn call(&self, mut req: Request, next: BoxedNext) -> ResponseFuture {
        let state = self.state.clone();

        Box::pin(async move {
            let start = Instant::now();
            let ctx = state.context_for(&mut req);
            let correlation_id = state.correlation_id(&ctx);

            if state.is_excluded_path(req.path()) {
                let mut response = next(req).await?;
                if let Some(id) = &correlation_id {
                    state.stamp(response.headers_mut(), id);
                }
                return Ok(response);
            }

            let request = state.request_snapshot(&req);
            let mut guard = AbortGuard {
                state: state.clone(),
                ctx: ctx.clone(),
                correlation_id: correlation_id.clone(),
                request,
                start,
                armed: true,
            };

            let outcome = AssertUnwindSafe(next(req)).catch_unwind().await;
            let elapsed = start.elapsed();
            guard.disarm();

            match outcome {
                Ok(Ok(response)) => {
                    let (mut head, body) = response.into_parts();
                    let body = match body.collect().await {
                        Ok(collected) => collected.to_bytes(),
                        Err(never) => match never {},
                    };
                    if let Some(id) = &correlation_id {
                        state.stamp(&mut head.headers, id);
                    }
                    if !state.is_excluded_status(head.status) {
                        let snapshot = state.response_snapshot(&head, &body, elapsed);
                        state.completed(&ctx, correlation_id.as_deref(), &guard.request, &snapshot);
                    }
                    Ok(Response::from_parts(head, Full::new(body)))
                }
                Ok(Err(err)) => {
                    let report = ErrorReport::from_error(&*err);
                    let policy = is_policy_validation(&*err);
                    state.failed(&ctx, correlation_id.as_deref(), &guard.request, elapsed, report, policy);
                    Err(err)
                }
                Err(panic) => {
                    let report = ErrorReport {
                        message: panic_message(panic.as_ref()),
                        chain: Vec::new(),
                        debug: "handler panicked".to_string(),
                    };
                    state.failed(&ctx, correlation_id.as_deref(), &guard.request, elapsed, report, false);
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }

    fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
        Box::new(self.clone())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::middleware::layer::{handler_fn, LayerStack};
    use logweave_core::config::Settings;
    use logweave_core::sink::MemorySink;
    use logweave_core::{LoggerBuilder, SinkServices};
    use http::Method;

    fn setup(settings: Settings) -> (LayerStack, MemorySink) {
        let sink = MemorySink::new("memory");
        let dispatcher = LoggerBuilder::new(settings)
            .write_to(Arc::new(sink.clone()))
            .build(SinkServices::new())
            .unwrap();
        let stack = LayerStack::new().layer(RequestLoggingLayer::new(Arc::new(dispatcher)));
        (stack, sink)
    }

    fn request(method: Method, uri: &str, headers: &[(&str, &str)], body: &'static [u8]) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::from_static(body)).unwrap().into()
    }

    fn ok(body: &'static str, content_type: &'static str) -> BoxedNext {
        handler_fn(move |_req| async move {
            Ok(crate::response::with_content_type(body, content_type))
        })
    }

    #[derive(Debug)]
    struct DbDown;

    impl std::fmt::Display for DbDown {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "database unavailable")
        }
    }

    impl std::error::Error for DbDown {}

    #[tokio::test]
    async fn test_echoes_incoming_correlation_id() {
        let (stack, sink) = setup(Settings::default());
        let response = stack
            .execute(
                request(Method::GET, "/orders", &[("X-Correlation-Id", "abc-123")], b""),
                ok("[]", "application/json"),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-correlation-id"], "abc-123");
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record.correlation_id(), Some("abc-123"));
        assert_eq!(events[0].properties.get_str("CorrelationId"), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_generates_correlation_id() {
        let (stack, sink) = setup(Settings::default());
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_handler = seen.clone();
        let handler = handler_fn(move |req: Request| {
            let seen = seen_in_handler.clone();
            async move {
                *seen.lock().unwrap() = req.correlation_id();
                Ok(crate::response::IntoResponse::into_response("ok"))
            }
        });

        let response = stack
            .execute(request(Method::GET, "/", &[], b""), handler)
            .await
            .unwrap();
        let echoed = response.headers()["x-correlation-id"].to_str().unwrap().to_string();
        assert!(!echoed.is_empty());
        assert_eq!(seen.lock().unwrap().as_deref(), Some(echoed.as_str()));
        assert_eq!(sink.events()[0].record.correlation_id(), Some(echoed.as_str()));
    }

    #[tokio::test]
    async fn test_existing_response_header_is_kept() {
        let (stack, _sink) = setup(Settings::default());
        let handler = handler_fn(|_req| async {
            let mut response = crate::response::IntoResponse::into_response("ok");
            response
                .headers_mut()
                .insert("x-correlation-id", HeaderValue::from_static("set-by-handler"));
            Ok(response)
        });
        let response = stack
            .execute(request(Method::GET, "/", &[("X-Correlation-Id", "abc")], b""), handler)
            .await
            .unwrap();
        let values: Vec<_> = response.headers().get_all("x-correlation-id").iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "set-by-handler");
    }

    #[tokio::test]
    async fn test_request_body_redacted_and_passed_downstream() {
        let mut settings = Settings::default();
        settings.enrichers.http.include_query_string = true;
        let (stack, sink) = setup(settings);
        let handler = handler_fn(|req: Request| async move {
            assert!(std::str::from_utf8(req.body()).unwrap().contains("hunter2"));
            Ok(crate::response::IntoResponse::into_response("ok"))
        });
        stack
            .execute(
                request(
                    Method::POST,
                    "/login?token=abc&page=1",
                    &[("content-type", "application/json")],
                    br#"{"user":"ana","password":"hunter2"}"#,
                ),
                handler,
            )
            .await
            .unwrap();

        let event = &sink.events()[0];
        let captured = event.properties.get("Request").unwrap();
        let body = captured["body"].as_str().unwrap();
        assert!(body.contains("[REDACTED]"));
        assert!(!body.contains("hunter2"));
        assert_eq!(captured["query"], "token=[REDACTED]&page=1");
    }

    #[tokio::test]
    async fn test_query_string_omitted_by_default() {
        let (stack, sink) = setup(Settings::default());
        stack
            .execute(request(Method::GET, "/search?q=rust&page=1", &[], b""), ok("[]", "application/json"))
            .await
            .unwrap();

        let event = &sink.events()[0];
        let captured = event.properties.get("Request").unwrap();
        assert_eq!(captured["path"], "/search");
        assert!(captured["query"].is_null());
    }

    #[tokio::test]
    async fn test_pdf_response_body_excluded() {
        let (stack, sink) = setup(Settings::default());
        let response = stack
            .execute(
                request(Method::GET, "/report", &[], b""),
                ok("%PDF-1.7 binary", "application/pdf"),
            )
            .await
            .unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"%PDF-1.7 binary");

        let event = &sink.events()[0];
        let captured = event.properties.get("Response").unwrap();
        assert!(captured["body"].is_null());
        assert_eq!(captured["statusCode"], 200);
        assert!(event.properties.contains_key("ElapsedMs"));
        assert_eq!(event.properties.get("StatusCode"), Some(&serde_json::json!(200)));
    }

    #[tokio::test]
    async fn test_response_body_truncated() {
        let mut settings = Settings::default();
        settings.middleware.max_body_size = 4;
        let (stack, sink) = setup(settings);
        stack
            .execute(request(Method::GET, "/", &[], b""), ok("abcdefgh", "text/plain"))
            .await
            .unwrap();
        let captured = sink.events()[0].properties.get("Response").cloned().unwrap();
        assert_eq!(captured["body"], "abcd... [truncated 4 bytes]");
    }

    #[tokio::test]
    async fn test_handler_error_propagates_unchanged() {
        let (stack, sink) = setup(Settings::default());
        let failing = handler_fn(|_req| async { Err::<Response, BoxError>(Box::new(DbDown)) });

        let err = stack
            .execute(request(Method::GET, "/orders", &[], b""), failing)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<DbDown>().is_some());
        assert_eq!(err.to_string(), "database unavailable");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level(), LogLevel::Error);
        assert_eq!(events[0].kind(), logweave_core::RecordKind::Exception);
        assert!(!events[0].record.is_policy_validation());
        assert_eq!(events[0].error.as_ref().unwrap().message, "database unavailable");
        assert!(events[0].properties.contains_key("ElapsedMs"));
    }

    #[tokio::test]
    async fn test_handler_panic_resumes() {
        let (stack, sink) = setup(Settings::default());
        let panicking = handler_fn(|_req| async {
            if true {
                panic!("handler exploded");
            }
            Ok(crate::response::IntoResponse::into_response("unreachable"))
        });

        let outcome = AssertUnwindSafe(stack.execute(request(Method::GET, "/", &[], b""), panicking))
            .catch_unwind()
            .await;
        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"handler exploded"));
        assert_eq!(sink.events()[0].error.as_ref().unwrap().message, "handler exploded");
    }

    #[tokio::test]
    async fn test_dropped_request_is_recorded() {
        let (stack, sink) = setup(Settings::default());
        let never = handler_fn(|_req| async {
            std::future::pending::<()>().await;
            Ok(crate::response::IntoResponse::into_response("never"))
        });

        let fut = stack.execute(request(Method::GET, "/slow", &[], b""), never);
        let timed_out = tokio::time::timeout(Duration::from_millis(20), fut).await;
        assert!(timed_out.is_err());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].properties.get("RequestAborted"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_excluded_path_not_logged_but_stamped() {
        let (stack, sink) = setup(Settings::default());
        let response = stack
            .execute(request(Method::GET, "/health/live", &[], b""), ok("up", "text/plain"))
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-correlation-id"));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_status_not_logged() {
        let mut settings = Settings::default();
        settings.middleware.excluded_status_codes = vec![404];
        let (stack, sink) = setup(settings);
        let handler = handler_fn(|_req| async {
            Ok(crate::response::IntoResponse::into_response(StatusCode::NOT_FOUND))
        });
        stack
            .execute(request(Method::GET, "/missing", &[], b""), handler)
            .await
            .unwrap();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_slow_request_is_warning() {
        let mut settings = Settings::default();
        settings.middleware.slow_request_threshold_ms = 1;
        let (stack, sink) = setup(settings);
        let handler = handler_fn(|_req| async {
            tokio::time::sleep(Duration::from_millis(15)).await;
            Ok(crate::response::IntoResponse::into_response("ok"))
        });
        stack
            .execute(request(Method::GET, "/", &[], b""), handler)
            .await
            .unwrap();
        let event = &sink.events()[0];
        assert_eq!(event.level(), LogLevel::Warning);
        assert_eq!(event.properties.get("IsSlowRequest"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_multipart_file_names_only() {
        let (stack, sink) = setup(Settings::default());
        let body: &'static [u8] = b"--b\r\nContent-Disposition: form-data; name=\"password\"\r\n\r\nhunter2\r\n--b\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"cv.pdf\"\r\n\r\nDATA\r\n--b--\r\n";
        stack
            .execute(
                request(
                    Method::POST,
                    "/upload",
                    &[("content-type", "multipart/form-data; boundary=b")],
                    body,
                ),
                ok("ok", "text/plain"),
            )
            .await
            .unwrap();
        let captured = sink.events()[0].properties.get("Request").cloned().unwrap();
        assert_eq!(captured["fileNames"], serde_json::json!(["cv.pdf"]));
        assert!(captured["body"].is_null());
        assert!(!captured.to_string().contains("hunter2"));
    }

    #[test]
    fn test_expose_header_merges() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("ETag"),
        );
        expose_header(&mut headers, "X-Correlation-Id");
        assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], "ETag, X-Correlation-Id");

        expose_header(&mut headers, "x-correlation-id");
        assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], "ETag, X-Correlation-Id");

        let mut wildcard = HeaderMap::new();
        wildcard.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
        expose_header(&mut wildcard, "X-Correlation-Id");
        assert_eq!(wildcard[header::ACCESS_CONTROL_EXPOSE_HEADERS], "*");
    }
}
