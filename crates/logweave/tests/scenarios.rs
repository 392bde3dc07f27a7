//! End-to-end behaviour of the middleware, facade and sinks together

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use logweave::enrich::EnricherDescriptor;
use logweave::prelude::*;
use logweave::{EnrichError, EnrichmentContext, Enricher, PropertySet};
use logweave::record::LogRecord;
use serde_json::json;
use std::sync::Arc;

struct Harness {
    stack: LayerStack,
    logger: Logger,
    sink: MemorySink,
}

fn harness(settings: Settings) -> Harness {
    let sink = MemorySink::new("memory");
    let dispatcher = Arc::new(
        LoggerBuilder::new(settings)
            .write_to(Arc::new(sink.clone()))
            .build(SinkServices::new())
            .unwrap(),
    );
    Harness {
        stack: LayerStack::new().layer(RequestLoggingLayer::new(dispatcher.clone())),
        logger: Logger::new(dispatcher),
        sink,
    }
}

fn get(uri: &str, headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Bytes::new()).unwrap().into()
}

/// Handler that logs a custom message through a request-bound logger
fn chatty(logger: Logger) -> BoxedNext {
    handler_fn(move |req: Request| {
        let logger = logger.for_extensions(req.extensions());
        async move {
            logger.log_custom_message("loading order", caller!());
            Ok("order".into_response())
        }
    })
}

#[tokio::test]
async fn correlation_id_is_echoed_and_shared() {
    let h = harness(Settings::default());
    let response = h
        .stack
        .execute(
            get("/orders/7", &[("X-Correlation-Id", "abc-123")]),
            chatty(h.logger.clone()),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-correlation-id"], "abc-123");
    let events = h.sink.events();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.record.correlation_id(), Some("abc-123"));
    }
    assert_eq!(events[0].record.message(), "loading order");
    assert_eq!(events[0].record.function_name(), "chatty");
}

#[tokio::test]
async fn alternate_header_is_recognized() {
    let h = harness(Settings::default());
    let response = h
        .stack
        .execute(get("/", &[("X-Request-Id", "req-9")]), chatty(h.logger.clone()))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "req-9");
}

#[tokio::test]
async fn correlation_id_is_generated_when_missing() {
    let h = harness(Settings::default());
    let response = h
        .stack
        .execute(get("/orders", &[]), chatty(h.logger.clone()))
        .await
        .unwrap();

    let echoed = response.headers()["x-correlation-id"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(!echoed.is_empty());
    let exposed = response.headers()[http::header::ACCESS_CONTROL_EXPOSE_HEADERS]
        .to_str()
        .unwrap();
    assert!(exposed.contains("X-Correlation-Id"));
    for event in h.sink.events() {
        assert_eq!(event.record.correlation_id(), Some(echoed.as_str()));
    }
}

#[tokio::test]
async fn no_header_and_no_generation_leaves_response_unstamped() {
    let mut settings = Settings::default();
    settings.correlation.generate_if_missing = false;
    let h = harness(settings);
    let response = h
        .stack
        .execute(get("/", &[]), chatty(h.logger.clone()))
        .await
        .unwrap();
    assert!(!response.headers().contains_key("x-correlation-id"));
}

#[derive(serde::Serialize)]
struct Credentials {
    user: String,
    password: String,
}

#[derive(Debug)]
struct LoginFailed;

impl std::fmt::Display for LoginFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "login backend unavailable")
    }
}

impl std::error::Error for LoginFailed {}

#[test]
fn logged_password_is_redacted_in_file_output() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(
        LoggerBuilder::new(Settings::default())
            .write_to_file(dir.path())
            .build(SinkServices::new())
            .unwrap(),
    );
    let logger = Logger::new(dispatcher);

    let credentials = Credentials {
        user: "ana".into(),
        password: "hunter2".into(),
    };
    let password = "hunter2".to_string();
    log_error!(logger, LoginFailed, credentials, password);

    let files = log_files(&dir.path().join("ErrorsLogs"));
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("error-") && name.ends_with(".log"));

    let text = std::fs::read_to_string(&files[0]).unwrap();
    assert!(text.contains("login backend unavailable"));
    assert!(text.contains("[REDACTED]"));
    assert!(text.contains("ana"));
    assert!(!text.contains("hunter2"));
}

fn alerting(transport: &MemoryMailTransport) -> Logger {
    let dispatcher = LoggerBuilder::new(Settings::default())
        .write_to_email(EmailOptions::new("alerts@example.com", "ops@example.com"))
        .build(SinkServices::new().with_mail(Arc::new(transport.clone())))
        .unwrap();
    Logger::new(Arc::new(dispatcher))
}

#[test]
fn policy_rejections_never_alert() {
    let transport = MemoryMailTransport::new();
    let logger = alerting(&transport);

    let rejection = RemoteFault::new(
        "limits",
        json!({"success": false, "message": "daily limit reached", "isSystemError": false})
            .to_string(),
    );
    logger.log_error(&rejection, caller!(), vec![]);
    assert!(transport.sent().is_empty());

    let outage = RemoteFault::new(
        "limits",
        json!({"success": false, "message": "db down", "isSystemError": true}).to_string(),
    );
    logger.log_error(&outage, caller!(), vec![]);
    logger.log_error(&LoginFailed, caller!(), vec![]);
    assert_eq!(transport.sent().len(), 2);
}

struct AlwaysFails {
    descriptor: EnricherDescriptor,
}

impl Enricher for AlwaysFails {
    fn descriptor(&self) -> &EnricherDescriptor {
        &self.descriptor
    }

    fn enrich(
        &self,
        _record: &LogRecord,
        _ctx: &EnrichmentContext<'_>,
        _properties: &mut PropertySet,
    ) -> Result<(), EnrichError> {
        Err(EnrichError::new("BrokenEnricher", "lookup table missing"))
    }
}

#[tokio::test]
async fn broken_enricher_does_not_block_the_rest() {
    let sink = MemorySink::new("memory");
    let dispatcher = Arc::new(
        LoggerBuilder::new(Settings::default())
            .enrich_with(Arc::new(AlwaysFails {
                descriptor: EnricherDescriptor::new("BrokenEnricher", true, 1),
            }))
            .write_to(Arc::new(sink.clone()))
            .build(SinkServices::new())
            .unwrap(),
    );
    let stack = LayerStack::new().layer(RequestLoggingLayer::new(dispatcher));
    stack
        .execute(
            get("/orders", &[("X-Correlation-Id", "abc-123")]),
            handler_fn(|_req| async { Ok("ok".into_response()) }),
        )
        .await
        .unwrap();

    let event = &sink.events()[0];
    assert!(event.properties.contains_key("BrokenEnricher_Error"));
    assert_eq!(event.properties.get_str("CorrelationId"), Some("abc-123"));
    assert_eq!(event.properties.get_str("RequestMethod"), Some("GET"));
    assert!(event.properties.contains_key("MachineName"));
}

#[tokio::test]
async fn pdf_response_body_is_not_captured() {
    let h = harness(Settings::default());
    let handler = handler_fn(|_req| async {
        Ok(logweave::http::response::with_content_type(
            Bytes::from_static(b"%PDF-1.7 ..."),
            "application/pdf",
        ))
    });
    let response = h
        .stack
        .execute(get("/reports/1.pdf", &[]), handler)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"%PDF-1.7 ...");

    let event = &h.sink.events()[0];
    let captured = event.properties.get("Response").unwrap();
    assert!(captured["body"].is_null());
    assert_eq!(captured["statusCode"], 200);
    assert!(captured["elapsedMs"].is_u64());
    assert_eq!(event.properties.get("StatusCode"), Some(&json!(200)));
    assert_eq!(event.properties.get_str("RequestPath"), Some("/reports/1.pdf"));
}

#[tokio::test]
async fn request_record_lands_in_request_file() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(
        LoggerBuilder::new(Settings::default())
            .write_to_file(dir.path())
            .build(SinkServices::new())
            .unwrap(),
    );
    let stack = LayerStack::new().layer(RequestLoggingLayer::new(dispatcher));
    stack
        .execute(
            get("/orders?page=2", &[("X-Correlation-Id", "abc-123")]),
            handler_fn(|_req| async { Ok(json!([{"id": 1}]).into_response()) }),
        )
        .await
        .unwrap();

    let requests = log_files(&dir.path().join("RequestsLogs"));
    assert_eq!(requests.len(), 1);
    let text = std::fs::read_to_string(&requests[0]).unwrap();
    assert!(text.contains("/orders"));
    assert!(text.contains("abc-123"));
    assert!(log_files(&dir.path().join("ErrorsLogs")).is_empty());
}

#[derive(Debug)]
struct DbDown;

impl std::fmt::Display for DbDown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "database unavailable")
    }
}

impl std::error::Error for DbDown {}

fn failing() -> BoxedNext {
    handler_fn(|_req| async { Err::<Response, BoxError>(Box::new(DbDown)) })
}

#[tokio::test]
async fn handler_failure_lands_in_error_file() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MemoryMailTransport::new();
    let dispatcher = Arc::new(
        LoggerBuilder::new(Settings::default())
            .write_to_file(dir.path())
            .write_to_email(EmailOptions::new("alerts@example.com", "ops@example.com"))
            .build(SinkServices::new().with_mail(Arc::new(transport.clone())))
            .unwrap(),
    );
    let stack = LayerStack::new().layer(RequestLoggingLayer::new(dispatcher));
    let err = stack
        .execute(get("/orders/7", &[("X-Correlation-Id", "abc-123")]), failing())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "database unavailable");

    let errors = log_files(&dir.path().join("ErrorsLogs"));
    assert_eq!(errors.len(), 1);
    let text = std::fs::read_to_string(&errors[0]).unwrap();
    assert!(text.contains("database unavailable"));
    assert!(text.contains("abc-123"));
    assert_eq!(transport.sent().len(), 1);
}

struct SlowRelay;

impl MailTransport for SlowRelay {
    fn send(
        &self,
        _options: &EmailOptions,
        _message: MailMessage,
    ) -> Result<(), SinkError> {
        std::thread::sleep(std::time::Duration::from_millis(500));
        Err(SinkError::Unavailable("relay".into()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_mail_relay_does_not_delay_the_response() {
    let dispatcher = Arc::new(
        LoggerBuilder::new(Settings::default())
            .write_to_email(EmailOptions::new("alerts@example.com", "ops@example.com"))
            .build(SinkServices::new().with_mail(Arc::new(SlowRelay)).in_background())
            .unwrap(),
    );
    let stack = LayerStack::new().layer(RequestLoggingLayer::new(dispatcher));

    let started = std::time::Instant::now();
    let result = stack.execute(get("/orders", &[]), failing()).await;
    assert!(result.is_err());
    assert!(started.elapsed() < std::time::Duration::from_millis(100));
}

fn log_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
