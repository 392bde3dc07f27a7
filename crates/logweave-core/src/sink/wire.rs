use super::{Sink, SinkFilter};
use crate::error::SinkError;
use crate::record::{LogEvent, LogLevel};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Default queue length of a [`BackgroundTransport`]
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Delivers JSON payloads to a remote destination
///
/// Network transmission lives outside this crate; host applications supply
/// an implementation (HTTP client, agent socket, ...).
pub trait EventTransport: Send + Sync {
    /// Send one payload to `destination`
    fn send(&self, destination: &str, payload: Value) -> Result<(), SinkError>;
}

/// Records every payload in memory; clones share the buffer
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads sent so far with their destinations
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Payloads only
    pub fn payloads(&self) -> Vec<Value> {
        self.sent().into_iter().map(|(_, payload)| payload).collect()
    }
}

impl EventTransport for MemoryTransport {
    fn send(&self, destination: &str, payload: Value) -> Result<(), SinkError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| SinkError::write("memory-transport", e))?;
        sent.push((destination.to_string(), payload));
        Ok(())
    }
}

/// Bounded queue drained by a worker task on the current tokio runtime.
///
/// Each item is delivered on the blocking pool so slow destinations never
/// hold up the caller. A full queue drops the item.
pub(crate) struct BackgroundQueue<T> {
    name: String,
    sender: mpsc::Sender<T>,
}

impl<T: Send + 'static> BackgroundQueue<T> {
    pub(crate) fn spawn<F>(name: String, capacity: usize, deliver: F) -> Result<Self, SinkError>
    where
        F: Fn(T) -> Result<(), SinkError> + Send + Sync + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| SinkError::Unavailable(format!("{} (no tokio runtime)", name)))?;
        let (sender, mut receiver) = mpsc::channel::<T>(capacity.max(1));
        let deliver = Arc::new(deliver);

        let worker_name = name.clone();
        handle.spawn(async move {
            while let Some(item) = receiver.recv().await {
                let deliver = deliver.clone();
                match tokio::task::spawn_blocking(move || (*deliver)(item)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(target: "logweave", sink = %worker_name, error = %err, "Delivery failed");
                    }
                    Err(err) => {
                        tracing::warn!(target: "logweave", sink = %worker_name, error = %err, "Delivery task aborted");
                    }
                }
            }
            tracing::debug!(target: "logweave", sink = %worker_name, "Background transport stopped");
        });

        Ok(Self { name, sender })
    }

    pub(crate) fn push(&self, item: T) -> Result<(), SinkError> {
        self.sender.try_send(item).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(target: "logweave", sink = %self.name, "Queue full, dropping event");
                SinkError::QueueFull(self.name.clone())
            }
            mpsc::error::TrySendError::Closed(_) => SinkError::Unavailable(self.name.clone()),
        })
    }
}

/// Moves delivery off the request path.
///
/// Payloads go through a bounded tokio channel to a worker task that calls
/// the inner transport on the blocking pool. A full queue drops the payload.
pub struct BackgroundTransport {
    queue: BackgroundQueue<(String, Value)>,
}

impl BackgroundTransport {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(
        name: impl Into<String>,
        inner: Arc<dyn EventTransport>,
        capacity: usize,
    ) -> Result<Self, SinkError> {
        let queue = BackgroundQueue::spawn(
            name.into(),
            capacity,
            move |(destination, payload): (String, Value)| inner.send(&destination, payload),
        )?;
        Ok(Self { queue })
    }
}

impl EventTransport for BackgroundTransport {
    fn send(&self, destination: &str, payload: Value) -> Result<(), SinkError> {
        self.queue.push((destination.to_string(), payload))
    }
}

fn record_value(event: &LogEvent) -> Result<Map<String, Value>, SinkError> {
    match serde_json::to_value(&event.record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SinkError::Serialization(
            "record did not serialize to an object".to_string(),
        )),
        Err(e) => Err(SinkError::Serialization(e.to_string())),
    }
}

/// Collector payload: every record field, `LogType`, message, properties
/// and the error report
pub fn collector_payload(event: &LogEvent) -> Result<Value, SinkError> {
    let mut map = record_value(event)?;
    map.insert("LogType".to_string(), json!(event.kind().as_str()));
    map.insert("message".to_string(), json!(event.record.message()));
    map.insert(
        "properties".to_string(),
        serde_json::to_value(&event.properties)
            .map_err(|e| SinkError::Serialization(e.to_string()))?,
    );
    if let Some(error) = &event.error {
        map.insert("error".to_string(), json!(error));
    }
    Ok(Value::Object(map))
}

/// APM payload: ECS-style top level with properties nested under `labels`
pub fn apm_payload(event: &LogEvent, service_name: &str) -> Result<Value, SinkError> {
    let record = &event.record;
    let mut labels = Map::new();
    labels.insert("LogType".to_string(), json!(event.kind().as_str()));
    labels.insert("source".to_string(), json!(record.source()));
    labels.insert("functionName".to_string(), json!(record.function_name()));
    if let Some(id) = record.correlation_id() {
        labels.insert("correlationId".to_string(), json!(id));
    }
    if let Some(route) = record.route() {
        labels.insert("route".to_string(), json!(route));
    }
    for (key, value) in event.properties.iter() {
        if !labels.contains_key(key) {
            labels.insert(key.to_string(), value.clone());
        }
    }

    let mut payload = json!({
        "@timestamp": record.timestamp().to_rfc3339(),
        "log.level": event.level().as_str(),
        "message": record.message(),
        "service.name": service_name,
        "labels": labels,
        "record": Value::Object(record_value(event)?),
    });
    if let Some(trace_id) = event.properties.get_str("TraceId") {
        payload["trace.id"] = json!(trace_id);
    }
    if let Some(span_id) = event.properties.get_str("SpanId") {
        payload["span.id"] = json!(span_id);
    }
    if let Some(error) = &event.error {
        payload["error"] = json!({
            "message": error.message,
            "chain": error.chain,
            "stack_trace": error.debug,
        });
    }
    Ok(payload)
}

/// Sends collector payloads to a centralized log store
pub struct CollectorSink {
    url: String,
    transport: Arc<dyn EventTransport>,
    filter: SinkFilter,
    minimum_level: Option<LogLevel>,
}

impl CollectorSink {
    /// Sink posting to `url` through `transport`
    pub fn new(url: impl Into<String>, transport: Arc<dyn EventTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
            filter: SinkFilter::All,
            minimum_level: None,
        }
    }

    /// Set a minimum level
    pub fn with_minimum_level(mut self, level: Option<LogLevel>) -> Self {
        self.minimum_level = level;
        self
    }

    /// Destination URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Sink for CollectorSink {
    fn name(&self) -> &str {
        "collector"
    }

    fn minimum_level(&self) -> Option<LogLevel> {
        self.minimum_level
    }

    fn accepts(&self, event: &LogEvent) -> bool {
        self.filter.matches(event)
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        let payload = collector_payload(event)?;
        self.transport.send(&self.url, payload)
    }
}

/// Sends APM payloads tagged with the service name
pub struct ApmSink {
    service_name: String,
    transport: Arc<dyn EventTransport>,
    filter: SinkFilter,
    minimum_level: Option<LogLevel>,
}

impl ApmSink {
    /// Sink reporting as `service_name`
    pub fn new(service_name: impl Into<String>, transport: Arc<dyn EventTransport>) -> Self {
        Self {
            service_name: service_name.into(),
            transport,
            filter: SinkFilter::All,
            minimum_level: None,
        }
    }

    /// Set a minimum level
    pub fn with_minimum_level(mut self, level: Option<LogLevel>) -> Self {
        self.minimum_level = level;
        self
    }
}

impl Sink for ApmSink {
    fn name(&self) -> &str {
        "apm"
    }

    fn minimum_level(&self) -> Option<LogLevel> {
        self.minimum_level
    }

    fn accepts(&self, event: &LogEvent) -> bool {
        self.filter.matches(event)
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        let payload = apm_payload(event, &self.service_name)?;
        self.transport.send(&self.service_name, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ErrorReport, ExceptionDetails, LogRecord};
    use std::time::Duration;

    fn event() -> LogEvent {
        let mut event = LogEvent::new(
            LogRecord::exception(
                "orders",
                "get_order",
                ExceptionDetails {
                    message: "not found".into(),
                    ..Default::default()
                },
            )
            .with_correlation_id("abc-123"),
        );
        event.properties.add_if_absent("TraceId", "4bf92f3577b34da6a3ce929d0e0e4736");
        event.properties.add_if_absent("MachineName", "web-01");
        event
    }

    #[test]
    fn test_collector_payload_shape() {
        let payload = collector_payload(&event()).unwrap();
        assert_eq!(payload["LogType"], "Exception");
        assert_eq!(payload["kind"], "Exception");
        assert_eq!(payload["correlationId"], "abc-123");
        assert_eq!(payload["message"], "not found");
        assert_eq!(payload["source"], "orders");
        assert_eq!(payload["properties"]["MachineName"], "web-01");
    }

    #[test]
    fn test_apm_payload_nests_labels() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "row missing");
        let event = event().with_error(ErrorReport::from_error(&io));
        let payload = apm_payload(&event, "orders-api").unwrap();
        assert_eq!(payload["service.name"], "orders-api");
        assert_eq!(payload["log.level"], "Error");
        assert_eq!(payload["labels"]["MachineName"], "web-01");
        assert_eq!(payload["labels"]["correlationId"], "abc-123");
        assert_eq!(payload["trace.id"], "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(payload["error"]["message"], "row missing");
    }

    #[test]
    fn test_collector_sink_sends_to_url() {
        let transport = MemoryTransport::new();
        let sink = CollectorSink::new("http://collector:5341", Arc::new(transport.clone()));
        sink.emit(&event()).unwrap();
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://collector:5341");
    }

    #[tokio::test]
    async fn test_background_transport_delivers() {
        let memory = MemoryTransport::new();
        let background =
            BackgroundTransport::spawn("collector", Arc::new(memory.clone()), 8).unwrap();
        background.send("dest", json!({"n": 1})).unwrap();

        for _ in 0..50 {
            if !memory.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(memory.payloads(), vec![json!({"n": 1})]);
    }

    #[test]
    fn test_background_transport_requires_runtime() {
        let result = BackgroundTransport::spawn("collector", Arc::new(MemoryTransport::new()), 8);
        assert!(matches!(result, Err(SinkError::Unavailable(_))));
    }

    struct Blocking(std::sync::Mutex<()>);

    impl EventTransport for Blocking {
        fn send(&self, _destination: &str, _payload: Value) -> Result<(), SinkError> {
            let _held = self.0.lock();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_background_transport_drops_when_full() {
        let gate = Arc::new(Blocking(std::sync::Mutex::new(())));
        let held = gate.0.lock().unwrap();
        let background = BackgroundTransport::spawn("slow", gate.clone(), 1).unwrap();

        let mut dropped = 0;
        for n in 0..10 {
            if let Err(SinkError::QueueFull(_)) = background.send("dest", json!(n)) {
                dropped += 1;
            }
        }
        drop(held);
        assert!(dropped > 0);
    }
}
