use super::{Sink, SinkFilter};
use crate::error::SinkError;
use crate::record::{LogEvent, LogLevel};
use std::sync::{Arc, Mutex};

/// Keeps accepted events in memory; clones share the same buffer
#[derive(Clone, Debug)]
pub struct MemorySink {
    name: String,
    filter: SinkFilter,
    minimum_level: Option<LogLevel>,
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    /// Accept every event
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: SinkFilter::All,
            minimum_level: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replace the filter
    pub fn with_filter(mut self, filter: SinkFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set a minimum level
    pub fn with_minimum_level(mut self, level: LogLevel) -> Self {
        self.minimum_level = Some(level);
        self
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every recorded event
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimum_level(&self) -> Option<LogLevel> {
        self.minimum_level
    }

    fn accepts(&self, event: &LogEvent) -> bool {
        self.filter.matches(event)
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| SinkError::write(&self.name, e))?;
        events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;

    #[test]
    fn test_clones_share_buffer() {
        let sink = MemorySink::new("memory");
        let handle = sink.clone();
        sink.emit(&LogEvent::new(LogRecord::custom_message("s", "f", "m")))
            .unwrap();
        assert_eq!(handle.len(), 1);
        handle.clear();
        assert!(sink.is_empty());
    }
}
