use super::{DefaultFormatter, ExceptionFormatter, Formatter, RequestFormatter};
use crate::record::LogEvent;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Picks the first formatter, by ascending priority, that accepts an event
#[derive(Clone)]
pub struct FormatterManager {
    formatters: Vec<Arc<dyn Formatter>>,
    fallback: DefaultFormatter,
}

impl FormatterManager {
    /// Create from a set of formatters; the default formatter is always
    /// available as the last resort
    pub fn new(formatters: Vec<Arc<dyn Formatter>>) -> Self {
        let mut formatters = formatters;
        formatters.sort_by_key(|f| f.priority());
        Self {
            formatters,
            fallback: DefaultFormatter,
        }
    }

    /// Exception, request and default formatters
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(ExceptionFormatter),
            Arc::new(RequestFormatter),
            Arc::new(DefaultFormatter),
        ])
    }

    /// Names of the registered formatters in the order they are consulted
    pub fn formatter_names(&self) -> Vec<&'static str> {
        self.formatters.iter().map(|f| f.name()).collect()
    }

    /// The formatter that will render `event`
    pub fn select(&self, event: &LogEvent) -> &dyn Formatter {
        self.formatters
            .iter()
            .find(|f| f.can_format(event))
            .map(|f| f.as_ref())
            .unwrap_or(&self.fallback)
    }

    /// Render `event`. Never fails: a formatter error or panic degrades to a
    /// one-line rendering.
    pub fn format_log_event(&self, event: &LogEvent) -> String {
        let formatter = self.select(event);
        match panic::catch_unwind(AssertUnwindSafe(|| formatter.format(event))) {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                tracing::error!(
                    target: "logweave",
                    formatter = formatter.name(),
                    error = %err,
                    "Formatter failed"
                );
                fallback_line(event)
            }
            Err(_) => {
                tracing::error!(
                    target: "logweave",
                    formatter = formatter.name(),
                    "Formatter panicked"
                );
                fallback_line(event)
            }
        }
    }
}

impl Default for FormatterManager {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for FormatterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatterManager")
            .field("formatters", &self.formatter_names())
            .finish()
    }
}

/// Minimal one-line rendering: timestamp, level, message, raw properties
pub fn fallback_line(event: &LogEvent) -> String {
    let properties = serde_json::to_string(&event.properties).unwrap_or_default();
    format!(
        "{} [{}] {} {}\n",
        event.record.timestamp().to_rfc3339(),
        event.level(),
        event.record.message(),
        properties
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ExceptionDetails, LogRecord};
    use std::collections::BTreeMap;
    use std::fmt;

    struct Exploding;

    impl Formatter for Exploding {
        fn name(&self) -> &'static str {
            "Exploding"
        }
        fn priority(&self) -> i32 {
            0
        }
        fn can_format(&self, _event: &LogEvent) -> bool {
            true
        }
        fn format(&self, _event: &LogEvent) -> Result<String, fmt::Error> {
            panic!("renderer bug")
        }
    }

    struct Refusing;

    impl Formatter for Refusing {
        fn name(&self) -> &'static str {
            "Refusing"
        }
        fn priority(&self) -> i32 {
            0
        }
        fn can_format(&self, _event: &LogEvent) -> bool {
            true
        }
        fn format(&self, _event: &LogEvent) -> Result<String, fmt::Error> {
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_selection_by_kind() {
        let manager = FormatterManager::standard();
        let exception = LogEvent::new(LogRecord::exception(
            "s",
            "f",
            ExceptionDetails::default(),
        ));
        let message = LogEvent::new(LogRecord::custom_message("s", "f", "m"));
        let failed_call = LogEvent::new(LogRecord::api_call("s", "f", BTreeMap::new(), true));

        assert_eq!(manager.select(&exception).name(), "ExceptionFormatter");
        assert_eq!(manager.select(&message).name(), "RequestFormatter");
        assert_eq!(manager.select(&failed_call).name(), "DefaultFormatter");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let manager = FormatterManager::standard();
        let event = LogEvent::new(LogRecord::custom_message("s", "f", "m"));
        let first = manager.select(&event).name();
        for _ in 0..10 {
            assert_eq!(manager.select(&event).name(), first);
        }
    }

    #[test]
    fn test_names_in_priority_order() {
        let manager = FormatterManager::new(vec![
            Arc::new(DefaultFormatter),
            Arc::new(RequestFormatter),
            Arc::new(ExceptionFormatter),
        ]);
        assert_eq!(
            manager.formatter_names(),
            vec!["ExceptionFormatter", "RequestFormatter", "DefaultFormatter"]
        );
    }

    #[test]
    fn test_falls_back_to_default_when_nothing_matches() {
        let manager = FormatterManager::new(vec![Arc::new(ExceptionFormatter)]);
        let event = LogEvent::new(LogRecord::custom_message("s", "f", "m"));
        assert_eq!(manager.select(&event).name(), "DefaultFormatter");
    }

    #[test]
    fn test_panic_degrades_to_fallback_line() {
        let manager = FormatterManager::new(vec![Arc::new(Exploding)]);
        let mut event = LogEvent::new(LogRecord::custom_message("s", "f", "still visible"));
        event.properties.add_if_absent("Key", "value");
        let out = manager.format_log_event(&event);
        assert!(out.contains("[Information] still visible"));
        assert!(out.contains("\"Key\":\"value\""));
    }

    #[test]
    fn test_error_degrades_to_fallback_line() {
        let manager = FormatterManager::new(vec![Arc::new(Refusing)]);
        let event = LogEvent::new(LogRecord::custom_message("s", "f", "m"));
        let out = manager.format_log_event(&event);
        assert_eq!(out.lines().count(), 1);
    }
}
