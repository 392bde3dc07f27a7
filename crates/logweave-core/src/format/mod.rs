//! Text formatters for log events
//!
//! Every formatter declares a priority and a predicate. The
//! [`FormatterManager`] asks them in ascending priority order and renders the
//! event with the first one that accepts it. The helpers in this module build
//! the bordered block layout shared by all formatters.

mod default;
mod exception;
mod manager;
mod request;

pub use default::DefaultFormatter;
pub use exception::ExceptionFormatter;
pub use manager::{fallback_line, FormatterManager};
pub use request::RequestFormatter;

use crate::record::LogEvent;
use serde_json::Value;
use std::fmt::{self, Write};

/// Renders a log event into a block of text
pub trait Formatter: Send + Sync {
    /// Short name, for diagnostics
    fn name(&self) -> &'static str;

    /// Lower is consulted earlier
    fn priority(&self) -> i32;

    /// Whether this formatter handles `event`
    fn can_format(&self, event: &LogEvent) -> bool;

    /// Render `event`
    fn format(&self, event: &LogEvent) -> Result<String, fmt::Error>;
}

const BORDER_WIDTH: usize = 80;
const LABEL_WIDTH: usize = 20;

pub(crate) fn border(out: &mut String, ch: char) -> fmt::Result {
    for _ in 0..BORDER_WIDTH {
        out.write_char(ch)?;
    }
    out.write_char('\n')
}

pub(crate) fn header(out: &mut String, title: &str) -> fmt::Result {
    border(out, '=')?;
    writeln!(out, "{:^width$}", title, width = BORDER_WIDTH)?;
    border(out, '=')
}

pub(crate) fn footer(out: &mut String) -> fmt::Result {
    border(out, '=')?;
    out.write_char('\n')
}

pub(crate) fn field(out: &mut String, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(out, "{:<width$}: {}", label, value, width = LABEL_WIDTH)
}

pub(crate) fn opt_field(out: &mut String, label: &str, value: Option<&str>) -> fmt::Result {
    match value {
        Some(v) if !v.is_empty() => field(out, label, v),
        _ => Ok(()),
    }
}

pub(crate) fn section(out: &mut String, title: &str, body: &str) -> fmt::Result {
    border(out, '-')?;
    writeln!(out, "{}:", title)?;
    for line in body.lines() {
        writeln!(out, "  {}", line)?;
    }
    Ok(())
}

/// Timestamp, level and rendered message
pub(crate) fn basic_info(out: &mut String, event: &LogEvent) -> fmt::Result {
    let record = &event.record;
    field(
        out,
        "Timestamp",
        record.timestamp().format("%Y-%m-%d %H:%M:%S%.3f UTC"),
    )?;
    field(out, "Level", record.level())?;
    field(out, "Kind", record.kind())?;
    field(out, "Rendered Message", record.message())
}

/// Text of a property value; strings are shown unquoted
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Pretty-print structured values as indented JSON; strings holding JSON are
/// parsed first, anything else is shown raw
pub(crate) fn pretty_value(value: &Value) -> String {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => {
                serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| s.clone())
            }
            _ => s.clone(),
        },
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => display_value(other),
    }
}

pub(crate) fn property_str<'a>(event: &'a LogEvent, key: &str) -> Option<&'a str> {
    event.properties.get_str(key)
}
