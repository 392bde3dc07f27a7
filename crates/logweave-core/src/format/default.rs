use super::{basic_info, field, footer, header, pretty_value, section, Formatter};
use crate::record::LogEvent;
use std::fmt::{self, Write};

/// Universal fallback: every property in key order
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFormatter;

impl DefaultFormatter {
    /// Priority of this formatter
    pub const PRIORITY: i32 = 1000;

    /// Create the formatter
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for DefaultFormatter {
    fn name(&self) -> &'static str {
        "DefaultFormatter"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn can_format(&self, _event: &LogEvent) -> bool {
        true
    }

    fn format(&self, event: &LogEvent) -> Result<String, fmt::Error> {
        let record = &event.record;
        let mut out = String::with_capacity(512);

        header(&mut out, "LOG EVENT")?;
        basic_info(&mut out, event)?;
        field(&mut out, "Source", record.source())?;
        field(&mut out, "Function", record.function_name())?;
        field(&mut out, "Correlation Id", record.correlation_id().unwrap_or("-"))?;

        if !event.properties.is_empty() {
            let mut props = String::new();
            for (key, value) in event.properties.sorted() {
                let rendered = pretty_value(value);
                if rendered.contains('\n') {
                    writeln!(props, "{}:", key)?;
                    for line in rendered.lines() {
                        writeln!(props, "  {}", line)?;
                    }
                } else {
                    writeln!(props, "{}: {}", key, rendered)?;
                }
            }
            section(&mut out, "Properties", &props)?;
        }

        if let Some(error) = &event.error {
            section(&mut out, "Error", &error.to_string())?;
        }

        footer(&mut out)?;
        Ok(out)
    }
}
