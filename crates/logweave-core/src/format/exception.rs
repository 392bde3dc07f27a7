use super::{basic_info, field, footer, header, opt_field, pretty_value, property_str, section, Formatter};
use crate::record::{LogEvent, RecordKind};
use std::fmt::{self, Write};

/// Renders exception records and any event carrying a native error
#[derive(Clone, Copy, Debug, Default)]
pub struct ExceptionFormatter;

impl ExceptionFormatter {
    /// Priority of this formatter
    pub const PRIORITY: i32 = 10;

    /// Create the formatter
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for ExceptionFormatter {
    fn name(&self) -> &'static str {
        "ExceptionFormatter"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn can_format(&self, event: &LogEvent) -> bool {
        event.kind() == RecordKind::Exception || event.error.is_some()
    }

    fn format(&self, event: &LogEvent) -> Result<String, fmt::Error> {
        let record = &event.record;
        let mut out = String::with_capacity(1024);

        header(&mut out, "EXCEPTION")?;
        basic_info(&mut out, event)?;
        field(&mut out, "Source", record.source())?;
        field(&mut out, "Function", record.function_name())?;
        field(&mut out, "Correlation Id", record.correlation_id().unwrap_or("-"))?;
        opt_field(&mut out, "Route", record.route())?;
        opt_field(&mut out, "Request", property_str(event, "RequestPath"))?;
        opt_field(&mut out, "Method", property_str(event, "RequestMethod"))?;
        opt_field(&mut out, "User", property_str(event, "UserName"))?;

        if let Some(details) = record.exception_details() {
            field(&mut out, "Message", &details.message)?;
            field(&mut out, "Policy Validation", details.is_policy_validation)?;

            if !details.function_parameters.is_empty() {
                let mut params = String::new();
                for (name, value) in &details.function_parameters {
                    let rendered = pretty_value(value);
                    if rendered.contains('\n') {
                        writeln!(params, "{}:", name)?;
                        for line in rendered.lines() {
                            writeln!(params, "  {}", line)?;
                        }
                    } else {
                        writeln!(params, "{}: {}", name, rendered)?;
                    }
                }
                section(&mut out, "Function Parameters", &params)?;
            }

            if let Some(trace) = &details.stack_trace {
                section(&mut out, "Stack Trace", trace)?;
            }
            if details.inner_message.is_some() || details.inner_detail.is_some() {
                let mut inner = String::new();
                if let Some(message) = &details.inner_message {
                    writeln!(inner, "{}", message)?;
                }
                if let Some(detail) = &details.inner_detail {
                    writeln!(inner, "{}", detail)?;
                }
                section(&mut out, "Inner Exception", &inner)?;
            }
        } else {
            field(&mut out, "Message", record.message())?;
        }

        if let Some(error) = &event.error {
            section(&mut out, "Error", &error.to_string())?;
        }

        footer(&mut out)?;
        Ok(out)
    }
}
