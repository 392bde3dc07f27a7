use super::{
    basic_info, display_value, field, footer, header, opt_field, pretty_value, property_str,
    section, Formatter,
};
use crate::record::{LogEvent, LogLevel, RecordBody, RecordKind};
use std::fmt::{self, Write};

/// Properties holding captured request/response detail, in render order
const DETAIL_BLOBS: &[(&str, &str)] = &[("Request", "Request Detail"), ("Response", "Response Detail")];

/// Renders custom messages, request-completion records and informational
/// API calls
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestFormatter;

impl RequestFormatter {
    /// Priority of this formatter
    pub const PRIORITY: i32 = 20;

    /// Create the formatter
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for RequestFormatter {
    fn name(&self) -> &'static str {
        "RequestFormatter"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn can_format(&self, event: &LogEvent) -> bool {
        event.kind() == RecordKind::CustomMessage || event.level() == LogLevel::Information
    }

    fn format(&self, event: &LogEvent) -> Result<String, fmt::Error> {
        let record = &event.record;
        let mut out = String::with_capacity(1024);

        header(&mut out, "REQUEST")?;
        basic_info(&mut out, event)?;
        field(&mut out, "Source", record.source())?;
        field(&mut out, "Function", record.function_name())?;
        field(&mut out, "Message", record.message())?;
        field(&mut out, "Correlation Id", record.correlation_id().unwrap_or("-"))?;
        opt_field(&mut out, "Route", record.route())?;
        opt_field(&mut out, "Method", property_str(event, "RequestMethod"))?;
        opt_field(&mut out, "Path", property_str(event, "RequestPath"))?;
        opt_field(&mut out, "Client IP", property_str(event, "ClientIp"))?;
        opt_field(&mut out, "User Agent", property_str(event, "UserAgent"))?;
        for key in ["StatusCode", "ElapsedMs", "IsSlowRequest"] {
            if let Some(value) = event.properties.get(key) {
                field(&mut out, key, display_value(value))?;
            }
        }

        for (key, title) in DETAIL_BLOBS {
            if let Some(value) = event.properties.get(key) {
                section(&mut out, title, &pretty_value(value))?;
            }
        }

        if let RecordBody::ApiCall {
            payload,
            is_exception,
        } = record.body()
        {
            let mut body = String::new();
            writeln!(body, "isException: {}", is_exception)?;
            for (key, value) in payload {
                writeln!(body, "{}: {}", key, value.as_deref().unwrap_or("null"))?;
            }
            section(&mut out, "API Payload", &body)?;
        }

        footer(&mut out)?;
        Ok(out)
    }
}
