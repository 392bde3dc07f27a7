//! HTTP request/response context enrichment

use super::{Enricher, EnricherDescriptor};
use crate::config::HttpEnricherSettings;
use crate::context::EnrichmentContext;
use crate::error::EnrichError;
use crate::properties::PropertySet;
use crate::record::LogRecord;
use crate::redaction::RedactionPolicy;
use http::{header, Version};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Attaches method, path, client, user and (opt-in) header/query details
pub struct HttpContextEnricher {
    descriptor: EnricherDescriptor,
    redaction: Arc<RedactionPolicy>,
    include_request_headers: bool,
    include_response_headers: bool,
    include_query_string: bool,
    budget: Duration,
}

impl HttpContextEnricher {
    /// Enricher name
    pub const NAME: &'static str = "HttpContextEnricher";

    /// Create with default settings (headers and query not attached)
    pub fn new(redaction: Arc<RedactionPolicy>) -> Self {
        Self::from_settings(&HttpEnricherSettings::default(), redaction)
    }

    /// Create from settings
    pub fn from_settings(settings: &HttpEnricherSettings, redaction: Arc<RedactionPolicy>) -> Self {
        let toggle = settings.toggle();
        Self {
            descriptor: EnricherDescriptor::new(Self::NAME, toggle.enabled, toggle.priority),
            redaction,
            include_request_headers: settings.include_request_headers,
            include_response_headers: settings.include_response_headers,
            include_query_string: settings.include_query_string,
            budget: Duration::from_millis(toggle.budget_ms),
        }
    }

    /// Attach redacted request headers
    pub fn include_request_headers(mut self, include: bool) -> Self {
        self.include_request_headers = include;
        self
    }

    /// Attach redacted response headers
    pub fn include_response_headers(mut self, include: bool) -> Self {
        self.include_response_headers = include;
        self
    }

    /// Attach the redacted query string
    pub fn include_query_string(mut self, include: bool) -> Self {
        self.include_query_string = include;
        self
    }
}

fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

impl Enricher for HttpContextEnricher {
    fn descriptor(&self) -> &EnricherDescriptor {
        &self.descriptor
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    fn enrich(
        &self,
        _record: &LogRecord,
        ctx: &EnrichmentContext<'_>,
        properties: &mut PropertySet,
    ) -> Result<(), EnrichError> {
        let Some(request) = ctx.request else {
            return Ok(());
        };

        properties.add_if_absent("RequestMethod", request.method().as_str());
        properties.add_if_absent("RequestPath", request.path());
        properties.add_if_absent("RequestProtocol", protocol_name(request.version()));

        let scheme = request
            .uri()
            .scheme_str()
            .or_else(|| request.header("x-forwarded-proto"))
            .unwrap_or("http");
        properties.add_if_absent("RequestScheme", scheme);

        let host = request
            .uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| request.header(header::HOST.as_str()));
        properties.add_opt("RequestHost", host.map(String::from));

        if let Some(response) = ctx.response {
            properties.add_if_absent("StatusCode", response.status_code);
        }

        properties.add_opt("ClientIp", request.client_ip());
        properties.add_opt(
            "UserAgent",
            request.header(header::USER_AGENT.as_str()).map(String::from),
        );
        let content_length = request
            .header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<u64>().ok());
        properties.add_opt("ContentLength", content_length);
        properties.add_opt(
            "ContentType",
            request.header(header::CONTENT_TYPE.as_str()).map(String::from),
        );

        match request.user() {
            Some(user) => {
                properties.add_if_absent("IsAuthenticated", true);
                properties.add_if_absent("UserName", user.name.clone());
                if !user.roles.is_empty() {
                    properties.add_if_absent("UserRoles", json!(user.roles));
                }
                properties.add_opt("AuthenticationType", user.authentication_type.clone());
            }
            None => {
                properties.add_if_absent("IsAuthenticated", false);
            }
        }

        if self.include_request_headers {
            let headers = self.redaction.redact_headers(request.headers());
            properties.add_if_absent("RequestHeaders", json!(headers));
        }

        if self.include_response_headers {
            if let Some(response) = ctx.response {
                let headers = self.redaction.redact_headers(&response.raw_headers);
                properties.add_if_absent("ResponseHeaders", json!(headers));
            }
        }

        if self.include_query_string {
            if let Some(query) = request.query().filter(|q| !q.is_empty()) {
                properties.add_if_absent("QueryString", self.redaction.redact_query(query));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestContext, ResponseSnapshot, UserIdentity};
    use http::{HeaderMap, Method, StatusCode};

    fn request() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "curl/8.0".parse().unwrap());
        headers.insert("authorization", "Bearer secret-token".parse().unwrap());
        headers.insert("x-forwarded-for", "198.51.100.4, 10.0.0.1".parse().unwrap());
        headers.insert("host", "api.example.com".parse().unwrap());
        RequestContext::new(Method::POST, "/orders?page=1&token=abc".parse().unwrap())
            .with_headers(headers)
            .with_user(UserIdentity::new("ann").with_role("admin"))
    }

    #[test]
    fn test_basic_properties() {
        let enricher = HttpContextEnricher::new(Arc::new(RedactionPolicy::new()));
        let req = request();
        let response = ResponseSnapshot::new(StatusCode::CREATED, 12);
        let mut props = PropertySet::new();
        let record = LogRecord::custom_message("t", "f", "m");
        enricher
            .enrich(
                &record,
                &EnrichmentContext::for_request(&req).with_response(&response),
                &mut props,
            )
            .unwrap();

        assert_eq!(props.get_str("RequestMethod"), Some("POST"));
        assert_eq!(props.get_str("RequestPath"), Some("/orders"));
        assert_eq!(props.get_str("RequestProtocol"), Some("HTTP/1.1"));
        assert_eq!(props.get_str("RequestHost"), Some("api.example.com"));
        assert_eq!(props.get("StatusCode"), Some(&json!(201)));
        assert_eq!(props.get_str("ClientIp"), Some("198.51.100.4"));
        assert_eq!(props.get_str("UserAgent"), Some("curl/8.0"));
        assert_eq!(props.get_str("UserName"), Some("ann"));
        assert_eq!(props.get("UserRoles"), Some(&json!(["admin"])));
        assert!(!props.contains_key("RequestHeaders"));
        assert!(!props.contains_key("QueryString"));
    }

    #[test]
    fn test_opt_in_headers_and_query_are_redacted() {
        let enricher = HttpContextEnricher::new(Arc::new(RedactionPolicy::new()))
            .include_request_headers(true)
            .include_query_string(true);
        let req = request();
        let mut props = PropertySet::new();
        let record = LogRecord::custom_message("t", "f", "m");
        enricher
            .enrich(&record, &EnrichmentContext::for_request(&req), &mut props)
            .unwrap();

        let headers = props.get("RequestHeaders").unwrap();
        assert_eq!(headers["authorization"], json!("[REDACTED]"));
        assert_eq!(headers["user-agent"], json!("curl/8.0"));
        assert_eq!(props.get_str("QueryString"), Some("page=1&token=[REDACTED]"));
        let rendered = serde_json::to_string(&props).unwrap();
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn test_no_request_adds_nothing() {
        let enricher = HttpContextEnricher::new(Arc::new(RedactionPolicy::new()));
        let mut props = PropertySet::new();
        let record = LogRecord::custom_message("t", "f", "m");
        enricher
            .enrich(&record, &EnrichmentContext::none(), &mut props)
            .unwrap();
        assert!(props.is_empty());
    }
}
