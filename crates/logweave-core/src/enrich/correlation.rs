//! Correlation ID resolution and enrichment

use super::{Enricher, EnricherDescriptor};
use crate::config::{CorrelationEnricherSettings, CorrelationSettings};
use crate::context::{EnrichmentContext, RequestContext};
use crate::error::EnrichError;
use crate::properties::PropertySet;
use crate::record::LogRecord;
use std::time::Duration;

/// Well-known headers consulted after the configured correlation header
pub const ALTERNATE_CORRELATION_HEADERS: &[&str] =
    &["X-Request-Id", "X-Trace-Id", "TraceId", "RequestId"];

/// Where a correlation ID came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationSource {
    /// The configured correlation header
    Header,
    /// One of [`ALTERNATE_CORRELATION_HEADERS`]
    AlternateHeader,
    /// The active distributed trace
    TraceContext,
    /// Assigned earlier in the same request
    RequestState,
    /// Minted because nothing else was available
    Generated,
}

impl CorrelationSource {
    /// Name used in the `CorrelationIdSource` property
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "Header",
            Self::AlternateHeader => "AlternateHeader",
            Self::TraceContext => "TraceContext",
            Self::RequestState => "RequestState",
            Self::Generated => "Generated",
        }
    }
}

/// Mint a new correlation ID
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn non_empty_header(request: &RequestContext, name: &str) -> Option<String> {
    request
        .header(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Resolve the correlation ID of a request without generating one.
///
/// Tries the configured header, the alternate headers, the trace context,
/// then any ID already stored on the request.
pub fn resolve_correlation_id(
    request: &RequestContext,
    header_name: &str,
) -> Option<(String, CorrelationSource)> {
    if let Some(id) = non_empty_header(request, header_name) {
        return Some((id, CorrelationSource::Header));
    }
    for name in ALTERNATE_CORRELATION_HEADERS {
        if let Some(id) = non_empty_header(request, name) {
            return Some((id, CorrelationSource::AlternateHeader));
        }
    }
    if let Some(trace) = request.trace() {
        if !trace.trace_id.is_empty() {
            return Some((trace.trace_id.clone(), CorrelationSource::TraceContext));
        }
    }
    request
        .correlation_id()
        .map(|id| (id.to_string(), CorrelationSource::RequestState))
}

/// Attaches the correlation ID plus trace, session and connection identifiers
pub struct CorrelationEnricher {
    descriptor: EnricherDescriptor,
    header_name: String,
    generate_if_missing: bool,
    budget: Duration,
}

impl CorrelationEnricher {
    /// Enricher name
    pub const NAME: &'static str = "CorrelationEnricher";

    /// Create with the default header, generation enabled, priority 5
    pub fn new() -> Self {
        Self::from_settings(
            &CorrelationSettings::default(),
            &CorrelationEnricherSettings::default(),
        )
    }

    /// Create from settings
    pub fn from_settings(
        correlation: &CorrelationSettings,
        settings: &CorrelationEnricherSettings,
    ) -> Self {
        let toggle = settings.toggle();
        Self {
            descriptor: EnricherDescriptor::new(Self::NAME, toggle.enabled, toggle.priority),
            header_name: correlation.header_name.clone(),
            generate_if_missing: correlation.generate_if_missing,
            budget: Duration::from_millis(toggle.budget_ms),
        }
    }

    /// Toggle ID generation
    pub fn generate_if_missing(mut self, generate: bool) -> Self {
        self.generate_if_missing = generate;
        self
    }
}

impl Default for CorrelationEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for CorrelationEnricher {
    fn descriptor(&self) -> &EnricherDescriptor {
        &self.descriptor
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    fn enrich(
        &self,
        record: &LogRecord,
        ctx: &EnrichmentContext<'_>,
        properties: &mut PropertySet,
    ) -> Result<(), EnrichError> {
        let resolved = match (record.correlation_id(), ctx.request) {
            (Some(explicit), _) => Some((explicit.to_string(), CorrelationSource::RequestState)),
            (None, Some(request)) => match request.correlation_id() {
                // already resolved through this same chain earlier in the request
                Some(stored) => Some((stored.to_string(), CorrelationSource::RequestState)),
                None => resolve_correlation_id(request, &self.header_name).map(|(id, source)| {
                    (request.set_correlation_id(id).to_string(), source)
                }),
            },
            (None, None) => None,
        };

        let resolved = resolved.or_else(|| {
            if !self.generate_if_missing {
                return None;
            }
            let id = generate_correlation_id();
            let id = match ctx.request {
                Some(request) => request.set_correlation_id(id).to_string(),
                None => id,
            };
            Some((id, CorrelationSource::Generated))
        });

        if let Some((id, source)) = resolved {
            properties.add_if_absent("CorrelationId", id);
            properties.add_if_absent("CorrelationIdSource", source.as_str());
        }

        let Some(request) = ctx.request else {
            return Ok(());
        };

        if let Some(trace) = request.trace() {
            properties.add_if_absent("TraceId", trace.trace_id.clone());
            properties.add_if_absent("SpanId", trace.span_id.clone());
            properties.add_opt("ParentSpanId", trace.parent_span_id.clone());
            properties.add_opt("OperationName", trace.operation_name.clone());
        }
        properties.add_opt("SessionId", request.session_id().map(String::from));
        properties.add_opt("ConnectionId", request.connection_id().map(String::from));
        Ok(())
    }
}
