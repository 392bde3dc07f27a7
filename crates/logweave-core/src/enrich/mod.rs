//! Enrichers attach structured properties to a log event
//!
//! Each enricher inspects the ambient request or process state and adds
//! named properties with add-if-absent semantics. The
//! [`CompositeEnricher`] runs the enabled ones in ascending priority order,
//! isolating failures so one broken enricher never stops the rest.

mod composite;
mod correlation;
mod environment;
mod http;

pub use composite::{builtin_enrichers, CompositeEnricher, EnricherStatus, EnrichmentSummary};
pub use correlation::{
    generate_correlation_id, resolve_correlation_id, CorrelationEnricher, CorrelationSource,
    ALTERNATE_CORRELATION_HEADERS,
};
pub use environment::EnvironmentEnricher;
pub use http::HttpContextEnricher;

use crate::context::EnrichmentContext;
use crate::error::EnrichError;
use crate::properties::PropertySet;
use crate::record::LogRecord;
use std::time::Duration;

/// Default soft time budget of an enricher
pub const DEFAULT_ENRICHER_BUDGET: Duration = Duration::from_millis(50);

/// Identity and ordering of an enricher
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnricherDescriptor {
    /// Unique name, used for the `<Name>_Error` property
    pub name: String,
    /// Whether the enricher runs
    pub enabled: bool,
    /// Lower runs earlier
    pub priority: i32,
}

impl EnricherDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, enabled: bool, priority: i32) -> Self {
        Self {
            name: name.into(),
            enabled,
            priority,
        }
    }
}

/// Adds properties to a log event
///
/// Implementations must be stateless or hold only state fixed at
/// construction; they are called concurrently from every in-flight request.
pub trait Enricher: Send + Sync {
    /// Name, enable flag and priority
    fn descriptor(&self) -> &EnricherDescriptor;

    /// Soft time budget; exceeding it is reported, never enforced
    fn budget(&self) -> Duration {
        DEFAULT_ENRICHER_BUDGET
    }

    /// Add properties for `record` to `properties`
    fn enrich(
        &self,
        record: &LogRecord,
        ctx: &EnrichmentContext<'_>,
        properties: &mut PropertySet,
    ) -> Result<(), EnrichError>;
}

/// Property key recording an enricher failure
pub fn error_property_key(enricher_name: &str) -> String {
    format!("{}_Error", enricher_name)
}
