//! Ordered, fault-isolated execution of enrichers

use super::{error_property_key, CorrelationEnricher, Enricher, EnvironmentEnricher, HttpContextEnricher};
use crate::config::Settings;
use crate::context::EnrichmentContext;
use crate::record::LogEvent;
use crate::redaction::RedactionPolicy;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Enable flag and priority of one registered enricher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnricherStatus {
    /// Whether the enricher runs
    pub enabled: bool,
    /// Lower runs earlier
    pub priority: i32,
}

/// Outcome of one composite enrichment pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    /// Enrichers that completed without error
    pub succeeded: Vec<String>,
    /// Enrichers that returned an error or panicked
    pub failed: Vec<String>,
    /// Enrichers that ran past their time budget
    pub slow: Vec<String>,
}

/// Runs enabled enrichers in ascending priority order
///
/// The order is fixed at construction, so every event sees the same
/// sequence. A failing enricher leaves a `<Name>_Error` property behind and
/// the remaining enrichers still run.
#[derive(Clone)]
pub struct CompositeEnricher {
    enrichers: Vec<Arc<dyn Enricher>>,
    statuses: BTreeMap<String, EnricherStatus>,
}

impl CompositeEnricher {
    /// Build from a set of enrichers; disabled ones are kept for
    /// introspection only
    pub fn new(enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        let statuses = enrichers
            .iter()
            .map(|e| {
                let d = e.descriptor();
                (
                    d.name.clone(),
                    EnricherStatus {
                        enabled: d.enabled,
                        priority: d.priority,
                    },
                )
            })
            .collect();

        let mut enrichers: Vec<_> = enrichers
            .into_iter()
            .filter(|e| e.descriptor().enabled)
            .collect();
        // stable: equal priorities keep registration order
        enrichers.sort_by_key(|e| e.descriptor().priority);

        Self {
            enrichers,
            statuses,
        }
    }

    /// Build the correlation, HTTP and environment enrichers from settings
    pub fn from_settings(settings: &Settings, redaction: Arc<RedactionPolicy>) -> Self {
        Self::new(builtin_enrichers(settings, redaction))
    }

    /// Number of enrichers that run
    pub fn enabled_count(&self) -> usize {
        self.enrichers.len()
    }

    /// Name to enable flag and priority, for every registered enricher
    pub fn descriptors(&self) -> &BTreeMap<String, EnricherStatus> {
        &self.statuses
    }

    /// Names of the enrichers that run, in execution order
    pub fn execution_order(&self) -> Vec<&str> {
        self.enrichers
            .iter()
            .map(|e| e.descriptor().name.as_str())
            .collect()
    }

    /// Run every enabled enricher against `event`.
    ///
    /// Never panics and never returns an error; failures are recorded in
    /// the property set and the returned summary. Afterwards the record
    /// adopts the `CorrelationId` property if it had no correlation ID.
    pub fn enrich(&self, event: &mut LogEvent, ctx: &EnrichmentContext<'_>) -> EnrichmentSummary {
        let mut summary = EnrichmentSummary::default();
        let LogEvent {
            record, properties, ..
        } = event;

        for enricher in &self.enrichers {
            let name = enricher.descriptor().name.as_str();
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                enricher.enrich(record, ctx, properties)
            }));
            let elapsed = started.elapsed();

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(format!("{} panicked: {}", name, panic_message(&*payload))),
            };

            match failure {
                None => summary.succeeded.push(name.to_string()),
                Some(message) => {
                    tracing::warn!(
                        target: "logweave",
                        enricher = name,
                        error = %message,
                        "Enricher failed"
                    );
                    properties.add_if_absent(error_property_key(name), message);
                    summary.failed.push(name.to_string());
                }
            }

            let budget = enricher.budget();
            if elapsed > budget {
                tracing::warn!(
                    target: "logweave",
                    enricher = name,
                    elapsed_ms = millis(elapsed),
                    budget_ms = millis(budget),
                    "Enricher exceeded its time budget"
                );
                summary.slow.push(name.to_string());
            }
        }

        if record.correlation_id().is_none() {
            if let Some(id) = properties.get_str("CorrelationId") {
                let id = id.to_string();
                record.assign_correlation_id(id);
            }
        }

        summary
    }
}

impl std::fmt::Debug for CompositeEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEnricher")
            .field("order", &self.execution_order())
            .field("statuses", &self.statuses)
            .finish()
    }
}

/// The built-in enrichers configured by `settings`
pub fn builtin_enrichers(
    settings: &Settings,
    redaction: Arc<RedactionPolicy>,
) -> Vec<Arc<dyn Enricher>> {
    vec![
        Arc::new(CorrelationEnricher::from_settings(
            &settings.correlation,
            &settings.enrichers.correlation,
        )),
        Arc::new(HttpContextEnricher::from_settings(
            &settings.enrichers.http,
            redaction,
        )),
        Arc::new(EnvironmentEnricher::from_settings(
            &settings.application,
            &settings.enrichers.environment,
        )),
    ]
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::enrich::EnricherDescriptor;
    use crate::error::EnrichError;
    use crate::properties::PropertySet;
    use crate::record::LogRecord;
    use http::{HeaderMap, Method};
    use std::sync::Mutex;

    struct Fixed {
        descriptor: EnricherDescriptor,
        key: &'static str,
        value: &'static str,
        log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl Fixed {
        fn new(name: &str, priority: i32, key: &'static str, value: &'static str) -> Self {
            Self {
                descriptor: EnricherDescriptor::new(name, true, priority),
                key,
                value,
                log: None,
            }
        }
    }

    impl Enricher for Fixed {
        fn descriptor(&self) -> &EnricherDescriptor {
            &self.descriptor
        }

        fn enrich(
            &self,
            _record: &LogRecord,
            _ctx: &EnrichmentContext<'_>,
            properties: &mut PropertySet,
        ) -> Result<(), EnrichError> {
            if let Some(log) = &self.log {
                log.lock().unwrap().push(self.descriptor.name.clone());
            }
            properties.add_if_absent(self.key, self.value);
            Ok(())
        }
    }

    struct Failing {
        descriptor: EnricherDescriptor,
        panic: bool,
    }

    impl Enricher for Failing {
        fn descriptor(&self) -> &EnricherDescriptor {
            &self.descriptor
        }

        fn enrich(
            &self,
            _record: &LogRecord,
            _ctx: &EnrichmentContext<'_>,
            _properties: &mut PropertySet,
        ) -> Result<(), EnrichError> {
            if self.panic {
                panic!("boom");
            }
            Err(EnrichError::new(&self.descriptor.name, "lookup refused"))
        }
    }

    struct Sleepy {
        descriptor: EnricherDescriptor,
    }

    impl Enricher for Sleepy {
        fn descriptor(&self) -> &EnricherDescriptor {
            &self.descriptor
        }

        fn budget(&self) -> Duration {
            Duration::from_millis(1)
        }

        fn enrich(
            &self,
            _record: &LogRecord,
            _ctx: &EnrichmentContext<'_>,
            properties: &mut PropertySet,
        ) -> Result<(), EnrichError> {
            std::thread::sleep(Duration::from_millis(10));
            properties.add_if_absent("Slept", true);
            Ok(())
        }
    }

    fn event() -> LogEvent {
        LogEvent::new(LogRecord::custom_message("tests", "composite", "hello"))
    }

    #[test]
    fn test_runs_in_priority_order_and_first_writer_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut late = Fixed::new("Late", 30, "Owner", "late");
        late.log = Some(log.clone());
        let mut early = Fixed::new("Early", 5, "Owner", "early");
        early.log = Some(log.clone());
        let composite = CompositeEnricher::new(vec![Arc::new(late), Arc::new(early)]);

        let mut ev = event();
        composite.enrich(&mut ev, &EnrichmentContext::none());

        assert_eq!(*log.lock().unwrap(), vec!["Early", "Late"]);
        assert_eq!(ev.properties.get_str("Owner"), Some("early"));
        assert_eq!(composite.execution_order(), vec!["Early", "Late"]);
    }

    #[test]
    fn test_disabled_enrichers_are_listed_but_skipped() {
        let mut off = Fixed::new("Off", 1, "Off", "x");
        off.descriptor.enabled = false;
        let on = Fixed::new("On", 2, "On", "y");
        let composite = CompositeEnricher::new(vec![Arc::new(off), Arc::new(on)]);

        assert_eq!(composite.enabled_count(), 1);
        assert_eq!(
            composite.descriptors().get("Off"),
            Some(&EnricherStatus {
                enabled: false,
                priority: 1
            })
        );
        let mut ev = event();
        composite.enrich(&mut ev, &EnrichmentContext::none());
        assert!(!ev.properties.contains_key("Off"));
        assert_eq!(ev.properties.get_str("On"), Some("y"));
    }

    #[test]
    fn test_failing_enricher_is_isolated() {
        let composite = CompositeEnricher::new(vec![
            Arc::new(Fixed::new("Before", 1, "Before", "ok")),
            Arc::new(Failing {
                descriptor: EnricherDescriptor::new("Broken", true, 2),
                panic: false,
            }),
            Arc::new(Fixed::new("After", 3, "After", "ok")),
        ]);

        let mut ev = event();
        let summary = composite.enrich(&mut ev, &EnrichmentContext::none());

        assert_eq!(ev.properties.get_str("Before"), Some("ok"));
        assert_eq!(ev.properties.get_str("After"), Some("ok"));
        assert_eq!(
            ev.properties.get_str("Broken_Error"),
            Some("Broken failed: lookup refused")
        );
        assert_eq!(summary.failed, vec!["Broken"]);
        assert_eq!(summary.succeeded, vec!["Before", "After"]);
    }

    #[test]
    fn test_panicking_enricher_is_isolated() {
        let composite = CompositeEnricher::new(vec![
            Arc::new(Failing {
                descriptor: EnricherDescriptor::new("Panicky", true, 1),
                panic: true,
            }),
            Arc::new(Fixed::new("After", 2, "After", "ok")),
        ]);

        let mut ev = event();
        composite.enrich(&mut ev, &EnrichmentContext::none());

        let error = ev.properties.get_str("Panicky_Error").unwrap();
        assert!(error.contains("boom"));
        assert_eq!(ev.properties.get_str("After"), Some("ok"));
    }

    #[test]
    fn test_budget_breach_keeps_result() {
        let composite = CompositeEnricher::new(vec![Arc::new(Sleepy {
            descriptor: EnricherDescriptor::new("Sleepy", true, 1),
        })]);
        let mut ev = event();
        let summary = composite.enrich(&mut ev, &EnrichmentContext::none());
        assert_eq!(summary.slow, vec!["Sleepy"]);
        assert_eq!(ev.properties.get("Slept"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_second_pass_never_overwrites() {
        let settings = Settings::default();
        let composite =
            CompositeEnricher::from_settings(&settings, Arc::new(RedactionPolicy::new()));
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", "abc-123".parse().unwrap());
        let request =
            RequestContext::new(Method::GET, "/orders".parse().unwrap()).with_headers(headers);
        let ctx = EnrichmentContext::for_request(&request);

        let mut ev = event();
        composite.enrich(&mut ev, &ctx);
        let first = ev.properties.clone();
        composite.enrich(&mut ev, &ctx);

        for (key, value) in first.iter() {
            assert_eq!(ev.properties.get(key), Some(value), "{} changed", key);
        }
        assert_eq!(ev.record.correlation_id(), Some("abc-123"));
    }

    #[test]
    fn test_builtin_order() {
        let composite = CompositeEnricher::from_settings(
            &Settings::default(),
            Arc::new(RedactionPolicy::new()),
        );
        assert_eq!(
            composite.execution_order(),
            vec![
                CorrelationEnricher::NAME,
                HttpContextEnricher::NAME,
                EnvironmentEnricher::NAME
            ]
        );
        assert_eq!(composite.descriptors().len(), 3);
    }
}
