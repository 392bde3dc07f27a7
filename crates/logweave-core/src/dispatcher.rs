//! Logger builder and sink dispatcher
//!
//! Construction is two-stage. A [`LoggerBuilder`] collects sink
//! configuration early, without touching any collaborator. [`LoggerBuilder::build`]
//! then receives every transport at once in [`SinkServices`] and returns an
//! immutable [`Dispatcher`].

use crate::config::Settings;
use crate::context::EnrichmentContext;
use crate::enrich::{builtin_enrichers, CompositeEnricher, Enricher};
use crate::error::{LogweaveError, Result, SinkError};
use crate::format::{Formatter, FormatterManager};
use crate::record::{LogEvent, LogLevel};
use crate::redaction::RedactionPolicy;
use crate::sink::{
    should_emit, ApmSink, BackgroundMailTransport, BackgroundTransport, CollectorSink,
    EmailOptions, EmailSink, EventTransport, FileSink, MailTransport, Sink,
    DEFAULT_QUEUE_CAPACITY,
};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Collaborators handed to [`LoggerBuilder::build`]
#[derive(Clone, Default)]
pub struct SinkServices {
    /// Transport for the centralized log collector
    pub collector: Option<Arc<dyn EventTransport>>,
    /// Transport for the APM backend
    pub apm: Option<Arc<dyn EventTransport>>,
    /// Mail relay
    pub mail: Option<Arc<dyn MailTransport>>,
    /// Deliver wire payloads and mails from background tasks; needs a tokio runtime
    pub background: bool,
}

impl SinkServices {
    /// No collaborators
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collector transport
    pub fn with_collector(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.collector = Some(transport);
        self
    }

    /// Set the APM transport
    pub fn with_apm(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.apm = Some(transport);
        self
    }

    /// Set the mail relay
    pub fn with_mail(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.mail = Some(transport);
        self
    }

    /// Deliver wire payloads and mails from background tasks
    pub fn in_background(mut self) -> Self {
        self.background = true;
        self
    }
}

#[derive(Clone, Debug)]
enum SinkPlan {
    File {
        base: PathBuf,
        minimum_level: Option<LogLevel>,
    },
    Collector {
        url: String,
        minimum_level: Option<LogLevel>,
    },
    Apm {
        service_name: String,
        minimum_level: Option<LogLevel>,
    },
    Email(EmailOptions),
}

/// Collects sink configuration before any transport exists
pub struct LoggerBuilder {
    settings: Settings,
    plans: Vec<SinkPlan>,
    custom_sinks: Vec<Arc<dyn Sink>>,
    extra_enrichers: Vec<Arc<dyn Enricher>>,
    formatters: Option<Vec<Arc<dyn Formatter>>>,
}

impl LoggerBuilder {
    /// A builder with no sinks
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            plans: Vec::new(),
            custom_sinks: Vec::new(),
            extra_enrichers: Vec::new(),
            formatters: None,
        }
    }

    /// A builder with the sinks enabled in `settings.sinks`
    pub fn from_settings(settings: Settings) -> Self {
        let sinks = settings.sinks.clone();
        let mut builder = Self::new(settings);
        if sinks.file.enabled {
            builder.plans.push(SinkPlan::File {
                base: PathBuf::from(&sinks.file.base_path),
                minimum_level: sinks.file.minimum_level,
            });
        }
        if sinks.collector.enabled {
            builder.plans.push(SinkPlan::Collector {
                url: sinks.collector.url.clone(),
                minimum_level: sinks.collector.minimum_level,
            });
        }
        if sinks.apm.enabled {
            builder.plans.push(SinkPlan::Apm {
                service_name: sinks.apm.service_name.clone(),
                minimum_level: sinks.apm.minimum_level,
            });
        }
        if sinks.email.enabled {
            builder
                .plans
                .push(SinkPlan::Email(EmailOptions::from(&sinks.email)));
        }
        builder
    }

    /// Error and request files under `base`
    pub fn write_to_file(mut self, base: impl Into<PathBuf>) -> Self {
        self.plans.push(SinkPlan::File {
            base: base.into(),
            minimum_level: None,
        });
        self
    }

    /// Centralized log collector at `url`
    pub fn write_to_centralized_log(mut self, url: impl Into<String>) -> Self {
        self.plans.push(SinkPlan::Collector {
            url: url.into(),
            minimum_level: None,
        });
        self
    }

    /// APM backend, reporting as the configured service name
    pub fn write_to_apm(mut self) -> Self {
        let service_name = self.settings.sinks.apm.service_name.clone();
        self.plans.push(SinkPlan::Apm {
            service_name,
            minimum_level: None,
        });
        self
    }

    /// Email alerts for system failures
    pub fn write_to_email(mut self, options: EmailOptions) -> Self {
        self.plans.push(SinkPlan::Email(options));
        self
    }

    /// Any other sink
    pub fn write_to(mut self, sink: Arc<dyn Sink>) -> Self {
        self.custom_sinks.push(sink);
        self
    }

    /// Run an extra enricher alongside the built-in ones
    pub fn enrich_with(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.extra_enrichers.push(enricher);
        self
    }

    /// Replace the standard formatter set
    pub fn format_with(mut self, formatters: Vec<Arc<dyn Formatter>>) -> Self {
        self.formatters = Some(formatters);
        self
    }

    /// Resolve every collaborator and freeze the configuration.
    ///
    /// Fails when a configured sink has no matching service.
    pub fn build(self, services: SinkServices) -> Result<Dispatcher> {
        let redaction = Arc::new(RedactionPolicy::from_settings(&self.settings.redaction));
        let formatter = Arc::new(match self.formatters {
            Some(formatters) => FormatterManager::new(formatters),
            None => FormatterManager::standard(),
        });

        let mut enrichers = builtin_enrichers(&self.settings, redaction.clone());
        enrichers.extend(self.extra_enrichers);
        let enricher = CompositeEnricher::new(enrichers);

        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
        for plan in self.plans {
            match plan {
                SinkPlan::File {
                    base,
                    minimum_level,
                } => {
                    sinks.push(Arc::new(
                        FileSink::errors(&base, formatter.clone()).with_minimum_level(minimum_level),
                    ));
                    sinks.push(Arc::new(
                        FileSink::requests(&base, formatter.clone())
                            .with_minimum_level(minimum_level),
                    ));
                }
                SinkPlan::Collector { url, minimum_level } => {
                    if url.is_empty() {
                        return Err(LogweaveError::Config(
                            "collector sink needs a URL".to_string(),
                        ));
                    }
                    let transport = wire_transport("collector", services.collector.clone(), &services)?;
                    sinks.push(Arc::new(
                        CollectorSink::new(url, transport).with_minimum_level(minimum_level),
                    ));
                }
                SinkPlan::Apm {
                    service_name,
                    minimum_level,
                } => {
                    let transport = wire_transport("apm", services.apm.clone(), &services)?;
                    sinks.push(Arc::new(
                        ApmSink::new(service_name, transport).with_minimum_level(minimum_level),
                    ));
                }
                SinkPlan::Email(options) => {
                    let transport = mail_transport(&services)?;
                    sinks.push(Arc::new(EmailSink::new(
                        options,
                        transport,
                        formatter.clone(),
                    )));
                }
            }
        }
        sinks.extend(self.custom_sinks);

        tracing::debug!(
            target: "logweave",
            sinks = sinks.len(),
            enrichers = enricher.enabled_count(),
            "Logger built"
        );

        Ok(Dispatcher {
            settings: Arc::new(self.settings),
            redaction,
            enricher,
            formatter,
            sinks,
        })
    }
}

fn wire_transport(
    name: &str,
    transport: Option<Arc<dyn EventTransport>>,
    services: &SinkServices,
) -> Result<Arc<dyn EventTransport>> {
    let transport = transport.ok_or_else(|| {
        LogweaveError::Config(format!("{} sink needs an event transport", name))
    })?;
    if services.background {
        let background = BackgroundTransport::spawn(name, transport, DEFAULT_QUEUE_CAPACITY)?;
        Ok(Arc::new(background))
    } else {
        Ok(transport)
    }
}

fn mail_transport(services: &SinkServices) -> Result<Arc<dyn MailTransport>> {
    let transport = services.mail.clone().ok_or_else(|| {
        LogweaveError::Config("email sink needs a mail transport".to_string())
    })?;
    if services.background {
        let background = BackgroundMailTransport::spawn(transport, DEFAULT_QUEUE_CAPACITY)?;
        Ok(Arc::new(background))
    } else {
        Ok(transport)
    }
}

/// Result of delivering one event
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Sinks that took the event
    pub delivered: Vec<String>,
    /// Sinks whose filter rejected the event
    pub skipped: Vec<String>,
    /// Sinks that failed, with the reason
    pub failed: Vec<(String, SinkError)>,
}

/// Enriches events and fans them out to every sink whose filter matches
pub struct Dispatcher {
    settings: Arc<Settings>,
    redaction: Arc<RedactionPolicy>,
    enricher: CompositeEnricher,
    formatter: Arc<FormatterManager>,
    sinks: Vec<Arc<dyn Sink>>,
}

impl Dispatcher {
    /// Settings the dispatcher was built from
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Redaction policy shared by enrichers, middleware and facade
    pub fn redaction(&self) -> &Arc<RedactionPolicy> {
        &self.redaction
    }

    /// The enrichment stage
    pub fn enricher(&self) -> &CompositeEnricher {
        &self.enricher
    }

    /// The formatter manager used by text sinks
    pub fn formatter(&self) -> &FormatterManager {
        &self.formatter
    }

    /// Names of the installed sinks
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Enrich `event` and deliver it
    pub fn dispatch(&self, mut event: LogEvent, ctx: &EnrichmentContext<'_>) -> DispatchReport {
        self.enricher.enrich(&mut event, ctx);
        self.deliver(&event)
    }

    /// Deliver an already enriched event.
    ///
    /// Sink failures and panics are logged and reported, never propagated.
    pub fn deliver(&self, event: &LogEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        for sink in &self.sinks {
            let name = sink.name().to_string();
            if !should_emit(sink.as_ref(), event) {
                report.skipped.push(name);
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.emit(event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(_) => Some(SinkError::write(&name, "sink panicked")),
            };
            match failure {
                None => report.delivered.push(name),
                Some(err) => {
                    tracing::warn!(target: "logweave", sink = %name, error = %err, "Sink delivery failed");
                    report.failed.push((name, err));
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.sink_names())
            .field("enricher", &self.enricher)
            .field("formatter", &self.formatter)
            .finish()
    }
}
