//! Process and host facts

use super::{Enricher, EnricherDescriptor};
use crate::config::{ApplicationSettings, EnvironmentEnricherSettings};
use crate::context::EnrichmentContext;
use crate::error::EnrichError;
use crate::properties::PropertySet;
use crate::record::LogRecord;
use serde_json::Value;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, System};

/// Attaches application, host and process facts.
///
/// Static facts are computed once at construction. Memory, thread and uptime
/// are read on every call.
pub struct EnvironmentEnricher {
    descriptor: EnricherDescriptor,
    cached: Vec<(&'static str, Value)>,
    pid: Option<Pid>,
    process_started_ms: Option<u64>,
    constructed: Instant,
    budget: Duration,
}

impl EnvironmentEnricher {
    /// Enricher name
    pub const NAME: &'static str = "EnvironmentEnricher";

    /// Create with default application settings
    pub fn new() -> Self {
        Self::from_settings(
            &ApplicationSettings::default(),
            &EnvironmentEnricherSettings::default(),
        )
    }

    /// Create from settings, caching the static facts
    pub fn from_settings(
        application: &ApplicationSettings,
        settings: &EnvironmentEnricherSettings,
    ) -> Self {
        let toggle = settings.toggle();
        let pid = sysinfo::get_current_pid().ok();

        let process_started_ms = pid.and_then(|pid| {
            let mut system = System::new();
            system.refresh_process(pid);
            system
                .process(pid)
                .map(|p| p.start_time().saturating_mul(1000))
        });

        let working_directory = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let processor_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let cached = vec![
            ("ApplicationName", Value::from(application.name.clone())),
            ("EnvironmentName", Value::from(application.environment.clone())),
            (
                "MachineName",
                Value::from(System::host_name().unwrap_or_else(|| "unknown".to_string())),
            ),
            (
                "OSVersion",
                Value::from(
                    System::long_os_version()
                        .unwrap_or_else(|| std::env::consts::OS.to_string()),
                ),
            ),
            (
                "Framework",
                Value::from(format!(
                    "logweave {} ({}-{})",
                    env!("CARGO_PKG_VERSION"),
                    std::env::consts::ARCH,
                    std::env::consts::OS
                )),
            ),
            ("ProcessId", Value::from(std::process::id())),
            ("ProcessorCount", Value::from(processor_count)),
            (
                "Is64BitProcess",
                Value::from(cfg!(target_pointer_width = "64")),
            ),
            ("WorkingDirectory", Value::from(working_directory)),
            ("ApplicationVersion", Value::from(application.version.clone())),
            (
                "BuildConfiguration",
                Value::from(application.build_configuration.clone()),
            ),
        ];

        Self {
            descriptor: EnricherDescriptor::new(Self::NAME, toggle.enabled, toggle.priority),
            cached,
            pid,
            process_started_ms,
            constructed: Instant::now(),
            budget: Duration::from_millis(toggle.budget_ms),
        }
    }

    fn uptime_ms(&self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .ok();
        match (self.process_started_ms, now_ms) {
            (Some(started), Some(now)) if now >= started => now - started,
            _ => self.constructed.elapsed().as_millis() as u64,
        }
    }
}

impl Default for EnvironmentEnricher {
    fn default() -> Self {
        Self::new()
    }
}

fn current_thread_id() -> String {
    let raw = format!("{:?}", std::thread::current().id());
    raw.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .to_string()
}

impl Enricher for EnvironmentEnricher {
    fn descriptor(&self) -> &EnricherDescriptor {
        &self.descriptor
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    fn enrich(
        &self,
        _record: &LogRecord,
        _ctx: &EnrichmentContext<'_>,
        properties: &mut PropertySet,
    ) -> Result<(), EnrichError> {
        for (key, value) in &self.cached {
            properties.add_if_absent(*key, value.clone());
        }

        if let Some(pid) = self.pid {
            let mut system = System::new();
            if system.refresh_process(pid) {
                if let Some(process) = system.process(pid) {
                    properties.add_if_absent("WorkingSetBytes", process.memory());
                    properties.add_if_absent("VirtualMemoryBytes", process.virtual_memory());
                }
            }
        }
        if let Some(name) = std::thread::current().name() {
            properties.add_if_absent("ThreadName", name);
        }
        properties.add_if_absent("ThreadId", current_thread_id());
        properties.add_if_absent("ProcessUptimeMs", self.uptime_ms());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrich(enricher: &EnvironmentEnricher) -> PropertySet {
        let record = LogRecord::custom_message("t", "f", "m");
        let mut props = PropertySet::new();
        enricher
            .enrich(&record, &EnrichmentContext::none(), &mut props)
            .unwrap();
        props
    }

    #[test]
    fn test_static_facts() {
        let application = ApplicationSettings {
            name: "orders-api".into(),
            environment: "Staging".into(),
            ..Default::default()
        };
        let enricher =
            EnvironmentEnricher::from_settings(&application, &EnvironmentEnricherSettings::default());
        let props = enrich(&enricher);

        assert_eq!(props.get_str("ApplicationName"), Some("orders-api"));
        assert_eq!(props.get_str("EnvironmentName"), Some("Staging"));
        assert_eq!(
            props.get("ProcessId"),
            Some(&Value::from(std::process::id()))
        );
        assert!(props.get_str("MachineName").is_some());
        assert!(props.get("ProcessorCount").and_then(Value::as_u64).unwrap() >= 1);
        assert_eq!(
            props.get("Is64BitProcess"),
            Some(&Value::from(cfg!(target_pointer_width = "64")))
        );
    }

    #[test]
    fn test_dynamic_facts_present() {
        let props = enrich(&EnvironmentEnricher::new());
        assert!(props.get_str("ThreadId").is_some());
        assert!(props.get("ProcessUptimeMs").and_then(Value::as_u64).is_some());
    }

    #[test]
    fn test_existing_keys_untouched() {
        let enricher = EnvironmentEnricher::new();
        let record = LogRecord::custom_message("t", "f", "m");
        let mut props = PropertySet::new();
        props.add_if_absent("ApplicationName", "override");
        enricher
            .enrich(&record, &EnrichmentContext::none(), &mut props)
            .unwrap();
        assert_eq!(props.get_str("ApplicationName"), Some("override"));
    }
}
