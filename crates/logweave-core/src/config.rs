//! Pipeline settings
//!
//! [`Settings`] is handed to the pipeline once at startup and never mutated
//! afterwards. It deserializes from any serde source (every section falls
//! back to its defaults), and [`Settings::from_env`] overlays a small set of
//! `LOGWEAVE_`-prefixed environment variables, loading `.env` first.
//!
//! # Example
//!
//! ```ignore
//! use logweave_core::config::Settings;
//!
//! logweave_core::config::load_dotenv();
//! let settings = Settings::from_env()?;
//! ```

use crate::error::Result;
use crate::record::LogLevel;
use crate::redaction::DEFAULT_SENSITIVE_NAMES;
use serde::Deserialize;

/// Prefix of every environment variable read by [`Settings::from_env`]
pub const ENV_PREFIX: &str = "LOGWEAVE_";

/// Default correlation header
pub const DEFAULT_CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Load a `.env` file from the current directory, if one exists.
///
/// Returns `true` when a file was loaded.
pub fn load_dotenv() -> bool {
    dotenvy::dotenv().is_ok()
}

/// Top-level settings
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application identity
    pub application: ApplicationSettings,
    /// Correlation header handling
    pub correlation: CorrelationSettings,
    /// Enricher toggles
    pub enrichers: EnricherSettings,
    /// Redaction lists
    pub redaction: RedactionSettings,
    /// Request/response middleware
    pub middleware: MiddlewareSettings,
    /// Output destinations
    pub sinks: SinkSettings,
    /// Logging facade behavior
    pub facade: FacadeSettings,
}

/// Application identity attached by the environment enricher
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Application name
    pub name: String,
    /// Environment name (Development, Staging, Production, ...)
    pub environment: String,
    /// Application version
    pub version: String,
    /// Build configuration (debug/release)
    pub build_configuration: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "logweave".to_string(),
            environment: "Development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_configuration: if cfg!(debug_assertions) {
                "Debug".to_string()
            } else {
                "Release".to_string()
            },
        }
    }
}

/// Correlation header handling
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CorrelationSettings {
    /// Header read from requests and echoed on responses
    pub header_name: String,
    /// Mint a new ID when none is supplied
    pub generate_if_missing: bool,
    /// Add the header to `Access-Control-Expose-Headers`
    pub expose_header: bool,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_CORRELATION_HEADER.to_string(),
            generate_if_missing: true,
            expose_header: true,
        }
    }
}

/// Enable flag, priority and soft time budget of one enricher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnricherToggle {
    /// Whether the enricher runs
    pub enabled: bool,
    /// Lower runs earlier
    pub priority: i32,
    /// Soft time budget in milliseconds
    pub budget_ms: u64,
}

/// Correlation enricher settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CorrelationEnricherSettings {
    /// Whether the enricher runs
    pub enabled: bool,
    /// Lower runs earlier
    pub priority: i32,
    /// Soft time budget in milliseconds
    pub budget_ms: u64,
}

impl Default for CorrelationEnricherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 5,
            budget_ms: 50,
        }
    }
}

impl CorrelationEnricherSettings {
    /// Enable flag, priority and budget
    pub fn toggle(&self) -> EnricherToggle {
        EnricherToggle {
            enabled: self.enabled,
            priority: self.priority,
            budget_ms: self.budget_ms,
        }
    }
}

/// HTTP context enricher settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpEnricherSettings {
    /// Whether the enricher runs
    pub enabled: bool,
    /// Lower runs earlier
    pub priority: i32,
    /// Soft time budget in milliseconds
    pub budget_ms: u64,
    /// Attach redacted request headers
    pub include_request_headers: bool,
    /// Attach redacted response headers
    pub include_response_headers: bool,
    /// Attach the redacted query string
    pub include_query_string: bool,
}

impl Default for HttpEnricherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 10,
            budget_ms: 50,
            include_request_headers: false,
            include_response_headers: false,
            include_query_string: false,
        }
    }
}

impl HttpEnricherSettings {
    /// Enable flag, priority and budget
    pub fn toggle(&self) -> EnricherToggle {
        EnricherToggle {
            enabled: self.enabled,
            priority: self.priority,
            budget_ms: self.budget_ms,
        }
    }
}

/// Environment enricher settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EnvironmentEnricherSettings {
    /// Whether the enricher runs
    pub enabled: bool,
    /// Lower runs earlier
    pub priority: i32,
    /// Soft time budget in milliseconds
    pub budget_ms: u64,
}

impl Default for EnvironmentEnricherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 20,
            budget_ms: 100,
        }
    }
}

impl EnvironmentEnricherSettings {
    /// Enable flag, priority and budget
    pub fn toggle(&self) -> EnricherToggle {
        EnricherToggle {
            enabled: self.enabled,
            priority: self.priority,
            budget_ms: self.budget_ms,
        }
    }
}

/// Per-enricher settings
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnricherSettings {
    /// Correlation enricher
    pub correlation: CorrelationEnricherSettings,
    /// HTTP context enricher
    pub http: HttpEnricherSettings,
    /// Environment enricher
    pub environment: EnvironmentEnricherSettings,
}

/// Sensitive-name lists and marker text
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RedactionSettings {
    /// Header names
    pub sensitive_headers: Vec<String>,
    /// Body and form field names
    pub sensitive_fields: Vec<String>,
    /// Query parameter names
    pub sensitive_query_params: Vec<String>,
    /// Replacement text
    pub marker: String,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        let defaults: Vec<String> = DEFAULT_SENSITIVE_NAMES.iter().map(|s| s.to_string()).collect();
        Self {
            sensitive_headers: defaults.clone(),
            sensitive_fields: defaults.clone(),
            sensitive_query_params: defaults,
            marker: crate::redaction::DEFAULT_REDACTION_MARKER.to_string(),
        }
    }
}

/// Request/response logging middleware settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MiddlewareSettings {
    /// Capture request bodies
    pub log_request_body: bool,
    /// Capture response bodies
    pub log_response_body: bool,
    /// Capture response headers
    pub log_response_headers: bool,
    /// Largest body captured before truncation, in bytes
    pub max_body_size: usize,
    /// Requests slower than this are logged as warnings
    pub slow_request_threshold_ms: u64,
    /// Path prefixes that are never logged
    pub excluded_paths: Vec<String>,
    /// Response content types whose bodies are never captured
    pub excluded_content_types: Vec<String>,
    /// Status codes that are never logged
    pub excluded_status_codes: Vec<u16>,
}

impl Default for MiddlewareSettings {
    fn default() -> Self {
        Self {
            log_request_body: true,
            log_response_body: true,
            log_response_headers: false,
            max_body_size: 32 * 1024,
            slow_request_threshold_ms: 3_000,
            excluded_paths: vec!["/health".to_string(), "/metrics".to_string()],
            excluded_content_types: vec![
                "application/pdf".to_string(),
                "application/octet-stream".to_string(),
                "application/zip".to_string(),
                "image/".to_string(),
                "video/".to_string(),
                "audio/".to_string(),
            ],
            excluded_status_codes: Vec::new(),
        }
    }
}

/// Rolling file sinks
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FileSinkSettings {
    /// Whether the file sinks are installed
    pub enabled: bool,
    /// Base directory holding `ErrorsLogs/` and `RequestsLogs/`
    pub base_path: String,
    /// Optional minimum level
    pub minimum_level: Option<LogLevel>,
}

impl Default for FileSinkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: "logs".to_string(),
            minimum_level: None,
        }
    }
}

/// Centralized log collector sink
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CollectorSinkSettings {
    /// Whether the sink is installed
    pub enabled: bool,
    /// Collector URL
    pub url: String,
    /// Optional minimum level
    pub minimum_level: Option<LogLevel>,
}

/// APM sink
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApmSinkSettings {
    /// Whether the sink is installed
    pub enabled: bool,
    /// Service name reported to the APM backend
    pub service_name: String,
    /// Optional minimum level
    pub minimum_level: Option<LogLevel>,
}

impl Default for ApmSinkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "logweave".to_string(),
            minimum_level: None,
        }
    }
}

/// Email alert sink
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmailSinkSettings {
    /// Whether the sink is installed
    pub enabled: bool,
    /// Sender address
    pub from: String,
    /// Recipient addresses
    pub to: Vec<String>,
    /// Subject prefix
    pub subject: String,
    /// Mail relay host
    pub smtp_host: String,
    /// Mail relay port
    pub smtp_port: u16,
}

impl Default for EmailSinkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            from: String::new(),
            to: Vec::new(),
            subject: "[logweave] Error".to_string(),
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
        }
    }
}

/// Per-sink settings
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// File sinks
    pub file: FileSinkSettings,
    /// Centralized log collector
    pub collector: CollectorSinkSettings,
    /// APM backend
    pub apm: ApmSinkSettings,
    /// Email alerts
    pub email: EmailSinkSettings,
}

/// Logging facade behavior
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FacadeSettings {
    /// Return a fixed message instead of the real error text in default responses
    pub generic_error_mode: bool,
    /// The fixed message
    pub generic_error_message: String,
}

impl Default for FacadeSettings {
    fn default() -> Self {
        Self {
            generic_error_mode: false,
            generic_error_message: "An unexpected error occurred. Please try again later."
                .to_string(),
        }
    }
}

/// Flat view of the environment variables understood by [`Settings::from_env`]
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    application_name: Option<String>,
    environment: Option<String>,
    application_version: Option<String>,
    correlation_header: Option<String>,
    generate_correlation_id: Option<bool>,
    file_sink_enabled: Option<bool>,
    file_base_path: Option<String>,
    collector_url: Option<String>,
    apm_service_name: Option<String>,
    email_to: Option<Vec<String>>,
    email_from: Option<String>,
    slow_request_threshold_ms: Option<u64>,
    max_body_size: Option<usize>,
    sensitive_headers: Option<Vec<String>>,
    sensitive_fields: Option<Vec<String>>,
    redaction_marker: Option<String>,
    generic_error_mode: Option<bool>,
}

impl Settings {
    /// Defaults overlaid with `LOGWEAVE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_env()?;
        Ok(Self::default().apply(overrides))
    }

    /// Parse a JSON settings document; missing sections use their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Verbose settings for local development
    pub fn development() -> Self {
        let mut settings = Self::default();
        settings.enrichers.http.include_request_headers = true;
        settings.enrichers.http.include_response_headers = true;
        settings.enrichers.http.include_query_string = true;
        settings.middleware.log_response_headers = true;
        settings
    }

    /// Production settings: generic errors, alerting on
    pub fn production() -> Self {
        let mut settings = Self::default();
        settings.application.environment = "Production".to_string();
        settings.facade.generic_error_mode = true;
        settings.sinks.email.enabled = true;
        settings
    }

    fn apply(mut self, env: EnvOverrides) -> Self {
        if let Some(v) = env.application_name {
            self.application.name = v;
        }
        if let Some(v) = env.environment {
            self.application.environment = v;
        }
        if let Some(v) = env.application_version {
            self.application.version = v;
        }
        if let Some(v) = env.correlation_header {
            self.correlation.header_name = v;
        }
        if let Some(v) = env.generate_correlation_id {
            self.correlation.generate_if_missing = v;
        }
        if let Some(v) = env.file_sink_enabled {
            self.sinks.file.enabled = v;
        }
        if let Some(v) = env.file_base_path {
            self.sinks.file.base_path = v;
        }
        if let Some(v) = env.collector_url {
            self.sinks.collector.enabled = true;
            self.sinks.collector.url = v;
        }
        if let Some(v) = env.apm_service_name {
            self.sinks.apm.enabled = true;
            self.sinks.apm.service_name = v;
        }
        if let Some(v) = env.email_to {
            self.sinks.email.enabled = true;
            self.sinks.email.to = v;
        }
        if let Some(v) = env.email_from {
            self.sinks.email.from = v;
        }
        if let Some(v) = env.slow_request_threshold_ms {
            self.middleware.slow_request_threshold_ms = v;
        }
        if let Some(v) = env.max_body_size {
            self.middleware.max_body_size = v;
        }
        if let Some(v) = env.sensitive_headers {
            self.redaction.sensitive_headers = v;
        }
        if let Some(v) = env.sensitive_fields {
            self.redaction.sensitive_fields = v;
        }
        if let Some(v) = env.redaction_marker {
            self.redaction.marker = v;
        }
        if let Some(v) = env.generic_error_mode {
            self.facade.generic_error_mode = v;
        }
        self
    }
}
