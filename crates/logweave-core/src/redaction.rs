//! Redaction of sensitive headers, fields and query parameters
//!
//! Names are compared after normalization (lower-case, with `-`, `_` and
//! whitespace removed), so `X-Api-Key`, `api_key` and `API Key` all match the
//! configured entry `api key`. Plain entries match as substrings; entries
//! containing `*` are globs matched against the whole normalized name.

use http::HeaderMap;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Replacement text used when no marker is configured
pub const DEFAULT_REDACTION_MARKER: &str = "[REDACTED]";

/// Sensitive names applied when none are configured
pub const DEFAULT_SENSITIVE_NAMES: &[&str] = &[
    "password",
    "token",
    "secret",
    "api key",
    "authorization",
    "cookie",
];

#[derive(Clone, Debug)]
enum NamePattern {
    Contains(String),
    Glob(Regex),
}

impl NamePattern {
    fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return None;
        }
        if !normalized.contains('*') {
            return Some(Self::Contains(normalized));
        }
        let body = normalized
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        match Regex::new(&format!("^{}$", body)) {
            Ok(re) => Some(Self::Glob(re)),
            Err(_) => Some(Self::Contains(normalized.replace('*', ""))),
        }
    }

    fn matches(&self, normalized: &str) -> bool {
        match self {
            Self::Contains(needle) => normalized.contains(needle.as_str()),
            Self::Glob(re) => re.is_match(normalized),
        }
    }
}

/// A list of sensitive name patterns
#[derive(Clone, Debug)]
pub struct SensitiveNames {
    patterns: Vec<NamePattern>,
}

impl SensitiveNames {
    /// Build from raw entries; blank entries are ignored
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: names
                .into_iter()
                .filter_map(|n| NamePattern::parse(n.as_ref()))
                .collect(),
        }
    }

    /// Whether any pattern matches the field name
    pub fn matches(&self, field_name: &str) -> bool {
        let normalized = normalize(field_name);
        !normalized.is_empty() && self.patterns.iter().any(|p| p.matches(&normalized))
    }

    /// Number of configured patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no patterns are configured
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for SensitiveNames {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_NAMES)
    }
}

/// Decide whether a field must be redacted
pub fn should_redact(field_name: &str, sensitive: &SensitiveNames) -> bool {
    sensitive.matches(field_name)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Urlencoded name as the application sees it: `+` is a space, `%XX` decoded
fn decode_name(name: &str) -> String {
    let spaced = name.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Redaction rules for headers, body/form fields and query parameters
#[derive(Clone, Debug)]
pub struct RedactionPolicy {
    headers: SensitiveNames,
    fields: SensitiveNames,
    query_params: SensitiveNames,
    marker: String,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            headers: SensitiveNames::default(),
            fields: SensitiveNames::default(),
            query_params: SensitiveNames::default(),
            marker: DEFAULT_REDACTION_MARKER.to_string(),
        }
    }
}

impl RedactionPolicy {
    /// Policy with the default sensitive names and marker
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a policy from configured lists; empty lists fall back to the defaults
    pub fn from_settings(settings: &crate::config::RedactionSettings) -> Self {
        fn names(list: &[String]) -> SensitiveNames {
            if list.is_empty() {
                SensitiveNames::default()
            } else {
                SensitiveNames::new(list)
            }
        }
        let marker = if settings.marker.trim().is_empty() {
            DEFAULT_REDACTION_MARKER.to_string()
        } else {
            settings.marker.clone()
        };
        Self {
            headers: names(&settings.sensitive_headers),
            fields: names(&settings.sensitive_fields),
            query_params: names(&settings.sensitive_query_params),
            marker,
        }
    }

    /// Replace the header list
    pub fn with_headers(mut self, names: SensitiveNames) -> Self {
        self.headers = names;
        self
    }

    /// Replace the field list
    pub fn with_fields(mut self, names: SensitiveNames) -> Self {
        self.fields = names;
        self
    }

    /// Replace the query parameter list
    pub fn with_query_params(mut self, names: SensitiveNames) -> Self {
        self.query_params = names;
        self
    }

    /// Replace the marker text
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// The replacement text
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Replacement for any redacted value
    pub fn redact(&self, _value: &str) -> String {
        self.marker.clone()
    }

    /// Whether a header must be redacted
    pub fn is_sensitive_header(&self, name: &str) -> bool {
        should_redact(name, &self.headers)
    }

    /// Whether a body or form field must be redacted
    pub fn is_sensitive_field(&self, name: &str) -> bool {
        should_redact(name, &self.fields)
    }

    /// Whether a query parameter must be redacted
    pub fn is_sensitive_query_param(&self, name: &str) -> bool {
        should_redact(name, &self.query_params)
    }

    /// Header value as it may appear in a record
    pub fn header_value(&self, name: &str, value: &str) -> String {
        if self.is_sensitive_header(name) {
            self.redact(value)
        } else {
            value.to_string()
        }
    }

    /// Headers as a sorted name → value map with sensitive values replaced.
    ///
    /// Repeated headers are joined with `, `.
    pub fn redact_headers(&self, headers: &HeaderMap) -> BTreeMap<String, String> {
        let mut result: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let name = name.as_str();
            let rendered = if self.is_sensitive_header(name) {
                self.marker.clone()
            } else {
                value.to_str().unwrap_or("[non-utf8]").to_string()
            };
            result
                .entry(name.to_string())
                .and_modify(|existing| {
                    if !self.is_sensitive_header(name) {
                        existing.push_str(", ");
                        existing.push_str(&rendered);
                    }
                })
                .or_insert(rendered);
        }
        result
    }

    /// Rewrite a query string, replacing sensitive parameter values
    pub fn redact_query(&self, query: &str) -> String {
        self.redact_pairs(query, |name| self.is_sensitive_query_param(name))
    }

    /// Rewrite a urlencoded form body, replacing sensitive field values
    pub fn redact_form(&self, body: &str) -> String {
        self.redact_pairs(body, |name| self.is_sensitive_field(name))
    }

    fn redact_pairs(&self, input: &str, sensitive: impl Fn(&str) -> bool) -> String {
        input
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((name, _)) if sensitive(&decode_name(name)) => {
                    format!("{}={}", name, self.marker)
                }
                _ => pair.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Replace the value of every sensitive key in a JSON document, recursively
    pub fn redact_json(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if self.is_sensitive_field(key) {
                        *child = Value::String(self.marker.clone());
                    } else {
                        self.redact_json(child);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.redact_json(item);
                }
            }
            _ => {}
        }
    }

    /// Redact a single named value that is about to enter a record
    pub fn redact_named_value(&self, name: &str, value: &mut Value) {
        if self.is_sensitive_field(name) {
            *value = Value::String(self.marker.clone());
        } else {
            self.redact_json(value);
        }
    }
}
