//! Body capture helpers: truncation, binary detection, redaction and
//! multipart file names

use logweave_core::{RedactionPolicy, UploadedFile};

/// How a body is interpreted before it enters a snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BodyKind {
    Json,
    Form,
    Multipart,
    Text,
}

impl BodyKind {
    pub(crate) fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type.map(str::to_ascii_lowercase) else {
            return Self::Text;
        };
        if ct.starts_with("multipart/form-data") {
            Self::Multipart
        } else if ct.starts_with("application/x-www-form-urlencoded") {
            Self::Form
        } else if ct.contains("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Whether `content_type` matches an entry of the exclusion list.
///
/// Entries are case-insensitive prefixes, so `image/` covers every image type.
pub(crate) fn is_excluded_content_type(content_type: Option<&str>, excluded: &[String]) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let ct = ct.trim().to_ascii_lowercase();
    excluded
        .iter()
        .map(|e| e.trim().to_ascii_lowercase())
        .any(|e| !e.is_empty() && ct.starts_with(&e))
}

/// Cut `text` to at most `max` bytes on a char boundary.
pub(crate) fn truncate(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = text.len() - cut;
    text.truncate(cut);
    text.push_str(&format!("... [truncated {} bytes]", dropped));
    text
}

/// Text form of a body, redacted when it is JSON or a form.
///
/// `None` for empty bodies.
pub(crate) fn capture_body(
    body: &[u8],
    kind: BodyKind,
    redaction: &RedactionPolicy,
    max: usize,
) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let Ok(text) = std::str::from_utf8(body) else {
        return Some(format!("[binary {} bytes]", body.len()));
    };
    let text = match kind {
        BodyKind::Json => redact_json_text(text, redaction),
        BodyKind::Form => redaction.redact_form(text),
        BodyKind::Multipart | BodyKind::Text => {
            // JSON posted without a content type still gets redacted
            if looks_like_json(text) {
                redact_json_text(text, redaction)
            } else {
                text.to_string()
            }
        }
    };
    Some(truncate(text, max))
}

fn looks_like_json(text: &str) -> bool {
    matches!(text.trim_start().as_bytes().first(), Some(b'{') | Some(b'['))
}

fn redact_json_text(text: &str, redaction: &RedactionPolicy) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(mut value) => {
            redaction.redact_json(&mut value);
            serde_json::to_string(&value).unwrap_or_else(|_| text.to_string())
        }
        Err(_) => text.to_string(),
    }
}

/// Boundary parameter of a `multipart/form-data` content type
pub(crate) fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Uploaded files of a multipart body.
///
/// Only part headers are inspected; field values never leave this function.
pub(crate) fn uploaded_files(body: &[u8], boundary: &str) -> Vec<UploadedFile> {
    let body = String::from_utf8_lossy(body);
    let delimiter = format!("--{}", boundary);
    body.split(delimiter.as_str())
        .filter_map(|part| {
            let part = part.trim_start_matches("\r\n");
            let head_end = part.find("\r\n\r\n").or_else(|| part.find("\n\n"))?;
            part[..head_end]
                .lines()
                .find(|line| {
                    line.to_ascii_lowercase()
                        .starts_with("content-disposition:")
                })
                .and_then(parse_disposition)
        })
        .collect()
}

fn parse_disposition(line: &str) -> Option<UploadedFile> {
    let (_, params) = line.split_once(':')?;
    let mut field = String::new();
    let mut file_name = None;
    for param in params.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => field = value,
            "filename" => file_name = Some(value),
            _ => {}
        }
    }
    file_name
        .filter(|name| !name.is_empty())
        .map(|file_name| UploadedFile { field, file_name })
}
