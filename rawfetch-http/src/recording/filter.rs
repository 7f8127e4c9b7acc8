//! Header masking rules applied before headers reach a trace

use crate::errors::RecordingError;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Recorded in place of a header value when a masking rule fails
pub const MASK_PLACEHOLDER: &str = "?";

/// One masking step. Rules that do not concern `name` return `value`
/// unchanged.
pub trait HeaderRule: Send + Sync + fmt::Debug {
    fn apply(&self, name: &str, value: String) -> Result<String, RecordingError>;
}

/// An ordered chain of masking rules owned by one recorder.
///
/// Rules run in the order they were added, each seeing the previous
/// rule's output.
#[derive(Debug, Clone, Default)]
pub struct HeaderFilter {
    rules: Vec<Arc<dyn HeaderRule>>,
}

impl HeaderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask a header entirely, or keep its first `show_first_chars` characters
    pub fn mask_by_name(self, header: impl Into<String>, show_first_chars: Option<usize>) -> Self {
        self.with_rule(MaskByName {
            header: header.into(),
            show_first_chars,
        })
    }

    /// Mask the `Authorization` header while keeping its non-secret structure
    pub fn mask_authorization(self) -> Self {
        self.with_rule(MaskAuthorization)
    }

    pub fn with_rule(mut self, rule: impl HeaderRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Value to record for this header. Never fails: a rule error is
    /// logged and the value becomes [`MASK_PLACEHOLDER`].
    pub fn apply(&self, name: &str, value: &str) -> String {
        let mut current = value.to_string();
        for rule in &self.rules {
            match rule.apply(name, current) {
                Ok(next) => current = next,
                Err(e) => {
                    warn!("Header masking failed, recording placeholder: {}", e);
                    return MASK_PLACEHOLDER.to_string();
                }
            }
        }
        current
    }
}

/// Mask a header by (case-insensitive) name
#[derive(Debug, Clone)]
pub struct MaskByName {
    pub header: String,
    pub show_first_chars: Option<usize>,
}

impl HeaderRule for MaskByName {
    fn apply(&self, name: &str, value: String) -> Result<String, RecordingError> {
        if !name.eq_ignore_ascii_case(&self.header) {
            return Ok(value);
        }
        Ok(match self.show_first_chars {
            None => "<<masked>>".to_string(),
            Some(count) => format!(
                "<<masked value={}...>>",
                value.chars().take(count).collect::<String>()
            ),
        })
    }
}

/// Mask `Authorization` credentials.
///
/// Nothing is verified: Basic credentials keep the username, a bearer
/// token shaped like a JWT keeps its decoded header and payload but never
/// its signature, anything else is masked opaquely.
#[derive(Debug, Clone, Copy)]
pub struct MaskAuthorization;

impl HeaderRule for MaskAuthorization {
    fn apply(&self, name: &str, value: String) -> Result<String, RecordingError> {
        if !name.eq_ignore_ascii_case("authorization") {
            return Ok(value);
        }
        Ok(mask_credentials(&value))
    }
}

fn mask_credentials(value: &str) -> String {
    let Some((scheme, credentials)) = value.split_once(' ') else {
        return "<<masked>>".to_string();
    };

    match scheme.to_ascii_lowercase().as_str() {
        "basic" => {
            let username = basic_username(credentials).unwrap_or_else(|| MASK_PLACEHOLDER.to_string());
            format!("{} <<masked password, username={}>>", scheme, username)
        }
        "bearer" => {
            let segments: Vec<&str> = credentials.split('.').collect();
            if segments.len() != 3 {
                return format!("{} <<masked opaque token>>", scheme);
            }
            let (header, payload) = match (decode_segment(segments[0]), decode_segment(segments[1])) {
                (Some(header), Some(payload)) => (header, payload),
                _ => (MASK_PLACEHOLDER.to_string(), MASK_PLACEHOLDER.to_string()),
            };
            format!("{} <<masked JWT, header={}, body={}>>", scheme, header, payload)
        }
        _ => format!("{} <<masked>>", scheme),
    }
}

fn basic_username(credentials: &str) -> Option<String> {
    let decoded = STANDARD.decode(credentials.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    text.split(':').next().map(str::to_string)
}

fn decode_segment(segment: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}
