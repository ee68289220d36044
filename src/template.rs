//! Template - the deduplicated shape of a log message.

use serde::{Deserialize, Serialize};

use crate::placeholders::Placeholders;
use crate::severity::Severity;

/// Channel names are truncated to this many runes in stored templates.
const CHANNEL_MAX_RUNES: usize = 64;

/// Truncate to a rune (not byte) count.
pub(crate) fn truncate_runes(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// One deduplicated message template.
///
/// The id is a deterministic fingerprint of the invocation site and
/// classification, so semantically equivalent entries across requests
/// collapse to a single document. Every log call replaces the mutable
/// fields in place (last-writer-wins); templates are never deleted by
/// the logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "_id")]
    pub id: String,

    /// The channel, truncated to 64 runes.
    #[serde(rename = "type")]
    pub channel: String,

    /// The raw pre-substitution message pattern.
    pub message: String,

    pub severity: Severity,
}

impl Template {
    pub fn new(
        channel: &str,
        message: impl Into<String>,
        severity: Severity,
        placeholders: &Placeholders,
    ) -> Self {
        Template {
            id: Template::fingerprint(channel, severity, placeholders),
            channel: truncate_runes(channel, CHANNEL_MAX_RUNES),
            message: message.into(),
            severity,
        }
    }

    /// Deterministic template id: the lowercase hex MD5 of the
    /// `channel:severity:file:line:function` tuple. Absent location
    /// parts contribute empty strings, so partially-located calls
    /// still fingerprint stably.
    pub fn fingerprint(channel: &str, severity: Severity, placeholders: &Placeholders) -> String {
        let file = placeholders.file.as_deref().unwrap_or("");
        let line = placeholders
            .line
            .map(|line| line.to_string())
            .unwrap_or_default();
        let function = placeholders.function.as_deref().unwrap_or("");
        let key = format!(
            "{}:{}:{}:{}:{}",
            channel,
            severity.level(),
            file,
            line,
            function
        );
        format!("{:x}", md5::compute(key))
    }
}
