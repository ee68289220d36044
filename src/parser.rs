//! Message parser seam - turns a message pattern and its raw context
//! into the placeholder map stored with each event.

use std::collections::BTreeMap;

use crate::placeholders::PlaceholderValue;

/// Extracts the placeholder map of a log call. Injected collaborator;
/// the logger never inspects raw context itself.
pub trait MessageParser: Send + Sync {
    fn parse_placeholders(
        &self,
        template: &str,
        context: &BTreeMap<String, PlaceholderValue>,
    ) -> BTreeMap<String, PlaceholderValue>;
}

/// Default parser.
///
/// Context keys already carrying a `%`/`@`/`!` sigil pass through
/// unchanged. A bare key is kept only when the pattern references it
/// as `{key}`, and is then exposed under `@key`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMessageParser;

impl BasicMessageParser {
    pub fn new() -> Self {
        BasicMessageParser
    }
}

impl MessageParser for BasicMessageParser {
    fn parse_placeholders(
        &self,
        template: &str,
        context: &BTreeMap<String, PlaceholderValue>,
    ) -> BTreeMap<String, PlaceholderValue> {
        let mut placeholders = BTreeMap::new();

        for (key, value) in context {
            if key.starts_with('%') || key.starts_with('@') || key.starts_with('!') {
                placeholders.insert(key.clone(), value.clone());
            } else if template.contains(&format!("{{{}}}", key)) {
                placeholders.insert(format!("@{}", key), value.clone());
            }
        }

        placeholders
    }
}
