//! Placeholders - the substituted values of one event.
//!
//! The known location fields (`%function`, `%file`, `%line`) are typed;
//! everything else a message pattern references lives in the `extra`
//! sub-map. This keeps the open-ended placeholder dictionary of the
//! wire format out of the rest of the pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sanitize::filter_admin;

/// One substituted placeholder value.
///
/// `Markup` flags values carrying rich content; they are filtered down
/// to an administrator-safe tag set before storage and therefore only
/// ever read back as `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaceholderValue {
    Null,
    Integer(i64),
    Text(String),
    Markup(String),
}

impl PlaceholderValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PlaceholderValue::Text(text) | PlaceholderValue::Markup(text) => Some(text),
            _ => None,
        }
    }

    /// The value with markup reduced to the admin-safe tag set.
    pub fn sanitized(self) -> PlaceholderValue {
        match self {
            PlaceholderValue::Markup(markup) => PlaceholderValue::Text(filter_admin(&markup)),
            other => other,
        }
    }
}

impl From<&str> for PlaceholderValue {
    fn from(value: &str) -> Self {
        PlaceholderValue::Text(value.to_string())
    }
}

impl From<String> for PlaceholderValue {
    fn from(value: String) -> Self {
        PlaceholderValue::Text(value)
    }
}

impl From<i64> for PlaceholderValue {
    fn from(value: i64) -> Self {
        PlaceholderValue::Integer(value)
    }
}

/// The placeholder set of one event: typed location fields plus the
/// remaining substitution variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placeholders {
    #[serde(rename = "%function", default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(rename = "%file", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(rename = "%line", default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, PlaceholderValue>,
}

impl Placeholders {
    pub fn new() -> Self {
        Placeholders::default()
    }

    /// Split a parsed placeholder map into typed location fields and
    /// the extra sub-map.
    pub fn from_map(mut map: BTreeMap<String, PlaceholderValue>) -> Self {
        let function = map
            .remove("%function")
            .and_then(|v| v.as_text().map(str::to_string));
        let file = map
            .remove("%file")
            .and_then(|v| v.as_text().map(str::to_string));
        let line = map.remove("%line").and_then(|v| match v {
            PlaceholderValue::Integer(line) => u32::try_from(line).ok(),
            PlaceholderValue::Text(text) => text.parse().ok(),
            _ => None,
        });

        Placeholders {
            function,
            file,
            line,
            extra: map,
        }
    }

    /// True when any of the location fields still needs the backtrace
    /// enhancer.
    pub fn location_missing(&self) -> bool {
        self.function.is_none() || self.file.is_none() || self.line.is_none()
    }

    /// Filter every markup value down to the admin-safe tag set.
    pub fn sanitize(&mut self) {
        for value in self.extra.values_mut() {
            let sanitized = value.clone().sanitized();
            *value = sanitized;
        }
    }
}
