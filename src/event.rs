//! Event - one occurrence of a template, with its substituted values.

use serde::{Deserialize, Serialize};

use crate::placeholders::Placeholders;

/// The user attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUser {
    pub uid: i64,
}

/// One timestamped occurrence of a template.
///
/// Events have no id of their own: identity is insertion order within
/// the owning template's capped collection, and old events are evicted
/// automatically once the collection's ceiling is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Client address, truncated to 128 runes.
    pub hostname: String,

    /// Outbound link markup supplied by the caller.
    pub link: String,

    /// Request URI.
    pub location: String,

    pub referer: String,

    /// Seconds since the epoch.
    pub timestamp: u64,

    pub user: EventUser,

    pub variables: Placeholders,

    /// Correlation id of the owning request; only set when request
    /// tracking is enabled and a request was current.
    #[serde(
        rename = "requestTracking_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,

    /// Position of this event within its request, for ordered
    /// per-request reports.
    #[serde(
        rename = "requestTracking_sequence",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_sequence: Option<u64>,
}
