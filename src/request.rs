//! Request context seam - where the logger learns about the inbound
//! request it is running under.

use serde::{Deserialize, Serialize};

/// Metadata of one inbound request, used to populate event documents
/// and, when request tracking is enabled, to correlate events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Externally supplied correlation id, unique per request.
    pub unique_id: String,
    pub client_ip: String,
    pub uri: String,
    pub referer: String,
    /// Seconds since the epoch.
    pub timestamp: u64,
    /// Authenticated user id; 0 for anonymous.
    pub uid: i64,
}

/// Supplies the request currently being handled, if any. Injected
/// collaborator; returns `None` outside of a request (CLI, workers).
pub trait RequestStack: Send + Sync {
    fn current(&self) -> Option<RequestInfo>;
}

/// A request stack pinned to one request (or to none). Suited to the
/// per-request scope a logger instance lives in, and to tests.
#[derive(Debug, Clone, Default)]
pub struct FixedRequestStack {
    info: Option<RequestInfo>,
}

impl FixedRequestStack {
    pub fn new(info: RequestInfo) -> Self {
        FixedRequestStack { info: Some(info) }
    }

    /// A stack with no current request.
    pub fn empty() -> Self {
        FixedRequestStack { info: None }
    }
}

impl RequestStack for FixedRequestStack {
    fn current(&self) -> Option<RequestInfo> {
        self.info.clone()
    }
}
