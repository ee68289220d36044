//! watchdog_store - a write-optimized, self-describing event store for
//! application logging.
//!
//! Log messages are split into deduplicated **templates** (the
//! invocation-site shape of a message, keyed by a deterministic
//! fingerprint) and per-occurrence **events**, stored one capped
//! collection per template so old events age out automatically. With
//! request tracking enabled, events are additionally correlated with
//! the inbound request that produced them.
//!
//! Storage, message parsing, and request context are injected behind
//! the [`Database`], [`MessageParser`] and [`RequestStack`] traits;
//! [`InMemoryDatabase`] is the bundled backend for tests and
//! development.

mod backtrace;
mod config;
mod database;
mod error;
mod event;
mod logger;
mod parser;
mod placeholders;
mod request;
mod sanitize;
mod severity;
mod template;

pub use backtrace::{enhance, StackFrame, MAX_BACKTRACE_DEPTH};
pub use config::{Config, ConfigError, EVENT_DOC_WEIGHT};
pub use database::{
    from_document, to_document, Collection, Database, DatabaseError, Document, InMemoryDatabase,
    IndexOrder, IndexSpec,
};
pub use error::LoggerError;
pub use event::{Event, EventUser};
pub use logger::{
    LogContext, Logger, EVENT_COLLECTION_PREFIX, TEMPLATE_COLLECTION, TRACKER_COLLECTION,
};
pub use parser::{BasicMessageParser, MessageParser};
pub use placeholders::{PlaceholderValue, Placeholders};
pub use request::{FixedRequestStack, RequestInfo, RequestStack};
pub use sanitize::filter_admin;
pub use severity::{InvalidSeverity, Severity};
pub use template::Template;
