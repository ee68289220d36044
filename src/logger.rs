//! Logger - the watchdog event-logging core.
//!
//! One log call runs the full write path to completion: severity gate,
//! placeholder parsing, backtrace enhancement, template upsert, request
//! tracking, capped-collection provisioning, and the event insert. The
//! read side (`request_events*`, collection listings, index setup) is
//! consumed independently by reporting surfaces.
//!
//! A `Logger` instance is scoped to one inbound request: its
//! seen-template cache and event sequence exist to bound write
//! amplification within that request and must not be shared across
//! requests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, warn};

use crate::backtrace::{enhance, StackFrame};
use crate::config::Config;
use crate::database::{from_document, to_document, Collection, Database, DatabaseError};
use crate::database::{IndexOrder, IndexSpec};
use crate::error::LoggerError;
use crate::event::{Event, EventUser};
use crate::parser::MessageParser;
use crate::placeholders::{PlaceholderValue, Placeholders};
use crate::request::RequestStack;
use crate::severity::Severity;
use crate::template::{truncate_runes, Template};

/// Fixed name of the template collection.
pub const TEMPLATE_COLLECTION: &str = "watchdog";

/// Fixed name of the request-tracking collection.
pub const TRACKER_COLLECTION: &str = "watchdog_tracker";

/// Per-template event collections are named prefix + template id.
pub const EVENT_COLLECTION_PREFIX: &str = "watchdog_event_";

const TEMPLATE_ID_LENGTH: usize = 32;

const HOSTNAME_MAX_RUNES: usize = 128;

/// Bounded retries for the provisioning race on first insert.
const INSERT_RETRY_LIMIT: u32 = 3;
const INSERT_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Caller-supplied context of one log call.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    /// The logging channel (module or subsystem name).
    pub channel: String,
    /// Outbound link markup for the report row, if any.
    pub link: String,
    /// Raw placeholder inputs, handed to the message parser.
    pub placeholders: BTreeMap<String, PlaceholderValue>,
    /// Call-stack snapshot for the backtrace enhancer; may be empty.
    pub backtrace: Vec<StackFrame>,
}

impl LogContext {
    pub fn new(channel: impl Into<String>) -> Self {
        LogContext {
            channel: channel.into(),
            ..LogContext::default()
        }
    }

    pub fn with_placeholder(
        mut self,
        key: impl Into<String>,
        value: impl Into<PlaceholderValue>,
    ) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    pub fn with_backtrace(mut self, backtrace: Vec<StackFrame>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }
}

/// Watchdog logger over a document store.
pub struct Logger {
    database: Arc<dyn Database>,
    parser: Box<dyn MessageParser>,
    requests: Arc<dyn RequestStack>,
    config: Config,
    /// Template ids already tracked during this request, with a local
    /// occurrence count. Guarantees one tracker write per distinct
    /// template per request.
    seen_templates: Mutex<HashMap<String, u64>>,
    /// Per-request event sequence, for ordered request reports.
    sequence: AtomicU64,
}

impl Logger {
    pub fn new(
        database: Arc<dyn Database>,
        parser: Box<dyn MessageParser>,
        requests: Arc<dyn RequestStack>,
        config: Config,
    ) -> Self {
        Logger {
            database,
            parser,
            requests,
            config,
            seen_templates: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Record one log event.
    ///
    /// Calls below the configured minimum severity return without
    /// touching storage at all. Storage failures propagate; logging is
    /// a side channel and must never mask the error being logged.
    pub fn log(
        &self,
        level: Severity,
        template: &str,
        context: &LogContext,
    ) -> Result<(), LoggerError> {
        if level.level() > self.config.limit.level() {
            return Ok(());
        }

        let parsed = self.parser.parse_placeholders(template, &context.placeholders);
        let mut placeholders = Placeholders::from_map(parsed);
        if placeholders.location_missing() {
            enhance(&mut placeholders, &context.backtrace);
        }

        let record = Template::new(&context.channel, template, level, &placeholders);
        let template_id = record.id.clone();

        // Validates the derived collection name before anything is
        // written; a failure here is a fingerprint bug, not bad data.
        let event_collection = self.event_collection(&template_id)?;

        let created = self
            .template_collection()
            .replace_upsert(&template_id, to_document(&record)?)?;

        let request = self.requests.current();
        let mut request_id = None;
        let mut request_sequence = None;
        if self.config.request_tracking {
            if let Some(request) = &request {
                self.track(&request.unique_id, &template_id)?;
                request_id = Some(request.unique_id.clone());
                request_sequence = Some(self.sequence.fetch_add(1, Ordering::Relaxed));
            }
        }

        // The atomic upsert's "created" signal gates provisioning; a
        // separate existence check would reintroduce the very race the
        // upsert avoids. Creation itself is idempotent, so two racing
        // first-writers are both safe.
        if created {
            debug!(
                collection = event_collection.name(),
                items = self.config.items,
                "provisioning capped event collection"
            );
            self.database.create_capped_collection(
                event_collection.name(),
                self.config.items,
                self.config.capped_bytes(),
            )?;
        }

        placeholders.sanitize();

        let (hostname, location, referer, timestamp, uid) = match &request {
            Some(request) => (
                truncate_runes(&request.client_ip, HOSTNAME_MAX_RUNES),
                request.uri.clone(),
                request.referer.clone(),
                request.timestamp,
                request.uid,
            ),
            None => (String::new(), String::new(), String::new(), unix_now(), 0),
        };

        let event = Event {
            hostname,
            link: context.link.clone(),
            location,
            referer,
            timestamp,
            user: EventUser { uid },
            variables: placeholders,
            request_id,
            request_sequence,
        };

        self.insert_event(event_collection.as_ref(), to_document(&event)?)
    }

    /// Insert with a bounded retry on the provisioning race: a racing
    /// writer may reach its insert before the first-writer's capped
    /// creation has completed.
    fn insert_event(
        &self,
        collection: &dyn Collection,
        document: crate::database::Document,
    ) -> Result<(), LoggerError> {
        let mut attempt = 0;
        loop {
            match collection.insert(document.clone()) {
                Ok(()) => return Ok(()),
                Err(DatabaseError::CollectionNotFound(_)) if attempt < INSERT_RETRY_LIMIT => {
                    attempt += 1;
                    warn!(
                        collection = collection.name(),
                        attempt, "event collection not ready yet, retrying insert"
                    );
                    thread::sleep(INSERT_RETRY_DELAY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record `template_id` against the current request, writing to
    /// the tracker collection only on first sight within this request.
    fn track(&self, request_id: &str, template_id: &str) -> Result<(), LoggerError> {
        let mut seen = self
            .seen_templates
            .lock()
            .map_err(|_| DatabaseError::Storage("seen-template lock poisoned".into()))?;

        if let Some(count) = seen.get_mut(template_id) {
            *count += 1;
            return Ok(());
        }
        seen.insert(template_id.to_string(), 1);
        drop(seen);

        self.tracker_collection()
            .add_to_set(request_id, "templates", template_id)?;
        Ok(())
    }

    /// The event collection for a template id, after validating the
    /// derived name (fixed prefix + 32 lowercase hex characters).
    pub fn event_collection(&self, template_id: &str) -> Result<Arc<dyn Collection>, LoggerError> {
        let name = format!("{}{}", EVENT_COLLECTION_PREFIX, template_id);
        if !is_event_collection_name(&name) {
            return Err(LoggerError::InvalidTemplateId(name));
        }
        Ok(self.database.collection(&name))
    }

    /// Names of all event collections known to the store.
    pub fn event_collections(&self) -> Result<Vec<String>, LoggerError> {
        let names = self
            .database
            .list_collection_names()?
            .into_iter()
            .filter(|name| is_event_collection_name(name))
            .collect();
        Ok(names)
    }

    pub fn template_collection(&self) -> Arc<dyn Collection> {
        self.database.collection(TEMPLATE_COLLECTION)
    }

    pub fn tracker_collection(&self) -> Arc<dyn Collection> {
        self.database.collection(TRACKER_COLLECTION)
    }

    /// Declare the secondary indexes backing the report queries.
    ///
    /// The increments index is on <line, timestamp> rather than
    /// <function, line, timestamp>: this collection takes a write per
    /// log call, and the two-number index is much cheaper to maintain
    /// than one including a string.
    pub fn ensure_indexes(&self) -> Result<(), LoggerError> {
        use IndexOrder::{Ascending, Descending};

        let indexes = [
            IndexSpec::new("for-increments", &[("line", Ascending), ("timestamp", Descending)]),
            IndexSpec::new("admin-no-filters", &[("timestamp", Descending)]),
            IndexSpec::new(
                "admin-by-type",
                &[("type", Ascending), ("timestamp", Descending)],
            ),
            IndexSpec::new(
                "admin-by-severity",
                &[("severity", Ascending), ("timestamp", Descending)],
            ),
            IndexSpec::new(
                "admin-by-both",
                &[
                    ("type", Ascending),
                    ("severity", Ascending),
                    ("timestamp", Descending),
                ],
            ),
        ];
        self.template_collection().create_indexes(&indexes)?;
        Ok(())
    }

    /// Number of events recorded for a request. Malformed or unknown
    /// request ids count as zero; reporting stays resilient.
    pub fn request_events_count(&self, request_id: &str) -> Result<u64, LoggerError> {
        if !is_request_id(request_id) {
            return Ok(0);
        }
        let Some(tracker) = self.tracker_collection().find_by_id(request_id)? else {
            return Ok(0);
        };

        let mut total = 0;
        for template_id in tracked_template_ids(&tracker) {
            let Ok(collection) = self.event_collection(&template_id) else {
                continue;
            };
            total += collection.count_eq("requestTracking_id", request_id)?;
        }
        Ok(total)
    }

    /// The template/event pairs recorded for a request, in request
    /// order, paginated. Malformed or unknown request ids yield an
    /// empty result.
    pub fn request_events(
        &self,
        request_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<(Template, Event)>, LoggerError> {
        if !is_request_id(request_id) {
            return Ok(Vec::new());
        }
        let Some(tracker) = self.tracker_collection().find_by_id(request_id)? else {
            return Ok(Vec::new());
        };

        let templates = self.template_collection();
        let mut rows: Vec<(Template, Event)> = Vec::new();
        for template_id in tracked_template_ids(&tracker) {
            let Ok(collection) = self.event_collection(&template_id) else {
                continue;
            };
            let Some(template_doc) = templates.find_by_id(&template_id)? else {
                continue;
            };
            let template: Template = from_document(template_doc)?;

            for event_doc in collection.find_eq("requestTracking_id", request_id, 0, None)? {
                let event: Event = from_document(event_doc)?;
                rows.push((template.clone(), event));
            }
        }

        rows.sort_by_key(|(_, event)| event.request_sequence.unwrap_or(u64::MAX));
        Ok(rows.into_iter().skip(skip).take(limit).collect())
    }

    // PSR-3 style convenience entry points.

    pub fn emergency(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Emergency, template, context)
    }

    pub fn alert(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Alert, template, context)
    }

    pub fn critical(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Critical, template, context)
    }

    pub fn error(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Error, template, context)
    }

    pub fn warning(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Warning, template, context)
    }

    pub fn notice(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Notice, template, context)
    }

    pub fn info(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Info, template, context)
    }

    pub fn debug(&self, template: &str, context: &LogContext) -> Result<(), LoggerError> {
        self.log(Severity::Debug, template, context)
    }
}

/// Fixed prefix followed by exactly 32 lowercase hex characters.
fn is_event_collection_name(name: &str) -> bool {
    match name.strip_prefix(EVENT_COLLECTION_PREFIX) {
        Some(id) => {
            id.len() == TEMPLATE_ID_LENGTH
                && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}

/// Request correlation ids are word characters and dashes, as produced
/// by unique-id request middleware. Anything else is unsafe input from
/// a reporting URL.
fn is_request_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn tracked_template_ids(tracker: &crate::database::Document) -> Vec<String> {
    tracker
        .get("templates")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
