use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use watchdog_store::{
    BasicMessageParser, Collection, Config, Database, DatabaseError, Document, FixedRequestStack,
    InMemoryDatabase, IndexSpec, LogContext, Logger, LoggerError, PlaceholderValue, RequestInfo,
    Severity, StackFrame, Template, EVENT_COLLECTION_PREFIX,
};

fn request() -> RequestInfo {
    RequestInfo {
        unique_id: "req-1".to_string(),
        client_ip: "198.51.100.7".to_string(),
        uri: "/node/1".to_string(),
        referer: "/".to_string(),
        timestamp: 1_700_000_000,
        uid: 42,
    }
}

fn logger(db: &InMemoryDatabase, limit: Severity, items: u64, tracking: bool) -> Logger {
    Logger::new(
        Arc::new(db.clone()),
        Box::new(BasicMessageParser::new()),
        Arc::new(FixedRequestStack::new(request())),
        Config::new(limit, items, tracking).unwrap(),
    )
}

fn located_context(channel: &str, file: &str, line: i64, function: &str) -> LogContext {
    LogContext::new(channel)
        .with_placeholder("%file", file)
        .with_placeholder("%line", line)
        .with_placeholder("%function", function)
}

// --- Template Deduplication ---

#[test]
fn identical_calls_collapse_to_one_template() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);
    let context = located_context("php", "src/app.rs", 10, "handle");

    log.log(Severity::Error, "boom", &context).unwrap();
    log.log(Severity::Error, "boom", &context).unwrap();
    log.log(Severity::Error, "boom", &context).unwrap();

    assert_eq!(log.template_collection().count().unwrap(), 1);
    assert_eq!(db.replace_upsert_calls(), 3);
}

#[test]
fn later_calls_replace_template_fields_in_place() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);
    let context = located_context("php", "src/app.rs", 10, "handle");

    log.log(Severity::Error, "first message", &context).unwrap();
    log.log(Severity::Error, "second message", &context).unwrap();

    let id = Template::fingerprint(
        "php",
        Severity::Error,
        &watchdog_store::Placeholders {
            function: Some("handle".to_string()),
            file: Some("src/app.rs".to_string()),
            line: Some(10),
            ..Default::default()
        },
    );
    let doc = log.template_collection().find_by_id(&id).unwrap().unwrap();
    assert_eq!(doc.get("message").and_then(|v| v.as_str()), Some("second message"));
}

#[test]
fn distinct_locations_produce_distinct_templates() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);

    log.log(Severity::Error, "boom", &located_context("php", "src/app.rs", 10, "handle"))
        .unwrap();
    log.log(Severity::Error, "boom", &located_context("php", "src/app.rs", 11, "handle"))
        .unwrap();

    assert_eq!(log.template_collection().count().unwrap(), 2);
    assert_eq!(log.event_collections().unwrap().len(), 2);
}

// --- Capped Collection Provisioning ---

#[test]
fn first_occurrence_provisions_exactly_one_capped_collection() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);
    let context = located_context("php", "src/app.rs", 10, "handle");

    log.log(Severity::Error, "boom", &context).unwrap();
    assert_eq!(db.create_collection_calls(), 1);

    log.log(Severity::Error, "boom", &context).unwrap();
    log.log(Severity::Error, "boom", &context).unwrap();
    assert_eq!(db.create_collection_calls(), 1);
}

#[test]
fn capped_collection_evicts_oldest_beyond_ceiling() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 3, true);

    for i in 0..4 {
        let context = located_context("php", "src/app.rs", 10, "handle")
            .with_placeholder("@n", i.to_string());
        log.log(Severity::Error, "boom @n", &context).unwrap();
    }

    let id = Template::fingerprint(
        "php",
        Severity::Error,
        &watchdog_store::Placeholders {
            function: Some("handle".to_string()),
            file: Some("src/app.rs".to_string()),
            line: Some(10),
            ..Default::default()
        },
    );
    let events = log.event_collection(&id).unwrap();
    assert_eq!(events.count().unwrap(), 3);

    let remaining = events.find_eq("requestTracking_id", "req-1", 0, None).unwrap();
    assert_eq!(remaining.len(), 3);
    // The oldest event (@n = "0") was evicted; the newest survives.
    let first_n = remaining[0]["variables"]["@n"].as_str().unwrap().to_string();
    let last_n = remaining[2]["variables"]["@n"].as_str().unwrap().to_string();
    assert_eq!(first_n, "1");
    assert_eq!(last_n, "3");
}

// --- Severity Filtering ---

#[test]
fn below_minimum_severity_writes_nothing() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Warning, 100, true);

    log.log(
        Severity::Debug,
        "noise",
        &located_context("php", "src/app.rs", 10, "handle"),
    )
    .unwrap();

    assert_eq!(db.replace_upsert_calls(), 0);
    assert_eq!(db.add_to_set_calls(), 0);
    assert_eq!(db.insert_calls(), 0);
    assert_eq!(db.create_collection_calls(), 0);
    assert!(log.event_collections().unwrap().is_empty());
}

#[test]
fn at_minimum_severity_still_logs() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Warning, 100, false);

    log.warning("careful", &located_context("php", "src/app.rs", 10, "handle"))
        .unwrap();

    assert_eq!(log.template_collection().count().unwrap(), 1);
    assert_eq!(db.insert_calls(), 1);
}

// --- Collection Name Validation ---

#[test]
fn non_hex_template_id_is_rejected() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);

    let err = log.event_collection(&"z".repeat(32)).err().unwrap();
    assert!(matches!(err, LoggerError::InvalidTemplateId(name)
        if name.starts_with(EVENT_COLLECTION_PREFIX)));

    assert!(log.event_collection("abc").is_err());
    assert!(log.event_collection(&"A".repeat(32)).is_err());
    assert!(log.event_collection(&"a".repeat(32)).is_ok());
}

// --- Backtrace Enhancement (end to end) ---

#[test]
fn missing_location_is_recovered_from_backtrace() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);

    let context = LogContext::new("php")
        .with_placeholder("@message", "it broke")
        .with_backtrace(vec![
            StackFrame::new("log").in_class("Logger"),
            StackFrame::new("log").in_class("LoggerChannel"),
            StackFrame::new("handle_request").at("src/app.rs", 120),
        ]);
    log.log(Severity::Error, "@message", &context).unwrap();

    let expected = Template::fingerprint(
        "php",
        Severity::Error,
        &watchdog_store::Placeholders {
            function: Some("handle_request".to_string()),
            file: Some("src/app.rs".to_string()),
            line: Some(120),
            ..Default::default()
        },
    );
    let doc = log
        .template_collection()
        .find_by_id(&expected)
        .unwrap()
        .unwrap();
    assert_eq!(doc.get("type").and_then(|v| v.as_str()), Some("php"));

    let names = log.event_collections().unwrap();
    assert_eq!(names, vec![format!("{}{}", EVENT_COLLECTION_PREFIX, expected)]);

    let events = log.event_collection(&expected).unwrap();
    let stored = events.find_eq("location", "/node/1", 0, None).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0]["variables"]["%function"].as_str(),
        Some("handle_request")
    );
    assert_eq!(stored[0]["variables"]["%line"].as_u64(), Some(120));
}

// --- Sanitization ---

#[test]
fn markup_placeholders_are_sanitized_before_storage() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);

    let context = located_context("php", "src/app.rs", 10, "handle").with_placeholder(
        "@message",
        PlaceholderValue::Markup("<script>alert(1)</script><em>hi</em>".to_string()),
    );
    log.log(Severity::Error, "@message", &context).unwrap();

    let id = Template::fingerprint(
        "php",
        Severity::Error,
        &watchdog_store::Placeholders {
            function: Some("handle".to_string()),
            file: Some("src/app.rs".to_string()),
            line: Some(10),
            ..Default::default()
        },
    );
    let events = log.event_collection(&id).unwrap();
    let stored = events.find_eq("location", "/node/1", 0, None).unwrap();
    assert_eq!(
        stored[0]["variables"]["@message"].as_str(),
        Some("alert(1)<em>hi</em>")
    );
}

// --- Event Document Contents ---

#[test]
fn events_carry_request_metadata() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);

    log.error(
        "boom",
        &located_context("php", "src/app.rs", 10, "handle").with_link("<a href=\"/d\">d</a>"),
    )
    .unwrap();

    let id = Template::fingerprint(
        "php",
        Severity::Error,
        &watchdog_store::Placeholders {
            function: Some("handle".to_string()),
            file: Some("src/app.rs".to_string()),
            line: Some(10),
            ..Default::default()
        },
    );
    let stored = log
        .event_collection(&id)
        .unwrap()
        .find_eq("location", "/node/1", 0, None)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["hostname"].as_str(), Some("198.51.100.7"));
    assert_eq!(stored[0]["referer"].as_str(), Some("/"));
    assert_eq!(stored[0]["timestamp"].as_u64(), Some(1_700_000_000));
    assert_eq!(stored[0]["user"]["uid"].as_i64(), Some(42));
    assert_eq!(stored[0]["link"].as_str(), Some("<a href=\"/d\">d</a>"));
    // Tracking disabled: no correlation fields.
    assert!(stored[0].get("requestTracking_id").is_none());
}

#[test]
fn long_hostnames_are_truncated() {
    let db = InMemoryDatabase::new();
    let info = RequestInfo {
        client_ip: "x".repeat(200),
        ..request()
    };
    let log = Logger::new(
        Arc::new(db.clone()),
        Box::new(BasicMessageParser::new()),
        Arc::new(FixedRequestStack::new(info)),
        Config::new(Severity::Debug, 100, false).unwrap(),
    );

    log.error("boom", &located_context("php", "src/app.rs", 10, "handle"))
        .unwrap();

    let id = Template::fingerprint(
        "php",
        Severity::Error,
        &watchdog_store::Placeholders {
            function: Some("handle".to_string()),
            file: Some("src/app.rs".to_string()),
            line: Some(10),
            ..Default::default()
        },
    );
    let stored = log
        .event_collection(&id)
        .unwrap()
        .find_eq("location", "/node/1", 0, None)
        .unwrap();
    assert_eq!(stored[0]["hostname"].as_str().unwrap().len(), 128);
}

// --- Index Setup ---

#[test]
fn ensure_indexes_is_idempotent() {
    let db = InMemoryDatabase::new();
    let log = logger(&db, Severity::Debug, 100, false);

    log.ensure_indexes().unwrap();
    log.ensure_indexes().unwrap();
}

// --- Provisioning Race ---

/// A backend whose next few inserts fail with CollectionNotFound, as
/// seen by a writer racing a first-writer's capped creation.
struct RacyDatabase {
    inner: InMemoryDatabase,
    failures_left: Arc<AtomicU64>,
}

struct RacyCollection {
    inner: Arc<dyn Collection>,
    failures_left: Arc<AtomicU64>,
}

impl Database for RacyDatabase {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(RacyCollection {
            inner: self.inner.collection(name),
            failures_left: Arc::clone(&self.failures_left),
        })
    }

    fn create_capped_collection(
        &self,
        name: &str,
        max_items: u64,
        max_bytes: u64,
    ) -> Result<(), DatabaseError> {
        self.inner.create_capped_collection(name, max_items, max_bytes)
    }

    fn list_collection_names(&self) -> Result<Vec<String>, DatabaseError> {
        self.inner.list_collection_names()
    }
}

impl Collection for RacyCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn replace_upsert(&self, id: &str, document: Document) -> Result<bool, DatabaseError> {
        self.inner.replace_upsert(id, document)
    }

    fn add_to_set(&self, id: &str, field: &str, value: &str) -> Result<(), DatabaseError> {
        self.inner.add_to_set(id, field, value)
    }

    fn insert(&self, document: Document) -> Result<(), DatabaseError> {
        let left = self.failures_left.load(Ordering::Relaxed);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::Relaxed);
            return Err(DatabaseError::CollectionNotFound(self.name().to_string()));
        }
        self.inner.insert(document)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Document>, DatabaseError> {
        self.inner.find_by_id(id)
    }

    fn find_eq(
        &self,
        field: &str,
        value: &str,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DatabaseError> {
        self.inner.find_eq(field, value, skip, limit)
    }

    fn count_eq(&self, field: &str, value: &str) -> Result<u64, DatabaseError> {
        self.inner.count_eq(field, value)
    }

    fn count(&self) -> Result<u64, DatabaseError> {
        self.inner.count()
    }

    fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<(), DatabaseError> {
        self.inner.create_indexes(indexes)
    }
}

#[test]
fn insert_retries_through_the_provisioning_window() {
    let inner = InMemoryDatabase::new();
    let db = RacyDatabase {
        inner: inner.clone(),
        failures_left: Arc::new(AtomicU64::new(2)),
    };
    let log = Logger::new(
        Arc::new(db),
        Box::new(BasicMessageParser::new()),
        Arc::new(FixedRequestStack::new(request())),
        Config::new(Severity::Debug, 100, false).unwrap(),
    );

    log.error("boom", &located_context("php", "src/app.rs", 10, "handle"))
        .unwrap();

    // Only the successful attempt reaches the backing store.
    assert_eq!(inner.insert_calls(), 1);
}

#[test]
fn insert_gives_up_after_bounded_retries() {
    let inner = InMemoryDatabase::new();
    let db = RacyDatabase {
        inner,
        failures_left: Arc::new(AtomicU64::new(u64::MAX)),
    };
    let log = Logger::new(
        Arc::new(db),
        Box::new(BasicMessageParser::new()),
        Arc::new(FixedRequestStack::new(request())),
        Config::new(Severity::Debug, 100, false).unwrap(),
    );

    let err = log
        .error("boom", &located_context("php", "src/app.rs", 10, "handle"))
        .unwrap_err();
    assert!(matches!(
        err,
        LoggerError::Database(DatabaseError::CollectionNotFound(_))
    ));
}

// --- Without a Current Request ---

#[test]
fn logging_outside_a_request_skips_tracking_and_request_fields() {
    let db = InMemoryDatabase::new();
    let log = Logger::new(
        Arc::new(db.clone()),
        Box::new(BasicMessageParser::new()),
        Arc::new(FixedRequestStack::empty()),
        Config::new(Severity::Debug, 100, true).unwrap(),
    );

    log.error("boom", &located_context("cron", "src/cron.rs", 7, "run"))
        .unwrap();

    assert_eq!(db.add_to_set_calls(), 0);
    assert_eq!(db.insert_calls(), 1);

    let id = Template::fingerprint(
        "cron",
        Severity::Error,
        &watchdog_store::Placeholders {
            function: Some("run".to_string()),
            file: Some("src/cron.rs".to_string()),
            line: Some(7),
            ..Default::default()
        },
    );
    let stored = log
        .event_collection(&id)
        .unwrap()
        .find_eq("location", "", 0, None)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].get("requestTracking_id").is_none());
}
