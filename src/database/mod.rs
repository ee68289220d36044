//! Storage seam - the document-store operations the logger relies on.
//!
//! The logger never talks to a driver directly; it goes through the
//! [`Database`] and [`Collection`] traits. Any backend exposing
//! atomic replace-with-upsert, set-union adds, capped collection
//! creation, and named index creation can sit behind them.
//! [`InMemoryDatabase`] is the bundled backend for tests and
//! development.

mod in_memory;

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use in_memory::InMemoryDatabase;

/// A stored document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, Value>;

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// An insert targeted a collection that has not been created yet.
    /// First inserts into a freshly provisioned capped collection can
    /// race with the provisioning call; callers retry on this.
    CollectionNotFound(String),
    /// Storage-level error (connection, timeout, poisoned lock).
    Storage(String),
    /// A document could not be serialized or deserialized.
    Serialization(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::CollectionNotFound(name) => {
                write!(f, "collection not found: {}", name)
            }
            DatabaseError::Storage(msg) => write!(f, "storage error: {}", msg),
            DatabaseError::Serialization(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {}

/// Sort direction for one field of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    Ascending,
    Descending,
}

/// A named secondary index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, IndexOrder)>,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, keys: &[(&str, IndexOrder)]) -> Self {
        IndexSpec {
            name: name.into(),
            keys: keys
                .iter()
                .map(|(field, order)| (field.to_string(), *order))
                .collect(),
        }
    }
}

/// A document database: a namespace of named collections.
pub trait Database: Send + Sync {
    /// Select a collection by name. Selection never creates anything.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;

    /// Create a capped collection: insertion-ordered, bounded by both a
    /// document count and a byte budget, evicting oldest-first once
    /// either ceiling is reached. Idempotent; creating a collection
    /// that already exists is a successful no-op.
    fn create_capped_collection(
        &self,
        name: &str,
        max_items: u64,
        max_bytes: u64,
    ) -> Result<(), DatabaseError>;

    /// Names of all existing collections.
    fn list_collection_names(&self) -> Result<Vec<String>, DatabaseError>;
}

/// One named collection of documents.
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Atomically replace the document whose `_id` equals `id`,
    /// inserting it when absent. Returns `true` when the document was
    /// created rather than replaced; that signal, not a separate
    /// existence check, is what gates downstream provisioning.
    fn replace_upsert(&self, id: &str, document: Document) -> Result<bool, DatabaseError>;

    /// Atomically add `value` to the array field `field` of the
    /// document whose `_id` equals `id`, creating the document when
    /// absent. The array behaves as a set: adding a present value is a
    /// no-op.
    fn add_to_set(&self, id: &str, field: &str, value: &str) -> Result<(), DatabaseError>;

    /// Append a document. Fails with [`DatabaseError::CollectionNotFound`]
    /// when the collection has not been created.
    fn insert(&self, document: Document) -> Result<(), DatabaseError>;

    /// Fetch a document by its `_id`. Missing collection or document
    /// both yield `None`.
    fn find_by_id(&self, id: &str) -> Result<Option<Document>, DatabaseError>;

    /// Documents whose string field `field` equals `value`, in
    /// insertion order, with `skip`/`limit` pagination.
    fn find_eq(
        &self,
        field: &str,
        value: &str,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DatabaseError>;

    /// Count of documents whose string field `field` equals `value`.
    fn count_eq(&self, field: &str, value: &str) -> Result<u64, DatabaseError>;

    /// Total document count; 0 for a missing collection.
    fn count(&self) -> Result<u64, DatabaseError>;

    /// Declare named secondary indexes. Idempotent: an index whose name
    /// is already declared is left untouched.
    fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<(), DatabaseError>;
}

/// Serialize a value into a stored document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, DatabaseError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DatabaseError::Serialization(
            "expected a JSON object".to_string(),
        )),
        Err(e) => Err(DatabaseError::Serialization(e.to_string())),
    }
}

/// Deserialize a stored document into a typed value.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, DatabaseError> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        #[serde(rename = "_id")]
        id: String,
        value: i64,
    }

    #[test]
    fn to_document_produces_object() {
        let doc = to_document(&Doc {
            id: "a".into(),
            value: 3,
        })
        .unwrap();
        assert_eq!(doc.get("_id").and_then(Value::as_str), Some("a"));
        assert_eq!(doc.get("value").and_then(Value::as_i64), Some(3));
    }

    #[test]
    fn to_document_rejects_non_objects() {
        let err = to_document(&42i64).unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    #[test]
    fn from_document_round_trips() {
        let original = Doc {
            id: "a".into(),
            value: 3,
        };
        let doc = to_document(&original).unwrap();
        let back: Doc = from_document(doc).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn index_spec_new() {
        let spec = IndexSpec::new(
            "by-time",
            &[("timestamp", IndexOrder::Descending)],
        );
        assert_eq!(spec.name, "by-time");
        assert_eq!(spec.keys, vec![("timestamp".to_string(), IndexOrder::Descending)]);
    }
}
