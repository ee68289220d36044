//! InMemoryDatabase - HashMap-backed document store for testing and
//! development.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{Collection, Database, DatabaseError, Document, IndexSpec};

/// Ceilings of a capped collection.
#[derive(Clone, Copy)]
struct Caps {
    max_items: u64,
    max_bytes: u64,
}

/// One stored document with its serialized size, for byte accounting.
struct StoredDocument {
    document: Document,
    size: u64,
}

struct StoredCollection {
    capped: Option<Caps>,
    documents: VecDeque<StoredDocument>,
    bytes: u64,
    indexes: Vec<String>,
}

impl StoredCollection {
    fn new(capped: Option<Caps>) -> Self {
        StoredCollection {
            capped,
            documents: VecDeque::new(),
            bytes: 0,
            indexes: Vec::new(),
        }
    }

    fn push(&mut self, stored: StoredDocument) {
        self.bytes += stored.size;
        self.documents.push_back(stored);
        self.apply_caps();
    }

    /// Evict oldest-first while either ceiling is exceeded.
    fn apply_caps(&mut self) {
        let Some(caps) = self.capped else {
            return;
        };
        while self.documents.len() as u64 > caps.max_items || self.bytes > caps.max_bytes {
            match self.documents.pop_front() {
                Some(evicted) => self.bytes -= evicted.size,
                None => break,
            }
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.documents
            .iter()
            .position(|stored| stored.document.get("_id").and_then(Value::as_str) == Some(id))
    }
}

/// Write-operation counters, exposed so tests can assert on write
/// amplification rather than only on final state.
#[derive(Default)]
struct OpCounters {
    replace_upsert: AtomicU64,
    add_to_set: AtomicU64,
    insert: AtomicU64,
    create_collection: AtomicU64,
}

struct Inner {
    collections: RwLock<HashMap<String, StoredCollection>>,
    counters: OpCounters,
}

/// In-memory document database backed by a HashMap.
///
/// Capped collections honor both the item and the byte ceiling,
/// evicting oldest-first. Clone-friendly via Arc.
#[derive(Clone)]
pub struct InMemoryDatabase {
    inner: Arc<Inner>,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        InMemoryDatabase {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                counters: OpCounters::default(),
            }),
        }
    }

    /// Number of `replace_upsert` calls issued against any collection.
    pub fn replace_upsert_calls(&self) -> u64 {
        self.inner.counters.replace_upsert.load(Ordering::Relaxed)
    }

    /// Number of `add_to_set` calls issued against any collection.
    pub fn add_to_set_calls(&self) -> u64 {
        self.inner.counters.add_to_set.load(Ordering::Relaxed)
    }

    /// Number of `insert` calls issued against any collection.
    pub fn insert_calls(&self) -> u64 {
        self.inner.counters.insert.load(Ordering::Relaxed)
    }

    /// Number of `create_capped_collection` calls, no-ops included.
    pub fn create_collection_calls(&self) -> u64 {
        self.inner.counters.create_collection.load(Ordering::Relaxed)
    }
}

impl Database for InMemoryDatabase {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(InMemoryCollection {
            name: name.to_string(),
            inner: Arc::clone(&self.inner),
        })
    }

    fn create_capped_collection(
        &self,
        name: &str,
        max_items: u64,
        max_bytes: u64,
    ) -> Result<(), DatabaseError> {
        self.inner
            .counters
            .create_collection
            .fetch_add(1, Ordering::Relaxed);

        let mut collections = self
            .inner
            .collections
            .write()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        collections
            .entry(name.to_string())
            .or_insert_with(|| StoredCollection::new(Some(Caps { max_items, max_bytes })));

        Ok(())
    }

    fn list_collection_names(&self) -> Result<Vec<String>, DatabaseError> {
        let collections = self
            .inner
            .collections
            .read()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

struct InMemoryCollection {
    name: String,
    inner: Arc<Inner>,
}

impl InMemoryCollection {
    fn document_size(document: &Document) -> Result<u64, DatabaseError> {
        serde_json::to_vec(document)
            .map(|bytes| bytes.len() as u64)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))
    }
}

impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn replace_upsert(&self, id: &str, mut document: Document) -> Result<bool, DatabaseError> {
        self.inner
            .counters
            .replace_upsert
            .fetch_add(1, Ordering::Relaxed);

        document.insert("_id".to_string(), Value::String(id.to_string()));
        let size = Self::document_size(&document)?;

        let mut collections = self
            .inner
            .collections
            .write()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        // Document-level upserts auto-create a regular collection, the
        // way drivers do for plain writes.
        let collection = collections
            .entry(self.name.clone())
            .or_insert_with(|| StoredCollection::new(None));

        match collection.position(id) {
            Some(index) => {
                let previous = &mut collection.documents[index];
                collection.bytes = collection.bytes - previous.size + size;
                *previous = StoredDocument { document, size };
                Ok(false)
            }
            None => {
                collection.push(StoredDocument { document, size });
                Ok(true)
            }
        }
    }

    fn add_to_set(&self, id: &str, field: &str, value: &str) -> Result<(), DatabaseError> {
        self.inner
            .counters
            .add_to_set
            .fetch_add(1, Ordering::Relaxed);

        let mut collections = self
            .inner
            .collections
            .write()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        let collection = collections
            .entry(self.name.clone())
            .or_insert_with(|| StoredCollection::new(None));

        match collection.position(id) {
            Some(index) => {
                let stored = &mut collection.documents[index];
                let entry = stored
                    .document
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let Value::Array(values) = entry else {
                    return Err(DatabaseError::Storage(format!(
                        "field {} of {} is not an array",
                        field, id
                    )));
                };
                if !values.iter().any(|v| v.as_str() == Some(value)) {
                    values.push(Value::String(value.to_string()));
                }
                let size = Self::document_size(&stored.document)?;
                collection.bytes = collection.bytes - stored.size + size;
                stored.size = size;
            }
            None => {
                let mut document = Document::new();
                document.insert("_id".to_string(), Value::String(id.to_string()));
                document.insert(
                    field.to_string(),
                    Value::Array(vec![Value::String(value.to_string())]),
                );
                let size = Self::document_size(&document)?;
                collection.push(StoredDocument { document, size });
            }
        }

        Ok(())
    }

    fn insert(&self, document: Document) -> Result<(), DatabaseError> {
        self.inner.counters.insert.fetch_add(1, Ordering::Relaxed);

        let size = Self::document_size(&document)?;

        let mut collections = self
            .inner
            .collections
            .write()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        let collection = collections
            .get_mut(&self.name)
            .ok_or_else(|| DatabaseError::CollectionNotFound(self.name.clone()))?;

        collection.push(StoredDocument { document, size });
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Document>, DatabaseError> {
        let collections = self
            .inner
            .collections
            .read()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        let Some(collection) = collections.get(&self.name) else {
            return Ok(None);
        };

        Ok(collection
            .position(id)
            .map(|index| collection.documents[index].document.clone()))
    }

    fn find_eq(
        &self,
        field: &str,
        value: &str,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DatabaseError> {
        let collections = self
            .inner
            .collections
            .read()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        let Some(collection) = collections.get(&self.name) else {
            return Ok(Vec::new());
        };

        let matching = collection
            .documents
            .iter()
            .filter(|stored| stored.document.get(field).and_then(Value::as_str) == Some(value))
            .skip(skip);

        let documents = match limit {
            Some(limit) => matching
                .take(limit)
                .map(|stored| stored.document.clone())
                .collect(),
            None => matching.map(|stored| stored.document.clone()).collect(),
        };

        Ok(documents)
    }

    fn count_eq(&self, field: &str, value: &str) -> Result<u64, DatabaseError> {
        let collections = self
            .inner
            .collections
            .read()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        let Some(collection) = collections.get(&self.name) else {
            return Ok(0);
        };

        let count = collection
            .documents
            .iter()
            .filter(|stored| stored.document.get(field).and_then(Value::as_str) == Some(value))
            .count();

        Ok(count as u64)
    }

    fn count(&self) -> Result<u64, DatabaseError> {
        let collections = self
            .inner
            .collections
            .read()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        Ok(collections
            .get(&self.name)
            .map(|collection| collection.documents.len() as u64)
            .unwrap_or(0))
    }

    fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<(), DatabaseError> {
        let mut collections = self
            .inner
            .collections
            .write()
            .map_err(|_| DatabaseError::Storage("lock poisoned".into()))?;

        let collection = collections
            .entry(self.name.clone())
            .or_insert_with(|| StoredCollection::new(None));

        for index in indexes {
            if !collection.indexes.contains(&index.name) {
                collection.indexes.push(index.name.clone());
            }
        }

        Ok(())
    }
}
