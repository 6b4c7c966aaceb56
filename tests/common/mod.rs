use std::sync::Arc;

use doctx::{DocumentStore, MemoryBlobStore, MemoryStore, Session};
use doctx::{Error, Result};
use serde_json::Value;

/// Document store that delegates to `MemoryStore` but fails every insert
/// into one designated collection, for engineering a step failure at an
/// exact point in a task.
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_collection: String,
}

impl FailingStore {
    pub fn new(fail_collection: &str) -> Self {
        FailingStore {
            inner: MemoryStore::new(),
            fail_collection: fail_collection.to_string(),
        }
    }
}

impl DocumentStore for FailingStore {
    fn find(&self, collection: &str, condition: &Value, limit: Option<usize>) -> Result<Vec<Value>> {
        self.inner.find(collection, condition, limit)
    }

    fn insert_one(&self, collection: &str, doc: Value) -> Result<Value> {
        if collection == self.fail_collection {
            return Err(Error::StoreFailure("injected insert failure".to_string()));
        }
        self.inner.insert_one(collection, doc)
    }

    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Value> {
        if collection == self.fail_collection {
            return Err(Error::StoreFailure("injected insert failure".to_string()));
        }
        self.inner.insert_many(collection, docs)
    }

    fn update_one(&self, collection: &str, condition: &Value, update: &Value) -> Result<Value> {
        self.inner.update_one(collection, condition, update)
    }

    fn update_many(&self, collection: &str, condition: &Value, update: &Value) -> Result<Value> {
        self.inner.update_many(collection, condition, update)
    }

    fn replace_one(&self, collection: &str, condition: &Value, doc: &Value) -> Result<Value> {
        self.inner.replace_one(collection, condition, doc)
    }

    fn delete_one(&self, collection: &str, condition: &Value) -> Result<Value> {
        self.inner.delete_one(collection, condition)
    }

    fn delete_many(&self, collection: &str, condition: &Value) -> Result<Value> {
        self.inner.delete_many(collection, condition)
    }
}

/// Session over plain in-memory stores, handing back the store handles for
/// inspection.
pub fn memory_session() -> (Session, Arc<MemoryStore>, Arc<MemoryBlobStore>) {
    let docs = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let session = Session::new(docs.clone(), blobs.clone());
    (session, docs, blobs)
}

/// Session whose document store fails every insert into `fail_collection`.
pub fn failing_session(fail_collection: &str) -> (Session, Arc<FailingStore>, Arc<MemoryBlobStore>) {
    let docs = Arc::new(FailingStore::new(fail_collection));
    let blobs = Arc::new(MemoryBlobStore::new());
    let session = Session::new(docs.clone(), blobs.clone());
    (session, docs, blobs)
}
