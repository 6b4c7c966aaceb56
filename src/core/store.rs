//! Capability traits for the external collaborators.
//!
//! The engine never talks to a driver directly: it consumes a document store
//! and a blob store through these traits. The in-memory reference backend in
//! [`crate::core::memory`] implements both; adapters for real drivers live
//! outside this crate.

use std::io::{Read, Write};

use serde_json::Value;

use crate::core::errors::*;

/// Document-database capability.
///
/// Documents are JSON objects identified by a string `_id`. Updates use the
/// operator form (`$set`/`$inc`/`$unset`); bare keys are treated as `$set`.
/// Result documents (matched/modified/deleted counts, stored documents) are
/// threaded into a task's results array as-is.
pub trait DocumentStore: Send + Sync {
    /// Finds documents matching an equality condition. `limit` of `None`
    /// returns every match.
    fn find(&self, collection: &str, condition: &Value, limit: Option<usize>) -> Result<Vec<Value>>;

    /// Inserts one document, assigning an `_id` if absent. Returns the stored
    /// document.
    fn insert_one(&self, collection: &str, doc: Value) -> Result<Value>;

    /// Inserts a batch of documents. Returns `{"inserted": n, "ids": [...]}`.
    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Value>;

    /// Applies an update to the first matching document.
    /// Returns `{"matched": n, "modified": n}`.
    fn update_one(&self, collection: &str, condition: &Value, update: &Value) -> Result<Value>;

    /// Applies an update to every matching document.
    fn update_many(&self, collection: &str, condition: &Value, update: &Value) -> Result<Value>;

    /// Replaces the first matching document wholesale, keeping its `_id`.
    /// Rollback restores pre-images through this so fields added by the
    /// forward write do not survive.
    fn replace_one(&self, collection: &str, condition: &Value, doc: &Value) -> Result<Value>;

    /// Deletes the first matching document. Returns `{"deleted": n}`.
    fn delete_one(&self, collection: &str, condition: &Value) -> Result<Value>;

    /// Deletes every matching document.
    fn delete_many(&self, collection: &str, condition: &Value) -> Result<Value>;
}

/// Blob-storage capability, keyed by metadata documents.
pub trait BlobStore: Send + Sync {
    /// Streams `reader` into a new blob described by `meta` (an `_id` is
    /// assigned if absent). Returns the stored file document.
    fn write(&self, meta: Value, reader: &mut dyn Read) -> Result<Value>;

    /// Streams the first blob matching `condition` into `writer`.
    fn read(&self, condition: &Value, writer: &mut dyn Write) -> Result<()>;

    /// Whether any blob matches `condition`.
    fn exists(&self, condition: &Value) -> Result<bool>;

    /// File document of the first blob matching `condition`.
    fn find_one(&self, condition: &Value) -> Result<Option<Value>>;

    /// Removes the first blob matching `condition`. Returns its file document.
    fn remove(&self, condition: &Value) -> Result<Value>;
}
