//! In-memory reference backend for both capability traits.
//!
//! Backs the test suite and works as an embedded default. Collections are
//! ordered vectors behind an `RwLock`, so match order is insertion order and
//! `update_one`/`delete_one` are deterministic.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::RwLock;

use serde_json::{Map, Value};

use crate::core::constants::ID_KEY;
use crate::core::errors::*;
use crate::core::matcher::{apply_update, matches};
use crate::core::registry::generate_id;
use crate::core::store::{BlobStore, DocumentStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document in a collection, in insertion order. Test helper.
    pub fn dump(&self, collection: &str) -> Vec<Value> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections.get(collection).cloned().unwrap_or_default()
    }

    /// Number of documents in a collection. Test helper.
    pub fn count(&self, collection: &str) -> usize {
        self.dump(collection).len()
    }
}

fn ensure_id(doc: Value) -> Result<Value> {
    let Value::Object(mut map) = doc else {
        return Err(Error::StoreFailure("document must be an object".to_string()));
    };

    if let Some(id) = map.get(ID_KEY) {
        if !id.is_string() {
            return Err(Error::StoreFailure("_id must be a string".to_string()));
        }
    } else {
        map.insert(ID_KEY.to_string(), Value::String(generate_id()));
    }

    Ok(Value::Object(map))
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, condition: &Value, limit: Option<usize>) -> Result<Vec<Value>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let docs = collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);

        let mut found = Vec::new();
        for doc in docs {
            if matches(doc, condition) {
                found.push(doc.clone());
                if limit.is_some_and(|n| found.len() >= n) {
                    break;
                }
            }
        }

        Ok(found)
    }

    fn insert_one(&self, collection: &str, doc: Value) -> Result<Value> {
        let doc = ensure_id(doc)?;
        let id = doc[ID_KEY].clone();

        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.iter().any(|d| d[ID_KEY] == id) {
            return Err(Error::StoreFailure(format!(
                "document with ID {} already exists in '{}'",
                id, collection
            )));
        }

        docs.push(doc.clone());
        Ok(doc)
    }

    fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Value> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let stored = self.insert_one(collection, doc)?;
            ids.push(stored[ID_KEY].clone());
        }

        let mut result = Map::new();
        result.insert("inserted".to_string(), Value::from(ids.len()));
        result.insert("ids".to_string(), Value::Array(ids));
        Ok(Value::Object(result))
    }

    fn update_one(&self, collection: &str, condition: &Value, update: &Value) -> Result<Value> {
        self.update_with_limit(collection, condition, update, Some(1))
    }

    fn update_many(&self, collection: &str, condition: &Value, update: &Value) -> Result<Value> {
        self.update_with_limit(collection, condition, update, None)
    }

    fn replace_one(&self, collection: &str, condition: &Value, doc: &Value) -> Result<Value> {
        if !doc.is_object() {
            return Err(Error::StoreFailure("replacement must be a document".to_string()));
        }

        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let docs = collections.entry(collection.to_string()).or_default();

        for existing in docs.iter_mut() {
            if matches(existing, condition) {
                let id = existing[ID_KEY].clone();
                let mut replacement = doc.clone();
                if let Value::Object(map) = &mut replacement {
                    map.insert(ID_KEY.to_string(), id);
                }
                *existing = replacement;
                return Ok(serde_json::json!({"matched": 1, "modified": 1}));
            }
        }

        Ok(serde_json::json!({"matched": 0, "modified": 0}))
    }

    fn delete_one(&self, collection: &str, condition: &Value) -> Result<Value> {
        self.delete_with_limit(collection, condition, Some(1))
    }

    fn delete_many(&self, collection: &str, condition: &Value) -> Result<Value> {
        self.delete_with_limit(collection, condition, None)
    }
}

impl MemoryStore {
    fn update_with_limit(
        &self,
        collection: &str,
        condition: &Value,
        update: &Value,
        limit: Option<usize>,
    ) -> Result<Value> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let docs = collections.entry(collection.to_string()).or_default();

        let mut matched = 0usize;
        let mut modified = 0usize;

        for doc in docs.iter_mut() {
            if limit.is_some_and(|n| matched >= n) {
                break;
            }
            if !matches(doc, condition) {
                continue;
            }
            matched += 1;

            let mut updated = doc.clone();
            apply_update(&mut updated, update)?;
            if updated != *doc {
                *doc = updated;
                modified += 1;
            }
        }

        Ok(serde_json::json!({"matched": matched, "modified": modified}))
    }

    fn delete_with_limit(
        &self,
        collection: &str,
        condition: &Value,
        limit: Option<usize>,
    ) -> Result<Value> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let docs = collections.entry(collection.to_string()).or_default();

        let before = docs.len();
        let mut deleted = 0usize;
        docs.retain(|doc| {
            if limit.is_some_and(|n| deleted >= n) {
                return true;
            }
            if matches(doc, condition) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        debug_assert_eq!(before - docs.len(), deleted);

        Ok(serde_json::json!({"deleted": deleted}))
    }
}

#[derive(Debug)]
struct BlobEntry {
    doc: Value,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<Vec<BlobEntry>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs. Test helper.
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, meta: Value, reader: &mut dyn Read) -> Result<Value> {
        let mut doc = ensure_id(meta)?;

        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        if let Value::Object(map) = &mut doc {
            map.insert("length".to_string(), Value::from(data.len()));
        }

        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = blobs.iter().position(|b| b.doc[ID_KEY] == doc[ID_KEY]) {
            // overwriting an id replaces the blob, like a keyed object store
            blobs.remove(pos);
        }
        blobs.push(BlobEntry {
            doc: doc.clone(),
            data,
        });

        Ok(doc)
    }

    fn read(&self, condition: &Value, writer: &mut dyn Write) -> Result<()> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        let entry = blobs
            .iter()
            .find(|b| matches(&b.doc, condition))
            .ok_or_else(|| Error::StoreFailure("no blob matches the condition".to_string()))?;

        writer.write_all(&entry.data)?;
        Ok(())
    }

    fn exists(&self, condition: &Value) -> Result<bool> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs.iter().any(|b| matches(&b.doc, condition)))
    }

    fn find_one(&self, condition: &Value) -> Result<Option<Value>> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs
            .iter()
            .find(|b| matches(&b.doc, condition))
            .map(|b| b.doc.clone()))
    }

    fn remove(&self, condition: &Value) -> Result<Value> {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        let pos = blobs
            .iter()
            .position(|b| matches(&b.doc, condition))
            .ok_or_else(|| Error::StoreFailure("no blob matches the condition".to_string()))?;

        Ok(blobs.remove(pos).doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_assigns_id_and_rejects_duplicates() {
        let store = MemoryStore::new();

        let stored = store.insert_one("users", json!({"name": "Max"})).unwrap();
        assert!(stored["_id"].is_string());

        let id = stored["_id"].as_str().unwrap().to_string();
        let dup = store.insert_one("users", json!({"_id": id, "name": "Other"}));
        assert!(dup.is_err());
    }

    #[test]
    fn test_insert_many_reports_ids() {
        let store = MemoryStore::new();

        let result = store
            .insert_many("users", vec![json!({"n": 1}), json!({"n": 2})])
            .unwrap();

        assert_eq!(result["inserted"], 2);
        assert_eq!(result["ids"].as_array().unwrap().len(), 2);
        assert_eq!(store.count("users"), 2);
    }

    #[test]
    fn test_find_with_limit() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store.insert_one("n", json!({"kind": "x", "i": i})).unwrap();
        }

        assert_eq!(store.find("n", &json!({"kind": "x"}), None).unwrap().len(), 3);
        assert_eq!(store.find("n", &json!({"kind": "x"}), Some(1)).unwrap().len(), 1);
        assert_eq!(store.find("missing", &json!({}), None).unwrap().len(), 0);
    }

    #[test]
    fn test_update_one_vs_many() {
        let store = MemoryStore::new();
        store.insert_one("u", json!({"g": 1, "v": 0})).unwrap();
        store.insert_one("u", json!({"g": 1, "v": 0})).unwrap();

        let one = store.update_one("u", &json!({"g": 1}), &json!({"v": 5})).unwrap();
        assert_eq!(one, json!({"matched": 1, "modified": 1}));

        let many = store.update_many("u", &json!({"g": 1}), &json!({"v": 9})).unwrap();
        assert_eq!(many["matched"], 2);
    }

    #[test]
    fn test_update_with_dotted_numeric_path() {
        let store = MemoryStore::new();
        let rec = store
            .insert_one("tasks", json!({"steps": [{"state": 0}, {"state": 0}]}))
            .unwrap();

        store
            .update_one(
                "tasks",
                &json!({"_id": rec["_id"]}),
                &json!({"$set": {"steps.1.state": 2}}),
            )
            .unwrap();

        let found = store.find("tasks", &json!({"_id": rec["_id"]}), Some(1)).unwrap();
        assert_eq!(found[0]["steps"][1]["state"], json!(2));
    }

    #[test]
    fn test_replace_one_drops_extra_fields() {
        let store = MemoryStore::new();
        let doc = store
            .insert_one("u", json!({"name": "A", "extra": true}))
            .unwrap();
        let id = doc["_id"].clone();

        store
            .replace_one("u", &json!({"_id": id}), &json!({"name": "B"}))
            .unwrap();

        let found = store.find("u", &json!({"_id": id}), Some(1)).unwrap();
        assert_eq!(found[0]["name"], "B");
        assert!(found[0].get("extra").is_none());
        assert_eq!(found[0]["_id"], id);
    }

    #[test]
    fn test_delete_one_vs_many() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.insert_one("u", json!({"g": 1})).unwrap();
        }

        assert_eq!(store.delete_one("u", &json!({"g": 1})).unwrap(), json!({"deleted": 1}));
        assert_eq!(store.delete_many("u", &json!({"g": 1})).unwrap(), json!({"deleted": 2}));
        assert_eq!(store.count("u"), 0);
    }

    #[test]
    fn test_blob_round_trip() {
        let blobs = MemoryBlobStore::new();

        let mut src: &[u8] = b"hello blob";
        let doc = blobs
            .write(json!({"filename": "greeting.txt"}), &mut src)
            .unwrap();
        assert!(doc["_id"].is_string());
        assert_eq!(doc["length"], 10);

        assert!(blobs.exists(&json!({"filename": "greeting.txt"})).unwrap());

        let mut out = Vec::new();
        blobs.read(&json!({"_id": doc["_id"]}), &mut out).unwrap();
        assert_eq!(out, b"hello blob");

        blobs.remove(&json!({"_id": doc["_id"]})).unwrap();
        assert!(blobs.is_empty());
    }
}
