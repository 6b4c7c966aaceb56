//! Session context: the explicit owner of the store handles, the model
//! registry, and the task-collection name. Tasks and rollers borrow the
//! context by `Arc`, so concurrent sessions never share hidden state.

use std::sync::Arc;

use crate::core::constants::DEFAULT_TASK_COLLECTION;
use crate::core::errors::*;
use crate::core::registry::Registry;
use crate::core::roller::Roller;
use crate::core::schema::{validate_collection_name, Schema};
use crate::core::store::{BlobStore, DocumentStore};
use crate::core::task::Task;

pub(crate) struct SessionInner {
    pub(crate) docs: Arc<dyn DocumentStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) registry: Registry,
    pub(crate) task_collection: String,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Opens a session over prepared store handles, logging task records in
    /// the default collection.
    pub fn new(docs: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Session {
            inner: Arc::new(SessionInner {
                docs,
                blobs,
                registry: Registry::new(),
                task_collection: DEFAULT_TASK_COLLECTION.to_string(),
            }),
        }
    }

    /// Overrides the collection task records are logged in. Meant for
    /// session setup, before any task has run; the roller only sweeps this
    /// collection. Models already registered on this session carry over.
    pub fn with_task_collection(self, name: &str) -> Result<Self> {
        validate_collection_name(name)?;

        Ok(Session {
            inner: Arc::new(SessionInner {
                docs: Arc::clone(&self.inner.docs),
                blobs: Arc::clone(&self.inner.blobs),
                registry: self.inner.registry.clone(),
                task_collection: name.to_string(),
            }),
        })
    }

    /// A fresh task bound to this session.
    pub fn task(&self) -> Task {
        Task::new(Arc::clone(&self.inner))
    }

    /// The rollback subsystem bound to this session's task log.
    pub fn roller(&self) -> Roller {
        Roller::new(Arc::clone(&self.inner))
    }

    /// Registers a model schema. Fails on a duplicate name.
    pub fn init_model(&self, name: &str, schema: Option<Schema>) -> Result<()> {
        self.inner.registry.init_model(name, schema)
    }

    pub fn task_collection(&self) -> &str {
        &self.inner.task_collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::{MemoryBlobStore, MemoryStore};

    #[test]
    fn test_default_and_custom_task_collection() {
        let session = Session::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()));
        assert_eq!(session.task_collection(), DEFAULT_TASK_COLLECTION);

        let session = session.with_task_collection("my_tasks").unwrap();
        assert_eq!(session.task_collection(), "my_tasks");

        let session = Session::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()));
        assert!(session.with_task_collection("bad name").is_err());
    }

    #[test]
    fn test_registered_models_survive_task_collection_override() {
        let session = Session::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()));
        session.init_model("users", None).unwrap();

        let session = session.with_task_collection("my_tasks").unwrap();
        assert!(session.init_model("users", None).is_err());
    }

    #[test]
    fn test_init_model_is_session_scoped() {
        let a = Session::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()));
        let b = Session::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()));

        a.init_model("users", None).unwrap();
        assert!(a.init_model("users", None).is_err());

        // a second session has its own registry
        b.init_model("users", None).unwrap();
    }
}
