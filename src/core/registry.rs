//! Model registry and identifier generation.
//!
//! The registry maps collection names to an optional validation schema. It is
//! owned by the session (one registry per session, no process-wide state) and
//! shared by reference into tasks and rollers. Lookup lazily registers a
//! schema-less model; `init_model` fails fast on a duplicate name.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::errors::*;
use crate::core::schema::{validate_collection_name, Schema};

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub schema: Option<Schema>,
}

#[derive(Debug, Default)]
pub struct Registry {
    models: RwLock<HashMap<String, Model>>,
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        Registry {
            models: RwLock::new(models.clone()),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model with an optional schema. Fails with
    /// `AlreadyRegistered` if the name was registered before, including
    /// lazily.
    pub fn init_model(&self, name: &str, schema: Option<Schema>) -> Result<()> {
        validate_collection_name(name)?;

        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        if models.contains_key(name) {
            return Err(Error::AlreadyRegistered {
                name: name.to_string(),
            });
        }

        models.insert(
            name.to_string(),
            Model {
                name: name.to_string(),
                schema,
            },
        );

        Ok(())
    }

    /// Fetches a model, lazily registering a schema-less one on first use.
    /// Concurrent first lookups may race; last writer wins, which is harmless
    /// because a lazily-registered model carries no schema.
    pub fn get(&self, name: &str) -> Result<Model> {
        validate_collection_name(name)?;

        {
            let models = self.models.read().unwrap_or_else(|e| e.into_inner());
            if let Some(model) = models.get(name) {
                return Ok(model.clone());
            }
        }

        let model = Model {
            name: name.to_string(),
            schema: None,
        };
        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        models.insert(name.to_string(), model.clone());

        Ok(model)
    }

    /// Schema for a name, if one was registered with `init_model`.
    pub fn schema_for(&self, name: &str) -> Option<Schema> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        models.get(name).and_then(|m| m.schema.clone())
    }
}

/// Generates a unique string identifier: nanosecond timestamp plus a hashed
/// nonce, the same scheme the stores use when a document arrives without one.
pub fn generate_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};

    let random_state = RandomState::new();
    let mut hasher = random_state.build_hasher();
    timestamp.hash(&mut hasher);
    let random_part = hasher.finish();

    format!("{}_{:x}", timestamp, random_part)
}
