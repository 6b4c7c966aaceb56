//! The task builder and forward-execution engine.
//!
//! A task queues steps in memory, persists the whole plan as one task record,
//! then executes each step in order. Before a step's side effect runs, the
//! engine captures enough pre-image data to reverse it and writes the step's
//! state transition through to the log, so a crash at any point leaves a
//! record the roller can act on without any other context.

use std::fs::File;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::core::errors::*;
use crate::core::escape::{decode_keys, encode_keys};
use crate::core::future::resolve_futures;
use crate::core::matcher::apply_update;
use crate::core::registry::generate_id;
use crate::core::roller::Roller;
use crate::core::schema::validate_collection_name;
use crate::core::session::SessionInner;
use crate::core::step::{Step, StepState, StepType, TaskRecord};

/// Structural stand-in for a live document: anything that knows which
/// collection it belongs to and what its identifier is can be passed to the
/// `*_doc` builder methods.
pub trait DocumentHandle {
    fn collection_name(&self) -> &str;
    fn id(&self) -> Value;
    fn to_document(&self) -> Result<Value>;
}

/// Execution modifiers for a whole run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Validate update post-images against registered schemas for every
    /// update step, not only those carrying `{"validate": true}` options.
    pub validate: bool,
}

pub struct Task {
    ctx: Arc<SessionInner>,
    steps: Vec<Step>,
    executed: bool,
}

impl Task {
    pub(crate) fn new(ctx: Arc<SessionInner>) -> Self {
        Task {
            ctx,
            steps: Vec::new(),
            executed: false,
        }
    }

    /// Queues an update of every document matching `condition` (or just the
    /// first, unless the step later gets `{"multi": true}` options).
    pub fn update(&mut self, model: &str, condition: Value, data: Value) -> Result<&mut Self> {
        let name = valid_model(model)?;
        require_object(&condition, "condition")?;
        require_object(&data, "data")?;

        let index = self.steps.len();
        self.steps.push(Step::update(
            index,
            name,
            encode_keys(&condition),
            encode_keys(&data),
        ));
        Ok(self)
    }

    /// Dual form of [`Task::update`] for a live document: the condition
    /// defaults to the document's identifier.
    pub fn update_doc(&mut self, doc: &dyn DocumentHandle, data: Value) -> Result<&mut Self> {
        let condition = json!({ "_id": doc.id() });
        self.update(doc.collection_name(), condition, data)
    }

    /// Queues an insert.
    pub fn save(&mut self, model: &str, doc: Value) -> Result<&mut Self> {
        let name = valid_model(model)?;
        require_object(&doc, "doc")?;

        let index = self.steps.len();
        self.steps.push(Step::save(index, name, encode_keys(&doc)));
        Ok(self)
    }

    /// Dual form of [`Task::save`] for a live document.
    pub fn save_doc(&mut self, doc: &dyn DocumentHandle) -> Result<&mut Self> {
        let body = doc.to_document()?;
        self.save(doc.collection_name(), body)
    }

    /// Queues a removal of every document matching `condition`.
    pub fn remove(&mut self, model: &str, condition: Value) -> Result<&mut Self> {
        let name = valid_model(model)?;
        require_object(&condition, "condition")?;

        let index = self.steps.len();
        self.steps.push(Step::remove(index, name, encode_keys(&condition)));
        Ok(self)
    }

    /// Dual form of [`Task::remove`] for a live document.
    pub fn remove_doc(&mut self, doc: &dyn DocumentHandle) -> Result<&mut Self> {
        let condition = json!({ "_id": doc.id() });
        self.remove(doc.collection_name(), condition)
    }

    /// Attaches options to the most recently queued step. Only update steps
    /// accept options (`{"multi": true}`, `{"validate": true}`).
    pub fn options(&mut self, options: Value) -> Result<&mut Self> {
        require_object(&options, "options")?;

        let step = self
            .steps
            .last_mut()
            .ok_or_else(|| Error::InvalidInput("can't set options on an empty task".to_string()))?;

        if step.step_type != StepType::Update {
            return Err(Error::InvalidInput(format!(
                "{:?} steps do not accept options",
                step.step_type
            )));
        }

        step.options = Some(encode_keys(&options));
        Ok(self)
    }

    /// Queues streaming a local file into the blob store. `options` describes
    /// the blob (filename, metadata, an explicit `_id`, ...).
    pub fn save_file(&mut self, file_path: &str, options: Option<Value>) -> Result<&mut Self> {
        if file_path.is_empty() {
            return Err(Error::InvalidInput("file path is required".to_string()));
        }
        if let Some(opts) = &options {
            require_object(opts, "options")?;
        }

        let index = self.steps.len();
        self.steps.push(Step::file_save(
            index,
            file_path.to_string(),
            options.as_ref().map(encode_keys),
        ));
        Ok(self)
    }

    /// Queues removal of the blob matching `options`.
    pub fn remove_file(&mut self, options: Value) -> Result<&mut Self> {
        require_object(&options, "options")?;

        let index = self.steps.len();
        self.steps.push(Step::file_remove(index, encode_keys(&options)));
        Ok(self)
    }

    /// Registers a model schema through the session registry.
    pub fn init_model(
        &mut self,
        name: &str,
        schema: Option<crate::core::schema::Schema>,
    ) -> Result<&mut Self> {
        self.ctx.registry.init_model(name, schema)?;
        Ok(self)
    }

    /// Persists the queued plan and executes it step by step. On any step's
    /// failure the roller reverses completed work and the original error is
    /// returned. A task runs once; running it again fails.
    pub fn run(&mut self) -> Result<Vec<Value>> {
        self.run_with(RunOptions::default())
    }

    pub fn run_with(&mut self, run_options: RunOptions) -> Result<Vec<Value>> {
        if self.executed {
            return Err(Error::AlreadyExecuted);
        }
        self.executed = true;

        let record = TaskRecord {
            id: generate_id(),
            steps: std::mem::take(&mut self.steps),
        };

        self.ctx
            .docs
            .insert_one(&self.ctx.task_collection, record.to_document()?)?;
        debug!(task = %record.id, steps = record.steps.len(), "task record persisted");

        let mut executor = Executor {
            ctx: Arc::clone(&self.ctx),
            record,
            results: Vec::new(),
        };

        match executor.run_steps(run_options) {
            Ok(()) => {
                executor.cleanup_shadows();
                self.ctx.docs.delete_one(
                    &self.ctx.task_collection,
                    &json!({ "_id": executor.record.id }),
                )?;
                debug!(task = %executor.record.id, "task completed");
                Ok(executor.results)
            }
            Err(err) => {
                info!(task = %executor.record.id, error = %err, "step failed, rolling back");
                let roller = Roller::new(Arc::clone(&self.ctx));
                if let Err(roll_err) = roller.roll_one(&mut executor.record) {
                    // the original failure stays the primary error
                    error!(task = %executor.record.id, error = %roll_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

struct Executor {
    ctx: Arc<SessionInner>,
    record: TaskRecord,
    results: Vec<Value>,
}

impl Executor {
    fn run_steps(&mut self, run_options: RunOptions) -> Result<()> {
        for index in 0..self.record.steps.len() {
            match self.record.steps[index].step_type {
                StepType::Update => self.perform_update(index, run_options)?,
                StepType::Save => self.perform_save(index)?,
                StepType::Remove => self.perform_remove(index)?,
                StepType::FileSave => self.perform_file_save(index)?,
                StepType::FileRemove => self.perform_file_remove(index)?,
            }
        }
        Ok(())
    }

    fn write_state(&mut self, index: usize, state: StepState) -> Result<()> {
        self.record
            .write_state(self.ctx.docs.as_ref(), &self.ctx.task_collection, index, state)
    }

    fn write_data_store(&mut self, index: usize, data_store: Vec<Value>) -> Result<()> {
        self.record.write_data_store(
            self.ctx.docs.as_ref(),
            &self.ctx.task_collection,
            index,
            data_store,
        )
    }

    fn perform_update(&mut self, index: usize, run_options: RunOptions) -> Result<()> {
        let step = &self.record.steps[index];
        let name = step.model_name()?.to_string();
        let mut condition = decode_keys(step.condition.as_ref().unwrap_or(&json!({})));
        let mut data = decode_keys(step.data.as_ref().unwrap_or(&json!({})));
        let mut options = step.options.as_ref().map(decode_keys);

        resolve_futures(&mut condition, &self.results)?;
        resolve_futures(&mut data, &self.results)?;
        if let Some(opts) = &mut options {
            resolve_futures(opts, &self.results)?;
        }

        let multi = bool_option(options.as_ref(), "multi");

        // snapshot before anything mutates
        let limit = if multi { None } else { Some(1) };
        let pre_images = self.ctx.docs.find(&name, &condition, limit)?;
        self.write_data_store(index, pre_images.iter().map(encode_keys).collect())?;

        let validate = run_options.validate || bool_option(options.as_ref(), "validate");
        if validate {
            if let Some(schema) = self.ctx.registry.schema_for(&name) {
                for pre in &pre_images {
                    let mut post = pre.clone();
                    apply_update(&mut post, &data)?;
                    schema.validate(&post)?;
                }
            }
        }

        self.write_state(index, StepState::Pending)?;

        let result = if multi {
            self.ctx.docs.update_many(&name, &condition, &data)?
        } else {
            self.ctx.docs.update_one(&name, &condition, &data)?
        };
        self.results.push(result);

        self.write_state(index, StepState::Done)
    }

    fn perform_save(&mut self, index: usize) -> Result<()> {
        let step = &self.record.steps[index];
        let name = step.model_name()?.to_string();
        let mut data = decode_keys(step.data.as_ref().unwrap_or(&json!({})));

        resolve_futures(&mut data, &self.results)?;

        let id = match data.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Value::String(generate_id());
                if let Value::Object(map) = &mut data {
                    map.insert("_id".to_string(), id.clone());
                }
                id
            }
        };
        self.write_data_store(index, vec![json!({ "_id": id })])?;

        if let Some(schema) = self.ctx.registry.schema_for(&name) {
            schema.validate(&data)?;
        }

        self.write_state(index, StepState::Pending)?;

        let result = self.ctx.docs.insert_one(&name, data)?;
        self.results.push(result);

        self.write_state(index, StepState::Done)
    }

    fn perform_remove(&mut self, index: usize) -> Result<()> {
        let step = &self.record.steps[index];
        let name = step.model_name()?.to_string();
        let mut condition = decode_keys(step.condition.as_ref().unwrap_or(&json!({})));

        resolve_futures(&mut condition, &self.results)?;

        // removal affects every match, so snapshot them all
        let pre_images = self.ctx.docs.find(&name, &condition, None)?;
        self.write_data_store(index, pre_images.iter().map(encode_keys).collect())?;

        self.write_state(index, StepState::Pending)?;

        let result = self.ctx.docs.delete_many(&name, &condition)?;
        self.results.push(result);

        self.write_state(index, StepState::Done)
    }

    fn perform_file_save(&mut self, index: usize) -> Result<()> {
        let step = &self.record.steps[index];
        let mut options = step
            .options
            .as_ref()
            .map(decode_keys)
            .unwrap_or_else(|| json!({}));
        let file_path = step
            .data
            .as_ref()
            .and_then(|d| d.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::StoreFailure(format!("step {} has no file path", index)))?
            .to_string();

        resolve_futures(&mut options, &self.results)?;

        let id = match options.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Value::String(generate_id());
                if let Value::Object(map) = &mut options {
                    map.insert("_id".to_string(), id.clone());
                }
                id
            }
        };

        // the generated blob id must survive a crash before the stream finishes
        self.record.write_options(
            self.ctx.docs.as_ref(),
            &self.ctx.task_collection,
            index,
            encode_keys(&options),
        )?;
        self.write_data_store(index, vec![json!({ "_id": id })])?;

        self.write_state(index, StepState::Pending)?;

        let mut file = File::open(&file_path)?;
        let result = self.ctx.blobs.write(options, &mut file)?;
        self.results.push(result);

        self.write_state(index, StepState::Done)
    }

    fn perform_file_remove(&mut self, index: usize) -> Result<()> {
        let step = &self.record.steps[index];
        let mut options = step
            .options
            .as_ref()
            .map(decode_keys)
            .unwrap_or_else(|| json!({}));

        resolve_futures(&mut options, &self.results)?;

        // shadow-copy the blob so rollback can restore it
        let existing = self.ctx.blobs.find_one(&options)?;
        if let Some(file) = &existing {
            let shadow = generate_id();
            self.write_data_store(
                index,
                vec![json!({ "removed": file["_id"], "shadow": shadow })],
            )?;

            let mut contents = Vec::new();
            self.ctx.blobs.read(&json!({ "_id": file["_id"] }), &mut contents)?;
            self.ctx.blobs.write(
                json!({ "_id": shadow, "metadata": { "oldFile": file } }),
                &mut contents.as_slice(),
            )?;
        }

        self.write_state(index, StepState::Pending)?;

        match existing {
            None => self.results.push(Value::Null),
            Some(_) => {
                let result = self.ctx.blobs.remove(&options)?;
                self.results.push(result);
            }
        }

        self.write_state(index, StepState::Done)
    }

    /// Deletes the shadow copies left behind by file-remove steps. Runs on
    /// the success path only; a leftover shadow is harmless, so failures are
    /// logged rather than turned into a rollback of a completed task.
    fn cleanup_shadows(&self) {
        for step in &self.record.steps {
            if step.step_type != StepType::FileRemove {
                continue;
            }
            let Some(shadow) = step.data_store.first().and_then(|d| d.get("shadow")) else {
                continue;
            };

            let condition = json!({ "_id": shadow });
            match self.ctx.blobs.exists(&condition) {
                Ok(true) => {
                    if let Err(err) = self.ctx.blobs.remove(&condition) {
                        tracing::warn!(task = %self.record.id, error = %err, "failed to delete shadow copy");
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(task = %self.record.id, error = %err, "failed to check shadow copy");
                }
            }
        }
    }
}

fn valid_model(model: &str) -> Result<String> {
    validate_collection_name(model)
        .map_err(|e| Error::InvalidInput(format!("invalid model '{}': {}", model, e)))?;
    Ok(model.to_string())
}

fn require_object(value: &Value, what: &str) -> Result<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{} must be a document", what)))
    }
}

fn bool_option(options: Option<&Value>, key: &str) -> bool {
    options
        .and_then(|o| o.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
