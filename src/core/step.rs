//! The durable task-record schema.
//!
//! A task record is one persisted document: an ordered list of steps, each
//! carrying its type, its live state, and (once execution starts) the
//! pre-images needed to reverse it. A record found in the log with no owning
//! process is rollback-eligible from its persisted states alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::*;
use crate::core::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Update,
    Save,
    Remove,
    FileSave,
    FileRemove,
}

/// Per-step execution state. Persisted as an integer; the transitions
/// `Initial -> Pending -> Done` happen during forward execution and any
/// compensated step ends at `Rolled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StepState {
    Initial = 0,
    Pending = 1,
    Done = 2,
    Rolled = 3,
}

impl From<StepState> for u8 {
    fn from(state: StepState) -> u8 {
        state as u8
    }
}

impl TryFrom<u8> for StepState {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(StepState::Initial),
            1 => Ok(StepState::Pending),
            2 => Ok(StepState::Done),
            3 => Ok(StepState::Rolled),
            other => Err(format!("invalid step state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,

    #[serde(rename = "type")]
    pub step_type: StepType,

    pub state: StepState,

    /// Target collection/model. Absent for file steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,

    /// Pre-images captured just before this step mutates anything.
    #[serde(rename = "dataStore", default, skip_serializing_if = "Vec::is_empty")]
    pub data_store: Vec<Value>,
}

impl Step {
    fn new(index: usize, step_type: StepType) -> Self {
        Step {
            index,
            step_type,
            state: StepState::Initial,
            name: None,
            condition: None,
            data: None,
            options: None,
            data_store: Vec::new(),
        }
    }

    pub fn update(index: usize, name: String, condition: Value, data: Value) -> Self {
        let mut step = Step::new(index, StepType::Update);
        step.name = Some(name);
        step.condition = Some(condition);
        step.data = Some(data);
        step
    }

    pub fn save(index: usize, name: String, data: Value) -> Self {
        let mut step = Step::new(index, StepType::Save);
        step.name = Some(name);
        step.data = Some(data);
        step
    }

    pub fn remove(index: usize, name: String, condition: Value) -> Self {
        let mut step = Step::new(index, StepType::Remove);
        step.name = Some(name);
        step.condition = Some(condition);
        step
    }

    pub fn file_save(index: usize, file_path: String, options: Option<Value>) -> Self {
        let mut step = Step::new(index, StepType::FileSave);
        step.data = Some(serde_json::json!({ "file_path": file_path }));
        step.options = options;
        step
    }

    pub fn file_remove(index: usize, options: Value) -> Self {
        let mut step = Step::new(index, StepType::FileRemove);
        step.options = Some(options);
        step
    }

    /// Collection name for a step that must have one.
    pub fn model_name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| Error::StoreFailure(format!("step {} has no model name", self.index)))
    }
}

/// One persisted transaction: the plan plus live per-step progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub steps: Vec<Step>,
}

impl TaskRecord {
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_document(doc: &Value) -> Result<TaskRecord> {
        Ok(serde_json::from_value(doc.clone())?)
    }

    fn condition(&self) -> Value {
        serde_json::json!({ "_id": self.id })
    }

    /// Advances a step's state in memory and writes it through to the log.
    /// State durability is the recovery anchor, so every transition goes to
    /// the store before the engine moves on.
    pub(crate) fn write_state(
        &mut self,
        docs: &dyn DocumentStore,
        task_collection: &str,
        index: usize,
        state: StepState,
    ) -> Result<()> {
        self.steps[index].state = state;
        let update = serde_json::json!({
            "$set": { format!("steps.{}.state", index): u8::from(state) }
        });
        docs.update_one(task_collection, &self.condition(), &update)?;
        Ok(())
    }

    /// Persists a step's captured pre-images before the step mutates anything.
    pub(crate) fn write_data_store(
        &mut self,
        docs: &dyn DocumentStore,
        task_collection: &str,
        index: usize,
        data_store: Vec<Value>,
    ) -> Result<()> {
        self.steps[index].data_store = data_store.clone();
        let update = serde_json::json!({
            "$set": { format!("steps.{}.dataStore", index): data_store }
        });
        docs.update_one(task_collection, &self.condition(), &update)?;
        Ok(())
    }

    /// Persists a step's options after execution filled in generated values
    /// (the file-save step assigns the blob id into its options).
    pub(crate) fn write_options(
        &mut self,
        docs: &dyn DocumentStore,
        task_collection: &str,
        index: usize,
        options: Value,
    ) -> Result<()> {
        self.steps[index].options = Some(options.clone());
        let update = serde_json::json!({
            "$set": { format!("steps.{}.options", index): options }
        });
        docs.update_one(task_collection, &self.condition(), &update)?;
        Ok(())
    }
}
