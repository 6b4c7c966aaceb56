//! Compensation for partially-completed tasks.
//!
//! Given a persisted task record, the roller walks its steps in reverse index
//! order and reverses every step that reached `Pending` or `Done`. A
//! `Pending` step's write may or may not have landed, so its compensation is
//! applied defensively; `Initial` and `Rolled` steps are skipped. After every
//! eligible step is compensated the record itself is deleted, which is the
//! durable signal that nothing is left to recover.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::core::errors::*;
use crate::core::escape::decode_keys;
use crate::core::session::SessionInner;
use crate::core::step::{StepState, StepType, TaskRecord};

/// Result of a crash-recovery sweep. Failures are per-record: one poisoned
/// record does not block the rest.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub rolled: usize,
    pub failures: Vec<(String, Error)>,
}

pub struct Roller {
    ctx: Arc<SessionInner>,
}

impl Roller {
    pub(crate) fn new(ctx: Arc<SessionInner>) -> Self {
        Roller { ctx }
    }

    /// Rolls back every leftover task record in the log. Intended for process
    /// start, to recover tasks a crashed process abandoned mid-flight.
    pub fn sweep(&self) -> Result<SweepOutcome> {
        let records = self
            .ctx
            .docs
            .find(&self.ctx.task_collection, &json!({}), None)?;

        let mut outcome = SweepOutcome::default();
        for doc in records {
            let id = doc
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();

            let result = TaskRecord::from_document(&doc)
                .and_then(|mut record| self.roll_one(&mut record));

            match result {
                Ok(()) => outcome.rolled += 1,
                Err(err) => {
                    warn!(task = %id, error = %err, "sweep failed to roll back task");
                    outcome.failures.push((id, err));
                }
            }
        }

        Ok(outcome)
    }

    /// Rolls back one task record: compensates every `Pending`/`Done` step in
    /// reverse order, then reclaims the record.
    pub fn roll_one(&self, record: &mut TaskRecord) -> Result<()> {
        info!(task = %record.id, "rolling back task");

        for index in (0..record.steps.len()).rev() {
            let state = record.steps[index].state;
            if state == StepState::Initial || state == StepState::Rolled {
                continue;
            }

            let result = match record.steps[index].step_type {
                StepType::Save => self.rollback_save(record, index),
                StepType::Update | StepType::Remove => {
                    self.rollback_update_or_remove(record, index)
                }
                StepType::FileSave => self.rollback_file_save(record, index),
                StepType::FileRemove => self.rollback_file_remove(record, index),
            };

            result.map_err(|err| Error::RollbackFailure {
                index,
                reason: err.to_string(),
            })?;
        }

        self.ctx
            .docs
            .delete_one(&self.ctx.task_collection, &json!({ "_id": record.id }))?;
        info!(task = %record.id, "task record reclaimed");
        Ok(())
    }

    fn mark_rolled(&self, record: &mut TaskRecord, index: usize) -> Result<()> {
        record.write_state(
            self.ctx.docs.as_ref(),
            &self.ctx.task_collection,
            index,
            StepState::Rolled,
        )
    }

    /// A save is reversed by deleting the document whose id was captured
    /// before the insert.
    fn rollback_save(&self, record: &mut TaskRecord, index: usize) -> Result<()> {
        let name = record.steps[index].model_name()?.to_string();

        if let Some(captured) = record.steps[index].data_store.first() {
            let condition = json!({ "_id": captured["_id"] });
            self.ctx.docs.delete_one(&name, &condition)?;
        }

        self.mark_rolled(record, index)
    }

    /// Updates and removes are reversed from their pre-images: an updated
    /// document that still exists is replaced with its pre-image, a removed
    /// document that no longer exists is re-inserted. Anything else is
    /// already consistent.
    fn rollback_update_or_remove(&self, record: &mut TaskRecord, index: usize) -> Result<()> {
        let name = record.steps[index].model_name()?.to_string();
        let step_type = record.steps[index].step_type;
        let pre_images: Vec<Value> = record.steps[index]
            .data_store
            .iter()
            .map(decode_keys)
            .collect();

        for pre in pre_images {
            let condition = json!({ "_id": pre["_id"] });
            let existing = self.ctx.docs.find(&name, &condition, Some(1))?;

            match (existing.is_empty(), step_type) {
                (false, StepType::Update) => {
                    self.ctx.docs.replace_one(&name, &condition, &pre)?;
                }
                (true, StepType::Remove) => {
                    self.ctx.docs.insert_one(&name, pre)?;
                }
                _ => {}
            }
        }

        self.mark_rolled(record, index)
    }

    /// A file save is reversed by deleting the blob under the captured id.
    /// The blob may not exist if the crash hit before the stream finished.
    fn rollback_file_save(&self, record: &mut TaskRecord, index: usize) -> Result<()> {
        if let Some(captured) = record.steps[index].data_store.first() {
            let condition = json!({ "_id": captured["_id"] });
            if self.ctx.blobs.exists(&condition)? {
                self.ctx.blobs.remove(&condition)?;
            }
        }

        self.mark_rolled(record, index)
    }

    /// A file remove is reversed from the shadow copy: if the original is
    /// gone, the shadow's stored file document is written back under the
    /// original id, then the shadow is deleted. No shadow means the original
    /// blob never existed and there is nothing to restore.
    fn rollback_file_remove(&self, record: &mut TaskRecord, index: usize) -> Result<()> {
        let Some(captured) = record.steps[index].data_store.first().cloned() else {
            return self.mark_rolled(record, index);
        };

        let shadow_condition = json!({ "_id": captured["shadow"] });
        let Some(shadow_file) = self.ctx.blobs.find_one(&shadow_condition)? else {
            return self.mark_rolled(record, index);
        };

        let original_condition = json!({ "_id": captured["removed"] });
        if !self.ctx.blobs.exists(&original_condition)? {
            let old_file = shadow_file
                .get("metadata")
                .and_then(|m| m.get("oldFile"))
                .cloned()
                .ok_or_else(|| {
                    Error::StoreFailure("shadow copy has no original file document".to_string())
                })?;

            let mut contents = Vec::new();
            self.ctx.blobs.read(&shadow_condition, &mut contents)?;
            self.ctx.blobs.write(old_file, &mut contents.as_slice())?;
        }

        self.ctx.blobs.remove(&shadow_condition)?;
        self.mark_rolled(record, index)
    }
}
