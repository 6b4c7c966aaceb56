
pub mod core;

pub use core::{
    BlobStore, ConnectionConfig, DocumentHandle, DocumentStore, FutureRef, MemoryBlobStore,
    MemoryStore, Registry, Roller, RunOptions, Schema, Session, Step, StepState, StepType,
    SweepOutcome, Task, TaskRecord, ValueType,
};
pub use core::errors::{Error, Result};
