
pub mod config;
pub mod constants;
pub mod errors;
pub mod escape;
pub mod future;
pub mod matcher;
pub mod memory;
pub mod registry;
pub mod roller;
pub mod schema;
pub mod session;
pub mod step;
pub mod store;
pub mod task;

pub use config::{clean_options, ConnectionConfig};
pub use future::FutureRef;
pub use memory::{MemoryBlobStore, MemoryStore};
pub use registry::Registry;
pub use roller::{Roller, SweepOutcome};
pub use schema::{Schema, ValueType};
pub use session::Session;
pub use step::{Step, StepState, StepType, TaskRecord};
pub use store::{BlobStore, DocumentStore};
pub use task::{DocumentHandle, RunOptions, Task};
