use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a model named '{name}' is already registered")]
    AlreadyRegistered { name: String },

    #[error("this task has already been executed")]
    AlreadyExecuted,

    #[error("no result exists (yet) at step index {index}")]
    UnresolvedReference { index: usize },

    #[error("invalid future reference: {0}")]
    InvalidReference(String),

    #[error("type mismatch resolving future reference: {0}")]
    TypeMismatch(String),

    #[error("validation failed at '{path}': {reason}")]
    ValidationFailed { path: String, reason: String },

    #[error("store failure: {0}")]
    StoreFailure(String),

    #[error("rollback failed at step {index}: {reason}")]
    RollbackFailure { index: usize, reason: String },

    #[error("collection name cannot be empty")]
    CollectionNameEmpty,

    #[error("collection name too long (max 64 characters)")]
    CollectionNameTooLong,

    #[error("collection name must start with a letter or underscore and use alphanumeric characters or underscores")]
    CollectionNameInvalid,

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
