
/// Collection the durable task records live in unless the session overrides it.
pub const DEFAULT_TASK_COLLECTION: &str = "doctx_tasks";

/// Marker key for a forward reference to an earlier step's result.
/// `{"$txFuture": "0.name"}` resolves to `results[0]["name"]` at execution time.
pub const FUTURE_KEY: &str = "$txFuture";

/// Escape tokens for keys the storage layer reserves. A leading `$` and any
/// embedded `.` in user-supplied keys are token-encoded before the task record
/// is persisted and decoded again before the step executes. These tokens are
/// part of the task-record wire format, which makes them reserved strings: a
/// user key that itself contains either token is wire syntax to the decoder
/// and will come back as a different key. Such keys are unsupported.
pub const DOLLAR_TOKEN: &str = "__doctx$__";
pub const DOT_TOKEN: &str = "__doctxDOT__";

/// Key documents are identified by.
pub const ID_KEY: &str = "_id";

pub const MAX_COLLECTION_NAME_LEN: usize = 64;
