//! Tool handlers. Each one translates validated arguments into `Storage`
//! calls and reports `{success, ...}`; domain failures never escape as
//! JSON-RPC errors.

mod analyze;
mod explore;
mod folders;
mod read;
mod retrieve;
mod save;
mod search;
mod share;

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use mcp_cloudfs_core::{
    normalize_path, split_file_path, FileInfo, Folder, ItemId, Storage, ROOT_PATH,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{envelope::ToolOutcome, registry::ToolKind};

/// Failure message of a single handler step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError(String);

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    pub fn into_message(self) -> String {
        self.0
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<E: std::error::Error> From<E> for ToolError {
    fn from(err: E) -> Self {
        Self(err.to_string())
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Runs a tool against the store. Mutating tools hold `gate` for the whole
/// call so their check-then-write sequences are not interleaved.
pub fn run<S: Storage>(kind: ToolKind, storage: &S, gate: &Mutex<()>, arguments: Value) -> ToolOutcome {
    let _guard = kind.is_mutating().then(|| gate.lock());
    debug!(tool = kind.name(), "running tool handler");
    let outcome = match kind {
        ToolKind::SaveDocuments => with_args(arguments, |args| save::run(storage, args)),
        ToolKind::RetrieveDocuments => with_args(arguments, |args| retrieve::run(storage, args)),
        ToolKind::ReadDocument => with_args(arguments, |args| read::run(storage, args)),
        ToolKind::ManageFolders => with_args(arguments, |args| folders::run(storage, args)),
        ToolKind::ExploreStorage => with_args(arguments, |args| explore::run(storage, args)),
        ToolKind::ShareContent => with_args(arguments, |args| share::run(storage, args)),
        ToolKind::SearchContent => with_args(arguments, |args| search::run(storage, args)),
        ToolKind::AnalyzeContent => with_args(arguments, |args| analyze::run(storage, args)),
    };
    if outcome.is_error {
        warn!(tool = kind.name(), "tool reported failure");
    }
    outcome
}

fn with_args<A, F>(arguments: Value, handler: F) -> ToolOutcome
where
    A: DeserializeOwned,
    F: FnOnce(A) -> ToolOutcome,
{
    match serde_json::from_value::<A>(arguments) {
        Ok(args) => handler(args),
        Err(err) => ToolOutcome::failure(format!("invalid arguments: {err}")),
    }
}

fn folder_not_found(path: &str) -> ToolError {
    ToolError::new(format!("Folder not found: {path}"))
}

fn file_not_found(what: &str) -> ToolError {
    ToolError::new(format!("File not found: {what}"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolves a folder by id (preferred) or path.
pub(crate) fn locate_folder<S: Storage>(
    storage: &S,
    folder_id: Option<&str>,
    path: Option<&str>,
) -> ToolResult<Folder> {
    if let Some(id) = non_empty(folder_id) {
        return storage
            .get_folder(id)?
            .ok_or_else(|| ToolError::new(format!("Folder not found: id {id}")));
    }
    let path = normalize_path(path.unwrap_or(ROOT_PATH))?;
    let id = storage
        .resolve_path(&path)?
        .ok_or_else(|| folder_not_found(&path))?;
    storage.get_folder(&id)?.ok_or_else(|| folder_not_found(&path))
}

/// Resolves a file by id (preferred) or path.
pub(crate) fn locate_file<S: Storage>(
    storage: &S,
    file_id: Option<&str>,
    path: Option<&str>,
) -> ToolResult<FileInfo> {
    if let Some(id) = non_empty(file_id) {
        return storage
            .get_file(id)?
            .ok_or_else(|| file_not_found(&format!("id {id}")));
    }
    let Some(path) = non_empty(path) else {
        return Err(ToolError::new("Provide either fileId or path"));
    };
    let id = locate_file_id(storage, path)?;
    storage.get_file(&id)?.ok_or_else(|| file_not_found(path))
}

pub(crate) fn locate_file_id<S: Storage>(storage: &S, path: &str) -> ToolResult<ItemId> {
    let (folder_path, name) = split_file_path(path)?;
    let parent = storage
        .resolve_path(&folder_path)?
        .ok_or_else(|| file_not_found(path))?;
    storage
        .check_file_exists(&parent, &name)?
        .map(|found| found.id)
        .ok_or_else(|| file_not_found(path))
}

/// Runs one batch item. A panic inside it becomes that item's failure so the
/// remaining items still run.
pub(crate) fn isolate<T>(item: impl FnOnce() -> ToolResult<T>) -> ToolResult<T> {
    panic::catch_unwind(AssertUnwindSafe(item)).unwrap_or_else(|payload| {
        let reason = panic_reason(payload.as_ref());
        warn!(reason = %reason, "batch item panicked");
        Err(ToolError::new(format!("internal error: {reason}")))
    })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "item handler panicked".to_string()
    }
}

/// Aggregates per-item outcomes of a batch handler.
pub(crate) struct BatchTally {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn count<'a>(results: impl IntoIterator<Item = &'a bool>) -> Self {
        let mut tally = BatchTally {
            succeeded: 0,
            failed: 0,
        };
        for ok in results {
            if *ok {
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
            }
        }
        tally
    }

    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}
