use mcp_cloudfs_core::{normalize_path, Storage};
use mcp_cloudfs_proto::{FolderAction, FolderOperation, ManageFoldersArgs};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{isolate, locate_folder, non_empty, BatchTally, ToolError, ToolResult};
use crate::envelope::ToolOutcome;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FolderOpResult {
    action: FolderAction,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub(super) fn run<S: Storage>(storage: &S, args: ManageFoldersArgs) -> ToolOutcome {
    let results: Vec<FolderOpResult> = args
        .operations
        .iter()
        .map(|op| {
            isolate(|| apply(storage, op)).unwrap_or_else(|err| FolderOpResult {
                action: op.action,
                success: false,
                folder_id: op.folder_id.clone(),
                path: op.path.clone(),
                error: Some(err.into_message()),
            })
        })
        .collect();
    let tally = BatchTally::count(results.iter().map(|r| &r.success));
    ToolOutcome::body(json!({
        "success": tally.all_ok(),
        "completed": tally.succeeded,
        "failed": tally.failed,
        "results": results,
    }))
}

fn apply<S: Storage>(storage: &S, op: &FolderOperation) -> ToolResult<FolderOpResult> {
    let (folder_id, path) = match op.action {
        FolderAction::Create => {
            let raw = non_empty(op.path.as_deref())
                .ok_or_else(|| ToolError::new("create requires path"))?;
            let path = normalize_path(raw)?;
            let id = storage.ensure_folder_path(&path, op.description.as_deref())?;
            (id, path)
        }
        FolderAction::Move => {
            let source = source_folder(storage, op)?;
            if non_empty(op.destination_folder_id.as_deref()).is_none()
                && non_empty(op.destination_path.as_deref()).is_none()
            {
                return Err(ToolError::new(
                    "move requires destinationPath or destinationFolderId",
                ));
            }
            let destination = locate_folder(
                storage,
                op.destination_folder_id.as_deref(),
                op.destination_path.as_deref(),
            )?;
            let moved = storage.move_folder(&source.id, &destination.id)?;
            info!(from = %source.path, to = %moved.path, "folder moved");
            (moved.id, moved.path)
        }
        FolderAction::Rename => {
            let source = source_folder(storage, op)?;
            let new_name = non_empty(op.new_name.as_deref())
                .ok_or_else(|| ToolError::new("rename requires newName"))?;
            let renamed = storage.rename_folder(&source.id, new_name)?;
            info!(from = %source.path, to = %renamed.path, "folder renamed");
            (renamed.id, renamed.path)
        }
        FolderAction::Delete => {
            let source = source_folder(storage, op)?;
            storage.delete_folder(&source.id, op.recursive)?;
            info!(path = %source.path, recursive = op.recursive, "folder deleted");
            (source.id, source.path)
        }
    };
    Ok(FolderOpResult {
        action: op.action,
        success: true,
        folder_id: Some(folder_id),
        path: Some(path),
        error: None,
    })
}

fn source_folder<S: Storage>(
    storage: &S,
    op: &FolderOperation,
) -> ToolResult<mcp_cloudfs_core::Folder> {
    if non_empty(op.folder_id.as_deref()).is_none() && non_empty(op.path.as_deref()).is_none() {
        return Err(ToolError::new(format!(
            "{} requires path or folderId",
            op.action.as_str()
        )));
    }
    locate_folder(storage, op.folder_id.as_deref(), op.path.as_deref())
}
