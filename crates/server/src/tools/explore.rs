use mcp_cloudfs_core::{Storage, TreeOptions, TreeSort};
use mcp_cloudfs_proto::{ExploreStorageArgs, TreeSortKey};
use serde_json::json;
use tracing::debug;

use super::{locate_folder, ToolResult};
use crate::envelope::ToolOutcome;

pub(super) fn run<S: Storage>(storage: &S, args: ExploreStorageArgs) -> ToolOutcome {
    match explore(storage, &args) {
        Ok(outcome) => outcome,
        Err(err) => ToolOutcome::failure(err.into_message()),
    }
}

fn explore<S: Storage>(storage: &S, args: &ExploreStorageArgs) -> ToolResult<ToolOutcome> {
    let start = locate_folder(storage, args.folder_id.as_deref(), args.path.as_deref())?;
    let options = TreeOptions {
        include_files: args.include_files,
        include_sizes: args.include_sizes,
        include_modified: args.include_modified,
        name_pattern: args.name_pattern.clone(),
        sort_by: match args.sort_by {
            TreeSortKey::Name => TreeSort::Name,
            TreeSortKey::Size => TreeSort::Size,
            TreeSortKey::Modified => TreeSort::Modified,
            TreeSortKey::Type => TreeSort::Type,
        },
    };
    let tree = storage.build_tree(&start.id, &start.path, args.max_depth, &options)?;
    let (folders, files) = tree.count_descendants();
    debug!(path = %start.path, folders, files, "tree built");
    Ok(ToolOutcome::structured(json!({
        "tree": tree,
        "path": start.path,
        "folderId": start.id,
        "maxDepth": args.max_depth,
        "folderCount": folders,
        "fileCount": files,
    })))
}
