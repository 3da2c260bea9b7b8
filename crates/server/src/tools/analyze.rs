use std::collections::HashSet;

use mcp_cloudfs_core::Storage;
use mcp_cloudfs_proto::AnalyzeContentArgs;
use serde_json::json;

use super::{locate_file_id, non_empty, ToolError, ToolResult};
use crate::envelope::ToolOutcome;

pub(super) fn run<S: Storage>(storage: &S, args: AnalyzeContentArgs) -> ToolOutcome {
    match analyze(storage, &args) {
        Ok(outcome) => outcome,
        Err(err) => ToolOutcome::failure(err.into_message()),
    }
}

fn analyze<S: Storage>(storage: &S, args: &AnalyzeContentArgs) -> ToolResult<ToolOutcome> {
    let question = args.question.trim();
    if question.is_empty() {
        return Err(ToolError::new("question must not be empty"));
    }
    let mut file_ids: Vec<String> = args
        .file_ids
        .iter()
        .flatten()
        .filter_map(|id| non_empty(Some(id.as_str())).map(str::to_string))
        .collect();
    for path in args.paths.iter().flatten() {
        file_ids.push(locate_file_id(storage, path)?);
    }
    if file_ids.is_empty() {
        return Err(ToolError::new("Provide at least one entry in fileIds or paths"));
    }
    let mut seen = HashSet::new();
    file_ids.retain(|id| seen.insert(id.clone()));
    let analysis = storage.analyze(&file_ids, question)?;
    Ok(ToolOutcome::structured(json!({
        "answer": analysis.answer,
        "citations": analysis.citations,
        "fileIds": file_ids,
    })))
}
