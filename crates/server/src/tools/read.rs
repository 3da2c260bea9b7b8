use mcp_cloudfs_core::Storage;
use mcp_cloudfs_proto::ReadDocumentArgs;
use serde_json::json;

use super::{locate_file, ToolError, ToolResult};
use crate::envelope::ToolOutcome;

pub(super) fn run<S: Storage>(storage: &S, args: ReadDocumentArgs) -> ToolOutcome {
    match read(storage, &args) {
        Ok(outcome) => outcome,
        Err(err) => ToolOutcome::failure(err.into_message()),
    }
}

fn read<S: Storage>(storage: &S, args: &ReadDocumentArgs) -> ToolResult<ToolOutcome> {
    let info = locate_file(storage, args.file_id.as_deref(), args.path.as_deref())?;
    let bytes = storage.get_file_content(&info.id)?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let (start, end) = line_window(lines.len(), args.start_line, args.end_line)?;
    let content = if start == 0 {
        String::new()
    } else {
        lines[start - 1..end].join("\n")
    };
    // The text travels in the structured payload; a body `content` key would
    // be replaced by the envelope's content blocks.
    Ok(ToolOutcome::structured(json!({
        "fileId": info.id,
        "name": info.name,
        "path": info.path,
        "size": info.size,
        "totalLines": lines.len(),
        "startLine": start,
        "endLine": end,
        "content": content,
    })))
}

/// 1-based inclusive window clamped to the document. An empty document
/// yields `(0, 0)`.
fn line_window(
    total: usize,
    start_line: Option<u32>,
    end_line: Option<u32>,
) -> ToolResult<(usize, usize)> {
    let start = start_line.map(|s| s as usize).unwrap_or(1).max(1);
    let end = end_line.map(|e| e as usize).unwrap_or(total);
    if end_line.is_some() && start > end {
        return Err(ToolError::new(format!(
            "startLine ({start}) must not exceed endLine ({end})"
        )));
    }
    if total == 0 {
        return Ok((0, 0));
    }
    if start > total {
        return Err(ToolError::new(format!(
            "startLine ({start}) is beyond the end of the document ({total} lines)"
        )));
    }
    Ok((start, end.min(total)))
}
