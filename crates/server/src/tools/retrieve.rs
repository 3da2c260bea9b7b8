use base64::{engine::general_purpose::STANDARD, Engine as _};
use mcp_cloudfs_core::Storage;
use mcp_cloudfs_proto::{ContentEncoding, DocumentSelector, RetrieveDocumentsArgs};
use serde::Serialize;
use serde_json::json;

use super::{isolate, locate_file, BatchTally, ToolResult};
use crate::envelope::ToolOutcome;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievedDocument {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<ContentEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub(super) fn run<S: Storage>(storage: &S, args: RetrieveDocumentsArgs) -> ToolOutcome {
    let documents: Vec<RetrievedDocument> = args
        .documents
        .iter()
        .map(|selector| {
            isolate(|| retrieve_one(storage, selector, args.encoding, args.max_bytes))
                .unwrap_or_else(|err| RetrievedDocument {
                    success: false,
                    file_id: selector.file_id.clone(),
                    path: selector.path.clone(),
                    error: Some(err.into_message()),
                    ..RetrievedDocument::default()
                })
        })
        .collect();
    let tally = BatchTally::count(documents.iter().map(|d| &d.success));
    ToolOutcome::body(json!({
        "success": tally.all_ok(),
        "retrieved": tally.succeeded,
        "failed": tally.failed,
        "documents": documents,
    }))
}

fn retrieve_one<S: Storage>(
    storage: &S,
    selector: &DocumentSelector,
    encoding: Option<ContentEncoding>,
    max_bytes: Option<u64>,
) -> ToolResult<RetrievedDocument> {
    let info = locate_file(storage, selector.file_id.as_deref(), selector.path.as_deref())?;
    let bytes = storage.get_file_content(&info.id)?;
    let (content, encoding, truncated) = encode(bytes, encoding, max_bytes);
    Ok(RetrievedDocument {
        success: true,
        file_id: Some(info.id),
        name: Some(info.name),
        path: Some(info.path),
        size: Some(info.size),
        content: Some(content),
        encoding: Some(encoding),
        truncated: Some(truncated),
        error: None,
    })
}

/// Without an explicit encoding, valid UTF-8 is returned as text and anything
/// else as base64. Explicit UTF-8 decodes lossily.
fn encode(
    mut bytes: Vec<u8>,
    requested: Option<ContentEncoding>,
    max_bytes: Option<u64>,
) -> (String, ContentEncoding, bool) {
    let limit = max_bytes
        .and_then(|m| usize::try_from(m).ok())
        .unwrap_or(usize::MAX);
    let truncated = bytes.len() > limit;
    let encoding = requested.unwrap_or_else(|| {
        if std::str::from_utf8(&bytes).is_ok() {
            ContentEncoding::Utf8
        } else {
            ContentEncoding::Base64
        }
    });
    match encoding {
        ContentEncoding::Utf8 => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let text = if truncated {
                truncate_at_boundary(&text, limit).to_string()
            } else {
                text
            };
            (text, encoding, truncated)
        }
        ContentEncoding::Base64 => {
            bytes.truncate(limit);
            (STANDARD.encode(&bytes), encoding, truncated)
        }
    }
}

fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
