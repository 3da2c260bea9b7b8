use base64::{engine::general_purpose::STANDARD, Engine as _};
use mcp_cloudfs_core::{join_path, split_file_path, Storage};
use mcp_cloudfs_proto::{ContentEncoding, SaveDocument, SaveDocumentsArgs};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::{folder_not_found, isolate, BatchTally, ToolError, ToolResult};
use crate::envelope::ToolOutcome;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveItemResult {
    path: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overwritten: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub(super) fn run<S: Storage>(storage: &S, args: SaveDocumentsArgs) -> ToolOutcome {
    let results: Vec<SaveItemResult> = args
        .documents
        .iter()
        .map(|doc| match isolate(|| save_one(storage, doc, args.create_folders)) {
            Ok(saved) => saved,
            Err(err) => SaveItemResult {
                path: doc.path.clone(),
                success: false,
                file_id: None,
                size: None,
                overwritten: None,
                error: Some(err.into_message()),
            },
        })
        .collect();
    let tally = BatchTally::count(results.iter().map(|r| &r.success));
    ToolOutcome::body(json!({
        "success": tally.all_ok(),
        "saved": tally.succeeded,
        "failed": tally.failed,
        "results": results,
    }))
}

fn save_one<S: Storage>(
    storage: &S,
    doc: &SaveDocument,
    create_folders: bool,
) -> ToolResult<SaveItemResult> {
    let (folder_path, name) = split_file_path(&doc.path)?;
    let content = match doc.encoding.unwrap_or_default() {
        ContentEncoding::Utf8 => doc.content.as_bytes().to_vec(),
        ContentEncoding::Base64 => STANDARD
            .decode(doc.content.trim())
            .map_err(|e| ToolError::new(format!("content is not valid base64: {e}")))?,
    };
    let parent = if create_folders {
        storage.ensure_folder_path(&folder_path, doc.description.as_deref())?
    } else {
        storage
            .resolve_path(&folder_path)?
            .ok_or_else(|| folder_not_found(&folder_path))?
    };
    let path = join_path(&folder_path, &name);
    let existing = storage.check_file_exists(&parent, &name)?;
    if existing.is_some() && !doc.overwrite {
        return Err(ToolError::new(format!(
            "File already exists: {path} (set overwrite to replace it)"
        )));
    }
    let saved = storage.upload_file(&parent, &name, &content)?;
    debug!(path = %path, file_id = %saved.id, size = saved.size, "document saved");
    Ok(SaveItemResult {
        path,
        success: true,
        file_id: Some(saved.id),
        size: Some(saved.size),
        overwritten: Some(existing.is_some()),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::TrippingStorage;
    use mcp_cloudfs_storage_ephemeral::EphemeralStorage;
    use serde_json::{json, Value};

    fn args(value: Value) -> SaveDocumentsArgs {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn one_failing_item_does_not_abort_the_batch() {
        let store = EphemeralStorage::new();
        let parent = store.ensure_folder_path("/notes", None).unwrap();
        store.upload_file(&parent, "b.md", b"old").unwrap();

        let outcome = run(
            &store,
            args(json!({
                "documents": [
                    { "path": "/notes/a.md", "content": "one" },
                    { "path": "/notes/b.md", "content": "two" },
                    { "path": "/notes/c.md", "content": "three" }
                ]
            })),
        );

        assert!(outcome.is_error);
        let body = Value::Object(outcome.body);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["saved"], json!(2));
        assert_eq!(body["failed"], json!(1));
        assert_eq!(body["results"][0]["success"], json!(true));
        assert!(body["results"][1]["error"]
            .as_str()
            .unwrap()
            .contains("already exists"));
        assert_eq!(body["results"][2]["success"], json!(true));
        let kept = store.get_file_by_path("/notes/b.md").unwrap().unwrap();
        assert_eq!(kept.content, b"old");
    }

    #[test]
    fn panic_in_one_document_does_not_abort_the_batch() {
        let store = TrippingStorage {
            inner: EphemeralStorage::new(),
            trip: "boom.md",
        };
        let outcome = run(
            &store,
            args(json!({
                "documents": [
                    { "path": "/p/a.md", "content": "a" },
                    { "path": "/p/boom.md", "content": "b" },
                    { "path": "/p/c.md", "content": "c" }
                ]
            })),
        );
        let body = Value::Object(outcome.body);
        assert_eq!(body["saved"], json!(2));
        assert_eq!(body["failed"], json!(1));
        assert_eq!(body["results"][1]["success"], json!(false));
        assert!(body["results"][1]["error"]
            .as_str()
            .unwrap()
            .contains("upload of boom.md blew up"));
        assert_eq!(body["results"][2]["success"], json!(true));
        assert!(store.get_file_by_path("/p/c.md").unwrap().is_some());
    }

    #[test]
    fn overwrite_keeps_the_file_id() {
        let store = EphemeralStorage::new();
        let first = run(
            &store,
            args(json!({ "documents": [{ "path": "/a.txt", "content": "1" }] })),
        );
        let second = run(
            &store,
            args(json!({ "documents": [{ "path": "a.txt", "content": "22", "overwrite": true }] })),
        );
        let first = Value::Object(first.body);
        let second = Value::Object(second.body);
        assert_eq!(first["results"][0]["fileId"], second["results"][0]["fileId"]);
        assert_eq!(second["results"][0]["overwritten"], json!(true));
        assert_eq!(second["results"][0]["size"], json!(2));
        assert_eq!(second["results"][0]["path"], json!("/a.txt"));
    }

    #[test]
    fn base64_content_is_decoded() {
        let store = EphemeralStorage::new();
        let outcome = run(
            &store,
            args(json!({
                "documents": [{ "path": "/bin/x.dat", "content": "AAEC", "encoding": "base64" }]
            })),
        );
        assert!(!outcome.is_error);
        let file = store.get_file_by_path("/bin/x.dat").unwrap().unwrap();
        assert_eq!(file.content, vec![0u8, 1, 2]);
    }

    #[test]
    fn missing_folder_without_create_fails() {
        let store = EphemeralStorage::new();
        let outcome = run(
            &store,
            args(json!({
                "createFolders": false,
                "documents": [{ "path": "/nowhere/x.md", "content": "x" }]
            })),
        );
        let body = Value::Object(outcome.body);
        assert_eq!(
            body["results"][0]["error"],
            json!("Folder not found: /nowhere")
        );
        assert_eq!(store.resolve_path("/nowhere").unwrap(), None);
    }
}
