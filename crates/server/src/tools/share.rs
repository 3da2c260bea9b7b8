use chrono::{DateTime, Utc};
use mcp_cloudfs_core::{
    Collaboration, CollaboratorChange, CollaboratorGrant, CollaboratorOutcome, ItemKind, ItemRef,
    SharedLink, SharedLinkSettings, Storage,
};
use mcp_cloudfs_proto::{ItemType, ShareAction, ShareContentArgs, ShareOperation};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{isolate, locate_file, locate_folder, non_empty, BatchTally, ToolError, ToolResult};
use crate::envelope::ToolOutcome;

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CollaboratorList {
    Outcomes(Vec<CollaboratorOutcome>),
    Relations(Vec<Collaboration>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareOpResult {
    action: ShareAction,
    item_type: ItemType,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_id: Option<String>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    shared_link: Option<SharedLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collaborators: Option<CollaboratorList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ShareOpResult {
    fn new(op: &ShareOperation, item_id: Option<String>) -> Self {
        Self {
            action: op.action,
            item_type: op.item_type,
            item_id,
            success: true,
            shared_link: None,
            collaborators: None,
            removed: None,
            error: None,
        }
    }
}

pub(super) fn run<S: Storage>(storage: &S, args: ShareContentArgs) -> ToolOutcome {
    let results: Vec<ShareOpResult> = args
        .operations
        .iter()
        .map(|op| {
            isolate(|| apply(storage, op)).unwrap_or_else(|err| ShareOpResult {
                success: false,
                error: Some(err.into_message()),
                ..ShareOpResult::new(op, op.item_id.clone())
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

fn apply<S: Storage>(storage: &S, op: &ShareOperation) -> ToolResult<ShareOpResult> {
    let item = locate_item(storage, op)?;
    let mut result = ShareOpResult::new(op, Some(item.id.clone()));
    match op.action {
        ShareAction::CreateLink => {
            result.shared_link = Some(storage.create_shared_link(&item, &link_settings(op)?)?);
        }
        ShareAction::UpdateLink => {
            result.shared_link = Some(storage.update_shared_link(&item, &link_settings(op)?)?);
        }
        ShareAction::RemoveLink => {
            storage.remove_shared_link(&item)?;
            result.removed = Some(true);
        }
        ShareAction::AddCollaborators => {
            let grants = op
                .collaborators
                .iter()
                .flatten()
                .map(|c| {
                    if c.email.trim().is_empty() {
                        return Err(ToolError::new("collaborator email must not be empty"));
                    }
                    let role = non_empty(c.role.as_deref()).ok_or_else(|| {
                        ToolError::new(format!("collaborator {} needs a role", c.email))
                    })?;
                    Ok(CollaboratorGrant {
                        email: c.email.clone(),
                        role: role.to_string(),
                    })
                })
                .collect::<ToolResult<Vec<_>>>()?;
            if grants.is_empty() {
                return Err(ToolError::new("add_collaborators requires collaborators"));
            }
            let outcomes = storage.add_collaborators(&item, &grants, op.notify)?;
            result.collaborators = Some(CollaboratorList::Outcomes(outcomes));
        }
        ShareAction::UpdateCollaborators => {
            let changes: Vec<CollaboratorChange> = op
                .collaborators
                .iter()
                .flatten()
                .map(|c| CollaboratorChange {
                    email: c.email.clone(),
                    role: non_empty(c.role.as_deref()).map(str::to_string),
                    remove: c.remove,
                })
                .collect();
            if changes.is_empty() {
                return Err(ToolError::new("update_collaborators requires collaborators"));
            }
            let outcomes = storage.update_collaborators(&item, &changes)?;
            result.collaborators = Some(CollaboratorList::Outcomes(outcomes));
        }
        ShareAction::ListCollaborators => {
            let relations = storage.list_collaborators(&item)?;
            result.collaborators = Some(CollaboratorList::Relations(relations));
        }
    }
    info!(
        action = op.action.as_str(),
        item_type = %item.kind,
        item_id = %item.id,
        "share operation applied"
    );
    Ok(result)
}

fn locate_item<S: Storage>(storage: &S, op: &ShareOperation) -> ToolResult<ItemRef> {
    if non_empty(op.item_id.as_deref()).is_none() && non_empty(op.path.as_deref()).is_none() {
        return Err(ToolError::new("Provide either itemId or path"));
    }
    Ok(match op.item_type {
        ItemType::File => {
            let file = locate_file(storage, op.item_id.as_deref(), op.path.as_deref())?;
            ItemRef {
                kind: ItemKind::File,
                id: file.id,
            }
        }
        ItemType::Folder => {
            let folder = locate_folder(storage, op.item_id.as_deref(), op.path.as_deref())?;
            ItemRef {
                kind: ItemKind::Folder,
                id: folder.id,
            }
        }
    })
}

fn link_settings(op: &ShareOperation) -> ToolResult<SharedLinkSettings> {
    let unshared_at = match non_empty(op.unshared_at.as_deref()) {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| ToolError::new(format!("unsharedAt is not RFC 3339: {e}")))?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    Ok(SharedLinkSettings {
        access: non_empty(op.access.as_deref()).map(str::to_string),
        password: op.password.clone(),
        can_download: op.can_download,
        unshared_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::store_with_files;
    use serde_json::{json, Value};

    fn share(store: &impl Storage, ops: Value) -> Value {
        let args: ShareContentArgs =
            serde_json::from_value(json!({ "operations": ops })).unwrap();
        Value::Object(run(store, args).body)
    }

    #[test]
    fn blank_collaborator_email_rejects_the_whole_grant_list() {
        let store = store_with_files(&[("/team/notes.md", "x")]);
        let body = share(
            &store,
            json!([
                {
                    "action": "add_collaborators",
                    "itemType": "folder",
                    "path": "/team",
                    "collaborators": [
                        { "email": "a@example.com", "role": "editor" },
                        { "email": "   ", "role": "viewer" }
                    ]
                },
                { "action": "list_collaborators", "itemType": "folder", "path": "/team" }
            ]),
        );
        assert_eq!(body["results"][0]["success"], json!(false));
        assert_eq!(
            body["results"][0]["error"],
            json!("collaborator email must not be empty")
        );
        assert_eq!(body["results"][1]["collaborators"], json!([]));
    }

    #[test]
    fn link_lifecycle_by_path() {
        let store = store_with_files(&[("/pub/report.pdf", "x")]);
        let body = share(
            &store,
            json!([
                {
                    "action": "create_link",
                    "itemType": "file",
                    "path": "/pub/report.pdf",
                    "access": "open",
                    "unsharedAt": "2030-01-01T00:00:00Z"
                },
                { "action": "remove_link", "itemType": "file", "path": "/pub/report.pdf" }
            ]),
        );
        assert_eq!(body["success"], json!(true));
        let link = &body["results"][0]["sharedLink"];
        assert!(link["url"].as_str().unwrap().starts_with("https://"));
        assert_eq!(link["access"], json!("open"));
        assert_eq!(link["unsharedAt"], json!("2030-01-01T00:00:00Z"));
        assert_eq!(body["results"][1]["removed"], json!(true));
    }

    #[test]
    fn collaborators_round_trip_on_a_folder() {
        let store = store_with_files(&[("/team/a.md", "x")]);
        let body = share(
            &store,
            json!([
                {
                    "action": "add_collaborators",
                    "itemType": "folder",
                    "path": "/team",
                    "collaborators": [{ "email": "ann@example.com", "role": "editor" }]
                },
                {
                    "action": "update_collaborators",
                    "itemType": "folder",
                    "path": "/team",
                    "collaborators": [
                        { "email": "ann@example.com", "role": "viewer" },
                        { "email": "bob@example.com", "role": "viewer" }
                    ]
                },
                { "action": "list_collaborators", "itemType": "folder", "path": "/team" }
            ]),
        );
        assert_eq!(body["completed"], json!(3));
        assert_eq!(body["results"][0]["collaborators"][0]["status"], json!("added"));
        assert_eq!(body["results"][1]["collaborators"][0]["status"], json!("updated"));
        assert_eq!(body["results"][1]["collaborators"][1]["status"], json!("skipped"));
        let listed = body["results"][2]["collaborators"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["role"], json!("viewer"));
    }

    #[test]
    fn bad_operations_fail_individually() {
        let store = store_with_files(&[("/f.txt", "x")]);
        let body = share(
            &store,
            json!([
                { "action": "create_link", "itemType": "folder", "path": "/f.txt" },
                {
                    "action": "add_collaborators",
                    "itemType": "file",
                    "path": "/f.txt",
                    "collaborators": [{ "email": "x@example.com" }]
                },
                {
                    "action": "create_link",
                    "itemType": "file",
                    "path": "/f.txt",
                    "unsharedAt": "tomorrow"
                },
                { "action": "create_link", "itemType": "file", "path": "/f.txt" }
            ]),
        );
        assert_eq!(body["failed"], json!(3));
        assert_eq!(body["completed"], json!(1));
        assert_eq!(body["results"][0]["error"], json!("Folder not found: /f.txt"));
        assert_eq!(
            body["results"][1]["error"],
            json!("collaborator x@example.com needs a role")
        );
        assert!(body["results"][2]["error"]
            .as_str()
            .unwrap()
            .starts_with("unsharedAt is not RFC 3339"));
    }
}
