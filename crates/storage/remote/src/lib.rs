//! Remote storage backed by a Box-style v2 content API.
//!
//! Every primitive becomes one or more HTTPS calls made with a blocking
//! client, so callers on an async runtime must go through `spawn_blocking`.
//! Throttling (429), server errors and connect/timeout failures are retried
//! under a [`RetryPolicy`]; anything else maps straight onto the core error
//! kinds.

mod retry;
mod wire;

use std::time::Duration;

use mcp_cloudfs_core::{
    path::validate_name, Analysis, Citation, Collaboration, CollaboratorChange, CollaboratorGrant,
    CollaboratorOutcome, CollaboratorStatus, CoreError, FileInfo, FileRef, Folder, ItemId,
    ItemKind, ItemRef, ListEntry, SearchParams, SearchResults, SearchScope, SearchSort,
    SharedLink, SharedLinkSettings, SortDirection, Storage, ROOT_FOLDER_ID,
};
use reqwest::{
    blocking::{multipart, Client, RequestBuilder, Response},
    StatusCode,
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use retry::RetryPolicy;
use wire::{
    collection_segment, shared_link_body, ApiError, AskResponse, Page, RemoteCollaboration,
    RemoteItem, FILE_FIELDS, FOLDER_FIELDS, ITEM_FIELDS, SEARCH_FIELDS,
};

pub const DEFAULT_BASE_URL: &str = "https://api.box.com/2.0";
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.box.com/api/2.0";
const PAGE_LIMIT: usize = 1000;
const MAX_SEARCH_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("transport: {0}")]
    Transport(String),
    #[error("remote returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("decode: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("folder is not empty: {0}")]
    NotEmpty(String),
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Maps a non-success, non-retryable response onto an error kind.
pub(crate) fn classify(status: StatusCode, code: Option<String>, message: String) -> RemoteError {
    let not_empty = code.as_deref() == Some("folder_not_empty");
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT if not_empty => {
            RemoteError::NotEmpty(message)
        }
        StatusCode::CONFLICT => RemoteError::Conflict(message),
        _ => RemoteError::Status {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

#[derive(Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub upload_url: String,
    pub access_token: SecretString,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl RemoteConfig {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            upload_url: DEFAULT_UPLOAD_URL.into(),
            access_token,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct RemoteStorage {
    client: Client,
    base_url: String,
    upload_url: String,
    token: SecretString,
    retry: RetryPolicy,
}

impl RemoteStorage {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("cloudfs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!(base_url = %config.base_url, "remote storage configured");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            token: config.access_token,
            retry: config.retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn upload(&self, path: &str) -> String {
        format!("{}{}", self.upload_url, path)
    }

    /// Sends the request built by `build`, retrying transient failures.
    fn execute<F>(&self, op: &str, build: F) -> Result<Response, RemoteError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let sent = build(&self.client)
                .bearer_auth(self.token.expose_secret())
                .send();
            let (last, wait) = match sent {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if retry::is_retryable_status(resp.status()) => {
                    (format!("status {}", resp.status()), retry::retry_after(resp.headers()))
                }
                Ok(resp) => return Err(error_from(resp)),
                Err(err) if err.is_connect() || err.is_timeout() => (err.to_string(), None),
                Err(err) => return Err(err.into()),
            };
            attempt += 1;
            if attempt >= self.retry.max_attempts {
                warn!(op, attempts = attempt, reason = %last, "remote call failed; retries exhausted");
                return Err(RemoteError::RetriesExhausted {
                    attempts: attempt,
                    last,
                });
            }
            let delay = self.retry.delay(attempt - 1, wait, &mut rand::thread_rng());
            warn!(
                op,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %last,
                "retrying remote call"
            );
            std::thread::sleep(delay);
        }
    }

    fn fetch<T, F>(&self, op: &str, build: F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let resp = self.execute(op, build)?;
        resp.json::<T>()
            .map_err(|e| RemoteError::Decode(format!("{op}: {e}")))
    }

    /// Like `fetch`, with a 404 turned into `None`.
    fn fetch_optional<T, F>(&self, op: &str, build: F) -> Result<Option<T>, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        match self.fetch(op, build) {
            Ok(value) => Ok(Some(value)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn fetch_folder(&self, id: &str) -> Result<RemoteItem, RemoteError> {
        self.fetch("get_folder", |c| {
            c.get(self.url(&format!("/folders/{id}")))
                .query(&[("fields", FOLDER_FIELDS)])
        })
    }

    fn update_folder(&self, op: &str, id: &str, body: Value) -> Result<Folder, RemoteError> {
        let item: RemoteItem = self.fetch(op, |c| {
            c.put(self.url(&format!("/folders/{id}")))
                .query(&[("fields", FOLDER_FIELDS)])
                .json(&body)
        })?;
        Ok(item.into_folder())
    }

    fn collaborations(&self, item: &ItemRef) -> Result<Vec<RemoteCollaboration>, RemoteError> {
        let page: Page<RemoteCollaboration> = self.fetch("list_collaborators", |c| {
            c.get(self.url(&format!(
                "/{}/{}/collaborations",
                collection_segment(item.kind),
                item.id
            )))
            .query(&[("limit", PAGE_LIMIT.to_string())])
        })?;
        Ok(page.entries)
    }

    fn set_role(&self, collaboration_id: &str, role: &str) -> Result<(), RemoteError> {
        self.execute("update_collaboration", |c| {
            c.put(self.url(&format!("/collaborations/{collaboration_id}")))
                .json(&json!({ "role": role }))
        })?;
        Ok(())
    }

    fn put_shared_link(&self, item: &ItemRef, body: &Value) -> Result<RemoteItem, RemoteError> {
        self.fetch("shared_link", |c| {
            c.put(self.url(&format!("/{}/{}", collection_segment(item.kind), item.id)))
                .query(&[("fields", "shared_link")])
                .json(body)
        })
    }

    fn ancestor_ids(&self, paths: &[String]) -> Result<Vec<ItemId>, RemoteError> {
        let mut ids = Vec::new();
        for path in paths {
            match self.resolve_path(path)? {
                Some(id) => ids.push(id),
                None => debug!(path = %path, "search ancestor does not resolve; skipped"),
            }
        }
        Ok(ids)
    }
}

fn error_from(resp: Response) -> RemoteError {
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    let parsed: Option<ApiError> = serde_json::from_str(&body).ok();
    let (code, message) = match parsed {
        Some(err) => (err.code, err.message.unwrap_or_else(|| body.clone())),
        None => (None, body),
    };
    classify(status, code, message)
}

/// Query string of a `/search` call.
pub(crate) fn search_query(
    params: &SearchParams,
    query: &str,
    ancestor_ids: &[ItemId],
) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("query", query.to_string()),
        ("fields", SEARCH_FIELDS.to_string()),
        ("limit", params.limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
        ("offset", "0".to_string()),
    ];
    match params.scope {
        SearchScope::All => {}
        SearchScope::Files => pairs.push(("type", "file".into())),
        SearchScope::Folders => pairs.push(("type", "folder".into())),
    }
    if let Some(extensions) = params.extensions.as_ref().filter(|e| !e.is_empty()) {
        let joined: Vec<String> = extensions
            .iter()
            .map(|e| mcp_cloudfs_core::normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
        pairs.push(("file_extensions", joined.join(",")));
    }
    if !ancestor_ids.is_empty() {
        pairs.push(("ancestor_folder_ids", ancestor_ids.join(",")));
    }
    let content_types = if params.include_content {
        "name,description,file_content"
    } else {
        "name,description"
    };
    pairs.push(("content_types", content_types.into()));
    let trash = if params.include_trashed {
        "all_items"
    } else {
        "non_trashed_only"
    };
    pairs.push(("trash_content", trash.into()));
    if params.sort_by == SearchSort::ModifiedAt {
        pairs.push(("sort", "modified_at".into()));
        let direction = match params.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        pairs.push(("direction", direction.into()));
    }
    pairs
}

impl Storage for RemoteStorage {
    type Error = RemoteError;

    fn get_folder(&self, id: &str) -> Result<Option<Folder>, Self::Error> {
        let item: Option<RemoteItem> = self.fetch_optional("get_folder", |c| {
            c.get(self.url(&format!("/folders/{id}")))
                .query(&[("fields", FOLDER_FIELDS)])
        })?;
        Ok(item.map(RemoteItem::into_folder))
    }

    fn list_children(&self, folder_id: &str) -> Result<Vec<ListEntry>, Self::Error> {
        let mut entries = Vec::new();
        let mut offset = 0usize;
        loop {
            let page: Page<RemoteItem> = self.fetch("list_children", |c| {
                c.get(self.url(&format!("/folders/{folder_id}/items")))
                    .query(&[
                        ("fields", ITEM_FIELDS.to_string()),
                        ("limit", PAGE_LIMIT.to_string()),
                        ("offset", offset.to_string()),
                    ])
            })?;
            let fetched = page.entries.len();
            entries.extend(page.entries.into_iter().filter_map(RemoteItem::into_list_entry));
            offset += fetched;
            let total = page.total_count.unwrap_or(0) as usize;
            if fetched == 0 || offset >= total {
                break;
            }
        }
        debug!(folder_id, count = entries.len(), "listed folder");
        Ok(entries)
    }

    fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Folder, Self::Error> {
        validate_name(name).map_err(CoreError::from)?;
        let mut body = json!({ "name": name, "parent": { "id": parent_id } });
        if let Some(desc) = description {
            body["description"] = json!(desc);
        }
        let item: RemoteItem = self.fetch("create_folder", |c| {
            c.post(self.url("/folders"))
                .query(&[("fields", FOLDER_FIELDS)])
                .json(&body)
        })?;
        info!(folder_id = %item.id, parent_id, name, "folder created");
        Ok(item.into_folder())
    }

    fn move_folder(&self, folder_id: &str, new_parent_id: &str) -> Result<Folder, Self::Error> {
        if folder_id == ROOT_FOLDER_ID {
            return Err(CoreError::invalid("the root folder cannot be moved").into());
        }
        let target = self.fetch_folder(new_parent_id)?;
        let into_self = target.id == folder_id
            || target
                .path_collection
                .iter()
                .flat_map(|pc| pc.entries.iter())
                .any(|e| e.id == folder_id);
        if into_self {
            return Err(
                CoreError::invalid("cannot move a folder into itself or its descendants").into(),
            );
        }
        let folder = self.update_folder(
            "move_folder",
            folder_id,
            json!({ "parent": { "id": new_parent_id } }),
        )?;
        info!(folder_id, new_parent_id, path = %folder.path, "folder moved");
        Ok(folder)
    }

    fn rename_folder(&self, folder_id: &str, new_name: &str) -> Result<Folder, Self::Error> {
        if folder_id == ROOT_FOLDER_ID {
            return Err(CoreError::invalid("the root folder cannot be renamed").into());
        }
        validate_name(new_name).map_err(CoreError::from)?;
        let folder = self.update_folder("rename_folder", folder_id, json!({ "name": new_name }))?;
        info!(folder_id, path = %folder.path, "folder renamed");
        Ok(folder)
    }

    fn delete_folder(&self, folder_id: &str, recursive: bool) -> Result<(), Self::Error> {
        if folder_id == ROOT_FOLDER_ID {
            return Err(CoreError::invalid("the root folder cannot be deleted").into());
        }
        self.execute("delete_folder", |c| {
            c.delete(self.url(&format!("/folders/{folder_id}")))
                .query(&[("recursive", recursive.to_string())])
        })?;
        info!(folder_id, recursive, "folder deleted");
        Ok(())
    }

    fn upload_file(
        &self,
        parent_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<FileRef, Self::Error> {
        validate_name(name).map_err(CoreError::from)?;
        let clash = self
            .list_children(parent_id)?
            .into_iter()
            .find(|c| c.name == name);
        let page: Page<RemoteItem> = match clash {
            Some(entry) if entry.kind == ItemKind::Folder => {
                return Err(CoreError::conflict(format!(
                    "a folder named '{name}' already exists in {parent_id}"
                ))
                .into())
            }
            Some(existing) => self.fetch("upload_version", |c| {
                let form = multipart::Form::new()
                    .text("attributes", json!({ "name": name }).to_string())
                    .part(
                        "file",
                        multipart::Part::bytes(content.to_vec()).file_name(name.to_string()),
                    );
                c.post(self.upload(&format!("/files/{}/content", existing.id)))
                    .multipart(form)
            })?,
            None => self.fetch("upload_file", |c| {
                let form = multipart::Form::new()
                    .text(
                        "attributes",
                        json!({ "name": name, "parent": { "id": parent_id } }).to_string(),
                    )
                    .part(
                        "file",
                        multipart::Part::bytes(content.to_vec()).file_name(name.to_string()),
                    );
                c.post(self.upload("/files/content")).multipart(form)
            })?,
        };
        let file = page
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("upload returned no entries".into()))?;
        debug!(file_id = %file.id, parent_id, name, size = content.len(), "file uploaded");
        Ok(FileRef {
            id: file.id,
            size: content.len() as u64,
        })
    }

    fn get_file(&self, id: &str) -> Result<Option<FileInfo>, Self::Error> {
        let item: Option<RemoteItem> = self.fetch_optional("get_file", |c| {
            c.get(self.url(&format!("/files/{id}")))
                .query(&[("fields", FILE_FIELDS)])
        })?;
        Ok(item.map(RemoteItem::into_file))
    }

    fn get_file_content(&self, id: &str) -> Result<Vec<u8>, Self::Error> {
        let resp = self.execute("get_file_content", |c| {
            c.get(self.url(&format!("/files/{id}/content")))
        })?;
        Ok(resp.bytes()?.to_vec())
    }

    fn search(&self, params: &SearchParams) -> Result<SearchResults, Self::Error> {
        let Some(query) = params.query.as_deref().filter(|q| !q.trim().is_empty()) else {
            return Err(CoreError::invalid("the remote backend requires a search query").into());
        };
        let ancestors = match params.ancestor_paths.as_deref() {
            Some(paths) if !paths.is_empty() => {
                let ids = self.ancestor_ids(paths)?;
                if ids.is_empty() {
                    return Ok(SearchResults::default());
                }
                ids
            }
            _ => Vec::new(),
        };
        let pairs = search_query(params, query, &ancestors);
        let page: Page<RemoteItem> =
            self.fetch("search", |c| c.get(self.url("/search")).query(&pairs))?;
        let total_count = page.total_count.unwrap_or(page.entries.len() as u64);
        let entries = page
            .entries
            .into_iter()
            .filter_map(RemoteItem::into_search_entry)
            .take(params.limit)
            .collect();
        Ok(SearchResults {
            total_count,
            entries,
        })
    }

    fn create_shared_link(
        &self,
        item: &ItemRef,
        settings: &SharedLinkSettings,
    ) -> Result<SharedLink, Self::Error> {
        let updated = self.put_shared_link(item, &shared_link_body(settings))?;
        let link = updated
            .shared_link
            .ok_or_else(|| RemoteError::Decode("response carried no shared_link".into()))?;
        info!(item_type = %item.kind, item_id = %item.id, "shared link set");
        Ok(link.into())
    }

    fn remove_shared_link(&self, item: &ItemRef) -> Result<(), Self::Error> {
        self.put_shared_link(item, &json!({ "shared_link": null }))?;
        info!(item_type = %item.kind, item_id = %item.id, "shared link removed");
        Ok(())
    }

    fn add_collaborators(
        &self,
        item: &ItemRef,
        grants: &[CollaboratorGrant],
        notify: bool,
    ) -> Result<Vec<CollaboratorOutcome>, Self::Error> {
        CollaboratorGrant::check_all(grants)?;
        let mut existing = self.collaborations(item)?;
        let mut outcomes = Vec::with_capacity(grants.len());
        for grant in grants {
            let email = grant.email.trim();
            let status = match existing.iter().find(|c| c.matches(email)) {
                Some(current) => {
                    self.set_role(&current.id, &grant.role)?;
                    CollaboratorStatus::Updated
                }
                None => {
                    let created: RemoteCollaboration = self.fetch("add_collaborator", |c| {
                        c.post(self.url("/collaborations"))
                            .query(&[("notify", notify.to_string())])
                            .json(&json!({
                                "item": { "type": item.kind.as_str(), "id": item.id },
                                "accessible_by": { "type": "user", "login": email },
                                "role": grant.role,
                            }))
                    })?;
                    existing.push(created);
                    CollaboratorStatus::Added
                }
            };
            outcomes.push(CollaboratorOutcome {
                email: email.to_string(),
                role: Some(grant.role.clone()),
                status,
            });
        }
        Ok(outcomes)
    }

    fn update_collaborators(
        &self,
        item: &ItemRef,
        changes: &[CollaboratorChange],
    ) -> Result<Vec<CollaboratorOutcome>, Self::Error> {
        let existing = self.collaborations(item)?;
        let mut outcomes = Vec::with_capacity(changes.len());
        for change in changes {
            let email = change.email.trim();
            let current = existing.iter().find(|c| c.matches(email));
            let outcome = match (current, change.remove, change.role.as_deref()) {
                (Some(current), true, _) => {
                    self.execute("remove_collaboration", |c| {
                        c.delete(self.url(&format!("/collaborations/{}", current.id)))
                    })?;
                    CollaboratorOutcome {
                        email: email.to_string(),
                        role: Some(current.role.clone()),
                        status: CollaboratorStatus::Removed,
                    }
                }
                (Some(current), false, Some(role)) => {
                    self.set_role(&current.id, role)?;
                    CollaboratorOutcome {
                        email: email.to_string(),
                        role: Some(role.to_string()),
                        status: CollaboratorStatus::Updated,
                    }
                }
                _ => CollaboratorOutcome {
                    email: email.to_string(),
                    role: change.role.clone(),
                    status: CollaboratorStatus::Skipped,
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn list_collaborators(&self, item: &ItemRef) -> Result<Vec<Collaboration>, Self::Error> {
        Ok(self
            .collaborations(item)?
            .into_iter()
            .map(|c| c.into_collaboration(item.kind, &item.id))
            .collect())
    }

    fn analyze(&self, file_ids: &[ItemId], question: &str) -> Result<Analysis, Self::Error> {
        if file_ids.is_empty() {
            return Err(CoreError::invalid("analysis needs at least one file").into());
        }
        let mode = if file_ids.len() == 1 {
            "single_item_qa"
        } else {
            "multiple_item_qa"
        };
        let items: Vec<Value> = file_ids
            .iter()
            .map(|id| json!({ "type": "file", "id": id }))
            .collect();
        let body = json!({
            "mode": mode,
            "prompt": question,
            "items": items,
            "include_citations": true,
        });
        let answer: AskResponse =
            self.fetch("analyze", |c| c.post(self.url("/ai/ask")).json(&body))?;
        Ok(Analysis {
            answer: answer.answer,
            citations: answer.citations.into_iter().map(Citation::from).collect(),
        })
    }
}
