//! Wire shapes of the remote content API and their mapping onto the core
//! model.

use chrono::{DateTime, Utc};
use mcp_cloudfs_core::{
    Citation, Collaboration, FileInfo, Folder, ItemKind, ListEntry, SearchEntry, SharedLink,
    SharedLinkSettings, ROOT_FOLDER_ID, ROOT_PATH,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub(crate) const FOLDER_FIELDS: &str =
    "id,type,name,description,modified_at,parent,path_collection,shared_link";
pub(crate) const FILE_FIELDS: &str =
    "id,type,name,size,sha1,modified_at,parent,path_collection,shared_link";
pub(crate) const ITEM_FIELDS: &str = "id,type,name,size,modified_at";
pub(crate) const SEARCH_FIELDS: &str = "id,type,name,size,modified_at,parent,path_collection";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MiniItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct PathCollection {
    #[serde(default)]
    pub entries: Vec<MiniItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Permissions {
    #[serde(default)]
    pub can_download: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteSharedLink {
    pub url: String,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub unshared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub is_password_enabled: bool,
}

impl From<RemoteSharedLink> for SharedLink {
    fn from(link: RemoteSharedLink) -> Self {
        SharedLink {
            url: link.url,
            access: link.access,
            unshared_at: link.unshared_at,
            can_download: link.permissions.and_then(|p| p.can_download),
            password_protected: link.is_password_enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent: Option<MiniItem>,
    #[serde(default)]
    pub path_collection: Option<PathCollection>,
    #[serde(default)]
    pub shared_link: Option<RemoteSharedLink>,
}

impl RemoteItem {
    pub fn item_kind(&self) -> Option<ItemKind> {
        match self.kind.as_str() {
            "folder" => Some(ItemKind::Folder),
            "file" => Some(ItemKind::File),
            _ => None,
        }
    }

    /// Slash path rebuilt from the ancestor chain. The API reports the root
    /// as a named folder ("All Files"); it is always `/` here.
    pub fn derived_path(&self) -> String {
        if self.id == ROOT_FOLDER_ID {
            return ROOT_PATH.to_string();
        }
        let mut segments: Vec<&str> = self
            .path_collection
            .iter()
            .flat_map(|pc| pc.entries.iter())
            .filter(|e| e.id != ROOT_FOLDER_ID)
            .filter_map(|e| e.name.as_deref())
            .collect();
        segments.push(&self.name);
        format!("/{}", segments.join("/"))
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified_at.unwrap_or_else(Utc::now)
    }

    pub fn into_folder(self) -> Folder {
        let is_root = self.id == ROOT_FOLDER_ID;
        let path = self.derived_path();
        let modified_at = self.modified();
        Folder {
            parent_id: if is_root {
                None
            } else {
                Some(
                    self.parent
                        .as_ref()
                        .map(|p| p.id.clone())
                        .unwrap_or_else(|| ROOT_FOLDER_ID.to_string()),
                )
            },
            name: if is_root { String::new() } else { self.name },
            id: self.id,
            path,
            description: self.description.filter(|d| !d.trim().is_empty()),
            modified_at,
            shared_link: self.shared_link.map(SharedLink::from),
        }
    }

    pub fn into_file(self) -> FileInfo {
        let path = self.derived_path();
        let modified_at = self.modified();
        FileInfo {
            parent_id: self
                .parent
                .as_ref()
                .map(|p| p.id.clone())
                .unwrap_or_else(|| ROOT_FOLDER_ID.to_string()),
            size: self.size.unwrap_or(0),
            checksum: self.sha1,
            shared_link: self.shared_link.map(SharedLink::from),
            id: self.id,
            name: self.name,
            path,
            modified_at,
        }
    }

    pub fn into_list_entry(self) -> Option<ListEntry> {
        let kind = self.item_kind()?;
        Some(ListEntry {
            modified_at: self.modified(),
            size: if kind == ItemKind::File { self.size } else { None },
            id: self.id,
            name: self.name,
            kind,
        })
    }

    pub fn into_search_entry(self) -> Option<SearchEntry> {
        let kind = self.item_kind()?;
        Some(SearchEntry {
            path: self.derived_path(),
            modified_at: self.modified(),
            parent_id: self.parent.as_ref().map(|p| p.id.clone()),
            size: if kind == ItemKind::File { self.size } else { None },
            id: self.id,
            name: self.name,
            kind,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default = "Vec::new")]
    pub entries: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Login {
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteCollaboration {
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub accessible_by: Option<Login>,
}

impl RemoteCollaboration {
    pub fn login(&self) -> Option<&str> {
        self.accessible_by.as_ref()?.login.as_deref()
    }

    pub fn matches(&self, email: &str) -> bool {
        self.login()
            .map(|login| login.eq_ignore_ascii_case(email.trim()))
            .unwrap_or(false)
    }

    pub fn into_collaboration(self, item_type: ItemKind, item_id: &str) -> Collaboration {
        Collaboration {
            item_type,
            item_id: item_id.to_string(),
            email: self.login().unwrap_or_default().to_string(),
            role: self.role,
            id: Some(self.id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AskCitation {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl From<AskCitation> for Citation {
    fn from(c: AskCitation) -> Self {
        Citation {
            file_name: c.name.unwrap_or_default(),
            excerpt: c.content.unwrap_or_default(),
            file_id: c.id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AskResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<AskCitation>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request body for creating or updating a shared link.
pub(crate) fn shared_link_body(settings: &SharedLinkSettings) -> Value {
    let mut link = Map::new();
    if let Some(access) = &settings.access {
        link.insert("access".into(), json!(access));
    }
    if let Some(password) = &settings.password {
        link.insert("password".into(), json!(password));
    }
    if let Some(at) = settings.unshared_at {
        link.insert("unshared_at".into(), json!(at.to_rfc3339()));
    }
    if let Some(can_download) = settings.can_download {
        link.insert(
            "permissions".into(),
            json!({ "can_download": can_download }),
        );
    }
    json!({ "shared_link": Value::Object(link) })
}

pub(crate) fn collection_segment(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::File => "files",
        ItemKind::Folder => "folders",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(value: Value) -> RemoteItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn nested_folder_path_skips_the_root_entry() {
        let folder = item(json!({
            "type": "folder",
            "id": "42",
            "name": "Q3",
            "description": "",
            "modified_at": "2024-05-01T10:00:00-07:00",
            "parent": { "type": "folder", "id": "7", "name": "reports" },
            "path_collection": { "total_count": 2, "entries": [
                { "type": "folder", "id": "0", "name": "All Files" },
                { "type": "folder", "id": "7", "name": "reports" }
            ]}
        }))
        .into_folder();
        assert_eq!(folder.path, "/reports/Q3");
        assert_eq!(folder.parent_id.as_deref(), Some("7"));
        assert!(folder.description.is_none());
        assert_eq!(
            folder.modified_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn root_maps_to_slash_without_parent() {
        let root = item(json!({ "type": "folder", "id": "0", "name": "All Files" })).into_folder();
        assert!(root.is_root());
        assert_eq!(root.path, "/");
        assert_eq!(root.name, "");
    }

    #[test]
    fn file_carries_checksum_and_link() {
        let file = item(json!({
            "type": "file",
            "id": "9",
            "name": "a.txt",
            "size": 12,
            "sha1": "abc",
            "parent": { "type": "folder", "id": "0" },
            "path_collection": { "entries": [{ "type": "folder", "id": "0", "name": "All Files" }] },
            "shared_link": {
                "url": "https://app.example.com/s/x",
                "access": "open",
                "is_password_enabled": true,
                "permissions": { "can_download": false }
            }
        }))
        .into_file();
        assert_eq!(file.path, "/a.txt");
        assert_eq!(file.checksum.as_deref(), Some("abc"));
        let link = file.shared_link.unwrap();
        assert!(link.password_protected);
        assert_eq!(link.can_download, Some(false));
    }

    #[test]
    fn web_links_are_not_listed() {
        let link = item(json!({ "type": "web_link", "id": "3", "name": "site" }));
        assert!(link.into_list_entry().is_none());
    }

    #[test]
    fn shared_link_body_only_sends_given_settings() {
        let body = shared_link_body(&SharedLinkSettings {
            access: Some("company".into()),
            can_download: Some(true),
            ..SharedLinkSettings::default()
        });
        assert_eq!(
            body,
            json!({ "shared_link": { "access": "company", "permissions": { "can_download": true } } })
        );
    }

    #[test]
    fn collaboration_matches_case_insensitively() {
        let collab: RemoteCollaboration = serde_json::from_value(json!({
            "id": "c1",
            "role": "editor",
            "accessible_by": { "type": "user", "login": "Ann@Example.com" }
        }))
        .unwrap();
        assert!(collab.matches("ann@example.com "));
        let relation = collab.into_collaboration(ItemKind::Folder, "7");
        assert_eq!(relation.email, "Ann@Example.com");
        assert_eq!(relation.id.as_deref(), Some("c1"));
    }
}
