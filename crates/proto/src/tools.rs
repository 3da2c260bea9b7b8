//! Typed arguments for every tool. The JSON schemas advertised by
//! `tools/list` and used for validation are derived from these types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    2
}

fn default_search_limit() -> u32 {
    25
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    File,
    Folder,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveDocumentsArgs {
    /// Documents to write, processed in order.
    #[schemars(length(min = 1))]
    pub documents: Vec<SaveDocument>,
    /// Create missing parent folders.
    #[serde(default = "default_true")]
    pub create_folders: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveDocument {
    /// Absolute file path, e.g. `/reports/q3.md`.
    #[schemars(length(min = 1))]
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<ContentEncoding>,
    /// Replace an existing file at the same path.
    #[serde(default)]
    pub overwrite: bool,
    /// Description for a newly created parent folder.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveDocumentsArgs {
    #[schemars(length(min = 1))]
    pub documents: Vec<DocumentSelector>,
    #[serde(default)]
    pub encoding: Option<ContentEncoding>,
    /// Truncate each document's content to this many bytes.
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub max_bytes: Option<u64>,
}

/// Addresses a file by id or by path.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSelector {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadDocumentArgs {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// First line to return (1-based, inclusive).
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub start_line: Option<u32>,
    /// Last line to return (1-based, inclusive).
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub end_line: Option<u32>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FolderAction {
    Create,
    Move,
    Rename,
    Delete,
}

impl FolderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderAction::Create => "create",
            FolderAction::Move => "move",
            FolderAction::Rename => "rename",
            FolderAction::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManageFoldersArgs {
    #[schemars(length(min = 1))]
    pub operations: Vec<FolderOperation>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderOperation {
    pub action: FolderAction,
    /// Folder to create, or the source folder of move/rename/delete.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub destination_path: Option<String>,
    #[serde(default)]
    pub destination_folder_id: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TreeSortKey {
    #[default]
    Name,
    Size,
    Modified,
    Type,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExploreStorageArgs {
    /// Folder to start from. Defaults to the root.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default = "default_max_depth")]
    #[schemars(range(min = 1, max = 10))]
    pub max_depth: u32,
    #[serde(default = "default_true")]
    pub include_files: bool,
    #[serde(default)]
    pub include_sizes: bool,
    #[serde(default)]
    pub include_modified: bool,
    /// Glob filter on entry names: `*` and `?`, case-insensitive.
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub sort_by: TreeSortKey,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShareAction {
    CreateLink,
    UpdateLink,
    RemoveLink,
    AddCollaborators,
    UpdateCollaborators,
    ListCollaborators,
}

impl ShareAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareAction::CreateLink => "create_link",
            ShareAction::UpdateLink => "update_link",
            ShareAction::RemoveLink => "remove_link",
            ShareAction::AddCollaborators => "add_collaborators",
            ShareAction::UpdateCollaborators => "update_collaborators",
            ShareAction::ListCollaborators => "list_collaborators",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareContentArgs {
    #[schemars(length(min = 1))]
    pub operations: Vec<ShareOperation>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareOperation {
    pub action: ShareAction,
    pub item_type: ItemType,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Link access level, e.g. `open`, `company` or `collaborators`.
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub can_download: Option<bool>,
    /// RFC 3339 expiry of the link.
    #[serde(default)]
    pub unshared_at: Option<String>,
    #[serde(default)]
    pub collaborators: Option<Vec<CollaboratorArg>>,
    #[serde(default)]
    pub notify: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorArg {
    #[schemars(length(min = 1))]
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub remove: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    File,
    Folder,
    #[default]
    All,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchSortKey {
    #[default]
    Relevance,
    ModifiedAt,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchContentArgs {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: SearchType,
    /// File extensions without the dot, e.g. `["md", "txt"]`.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    /// Only return files below one of these folder paths.
    #[serde(default)]
    pub ancestor_paths: Option<Vec<String>>,
    #[serde(default)]
    pub include_content: bool,
    #[serde(default)]
    pub include_trashed: bool,
    #[serde(default = "default_search_limit")]
    #[schemars(range(min = 1, max = 200))]
    pub limit: u32,
    #[serde(default)]
    pub sort_by: SearchSortKey,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeContentArgs {
    #[schemars(length(min = 1))]
    pub question: String,
    #[serde(default)]
    pub file_ids: Option<Vec<String>>,
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}
