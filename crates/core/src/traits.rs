use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::CoreError,
    model::{
        Analysis, Collaboration, FileContent, FileInfo, FileRef, Folder, ItemId, ItemKind,
        ItemRef, ListEntry, SearchEntry, SharedLink, TreeNode, ROOT_FOLDER_ID,
    },
    path::{split_file_path, split_path, validate_name},
    tree,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TreeSort {
    #[default]
    Name,
    Size,
    Modified,
    Type,
}

#[derive(Clone, Debug, Default)]
pub struct TreeOptions {
    pub include_files: bool,
    pub include_sizes: bool,
    pub include_modified: bool,
    pub name_pattern: Option<String>,
    pub sort_by: TreeSort,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    Files,
    Folders,
}

impl SearchScope {
    pub fn permits(&self, kind: ItemKind) -> bool {
        match self {
            SearchScope::All => true,
            SearchScope::Files => kind == ItemKind::File,
            SearchScope::Folders => kind == ItemKind::Folder,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    #[default]
    Relevance,
    ModifiedAt,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub scope: SearchScope,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub ancestor_paths: Option<Vec<String>>,
    #[serde(default)]
    pub include_content: bool,
    #[serde(default)]
    pub include_trashed: bool,
    pub limit: usize,
    #[serde(default)]
    pub sort_by: SearchSort,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: None,
            scope: SearchScope::All,
            extensions: None,
            ancestor_paths: None,
            include_content: false,
            include_trashed: false,
            limit: 25,
            sort_by: SearchSort::Relevance,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SearchResults {
    /// Match count before truncation to `limit`.
    pub total_count: u64,
    pub entries: Vec<SearchEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct SharedLinkSettings {
    pub access: Option<String>,
    pub password: Option<String>,
    pub can_download: Option<bool>,
    pub unshared_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct CollaboratorGrant {
    pub email: String,
    pub role: String,
}

impl CollaboratorGrant {
    /// Checks a whole grant list before any of it is applied.
    pub fn check_all(grants: &[CollaboratorGrant]) -> Result<(), CoreError> {
        for grant in grants {
            if grant.email.trim().is_empty() {
                return Err(CoreError::invalid("collaborator email must not be empty"));
            }
            if grant.role.trim().is_empty() {
                return Err(CoreError::invalid(format!(
                    "collaborator {} needs a role",
                    grant.email.trim()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct CollaboratorChange {
    pub email: String,
    pub role: Option<String>,
    pub remove: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorStatus {
    Added,
    Updated,
    Removed,
    Skipped,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CollaboratorOutcome {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub status: CollaboratorStatus,
}

/// Hierarchical content store plus its sharing ledger.
///
/// Implementations are synchronous; async callers run them on
/// `spawn_blocking`. Required methods are backend primitives. The path-level
/// operations are provided on top of them and may be overridden when a
/// backend can do better (for example, atomically under one lock).
pub trait Storage {
    type Error: std::error::Error + From<CoreError> + Send + Sync + 'static;

    fn get_folder(&self, id: &str) -> Result<Option<Folder>, Self::Error>;

    /// Folders and files together in a stable enumeration order.
    fn list_children(&self, folder_id: &str) -> Result<Vec<ListEntry>, Self::Error>;

    fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Folder, Self::Error>;

    /// Reparents a folder; every descendant path is re-derived.
    fn move_folder(&self, folder_id: &str, new_parent_id: &str) -> Result<Folder, Self::Error>;

    fn rename_folder(&self, folder_id: &str, new_name: &str) -> Result<Folder, Self::Error>;

    fn delete_folder(&self, folder_id: &str, recursive: bool) -> Result<(), Self::Error>;

    /// Upsert keyed by `(parent_id, name)`: an existing file keeps its id.
    fn upload_file(
        &self,
        parent_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<FileRef, Self::Error>;

    fn get_file(&self, id: &str) -> Result<Option<FileInfo>, Self::Error>;

    fn get_file_content(&self, id: &str) -> Result<Vec<u8>, Self::Error>;

    fn search(&self, params: &SearchParams) -> Result<SearchResults, Self::Error>;

    /// Attaches a link to the item, replacing any existing one.
    fn create_shared_link(
        &self,
        item: &ItemRef,
        settings: &SharedLinkSettings,
    ) -> Result<SharedLink, Self::Error>;

    fn update_shared_link(
        &self,
        item: &ItemRef,
        settings: &SharedLinkSettings,
    ) -> Result<SharedLink, Self::Error> {
        self.create_shared_link(item, settings)
    }

    /// Removing an absent link is not an error.
    fn remove_shared_link(&self, item: &ItemRef) -> Result<(), Self::Error>;

    fn add_collaborators(
        &self,
        item: &ItemRef,
        grants: &[CollaboratorGrant],
        notify: bool,
    ) -> Result<Vec<CollaboratorOutcome>, Self::Error>;

    /// Entries without a matching relation are reported as skipped.
    fn update_collaborators(
        &self,
        item: &ItemRef,
        changes: &[CollaboratorChange],
    ) -> Result<Vec<CollaboratorOutcome>, Self::Error>;

    fn list_collaborators(&self, item: &ItemRef) -> Result<Vec<Collaboration>, Self::Error>;

    /// Answers a question over the given files. Opaque to the server.
    fn analyze(&self, file_ids: &[ItemId], question: &str) -> Result<Analysis, Self::Error>;

    /// Walks from the root matching each segment against child folders.
    fn resolve_path(&self, path: &str) -> Result<Option<ItemId>, Self::Error> {
        let segments = split_path(path).map_err(CoreError::from)?;
        let mut current = ROOT_FOLDER_ID.to_string();
        for segment in segments {
            let children = self.list_children(&current)?;
            match children
                .into_iter()
                .find(|c| c.kind == ItemKind::Folder && c.name == segment)
            {
                Some(child) => current = child.id,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Like `resolve_path`, creating missing segments. The description is
    /// only attached to a newly created terminal folder.
    fn ensure_folder_path(
        &self,
        path: &str,
        description: Option<&str>,
    ) -> Result<ItemId, Self::Error> {
        let segments = split_path(path).map_err(CoreError::from)?;
        let last = segments.len().saturating_sub(1);
        let mut current = ROOT_FOLDER_ID.to_string();
        for (idx, segment) in segments.into_iter().enumerate() {
            let children = self.list_children(&current)?;
            match children.into_iter().find(|c| c.name == segment) {
                Some(child) if child.kind == ItemKind::Folder => current = child.id,
                Some(_) => {
                    return Err(CoreError::conflict(format!(
                        "a file named '{segment}' already exists where a folder is expected"
                    ))
                    .into())
                }
                None => {
                    let desc = if idx == last { description } else { None };
                    current = self.create_folder(&current, segment, desc)?.id;
                }
            }
        }
        Ok(current)
    }

    fn check_file_exists(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<FileRef>, Self::Error> {
        validate_name(name).map_err(CoreError::from)?;
        let children = self.list_children(parent_id)?;
        Ok(children
            .into_iter()
            .find(|c| c.kind == ItemKind::File && c.name == name)
            .map(|c| FileRef {
                id: c.id,
                size: c.size.unwrap_or(0),
            }))
    }

    fn get_file_by_path(&self, path: &str) -> Result<Option<FileContent>, Self::Error> {
        let (folder_path, name) = split_file_path(path).map_err(CoreError::from)?;
        let Some(parent) = self.resolve_path(&folder_path)? else {
            return Ok(None);
        };
        let Some(found) = self.check_file_exists(&parent, &name)? else {
            return Ok(None);
        };
        let content = self.get_file_content(&found.id)?;
        Ok(Some(FileContent {
            id: found.id,
            name,
            size: content.len() as u64,
            content,
        }))
    }

    /// Resolves a path to whichever item, file or folder, it names.
    fn resolve_item(&self, path: &str) -> Result<Option<ItemRef>, Self::Error> {
        let segments = split_path(path).map_err(CoreError::from)?;
        if segments.is_empty() {
            return Ok(Some(ItemRef::folder(ROOT_FOLDER_ID)));
        }
        let (folder_path, name) = split_file_path(path).map_err(CoreError::from)?;
        let Some(parent) = self.resolve_path(&folder_path)? else {
            return Ok(None);
        };
        Ok(self
            .list_children(&parent)?
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| ItemRef {
                kind: c.kind,
                id: c.id,
            }))
    }

    fn build_tree(
        &self,
        start_id: &str,
        start_path: &str,
        max_depth: u32,
        options: &TreeOptions,
    ) -> Result<TreeNode, Self::Error>
    where
        Self: Sized,
    {
        tree::build_tree(self, start_id, start_path, max_depth, options)
    }
}
