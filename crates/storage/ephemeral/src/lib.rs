//! In-memory reference storage.
//!
//! Folders and files live in an arena keyed by id; each record stores its
//! parent id and a per-parent child index keeps enumeration order stable.
//! Every operation runs under one `RwLock`, so move/rename path propagation
//! is never observed half-applied.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mcp_cloudfs_core::{
    file_extension, is_within, join_path, normalize_extension,
    path::{split_path, validate_name},
    validate::contains_ignore_case,
    Analysis, Citation, Collaboration, CollaboratorChange, CollaboratorGrant, CollaboratorOutcome,
    CollaboratorStatus, CoreError, FileInfo, FileRef, Folder, ItemId, ItemKind, ItemRef,
    ListEntry, SearchEntry, SearchParams, SearchResults, SearchSort, SharedLink,
    SharedLinkSettings, SortDirection, Storage, ROOT_FOLDER_ID, ROOT_PATH,
};
use parking_lot::RwLock;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use tracing::debug;

const SHARE_BASE_URL: &str = "https://cloudfs.local/s";
const MAX_CITATIONS: usize = 3;
const EXCERPT_CHARS: usize = 240;
const STOPWORDS: [&str; 16] = [
    "the", "and", "for", "are", "was", "what", "when", "where", "which", "who", "why", "how",
    "with", "this", "that", "does",
];

#[derive(Clone, Debug)]
struct FolderRecord {
    id: ItemId,
    parent_id: Option<ItemId>,
    name: String,
    path: String,
    description: Option<String>,
    modified_at: DateTime<Utc>,
    shared_link: Option<SharedLink>,
}

impl FolderRecord {
    fn to_folder(&self) -> Folder {
        Folder {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
            description: self.description.clone(),
            modified_at: self.modified_at,
            shared_link: self.shared_link.clone(),
        }
    }
}

#[derive(Clone, Debug)]
struct FileRecord {
    id: ItemId,
    parent_id: ItemId,
    name: String,
    content: Vec<u8>,
    checksum: String,
    modified_at: DateTime<Utc>,
    shared_link: Option<SharedLink>,
}

impl FileRecord {
    fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Debug)]
struct State {
    folders: HashMap<ItemId, FolderRecord>,
    files: HashMap<ItemId, FileRecord>,
    /// Children of each folder in creation order.
    children: HashMap<ItemId, Vec<ItemRef>>,
    /// Creation order of every folder and file, used for search encounter order.
    folder_order: Vec<ItemId>,
    file_order: Vec<ItemId>,
    collaborations: Vec<Collaboration>,
}

impl State {
    fn new() -> Self {
        let root = FolderRecord {
            id: ROOT_FOLDER_ID.to_string(),
            parent_id: None,
            name: String::new(),
            path: ROOT_PATH.to_string(),
            description: None,
            modified_at: Utc::now(),
            shared_link: None,
        };
        let mut folders = HashMap::new();
        folders.insert(root.id.clone(), root);
        let mut children = HashMap::new();
        children.insert(ROOT_FOLDER_ID.to_string(), Vec::new());
        Self {
            folders,
            files: HashMap::new(),
            children,
            folder_order: vec![ROOT_FOLDER_ID.to_string()],
            file_order: Vec::new(),
            collaborations: Vec::new(),
        }
    }

    fn folder(&self, id: &str) -> Result<&FolderRecord, CoreError> {
        self.folders
            .get(id)
            .ok_or_else(|| CoreError::not_found(format!("folder {id}")))
    }

    fn child_named(&self, parent_id: &str, name: &str) -> Option<ItemRef> {
        self.children.get(parent_id).and_then(|kids| {
            kids.iter()
                .find(|child| self.name_of(child) == Some(name))
                .cloned()
        })
    }

    fn name_of(&self, item: &ItemRef) -> Option<&str> {
        match item.kind {
            ItemKind::Folder => self.folders.get(&item.id).map(|f| f.name.as_str()),
            ItemKind::File => self.files.get(&item.id).map(|f| f.name.as_str()),
        }
    }

    fn file_path(&self, file: &FileRecord) -> String {
        let parent = self
            .folders
            .get(&file.parent_id)
            .map(|p| p.path.as_str())
            .unwrap_or(ROOT_PATH);
        join_path(parent, &file.name)
    }

    fn insert_folder(
        &mut self,
        parent_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<FolderRecord, CoreError> {
        validate_name(name)?;
        let parent_path = self.folder(parent_id)?.path.clone();
        if self.child_named(parent_id, name).is_some() {
            return Err(CoreError::conflict(format!(
                "an item named '{name}' already exists in {parent_path}"
            )));
        }
        let record = FolderRecord {
            id: new_id("d"),
            parent_id: Some(parent_id.to_string()),
            name: name.to_string(),
            path: join_path(&parent_path, name),
            description: description.map(str::to_string),
            modified_at: Utc::now(),
            shared_link: None,
        };
        self.children.insert(record.id.clone(), Vec::new());
        self.attach(parent_id, ItemRef::folder(record.id.clone()));
        self.folder_order.push(record.id.clone());
        self.folders.insert(record.id.clone(), record.clone());
        debug!(folder_id = %record.id, path = %record.path, "folder created");
        Ok(record)
    }

    fn attach(&mut self, parent_id: &str, item: ItemRef) {
        self.children
            .entry(parent_id.to_string())
            .or_default()
            .push(item);
    }

    fn detach(&mut self, parent_id: &str, item: &ItemRef) {
        if let Some(kids) = self.children.get_mut(parent_id) {
            kids.retain(|k| k != item);
        }
    }

    /// Re-derives the path of every folder below `folder_id` and touches
    /// every descendant file.
    fn propagate_paths(&mut self, folder_id: &str, now: DateTime<Utc>) {
        let Some(parent_path) = self.folders.get(folder_id).map(|f| f.path.clone()) else {
            return;
        };
        let kids = self.children.get(folder_id).cloned().unwrap_or_default();
        for child in kids {
            match child.kind {
                ItemKind::Folder => {
                    if let Some(record) = self.folders.get_mut(&child.id) {
                        record.path = join_path(&parent_path, &record.name);
                    }
                    self.propagate_paths(&child.id, now);
                }
                ItemKind::File => {
                    if let Some(record) = self.files.get_mut(&child.id) {
                        record.modified_at = now;
                    }
                }
            }
        }
    }

    fn is_descendant_or_self(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate.to_string());
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.folders.get(&id).and_then(|f| f.parent_id.clone());
        }
        false
    }

    /// Removes the subtree rooted at `folder_id`: folders depth-first, then
    /// files, then the folder itself.
    fn remove_subtree(&mut self, folder_id: &str) {
        let kids = self.children.remove(folder_id).unwrap_or_default();
        for child in kids.iter().filter(|c| c.kind == ItemKind::Folder) {
            self.remove_subtree(&child.id);
        }
        for child in kids.iter().filter(|c| c.kind == ItemKind::File) {
            self.files.remove(&child.id);
            self.file_order.retain(|id| id != &child.id);
            self.drop_collaborations(child);
        }
        self.folders.remove(folder_id);
        self.folder_order.retain(|id| id != folder_id);
        self.drop_collaborations(&ItemRef::folder(folder_id));
    }

    fn drop_collaborations(&mut self, item: &ItemRef) {
        self.collaborations
            .retain(|c| !(c.item_type == item.kind && c.item_id == item.id));
    }

    fn ensure_exists(&self, item: &ItemRef) -> Result<(), CoreError> {
        let exists = match item.kind {
            ItemKind::Folder => self.folders.contains_key(&item.id),
            ItemKind::File => self.files.contains_key(&item.id),
        };
        if exists {
            Ok(())
        } else {
            Err(CoreError::not_found(format!("{} {}", item.kind, item.id)))
        }
    }

    fn shared_link_slot(&mut self, item: &ItemRef) -> Result<&mut Option<SharedLink>, CoreError> {
        match item.kind {
            ItemKind::Folder => self
                .folders
                .get_mut(&item.id)
                .map(|f| &mut f.shared_link)
                .ok_or_else(|| CoreError::not_found(format!("folder {}", item.id))),
            ItemKind::File => self
                .files
                .get_mut(&item.id)
                .map(|f| &mut f.shared_link)
                .ok_or_else(|| CoreError::not_found(format!("file {}", item.id))),
        }
    }
}

pub struct EphemeralStorage {
    state: RwLock<State>,
}

impl EphemeralStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of folders (root included) and files currently stored.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.folders.len(), state.files.len())
    }
}

impl Default for EphemeralStorage {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::new()),
        }
    }
}

fn new_id(prefix: &str) -> ItemId {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

fn share_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

impl Storage for EphemeralStorage {
    type Error = CoreError;

    fn get_folder(&self, id: &str) -> Result<Option<Folder>, Self::Error> {
        Ok(self.state.read().folders.get(id).map(FolderRecord::to_folder))
    }

    fn list_children(&self, folder_id: &str) -> Result<Vec<ListEntry>, Self::Error> {
        let state = self.state.read();
        state.folder(folder_id)?;
        let kids = state.children.get(folder_id).cloned().unwrap_or_default();
        Ok(kids
            .iter()
            .filter_map(|child| match child.kind {
                ItemKind::Folder => state.folders.get(&child.id).map(|f| ListEntry {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    kind: ItemKind::Folder,
                    size: None,
                    modified_at: f.modified_at,
                }),
                ItemKind::File => state.files.get(&child.id).map(|f| ListEntry {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    kind: ItemKind::File,
                    size: Some(f.size()),
                    modified_at: f.modified_at,
                }),
            })
            .collect())
    }

    fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Folder, Self::Error> {
        let mut state = self.state.write();
        Ok(state.insert_folder(parent_id, name, description)?.to_folder())
    }

    fn move_folder(&self, folder_id: &str, new_parent_id: &str) -> Result<Folder, Self::Error> {
        let mut state = self.state.write();
        let folder = state.folder(folder_id)?.clone();
        let Some(old_parent) = folder.parent_id.clone() else {
            return Err(CoreError::invalid("the root folder cannot be moved"));
        };
        let new_parent_path = state.folder(new_parent_id)?.path.clone();
        if state.is_descendant_or_self(new_parent_id, folder_id) {
            return Err(CoreError::invalid(format!(
                "cannot move {} into itself or one of its descendants",
                folder.path
            )));
        }
        if old_parent == new_parent_id {
            return Ok(folder.to_folder());
        }
        if state.child_named(new_parent_id, &folder.name).is_some() {
            return Err(CoreError::conflict(format!(
                "an item named '{}' already exists in {new_parent_path}",
                folder.name
            )));
        }
        let item = ItemRef::folder(folder_id);
        state.detach(&old_parent, &item);
        state.attach(new_parent_id, item);
        let now = Utc::now();
        if let Some(record) = state.folders.get_mut(folder_id) {
            record.parent_id = Some(new_parent_id.to_string());
            record.path = join_path(&new_parent_path, &record.name);
            record.modified_at = now;
        }
        state.propagate_paths(folder_id, now);
        let moved = state.folder(folder_id)?.to_folder();
        debug!(folder_id, from = %folder.path, to = %moved.path, "folder moved");
        Ok(moved)
    }

    fn rename_folder(&self, folder_id: &str, new_name: &str) -> Result<Folder, Self::Error> {
        validate_name(new_name)?;
        let mut state = self.state.write();
        let folder = state.folder(folder_id)?.clone();
        let Some(parent_id) = folder.parent_id.clone() else {
            return Err(CoreError::invalid("the root folder cannot be renamed"));
        };
        if folder.name == new_name {
            return Ok(folder.to_folder());
        }
        if state.child_named(&parent_id, new_name).is_some() {
            return Err(CoreError::conflict(format!(
                "an item named '{new_name}' already exists next to {}",
                folder.path
            )));
        }
        let parent_path = state.folder(&parent_id)?.path.clone();
        let now = Utc::now();
        if let Some(record) = state.folders.get_mut(folder_id) {
            record.name = new_name.to_string();
            record.path = join_path(&parent_path, new_name);
            record.modified_at = now;
        }
        state.propagate_paths(folder_id, now);
        let renamed = state.folder(folder_id)?.to_folder();
        debug!(folder_id, from = %folder.path, to = %renamed.path, "folder renamed");
        Ok(renamed)
    }

    fn delete_folder(&self, folder_id: &str, recursive: bool) -> Result<(), Self::Error> {
        let mut state = self.state.write();
        let folder = state.folder(folder_id)?.clone();
        let Some(parent_id) = folder.parent_id.clone() else {
            return Err(CoreError::invalid("the root folder cannot be deleted"));
        };
        let has_children = state
            .children
            .get(folder_id)
            .map(|kids| !kids.is_empty())
            .unwrap_or(false);
        if has_children && !recursive {
            return Err(CoreError::NotEmpty(folder.path));
        }
        state.detach(&parent_id, &ItemRef::folder(folder_id));
        state.remove_subtree(folder_id);
        debug!(folder_id, path = %folder.path, recursive, "folder deleted");
        Ok(())
    }

    fn upload_file(
        &self,
        parent_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<FileRef, Self::Error> {
        validate_name(name)?;
        let mut state = self.state.write();
        state.folder(parent_id)?;
        let now = Utc::now();
        match state.child_named(parent_id, name) {
            Some(existing) if existing.kind == ItemKind::Folder => Err(CoreError::conflict(
                format!("a folder named '{name}' already exists"),
            )),
            Some(existing) => {
                let record = state
                    .files
                    .get_mut(&existing.id)
                    .ok_or_else(|| CoreError::Internal(format!("dangling file {}", existing.id)))?;
                record.content = content.to_vec();
                record.checksum = checksum(content);
                record.modified_at = now;
                debug!(file_id = %record.id, size = record.size(), "file overwritten");
                Ok(FileRef {
                    id: record.id.clone(),
                    size: record.size(),
                })
            }
            None => {
                let record = FileRecord {
                    id: new_id("f"),
                    parent_id: parent_id.to_string(),
                    name: name.to_string(),
                    content: content.to_vec(),
                    checksum: checksum(content),
                    modified_at: now,
                    shared_link: None,
                };
                let file_ref = FileRef {
                    id: record.id.clone(),
                    size: record.size(),
                };
                state.attach(parent_id, ItemRef::file(record.id.clone()));
                state.file_order.push(record.id.clone());
                state.files.insert(record.id.clone(), record);
                debug!(file_id = %file_ref.id, size = file_ref.size, "file created");
                Ok(file_ref)
            }
        }
    }

    fn get_file(&self, id: &str) -> Result<Option<FileInfo>, Self::Error> {
        let state = self.state.read();
        Ok(state.files.get(id).map(|f| FileInfo {
            id: f.id.clone(),
            parent_id: f.parent_id.clone(),
            name: f.name.clone(),
            path: state.file_path(f),
            size: f.size(),
            modified_at: f.modified_at,
            checksum: Some(f.checksum.clone()),
            shared_link: f.shared_link.clone(),
        }))
    }

    fn get_file_content(&self, id: &str) -> Result<Vec<u8>, Self::Error> {
        self.state
            .read()
            .files
            .get(id)
            .map(|f| f.content.clone())
            .ok_or_else(|| CoreError::not_found(format!("file {id}")))
    }

    fn search(&self, params: &SearchParams) -> Result<SearchResults, Self::Error> {
        let state = self.state.read();
        let query = params
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let extensions: Option<Vec<String>> = params
            .extensions
            .as_ref()
            .filter(|exts| !exts.is_empty())
            .map(|exts| exts.iter().map(|e| normalize_extension(e)).collect());
        let ancestors: Option<Vec<String>> = params
            .ancestor_paths
            .as_ref()
            .filter(|paths| !paths.is_empty())
            .map(|paths| {
                paths
                    .iter()
                    .map(|p| mcp_cloudfs_core::normalize_path(p))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let mut matches = Vec::new();
        if params.scope.permits(ItemKind::Folder) {
            for id in &state.folder_order {
                let Some(folder) = state.folders.get(id) else { continue };
                if folder.parent_id.is_none() {
                    continue;
                }
                if query.map_or(true, |q| contains_ignore_case(&folder.name, q)) {
                    matches.push(SearchEntry {
                        id: folder.id.clone(),
                        name: folder.name.clone(),
                        kind: ItemKind::Folder,
                        path: folder.path.clone(),
                        parent_id: folder.parent_id.clone(),
                        size: None,
                        modified_at: folder.modified_at,
                    });
                }
            }
        }
        if params.scope.permits(ItemKind::File) {
            for id in &state.file_order {
                let Some(file) = state.files.get(id) else { continue };
                if let Some(exts) = &extensions {
                    match file_extension(&file.name) {
                        Some(ext) if exts.contains(&ext) => {}
                        _ => continue,
                    }
                }
                let path = state.file_path(file);
                if let Some(ancestors) = &ancestors {
                    if !ancestors.iter().any(|a| is_within(&path, a)) {
                        continue;
                    }
                }
                let hit = match query {
                    None => true,
                    Some(q) => {
                        contains_ignore_case(&file.name, q)
                            || (params.include_content
                                && contains_ignore_case(&String::from_utf8_lossy(&file.content), q))
                    }
                };
                if hit {
                    matches.push(SearchEntry {
                        id: file.id.clone(),
                        name: file.name.clone(),
                        kind: ItemKind::File,
                        path,
                        parent_id: Some(file.parent_id.clone()),
                        size: Some(file.size()),
                        modified_at: file.modified_at,
                    });
                }
            }
        }

        let total_count = matches.len() as u64;
        if params.sort_by == SearchSort::ModifiedAt {
            match params.direction {
                SortDirection::Desc => matches.sort_by(|a, b| b.modified_at.cmp(&a.modified_at)),
                SortDirection::Asc => matches.sort_by(|a, b| a.modified_at.cmp(&b.modified_at)),
            }
        }
        matches.truncate(params.limit);
        debug!(total_count, returned = matches.len(), "search completed");
        Ok(SearchResults {
            total_count,
            entries: matches,
        })
    }

    fn create_shared_link(
        &self,
        item: &ItemRef,
        settings: &SharedLinkSettings,
    ) -> Result<SharedLink, Self::Error> {
        let mut state = self.state.write();
        let link = SharedLink {
            url: format!("{SHARE_BASE_URL}/{}", share_token()),
            access: settings.access.clone(),
            unshared_at: settings.unshared_at,
            can_download: settings.can_download,
            password_protected: settings
                .password
                .as_deref()
                .map(|p| !p.is_empty())
                .unwrap_or(false),
        };
        *state.shared_link_slot(item)? = Some(link.clone());
        debug!(item_type = %item.kind, item_id = %item.id, "shared link set");
        Ok(link)
    }

    fn remove_shared_link(&self, item: &ItemRef) -> Result<(), Self::Error> {
        let mut state = self.state.write();
        *state.shared_link_slot(item)? = None;
        Ok(())
    }

    fn add_collaborators(
        &self,
        item: &ItemRef,
        grants: &[CollaboratorGrant],
        notify: bool,
    ) -> Result<Vec<CollaboratorOutcome>, Self::Error> {
        CollaboratorGrant::check_all(grants)?;
        let mut state = self.state.write();
        state.ensure_exists(item)?;
        let mut outcomes = Vec::with_capacity(grants.len());
        for grant in grants {
            let email = grant.email.trim();
            let existing = state.collaborations.iter_mut().find(|c| {
                c.item_type == item.kind
                    && c.item_id == item.id
                    && c.email.eq_ignore_ascii_case(email)
            });
            let status = match existing {
                Some(relation) => {
                    relation.role = grant.role.clone();
                    CollaboratorStatus::Updated
                }
                None => {
                    state.collaborations.push(Collaboration {
                        item_type: item.kind,
                        item_id: item.id.clone(),
                        email: email.to_string(),
                        role: grant.role.clone(),
                        id: Some(new_id("c")),
                    });
                    CollaboratorStatus::Added
                }
            };
            outcomes.push(CollaboratorOutcome {
                email: email.to_string(),
                role: Some(grant.role.clone()),
                status,
            });
        }
        debug!(item_type = %item.kind, item_id = %item.id, count = outcomes.len(), notify, "collaborators added");
        Ok(outcomes)
    }

    fn update_collaborators(
        &self,
        item: &ItemRef,
        changes: &[CollaboratorChange],
    ) -> Result<Vec<CollaboratorOutcome>, Self::Error> {
        let mut state = self.state.write();
        state.ensure_exists(item)?;
        let mut outcomes = Vec::with_capacity(changes.len());
        for change in changes {
            let email = change.email.trim();
            let position = state.collaborations.iter().position(|c| {
                c.item_type == item.kind
                    && c.item_id == item.id
                    && c.email.eq_ignore_ascii_case(email)
            });
            let outcome = match (position, change.remove, change.role.as_ref()) {
                (Some(idx), true, _) => {
                    let removed = state.collaborations.remove(idx);
                    CollaboratorOutcome {
                        email: removed.email,
                        role: Some(removed.role),
                        status: CollaboratorStatus::Removed,
                    }
                }
                (Some(idx), false, Some(role)) => {
                    let relation = &mut state.collaborations[idx];
                    relation.role = role.clone();
                    CollaboratorOutcome {
                        email: relation.email.clone(),
                        role: Some(role.clone()),
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
        let state = self.state.read();
        state.ensure_exists(item)?;
        Ok(state
            .collaborations
            .iter()
            .filter(|c| c.item_type == item.kind && c.item_id == item.id)
            .cloned()
            .collect())
    }

    fn analyze(&self, file_ids: &[ItemId], question: &str) -> Result<Analysis, Self::Error> {
        let state = self.state.read();
        let terms: Vec<String> = question
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 3)
            .map(str::to_lowercase)
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect();
        let mut scored: Vec<(usize, usize, Citation)> = Vec::new();
        for file_id in file_ids {
            let file = state
                .files
                .get(file_id)
                .ok_or_else(|| CoreError::not_found(format!("file {file_id}")))?;
            let text = String::from_utf8_lossy(&file.content);
            for (position, sentence) in sentences(&text).into_iter().enumerate() {
                let lowered = sentence.to_lowercase();
                let score = terms.iter().filter(|t| lowered.contains(t.as_str())).count();
                if score > 0 {
                    scored.push((
                        score,
                        position,
                        Citation {
                            file_id: file.id.clone(),
                            file_name: file.name.clone(),
                            excerpt: truncate_chars(sentence, EXCERPT_CHARS),
                        },
                    ));
                }
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(MAX_CITATIONS);
        let citations: Vec<Citation> = scored.into_iter().map(|(_, _, c)| c).collect();
        let answer = if citations.is_empty() {
            "No passage in the selected files addresses the question.".to_string()
        } else {
            citations
                .iter()
                .map(|c| c.excerpt.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };
        Ok(Analysis { answer, citations })
    }

    fn resolve_path(&self, path: &str) -> Result<Option<ItemId>, Self::Error> {
        let segments = split_path(path)?;
        let state = self.state.read();
        let mut current = ROOT_FOLDER_ID.to_string();
        for segment in segments {
            match state.child_named(&current, segment) {
                Some(child) if child.kind == ItemKind::Folder => current = child.id,
                _ => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn ensure_folder_path(
        &self,
        path: &str,
        description: Option<&str>,
    ) -> Result<ItemId, Self::Error> {
        let segments = split_path(path)?;
        let last = segments.len().saturating_sub(1);
        let mut state = self.state.write();
        let mut current = ROOT_FOLDER_ID.to_string();
        for (idx, segment) in segments.into_iter().enumerate() {
            match state.child_named(&current, segment) {
                Some(child) if child.kind == ItemKind::Folder => current = child.id,
                Some(_) => {
                    return Err(CoreError::conflict(format!(
                        "a file named '{segment}' already exists where a folder is expected"
                    )))
                }
                None => {
                    let desc = if idx == last { description } else { None };
                    current = state.insert_folder(&current, segment, desc)?.id;
                }
            }
        }
        Ok(current)
    }
}

fn sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_cloudfs_core::{SearchScope, TreeOptions};

    fn store_with(paths: &[&str]) -> EphemeralStorage {
        let store = EphemeralStorage::new();
        for path in paths {
            store.ensure_folder_path(path, None).unwrap();
        }
        store
    }

    #[test]
    fn ensure_then_resolve_round_trip() {
        let store = EphemeralStorage::new();
        let id = store.ensure_folder_path("/a/b/c", Some("leaf")).unwrap();
        assert_eq!(store.resolve_path("/a/b/c").unwrap(), Some(id.clone()));
        assert_eq!(store.ensure_folder_path("a/b/c/", None).unwrap(), id);
        let folder = store.get_folder(&id).unwrap().unwrap();
        assert_eq!(folder.path, "/a/b/c");
        assert_eq!(folder.description.as_deref(), Some("leaf"));
        assert_eq!(store.counts().0, 4);
    }

    #[test]
    fn ensure_does_not_touch_existing_descriptions() {
        let store = EphemeralStorage::new();
        let id = store.ensure_folder_path("/docs", Some("first")).unwrap();
        store.ensure_folder_path("/docs", Some("second")).unwrap();
        let folder = store.get_folder(&id).unwrap().unwrap();
        assert_eq!(folder.description.as_deref(), Some("first"));
    }

    #[test]
    fn root_resolves_to_reserved_id() {
        let store = EphemeralStorage::new();
        assert_eq!(
            store.resolve_path("/").unwrap().as_deref(),
            Some(ROOT_FOLDER_ID)
        );
        assert_eq!(store.resolve_path("").unwrap().as_deref(), Some(ROOT_FOLDER_ID));
        assert_eq!(store.resolve_path("/missing").unwrap(), None);
    }

    #[test]
    fn empty_segment_is_invalid() {
        let store = EphemeralStorage::new();
        assert!(matches!(
            store.ensure_folder_path("/a//b", None),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn rename_propagates_to_descendants() {
        let store = store_with(&["/A/B/C"]);
        let a = store.resolve_path("/A").unwrap().unwrap();
        let c = store.resolve_path("/A/B/C").unwrap().unwrap();
        let b = store.resolve_path("/A/B").unwrap().unwrap();
        store.upload_file(&b, "note.txt", b"hi").unwrap();

        store.rename_folder(&a, "D").unwrap();

        assert_eq!(store.get_folder(&c).unwrap().unwrap().path, "/D/B/C");
        assert_eq!(store.resolve_path("/A/B").unwrap(), None);
        assert_eq!(store.resolve_path("/A/B/C").unwrap(), None);
        assert_eq!(store.resolve_path("/D/B/C").unwrap(), Some(c));
        let file = store.get_file_by_path("/D/B/note.txt").unwrap().unwrap();
        assert_eq!(file.content, b"hi");
        assert_eq!(
            store.get_file(&file.id).unwrap().unwrap().path,
            "/D/B/note.txt"
        );
    }

    #[test]
    fn move_propagates_and_leaves_siblings() {
        let store = store_with(&["/X/inner", "/Y", "/Z/keep"]);
        let x = store.resolve_path("/X").unwrap().unwrap();
        let y = store.resolve_path("/Y").unwrap().unwrap();
        let keep = store.resolve_path("/Z/keep").unwrap().unwrap();

        let moved = store.move_folder(&x, &y).unwrap();

        assert_eq!(moved.path, "/Y/X");
        assert!(store.resolve_path("/Y/X/inner").unwrap().is_some());
        assert_eq!(store.resolve_path("/X").unwrap(), None);
        assert_eq!(store.get_folder(&keep).unwrap().unwrap().path, "/Z/keep");
    }

    #[test]
    fn move_into_own_descendant_is_rejected() {
        let store = store_with(&["/X/inner"]);
        let x = store.resolve_path("/X").unwrap().unwrap();
        let inner = store.resolve_path("/X/inner").unwrap().unwrap();
        assert!(matches!(
            store.move_folder(&x, &inner),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.move_folder(&x, &x),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn move_with_unknown_ids_fails() {
        let store = store_with(&["/X"]);
        let x = store.resolve_path("/X").unwrap().unwrap();
        assert!(matches!(
            store.move_folder(&x, "nope"),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.move_folder("nope", &x),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_requires_recursive_for_non_empty() {
        let store = store_with(&["/P/Q"]);
        let p = store.resolve_path("/P").unwrap().unwrap();
        let q = store.resolve_path("/P/Q").unwrap().unwrap();
        store.upload_file(&q, "f.md", b"x").unwrap();

        assert!(matches!(
            store.delete_folder(&p, false),
            Err(CoreError::NotEmpty(_))
        ));
        store.delete_folder(&p, true).unwrap();
        assert_eq!(store.resolve_path("/P").unwrap(), None);
        assert_eq!(store.resolve_path("/P/Q").unwrap(), None);
        assert_eq!(store.counts(), (1, 0));
    }

    #[test]
    fn upload_is_an_upsert() {
        let store = EphemeralStorage::new();
        let first = store.upload_file(ROOT_FOLDER_ID, "a.txt", b"one").unwrap();
        let second = store
            .upload_file(ROOT_FOLDER_ID, "a.txt", b"three")
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.size, 5);
        assert_eq!(store.get_file_content(&first.id).unwrap(), b"three");
        assert_eq!(store.counts().1, 1);
    }

    #[test]
    fn file_and_folder_names_do_not_collide() {
        let store = store_with(&["/docs"]);
        assert!(matches!(
            store.upload_file(ROOT_FOLDER_ID, "docs", b"x"),
            Err(CoreError::Conflict(_))
        ));
        store.upload_file(ROOT_FOLDER_ID, "notes", b"x").unwrap();
        assert!(matches!(
            store.ensure_folder_path("/notes/inner", None),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn empty_file_name_is_rejected() {
        let store = EphemeralStorage::new();
        assert!(store.upload_file(ROOT_FOLDER_ID, " ", b"x").is_err());
        assert!(store.check_file_exists(ROOT_FOLDER_ID, "").is_err());
    }

    #[test]
    fn get_file_content_of_unknown_id_is_not_found() {
        let store = EphemeralStorage::new();
        assert!(matches!(
            store.get_file_content("f_missing"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn search_filters_by_extension() {
        let store = EphemeralStorage::new();
        store.upload_file(ROOT_FOLDER_ID, "alpha.txt", b"x").unwrap();
        store.upload_file(ROOT_FOLDER_ID, "alpha.pdf", b"x").unwrap();
        let results = store
            .search(&SearchParams {
                query: Some("alpha".into()),
                extensions: Some(vec!["txt".into()]),
                ..SearchParams::default()
            })
            .unwrap();
        assert_eq!(results.total_count, 1);
        assert_eq!(results.entries.len(), 1);
        assert_eq!(results.entries[0].name, "alpha.txt");
    }

    #[test]
    fn search_total_count_ignores_limit() {
        let store = EphemeralStorage::new();
        for i in 0..7 {
            store
                .upload_file(ROOT_FOLDER_ID, &format!("report-{i}.md"), b"x")
                .unwrap();
        }
        let results = store
            .search(&SearchParams {
                query: Some("REPORT".into()),
                limit: 3,
                ..SearchParams::default()
            })
            .unwrap();
        assert_eq!(results.total_count, 7);
        assert_eq!(results.entries.len(), 3);
    }

    #[test]
    fn search_sorts_by_modification_before_the_limit() {
        let store = EphemeralStorage::new();
        for name in ["a.md", "b.md", "c.md", "d.md", "b.md"] {
            store.upload_file(ROOT_FOLDER_ID, name, name.as_bytes()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let names = |direction| {
            store
                .search(&SearchParams {
                    query: Some(".md".into()),
                    sort_by: SearchSort::ModifiedAt,
                    direction,
                    limit: 2,
                    ..SearchParams::default()
                })
                .unwrap()
                .entries
                .into_iter()
                .map(|e| e.name)
                .collect::<Vec<_>>()
        };
        assert_eq!(names(SortDirection::Desc), vec!["b.md", "d.md"]);
        assert_eq!(names(SortDirection::Asc), vec!["a.md", "c.md"]);
    }

    #[test]
    fn search_content_and_ancestry() {
        let store = store_with(&["/A", "/AB"]);
        let a = store.resolve_path("/A").unwrap().unwrap();
        let ab = store.resolve_path("/AB").unwrap().unwrap();
        store.upload_file(&a, "one.txt", b"the Quarterly numbers").unwrap();
        store.upload_file(&ab, "two.txt", b"quarterly again").unwrap();

        let by_name = store
            .search(&SearchParams {
                query: Some("quarterly".into()),
                ..SearchParams::default()
            })
            .unwrap();
        assert_eq!(by_name.total_count, 0);

        let by_content = store
            .search(&SearchParams {
                query: Some("quarterly".into()),
                include_content: true,
                ancestor_paths: Some(vec!["/A".into()]),
                scope: SearchScope::Files,
                ..SearchParams::default()
            })
            .unwrap();
        assert_eq!(by_content.total_count, 1);
        assert_eq!(by_content.entries[0].path, "/A/one.txt");
    }

    #[test]
    fn search_folders_only() {
        let store = store_with(&["/Projects/alpha"]);
        store.upload_file(ROOT_FOLDER_ID, "alpha.txt", b"x").unwrap();
        let results = store
            .search(&SearchParams {
                query: Some("alpha".into()),
                scope: SearchScope::Folders,
                ..SearchParams::default()
            })
            .unwrap();
        assert_eq!(results.total_count, 1);
        assert_eq!(results.entries[0].kind, ItemKind::Folder);
        assert_eq!(results.entries[0].path, "/Projects/alpha");
    }

    #[test]
    fn tree_respects_depth_bound() {
        let store = store_with(&["/top/mid/deep"]);
        let top = store.resolve_path("/top").unwrap().unwrap();
        store.upload_file(&top, "t.txt", b"12345").unwrap();
        let options = TreeOptions {
            include_files: true,
            include_sizes: true,
            ..TreeOptions::default()
        };

        let tree = store.build_tree(ROOT_FOLDER_ID, "/", 1, &options).unwrap();
        let children = tree.children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "top");
        assert!(children[0].children.is_none());

        let tree = store.build_tree(ROOT_FOLDER_ID, "/", 2, &options).unwrap();
        let top_node = &tree.children.as_ref().unwrap()[0];
        let names: Vec<&str> = top_node
            .children
            .as_ref()
            .unwrap()
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["mid", "t.txt"]);
        let file = top_node
            .children
            .as_ref()
            .unwrap()
            .iter()
            .find(|n| n.kind == ItemKind::File)
            .unwrap();
        assert_eq!(file.size, Some(5));
        assert_eq!(file.path, "/top/t.txt");
    }

    #[test]
    fn tree_filters_by_pattern_and_files_flag() {
        let store = store_with(&["/docs"]);
        store.upload_file(ROOT_FOLDER_ID, "a.md", b"x").unwrap();
        store.upload_file(ROOT_FOLDER_ID, "b.txt", b"x").unwrap();
        let tree = store
            .build_tree(
                ROOT_FOLDER_ID,
                "/",
                3,
                &TreeOptions {
                    include_files: true,
                    name_pattern: Some("*.MD".into()),
                    ..TreeOptions::default()
                },
            )
            .unwrap();
        let names: Vec<&str> = tree
            .children
            .as_ref()
            .unwrap()
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["a.md"]);

        let folders_only = store
            .build_tree(ROOT_FOLDER_ID, "/", 3, &TreeOptions::default())
            .unwrap();
        assert_eq!(folders_only.count_descendants(), (1, 0));
    }

    #[test]
    fn shared_links_replace_and_remove() {
        let store = EphemeralStorage::new();
        let file = store.upload_file(ROOT_FOLDER_ID, "s.txt", b"x").unwrap();
        let item = ItemRef::file(file.id.clone());
        let first = store
            .create_shared_link(
                &item,
                &SharedLinkSettings {
                    access: Some("open".into()),
                    password: Some("secret".into()),
                    ..SharedLinkSettings::default()
                },
            )
            .unwrap();
        assert!(first.password_protected);
        let second = store
            .update_shared_link(&item, &SharedLinkSettings::default())
            .unwrap();
        assert_ne!(first.url, second.url);
        assert_eq!(
            store.get_file(&file.id).unwrap().unwrap().shared_link,
            Some(second)
        );
        store.remove_shared_link(&item).unwrap();
        store.remove_shared_link(&item).unwrap();
        assert!(store.get_file(&file.id).unwrap().unwrap().shared_link.is_none());
    }

    #[test]
    fn collaborators_are_unique_per_email() {
        let store = store_with(&["/team"]);
        let team = ItemRef::folder(store.resolve_path("/team").unwrap().unwrap());
        let added = store
            .add_collaborators(
                &team,
                &[
                    CollaboratorGrant {
                        email: "a@example.com".into(),
                        role: "viewer".into(),
                    },
                    CollaboratorGrant {
                        email: "A@example.com".into(),
                        role: "editor".into(),
                    },
                ],
                false,
            )
            .unwrap();
        assert_eq!(added[0].status, CollaboratorStatus::Added);
        assert_eq!(added[1].status, CollaboratorStatus::Updated);
        let listed = store.list_collaborators(&team).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].role, "editor");

        let updated = store
            .update_collaborators(
                &team,
                &[
                    CollaboratorChange {
                        email: "nobody@example.com".into(),
                        role: Some("viewer".into()),
                        remove: false,
                    },
                    CollaboratorChange {
                        email: "a@example.com".into(),
                        role: None,
                        remove: true,
                    },
                ],
            )
            .unwrap();
        assert_eq!(updated[0].status, CollaboratorStatus::Skipped);
        assert_eq!(updated[1].status, CollaboratorStatus::Removed);
        assert!(store.list_collaborators(&team).unwrap().is_empty());
    }

    #[test]
    fn rejected_grant_list_commits_nothing() {
        let store = store_with(&["/team"]);
        let team = ItemRef::folder(store.resolve_path("/team").unwrap().unwrap());
        let err = store
            .add_collaborators(
                &team,
                &[
                    CollaboratorGrant {
                        email: "a@example.com".into(),
                        role: "editor".into(),
                    },
                    CollaboratorGrant {
                        email: "   ".into(),
                        role: "viewer".into(),
                    },
                ],
                false,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert!(store.list_collaborators(&team).unwrap().is_empty());
    }

    #[test]
    fn analyze_cites_matching_sentences() {
        let store = EphemeralStorage::new();
        let file = store
            .upload_file(
                ROOT_FOLDER_ID,
                "plan.md",
                b"The budget is 40k. Launch happens in May. Nothing else.",
            )
            .unwrap();
        let analysis = store
            .analyze(&[file.id.clone()], "When is the launch?")
            .unwrap();
        assert_eq!(analysis.citations.len(), 1);
        assert_eq!(analysis.citations[0].excerpt, "Launch happens in May.");
        assert!(store.analyze(&["f_missing".into()], "x").is_err());
    }
}
