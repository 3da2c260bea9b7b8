//! Core domain model, validation, and traits.
//! No async and no IO within this crate.

pub mod errors;
pub mod model;
pub mod path;
pub mod traits;
pub mod tree;
pub mod validate;

pub use crate::errors::{CoreError, ValidationError};
pub use crate::model::{
    Analysis, Citation, Collaboration, FileContent, FileInfo, FileRef, Folder, ItemId, ItemKind,
    ItemRef, ListEntry, SearchEntry, SharedLink, TreeNode, ROOT_FOLDER_ID,
};
pub use crate::path::{is_within, join_path, normalize_path, split_file_path, split_path, ROOT_PATH};
pub use crate::traits::{
    CollaboratorChange, CollaboratorGrant, CollaboratorOutcome, CollaboratorStatus, SearchParams,
    SearchResults, SearchScope, SearchSort, SharedLinkSettings, SortDirection, Storage,
    TreeOptions, TreeSort,
};
pub use crate::validate::{file_extension, matches_name_pattern, normalize_extension};
