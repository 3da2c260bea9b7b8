use mcp_cloudfs_core::{
    split_file_path, ItemKind, SearchParams, SearchScope, Storage, TreeOptions, ROOT_FOLDER_ID,
};
use mcp_cloudfs_storage_ephemeral::EphemeralStorage;
use std::time::Instant;

use crate::datasets::Document;

pub struct EphemeralStack {
    pub storage: EphemeralStorage,
}

impl Default for EphemeralStack {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemeralStack {
    pub fn new() -> Self {
        Self {
            storage: EphemeralStorage::new(),
        }
    }

    pub fn loaded(documents: &[Document]) -> Self {
        let stack = Self::new();
        measure_save(&stack.storage, documents);
        stack
    }
}

pub fn measure_save<S: Storage>(storage: &S, documents: &[Document]) {
    for doc in documents {
        let (folder, name) = split_file_path(&doc.path).expect("dataset path");
        let parent = storage
            .ensure_folder_path(&folder, None)
            .expect("ensure folder");
        storage
            .upload_file(&parent, &name, doc.content.as_bytes())
            .expect("upload");
    }
}

pub fn save_with_timing<S: Storage>(storage: &S, documents: &[Document]) -> u128 {
    let start = Instant::now();
    measure_save(storage, documents);
    start.elapsed().as_micros()
}

pub fn measure_search<S: Storage>(storage: &S, query: &str, include_content: bool) -> usize {
    let params = SearchParams {
        query: Some(query.to_string()),
        scope: SearchScope::Files,
        include_content,
        limit: 200,
        ..SearchParams::default()
    };
    storage.search(&params).expect("search").entries.len()
}

/// Node count of the tree below the root.
pub fn measure_tree<S: Storage>(storage: &S, max_depth: u32) -> usize {
    let options = TreeOptions {
        include_files: true,
        include_sizes: true,
        ..TreeOptions::default()
    };
    let tree = storage
        .build_tree(ROOT_FOLDER_ID, "/", max_depth, &options)
        .expect("build tree");
    let mut stack = vec![&tree];
    let mut count = 0;
    while let Some(node) = stack.pop() {
        count += 1;
        if let Some(children) = &node.children {
            stack.extend(children.iter());
        }
    }
    count
}

/// Renames the first top-level folder, forcing every descendant path to be
/// re-derived.
pub fn rename_top_folder<S: Storage>(storage: &S, new_name: &str) {
    let top = storage
        .list_children(ROOT_FOLDER_ID)
        .expect("list root")
        .into_iter()
        .find(|c| c.kind == ItemKind::Folder)
        .expect("top-level folder");
    storage.rename_folder(&top.id, new_name).expect("rename");
}
