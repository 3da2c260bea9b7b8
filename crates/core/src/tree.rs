//! Bounded-depth folder enumeration on top of `Storage::list_children`.

use std::cmp::Ordering;

use regex::Regex;

use crate::{
    errors::CoreError,
    model::{ItemKind, ListEntry, TreeNode},
    path::join_path,
    traits::{Storage, TreeOptions, TreeSort},
    validate::compile_name_pattern,
};

pub(crate) fn build_tree<S: Storage>(
    storage: &S,
    start_id: &str,
    start_path: &str,
    max_depth: u32,
    options: &TreeOptions,
) -> Result<TreeNode, S::Error> {
    let folder = storage
        .get_folder(start_id)?
        .ok_or_else(|| CoreError::not_found(format!("folder {start_id}")))?;
    let pattern = match options.name_pattern.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(
            compile_name_pattern(raw)
                .ok_or_else(|| CoreError::invalid(format!("bad name pattern: {raw}")))?,
        ),
        _ => None,
    };
    let walker = Walker {
        storage,
        max_depth,
        options,
        pattern,
    };
    let children = walker.walk(start_id, start_path, 0)?;
    Ok(TreeNode {
        id: folder.id,
        name: folder.name,
        kind: ItemKind::Folder,
        path: start_path.to_string(),
        size: None,
        modified_at: options.include_modified.then_some(folder.modified_at),
        children,
    })
}

struct Walker<'a, S> {
    storage: &'a S,
    max_depth: u32,
    options: &'a TreeOptions,
    pattern: Option<Regex>,
}

impl<S: Storage> Walker<'_, S> {
    /// Children of `folder_id`, which sits at `depth`. `None` at the limit.
    fn walk(
        &self,
        folder_id: &str,
        folder_path: &str,
        depth: u32,
    ) -> Result<Option<Vec<TreeNode>>, S::Error> {
        if depth >= self.max_depth {
            return Ok(None);
        }
        let mut entries: Vec<ListEntry> = self
            .storage
            .list_children(folder_id)?
            .into_iter()
            .filter(|e| self.options.include_files || e.kind == ItemKind::Folder)
            .filter(|e| {
                self.pattern
                    .as_ref()
                    .map(|re| re.is_match(&e.name))
                    .unwrap_or(true)
            })
            .collect();
        sort_entries(&mut entries, self.options.sort_by);

        let mut nodes = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = join_path(folder_path, &entry.name);
            let children = match entry.kind {
                ItemKind::Folder => self.walk(&entry.id, &path, depth + 1)?,
                ItemKind::File => None,
            };
            nodes.push(TreeNode {
                id: entry.id,
                name: entry.name,
                kind: entry.kind,
                path,
                size: if self.options.include_sizes {
                    entry.size
                } else {
                    None
                },
                modified_at: self.options.include_modified.then_some(entry.modified_at),
                children,
            });
        }
        Ok(Some(nodes))
    }
}

pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn sort_entries(entries: &mut [ListEntry], sort: TreeSort) {
    match sort {
        TreeSort::Name => entries.sort_by(|a, b| compare_names(&a.name, &b.name)),
        TreeSort::Size => entries.sort_by(|a, b| {
            b.size
                .unwrap_or(0)
                .cmp(&a.size.unwrap_or(0))
                .then_with(|| compare_names(&a.name, &b.name))
        }),
        TreeSort::Modified => entries.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| compare_names(&a.name, &b.name))
        }),
        TreeSort::Type => entries.sort_by(|a, b| {
            kind_rank(a.kind)
                .cmp(&kind_rank(b.kind))
                .then_with(|| compare_names(&a.name, &b.name))
        }),
    }
}

fn kind_rank(kind: ItemKind) -> u8 {
    match kind {
        ItemKind::Folder => 0,
        ItemKind::File => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn entry(name: &str, kind: ItemKind, size: u64, age_mins: i64) -> ListEntry {
        ListEntry {
            id: name.to_string(),
            name: name.to_string(),
            kind,
            size: Some(size),
            modified_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn names(entries: &[ListEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn name_sort_is_case_insensitive() {
        let mut entries = vec![
            entry("beta", ItemKind::File, 1, 0),
            entry("Alpha", ItemKind::File, 1, 0),
            entry("alpha", ItemKind::File, 1, 0),
        ];
        sort_entries(&mut entries, TreeSort::Name);
        assert_eq!(names(&entries), vec!["Alpha", "alpha", "beta"]);
    }

    #[test]
    fn type_sort_puts_folders_first() {
        let mut entries = vec![
            entry("a.txt", ItemKind::File, 1, 0),
            entry("zeta", ItemKind::Folder, 0, 0),
            entry("beta", ItemKind::Folder, 0, 0),
        ];
        sort_entries(&mut entries, TreeSort::Type);
        assert_eq!(names(&entries), vec!["beta", "zeta", "a.txt"]);
    }

    #[test]
    fn size_and_modified_sort_descending() {
        let mut entries = vec![
            entry("small", ItemKind::File, 1, 10),
            entry("big", ItemKind::File, 100, 5),
            entry("mid", ItemKind::File, 50, 1),
        ];
        sort_entries(&mut entries, TreeSort::Size);
        assert_eq!(names(&entries), vec!["big", "mid", "small"]);
        sort_entries(&mut entries, TreeSort::Modified);
        assert_eq!(names(&entries), vec!["mid", "big", "small"]);
    }
}
