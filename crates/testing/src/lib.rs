#[cfg(test)]
mod store_properties {
    use mcp_cloudfs_core::{
        CoreError, ItemKind, Storage, TreeOptions, ROOT_FOLDER_ID,
    };
    use mcp_cloudfs_storage_ephemeral::EphemeralStorage;

    fn folder(store: &EphemeralStorage, path: &str) -> String {
        store.ensure_folder_path(path, None).unwrap()
    }

    fn put(store: &EphemeralStorage, dir: &str, name: &str, body: &str) -> String {
        let parent = folder(store, dir);
        store.upload_file(&parent, name, body.as_bytes()).unwrap().id
    }

    #[test]
    fn resolved_paths_round_trip() {
        let store = EphemeralStorage::new();
        for path in ["/a", "/a/b", "/a/b/c", "/x/y"] {
            let id = folder(&store, path);
            assert_eq!(store.resolve_path(path).unwrap().as_deref(), Some(id.as_str()));
            assert_eq!(store.get_folder(&id).unwrap().unwrap().path, path);
        }
        assert_eq!(
            store.resolve_path("/").unwrap().as_deref(),
            Some(ROOT_FOLDER_ID)
        );
        assert_eq!(store.resolve_path("/a/missing").unwrap(), None);
    }

    #[test]
    fn ensure_folder_path_is_idempotent() {
        let store = EphemeralStorage::new();
        let first = store.ensure_folder_path("/docs/specs", Some("specs")).unwrap();
        let second = store.ensure_folder_path("docs/specs/", None).unwrap();
        assert_eq!(first, second);
        let (folders, _) = store.counts();
        assert_eq!(folders, 3);
        assert_eq!(
            store.get_folder(&first).unwrap().unwrap().description.as_deref(),
            Some("specs")
        );
    }

    #[test]
    fn rename_and_move_rewrite_descendant_paths() {
        let store = EphemeralStorage::new();
        let file = put(&store, "/proj/src/deep", "main.rs", "fn main() {}");
        let proj = store.resolve_path("/proj").unwrap().unwrap();
        store.rename_folder(&proj, "app").unwrap();
        assert_eq!(store.get_file(&file).unwrap().unwrap().path, "/app/src/deep/main.rs");
        assert_eq!(store.resolve_path("/proj").unwrap(), None);

        let archive = folder(&store, "/archive");
        let src = store.resolve_path("/app/src").unwrap().unwrap();
        store.move_folder(&src, &archive).unwrap();
        assert_eq!(
            store.get_file(&file).unwrap().unwrap().path,
            "/archive/src/deep/main.rs"
        );
        let deep = store.resolve_path("/archive/src/deep").unwrap().unwrap();
        assert_eq!(store.get_folder(&deep).unwrap().unwrap().path, "/archive/src/deep");
    }

    #[test]
    fn folder_cannot_move_into_itself() {
        let store = EphemeralStorage::new();
        let outer = folder(&store, "/outer");
        let inner = folder(&store, "/outer/inner");
        assert!(store.move_folder(&outer, &inner).is_err());
        assert!(store.move_folder(&outer, &outer).is_err());
        assert_eq!(store.get_folder(&outer).unwrap().unwrap().path, "/outer");
    }

    #[test]
    fn non_recursive_delete_refuses_populated_folders() {
        let store = EphemeralStorage::new();
        put(&store, "/keep", "a.txt", "a");
        let keep = store.resolve_path("/keep").unwrap().unwrap();
        assert!(matches!(
            store.delete_folder(&keep, false),
            Err(CoreError::NotEmpty(_))
        ));
        assert_eq!(store.counts(), (2, 1));

        store.delete_folder(&keep, true).unwrap();
        assert_eq!(store.counts(), (1, 0));
        assert!(store.delete_folder(ROOT_FOLDER_ID, true).is_err());
    }

    #[test]
    fn upload_upserts_by_parent_and_name() {
        let store = EphemeralStorage::new();
        let first = put(&store, "/n", "x.md", "one");
        let second = put(&store, "/n", "x.md", "three");
        assert_eq!(first, second);
        assert_eq!(store.get_file_content(&first).unwrap(), b"three");
        assert_eq!(store.counts().1, 1);
        let found = store.get_file_by_path("/n/x.md").unwrap().unwrap();
        assert_eq!(found.size, 5);
    }

    #[test]
    fn tree_stops_at_max_depth() {
        let store = EphemeralStorage::new();
        put(&store, "/l1/l2/l3", "leaf.txt", "x");
        let options = TreeOptions {
            include_files: true,
            ..TreeOptions::default()
        };
        let tree = store.build_tree(ROOT_FOLDER_ID, "/", 2, &options).unwrap();
        let l1 = &tree.children.as_ref().unwrap()[0];
        assert_eq!(l1.path, "/l1");
        let l2 = &l1.children.as_ref().unwrap()[0];
        assert_eq!(l2.kind, ItemKind::Folder);
        assert!(l2.children.is_none(), "depth limit leaves l2 unexpanded");

        let full = store.build_tree(ROOT_FOLDER_ID, "/", 10, &options).unwrap();
        let l3 = &full.children.as_ref().unwrap()[0].children.as_ref().unwrap()[0]
            .children
            .as_ref()
            .unwrap()[0];
        let leaf = &l3.children.as_ref().unwrap()[0];
        assert_eq!(leaf.path, "/l1/l2/l3/leaf.txt");
    }
}
