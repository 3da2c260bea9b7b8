//! Resource catalog and `resources/read` over the store.

use base64::Engine as _;
use mcp_cloudfs_core::{normalize_path, Storage};
use mcp_cloudfs_proto as proto;
use serde_json::json;

use crate::tools::{locate_file, locate_folder};

#[derive(Debug, PartialEq, Eq)]
pub enum ResourceError {
    Unsupported(String),
    NotFound(String),
    Store(String),
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceError::Unsupported(uri) => write!(f, "Unsupported resource uri: {uri}"),
            ResourceError::NotFound(uri) => write!(f, "Resource not found: {uri}"),
            ResourceError::Store(msg) => f.write_str(msg),
        }
    }
}

pub fn list_resources() -> proto::ResourceListResult {
    proto::ResourceListResult {
        resources: vec![proto::ResourceDescriptor {
            uri: proto::RESOURCE_ROOT_URI.into(),
            name: "root".into(),
            description: Some("Listing of the storage root folder".into()),
            mime_type: Some("application/json".into()),
        }],
        next_cursor: None,
    }
}

pub fn list_resource_templates() -> proto::ResourceTemplateListResult {
    proto::ResourceTemplateListResult {
        resource_templates: vec![
            proto::ResourceTemplateDescriptor {
                uri_template: proto::RESOURCE_FOLDER_TEMPLATE.into(),
                name: "folder".into(),
                description: Some("Children of the folder at {path}".into()),
                mime_type: Some("application/json".into()),
            },
            proto::ResourceTemplateDescriptor {
                uri_template: proto::RESOURCE_FILE_TEMPLATE.into(),
                name: "file".into(),
                description: Some("Content of the file at {path}".into()),
                mime_type: None,
            },
        ],
    }
}

enum Target {
    Folder(String),
    File(String),
}

fn parse_uri(uri: &str) -> Result<Target, ResourceError> {
    let unsupported = || ResourceError::Unsupported(uri.to_string());
    if uri == proto::RESOURCE_ROOT_URI {
        return Ok(Target::Folder("/".into()));
    }
    if let Some(rest) = uri.strip_prefix(proto::RESOURCE_FOLDER_PREFIX) {
        let path = normalize_path(rest).map_err(|_| unsupported())?;
        return Ok(Target::Folder(path));
    }
    if let Some(rest) = uri.strip_prefix(proto::RESOURCE_FILE_PREFIX) {
        let path = normalize_path(rest).map_err(|_| unsupported())?;
        if path == "/" {
            return Err(unsupported());
        }
        return Ok(Target::File(path));
    }
    Err(unsupported())
}

pub fn read_resource<S: Storage>(
    storage: &S,
    uri: &str,
) -> Result<proto::ResourceReadResult, ResourceError> {
    let contents = match parse_uri(uri)? {
        Target::Folder(path) => {
            let folder = locate_folder(storage, None, Some(&path))
                .map_err(|_| ResourceError::NotFound(uri.to_string()))?;
            let children = storage
                .list_children(&folder.id)
                .map_err(|e| ResourceError::Store(e.to_string()))?;
            let listing = json!({
                "id": folder.id,
                "path": folder.path,
                "entries": children,
            });
            proto::ResourceContents {
                uri: uri.to_string(),
                mime_type: Some("application/json".into()),
                text: Some(listing.to_string()),
                blob: None,
            }
        }
        Target::File(path) => {
            let file = locate_file(storage, None, Some(&path))
                .map_err(|_| ResourceError::NotFound(uri.to_string()))?;
            let bytes = storage
                .get_file_content(&file.id)
                .map_err(|e| ResourceError::Store(e.to_string()))?;
            match String::from_utf8(bytes) {
                Ok(text) => proto::ResourceContents {
                    uri: uri.to_string(),
                    mime_type: Some("text/plain".into()),
                    text: Some(text),
                    blob: None,
                },
                Err(err) => proto::ResourceContents {
                    uri: uri.to_string(),
                    mime_type: Some("application/octet-stream".into()),
                    text: None,
                    blob: Some(
                        base64::engine::general_purpose::STANDARD.encode(err.into_bytes()),
                    ),
                },
            }
        }
    };
    Ok(proto::ResourceReadResult {
        contents: vec![contents],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::store_with_files;
    use serde_json::Value;

    #[test]
    fn root_listing_names_top_level_children() {
        let store = store_with_files(&[("/docs/a.txt", "alpha"), ("/b.txt", "beta")]);
        let result = read_resource(&store, proto::RESOURCE_ROOT_URI).unwrap();
        let listing: Value =
            serde_json::from_str(result.contents[0].text.as_deref().unwrap()).unwrap();
        let names: Vec<&str> = listing["entries"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["name"].as_str())
            .collect();
        assert!(names.contains(&"docs"));
        assert!(names.contains(&"b.txt"));
    }

    #[test]
    fn files_come_back_as_text_or_blob() {
        let store = store_with_files(&[("/docs/a.txt", "alpha")]);
        let text = read_resource(&store, "cloudfs://files/docs/a.txt").unwrap();
        assert_eq!(text.contents[0].text.as_deref(), Some("alpha"));

        let parent = store.resolve_path("/docs").unwrap().unwrap();
        store.upload_file(&parent, "raw.bin", &[0xff, 0x00]).unwrap();
        let blob = read_resource(&store, "cloudfs://files/docs/raw.bin").unwrap();
        assert_eq!(blob.contents[0].blob.as_deref(), Some("/wA="));
    }

    #[test]
    fn rejects_unknown_and_missing_uris() {
        let store = store_with_files(&[]);
        assert!(matches!(
            read_resource(&store, "https://example.com"),
            Err(ResourceError::Unsupported(_))
        ));
        assert!(matches!(
            read_resource(&store, "cloudfs://files/nope.txt"),
            Err(ResourceError::NotFound(_))
        ));
    }
}
