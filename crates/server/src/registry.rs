//! Static tool catalog and argument validation.
//!
//! Every tool is a [`ToolKind`] variant. Schemas are derived from the proto
//! argument types, then extended with `anyOf` alternative-requirement groups
//! that serde types cannot express. Each schema compiles into a validator the
//! first time its tool is called and that validator is reused afterwards.

use std::sync::OnceLock;

use mcp_cloudfs_proto as proto;
use schemars::{schema::RootSchema, schema_for};
use serde_json::{json, Value};
use tracing::debug;

use crate::ServerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SaveDocuments,
    RetrieveDocuments,
    ReadDocument,
    ManageFolders,
    ExploreStorage,
    ShareContent,
    SearchContent,
    AnalyzeContent,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::SaveDocuments,
        ToolKind::RetrieveDocuments,
        ToolKind::ReadDocument,
        ToolKind::ManageFolders,
        ToolKind::ExploreStorage,
        ToolKind::ShareContent,
        ToolKind::SearchContent,
        ToolKind::AnalyzeContent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::SaveDocuments => proto::TOOL_SAVE_DOCUMENTS,
            ToolKind::RetrieveDocuments => proto::TOOL_RETRIEVE_DOCUMENTS,
            ToolKind::ReadDocument => proto::TOOL_READ_DOCUMENT,
            ToolKind::ManageFolders => proto::TOOL_MANAGE_FOLDERS,
            ToolKind::ExploreStorage => proto::TOOL_EXPLORE_STORAGE,
            ToolKind::ShareContent => proto::TOOL_SHARE_CONTENT,
            ToolKind::SearchContent => proto::TOOL_SEARCH_CONTENT,
            ToolKind::AnalyzeContent => proto::TOOL_ANALYZE_CONTENT,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn index(&self) -> usize {
        *self as usize
    }

    /// Tools that write to the store run under the server's mutation gate.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ToolKind::SaveDocuments | ToolKind::ManageFolders | ToolKind::ShareContent
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::SaveDocuments => {
                "Save one or more documents by path. Missing folders are created unless \
                 createFolders is false; existing files are only replaced with overwrite=true."
            }
            ToolKind::RetrieveDocuments => {
                "Fetch the content of one or more documents by fileId or path."
            }
            ToolKind::ReadDocument => {
                "Read a text document, optionally restricted to a 1-based inclusive line window."
            }
            ToolKind::ManageFolders => {
                "Create, move, rename or delete folders in a batch. Each operation succeeds or \
                 fails on its own."
            }
            ToolKind::ExploreStorage => {
                "Return the folder tree below a path or folder id, bounded by maxDepth."
            }
            ToolKind::ShareContent => {
                "Manage shared links and collaborators on files and folders."
            }
            ToolKind::SearchContent => {
                "Search files and folders by name, extension, ancestry and optionally content."
            }
            ToolKind::AnalyzeContent => {
                "Ask a question about one or more documents and get an answer with citations."
            }
        }
    }

    fn root_schema(&self) -> RootSchema {
        match self {
            ToolKind::SaveDocuments => schema_for!(proto::SaveDocumentsArgs),
            ToolKind::RetrieveDocuments => schema_for!(proto::RetrieveDocumentsArgs),
            ToolKind::ReadDocument => schema_for!(proto::ReadDocumentArgs),
            ToolKind::ManageFolders => schema_for!(proto::ManageFoldersArgs),
            ToolKind::ExploreStorage => schema_for!(proto::ExploreStorageArgs),
            ToolKind::ShareContent => schema_for!(proto::ShareContentArgs),
            ToolKind::SearchContent => schema_for!(proto::SearchContentArgs),
            ToolKind::AnalyzeContent => schema_for!(proto::AnalyzeContentArgs),
        }
    }

    /// `(JSON pointer of the object schema, alternative required sets)`.
    fn alternatives(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            ToolKind::RetrieveDocuments => &[("/definitions/DocumentSelector", &["fileId", "path"])],
            ToolKind::ReadDocument => &[("", &["fileId", "path"])],
            ToolKind::ManageFolders => &[("/definitions/FolderOperation", &["path", "folderId"])],
            ToolKind::ShareContent => &[("/definitions/ShareOperation", &["itemId", "path"])],
            ToolKind::AnalyzeContent => &[("", &["fileIds", "paths"])],
            ToolKind::SaveDocuments | ToolKind::ExploreStorage | ToolKind::SearchContent => &[],
        }
    }

    pub fn input_schema(&self) -> Result<Value, ServerError> {
        let mut schema = serde_json::to_value(self.root_schema())
            .map_err(|e| ServerError::Parse(e.to_string()))?;
        for (pointer, fields) in self.alternatives() {
            require_any_of(&mut schema, pointer, fields)?;
        }
        Ok(schema)
    }
}

/// Adds `anyOf: [{required:[a]}, {required:[b]}, ...]` to the object schema
/// at `pointer`.
fn require_any_of(schema: &mut Value, pointer: &str, fields: &[&str]) -> Result<(), ServerError> {
    let target = schema
        .pointer_mut(pointer)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ServerError::Parse(format!("schema has no object at '{pointer}'")))?;
    let groups: Vec<Value> = fields
        .iter()
        .map(|field| json!({ "required": [field] }))
        .collect();
    target.insert("anyOf".into(), Value::Array(groups));
    Ok(())
}

/// Outcome of validating arguments against a tool schema.
#[derive(Debug)]
pub enum Validation {
    Valid,
    /// One human-readable line per violation.
    Invalid(Vec<String>),
}

struct ToolSpec {
    kind: ToolKind,
    schema: Value,
    validator: OnceLock<Result<jsonschema::Validator, String>>,
}

pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Result<Self, ServerError> {
        let specs = ToolKind::ALL
            .into_iter()
            .map(|kind| {
                Ok(ToolSpec {
                    kind,
                    schema: kind.input_schema()?,
                    validator: OnceLock::new(),
                })
            })
            .collect::<Result<Vec<_>, ServerError>>()?;
        Ok(Self { specs })
    }

    pub fn definitions(&self) -> Vec<proto::ToolDefinition> {
        self.specs
            .iter()
            .map(|spec| proto::ToolDefinition {
                name: spec.kind.name().to_string(),
                description: Some(spec.kind.description().to_string()),
                input_schema: spec.schema.clone(),
            })
            .collect()
    }

    fn spec(&self, kind: ToolKind) -> &ToolSpec {
        &self.specs[kind.index()]
    }

    pub fn is_compiled(&self, kind: ToolKind) -> bool {
        self.spec(kind).validator.get().is_some()
    }

    /// Validates `arguments`, collecting every violation rather than the first.
    pub fn validate(&self, kind: ToolKind, arguments: &Value) -> Result<Validation, ServerError> {
        let spec = self.spec(kind);
        let compiled = spec.validator.get_or_init(|| {
            debug!(tool = kind.name(), "compiling argument schema");
            jsonschema::validator_for(&spec.schema).map_err(|e| e.to_string())
        });
        let validator = compiled
            .as_ref()
            .map_err(|e| ServerError::Parse(format!("schema for {}: {e}", kind.name())))?;
        let violations: Vec<String> = validator
            .iter_errors(arguments)
            .map(|err| {
                let location = err.instance_path.to_string();
                let location = if location.is_empty() {
                    "(root)".to_string()
                } else {
                    location
                };
                format!("- {location}: {err}")
            })
            .collect();
        if violations.is_empty() {
            Ok(Validation::Valid)
        } else {
            Ok(Validation::Invalid(violations))
        }
    }
}

/// Message reported to the caller when arguments fail validation.
pub fn validation_message(tool: &str, violations: &[String]) -> String {
    format!("Invalid arguments for tool {tool}:\n{}", violations.join("\n"))
}
