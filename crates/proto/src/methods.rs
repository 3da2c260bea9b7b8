use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";
pub const METHOD_RESOURCE_TEMPLATES_LIST: &str = "resources/templates/list";
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
pub const METHOD_PROMPTS_GET: &str = "prompts/get";
/// Prefix of client notifications, which never receive a response.
pub const NOTIFICATION_PREFIX: &str = "notifications/";

pub const TOOL_SAVE_DOCUMENTS: &str = "save_documents";
pub const TOOL_RETRIEVE_DOCUMENTS: &str = "retrieve_documents";
pub const TOOL_READ_DOCUMENT: &str = "read_document";
pub const TOOL_MANAGE_FOLDERS: &str = "manage_folders";
pub const TOOL_EXPLORE_STORAGE: &str = "explore_storage";
pub const TOOL_SHARE_CONTENT: &str = "share_content";
pub const TOOL_SEARCH_CONTENT: &str = "search_content";
pub const TOOL_ANALYZE_CONTENT: &str = "analyze_content";

pub const PROMPT_ORGANIZE_FOLDER: &str = "organize_folder";
pub const PROMPT_SUMMARIZE_DOCUMENT: &str = "summarize_document";
pub const PROMPT_FIND_DOCUMENTS: &str = "find_documents";

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub const RESOURCE_ROOT_URI: &str = "cloudfs://folders/root";
pub const RESOURCE_FOLDER_TEMPLATE: &str = "cloudfs://folders/{path}";
pub const RESOURCE_FILE_TEMPLATE: &str = "cloudfs://files/{path}";
pub const RESOURCE_FOLDER_PREFIX: &str = "cloudfs://folders/";
pub const RESOURCE_FILE_PREFIX: &str = "cloudfs://files/";

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Option<serde_json::Value>,
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: serde_json::Value,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
pub struct ListParams {
    #[serde(rename = "cursor", default)]
    pub cursor: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
    #[serde(
        rename = "nextCursor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_cursor: Option<String>,
}

/// `tools/call` parameters. Older clients send `toolName`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct CallToolParams {
    #[serde(alias = "toolName")]
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ToolResponseContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ToolResponseContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResourceListResult {
    pub resources: Vec<ResourceDescriptor>,
    #[serde(
        rename = "nextCursor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
pub struct ResourceTemplateDescriptor {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResourceTemplateListResult {
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResourceReadParams {
    pub uri: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ResourceReadResult {
    pub contents: Vec<ResourceContents>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListPromptsResult {
    pub prompts: Vec<PromptDescriptor>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
pub struct GetPromptParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PromptMessage {
    pub role: String,
    pub content: ToolResponseContent,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetPromptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_tool_params_accept_legacy_tool_name() {
        let parsed: CallToolParams =
            serde_json::from_value(json!({"toolName": "read_document", "arguments": {"path": "/a"}}))
                .expect("parse legacy params");
        assert_eq!(parsed.name, TOOL_READ_DOCUMENT);
        assert_eq!(parsed.arguments, json!({"path": "/a"}));
    }

    #[test]
    fn call_tool_params_default_arguments_to_null() {
        let parsed: CallToolParams =
            serde_json::from_value(json!({"name": "search_content"})).expect("parse params");
        assert!(parsed.arguments.is_null());
    }

    #[test]
    fn resource_template_serializes_camel_case() {
        let value = serde_json::to_value(ResourceTemplateDescriptor {
            uri_template: RESOURCE_FILE_TEMPLATE.into(),
            name: "file".into(),
            description: None,
            mime_type: Some("text/plain".into()),
        })
        .expect("serialize template");
        assert_eq!(value["uriTemplate"], json!("cloudfs://files/{path}"));
        assert_eq!(value["mimeType"], json!("text/plain"));
        assert!(value.get("description").is_none());
    }
}
