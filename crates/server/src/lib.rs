//! Server runtime: JSON-RPC dispatch of the cloudfs tools over stdio and HTTP.
//!
//! A [`Server`] owns the store, the tool registry and the mutation gate. It is
//! constructed explicitly and handed to a transport; transports only move
//! lines or bodies in and out of [`Server::handle_line`].

mod envelope;
mod http;
mod prompts;
mod registry;
mod resources;
mod tools;

use std::sync::Arc;

use mcp_cloudfs_core::Storage;
use mcp_cloudfs_proto as proto;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

pub use envelope::{ToolOutcome, PROMOTED_FIELDS};
pub use http::{router, HttpOptions, DEFAULT_HEARTBEAT};
pub use registry::{validation_message, ToolKind, ToolRegistry, Validation};

const CODE_PARSE_ERROR: i64 = -32700;
const CODE_INVALID_REQUEST: i64 = -32600;
const CODE_METHOD_NOT_FOUND: i64 = -32601;
const CODE_INVALID_PARAMS: i64 = -32602;
const CODE_INTERNAL: i64 = -32000;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse: {0}")]
    Parse(String),
    #[error("bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcRequest {
    #[serde(default)]
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub(crate) fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{CODE_INTERNAL},"message":"serialize response: {e}"}}}}"#
            )
        })
    }
}

pub struct Server<S> {
    storage: Arc<S>,
    registry: Arc<ToolRegistry>,
    gate: Arc<Mutex<()>>,
}

impl<S> Clone for Server<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            registry: Arc::clone(&self.registry),
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<S> Server<S>
where
    S: Storage + Send + Sync + 'static,
{
    pub fn new(storage: S) -> Result<Self, ServerError> {
        Self::with_shared(Arc::new(storage))
    }

    /// Builds a server over a store the caller keeps a handle to.
    pub fn with_shared(storage: Arc<S>) -> Result<Self, ServerError> {
        Ok(Self {
            storage,
            registry: Arc::new(ToolRegistry::new()?),
            gate: Arc::new(Mutex::new(())),
        })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serves newline-delimited requests from stdin until EOF.
    pub async fn run_stdio(&self) -> Result<(), ServerError> {
        info!("server running (stdio)");
        self.serve_lines(tokio::io::stdin(), tokio::io::stdout())
            .await?;
        info!("stdin closed; stdio server stopped");
        Ok(())
    }

    /// One request per line in, one compact response per line out. Requests
    /// are processed strictly in order.
    pub async fn serve_lines<R, W>(&self, reader: R, mut writer: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                writer.write_all(response.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    /// Handles one raw request. `None` means nothing is written back.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "malformed JSON-RPC line");
                return Some(
                    JsonRpcResponse::err(Value::Null, CODE_PARSE_ERROR, format!("Parse error: {err}"))
                        .to_line(),
                );
            }
        };
        self.handle_value(value).await.map(|resp| resp.to_line())
    }

    pub(crate) async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(req) => self.handle_request(req).await,
            Err(err) => Some(JsonRpcResponse::err(
                id,
                CODE_INVALID_REQUEST,
                format!("Invalid request: {err}"),
            )),
        }
    }

    async fn handle_request(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if req.id.is_none() && req.method.starts_with(proto::NOTIFICATION_PREFIX) {
            debug!(method = %req.method, "notification received");
            return None;
        }
        let id = req.id.clone().unwrap_or(Value::Null);
        debug!(method = %req.method, id = %id, "handling JSON-RPC request");
        let response = match req.method.as_str() {
            proto::METHOD_INITIALIZE => self.handle_initialize(id, req.params),
            proto::METHOD_PING => JsonRpcResponse::ok(id, json!({})),
            proto::METHOD_TOOLS_LIST => self.handle_tools_list(id),
            proto::METHOD_TOOLS_CALL => self.handle_tools_call(id, req.params).await,
            proto::METHOD_RESOURCES_LIST => to_response(id, &resources::list_resources()),
            proto::METHOD_RESOURCES_READ => self.handle_resource_read(id, req.params).await,
            proto::METHOD_RESOURCE_TEMPLATES_LIST => {
                to_response(id, &resources::list_resource_templates())
            }
            proto::METHOD_PROMPTS_LIST => to_response(id, &prompts::list_prompts()),
            proto::METHOD_PROMPTS_GET => handle_prompts_get(id, req.params),
            other => {
                debug!(method = %other, "unknown method");
                JsonRpcResponse::err(id, CODE_METHOD_NOT_FOUND, format!("Method not found: {other}"))
            }
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: proto::InitializeParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return invalid_params(id, e),
        };
        let protocol_version = params
            .protocol_version
            .unwrap_or_else(|| proto::MCP_PROTOCOL_VERSION.to_string());
        if let Some(client) = &params.client_info {
            info!(client = %client.name, protocol_version = %protocol_version, "initialize handshake");
        }
        let result = proto::InitializeResult {
            protocol_version,
            capabilities: json!({
                "tools": { "listChanged": false },
                "resources": { "listChanged": false, "subscribe": false },
                "prompts": { "listChanged": false },
            }),
            server_info: proto::ServerInfo {
                name: "cloudfs".into(),
                title: Some("cloudfs MCP server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(
                "Address files and folders by id or by slash-delimited path. \
                 Use explore_storage to discover the layout before editing."
                    .into(),
            ),
        };
        to_response(id, &result)
    }

    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        let result = proto::ListToolsResult {
            tools: self.registry.definitions(),
            next_cursor: None,
        };
        to_response(id, &result)
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: proto::CallToolParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return invalid_params(id, e),
        };
        let Some(kind) = ToolKind::from_name(&params.name) else {
            debug!(tool = %params.name, "unknown tool");
            return JsonRpcResponse::err(
                id,
                CODE_METHOD_NOT_FOUND,
                format!("Unknown tool: {}", params.name),
            );
        };
        let arguments = match params.arguments {
            Value::Null => json!({}),
            other => other,
        };
        match self.call_tool(kind, arguments).await {
            Ok(outcome) => JsonRpcResponse::ok(id, outcome.into_result()),
            Err(err) => {
                error!(tool = kind.name(), error = %err, "tool dispatch failed");
                JsonRpcResponse::err(id, CODE_INTERNAL, err.to_string())
            }
        }
    }

    /// Validates `arguments` and runs the handler off the async runtime. A
    /// validation failure is a tool-level error and never reaches the store.
    pub async fn call_tool(&self, kind: ToolKind, arguments: Value) -> Result<ToolOutcome, ServerError> {
        if let Validation::Invalid(violations) = self.registry.validate(kind, &arguments)? {
            debug!(tool = kind.name(), violations = violations.len(), "arguments rejected");
            return Ok(ToolOutcome::failure(validation_message(kind.name(), &violations)));
        }
        let storage = Arc::clone(&self.storage);
        let gate = Arc::clone(&self.gate);
        tokio::task::spawn_blocking(move || tools::run(kind, storage.as_ref(), &gate, arguments))
            .await
            .map_err(|join_err| {
                error!(tool = kind.name(), error = %join_err, "tool handler panicked");
                ServerError::Internal(format!("tool {} failed: {join_err}", kind.name()))
            })
    }

    async fn handle_resource_read(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: proto::ResourceReadParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return invalid_params(id, e),
        };
        let storage = Arc::clone(&self.storage);
        let uri = params.uri;
        let read = tokio::task::spawn_blocking(move || {
            resources::read_resource(storage.as_ref(), &uri)
        })
        .await;
        match read {
            Ok(Ok(result)) => to_response(id, &result),
            Ok(Err(err @ resources::ResourceError::Store(_))) => {
                JsonRpcResponse::err(id, CODE_INTERNAL, err.to_string())
            }
            Ok(Err(err)) => invalid_params(id, err.to_string()),
            Err(join_err) => {
                error!(error = %join_err, "resource read panicked");
                JsonRpcResponse::err(id, CODE_INTERNAL, join_err.to_string())
            }
        }
    }
}

fn handle_prompts_get(id: Value, params: Option<Value>) -> JsonRpcResponse {
    let params: proto::GetPromptParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return invalid_params(id, e),
    };
    match prompts::get_prompt(params) {
        Ok(result) => to_response(id, &result),
        Err(err) => invalid_params(id, err.to_string()),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    let value = match params {
        None | Some(Value::Null) => json!({}),
        Some(Value::Array(items)) if items.is_empty() => json!({}),
        Some(other) => other,
    };
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn invalid_params(id: Value, msg: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::err(id, CODE_INVALID_PARAMS, msg)
}

fn to_response<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err(err) => JsonRpcResponse::err(id, CODE_INTERNAL, err.to_string()),
    }
}
