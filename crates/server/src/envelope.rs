//! Shapes handler results into the `tools/call` response envelope.

use mcp_cloudfs_proto as proto;
use serde_json::{json, Map, Value};

/// Structured fields copied to the top level of the envelope.
pub const PROMOTED_FIELDS: [&str; 7] = [
    "results",
    "totalResults",
    "tree",
    "path",
    "folderId",
    "answer",
    "citations",
];

/// Envelope keys a handler body never contributes to the text projection.
const ENVELOPE_FIELDS: [&str; 3] = ["content", "structuredContent", "isError"];

/// What a tool handler hands back to the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutcome {
    pub body: Map<String, Value>,
    pub structured: Option<Value>,
    pub is_error: bool,
}

impl ToolOutcome {
    /// A body-only result; `success: false` marks it as an error.
    pub fn body(value: Value) -> Self {
        let body = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        let is_error = body.get("success").and_then(Value::as_bool) == Some(false);
        Self {
            body,
            structured: None,
            is_error,
        }
    }

    /// A successful result carrying a structured payload.
    pub fn structured(payload: Value) -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(true));
        Self {
            body,
            structured: Some(payload),
            is_error: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::body(json!({ "success": false, "error": message.into() }))
    }

    pub fn text(&self) -> String {
        match &self.structured {
            Some(payload) => payload.to_string(),
            None => {
                let visible: Map<String, Value> = self
                    .body
                    .iter()
                    .filter(|(key, _)| !ENVELOPE_FIELDS.contains(&key.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Value::Object(visible).to_string()
            }
        }
    }

    /// Builds the `tools/call` result: body fields, a text projection, the
    /// structured payload, `isError` on failure and the promoted aliases. A
    /// field already in the body always wins over an alias.
    pub fn into_result(self) -> Value {
        let text = self.text();
        let ToolOutcome {
            mut body,
            structured,
            is_error,
        } = self;
        body.insert(
            "content".into(),
            json!([proto::ToolResponseContent::text(text)]),
        );
        if is_error {
            body.insert("isError".into(), Value::Bool(true));
        }
        if let Some(payload) = structured {
            if let Value::Object(fields) = &payload {
                for key in PROMOTED_FIELDS {
                    if body.contains_key(key) {
                        continue;
                    }
                    if let Some(value) = fields.get(key) {
                        body.insert(key.to_string(), value.clone());
                    }
                }
            }
            body.insert("structuredContent".into(), payload);
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_fields_are_promoted() {
        let outcome = ToolOutcome::structured(json!({
            "results": [1, 2],
            "totalResults": 9,
            "returned": 2
        }));
        let result = outcome.into_result();
        assert_eq!(result["results"], json!([1, 2]));
        assert_eq!(result["totalResults"], json!(9));
        assert!(result.get("returned").is_none());
        assert_eq!(result["structuredContent"]["returned"], json!(2));
        assert_eq!(result["success"], json!(true));
        let text = result["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["totalResults"], json!(9));
    }

    #[test]
    fn body_fields_win_over_aliases() {
        let mut outcome = ToolOutcome::structured(json!({ "path": "/structured" }));
        outcome.body.insert("path".into(), json!("/raw"));
        let result = outcome.into_result();
        assert_eq!(result["path"], json!("/raw"));
        assert_eq!(result["structuredContent"]["path"], json!("/structured"));
    }

    #[test]
    fn failed_body_sets_is_error() {
        let result = ToolOutcome::failure("File not found: /x").into_result();
        assert_eq!(result["isError"], json!(true));
        assert_eq!(result["success"], json!(false));
        assert!(result.get("structuredContent").is_none());
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("File not found: /x"));
    }

    #[test]
    fn successful_body_has_no_error_flag() {
        let result = ToolOutcome::body(json!({ "success": true, "saved": 1 })).into_result();
        assert!(result.get("isError").is_none());
        assert_eq!(result["saved"], json!(1));
    }
}
