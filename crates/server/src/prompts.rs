//! Static prompt catalog.

use mcp_cloudfs_proto as proto;
use serde_json::{Map, Value};

struct PromptSpec {
    name: &'static str,
    description: &'static str,
    /// `(name, description, required)`
    arguments: &'static [(&'static str, &'static str, bool)],
}

const PROMPTS: [PromptSpec; 3] = [
    PromptSpec {
        name: proto::PROMPT_ORGANIZE_FOLDER,
        description: "Suggest a cleaner structure for a folder and apply it with manage_folders.",
        arguments: &[("path", "Folder to organize", true)],
    },
    PromptSpec {
        name: proto::PROMPT_SUMMARIZE_DOCUMENT,
        description: "Summarize a stored document.",
        arguments: &[("path", "Document path", true)],
    },
    PromptSpec {
        name: proto::PROMPT_FIND_DOCUMENTS,
        description: "Locate documents about a topic.",
        arguments: &[
            ("topic", "What to look for", true),
            ("path", "Folder to search below", false),
        ],
    },
];

#[derive(Debug, PartialEq, Eq)]
pub enum PromptError {
    MissingName,
    Unknown(String),
    MissingArgument { prompt: String, argument: String },
}

impl std::fmt::Display for PromptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptError::MissingName => f.write_str("prompt name is required"),
            PromptError::Unknown(name) => write!(f, "Unknown prompt: {name}"),
            PromptError::MissingArgument { prompt, argument } => {
                write!(f, "prompt {prompt} requires argument '{argument}'")
            }
        }
    }
}

pub fn list_prompts() -> proto::ListPromptsResult {
    proto::ListPromptsResult {
        prompts: PROMPTS
            .iter()
            .map(|spec| proto::PromptDescriptor {
                name: spec.name.to_string(),
                description: Some(spec.description.to_string()),
                arguments: spec
                    .arguments
                    .iter()
                    .map(|(name, description, required)| proto::PromptArgument {
                        name: name.to_string(),
                        description: Some(description.to_string()),
                        required: *required,
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub fn get_prompt(params: proto::GetPromptParams) -> Result<proto::GetPromptResult, PromptError> {
    let name = params
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(PromptError::MissingName)?;
    let spec = PROMPTS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| PromptError::Unknown(name.to_string()))?;
    let arguments = params.arguments.unwrap_or_default();
    for (arg, _, required) in spec.arguments {
        if *required && argument(&arguments, arg).is_none() {
            return Err(PromptError::MissingArgument {
                prompt: spec.name.to_string(),
                argument: arg.to_string(),
            });
        }
    }
    let text = render(spec.name, &arguments);
    Ok(proto::GetPromptResult {
        description: Some(spec.description.to_string()),
        messages: vec![proto::PromptMessage {
            role: "user".into(),
            content: proto::ToolResponseContent::text(text),
        }],
    })
}

fn argument<'a>(arguments: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn render(prompt: &str, arguments: &Map<String, Value>) -> String {
    let path = argument(arguments, "path").unwrap_or("/");
    match prompt {
        proto::PROMPT_ORGANIZE_FOLDER => format!(
            "Use explore_storage on {path} with maxDepth 3 to review its layout, propose a \
             clearer folder structure, then apply it with manage_folders."
        ),
        proto::PROMPT_SUMMARIZE_DOCUMENT => format!(
            "Use read_document to read {path} and write a concise summary of its key points."
        ),
        _ => {
            let topic = argument(arguments, "topic").unwrap_or_default();
            format!(
                "Use search_content with query \"{topic}\" and ancestorPaths [\"{path}\"] \
                 (set includeContent to true) and list the most relevant documents."
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> proto::GetPromptParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn catalog_lists_three_prompts() {
        let names: Vec<String> = list_prompts().prompts.into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec!["organize_folder", "summarize_document", "find_documents"]
        );
    }

    #[test]
    fn renders_arguments_into_the_message() {
        let result = get_prompt(params(json!({
            "name": "find_documents",
            "arguments": { "topic": "budget", "path": "/finance" }
        })))
        .unwrap();
        let text = &result.messages[0].content.text;
        assert!(text.contains("\"budget\""));
        assert!(text.contains("/finance"));
    }

    #[test]
    fn reports_missing_and_unknown_names() {
        assert_eq!(
            get_prompt(params(json!({}))).unwrap_err(),
            PromptError::MissingName
        );
        assert_eq!(
            get_prompt(params(json!({ "name": "nope" }))).unwrap_err(),
            PromptError::Unknown("nope".into())
        );
        assert!(matches!(
            get_prompt(params(json!({ "name": "summarize_document" }))),
            Err(PromptError::MissingArgument { .. })
        ));
    }
}
