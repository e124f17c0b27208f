use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A completed tool call in the OpenAI wire shape, as recorded on an
/// assistant message's `tool_calls` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One partial tool-call delta as decoded from the model stream.
///
/// `index` addresses the call within the current round; `id` and `name`
/// normally appear only on the first fragment for an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// A tool call whose accumulated argument text parsed as JSON and is
/// ready for dispatch. Produced exactly once per stream index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub index: usize,
    pub name: String,
    pub arguments: Value,
}

/// Result payload of one tool invocation. Backend failures and unknown
/// tools come back through here as `is_error` outputs, never as `Err`,
/// so the model can see them and react.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub request_id: String,
    pub name: String,
    pub arguments: Value,
    pub result: ToolOutput,
}

/// Tool descriptor advertised to the model, OpenAI `tools` entry shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            schema_type: "function".to_string(),
            function: FunctionSchema {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}
