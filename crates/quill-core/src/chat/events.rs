use serde::{Deserialize, Serialize};

use crate::tools::ToolOutput;

/// Events surfaced to the caller (CLI, test harness) while an exchange
/// runs. Answer/reasoning deltas and tool-call-requested events preserve
/// stream order; tool-call results arrive in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    AnswerDelta {
        content: String,
    },

    ReasoningDelta {
        content: String,
    },

    ToolCallRequested {
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    ToolCallResult {
        tool_call_id: String,
        tool_name: String,
        result: ToolOutput,
    },

    /// Emitted after each round that dispatched tool calls; the exchange
    /// will issue another completion request.
    RoundComplete {
        round: usize,
        tool_calls: usize,
    },

    Complete,

    Error {
        message: String,
    },
}
