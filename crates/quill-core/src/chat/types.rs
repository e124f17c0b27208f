use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::ToolCall;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the conversation history.
///
/// `id` and `created_at` are internal bookkeeping and never leave the
/// process; the wire representation sent to the model is built separately
/// and omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "generate_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(Role::System, content.into(), None, None)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Role::User, content.into(), None, None)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self::build(Role::Assistant, content.into(), tool_calls, None)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(Role::Tool, content.into(), None, Some(tool_call_id.into()))
    }

    fn build(
        role: Role,
        content: String,
        tool_calls: Option<Vec<ToolCall>>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            role,
            content,
            tool_calls,
            tool_call_id,
            created_at: Utc::now(),
        }
    }
}

/// Ordered message history for one chat.
///
/// Owned and mutated exclusively by the exchange driver; everything else
/// only ever reads a snapshot of `messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.add_message(Message::system(prompt));
        conversation
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionCall;

    #[test]
    fn tool_result_carries_back_reference() {
        let message = Message::tool_result("call_42", "sunny, 21C");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_42"));
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn message_serialization_skips_absent_tool_fields() {
        let message = Message::user("hello");
        let json = serde_json::to_value(&message).expect("serialize");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn assistant_message_round_trips_tool_calls() {
        let calls = vec![ToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "add".to_string(),
                arguments: "{\"a\":1,\"b\":2}".to_string(),
            },
        }];
        let message = Message::assistant("", Some(calls));
        let json = serde_json::to_string(&message).expect("serialize");
        let parsed: Message = serde_json::from_str(&json).expect("deserialize");
        let calls = parsed.tool_calls.expect("tool calls survive round trip");
        assert_eq!(calls[0].function.name, "add");
    }

    #[test]
    fn conversation_append_touches_updated_at() {
        let mut conversation = Conversation::with_system_prompt("You are helpful");
        let before = conversation.updated_at;
        conversation.add_message(Message::user("2+2?"));
        assert_eq!(conversation.messages.len(), 2);
        assert!(conversation.updated_at >= before);
    }
}
