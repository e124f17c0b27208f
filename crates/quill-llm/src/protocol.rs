//! OpenAI-compatible chat-completions wire protocol.
//!
//! Request bodies are built without leaking internal `Message` fields
//! (`id` / `created_at`), and incoming stream chunks are classified into
//! [`StreamEvent`]s. Classification is stateless: merging partial
//! tool-call fragments is the accumulator's job.

use serde::Deserialize;
use serde_json::{json, Value};

use quill_core::{Message, Role, ToolCallFragment, ToolSchema};

use crate::provider::Result;

/// One classified unit of the model's incremental response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Answer(String),
    Reasoning(String),
    ToolCall(ToolCallFragment),
}

/// Convert history messages to the OpenAI-compatible JSON array.
pub fn messages_to_wire_json(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let mut msg = json!({
                "role": role,
                "content": m.content,
            });

            if let Some(tool_call_id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(tool_call_id);
            }

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls);
            }

            msg
        })
        .collect()
}

/// Thinking-mode knobs forwarded to the endpoint unmodified.
#[derive(Debug, Clone, Copy)]
pub struct ThinkingOptions {
    pub enabled: bool,
    pub budget_tokens: u32,
}

/// Build the streaming chat request body. Parallel tool calls are always
/// enabled; the endpoint decides whether to use them.
pub fn build_chat_body(
    model: &str,
    messages: &[Message],
    tools: &[ToolSchema],
    max_tokens: Option<u32>,
    thinking: Option<ThinkingOptions>,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages_to_wire_json(messages),
        "stream": true,
        "tools": tools.iter().map(|t| json!(t)).collect::<Vec<_>>(),
        "tool_choice": "auto",
        "parallel_tool_calls": true,
    });

    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if let Some(thinking) = thinking {
        body["enable_thinking"] = json!(thinking.enabled);
        body["thinking_budget"] = json!(thinking.budget_tokens);
    }

    body
}

// --- streaming chunk decoding ---

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[allow(dead_code)]
    id: Option<String>,
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
    // Non-standard field used by thinking-capable endpoints.
    reasoning_content: Option<String>,
    #[allow(dead_code)]
    role: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "type")]
    call_type: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Classify one chunk into zero or more [`StreamEvent`]s.
///
/// Reasoning text takes precedence over answer text when a chunk somehow
/// carries both. A tool-call delta with neither name nor argument text is
/// the end-of-batch marker some endpoints emit: the rest of that chunk's
/// batch is dropped.
pub fn decode_chunk(chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Vec::new();
    };
    let delta = choice.delta;

    if let Some(reasoning) = delta.reasoning_content {
        if !reasoning.is_empty() {
            return vec![StreamEvent::Reasoning(reasoning)];
        }
    }

    let mut events = Vec::new();

    if let Some(content) = delta.content {
        if !content.is_empty() {
            events.push(StreamEvent::Answer(content));
        }
    }

    if let Some(tool_calls) = delta.tool_calls {
        for tc in tool_calls {
            let name = tc
                .function
                .as_ref()
                .and_then(|f| f.name.clone())
                .filter(|n| !n.is_empty());
            let arguments = tc
                .function
                .as_ref()
                .and_then(|f| f.arguments.clone())
                .unwrap_or_default();

            if name.is_none() && arguments.is_empty() {
                // Batch terminator.
                break;
            }

            events.push(StreamEvent::ToolCall(ToolCallFragment {
                index: tc.index,
                id: tc.id.filter(|id| !id.is_empty()),
                name,
                arguments,
            }));
        }
    }

    events
}

/// Decode one SSE `data:` payload. `"[DONE]"` yields no events; invalid
/// JSON is an error (strict OpenAI behavior).
pub fn decode_sse_data(data: &str) -> Result<Vec<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return Ok(Vec::new());
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    Ok(decode_chunk(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{FunctionCall, ToolCall};

    fn decode(data: &str) -> Vec<StreamEvent> {
        decode_sse_data(data).expect("valid chunk")
    }

    #[test]
    fn answer_deltas_decode_one_event_each_in_order() {
        let payloads = [
            r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":"!"},"finish_reason":"stop"}]}"#,
        ];

        let events: Vec<StreamEvent> = payloads.iter().flat_map(|p| decode(p)).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Answer("Hel".to_string()),
                StreamEvent::Answer("lo".to_string()),
                StreamEvent::Answer("!".to_string()),
            ]
        );
    }

    #[test]
    fn reasoning_takes_precedence_over_answer_text() {
        let events = decode(
            r#"{"choices":[{"delta":{"reasoning_content":"thinking...","content":"ignored"},"finish_reason":null}]}"#,
        );
        assert_eq!(events, vec![StreamEvent::Reasoning("thinking...".to_string())]);
    }

    #[test]
    fn empty_deltas_yield_nothing() {
        assert!(decode(r#"{"choices":[{"delta":{"content":""},"finish_reason":null}]}"#).is_empty());
        assert!(decode(r#"{"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#).is_empty());
        assert!(decode(r#"{"choices":[]}"#).is_empty());
    }

    #[test]
    fn tool_call_deltas_preserve_declared_index() {
        let events = decode(
            r#"{"choices":[{"delta":{"tool_calls":[
                {"index":0,"id":"call_a","type":"function","function":{"name":"add","arguments":""}},
                {"index":1,"id":"call_b","type":"function","function":{"name":"mul","arguments":""}}
            ]},"finish_reason":null}]}"#,
        );

        match (&events[0], &events[1]) {
            (StreamEvent::ToolCall(a), StreamEvent::ToolCall(b)) => {
                assert_eq!(a.index, 0);
                assert_eq!(a.name.as_deref(), Some("add"));
                assert_eq!(b.index, 1);
                assert_eq!(b.id.as_deref(), Some("call_b"));
            }
            other => panic!("expected two tool-call events, got {other:?}"),
        }
    }

    #[test]
    fn empty_name_and_arguments_terminates_the_batch() {
        let events = decode(
            r#"{"choices":[{"delta":{"tool_calls":[
                {"index":0,"function":{"name":"","arguments":""}},
                {"index":1,"id":"call_b","function":{"name":"mul","arguments":"{}"}}
            ]},"finish_reason":null}]}"#,
        );
        assert!(events.is_empty(), "entries after the terminator must not be emitted");
    }

    #[test]
    fn done_marker_ends_quietly_and_garbage_errors() {
        assert!(decode_sse_data("[DONE]").expect("done is not an error").is_empty());
        assert!(decode_sse_data("not json").is_err());
    }

    #[test]
    fn chat_body_enables_streaming_and_parallel_tool_calls() {
        let messages = vec![Message::system("You are helpful"), Message::user("2+2?")];
        let tools = vec![ToolSchema::function(
            "add",
            "Add two numbers",
            serde_json::json!({"type":"object","properties":{}}),
        )];

        let body = build_chat_body(
            "qwen3-235b-a22b",
            &messages,
            &tools,
            Some(1000),
            Some(ThinkingOptions {
                enabled: true,
                budget_tokens: 500,
            }),
        );

        assert_eq!(body["stream"], true);
        assert_eq!(body["parallel_tool_calls"], true);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["enable_thinking"], true);
        assert_eq!(body["thinking_budget"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        // Internal bookkeeping must not leak onto the wire.
        assert!(body["messages"][0].get("id").is_none());
        assert!(body["messages"][0].get("created_at").is_none());
    }

    #[test]
    fn wire_json_carries_tool_plumbing() {
        let calls = vec![ToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "add".to_string(),
                arguments: "{\"a\":1}".to_string(),
            },
        }];
        let messages = vec![
            Message::assistant("", Some(calls)),
            Message::tool_result("call_1", "2"),
        ];

        let wire = messages_to_wire_json(&messages);
        assert_eq!(wire[0]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "add");
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "call_1");
    }
}
