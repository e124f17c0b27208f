pub mod chat;
pub mod tools;

pub use chat::error::ChatError;
pub use chat::events::ChatEvent;
pub use chat::types::{Conversation, Message, Role};
pub use tools::accumulator::ToolCallAccumulator;
pub use tools::invoker::ToolInvoker;
pub use tools::types::{
    FunctionCall, FunctionSchema, ToolCall, ToolCallFragment, ToolCallOutcome, ToolCallRequest,
    ToolOutput, ToolSchema,
};
