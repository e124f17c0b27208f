pub mod accumulator;
pub mod invoker;
pub mod types;

pub use accumulator::ToolCallAccumulator;
pub use invoker::ToolInvoker;
pub use types::{
    FunctionCall, FunctionSchema, ToolCall, ToolCallFragment, ToolCallOutcome, ToolCallRequest,
    ToolOutput, ToolSchema,
};
