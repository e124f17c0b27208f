use async_trait::async_trait;

use crate::tools::{ToolCallOutcome, ToolCallRequest, ToolSchema};

/// Executes a single tool call against whatever backend owns the tool.
///
/// Infallible by contract: unknown tools and backend failures come back
/// as error-flagged [`ToolCallOutcome`]s so one bad call never aborts its
/// siblings or the round. Latency is backend-defined; callers own
/// concurrency and timeout policy.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, request: &ToolCallRequest) -> ToolCallOutcome;

    /// Descriptors for every tool reachable through this invoker, as
    /// advertised to the model.
    fn list_tools(&self) -> Vec<ToolSchema>;
}
