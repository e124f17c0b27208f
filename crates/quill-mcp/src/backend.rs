use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::{BackendTool, CallResult};

/// A connected tool server.
///
/// Implementations own the transport; callers only see the tool surface.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Configured name of the backend, used in logs and error messages.
    fn name(&self) -> &str;

    /// Tools this backend exposes.
    async fn list_tools(&self) -> Result<Vec<BackendTool>>;

    /// Invoke one of this backend's tools.
    async fn call(&self, name: &str, arguments: Value) -> Result<CallResult>;
}
