//! Tool routing: one flat namespace of tool names, each mapped to the
//! backend that owns it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use quill_core::{ToolCallOutcome, ToolCallRequest, ToolInvoker, ToolOutput, ToolSchema};

use crate::backend::ToolBackend;
use crate::error::{BackendError, Result};
use crate::protocol::flatten_content;

struct RegisteredTool {
    backend: Arc<dyn ToolBackend>,
    schema: ToolSchema,
}

/// Maps tool names to backends and dispatches calls.
///
/// Registration rejects name collisions; lookup at call time is lock-free.
#[derive(Default)]
pub struct ToolRouter {
    tools: DashMap<String, RegisteredTool>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query a backend for its tools and claim each name in the shared
    /// namespace. Fails on the first name already claimed by another
    /// backend, leaving earlier registrations from this call in place.
    pub async fn register_backend(&self, backend: Arc<dyn ToolBackend>) -> Result<usize> {
        let tools = backend.list_tools().await?;
        let mut registered = 0;

        for tool in tools {
            let schema = ToolSchema::function(
                tool.name.clone(),
                tool.description.clone(),
                tool.input_schema.clone(),
            );
            let entry = RegisteredTool {
                backend: Arc::clone(&backend),
                schema,
            };
            match self.tools.entry(tool.name.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(BackendError::DuplicateTool(tool.name));
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(entry);
                    registered += 1;
                }
            }
        }

        info!(
            backend = backend.name(),
            tools = registered,
            "registered backend tools"
        );
        Ok(registered)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

#[async_trait]
impl ToolInvoker for ToolRouter {
    async fn invoke(&self, request: &ToolCallRequest) -> ToolCallOutcome {
        let result = match self.tools.get(&request.name) {
            Some(entry) => {
                match entry
                    .backend
                    .call(&request.name, request.arguments.clone())
                    .await
                {
                    Ok(call) => {
                        let text = flatten_content(&call.content);
                        if call.is_error {
                            ToolOutput::error(text)
                        } else {
                            ToolOutput::success(text)
                        }
                    }
                    Err(e) => {
                        warn!(tool = %request.name, "tool call failed: {}", e);
                        ToolOutput::error(format!("Tool '{}' failed: {}", request.name, e))
                    }
                }
            }
            None => {
                warn!(tool = %request.name, "no backend for tool");
                ToolOutput::error(format!("Cannot find servers for tool {}", request.name))
            }
        };

        ToolCallOutcome {
            request_id: request.id.clone(),
            name: request.name.clone(),
            arguments: request.arguments.clone(),
            result,
        }
    }

    fn list_tools(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .iter()
            .map(|entry| entry.value().schema.clone())
            .collect();
        schemas.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::protocol::{BackendTool, CallResult, ContentItem};

    struct FakeBackend {
        name: String,
        tools: Vec<BackendTool>,
        fail_calls: bool,
    }

    impl FakeBackend {
        fn with_tools(name: &str, tool_names: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                tools: tool_names
                    .iter()
                    .map(|n| BackendTool {
                        name: n.to_string(),
                        description: format!("{n} tool"),
                        input_schema: json!({"type": "object"}),
                    })
                    .collect(),
                fail_calls: false,
            })
        }
    }

    #[async_trait]
    impl ToolBackend for FakeBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_tools(&self) -> Result<Vec<BackendTool>> {
            Ok(self.tools.clone())
        }

        async fn call(&self, name: &str, arguments: Value) -> Result<CallResult> {
            if self.fail_calls {
                return Err(BackendError::Disconnected);
            }
            Ok(CallResult {
                content: vec![ContentItem::Text {
                    text: format!("{name}({arguments})"),
                }],
                is_error: false,
            })
        }
    }

    fn request_for(name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: "call_1".to_string(),
            index: 0,
            name: name.to_string(),
            arguments: json!({"city": "London"}),
        }
    }

    #[tokio::test]
    async fn routes_calls_to_the_owning_backend() {
        let router = ToolRouter::new();
        router
            .register_backend(FakeBackend::with_tools("weather", &["get_weather"]))
            .await
            .expect("register");

        let outcome = router.invoke(&request_for("get_weather")).await;
        assert!(!outcome.result.is_error);
        assert!(outcome.result.text.contains("get_weather"));
        assert_eq!(outcome.request_id, "call_1");
    }

    #[tokio::test]
    async fn unknown_tool_yields_an_error_outcome_not_a_panic() {
        let router = ToolRouter::new();
        let outcome = router.invoke(&request_for("missing")).await;
        assert!(outcome.result.is_error);
        assert_eq!(
            outcome.result.text,
            "Cannot find servers for tool missing"
        );
    }

    #[tokio::test]
    async fn duplicate_tool_names_are_rejected() {
        let router = ToolRouter::new();
        router
            .register_backend(FakeBackend::with_tools("a", &["search"]))
            .await
            .expect("first registration");

        let err = router
            .register_backend(FakeBackend::with_tools("b", &["search"]))
            .await
            .expect_err("second registration must fail");
        assert!(matches!(err, BackendError::DuplicateTool(name) if name == "search"));
    }

    #[tokio::test]
    async fn backend_failures_become_error_outcomes() {
        let router = ToolRouter::new();
        let backend = Arc::new(FakeBackend {
            name: "flaky".to_string(),
            tools: vec![BackendTool {
                name: "lookup".to_string(),
                description: String::new(),
                input_schema: json!({"type": "object"}),
            }],
            fail_calls: true,
        });
        router.register_backend(backend).await.expect("register");

        let outcome = router.invoke(&request_for("lookup")).await;
        assert!(outcome.result.is_error);
        assert!(outcome.result.text.contains("lookup"));
    }

    #[tokio::test]
    async fn listed_schemas_are_sorted_by_name() {
        let router = ToolRouter::new();
        router
            .register_backend(FakeBackend::with_tools("multi", &["zeta", "alpha"]))
            .await
            .expect("register");

        let names: Vec<String> = router
            .list_tools()
            .into_iter()
            .map(|s| s.function.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
