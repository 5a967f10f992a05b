//! Tool trait and registry
//!
//! Tools take one string argument and always answer with text. Faults inside
//! a tool are rendered into that text so the model can see and react to them;
//! nothing a tool does can abort a run.

use crate::error::ComplianceError;
use crate::models::{ToolCallRequest, ToolCallResult, ToolDefinition, ToolOutput};
use crate::retrieval::RetrievalEngine;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod retrieval;
pub mod web;

pub use retrieval::SearchComplianceRulesTool;
pub use web::WebFetchTool;

/// A model-invokable capability.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Name of the single string argument, e.g. `query` or `url`.
    fn parameter(&self) -> &'static str;
    fn parameter_description(&self) -> &'static str;

    /// Must not fail: internal faults become descriptive text.
    async fn invoke(&self, argument: &str) -> ToolOutput;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameter: self.parameter().to_string(),
            parameter_description: self.parameter_description().to_string(),
        }
    }
}

/// Fixed set of tools, built once at startup.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ComplianceError::DuplicateTool(name));
        }

        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Definitions in registration order, for the model gateway.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Resolve and run one call. Unknown tools and timeouts are answered in text.
    pub async fn dispatch(&self, call: &ToolCallRequest, timeout: Duration) -> (ToolCallResult, Vec<String>) {
        let start = Instant::now();

        let Some(tool) = self.get(&call.tool_name) else {
            warn!(tool_name = %call.tool_name, call_id = %call.call_id, "Model requested unknown tool");
            let text = format!(
                "The tool '{}' is unavailable. Available tools: {}.",
                call.tool_name,
                self.list().join(", ")
            );
            return (result_for(call, text), Vec::new());
        };

        let output = match tokio::time::timeout(timeout, tool.invoke(&call.argument)).await {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    tool_name = %call.tool_name,
                    call_id = %call.call_id,
                    timeout_secs = timeout.as_secs(),
                    "Tool call timed out"
                );
                ToolOutput::text(format!(
                    "The tool '{}' timed out after {} seconds.",
                    call.tool_name,
                    timeout.as_secs()
                ))
            }
        };

        debug!(
            tool_name = %call.tool_name,
            call_id = %call.call_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            citations = output.citations.len(),
            "Tool call finished"
        );

        (result_for(call, output.text), output.citations)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn result_for(call: &ToolCallRequest, text: String) -> ToolCallResult {
    ToolCallResult {
        call_id: call.call_id.clone(),
        tool_name: call.tool_name.clone(),
        text,
    }
}

/// Registry with the two compliance tools: database search and live web fetch.
pub fn create_default_registry(retrieval: Arc<RetrievalEngine>, top_k: usize) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(SearchComplianceRulesTool::new(retrieval, top_k)))?;
    registry.register(Arc::new(WebFetchTool::new()?))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the argument"
        }

        fn parameter(&self) -> &'static str {
            "text"
        }

        fn parameter_description(&self) -> &'static str {
            "Text to echo"
        }

        async fn invoke(&self, argument: &str) -> ToolOutput {
            ToolOutput::text(argument)
        }
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn description(&self) -> &'static str {
            "Never finishes in time"
        }

        fn parameter(&self) -> &'static str {
            "query"
        }

        fn parameter_description(&self) -> &'static str {
            "Ignored"
        }

        async fn invoke(&self, _argument: &str) -> ToolOutput {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ToolOutput::text("too late")
        }
    }

    fn call(tool: &str, argument: &str) -> ToolCallRequest {
        ToolCallRequest {
            call_id: "call-1".to_string(),
            tool_name: tool.to_string(),
            argument: argument.to_string(),
        }
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert!(matches!(
            registry.register(Arc::new(EchoTool)),
            Err(ComplianceError::DuplicateTool(_))
        ));
        assert_eq!(registry.definitions().len(), 1);
        assert_eq!(registry.definitions()[0].parameter, "text");
    }

    #[tokio::test]
    async fn test_lookup_is_case_sensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();

        let (result, _) = registry.dispatch(&call("Echo", "hi"), Duration::from_secs(1)).await;
        assert_eq!(result.call_id, "call-1");
        assert!(result.text.contains("unavailable"));

        let (result, _) = registry.dispatch(&call("echo", "hi"), Duration::from_secs(1)).await;
        assert_eq!(result.text, "hi");
    }

    #[tokio::test]
    async fn test_timeout_becomes_text() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool)).unwrap();

        let (result, citations) = registry
            .dispatch(&call("slow", "x"), Duration::from_millis(20))
            .await;
        assert!(result.text.contains("timed out"));
        assert!(citations.is_empty());
    }
}
