//! Tool registry — stores tools by name and dispatches LLM tool-call
//! requests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use skillforge_core::types::ToolDefinition;

use super::base::{Tool, ToolContext};

/// Stores `Arc<dyn Tool>` keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!(tool = tool.name(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Unregister by name. Returns the removed tool, if any.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// LLM-facing definitions, sorted by name. When `allowed` is set, only
    /// that subset is offered.
    pub fn definitions(&self, allowed: Option<&HashSet<String>>) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| allowed.is_none_or(|set| set.contains(t.name())))
            .map(|t| t.to_definition())
            .collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Execute a tool by name. The LLM always gets a string back, even on
    /// failure.
    pub async fn execute(
        &self,
        name: &str,
        params: HashMap<String, serde_json::Value>,
        ctx: &ToolContext,
    ) -> String {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                warn!(tool = name, "tool not found");
                return format!("Error: Tool '{name}' not found");
            }
        };

        match tool.execute(params, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                format!("Error executing {name}: {e}")
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn execute(
            &self,
            params: HashMap<String, Value>,
            _ctx: &ToolContext,
        ) -> anyhow::Result<String> {
            let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(format!("Echo: {text}"))
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(
            &self,
            _params: HashMap<String, Value>,
            _ctx: &ToolContext,
        ) -> anyhow::Result<String> {
            anyhow::bail!("intentional failure")
        }
    }

    #[test]
    fn register_lookup_unregister() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.has("echo"));
        assert_eq!(reg.len(), 1);
        assert!(reg.unregister("echo").is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn definitions_sorted_and_filterable() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));
        reg.register(Arc::new(EchoTool));

        let all = reg.definitions(None);
        let names: Vec<&str> = all.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "fail"]);

        let allowed: HashSet<String> = ["echo".to_string()].into();
        let filtered = reg.definitions(Some(&allowed));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].function.name, "echo");
    }

    #[tokio::test]
    async fn execute_success() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let mut params = HashMap::new();
        params.insert("text".into(), json!("hello"));
        let result = reg.execute("echo", params, &ToolContext::default()).await;
        assert_eq!(result, "Echo: hello");
    }

    #[tokio::test]
    async fn execute_not_found_and_error_caught() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));

        let missing = reg
            .execute("missing", HashMap::new(), &ToolContext::default())
            .await;
        assert!(missing.starts_with("Error: Tool 'missing' not found"));

        let failed = reg
            .execute("fail", HashMap::new(), &ToolContext::default())
            .await;
        assert!(failed.contains("intentional failure"));
    }
}
