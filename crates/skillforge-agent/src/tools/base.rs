//! Tool trait — the abstract interface every agent tool implements.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use skillforge_core::types::ToolDefinition;
use skillforge_skills::runtime::OutputSink;

/// Per-call context threaded into tool execution.
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Abort signal; long-running tools must honour it.
    pub cancel: CancellationToken,
    /// Sink for streamed intermediate output chunks.
    pub output: Option<OutputSink>,
}

/// Every agent tool implements this trait.
///
/// The loop discovers tools via `name()`, sends their schemas to the LLM via
/// `to_definition()`, and dispatches calls via `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the LLM calls this tool by (e.g. `"execute"`).
    fn name(&self) -> &str;

    /// Description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for the parameters:
    /// `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    /// Execute with the given arguments.
    ///
    /// Returns the tool output as a string. On `Err`, the registry converts
    /// the failure into an error string for the LLM; it is never fatal to
    /// the loop.
    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<String>;

    /// Build the `ToolDefinition` sent to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required string param with a user-friendly error.
pub fn require_string(params: &HashMap<String, Value>, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional string param.
pub fn optional_string(params: &HashMap<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Extract an optional integer param.
pub fn optional_u64(params: &HashMap<String, Value>, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_string_present_and_missing() {
        let mut params = HashMap::new();
        params.insert("command".into(), json!("ls"));
        assert_eq!(require_string(&params, "command").unwrap(), "ls");
        assert!(require_string(&params, "other").is_err());
    }

    #[test]
    fn require_string_wrong_type() {
        let mut params = HashMap::new();
        params.insert("command".into(), json!(42));
        assert!(require_string(&params, "command").is_err());
    }

    #[test]
    fn optional_helpers() {
        let mut params = HashMap::new();
        params.insert("cwd".into(), json!("/tmp"));
        params.insert("timeout".into(), json!(30));
        assert_eq!(optional_string(&params, "cwd"), Some("/tmp".into()));
        assert_eq!(optional_string(&params, "missing"), None);
        assert_eq!(optional_u64(&params, "timeout"), Some(30));
        assert_eq!(optional_u64(&params, "missing"), None);
    }

    #[tokio::test]
    async fn default_to_definition_shape() {
        struct DummyTool;

        #[async_trait]
        impl Tool for DummyTool {
            fn name(&self) -> &str {
                "dummy"
            }
            fn description(&self) -> &str {
                "A test tool"
            }
            fn parameters(&self) -> Value {
                json!({"type": "object", "properties": {}, "required": []})
            }
            async fn execute(
                &self,
                _params: HashMap<String, Value>,
                _ctx: &ToolContext,
            ) -> anyhow::Result<String> {
                Ok("ok".into())
            }
        }

        let def = DummyTool.to_definition();
        assert_eq!(def.function.name, "dummy");
        assert_eq!(def.tool_type, "function");
    }
}
