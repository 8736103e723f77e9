//! Shell tools — `execute` and `execute_script`, backed by the skills
//! engine's runtime (which layers in skill env and honours abort).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use skillforge_skills::engine::SkillsEngine;
use skillforge_skills::runtime::ExecOptions;

use super::base::{optional_string, optional_u64, require_string, Tool, ToolContext};

fn exec_options(
    params: &HashMap<String, Value>,
    ctx: &ToolContext,
) -> ExecOptions {
    ExecOptions {
        cwd: optional_string(params, "cwd").map(PathBuf::from),
        timeout: optional_u64(params, "timeout").map(Duration::from_secs),
        output: ctx.output.clone(),
        cancel: Some(ctx.cancel.clone()),
        ..Default::default()
    }
}

fn render(result: skillforge_core::types::ExecutionResult) -> String {
    if result.success {
        if result.output.is_empty() {
            "(no output)".to_string()
        } else {
            result.output
        }
    } else {
        let error = result.error.unwrap_or_else(|| "failed".to_string());
        if result.output.is_empty() {
            format!("Error (exit {}): {error}", result.exit_code)
        } else {
            format!("Error (exit {}): {error}\n{}", result.exit_code, result.output)
        }
    }
}

// ─────────────────────────────────────────────
// ExecuteTool
// ─────────────────────────────────────────────

/// Runs a single shell command.
pub struct ExecuteTool {
    engine: Arc<SkillsEngine>,
}

impl ExecuteTool {
    pub fn new(engine: Arc<SkillsEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ExecuteTool {
    fn name(&self) -> &str {
        "execute"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return the output. \
         Use this to run scripts, CLI tools, or any shell command."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (optional)"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory for the command (optional)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<String> {
        let command = require_string(&params, "command")?;
        let opts = exec_options(&params, ctx);
        Ok(render(self.engine.execute(&command, opts).await))
    }
}

// ─────────────────────────────────────────────
// ExecuteScriptTool
// ─────────────────────────────────────────────

/// Runs a multi-line shell script through a temp file.
pub struct ExecuteScriptTool {
    engine: Arc<SkillsEngine>,
}

impl ExecuteScriptTool {
    pub fn new(engine: Arc<SkillsEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ExecuteScriptTool {
    fn name(&self) -> &str {
        "execute_script"
    }

    fn description(&self) -> &str {
        "Execute a multi-line shell script. \
         Use this for complex operations that require multiple commands."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "script": {
                    "type": "string",
                    "description": "The shell script content to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (optional)"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory for the script (optional)"
                }
            },
            "required": ["script"]
        })
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> anyhow::Result<String> {
        let script = require_string(&params, "script")?;
        let opts = exec_options(&params, ctx);
        Ok(render(self.engine.execute_script(&script, opts).await))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use skillforge_core::config::SkillsConfig;

    fn engine() -> Arc<SkillsEngine> {
        Arc::new(SkillsEngine::new(SkillsConfig::default()))
    }

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn execute_returns_output() {
        let tool = ExecuteTool::new(engine());
        let result = tool
            .execute(params(&[("command", json!("echo hi"))]), &ToolContext::default())
            .await
            .unwrap();
        assert!(result.contains("hi"));
    }

    #[tokio::test]
    async fn execute_failure_encoded_as_string() {
        let tool = ExecuteTool::new(engine());
        let result = tool
            .execute(params(&[("command", json!("exit 3"))]), &ToolContext::default())
            .await
            .unwrap();
        assert!(result.starts_with("Error (exit 3)"));
    }

    #[tokio::test]
    async fn execute_missing_command_is_error() {
        let tool = ExecuteTool::new(engine());
        assert!(tool
            .execute(HashMap::new(), &ToolContext::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn execute_empty_output_placeholder() {
        let tool = ExecuteTool::new(engine());
        let result = tool
            .execute(params(&[("command", json!("true"))]), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result, "(no output)");
    }

    #[tokio::test]
    async fn script_tool_runs_multiline() {
        let tool = ExecuteScriptTool::new(engine());
        let result = tool
            .execute(
                params(&[("script", json!("X=4\necho $((X * 2))"))]),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(result.contains('8'));
    }

    #[tokio::test]
    async fn per_call_timeout_honoured() {
        let tool = ExecuteTool::new(engine());
        let result = tool
            .execute(
                params(&[("command", json!("sleep 30")), ("timeout", json!(1))]),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(result.contains("timed out"));
    }
}
