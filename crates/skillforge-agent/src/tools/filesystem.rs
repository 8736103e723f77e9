//! Filesystem tools — `read` and `write`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};

use super::base::{optional_u64, require_string, Tool, ToolContext};

/// Text read cap, matching the runtime output cap.
const MAX_READ_CHARS: usize = 100_000;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

// ─────────────────────────────────────────────
// ReadTool
// ─────────────────────────────────────────────

/// Reads a file as text (or base64 for images).
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Returns the file content as text, \
         or base64 for image files."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (optional)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (optional)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        _ctx: &ToolContext,
    ) -> anyhow::Result<String> {
        let path_str = require_string(&params, "path")?;
        let path = Path::new(&path_str);

        if !path.is_file() {
            anyhow::bail!("File not found: {path_str}");
        }

        if is_image(path) {
            let bytes = std::fs::read(path)?;
            return Ok(base64::engine::general_purpose::STANDARD.encode(bytes));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {path_str}: {e}"))?;

        let offset = optional_u64(&params, "offset").unwrap_or(0) as usize;
        let limit = optional_u64(&params, "limit").map(|n| n as usize);

        let text = if offset > 0 || limit.is_some() {
            let lines: Vec<&str> = content.lines().collect();
            let end = limit
                .map(|l| (offset + l).min(lines.len()))
                .unwrap_or(lines.len());
            if offset >= lines.len() {
                String::new()
            } else {
                lines[offset..end].join("\n")
            }
        } else {
            content
        };

        Ok(truncate(text))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_READ_CHARS {
        let mut cut = MAX_READ_CHARS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... [truncated]");
    }
    text
}

// ─────────────────────────────────────────────
// WriteTool
// ─────────────────────────────────────────────

/// Creates or overwrites a file, creating parent directories as needed.
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates parent directories automatically. \
         Use this instead of heredoc/cat for writing files."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        params: HashMap<String, Value>,
        _ctx: &ToolContext,
    ) -> anyhow::Result<String> {
        let path_str = require_string(&params, "path")?;
        let content = require_string(&params, "content")?;

        let path = Path::new(&path_str);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &content)?;
        Ok(format!("Wrote {} bytes to {path_str}", content.len()))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
