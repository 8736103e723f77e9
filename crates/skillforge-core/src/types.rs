//! Core types for Skillforge — the agent-side message model and its strict
//! LLM wire projection.
//!
//! `AgentMessage` is what the runner accumulates: it may carry a `thinking`
//! role and agent-only metadata. `LlmMessage` is the OpenAI-compatible wire
//! shape actually sent to a provider; `project_messages` performs the
//! narrowing (thinking filtered out, metadata stripped).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────
// Roles and agent-side messages
// ─────────────────────────────────────────────

/// Role of a message in the agent conversation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    /// UI-only reasoning content. Never sent to the LLM.
    Thinking,
}

/// A tool call requested by the assistant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique ID, stable across the call's start/delta/end stream events.
    pub id: String,
    /// Tool name to dispatch.
    pub name: String,
    /// JSON-encoded arguments string.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A message in the agent conversation history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls carried by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Present on tool-role messages: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Present on tool-role messages: the tool that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Agent-only metadata (finish reason, usage). Stripped before the LLM.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::of(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::of(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::of(Role::Assistant, content)
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self::of(Role::Thinking, content)
    }

    /// An assistant message carrying tool calls (content may be empty).
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        AgentMessage {
            tool_calls,
            ..Self::of(Role::Assistant, content)
        }
    }

    /// A tool-role result message answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        AgentMessage {
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            ..Self::of(Role::Tool, content)
        }
    }

    fn of(role: Role, content: impl Into<String>) -> Self {
        AgentMessage {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            metadata: HashMap::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─────────────────────────────────────────────
// LLM wire messages (strict projection)
// ─────────────────────────────────────────────

/// A message in the OpenAI chat completions wire format.
///
/// Only the four provider-visible roles exist here; each variant maps to a
/// `role` field value on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum LlmMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<WireToolCall>>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

/// Wire shape of a tool call (`{id, type: "function", function: {...}}`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunctionCall,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(tc: &ToolCall) -> Self {
        WireToolCall {
            id: tc.id.clone(),
            call_type: "function".to_string(),
            function: WireFunctionCall {
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            },
        }
    }
}

/// Project agent messages into the LLM wire subset.
///
/// Thinking-role messages are dropped and agent metadata never crosses.
pub fn project_messages(messages: &[AgentMessage]) -> Vec<LlmMessage> {
    messages
        .iter()
        .filter_map(|msg| match msg.role {
            Role::Thinking => None,
            Role::System => Some(LlmMessage::System {
                content: msg.content.clone(),
            }),
            Role::User => Some(LlmMessage::User {
                content: msg.content.clone(),
            }),
            Role::Assistant => {
                let tool_calls = if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(msg.tool_calls.iter().map(WireToolCall::from).collect())
                };
                let content = if msg.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(msg.content.clone())
                };
                Some(LlmMessage::Assistant {
                    content,
                    tool_calls,
                })
            }
            Role::Tool => Some(LlmMessage::Tool {
                content: msg.content.clone(),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        })
        .collect()
}

// ─────────────────────────────────────────────
// Tool definitions (for LLM requests)
// ─────────────────────────────────────────────

/// Definition of a tool, sent to the LLM so it knows what tools are available.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Schema of a function tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ─────────────────────────────────────────────
// Execution results
// ─────────────────────────────────────────────

/// Result of running a subprocess through the execution runtime.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Captured stdout+stderr, truncated with a marker past the cap.
    pub output: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>, duration_ms: u64) -> Self {
        ExecutionResult {
            success: true,
            output: output.into(),
            exit_code: 0,
            duration_ms,
            error: None,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        exit_code: i32,
        output: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        ExecutionResult {
            success: false,
            output: output.into(),
            exit_code,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

// ─────────────────────────────────────────────
// Finish reasons and stream events
// ─────────────────────────────────────────────

/// Why an inner loop ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Complete,
    MaxTurns,
    Aborted,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Complete => "complete",
            FinishReason::MaxTurns => "max_turns",
            FinishReason::Aborted => "aborted",
            FinishReason::Error => "error",
        }
    }
}

/// A structured event emitted while a turn is streaming.
///
/// Serialises to the wire form `{type, content?, tool_name?, tool_call_id?,
/// args_delta?, error?}` consumed by SSE re-emitters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextStart,
    TextDelta { content: String },
    TextEnd,
    ThinkingStart,
    ThinkingDelta { content: String },
    ThinkingEnd,
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
    },
    ToolCallDelta {
        tool_call_id: String,
        args_delta: String,
    },
    ToolCallEnd {
        tool_call_id: String,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
    TurnStart { turn: u32 },
    TurnEnd { turn: u32 },
    Done { finish_reason: FinishReason },
    Error { error: String },
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
