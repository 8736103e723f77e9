//! Turn accumulator — folds adapter events into an assistant message while
//! synthesising the start/end boundary stream events.
//!
//! The fold is a pure function of the event sequence: replaying a recorded
//! sequence reproduces the same assistant message byte for byte.

use skillforge_adapters::AdapterEvent;
use skillforge_core::types::{AgentMessage, StreamEvent, ToolCall};

/// A tool call under construction.
#[derive(Clone, Debug)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// The assembled result of one streamed assistant turn.
#[derive(Clone, Debug)]
pub struct AccumulatedTurn {
    /// Assistant message carrying text content and completed tool calls.
    pub assistant: AgentMessage,
    /// Thinking content, when the model produced any.
    pub thinking: Option<String>,
    /// Finish reason reported by the adapter.
    pub finish_reason: Option<String>,
}

/// Folds [`AdapterEvent`]s into an [`AccumulatedTurn`].
#[derive(Default)]
pub struct TurnAccumulator {
    text: String,
    thinking: String,
    text_open: bool,
    thinking_open: bool,
    calls: Vec<PendingCall>,
    finish_reason: Option<String>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one adapter event, returning the stream events to re-emit
    /// (boundary markers are synthesised around the deltas).
    pub fn apply(&mut self, event: &AdapterEvent) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        match event {
            AdapterEvent::TextDelta { content } => {
                if self.thinking_open {
                    self.thinking_open = false;
                    out.push(StreamEvent::ThinkingEnd);
                }
                if !self.text_open {
                    self.text_open = true;
                    out.push(StreamEvent::TextStart);
                }
                self.text.push_str(content);
                out.push(StreamEvent::TextDelta {
                    content: content.clone(),
                });
            }
            AdapterEvent::ThinkingDelta { content } => {
                if self.text_open {
                    self.text_open = false;
                    out.push(StreamEvent::TextEnd);
                }
                if !self.thinking_open {
                    self.thinking_open = true;
                    out.push(StreamEvent::ThinkingStart);
                }
                self.thinking.push_str(content);
                out.push(StreamEvent::ThinkingDelta {
                    content: content.clone(),
                });
            }
            AdapterEvent::ToolCallStart { id, name } => {
                out.extend(self.close_open_blocks());
                self.calls.push(PendingCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: String::new(),
                });
                out.push(StreamEvent::ToolCallStart {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                });
            }
            AdapterEvent::ToolCallDelta { id, args_delta } => {
                if let Some(call) = self.calls.iter_mut().find(|c| &c.id == id) {
                    call.arguments.push_str(args_delta);
                }
                out.push(StreamEvent::ToolCallDelta {
                    tool_call_id: id.clone(),
                    args_delta: args_delta.clone(),
                });
            }
            AdapterEvent::ToolCallEnd { id } => {
                out.push(StreamEvent::ToolCallEnd {
                    tool_call_id: id.clone(),
                });
            }
            AdapterEvent::Finish { reason } => {
                self.finish_reason = reason.clone();
                out.extend(self.close_open_blocks());
            }
        }
        out
    }

    fn close_open_blocks(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.thinking_open {
            self.thinking_open = false;
            out.push(StreamEvent::ThinkingEnd);
        }
        if self.text_open {
            self.text_open = false;
            out.push(StreamEvent::TextEnd);
        }
        out
    }

    /// Finalise into the accumulated turn.
    pub fn finish(self) -> AccumulatedTurn {
        let tool_calls: Vec<ToolCall> = self
            .calls
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.name, c.arguments))
            .collect();
        let assistant = if tool_calls.is_empty() {
            AgentMessage::assistant(self.text)
        } else {
            AgentMessage::assistant_with_tools(self.text, tool_calls)
        };
        AccumulatedTurn {
            assistant,
            thinking: (!self.thinking.is_empty()).then_some(self.thinking),
            finish_reason: self.finish_reason,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
