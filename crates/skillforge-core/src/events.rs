//! Lifecycle event bus.
//!
//! The agent loop publishes a closed set of lifecycle events; subscribers can
//! observe them or, for the intercepting kinds, modify behaviour through
//! their return value:
//!
//! - `before_tool_call` — a `Block` outcome replaces the tool call with a
//!   synthetic result; later handlers still run but cannot unblock.
//! - `after_tool_result` — `ReplaceResult` outcomes chain, each receiving the
//!   previous replacement.
//! - `context_transform` — `ReplaceMessages` outcomes chain.
//! - `input` — a `Handled` outcome short-circuits: no downstream handlers run.
//!
//! Handlers run in descending priority order, ties resolved by registration
//! order. Handler errors are logged with the subscriber tag and swallowed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use crate::types::{AgentMessage, FinishReason, ToolCall};

// ─────────────────────────────────────────────
// Event kinds and payloads
// ─────────────────────────────────────────────

/// The closed set of lifecycle event names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    AgentStart,
    AgentEnd,
    TurnStart,
    TurnEnd,
    BeforeToolCall,
    AfterToolResult,
    ContextTransform,
    Input,
    ToolExecutionUpdate,
    SessionStart,
    SessionEnd,
    ModelChange,
    Compaction,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStart => "agent_start",
            EventKind::AgentEnd => "agent_end",
            EventKind::TurnStart => "turn_start",
            EventKind::TurnEnd => "turn_end",
            EventKind::BeforeToolCall => "before_tool_call",
            EventKind::AfterToolResult => "after_tool_result",
            EventKind::ContextTransform => "context_transform",
            EventKind::Input => "input",
            EventKind::ToolExecutionUpdate => "tool_execution_update",
            EventKind::SessionStart => "session_start",
            EventKind::SessionEnd => "session_end",
            EventKind::ModelChange => "model_change",
            EventKind::Compaction => "compaction",
        }
    }

    /// Parse a lifecycle point name (used by skill hook declarations).
    pub fn parse(name: &str) -> Option<EventKind> {
        match name {
            "agent_start" => Some(EventKind::AgentStart),
            "agent_end" => Some(EventKind::AgentEnd),
            "turn_start" => Some(EventKind::TurnStart),
            "turn_end" => Some(EventKind::TurnEnd),
            "before_tool_call" => Some(EventKind::BeforeToolCall),
            "after_tool_result" => Some(EventKind::AfterToolResult),
            "context_transform" => Some(EventKind::ContextTransform),
            "input" => Some(EventKind::Input),
            "tool_execution_update" => Some(EventKind::ToolExecutionUpdate),
            "session_start" => Some(EventKind::SessionStart),
            "session_end" => Some(EventKind::SessionEnd),
            "model_change" => Some(EventKind::ModelChange),
            "compaction" => Some(EventKind::Compaction),
            _ => None,
        }
    }
}

/// Payload union for lifecycle events.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    AgentStart {
        input: String,
        model: String,
    },
    AgentEnd {
        finish_reason: FinishReason,
        total_turns: u32,
        error: Option<String>,
    },
    TurnStart {
        turn: u32,
        message_count: usize,
    },
    TurnEnd {
        turn: u32,
        content: String,
        tool_call_count: usize,
    },
    BeforeToolCall {
        tool_call: ToolCall,
        turn: u32,
    },
    AfterToolResult {
        tool_call: ToolCall,
        result: String,
        turn: u32,
    },
    ContextTransform {
        messages: Vec<AgentMessage>,
        turn: u32,
    },
    Input {
        input: String,
    },
    ToolExecutionUpdate {
        tool_call_id: String,
        tool_name: String,
        chunk: String,
        turn: u32,
    },
    SessionStart {
        session_id: String,
    },
    SessionEnd {
        session_id: String,
    },
    ModelChange {
        previous: String,
        current: String,
    },
    Compaction {
        messages_before: usize,
        messages_after: usize,
        tokens_before: usize,
        tokens_after: usize,
    },
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::AgentStart { .. } => EventKind::AgentStart,
            AgentEvent::AgentEnd { .. } => EventKind::AgentEnd,
            AgentEvent::TurnStart { .. } => EventKind::TurnStart,
            AgentEvent::TurnEnd { .. } => EventKind::TurnEnd,
            AgentEvent::BeforeToolCall { .. } => EventKind::BeforeToolCall,
            AgentEvent::AfterToolResult { .. } => EventKind::AfterToolResult,
            AgentEvent::ContextTransform { .. } => EventKind::ContextTransform,
            AgentEvent::Input { .. } => EventKind::Input,
            AgentEvent::ToolExecutionUpdate { .. } => EventKind::ToolExecutionUpdate,
            AgentEvent::SessionStart { .. } => EventKind::SessionStart,
            AgentEvent::SessionEnd { .. } => EventKind::SessionEnd,
            AgentEvent::ModelChange { .. } => EventKind::ModelChange,
            AgentEvent::Compaction { .. } => EventKind::Compaction,
        }
    }
}

/// An event paired with the id of the runner that emitted it, so subscribers
/// can tell a forked child's events apart from the parent's.
#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub agent_id: String,
    pub event: AgentEvent,
}

impl EventEnvelope {
    pub fn new(agent_id: impl Into<String>, event: AgentEvent) -> Self {
        EventEnvelope {
            agent_id: agent_id.into(),
            event,
        }
    }
}

// ─────────────────────────────────────────────
// Handler outcomes
// ─────────────────────────────────────────────

/// What a handler asks the loop to do. `None` from a handler means "observed".
#[derive(Clone, Debug, PartialEq)]
pub enum EventOutcome {
    /// `before_tool_call`: halt the call; a synthetic result carries `reason`.
    Block { reason: String },
    /// `after_tool_result`: replace the tool result (chained).
    ReplaceResult(String),
    /// `context_transform`: replace the message list (chained).
    ReplaceMessages(Vec<AgentMessage>),
    /// `input`: short-circuit the turn with an optional response.
    Handled { response: Option<String> },
}

/// First block reason among outcomes, if any.
pub fn first_block(outcomes: &[EventOutcome]) -> Option<&str> {
    outcomes.iter().find_map(|o| match o {
        EventOutcome::Block { reason } => Some(reason.as_str()),
        _ => None,
    })
}

/// Chain `ReplaceResult` outcomes over an initial result.
pub fn chain_results(outcomes: Vec<EventOutcome>, initial: String) -> String {
    outcomes.into_iter().fold(initial, |acc, o| match o {
        EventOutcome::ReplaceResult(r) => r,
        _ => acc,
    })
}

/// Chain `ReplaceMessages` outcomes over an initial message list.
pub fn chain_messages(
    outcomes: Vec<EventOutcome>,
    initial: Vec<AgentMessage>,
) -> Vec<AgentMessage> {
    outcomes.into_iter().fold(initial, |acc, o| match o {
        EventOutcome::ReplaceMessages(m) => m,
        _ => acc,
    })
}

// ─────────────────────────────────────────────
// EventBus
// ─────────────────────────────────────────────

/// An asynchronous lifecycle event handler.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<Option<EventOutcome>>;
}

/// Handle returned by [`EventBus::on`]; pass back to [`EventBus::off`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct HandlerEntry {
    id: u64,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
    priority: i32,
    source: String,
    seq: u64,
}

/// Prioritised, ordered lifecycle notification.
///
/// The subscriber list is snapshotted before each emission so `on`/`off`
/// during emission never race with the in-flight dispatch.
pub struct EventBus {
    handlers: Mutex<Vec<HandlerEntry>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler. Higher priority runs earlier; ties run in
    /// registration order. `source` is a free-form owner label used for bulk
    /// unsubscription.
    pub fn on(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
        priority: i32,
        source: impl Into<String>,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().unwrap();
        handlers.push(HandlerEntry {
            id,
            kind,
            handler,
            priority,
            source: source.into(),
            seq: id,
        });
        SubscriptionId(id)
    }

    /// Remove a single subscription. Returns whether it existed.
    pub fn off(&self, sub: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|h| h.id != sub.0);
        handlers.len() != before
    }

    /// Remove every handler registered under `source`. Returns the count.
    pub fn off_by_source(&self, source: &str) -> usize {
        let mut handlers = self.handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|h| h.source != source);
        before - handlers.len()
    }

    pub fn has_handlers(&self, kind: EventKind) -> bool {
        self.handlers.lock().unwrap().iter().any(|h| h.kind == kind)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    /// Emit an event and collect handler outcomes.
    ///
    /// For `input` events, a `Handled` outcome stops dispatch: downstream
    /// handlers do not run. All other kinds always notify every handler.
    pub async fn emit(&self, envelope: &EventEnvelope) -> Vec<EventOutcome> {
        let kind = envelope.event.kind();
        let snapshot: Vec<(Arc<dyn EventHandler>, String)> = {
            let handlers = self.handlers.lock().unwrap();
            let mut relevant: Vec<&HandlerEntry> =
                handlers.iter().filter(|h| h.kind == kind).collect();
            relevant.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
            relevant
                .into_iter()
                .map(|h| (Arc::clone(&h.handler), h.source.clone()))
                .collect()
        };

        let mut outcomes = Vec::new();
        for (handler, source) in snapshot {
            match handler.handle(envelope).await {
                Ok(Some(outcome)) => {
                    let short_circuit = kind == EventKind::Input
                        && matches!(outcome, EventOutcome::Handled { .. });
                    outcomes.push(outcome);
                    if short_circuit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(event = kind.as_str(), source = %source, error = %e, "event handler failed");
                }
            }
        }
        outcomes
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
