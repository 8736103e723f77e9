//! Skillforge core — shared message model, lifecycle event bus, and configuration.
//!
//! This crate contains:
//! - **types**: agent-side messages, the strict LLM wire projection, tool
//!   calls/definitions, execution results, and streaming events
//! - **events**: the prioritised lifecycle event bus with interception semantics
//! - **config**: typed configuration schema and loader

pub mod config;
pub mod events;
pub mod types;

pub use config::{AgentConfig, Config, PromptFormat, SkillEntryConfig, SkillsConfig, ThinkingLevel};
pub use events::{
    AgentEvent, EventBus, EventEnvelope, EventHandler, EventKind, EventOutcome, SubscriptionId,
};
pub use types::{
    AgentMessage, ExecutionResult, FinishReason, LlmMessage, Role, StreamEvent, ToolCall,
    ToolDefinition,
};
