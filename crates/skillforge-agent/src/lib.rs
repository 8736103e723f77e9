//! Skillforge agent — the ReAct-style scheduler and its supporting pieces.
//!
//! This crate contains:
//! - **runner**: the agent loop (turn orchestration, tool dispatch, skill
//!   invocation, fork, steering, abort, stream event emission)
//! - **tools**: the `Tool` trait, registry, and built-in tools
//! - **context**: token-budget estimation and compaction strategies
//! - **accumulator**: folds adapter events into assistant messages
//! - **context_files** / **hooks**: system-prompt context discovery and the
//!   skill hook bridge

pub mod accumulator;
pub mod context;
pub mod context_files;
pub mod hooks;
pub mod runner;
pub mod tools;

pub use accumulator::TurnAccumulator;
pub use context::{
    ContextManager, CompactionOutcome, CompactionStrategy, SlidingWindowStrategy, Summarizer,
    SummarizingStrategy,
};
pub use runner::{AgentHandle, AgentRunner};
pub use tools::{Tool, ToolContext, ToolRegistry};
