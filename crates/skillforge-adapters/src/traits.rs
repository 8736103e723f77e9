//! The adapter trait and its event vocabulary.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use skillforge_core::config::ThinkingLevel;
use skillforge_core::types::{LlmMessage, ToolDefinition};

use crate::error::AdapterError;

/// Events an adapter yields while a response streams.
///
/// Tool-call ids are stable across the start/delta/end events of one call.
/// Providers that emit event kinds outside this set must drop them with a
/// debug log rather than invent new variants.
#[derive(Clone, Debug, PartialEq)]
pub enum AdapterEvent {
    TextDelta { content: String },
    ThinkingDelta { content: String },
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, args_delta: String },
    ToolCallEnd { id: String },
    Finish { reason: Option<String> },
}

/// Boxed stream of adapter events.
pub type AdapterStream = Pin<Box<dyn Stream<Item = Result<AdapterEvent, AdapterError>> + Send>>;

/// One LLM call.
#[derive(Clone, Debug)]
pub struct AdapterRequest {
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub thinking_level: ThinkingLevel,
    /// Abort signal. Adapters must close the stream within a bounded
    /// latency (≤250 ms preferred) once it fires, yielding `Cancelled`.
    pub cancel: CancellationToken,
}

/// Abstraction over the LLM HTTP protocol.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Open a streaming completion. Errors returned here may be retried by
    /// [`crate::retry::open_with_retry`] when transient; errors yielded
    /// mid-stream end the turn.
    async fn stream(&self, request: AdapterRequest) -> Result<AdapterStream, AdapterError>;

    /// Display name for logging.
    fn name(&self) -> &str;
}
