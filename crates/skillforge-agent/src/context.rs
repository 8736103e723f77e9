//! Context management — token estimation and compaction.
//!
//! The estimator is a local budget gate (chars/4), not a provider guarantee;
//! what matters is that it is used consistently. Compaction preserves the
//! tool-call/tool-result pairing invariant: dropping an assistant message
//! that carries tool calls drops the matching tool results, and vice versa.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use skillforge_core::types::{AgentMessage, Role};

// ─────────────────────────────────────────────
// Token estimation
// ─────────────────────────────────────────────

/// Estimate token count from text (chars/4 heuristic, minimum 1).
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// Estimate tokens for a single message: role overhead plus content and
/// tool-call arguments.
pub fn estimate_message_tokens(message: &AgentMessage) -> usize {
    let mut tokens = 4;
    tokens += estimate_tokens(&message.content);
    for tc in &message.tool_calls {
        tokens += 4;
        tokens += estimate_tokens(&tc.name);
        tokens += estimate_tokens(&tc.arguments);
    }
    tokens
}

/// Estimate total tokens for a message list.
pub fn estimate_history_tokens(messages: &[AgentMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

// ─────────────────────────────────────────────
// Pair-aware dropping
// ─────────────────────────────────────────────

/// Expand a drop set so tool-call/tool-result pairs always drop together.
///
/// If a dropped assistant message carries tool calls, the tool messages
/// answering those ids are dropped too; if a dropped tool message answers an
/// assistant's call, that assistant (and its other results) are dropped.
fn expand_pairs(messages: &[AgentMessage], dropped: &mut HashSet<usize>) {
    loop {
        let mut dropped_ids: HashSet<&str> = HashSet::new();
        for &i in dropped.iter() {
            let msg = &messages[i];
            for tc in &msg.tool_calls {
                dropped_ids.insert(tc.id.as_str());
            }
            if let Some(id) = &msg.tool_call_id {
                dropped_ids.insert(id.as_str());
            }
        }

        let mut grew = false;
        for (i, msg) in messages.iter().enumerate() {
            if dropped.contains(&i) {
                continue;
            }
            let tied = msg
                .tool_calls
                .iter()
                .any(|tc| dropped_ids.contains(tc.id.as_str()))
                || msg
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| dropped_ids.contains(id));
            if tied {
                dropped.insert(i);
                grew = true;
            }
        }
        if !grew {
            return;
        }
    }
}

/// Indices of the oldest droppable messages until the survivors fit in
/// `budget`. The leading system message and the final message never drop.
fn select_drops(messages: &[AgentMessage], budget: usize) -> HashSet<usize> {
    let mut dropped: HashSet<usize> = HashSet::new();
    let protect_system = messages
        .first()
        .map(|m| m.role == Role::System)
        .unwrap_or(false);

    let mut candidate = usize::from(protect_system);
    loop {
        let remaining: usize = messages
            .iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, m)| estimate_message_tokens(m))
            .sum();
        if remaining <= budget {
            break;
        }
        // keep at least the last message
        if candidate >= messages.len().saturating_sub(1) {
            break;
        }
        if !dropped.contains(&candidate) {
            dropped.insert(candidate);
            expand_pairs(messages, &mut dropped);
        }
        candidate += 1;
    }
    dropped
}

// ─────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────

/// A pluggable compaction strategy.
#[async_trait]
pub trait CompactionStrategy: Send + Sync {
    async fn compact(
        &self,
        messages: Vec<AgentMessage>,
        budget: usize,
    ) -> anyhow::Result<Vec<AgentMessage>>;
}

/// Retains the leading system message and drops the oldest non-system
/// messages until under budget.
pub struct SlidingWindowStrategy;

#[async_trait]
impl CompactionStrategy for SlidingWindowStrategy {
    async fn compact(
        &self,
        messages: Vec<AgentMessage>,
        budget: usize,
    ) -> anyhow::Result<Vec<AgentMessage>> {
        let dropped = select_drops(&messages, budget);
        Ok(messages
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, m)| m)
            .collect())
    }
}

/// Produces the summary text for [`SummarizingStrategy`]. Implementations
/// may call the LLM adapter; they must not re-enter compaction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, dropped: &[AgentMessage]) -> anyhow::Result<String>;
}

/// Replaces the dropped prefix with a single system-role summary message.
pub struct SummarizingStrategy {
    summarizer: Arc<dyn Summarizer>,
}

impl SummarizingStrategy {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl CompactionStrategy for SummarizingStrategy {
    async fn compact(
        &self,
        messages: Vec<AgentMessage>,
        budget: usize,
    ) -> anyhow::Result<Vec<AgentMessage>> {
        let dropped_set = select_drops(&messages, budget);
        if dropped_set.is_empty() {
            return Ok(messages);
        }

        let dropped: Vec<AgentMessage> = messages
            .iter()
            .enumerate()
            .filter(|(i, _)| dropped_set.contains(i))
            .map(|(_, m)| m.clone())
            .collect();
        let summary = self.summarizer.summarize(&dropped).await?;

        let mut result = Vec::with_capacity(messages.len() - dropped.len() + 1);
        let mut summary_inserted = false;
        for (i, msg) in messages.into_iter().enumerate() {
            if dropped_set.contains(&i) {
                continue;
            }
            if !summary_inserted && !(i == 0 && msg.role == Role::System) {
                result.push(AgentMessage::system(format!(
                    "[Conversation summary]\n{summary}"
                )));
                summary_inserted = true;
            }
            result.push(msg);
        }
        if !summary_inserted {
            result.push(AgentMessage::system(format!(
                "[Conversation summary]\n{summary}"
            )));
        }
        Ok(result)
    }
}

// ─────────────────────────────────────────────
// ContextManager
// ─────────────────────────────────────────────

/// What a compaction did, for the `compaction` event.
#[derive(Clone, Debug)]
pub struct CompactionOutcome {
    pub messages: Vec<AgentMessage>,
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Token-budget gate applied before each model call.
pub struct ContextManager {
    context_window: usize,
    reserve_tokens: usize,
    threshold: f64,
    strategy: Arc<dyn CompactionStrategy>,
}

impl ContextManager {
    pub fn new(context_window: usize, reserve_tokens: usize) -> Self {
        Self {
            context_window,
            reserve_tokens,
            threshold: 0.9,
            strategy: Arc::new(SlidingWindowStrategy),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn CompactionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Token budget compaction aims for: `window × threshold − reserve`.
    pub fn budget(&self) -> usize {
        let scaled = (self.context_window as f64 * self.threshold) as usize;
        scaled.saturating_sub(self.reserve_tokens)
    }

    /// True iff `estimate(messages) + reserve ≥ window × threshold`.
    pub fn should_compact(&self, messages: &[AgentMessage]) -> bool {
        estimate_history_tokens(messages) + self.reserve_tokens
            >= (self.context_window as f64 * self.threshold) as usize
    }

    /// Apply the configured strategy.
    pub async fn compact(
        &self,
        messages: Vec<AgentMessage>,
    ) -> anyhow::Result<CompactionOutcome> {
        let messages_before = messages.len();
        let tokens_before = estimate_history_tokens(&messages);
        let compacted = self.strategy.compact(messages, self.budget()).await?;
        Ok(CompactionOutcome {
            messages_before,
            messages_after: compacted.len(),
            tokens_before,
            tokens_after: estimate_history_tokens(&compacted),
            messages: compacted,
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
