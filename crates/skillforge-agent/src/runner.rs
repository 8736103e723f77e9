//! The agent loop.
//!
//! `AgentRunner` drives ReAct-style turns: build messages, stream one model
//! call, dispatch the proposed tool calls sequentially, repeat until the
//! model stops calling tools or a cap/abort ends the loop. Lifecycle events
//! go through the [`EventBus`]; fine-grained progress goes out as
//! [`StreamEvent`]s on a broadcast channel.
//!
//! One runner owns one conversation: `chat()` takes `&mut self`, so a second
//! overlapping call on the same runner is unrepresentable. Cross-task
//! control (abort, steering, follow-ups) goes through [`AgentHandle`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use skillforge_adapters::{
    open_with_retry, AdapterError, AdapterRequest, LlmAdapter, RetryPolicy,
};
use skillforge_core::config::AgentConfig;
use skillforge_core::events::{
    chain_messages, chain_results, first_block, AgentEvent, EventBus, EventEnvelope, EventKind,
    EventOutcome,
};
use skillforge_core::types::{
    project_messages, AgentMessage, FinishReason, LlmMessage, StreamEvent, ToolCall,
    ToolDefinition,
};
use skillforge_skills::engine::SkillsEngine;
use skillforge_skills::model::{Skill, SkillAction, SkillContext, SkillSnapshot};
use skillforge_skills::prompt::format_metadata_prompt;
use skillforge_skills::runtime::ExecOptions;
use skillforge_skills::template::{expand_inline_commands, substitute_placeholders};

use crate::accumulator::TurnAccumulator;
use crate::context::ContextManager;
use crate::context_files::{self, ContextFile};
use crate::tools::{
    ExecuteScriptTool, ExecuteTool, ReadTool, Tool, ToolContext, ToolRegistry, WriteTool,
};

const STREAM_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────
// Shared control state
// ─────────────────────────────────────────────

struct RunnerShared {
    cancel: CancellationToken,
    steering: Mutex<VecDeque<String>>,
    follow_ups: Mutex<VecDeque<String>>,
}

impl RunnerShared {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            steering: Mutex::new(VecDeque::new()),
            follow_ups: Mutex::new(VecDeque::new()),
        }
    }

    fn pop_steering(&self) -> Option<String> {
        self.steering.lock().unwrap().pop_front()
    }

    fn pop_follow_up(&self) -> Option<String> {
        self.follow_ups.lock().unwrap().pop_front()
    }
}

/// Cloneable control handle for a running agent.
///
/// Obtained from [`AgentRunner::handle`]; usable from other tasks while
/// `chat()` is in flight.
#[derive(Clone)]
pub struct AgentHandle {
    shared: Arc<RunnerShared>,
}

impl AgentHandle {
    /// Abort the current operation. Edge-triggered and idempotent: the
    /// signal propagates into active subprocesses and the in-flight adapter
    /// stream, and the inner loop exits at its next check.
    pub fn abort(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Inject a steering message. It is consumed between tool calls: the
    /// remaining calls of the current turn are cancelled and the message
    /// becomes the next user message.
    pub fn steer(&self, message: impl Into<String>) {
        self.shared.steering.lock().unwrap().push_back(message.into());
    }

    /// Queue a message to process after the current inner loop exits.
    pub fn follow_up(&self, message: impl Into<String>) {
        self.shared
            .follow_ups
            .lock()
            .unwrap()
            .push_back(message.into());
    }
}

// ─────────────────────────────────────────────
// AgentRunner
// ─────────────────────────────────────────────

/// The central scheduler.
pub struct AgentRunner {
    engine: Arc<SkillsEngine>,
    adapter: Arc<dyn LlmAdapter>,
    events: Arc<EventBus>,
    tools: ToolRegistry,
    context: Option<ContextManager>,
    config: AgentConfig,
    retry: RetryPolicy,
    history: Vec<AgentMessage>,
    current_model: String,
    active_allowed_tools: Option<HashSet<String>>,
    include_skills_prompt: bool,
    context_files: Vec<ContextFile>,
    turn: u32,
    agent_id: String,
    shared: Arc<RunnerShared>,
    stream_tx: broadcast::Sender<StreamEvent>,
}

impl AgentRunner {
    pub fn new(
        engine: Arc<SkillsEngine>,
        adapter: Arc<dyn LlmAdapter>,
        config: AgentConfig,
    ) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ExecuteTool::new(Arc::clone(&engine))));
        tools.register(Arc::new(ExecuteScriptTool::new(Arc::clone(&engine))));
        tools.register(Arc::new(ReadTool));
        tools.register(Arc::new(WriteTool));

        let context_files = if config.load_context_files {
            std::env::current_dir()
                .map(|cwd| context_files::discover(&cwd))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let (stream_tx, _) = broadcast::channel(STREAM_CHANNEL_CAPACITY);
        let current_model = config.model.clone();
        Self {
            engine,
            adapter,
            events: Arc::new(EventBus::new()),
            tools,
            context: None,
            retry: RetryPolicy::default(),
            history: Vec::new(),
            current_model,
            active_allowed_tools: None,
            include_skills_prompt: true,
            context_files,
            turn: 0,
            agent_id: format!("agent-{}", short_id()),
            shared: Arc::new(RunnerShared::new(CancellationToken::new())),
            stream_tx,
            config,
        }
    }

    // ────────────── Builders / accessors ──────────────

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_context_manager(mut self, context: ContextManager) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register an extension tool.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn history(&self) -> &[AgentMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn current_model(&self) -> &str {
        &self.current_model
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Subscribe to fine-grained stream events.
    pub fn subscribe_stream(&self) -> broadcast::Receiver<StreamEvent> {
        self.stream_tx.subscribe()
    }

    /// Control handle for abort/steer/follow-up from other tasks.
    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Arm a fresh abort signal after an aborted run. Previously issued
    /// handles keep pointing at the fired signal and must be re-acquired.
    pub fn reset_abort(&mut self) {
        self.shared = Arc::new(RunnerShared::new(CancellationToken::new()));
    }

    /// Switch the current model, emitting `model_change`.
    pub async fn set_model(&mut self, model: &str) {
        if model == self.current_model {
            return;
        }
        let previous = std::mem::replace(&mut self.current_model, model.to_string());
        info!(previous = %previous, current = %self.current_model, "model switched");
        self.emit(AgentEvent::ModelChange {
            previous,
            current: self.current_model.clone(),
        })
        .await;
    }

    // ────────────── Outer loop ──────────────

    /// Run one outer turn: the input event, slash handling, the inner loop,
    /// then queued follow-ups. Returns the final assistant message.
    pub async fn chat(&mut self, input: &str) -> anyhow::Result<AgentMessage> {
        let outcomes = self
            .emit(AgentEvent::Input {
                input: input.to_string(),
            })
            .await;
        for outcome in outcomes {
            if let EventOutcome::Handled { response } = outcome {
                return Ok(AgentMessage::assistant(response.unwrap_or_default()));
            }
        }

        if input.trim() == "/clear" {
            self.history.clear();
            return Ok(AgentMessage::assistant("Conversation cleared."));
        }

        let mut result = self.chat_round(input, true).await;
        if result.is_ok() {
            while let Some(follow_up) = self.shared.pop_follow_up() {
                debug!(message = %follow_up, "processing follow-up");
                result = self.chat_round(&follow_up, false).await;
                if result.is_err() {
                    break;
                }
            }
        }

        let (finish_reason, error) = match &result {
            Ok((_, reason)) => (*reason, None),
            Err(e) => (FinishReason::Error, Some(e.to_string())),
        };
        self.emit(AgentEvent::AgentEnd {
            finish_reason,
            total_turns: self.turn,
            error,
        })
        .await;

        result.map(|(message, _)| message)
    }

    /// One round of the outer loop (the primary input or one follow-up).
    async fn chat_round(
        &mut self,
        input: &str,
        primary: bool,
    ) -> anyhow::Result<(AgentMessage, FinishReason)> {
        if let Some((name, args)) = parse_slash(input) {
            let skill = self.engine.snapshot().get(name).cloned();
            if let Some(skill) = skill {
                if !skill.metadata.user_invocable {
                    anyhow::bail!("skill '{name}' is not user-invocable");
                }
                return self.invoke_slash(&skill, args, input, primary).await;
            }
            // No such skill: treat as a plain message.
        }

        self.history.push(AgentMessage::user(input));
        if primary {
            self.emit(AgentEvent::AgentStart {
                input: input.to_string(),
                model: self.current_model.clone(),
            })
            .await;
        }
        self.run_inner().await
    }

    /// Slash invocation: `/name args` on a user-invocable skill.
    async fn invoke_slash(
        &mut self,
        skill: &Arc<Skill>,
        args: &str,
        raw_input: &str,
        primary: bool,
    ) -> anyhow::Result<(AgentMessage, FinishReason)> {
        info!(skill = %skill.name, "slash invocation");

        if skill.metadata.context == SkillContext::Fork {
            if primary {
                self.emit(AgentEvent::AgentStart {
                    input: raw_input.to_string(),
                    model: self.current_model.clone(),
                })
                .await;
            }
            let result = self.fork_skill(skill, args).await?;
            return Ok((AgentMessage::assistant(result), FinishReason::Complete));
        }

        let resolved = self.resolve_skill_content(skill, args).await;

        // Scoped overrides, restored on every exit path below.
        let previous_model = match &skill.metadata.model {
            Some(model) if model != &self.current_model => {
                let previous = self.current_model.clone();
                self.set_model(model).await;
                Some(previous)
            }
            _ => None,
        };
        let previous_allowed = if skill.metadata.allowed_tools.is_empty() {
            None
        } else {
            let set: HashSet<String> = skill.metadata.allowed_tools.iter().cloned().collect();
            Some(std::mem::replace(
                &mut self.active_allowed_tools,
                Some(set),
            ))
        };

        let wrapped = format!(
            "[User invoked skill: /{name}]\n\n<skill-content name=\"{name}\">\n{resolved}\n</skill-content>\n\nUser input: {raw_input}",
            name = skill.name,
        );
        self.history.push(AgentMessage::user(wrapped));
        if primary {
            self.emit(AgentEvent::AgentStart {
                input: raw_input.to_string(),
                model: self.current_model.clone(),
            })
            .await;
        }

        let result = self.run_inner().await;

        if let Some(previous) = previous_model {
            self.set_model(&previous).await;
        }
        if let Some(previous) = previous_allowed {
            self.active_allowed_tools = previous;
        }
        result
    }

    // ────────────── Inner loop ──────────────

    async fn run_inner(&mut self) -> anyhow::Result<(AgentMessage, FinishReason)> {
        self.turn = 0;
        // The snapshot captured here serves the whole inner loop; a hot
        // reload mid-flight only affects the next chat().
        let snapshot = self.engine.snapshot();
        let cancel = self.shared.cancel.clone();

        let mut last_assistant: Option<AgentMessage> = None;
        let finish = 'outer: loop {
            if cancel.is_cancelled() {
                break FinishReason::Aborted;
            }
            if self.turn >= self.config.max_turns {
                // A steering message pending at the cap becomes a follow-up
                // so it still runs, in a fresh outer round.
                while let Some(message) = self.shared.pop_steering() {
                    self.shared.follow_ups.lock().unwrap().push_back(message);
                }
                break FinishReason::MaxTurns;
            }

            while let Some(message) = self.shared.pop_steering() {
                self.history.push(AgentMessage::user(message));
            }

            self.turn += 1;
            let turn = self.turn;
            self.emit(AgentEvent::TurnStart {
                turn,
                message_count: self.history.len(),
            })
            .await;
            self.emit_stream(StreamEvent::TurnStart { turn });

            self.maybe_compact().await?;

            // context_transform: handlers may replace the outgoing list.
            let mut messages = self.history.clone();
            if self.events.has_handlers(EventKind::ContextTransform) {
                let outcomes = self
                    .emit(AgentEvent::ContextTransform {
                        messages: messages.clone(),
                        turn,
                    })
                    .await;
                messages = chain_messages(outcomes, messages);
            }

            let request = self.build_request(&messages, &snapshot, &cancel);
            let mut stream = match open_with_retry(self.adapter.as_ref(), request, self.retry).await
            {
                Ok(stream) => stream,
                Err(AdapterError::Cancelled) => break FinishReason::Aborted,
                Err(e) => {
                    self.emit_stream(StreamEvent::Error {
                        error: e.to_string(),
                    });
                    self.emit_stream(StreamEvent::Done {
                        finish_reason: FinishReason::Error,
                    });
                    return Err(e.into());
                }
            };

            // Consume the stream, re-emitting each adapter event.
            let mut accumulator = TurnAccumulator::new();
            let mut stream_error: Option<AdapterError> = None;
            let mut aborted = false;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        aborted = true;
                        break;
                    }
                    item = stream.next() => match item {
                        None => break,
                        Some(Ok(event)) => {
                            for stream_event in accumulator.apply(&event) {
                                self.emit_stream(stream_event);
                            }
                        }
                        Some(Err(AdapterError::Cancelled)) => {
                            aborted = true;
                            break;
                        }
                        Some(Err(e)) => {
                            stream_error = Some(e);
                            break;
                        }
                    }
                }
            }
            if aborted || cancel.is_cancelled() {
                // Partial accumulated assistant text is discarded.
                break FinishReason::Aborted;
            }
            if let Some(e) = stream_error {
                self.emit_stream(StreamEvent::Error {
                    error: e.to_string(),
                });
                self.emit_stream(StreamEvent::Done {
                    finish_reason: FinishReason::Error,
                });
                return Err(e.into());
            }

            let turn_result = accumulator.finish();
            if let Some(thinking) = &turn_result.thinking {
                self.history.push(AgentMessage::thinking(thinking.clone()));
            }
            let assistant = turn_result.assistant;
            self.history.push(assistant.clone());
            self.emit(AgentEvent::TurnEnd {
                turn,
                content: assistant.content.clone(),
                tool_call_count: assistant.tool_calls.len(),
            })
            .await;
            self.emit_stream(StreamEvent::TurnEnd { turn });

            if assistant.tool_calls.is_empty() || !self.config.enable_tools {
                last_assistant = Some(assistant);
                break FinishReason::Complete;
            }

            let calls = assistant.tool_calls.clone();
            last_assistant = Some(assistant);
            for call in calls {
                if cancel.is_cancelled() {
                    break 'outer FinishReason::Aborted;
                }

                let outcomes = self
                    .emit(AgentEvent::BeforeToolCall {
                        tool_call: call.clone(),
                        turn,
                    })
                    .await;

                let result_text = match first_block(&outcomes).map(str::to_string) {
                    Some(reason) => format!("[Blocked] {reason}"),
                    None => {
                        let raw = self.dispatch_tool(&call, &snapshot, turn).await;
                        let outcomes = self
                            .emit(AgentEvent::AfterToolResult {
                                tool_call: call.clone(),
                                result: raw.clone(),
                                turn,
                            })
                            .await;
                        chain_results(outcomes, raw)
                    }
                };

                self.history
                    .push(AgentMessage::tool_result(&call.id, &call.name, &result_text));
                self.emit_stream(StreamEvent::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: result_text,
                });

                // Steering consumed between tool calls: remaining calls in
                // this turn are cancelled, the steer becomes the next user
                // message.
                if let Some(message) = self.shared.pop_steering() {
                    info!("steering received, cancelling remaining tool calls");
                    self.history.push(AgentMessage::user(message));
                    break;
                }
            }
        };

        self.emit_stream(StreamEvent::Done {
            finish_reason: finish,
        });

        let response = match finish {
            FinishReason::Complete => {
                last_assistant.unwrap_or_else(|| AgentMessage::assistant(""))
            }
            FinishReason::MaxTurns => AgentMessage::assistant(
                "[Max turns reached. Please continue the conversation.]",
            ),
            FinishReason::Aborted => AgentMessage::assistant("[Aborted]"),
            // the error path returned early above
            FinishReason::Error => AgentMessage::assistant("[Error]"),
        };
        Ok((response, finish))
    }

    async fn maybe_compact(&mut self) -> anyhow::Result<()> {
        let needs = self
            .context
            .as_ref()
            .map(|cm| cm.should_compact(&self.history))
            .unwrap_or(false);
        if !needs {
            return Ok(());
        }
        let manager = self.context.take().expect("context manager present");
        let outcome = manager.compact(std::mem::take(&mut self.history)).await;
        self.context = Some(manager);
        let outcome = outcome?;
        self.history = outcome.messages;
        info!(
            tokens_before = outcome.tokens_before,
            tokens_after = outcome.tokens_after,
            "history compacted"
        );
        self.emit(AgentEvent::Compaction {
            messages_before: outcome.messages_before,
            messages_after: outcome.messages_after,
            tokens_before: outcome.tokens_before,
            tokens_after: outcome.tokens_after,
        })
        .await;
        Ok(())
    }

    fn build_request(
        &self,
        messages: &[AgentMessage],
        snapshot: &SkillSnapshot,
        cancel: &CancellationToken,
    ) -> AdapterRequest {
        let mut llm_messages = Vec::new();
        let system_prompt = self.build_system_prompt(snapshot);
        if !system_prompt.is_empty() {
            llm_messages.push(LlmMessage::System {
                content: system_prompt,
            });
        }
        llm_messages.extend(project_messages(messages));

        AdapterRequest {
            messages: llm_messages,
            tools: self.tool_definitions(snapshot),
            model: self.current_model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            thinking_level: self.config.thinking_level,
            cancel: cancel.child_token(),
        }
    }

    /// Base prompt, project context files, the skills prompt (full or the
    /// budget-capped metadata projection), and the slash-command hint.
    fn build_system_prompt(&self, snapshot: &SkillSnapshot) -> String {
        let mut parts = Vec::new();
        if !self.config.system_prompt.is_empty() {
            parts.push(self.config.system_prompt.clone());
        }
        if !self.context_files.is_empty() {
            parts.push(context_files::render(&self.context_files));
        }
        if self.include_skills_prompt {
            let budget = self.config.skill_description_budget;
            let prompt = if budget > 0 && snapshot.prompt.len() > budget {
                let visible: Vec<&Skill> = snapshot
                    .skills
                    .iter()
                    .filter(|s| !s.metadata.disable_model_invocation)
                    .map(|s| s.as_ref())
                    .collect();
                format_metadata_prompt(&visible, budget)
            } else {
                snapshot.prompt.clone()
            };
            if !prompt.is_empty() {
                parts.push(prompt);
            }

            let invocable: Vec<String> = snapshot
                .skills
                .iter()
                .filter(|s| s.metadata.user_invocable)
                .map(|s| format!("/{}", s.name))
                .collect();
            if !invocable.is_empty() {
                parts.push(format!(
                    "<user-invocable-skills>\nThe user can invoke these skills directly: {}\n</user-invocable-skills>",
                    invocable.join(", ")
                ));
            }
        }
        parts.join("\n\n")
    }

    /// Registry tools plus the `skill` tool and per-action tools, filtered
    /// by the active `allowed_tools` restriction.
    fn tool_definitions(&self, snapshot: &SkillSnapshot) -> Vec<ToolDefinition> {
        if !self.config.enable_tools {
            return Vec::new();
        }
        let allowed = self.active_allowed_tools.as_ref();
        let mut defs = self.tools.definitions(allowed);

        let visible: Vec<&Arc<Skill>> = snapshot
            .skills
            .iter()
            .filter(|s| !s.metadata.disable_model_invocation)
            .collect();
        if !visible.is_empty() && allowed.is_none_or(|set| set.contains("skill")) {
            defs.push(skill_tool_definition(&visible));
        }

        for skill in &snapshot.skills {
            for action in skill.actions.values() {
                let name = format!("{}:{}", skill.name, action.name);
                if allowed.is_none_or(|set| set.contains(&name)) {
                    defs.push(action_tool_definition(skill, action, &name));
                }
            }
        }
        defs
    }

    // ────────────── Tool dispatch ──────────────

    async fn dispatch_tool(
        &mut self,
        call: &ToolCall,
        snapshot: &SkillSnapshot,
        turn: u32,
    ) -> String {
        let args: HashMap<String, Value> = if call.arguments.trim().is_empty() {
            HashMap::new()
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(parsed) => parsed,
                Err(e) => return format!("Error: Invalid JSON arguments: {e}"),
            }
        };

        if let Some(allowed) = &self.active_allowed_tools {
            if !allowed.contains(&call.name) {
                return format!(
                    "Error: Tool '{}' is not permitted during this skill invocation",
                    call.name
                );
            }
        }

        if call.name == "skill" {
            return self.handle_skill_tool(&args, snapshot).await;
        }

        if let Some((skill_name, action_name)) = call.name.split_once(':') {
            return self
                .handle_action_tool(skill_name, action_name, &args, snapshot)
                .await;
        }

        // Registry tool with streamed updates forwarded to the bus.
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let events = Arc::clone(&self.events);
        let agent_id = self.agent_id.clone();
        let call_id = call.id.clone();
        let call_name = call.name.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                events
                    .emit(&EventEnvelope::new(
                        agent_id.clone(),
                        AgentEvent::ToolExecutionUpdate {
                            tool_call_id: call_id.clone(),
                            tool_name: call_name.clone(),
                            chunk,
                            turn,
                        },
                    ))
                    .await;
            }
        });

        let ctx = ToolContext {
            cancel: self.shared.cancel.clone(),
            output: Some(tx),
        };
        let result = self.tools.execute(&call.name, args, &ctx).await;
        drop(ctx);
        let _ = forwarder.await;
        result
    }

    /// The `skill` tool: on-demand content loading, per-skill model
    /// switching, and fork execution.
    async fn handle_skill_tool(
        &mut self,
        args: &HashMap<String, Value>,
        snapshot: &SkillSnapshot,
    ) -> String {
        let name = args.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = args
            .get("arguments")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let Some(skill) = snapshot.get(name).cloned() else {
            return format!(
                "Error: Skill '{name}' not found. Available: {}",
                snapshot.skill_names().join(", ")
            );
        };
        if skill.metadata.disable_model_invocation {
            return format!("Error: Skill '{name}' cannot be invoked by the model");
        }

        let previous_model = match skill.metadata.model.clone() {
            Some(model) if model != self.current_model => {
                let previous = self.current_model.clone();
                self.set_model(&model).await;
                Some(previous)
            }
            _ => None,
        };

        let result = if skill.metadata.context == SkillContext::Fork {
            match self.fork_skill(&skill, &arguments).await {
                Ok(text) => text,
                Err(e) => format!("Error executing skill '{name}': {e}"),
            }
        } else {
            let mut content = self.resolve_skill_content(&skill, &arguments).await;
            if !skill.metadata.allowed_tools.is_empty() {
                content = format!(
                    "[Allowed tools for this skill: {}]\n\n{content}",
                    skill.metadata.allowed_tools.join(", ")
                );
            }
            content
        };

        if let Some(previous) = previous_model {
            self.set_model(&previous).await;
        }
        result
    }

    async fn handle_action_tool(
        &self,
        skill_name: &str,
        action_name: &str,
        args: &HashMap<String, Value>,
        snapshot: &SkillSnapshot,
    ) -> String {
        let Some(skill) = snapshot.get(skill_name) else {
            return format!("Error: Tool '{skill_name}:{action_name}' not found");
        };
        let named: serde_json::Map<String, Value> =
            args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let opts = ExecOptions {
            cancel: Some(self.shared.cancel.clone()),
            ..Default::default()
        };
        match self
            .engine
            .execute_action(skill, action_name, &named, opts)
            .await
        {
            Ok(result) if result.success => {
                if result.output.is_empty() {
                    "(no output)".to_string()
                } else {
                    result.output
                }
            }
            Ok(result) => format!(
                "Error (exit {}): {}",
                result.exit_code,
                result.error.unwrap_or_default()
            ),
            Err(e) => format!("Error: {e}"),
        }
    }

    /// Placeholder substitution then inline command expansion.
    async fn resolve_skill_content(&self, skill: &Skill, arguments: &str) -> String {
        let content =
            substitute_placeholders(&skill.content, arguments, &|name| std::env::var(name).ok());
        expand_inline_commands(&content, self.engine.runtime()).await
    }

    // ────────────── Fork execution ──────────────

    /// Run a skill in a child runner with isolated history seeded from the
    /// resolved skill content. The child shares the engine, adapter, and
    /// event bus (its events carry the child id) and inherits `max_turns`
    /// and the abort signal.
    fn fork_skill<'a>(
        &'a self,
        skill: &'a Skill,
        arguments: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let resolved = self.resolve_skill_content(skill, arguments).await;
            let child_id = format!("{}/fork-{}", self.agent_id, short_id());
            info!(child = %child_id, skill = %skill.name, "forking skill");

            let mut child_config = self.config.clone();
            child_config.system_prompt = resolved;
            child_config.load_context_files = false;
            if let Some(model) = &skill.metadata.model {
                child_config.model = model.clone();
            }

            let mut child = AgentRunner::new(
                Arc::clone(&self.engine),
                Arc::clone(&self.adapter),
                child_config,
            )
            .with_events(Arc::clone(&self.events))
            .with_retry_policy(self.retry);
            child.agent_id = child_id;
            child.include_skills_prompt = false;
            child.shared = Arc::new(RunnerShared::new(self.shared.cancel.child_token()));
            if !skill.metadata.allowed_tools.is_empty() {
                child.active_allowed_tools =
                    Some(skill.metadata.allowed_tools.iter().cloned().collect());
            }

            let user_message = if arguments.is_empty() {
                "Execute this skill.".to_string()
            } else {
                arguments.to_string()
            };
            let fut: BoxFuture<'_, anyhow::Result<AgentMessage>> =
                Box::pin(child.chat(&user_message));
            let response = fut.await?;
            Ok(response.content)
        })
    }

    // ────────────── Event helpers ──────────────

    async fn emit(&self, event: AgentEvent) -> Vec<EventOutcome> {
        self.events
            .emit(&EventEnvelope::new(self.agent_id.clone(), event))
            .await
    }

    fn emit_stream(&self, event: StreamEvent) {
        // Dropped silently when nobody is subscribed.
        let _ = self.stream_tx.send(event);
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

/// Parse `/name args`. Returns `None` for non-slash input.
fn parse_slash(input: &str) -> Option<(&str, &str)> {
    let rest = input.trim().strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    match rest.split_once(char::is_whitespace) {
        Some((name, args)) => Some((name, args.trim())),
        None => Some((rest, "")),
    }
}

/// Short unique id (8 hex chars from timestamp + counter).
fn short_id() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = nanos
        .wrapping_mul(6364136223846793005)
        .wrapping_add(count as u64);
    format!("{:08x}", (mixed >> 32) as u32)
}

fn skill_tool_definition(visible: &[&Arc<Skill>]) -> ToolDefinition {
    let names: Vec<&str> = visible.iter().map(|s| s.name.as_str()).collect();
    ToolDefinition::new(
        "skill",
        "Load and execute a skill by name. Skills provide specialized \
         capabilities and detailed instructions. Call this when the user's \
         request matches a skill's description.",
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": format!("The skill name to invoke. Available: {}", names.join(", ")),
                },
                "arguments": {
                    "type": "string",
                    "description": "Optional arguments to pass to the skill",
                }
            },
            "required": ["name"]
        }),
    )
}

fn action_tool_definition(skill: &Skill, action: &SkillAction, name: &str) -> ToolDefinition {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for param in &action.params {
        let json_type = match param.kind.as_str() {
            "number" => "number",
            "bool" => "boolean",
            _ => "string",
        };
        let mut prop = serde_json::Map::new();
        prop.insert("type".into(), json!(json_type));
        let description = if param.kind == "file" {
            format!("{} (file path)", not_empty(&param.description, &param.name))
        } else {
            not_empty(&param.description, &param.name).to_string()
        };
        prop.insert("description".into(), json!(description));
        if let Some(default) = &param.default {
            prop.insert("default".into(), json!(default));
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        if param.required {
            required.push(param.name.clone());
        }
    }

    let description = if action.description.is_empty() {
        format!("{} {}", skill.name, action.name)
    } else {
        action.description.clone()
    };
    ToolDefinition::new(
        name,
        description,
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    )
}

fn not_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
