//! Skill hook bridge — wires per-skill `hooks` front-matter onto the event
//! bus.
//!
//! Each hook maps a lifecycle point name to a shell command. Hook handlers
//! are purely observational: they never return an outcome, their failures
//! are logged and swallowed, and each command runs under a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use skillforge_core::events::{
    EventBus, EventEnvelope, EventHandler, EventKind, EventOutcome, SubscriptionId,
};
use skillforge_skills::engine::SkillsEngine;
use skillforge_skills::model::SkillSnapshot;
use skillforge_skills::runtime::ExecOptions;

const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

struct HookHandler {
    skill: String,
    command: String,
    engine: Arc<SkillsEngine>,
}

#[async_trait]
impl EventHandler for HookHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<Option<EventOutcome>> {
        let result = self
            .engine
            .execute(&self.command, ExecOptions::with_timeout(HOOK_TIMEOUT))
            .await;
        if result.success {
            debug!(
                skill = %self.skill,
                event = envelope.event.kind().as_str(),
                "skill hook ran"
            );
        } else {
            warn!(
                skill = %self.skill,
                event = envelope.event.kind().as_str(),
                error = result.error.as_deref().unwrap_or("failed"),
                "skill hook failed"
            );
        }
        Ok(None)
    }
}

/// Register every hook declared by the snapshot's skills. Returns the
/// subscription handles; handlers are tagged `skill-hook:<name>` so a
/// reload can bulk-unsubscribe per skill.
pub fn register_skill_hooks(
    bus: &EventBus,
    snapshot: &SkillSnapshot,
    engine: Arc<SkillsEngine>,
) -> Vec<SubscriptionId> {
    let mut subscriptions = Vec::new();
    for skill in &snapshot.skills {
        for (point, command) in &skill.metadata.hooks {
            let Some(kind) = EventKind::parse(point) else {
                warn!(skill = %skill.name, point = %point, "unknown hook lifecycle point");
                continue;
            };
            let handler = Arc::new(HookHandler {
                skill: skill.name.clone(),
                command: command.clone(),
                engine: Arc::clone(&engine),
            });
            subscriptions.push(bus.on(kind, handler, 0, format!("skill-hook:{}", skill.name)));
        }
    }
    subscriptions
}
