//! Skills engine — ties the loader, filter, snapshot, and runtime together.
//!
//! The engine owns the current [`SkillSnapshot`] behind an atomic reference
//! swap: readers grab an `Arc` and keep using it for the whole turn even if
//! a reload publishes a newer snapshot meanwhile. `invalidate()` (or the
//! file watcher) drops the cached snapshot; the next reader rebuilds with
//! `version + 1`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use skillforge_core::config::SkillsConfig;
use skillforge_core::types::ExecutionResult;

use crate::error::{SkillError, SkillResult};
use crate::filter::{eligible_skills, EnvProbe};
use crate::loader::SkillLoader;
use crate::model::{Skill, SkillAction, SkillSnapshot};
use crate::prompt::build_snapshot;
use crate::runtime::{ExecOptions, ShellRuntime};

/// Central skills facade shared by the agent loop and its tools.
pub struct SkillsEngine {
    config: SkillsConfig,
    loader: SkillLoader,
    probe: EnvProbe,
    runtime: ShellRuntime,
    snapshot: RwLock<Option<Arc<SkillSnapshot>>>,
    version: AtomicU64,
}

impl SkillsEngine {
    pub fn new(config: SkillsConfig) -> Self {
        let loader = SkillLoader::from_config(&config);
        let probe = EnvProbe::from_host(&config);
        let runtime = ShellRuntime::new(Duration::from_secs(config.default_timeout_secs));
        Self {
            config,
            loader,
            probe,
            runtime,
            snapshot: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Replace the environment probe (tests inject deterministic probes).
    pub fn with_probe(mut self, probe: EnvProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &SkillsConfig {
        &self.config
    }

    pub fn runtime(&self) -> &ShellRuntime {
        &self.runtime
    }

    /// Root directories to watch for hot reload.
    pub fn watch_roots(&self) -> Vec<std::path::PathBuf> {
        self.loader
            .roots()
            .iter()
            .map(|r| r.dir.clone())
            .filter(|d| d.exists())
            .collect()
    }

    // ────────────── Snapshot lifecycle ──────────────

    /// Current snapshot, building one if none is cached.
    pub fn snapshot(&self) -> Arc<SkillSnapshot> {
        if let Some(snapshot) = self.snapshot.read().unwrap().clone() {
            return snapshot;
        }
        self.rebuild()
    }

    /// Load, filter, and publish a fresh snapshot with a bumped version.
    pub fn rebuild(&self) -> Arc<SkillSnapshot> {
        let report = self.loader.load();
        let eligible = eligible_skills(&report.skills, &self.probe);
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(build_snapshot(
            eligible,
            self.config.prompt_format,
            version,
        ));
        info!(
            version,
            skills = snapshot.skills.len(),
            hash = %snapshot.content_hash,
            "built skill snapshot"
        );
        *self.snapshot.write().unwrap() = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the cached snapshot. In-flight turns keep the one they hold.
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap() = None;
    }

    pub fn get_skill(&self, name: &str) -> Option<Arc<Skill>> {
        self.snapshot().get(name).cloned()
    }

    // ────────────── Subprocess execution ──────────────

    /// Env vars contributed by skill configuration: per-skill env entries
    /// plus configured API keys mapped through each skill's `primary_env`.
    pub fn skill_env(&self) -> HashMap<String, String> {
        let snapshot = self.snapshot();
        let mut env = HashMap::new();
        for skill in &snapshot.skills {
            let entry = self.config.entry(&skill.name);
            for (key, value) in &entry.env {
                env.insert(key.clone(), value.clone());
            }
            if let (Some(primary), Some(api_key)) =
                (&skill.metadata.primary_env, &entry.api_key)
            {
                env.insert(primary.clone(), api_key.clone());
            }
        }
        env
    }

    /// Execute a command with the skill environment layered in. The explicit
    /// `opts.env` wins over skill-config values; the host env is untouched.
    pub async fn execute(&self, command: &str, opts: ExecOptions) -> ExecutionResult {
        self.runtime
            .execute(command, self.compose_env(opts))
            .await
    }

    /// Execute a script body with the skill environment layered in.
    pub async fn execute_script(&self, script: &str, opts: ExecOptions) -> ExecutionResult {
        self.runtime
            .execute_script(script, self.compose_env(opts))
            .await
    }

    fn compose_env(&self, mut opts: ExecOptions) -> ExecOptions {
        let mut env = self.skill_env();
        env.extend(opts.env);
        opts.env = env;
        opts
    }

    // ────────────── Deterministic actions ──────────────

    /// Run a skill action script with positional argument mapping.
    pub async fn execute_action(
        &self,
        skill: &Skill,
        action_name: &str,
        named_args: &serde_json::Map<String, Value>,
        mut opts: ExecOptions,
    ) -> SkillResult<ExecutionResult> {
        let action = skill
            .get_action(action_name)
            .ok_or_else(|| SkillError::ActionNotFound {
                skill: skill.name.clone(),
                action: action_name.to_string(),
            })?;

        let script_path = skill.base_dir.join(&action.script);
        let mut command = shell_quote(&script_path.to_string_lossy());
        for arg in build_action_args(action, named_args) {
            command.push(' ');
            command.push_str(&shell_quote(&arg));
        }

        if opts.cwd.is_none() {
            opts.cwd = Some(skill.base_dir.clone());
        }
        Ok(self.execute(&command, opts).await)
    }
}

/// Map named arguments onto the action's positional CLI convention.
///
/// Params with a `position` are placed in position order; the rest append in
/// declaration order. Missing values fall back to the declared default, or
/// are skipped entirely.
fn build_action_args(action: &SkillAction, named: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut positional: Vec<(usize, String)> = Vec::new();
    let mut trailing: Vec<String> = Vec::new();

    for param in &action.params {
        let value = match named.get(&param.name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => param.default.clone(),
            Some(other) => Some(other.to_string()),
        };
        let Some(value) = value else { continue };
        match param.position {
            Some(pos) => positional.push((pos, value)),
            None => trailing.push(value),
        }
    }

    positional.sort_by_key(|(pos, _)| *pos);
    positional
        .into_iter()
        .map(|(_, v)| v)
        .chain(trailing)
        .collect()
}

/// Single-quote a string for POSIX shells.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
