//! Skill data model.
//!
//! A `Skill` is an immutable record parsed from a `SKILL.md` file. Skills are
//! grouped into a `SkillSnapshot`: an immutable, versioned view of the
//! eligible set with a pre-rendered prompt and a stable content hash.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

// ─────────────────────────────────────────────
// Sources and execution context
// ─────────────────────────────────────────────

/// Where a skill was discovered. Later sources override earlier ones on
/// name collision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillSource {
    /// Shipped with the application.
    Bundled,
    /// User-installed (e.g. `~/.skillforge/skills`).
    Managed,
    /// Project-local.
    Workspace,
    /// From a plugin.
    Plugin,
    /// From an extra configured root.
    Extra,
}

impl SkillSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillSource::Bundled => "bundled",
            SkillSource::Managed => "managed",
            SkillSource::Workspace => "workspace",
            SkillSource::Plugin => "plugin",
            SkillSource::Extra => "extra",
        }
    }
}

/// How a skill invocation runs: inline in the parent conversation, or in a
/// forked child runner with isolated history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SkillContext {
    #[default]
    Inline,
    Fork,
}

// ─────────────────────────────────────────────
// Requirements, install specs, actions
// ─────────────────────────────────────────────

/// Requirements that must be satisfied for a skill to be eligible.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkillRequirements {
    /// CLI binaries that must all be on PATH.
    pub bins: Vec<String>,
    /// At least one of these binaries must be on PATH.
    pub any_bins: Vec<String>,
    /// Env vars that must all be set non-empty.
    pub env: Vec<String>,
    /// Supported platform ids (`darwin`, `linux`, `windows`); empty = all.
    pub os: Vec<String>,
}

impl SkillRequirements {
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty() && self.any_bins.is_empty() && self.env.is_empty() && self.os.is_empty()
    }
}

/// Installation hint for a skill's dependencies (introspection only).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkillInstallSpec {
    /// Install method (`brew`, `apt`, `npm`, `cargo`, `download`, ...).
    pub kind: String,
    /// Package/formula id.
    pub id: Option<String>,
    /// Display label.
    pub label: Option<String>,
    /// Binaries the install produces.
    pub bins: Vec<String>,
    /// Applicable platforms.
    pub os: Vec<String>,
}

/// A parameter of a deterministic skill action.
#[derive(Clone, Debug, PartialEq)]
pub struct SkillActionParam {
    pub name: String,
    /// `string`, `file`, `number`, or `bool`.
    pub kind: String,
    pub required: bool,
    /// 1-based positional index for CLI mapping.
    pub position: Option<usize>,
    pub description: String,
    pub default: Option<String>,
}

/// A deterministic named script that runs without the LLM.
#[derive(Clone, Debug, PartialEq)]
pub struct SkillAction {
    pub name: String,
    /// Script path relative to the skill's base directory.
    pub script: String,
    pub description: String,
    /// `text` or `json`.
    pub output: String,
    pub params: Vec<SkillActionParam>,
}

// ─────────────────────────────────────────────
// Metadata and the skill record
// ─────────────────────────────────────────────

/// Extended metadata controlling eligibility and invocation behaviour.
#[derive(Clone, Debug, PartialEq)]
pub struct SkillMetadata {
    /// Per-skill model override.
    pub model: Option<String>,
    pub context: SkillContext,
    /// Tool names the model may use while this skill is active; empty = all.
    pub allowed_tools: Vec<String>,
    /// Autocomplete hint for slash commands.
    pub argument_hint: Option<String>,
    /// Can the user invoke this via `/skill-name`?
    pub user_invocable: bool,
    /// Hide from the system prompt and the `skill` tool.
    pub disable_model_invocation: bool,
    /// Accept unconditionally, bypassing every eligibility check.
    pub always: bool,
    pub emoji: Option<String>,
    /// Env var carrying this skill's API credential.
    pub primary_env: Option<String>,
    pub requires: SkillRequirements,
    pub install: Vec<SkillInstallSpec>,
    /// Lifecycle point name → shell command.
    pub hooks: BTreeMap<String, String>,
}

impl Default for SkillMetadata {
    fn default() -> Self {
        Self {
            model: None,
            context: SkillContext::Inline,
            allowed_tools: Vec::new(),
            argument_hint: None,
            user_invocable: true,
            disable_model_invocation: false,
            always: false,
            emoji: None,
            primary_env: None,
            requires: SkillRequirements::default(),
            install: Vec::new(),
            hooks: BTreeMap::new(),
        }
    }
}

/// A skill loaded from a `SKILL.md` file. Immutable after load; identity is
/// by `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// The prompt body (front-matter stripped).
    pub content: String,
    pub file_path: PathBuf,
    /// Parent directory, used to resolve action script paths.
    pub base_dir: PathBuf,
    pub source: SkillSource,
    pub metadata: SkillMetadata,
    pub actions: BTreeMap<String, SkillAction>,
}

impl Skill {
    /// Stable hash of the record, for change detection and snapshot hashing.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0]);
        hasher.update(self.description.as_bytes());
        hasher.update([0]);
        hasher.update(self.content.as_bytes());
        let digest = hasher.finalize();
        hex_prefix(digest.as_slice(), 16)
    }

    pub fn get_action(&self, name: &str) -> Option<&SkillAction> {
        self.actions.get(name)
    }

    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}

// ─────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────

/// An immutable, versioned view of the eligible skills.
///
/// A snapshot never mutates; hot reload publishes a fresh snapshot with
/// `version + 1` by atomic reference swap. In-flight turns keep using the
/// snapshot they captured.
#[derive(Clone, Debug)]
pub struct SkillSnapshot {
    pub skills: Vec<Arc<Skill>>,
    /// Pre-rendered skills prompt.
    pub prompt: String,
    /// Monotonic version.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    /// Stable hash over the sorted member skills.
    pub content_hash: String,
}

impl SkillSnapshot {
    pub fn get(&self, name: &str) -> Option<&Arc<Skill>> {
        self.skills.iter().find(|s| s.name == name)
    }

    pub fn skill_names(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.name.as_str()).collect()
    }

    /// Hash over all member skills, sorted by name so ordering of discovery
    /// does not affect the digest.
    pub fn hash_skills(skills: &[Arc<Skill>]) -> String {
        let mut entries: Vec<String> = skills.iter().map(|s| s.content_hash()).collect();
        entries.sort();
        let mut hasher = Sha256::new();
        for entry in entries {
            hasher.update(entry.as_bytes());
            hasher.update([0]);
        }
        hex_prefix(hasher.finalize().as_slice(), 16)
    }
}

fn hex_prefix(digest: &[u8], bytes: usize) -> String {
    digest
        .iter()
        .take(bytes)
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
