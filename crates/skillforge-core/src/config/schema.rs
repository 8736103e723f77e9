//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig`, `SkillsConfig`.
//! JSON on disk uses **camelCase** keys; Rust uses snake_case, converted with
//! `#[serde(rename_all = "camelCase")]`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `skillforge.json` plus env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub skills: SkillsConfig,
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// How much reasoning the model is asked to do.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Short,
    Long,
    Extended,
}

/// Agent loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Default model identifier.
    pub model: String,
    /// Adapter endpoint base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Adapter API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Sampling temperature, passed verbatim to the adapter.
    pub temperature: f64,
    /// Max tokens to generate, passed verbatim to the adapter.
    pub max_tokens: u32,
    /// Inner-loop turn cap.
    pub max_turns: u32,
    /// If false, tool-call dispatch is skipped entirely.
    pub enable_tools: bool,
    pub thinking_level: ThinkingLevel,
    /// Opaque resume marker for external session storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Base system prompt, prepended before skills.
    pub system_prompt: String,
    /// Char cap for the metadata-only skills prompt projection.
    pub skill_description_budget: usize,
    /// Auto-discover AGENTS.md / project context files in cwd and ancestors.
    pub load_context_files: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.7,
            max_tokens: 4096,
            max_turns: 50,
            enable_tools: true,
            thinking_level: ThinkingLevel::Off,
            session_id: None,
            system_prompt: String::new(),
            skill_description_budget: 16_000,
            load_context_files: true,
        }
    }
}

// ─────────────────────────────────────────────
// Skills
// ─────────────────────────────────────────────

/// Output format for the skills system prompt.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptFormat {
    /// Delimited blocks with name, emoji, description, and content.
    #[default]
    Structured,
    /// Markdown with `## <emoji> <name>` headers.
    Markdown,
    /// Machine-readable JSON array.
    Json,
}

/// Per-skill configuration entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillEntryConfig {
    pub enabled: bool,
    /// API key injected through the skill's `primary_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Extra env vars injected into this skill's subprocesses.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl Default for SkillEntryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            env: HashMap::new(),
        }
    }
}

/// Skill discovery and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillsConfig {
    /// Skills shipped with the application (lowest priority).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundled_dir: Option<PathBuf>,
    /// User-installed skills (e.g. `~/.skillforge/skills`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_dir: Option<PathBuf>,
    /// Project-local skill roots, in priority order.
    pub skill_dirs: Vec<PathBuf>,
    /// Additional roots (highest priority).
    pub extra_dirs: Vec<PathBuf>,
    /// When set, bundled skills outside this list are ineligible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundled_allowlist: Option<Vec<String>>,
    /// Per-skill overrides keyed by skill name.
    pub entries: HashMap<String, SkillEntryConfig>,
    pub prompt_format: PromptFormat,
    /// Default subprocess timeout in seconds.
    pub default_timeout_secs: u64,
    /// Enable hot reload of skill roots.
    pub watch: bool,
    /// Debounce window for the file watcher.
    pub watch_debounce_ms: u64,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            bundled_dir: None,
            managed_dir: None,
            skill_dirs: Vec::new(),
            extra_dirs: Vec::new(),
            bundled_allowlist: None,
            entries: HashMap::new(),
            prompt_format: PromptFormat::Structured,
            default_timeout_secs: 60,
            watch: false,
            watch_debounce_ms: 300,
        }
    }
}

impl SkillsConfig {
    /// Per-skill config, falling back to defaults for unknown names.
    pub fn entry(&self, name: &str) -> SkillEntryConfig {
        self.entries.get(name).cloned().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.agent.max_turns, 50);
        assert_eq!(config.agent.skill_description_budget, 16_000);
        assert!(config.agent.enable_tools);
        assert_eq!(config.agent.thinking_level, ThinkingLevel::Off);
        assert_eq!(config.skills.default_timeout_secs, 60);
        assert_eq!(config.skills.watch_debounce_ms, 300);
        assert_eq!(config.skills.prompt_format, PromptFormat::Structured);
    }

    #[test]
    fn camel_case_on_the_wire() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["agent"].get("maxTurns").is_some());
        assert!(json["agent"].get("max_turns").is_none());
        assert!(json["skills"].get("defaultTimeoutSecs").is_some());
    }

    #[test]
    fn partial_json_preserves_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"agent": {"model": "gpt-4o", "maxTurns": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.agent.max_turns, 10);
        assert_eq!(config.agent.max_tokens, 4096);
    }

    #[test]
    fn skill_entry_lookup_falls_back_to_default() {
        let mut skills = SkillsConfig::default();
        skills.entries.insert(
            "github".into(),
            SkillEntryConfig { enabled: false, ..Default::default() },
        );
        assert!(!skills.entry("github").enabled);
        assert!(skills.entry("unknown").enabled);
    }

    #[test]
    fn thinking_level_serializes_lowercase() {
        let json = serde_json::to_value(ThinkingLevel::Extended).unwrap();
        assert_eq!(json, "extended");
    }
}
