//! Config loader — reads a JSON config file and applies env overrides.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file (`skillforge.json`)
//! 3. Environment variables `SKILLFORGE_<SECTION>__<FIELD>` (override JSON)
//!
//! A missing file falls back to defaults; a file that exists but cannot be
//! parsed is a fatal startup error.

use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use super::schema::Config;

/// Load configuration from `path`, or defaults when `None`/absent.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) if p.exists() => {
            debug!(path = %p.display(), "loading config");
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config file {}", p.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("invalid config file {}", p.display()))?
        }
        Some(p) => {
            info!(path = %p.display(), "no config file found, using defaults");
            Config::default()
        }
        None => Config::default(),
    };

    Ok(apply_env_overrides(config))
}

/// Save configuration to disk as pretty-printed camelCase JSON.
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Apply `SKILLFORGE_<SECTION>__<FIELD>` environment overrides.
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("SKILLFORGE_AGENT__MODEL") {
        config.agent.model = val;
    }
    if let Ok(val) = std::env::var("SKILLFORGE_AGENT__BASE_URL") {
        config.agent.base_url = Some(val);
    }
    if let Ok(val) = std::env::var("SKILLFORGE_AGENT__API_KEY") {
        config.agent.api_key = Some(val);
    }
    if let Ok(val) = std::env::var("SKILLFORGE_AGENT__MAX_TURNS") {
        if let Ok(n) = val.parse::<u32>() {
            config.agent.max_turns = n;
        }
    }
    if let Ok(val) = std::env::var("SKILLFORGE_AGENT__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.agent.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("SKILLFORGE_AGENT__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.agent.temperature = t;
        }
    }
    if let Ok(val) = std::env::var("SKILLFORGE_SKILLS__WATCH") {
        config.skills.watch = val == "true" || val == "1";
    }
    if let Ok(val) = std::env::var("SKILLFORGE_SKILLS__DEFAULT_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.skills.default_timeout_secs = n;
        }
    }
    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/skillforge.json"))).unwrap();
        assert_eq!(config.agent.max_turns, 50);
    }

    #[test]
    fn valid_json_overrides_defaults() {
        let file = write_temp_json(
            r#"{"agent": {"model": "gpt-4o", "maxTokens": 2048}, "skills": {"watch": true}}"#,
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.agent.max_tokens, 2048);
        assert!(config.skills.watch);
        // untouched defaults survive
        assert_eq!(config.agent.temperature, 0.7);
    }

    #[test]
    fn malformed_json_is_fatal() {
        let file = write_temp_json("not valid json {{{");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skillforge.json");

        let mut config = Config::default();
        config.agent.model = "deepseek-chat".to_string();
        config.skills.default_timeout_secs = 120;

        save_config(&config, &path).unwrap();
        let reloaded = load_config(Some(&path)).unwrap();
        assert_eq!(reloaded.agent.model, "deepseek-chat");
        assert_eq!(reloaded.skills.default_timeout_secs, 120);
    }

    #[test]
    fn env_override_model() {
        std::env::set_var("SKILLFORGE_AGENT__MODEL", "env-model");
        let config = load_config(None).unwrap();
        assert_eq!(config.agent.model, "env-model");
        std::env::remove_var("SKILLFORGE_AGENT__MODEL");
    }

    #[test]
    fn env_override_max_turns() {
        std::env::set_var("SKILLFORGE_AGENT__MAX_TURNS", "7");
        let config = load_config(None).unwrap();
        assert_eq!(config.agent.max_turns, 7);
        std::env::remove_var("SKILLFORGE_AGENT__MAX_TURNS");
    }
}
