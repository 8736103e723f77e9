//! Eligibility filter — decides whether a skill is usable in the current
//! environment.
//!
//! The filter is pure: every environment question goes through an
//! [`EnvProbe`] (platform id, PATH lookup, env lookup, per-skill config), so
//! identical probe responses always produce identical results. Checks run in
//! a fixed order and the first failure short-circuits.

use std::collections::HashMap;
use std::sync::Arc;

use skillforge_core::config::{SkillEntryConfig, SkillsConfig};

use crate::model::{Skill, SkillSource};

// ─────────────────────────────────────────────
// Probe
// ─────────────────────────────────────────────

/// Environment lookups handed to the filter so it stays pure and testable.
#[derive(Clone)]
pub struct EnvProbe {
    /// Platform id: `darwin`, `linux`, or `windows`.
    pub platform: String,
    /// PATH lookup.
    pub has_binary: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    /// Env var lookup; `None` or empty string means unset.
    pub env_var: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
    /// Per-skill configuration keyed by skill name.
    pub entries: HashMap<String, SkillEntryConfig>,
    /// When set, bundled skills outside the list are rejected.
    pub bundled_allowlist: Option<Vec<String>>,
}

impl EnvProbe {
    /// Probe backed by the host: real PATH scan, real env, config entries.
    pub fn from_host(config: &SkillsConfig) -> Self {
        EnvProbe {
            platform: host_platform().to_string(),
            has_binary: Arc::new(binary_on_path),
            env_var: Arc::new(|name| std::env::var(name).ok()),
            entries: config.entries.clone(),
            bundled_allowlist: config.bundled_allowlist.clone(),
        }
    }

    fn entry(&self, name: &str) -> SkillEntryConfig {
        self.entries.get(name).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for EnvProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvProbe")
            .field("platform", &self.platform)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Platform id in the `requires.os` vocabulary.
fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "windows",
        _ => "linux",
    }
}

/// Scan PATH for a binary, without shelling out.
fn binary_on_path(name: &str) -> bool {
    let path_var = match std::env::var("PATH") {
        Ok(v) => v,
        Err(_) => return false,
    };
    for dir in std::env::split_paths(&path_var) {
        if dir.join(name).is_file() {
            return true;
        }
        if cfg!(windows) && dir.join(format!("{name}.exe")).is_file() {
            return true;
        }
    }
    false
}

// ─────────────────────────────────────────────
// Filter
// ─────────────────────────────────────────────

/// Result of an eligibility check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    /// First failing check, when ineligible.
    pub reason: Option<String>,
}

impl Eligibility {
    fn ok() -> Self {
        Eligibility { eligible: true, reason: None }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Eligibility {
            eligible: false,
            reason: Some(reason.into()),
        }
    }
}

/// Evaluate the fixed check sequence; the first failure short-circuits.
///
/// 1. `always` accepts unconditionally.
/// 2. Disabled by per-skill config.
/// 3. Bundled skill outside the bundled allowlist.
/// 4. Unsupported platform.
/// 5. Missing required binary (first missing reported).
/// 6. None of `any_bins` resolve.
/// 7. Missing required env var (first missing reported).
pub fn check_eligibility(skill: &Skill, probe: &EnvProbe) -> Eligibility {
    if skill.metadata.always {
        return Eligibility::ok();
    }

    let entry = probe.entry(&skill.name);
    if !entry.enabled {
        return Eligibility::rejected(format!("skill '{}' disabled by config", skill.name));
    }

    if skill.source == SkillSource::Bundled {
        if let Some(allowlist) = &probe.bundled_allowlist {
            if !allowlist.iter().any(|n| n == &skill.name) {
                return Eligibility::rejected(format!(
                    "bundled skill '{}' not in allowlist",
                    skill.name
                ));
            }
        }
    }

    let requires = &skill.metadata.requires;

    if !requires.os.is_empty() && !requires.os.iter().any(|os| os == &probe.platform) {
        return Eligibility::rejected(format!(
            "requires OS {:?}, current is {}",
            requires.os, probe.platform
        ));
    }

    for bin in &requires.bins {
        if !(probe.has_binary)(bin) {
            return Eligibility::rejected(format!("required binary '{bin}' not found"));
        }
    }

    if !requires.any_bins.is_empty()
        && !requires.any_bins.iter().any(|b| (probe.has_binary)(b))
    {
        return Eligibility::rejected(format!(
            "none of required binaries found: {:?}",
            requires.any_bins
        ));
    }

    for env_name in &requires.env {
        if !env_satisfied(env_name, skill, &entry, probe) {
            return Eligibility::rejected(format!("required env var '{env_name}' not set"));
        }
    }

    Eligibility::ok()
}

/// An env requirement is satisfied by the real environment, a per-skill env
/// override, or a configured API key on the skill's `primary_env`.
fn env_satisfied(name: &str, skill: &Skill, entry: &SkillEntryConfig, probe: &EnvProbe) -> bool {
    if (probe.env_var)(name).is_some_and(|v| !v.is_empty()) {
        return true;
    }
    if entry.env.contains_key(name) {
        return true;
    }
    skill.metadata.primary_env.as_deref() == Some(name) && entry.api_key.is_some()
}

/// Filter a loaded set down to the eligible skills.
pub fn eligible_skills(skills: &[Skill], probe: &EnvProbe) -> Vec<Skill> {
    skills
        .iter()
        .filter(|s| check_eligibility(s, probe).eligible)
        .cloned()
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SkillMetadata, SkillRequirements};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn make_skill(name: &str) -> Skill {
        Skill {
            name: name.into(),
            description: "test".into(),
            content: "body".into(),
            file_path: PathBuf::from("/skills/t/SKILL.md"),
            base_dir: PathBuf::from("/skills/t"),
            source: SkillSource::Workspace,
            metadata: SkillMetadata::default(),
            actions: BTreeMap::new(),
        }
    }

    fn probe_with(bins: &[&str], env: &[(&str, &str)]) -> EnvProbe {
        let bins: Vec<String> = bins.iter().map(|s| s.to_string()).collect();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvProbe {
            platform: "linux".into(),
            has_binary: Arc::new(move |name| bins.iter().any(|b| b == name)),
            env_var: Arc::new(move |name| env.get(name).cloned()),
            entries: HashMap::new(),
            bundled_allowlist: None,
        }
    }

    #[test]
    fn no_requirements_is_eligible() {
        let result = check_eligibility(&make_skill("plain"), &probe_with(&[], &[]));
        assert!(result.eligible);
        assert!(result.reason.is_none());
    }

    #[test]
    fn always_bypasses_everything() {
        let mut skill = make_skill("forced");
        skill.metadata.always = true;
        skill.metadata.requires.bins = vec!["__missing__".into()];
        let mut probe = probe_with(&[], &[]);
        probe
            .entries
            .insert("forced".into(), SkillEntryConfig { enabled: false, ..Default::default() });

        assert!(check_eligibility(&skill, &probe).eligible);
    }

    #[test]
    fn disabled_by_config_rejects() {
        let skill = make_skill("github");
        let mut probe = probe_with(&[], &[]);
        probe
            .entries
            .insert("github".into(), SkillEntryConfig { enabled: false, ..Default::default() });

        let result = check_eligibility(&skill, &probe);
        assert!(!result.eligible);
        assert!(result.reason.unwrap().contains("disabled by config"));
    }

    #[test]
    fn bundled_allowlist_enforced() {
        let mut skill = make_skill("weather");
        skill.source = SkillSource::Bundled;
        let mut probe = probe_with(&[], &[]);
        probe.bundled_allowlist = Some(vec!["github".into()]);

        let result = check_eligibility(&skill, &probe);
        assert!(!result.eligible);
        assert!(result.reason.unwrap().contains("allowlist"));

        // workspace skills are not subject to the allowlist
        let ws = make_skill("weather");
        assert!(check_eligibility(&ws, &probe).eligible);
    }

    #[test]
    fn os_mismatch_rejects() {
        let mut skill = make_skill("mac-only");
        skill.metadata.requires.os = vec!["darwin".into()];
        let result = check_eligibility(&skill, &probe_with(&[], &[]));
        assert!(!result.eligible);
        assert!(result.reason.unwrap().contains("requires OS"));
    }

    #[test]
    fn first_missing_bin_reported() {
        let mut skill = make_skill("cli");
        skill.metadata.requires.bins = vec!["present".into(), "absent-one".into(), "absent-two".into()];
        let result = check_eligibility(&skill, &probe_with(&["present"], &[]));
        assert!(!result.eligible);
        assert!(result.reason.unwrap().contains("absent-one"));
    }

    #[test]
    fn any_bins_needs_one() {
        let mut skill = make_skill("fetcher");
        skill.metadata.requires.any_bins = vec!["curl".into(), "wget".into()];

        assert!(check_eligibility(&skill, &probe_with(&["wget"], &[])).eligible);

        let result = check_eligibility(&skill, &probe_with(&[], &[]));
        assert!(!result.eligible);
        assert!(result.reason.unwrap().contains("none of required binaries"));
    }

    #[test]
    fn env_must_be_nonempty() {
        let mut skill = make_skill("api");
        skill.metadata.requires.env = vec!["API_KEY".into()];

        assert!(check_eligibility(&skill, &probe_with(&[], &[("API_KEY", "sk-1")])).eligible);
        assert!(!check_eligibility(&skill, &probe_with(&[], &[("API_KEY", "")])).eligible);
        assert!(!check_eligibility(&skill, &probe_with(&[], &[])).eligible);
    }

    #[test]
    fn configured_api_key_satisfies_primary_env() {
        let mut skill = make_skill("api");
        skill.metadata.primary_env = Some("API_KEY".into());
        skill.metadata.requires.env = vec!["API_KEY".into()];

        let mut probe = probe_with(&[], &[]);
        probe.entries.insert(
            "api".into(),
            SkillEntryConfig { api_key: Some("sk-cfg".into()), ..Default::default() },
        );
        assert!(check_eligibility(&skill, &probe).eligible);
    }

    #[test]
    fn config_env_override_satisfies_requirement() {
        let mut skill = make_skill("api");
        skill.metadata.requires.env = vec!["TOKEN".into()];

        let mut probe = probe_with(&[], &[]);
        let mut entry = SkillEntryConfig::default();
        entry.env.insert("TOKEN".into(), "t".into());
        probe.entries.insert("api".into(), entry);

        assert!(check_eligibility(&skill, &probe).eligible);
    }

    #[test]
    fn check_order_disabled_before_requirements() {
        // Disabled wins over a missing-binary reason: checks short-circuit in order.
        let mut skill = make_skill("both");
        skill.metadata.requires.bins = vec!["__missing__".into()];
        let mut probe = probe_with(&[], &[]);
        probe
            .entries
            .insert("both".into(), SkillEntryConfig { enabled: false, ..Default::default() });

        let result = check_eligibility(&skill, &probe);
        assert!(result.reason.unwrap().contains("disabled"));
    }

    #[test]
    fn filter_is_deterministic_and_side_effect_free() {
        let mut skill = make_skill("det");
        skill.metadata.requires.bins = vec!["tool".into()];
        let probe = probe_with(&["tool"], &[]);

        let first = check_eligibility(&skill, &probe);
        let second = check_eligibility(&skill, &probe);
        assert_eq!(first, second);
        assert!(first.eligible);
    }

    #[test]
    fn eligible_skills_filters_set() {
        let ok = make_skill("ok");
        let mut bad = make_skill("bad");
        bad.metadata.requires.bins = vec!["__nope__".into()];

        let kept = eligible_skills(&[ok, bad], &probe_with(&[], &[]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "ok");
    }

    #[test]
    fn host_probe_finds_common_binary() {
        let probe = EnvProbe::from_host(&SkillsConfig::default());
        // `ls` exists on any Unix PATH; on Windows `cmd` resolves via .exe probing.
        #[cfg(unix)]
        assert!((probe.has_binary)("ls"));
    }
}
