//! Skill loader — discovers `*/SKILL.md` files under configured roots and
//! parses them into immutable [`Skill`] records.
//!
//! # File format
//!
//! ```text
//! ---
//! name: github
//! description: "Interact with GitHub using the gh CLI"
//! model: claude-haiku-4
//! context: inline
//! allowed-tools: [execute, read]
//! user-invocable: true
//! metadata:
//!   emoji: "🐙"
//!   primary_env: GITHUB_TOKEN
//!   requires:
//!     bins: [gh]
//!     env: [GITHUB_TOKEN]
//! actions:
//!   list-prs:
//!     script: scripts/list_prs.sh
//!     output: json
//! ---
//!
//! # GitHub Skill
//! ...
//! ```
//!
//! # Ordering
//!
//! Roots load in fixed priority (bundled < managed < workspace < extra);
//! within a root, lexicographic by path. Later wins on name collision;
//! collisions are warnings, not errors. A file that fails to parse is
//! skipped; the rest of the set loads normally.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use skillforge_core::config::SkillsConfig;

use crate::error::SkillError;
use crate::model::{
    Skill, SkillAction, SkillActionParam, SkillContext, SkillInstallSpec, SkillMetadata,
    SkillRequirements, SkillSource,
};

/// Maximum skill name length.
pub const MAX_NAME_LEN: usize = 64;
/// Maximum skill description length.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

static SKILL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9-]{0,63}$").expect("skill name regex must compile")
});

/// Pure name-validity predicate: ≤64 chars, lowercase alphanumerics and
/// hyphens, no leading hyphen.
pub fn is_valid_name(name: &str) -> bool {
    SKILL_NAME_RE.is_match(name)
}

// ─────────────────────────────────────────────
// Raw front-matter shapes
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawFrontmatter {
    name: Option<String>,
    description: Option<String>,
    model: Option<String>,
    context: Option<String>,
    #[serde(rename = "allowed-tools")]
    allowed_tools: Option<Vec<String>>,
    #[serde(rename = "argument-hint")]
    argument_hint: Option<String>,
    #[serde(rename = "user-invocable")]
    user_invocable: Option<bool>,
    #[serde(rename = "disable-model-invocation")]
    disable_model_invocation: Option<bool>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    actions: Option<BTreeMap<String, RawAction>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    emoji: Option<String>,
    #[serde(default)]
    always: Option<bool>,
    #[serde(rename = "primary_env", alias = "primaryEnv")]
    primary_env: Option<String>,
    requires: Option<RawRequirements>,
    #[serde(default)]
    install: Option<Vec<RawInstallSpec>>,
    #[serde(default)]
    hooks: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRequirements {
    #[serde(default)]
    bins: Vec<String>,
    #[serde(default, rename = "any_bins", alias = "anyBins")]
    any_bins: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    os: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInstallSpec {
    kind: Option<String>,
    id: Option<String>,
    label: Option<String>,
    #[serde(default)]
    bins: Vec<String>,
    #[serde(default)]
    os: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    script: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    params: Vec<RawActionParam>,
}

#[derive(Debug, Deserialize)]
struct RawActionParam {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    required: bool,
    position: Option<usize>,
    #[serde(default)]
    description: Option<String>,
    default: Option<String>,
}

// ─────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────

/// Split SKILL.md content into (yaml front-matter, body).
///
/// The front-matter must open with `---` on the first line and close with a
/// `---` line.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    // The opening delimiter must be the whole first line.
    let rest = rest.strip_prefix('\n').or_else(|| {
        rest.strip_prefix("\r\n")
    })?;
    let end = rest.find("\n---")?;
    let yaml = &rest[..end];
    let after = &rest[end + 4..];
    let body = after.trim_start_matches(['\n', '\r']);
    Some((yaml, body))
}

/// Parse a SKILL.md file from its text content.
pub fn parse_skill_file(path: &Path, content: &str, source: SkillSource) -> Result<Skill, SkillError> {
    let (yaml, body) = split_frontmatter(content)
        .ok_or_else(|| SkillError::load(path, "missing YAML front-matter"))?;

    let raw: RawFrontmatter = serde_yaml::from_str(yaml)
        .map_err(|e| SkillError::load(path, format!("YAML parse error: {e}")))?;

    let name = raw
        .name
        .ok_or_else(|| SkillError::load(path, "missing required field `name`"))?;
    if !is_valid_name(&name) {
        return Err(SkillError::load(
            path,
            format!(
                "invalid name `{name}` (must be ≤{MAX_NAME_LEN} lowercase alphanumerics/hyphens, no leading hyphen)"
            ),
        ));
    }

    let description = raw
        .description
        .filter(|d| !d.is_empty())
        .ok_or_else(|| SkillError::load(path, "missing required field `description`"))?;
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(SkillError::load(
            path,
            format!(
                "description too long ({} > {MAX_DESCRIPTION_LEN} chars)",
                description.len()
            ),
        ));
    }

    let context = match raw.context.as_deref() {
        Some("fork") => SkillContext::Fork,
        _ => SkillContext::Inline,
    };

    let nested = raw.metadata.unwrap_or_default();
    let requires = nested
        .requires
        .map(|r| SkillRequirements {
            bins: r.bins,
            any_bins: r.any_bins,
            env: r.env,
            os: r.os,
        })
        .unwrap_or_default();

    let install = nested
        .install
        .unwrap_or_default()
        .into_iter()
        .map(|spec| SkillInstallSpec {
            kind: spec.kind.unwrap_or_else(|| "download".to_string()),
            id: spec.id,
            label: spec.label,
            bins: spec.bins,
            os: spec.os,
        })
        .collect();

    let metadata = SkillMetadata {
        model: raw.model,
        context,
        allowed_tools: raw.allowed_tools.unwrap_or_default(),
        argument_hint: raw.argument_hint,
        user_invocable: raw.user_invocable.unwrap_or(true),
        disable_model_invocation: raw.disable_model_invocation.unwrap_or(false),
        always: nested.always.unwrap_or(false),
        emoji: nested.emoji,
        primary_env: nested.primary_env,
        requires,
        install,
        hooks: nested.hooks.unwrap_or_default(),
    };

    let actions = raw
        .actions
        .unwrap_or_default()
        .into_iter()
        .map(|(action_name, a)| {
            let action = SkillAction {
                name: action_name.clone(),
                script: a.script,
                description: a.description.unwrap_or_default(),
                output: a.output.unwrap_or_else(|| "text".to_string()),
                params: a
                    .params
                    .into_iter()
                    .map(|p| SkillActionParam {
                        name: p.name,
                        kind: p.kind.unwrap_or_else(|| "string".to_string()),
                        required: p.required,
                        position: p.position,
                        description: p.description.unwrap_or_default(),
                        default: p.default,
                    })
                    .collect(),
            };
            (action_name, action)
        })
        .collect();

    Ok(Skill {
        name,
        description,
        content: body.trim_end().to_string(),
        file_path: path.to_path_buf(),
        base_dir: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        source,
        metadata,
        actions,
    })
}

// ─────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────

/// A root directory paired with the source its skills are attributed to.
#[derive(Clone, Debug)]
pub struct SkillRoot {
    pub dir: PathBuf,
    pub source: SkillSource,
}

/// Outcome of a full load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully loaded skills, collisions already resolved (later wins).
    pub skills: Vec<Skill>,
    /// Per-file load failures (the rest of the set still loads).
    pub errors: Vec<SkillError>,
    /// Names that were overridden by a later root.
    pub collisions: Vec<String>,
}

/// Discovers and loads skills from an ordered list of roots.
pub struct SkillLoader {
    roots: Vec<SkillRoot>,
}

impl SkillLoader {
    pub fn new(roots: Vec<SkillRoot>) -> Self {
        Self { roots }
    }

    /// Build roots from config in fixed priority order:
    /// bundled < managed < workspace (skill_dirs) < extra.
    pub fn from_config(config: &SkillsConfig) -> Self {
        let mut roots = Vec::new();
        if let Some(dir) = &config.bundled_dir {
            roots.push(SkillRoot { dir: dir.clone(), source: SkillSource::Bundled });
        }
        if let Some(dir) = &config.managed_dir {
            roots.push(SkillRoot { dir: dir.clone(), source: SkillSource::Managed });
        }
        for dir in &config.skill_dirs {
            roots.push(SkillRoot { dir: dir.clone(), source: SkillSource::Workspace });
        }
        for dir in &config.extra_dirs {
            roots.push(SkillRoot { dir: dir.clone(), source: SkillSource::Extra });
        }
        Self::new(roots)
    }

    pub fn roots(&self) -> &[SkillRoot] {
        &self.roots
    }

    /// Load every `*/SKILL.md` under every root.
    pub fn load(&self) -> LoadReport {
        let mut report = LoadReport::default();

        for root in &self.roots {
            for path in scan_root(&root.dir) {
                let content = match std::fs::read_to_string(&path) {
                    Ok(c) => c,
                    Err(e) => {
                        report.errors.push(SkillError::load(&path, e.to_string()));
                        continue;
                    }
                };
                match parse_skill_file(&path, &content, root.source) {
                    Ok(skill) => {
                        if let Some(pos) =
                            report.skills.iter().position(|s| s.name == skill.name)
                        {
                            warn!(
                                name = %skill.name,
                                winner = %path.display(),
                                "skill name collision, later source wins"
                            );
                            report.collisions.push(skill.name.clone());
                            report.skills.remove(pos);
                        }
                        debug!(name = %skill.name, source = skill.source.as_str(), "loaded skill");
                        report.skills.push(skill);
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping skill");
                        report.errors.push(e);
                    }
                }
            }
        }

        report
    }
}

/// Collect `<root>/*/SKILL.md` paths, lexicographic by path.
fn scan_root(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .map(|p| p.join("SKILL.md"))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    paths
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_skill(base: &Path, name: &str, content: &str) {
        let skill_dir = base.join(name);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("SKILL.md"), content).unwrap();
    }

    fn parse(content: &str) -> Result<Skill, SkillError> {
        parse_skill_file(Path::new("/skills/test/SKILL.md"), content, SkillSource::Workspace)
    }

    // ── Name validation ──

    #[test]
    fn name_predicate_accepts_valid() {
        assert!(is_valid_name("pdf"));
        assert!(is_valid_name("render-pdf"));
        assert!(is_valid_name("a1-b2"));
        assert!(is_valid_name(&"a".repeat(64)));
    }

    #[test]
    fn name_predicate_rejects_invalid() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-leading"));
        assert!(!is_valid_name("Upper"));
        assert!(!is_valid_name("under_score"));
        assert!(!is_valid_name(&"a".repeat(65)));
    }

    // ── Parsing ──

    #[test]
    fn parse_minimal_skill() {
        let skill = parse("---\nname: pdf\ndescription: Render PDFs\n---\n\n# PDF\n\nBody.")
            .unwrap();
        assert_eq!(skill.name, "pdf");
        assert_eq!(skill.description, "Render PDFs");
        assert_eq!(skill.content, "# PDF\n\nBody.");
        assert!(skill.metadata.user_invocable);
        assert_eq!(skill.metadata.context, SkillContext::Inline);
    }

    #[test]
    fn parse_full_frontmatter() {
        let content = "---\n\
            name: github\n\
            description: GitHub automation\n\
            model: claude-haiku-4\n\
            context: fork\n\
            allowed-tools: [execute, read]\n\
            argument-hint: '<pr-number>'\n\
            user-invocable: false\n\
            disable-model-invocation: true\n\
            metadata:\n\
            \x20 emoji: \"🐙\"\n\
            \x20 always: true\n\
            \x20 primary_env: GITHUB_TOKEN\n\
            \x20 requires:\n\
            \x20   bins: [gh, git]\n\
            \x20   any_bins: [curl, wget]\n\
            \x20   env: [GITHUB_TOKEN]\n\
            \x20   os: [darwin, linux]\n\
            \x20 hooks:\n\
            \x20   agent_start: \"echo hi\"\n\
            ---\n\nBody";
        let skill = parse(content).unwrap();
        let meta = &skill.metadata;
        assert_eq!(meta.model.as_deref(), Some("claude-haiku-4"));
        assert_eq!(meta.context, SkillContext::Fork);
        assert_eq!(meta.allowed_tools, vec!["execute", "read"]);
        assert_eq!(meta.argument_hint.as_deref(), Some("<pr-number>"));
        assert!(!meta.user_invocable);
        assert!(meta.disable_model_invocation);
        assert!(meta.always);
        assert_eq!(meta.primary_env.as_deref(), Some("GITHUB_TOKEN"));
        assert_eq!(meta.requires.bins, vec!["gh", "git"]);
        assert_eq!(meta.requires.any_bins, vec!["curl", "wget"]);
        assert_eq!(meta.requires.os, vec!["darwin", "linux"]);
        assert_eq!(meta.hooks.get("agent_start").unwrap(), "echo hi");
    }

    #[test]
    fn parse_actions() {
        let content = "---\n\
            name: forms\n\
            description: Form filling\n\
            actions:\n\
            \x20 extract-fields:\n\
            \x20   script: scripts/extract.py\n\
            \x20   output: json\n\
            \x20   description: Extract form fields\n\
            \x20   params:\n\
            \x20     - name: input\n\
            \x20       type: file\n\
            \x20       required: true\n\
            \x20       position: 1\n\
            ---\n\nBody";
        let skill = parse(content).unwrap();
        let action = skill.get_action("extract-fields").unwrap();
        assert_eq!(action.script, "scripts/extract.py");
        assert_eq!(action.output, "json");
        assert_eq!(action.params[0].name, "input");
        assert_eq!(action.params[0].kind, "file");
        assert!(action.params[0].required);
        assert_eq!(action.params[0].position, Some(1));
        assert!(skill.has_actions());
    }

    #[test]
    fn missing_frontmatter_fails() {
        let err = parse("# Just markdown, no front-matter").unwrap_err();
        assert!(err.to_string().contains("missing YAML front-matter"));
    }

    #[test]
    fn unparseable_yaml_fails() {
        let err = parse("---\nname: [unclosed\n---\nBody").unwrap_err();
        assert!(err.to_string().contains("YAML parse error"));
    }

    #[test]
    fn missing_name_fails() {
        let err = parse("---\ndescription: no name\n---\nBody").unwrap_err();
        assert!(err.to_string().contains("`name`"));
    }

    #[test]
    fn missing_description_fails() {
        let err = parse("---\nname: pdf\n---\nBody").unwrap_err();
        assert!(err.to_string().contains("`description`"));
    }

    #[test]
    fn invalid_name_fails() {
        let err = parse("---\nname: Bad_Name\ndescription: x\n---\nBody").unwrap_err();
        assert!(err.to_string().contains("invalid name"));
    }

    // ── Boundaries ──

    #[test]
    fn name_at_64_chars_loads_65_rejects() {
        let name64 = "a".repeat(64);
        let ok = parse(&format!("---\nname: {name64}\ndescription: x\n---\nBody"));
        assert!(ok.is_ok());

        let name65 = "a".repeat(65);
        let err = parse(&format!("---\nname: {name65}\ndescription: x\n---\nBody"));
        assert!(err.is_err());
    }

    #[test]
    fn description_at_1024_loads_1025_rejects() {
        let desc = "d".repeat(1024);
        assert!(parse(&format!("---\nname: pdf\ndescription: {desc}\n---\nBody")).is_ok());

        let desc = "d".repeat(1025);
        assert!(parse(&format!("---\nname: pdf\ndescription: {desc}\n---\nBody")).is_err());
    }

    // ── Determinism ──

    #[test]
    fn identical_bytes_load_equal_records() {
        let content = "---\nname: pdf\ndescription: Render\n---\n\nBody";
        let a = parse(content).unwrap();
        let b = parse(content).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    // ── Directory scanning ──

    #[test]
    fn load_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SkillLoader::new(vec![SkillRoot {
            dir: dir.path().to_path_buf(),
            source: SkillSource::Workspace,
        }]);
        let report = loader.load();
        assert!(report.skills.is_empty());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn load_finds_skills_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        create_skill(dir.path(), "zeta", "---\nname: zeta\ndescription: z\n---\nZ");
        create_skill(dir.path(), "alpha", "---\nname: alpha\ndescription: a\n---\nA");

        let loader = SkillLoader::new(vec![SkillRoot {
            dir: dir.path().to_path_buf(),
            source: SkillSource::Workspace,
        }]);
        let report = loader.load();
        let names: Vec<&str> = report.skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn later_root_wins_collision() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join("bundled");
        let workspace = dir.path().join("workspace");
        create_skill(&bundled, "github", "---\nname: github\ndescription: builtin\n---\nBuiltin");
        create_skill(&workspace, "github", "---\nname: github\ndescription: custom\n---\nCustom");

        let loader = SkillLoader::new(vec![
            SkillRoot { dir: bundled, source: SkillSource::Bundled },
            SkillRoot { dir: workspace, source: SkillSource::Workspace },
        ]);
        let report = loader.load();
        assert_eq!(report.skills.len(), 1);
        assert_eq!(report.skills[0].source, SkillSource::Workspace);
        assert_eq!(report.skills[0].description, "custom");
        assert_eq!(report.collisions, vec!["github"]);
    }

    #[test]
    fn broken_skill_is_skipped_others_load() {
        let dir = tempfile::tempdir().unwrap();
        create_skill(dir.path(), "good", "---\nname: good\ndescription: ok\n---\nOK");
        create_skill(dir.path(), "broken", "no front-matter here");

        let loader = SkillLoader::new(vec![SkillRoot {
            dir: dir.path().to_path_buf(),
            source: SkillSource::Workspace,
        }]);
        let report = loader.load();
        assert_eq!(report.skills.len(), 1);
        assert_eq!(report.skills[0].name, "good");
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn source_assigned_by_root() {
        let dir = tempfile::tempdir().unwrap();
        let managed = dir.path().join("managed");
        create_skill(&managed, "tmux", "---\nname: tmux\ndescription: t\n---\nT");

        let loader = SkillLoader::new(vec![SkillRoot { dir: managed, source: SkillSource::Managed }]);
        let report = loader.load();
        assert_eq!(report.skills[0].source, SkillSource::Managed);
    }

    #[test]
    fn from_config_orders_roots_by_priority() {
        let mut config = SkillsConfig::default();
        config.bundled_dir = Some(PathBuf::from("/b"));
        config.managed_dir = Some(PathBuf::from("/m"));
        config.skill_dirs = vec![PathBuf::from("/w")];
        config.extra_dirs = vec![PathBuf::from("/e")];

        let loader = SkillLoader::from_config(&config);
        let sources: Vec<SkillSource> = loader.roots().iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            vec![
                SkillSource::Bundled,
                SkillSource::Managed,
                SkillSource::Workspace,
                SkillSource::Extra
            ]
        );
    }
}
