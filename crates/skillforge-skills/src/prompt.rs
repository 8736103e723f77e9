//! Snapshot construction and prompt formatting.
//!
//! Skills hidden from the model (`disable-model-invocation`) stay in the
//! snapshot (they remain user-invocable) but are excluded from every prompt
//! rendering.

use std::sync::Arc;

use chrono::Utc;

use skillforge_core::config::PromptFormat;

use crate::model::{Skill, SkillSnapshot};

/// Build a versioned snapshot over the eligible set.
pub fn build_snapshot(skills: Vec<Skill>, format: PromptFormat, version: u64) -> SkillSnapshot {
    let skills: Vec<Arc<Skill>> = skills.into_iter().map(Arc::new).collect();
    let visible = visible_skills(&skills);
    let prompt = format_prompt(&visible, format);
    let content_hash = SkillSnapshot::hash_skills(&skills);
    SkillSnapshot {
        skills,
        prompt,
        version,
        created_at: Utc::now(),
        content_hash,
    }
}

fn visible_skills(skills: &[Arc<Skill>]) -> Vec<&Skill> {
    skills
        .iter()
        .filter(|s| !s.metadata.disable_model_invocation)
        .map(|s| s.as_ref())
        .collect()
}

/// Render skills into the system prompt in the requested format.
pub fn format_prompt(skills: &[&Skill], format: PromptFormat) -> String {
    match format {
        PromptFormat::Structured => format_structured(skills),
        PromptFormat::Markdown => format_markdown(skills),
        PromptFormat::Json => format_json(skills),
    }
}

/// Structured-tag format: delimited blocks with name, emoji, description,
/// and full content.
fn format_structured(skills: &[&Skill]) -> String {
    if skills.is_empty() {
        return String::new();
    }

    let mut lines = vec!["<skills>".to_string()];
    for skill in skills {
        lines.push("  <skill>".to_string());
        lines.push(format!("    <name>{}</name>", escape(&skill.name)));
        if let Some(emoji) = &skill.metadata.emoji {
            lines.push(format!("    <emoji>{}</emoji>", escape(emoji)));
        }
        lines.push(format!(
            "    <description>{}</description>",
            escape(&skill.description)
        ));
        lines.push(format!("    <content>\n{}\n    </content>", skill.content));
        lines.push("  </skill>".to_string());
    }
    lines.push("</skills>".to_string());
    lines.join("\n")
}

/// Heading-prefixed Markdown: `## <emoji> <name>` headers.
fn format_markdown(skills: &[&Skill]) -> String {
    if skills.is_empty() {
        return String::new();
    }

    let mut parts = Vec::new();
    for skill in skills {
        let emoji = skill.metadata.emoji.as_deref().unwrap_or("🔧");
        parts.push(format!(
            "## {} {}\n\n{}\n\n{}",
            emoji, skill.name, skill.description, skill.content
        ));
    }
    parts.join("\n\n")
}

/// Machine-readable array form.
fn format_json(skills: &[&Skill]) -> String {
    let entries: Vec<serde_json::Value> = skills
        .iter()
        .map(|s| {
            serde_json::json!({
                "name": s.name,
                "description": s.description,
            })
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// Metadata-only projection for on-demand loading: only name + description
/// are concatenated, capped at `budget` characters. The model fetches full
/// content through the `skill` tool.
pub fn format_metadata_prompt(skills: &[&Skill], budget: usize) -> String {
    if skills.is_empty() {
        return String::new();
    }

    let mut lines = vec!["<skills>".to_string()];
    for skill in skills {
        lines.push("  <skill>".to_string());
        lines.push(format!("    <name>{}</name>", escape(&skill.name)));
        lines.push(format!(
            "    <description>{}</description>",
            escape(&skill.description)
        ));
        lines.push("  </skill>".to_string());
    }
    lines.push("</skills>".to_string());

    let mut prompt = lines.join("\n");
    if budget > 0 && prompt.len() > budget {
        let cut = floor_char_boundary(&prompt, budget);
        prompt.truncate(cut);
        prompt.push_str("\n<!-- skills list truncated -->");
    }
    prompt
}

/// Largest char boundary ≤ `index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
