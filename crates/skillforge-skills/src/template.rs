//! Template pre-processing for skill content.
//!
//! Two phases run before skill content reaches the LLM:
//!
//! 1. **Placeholder substitution** — a pure string transformation:
//!    `$ARGUMENTS` → the whole argument string, `$1`..`$9` →
//!    whitespace-split positionals, `${ENV_VAR}` → env lookup (empty when
//!    missing).
//! 2. **Inline command expansion** — `` !`cmd` `` is replaced by the
//!    command's stdout (trailing newline trimmed, stderr discarded), with a
//!    10-second budget per command and at most 8 commands per content.
//!    A failing command becomes an error marker; it never fails the
//!    invocation.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::runtime::{ExecOptions, ShellRuntime};

/// Per-command budget for inline expansion.
pub const INLINE_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum inline commands expanded per skill content.
pub const MAX_INLINE_COMMANDS: usize = 8;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());
static POSITIONAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[1-9]").unwrap());
static INLINE_CMD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!`([^`]+)`").unwrap());

// ─────────────────────────────────────────────
// Placeholder substitution
// ─────────────────────────────────────────────

/// Substitute `$ARGUMENTS`, `$1`..`$9`, and `${ENV_VAR}` placeholders.
///
/// Pure: all environment access goes through `env_lookup`.
pub fn substitute_placeholders(
    content: &str,
    arguments: &str,
    env_lookup: &dyn Fn(&str) -> Option<String>,
) -> String {
    // ${ENV_VAR} first, so substituted argument text is never re-expanded.
    let content = ENV_VAR_RE.replace_all(content, |caps: &regex::Captures<'_>| {
        env_lookup(&caps[1]).unwrap_or_default()
    });

    let content = content.replace("$ARGUMENTS", arguments);

    let positionals: Vec<&str> = arguments.split_whitespace().collect();
    POSITIONAL_RE
        .replace_all(&content, |caps: &regex::Captures<'_>| {
            let index: usize = caps[0][1..].parse().unwrap_or(0);
            positionals.get(index - 1).copied().unwrap_or("").to_string()
        })
        .into_owned()
}

// ─────────────────────────────────────────────
// Inline command expansion
// ─────────────────────────────────────────────

/// Expand `` !`cmd` `` markers by running each command through the runtime.
pub async fn expand_inline_commands(content: &str, runtime: &ShellRuntime) -> String {
    let matches: Vec<(std::ops::Range<usize>, String)> = INLINE_CMD_RE
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).unwrap();
            (whole.range(), caps[1].to_string())
        })
        .collect();

    if matches.is_empty() {
        return content.to_string();
    }

    let mut result = String::with_capacity(content.len());
    let mut cursor = 0;

    for (index, (range, command)) in matches.iter().enumerate() {
        result.push_str(&content[cursor..range.start]);
        cursor = range.end;

        if index >= MAX_INLINE_COMMANDS {
            warn!(command = %command, "inline command budget exceeded");
            result.push_str("[error: inline command limit exceeded]");
            continue;
        }

        let opts = ExecOptions {
            timeout: Some(INLINE_COMMAND_TIMEOUT),
            capture_stderr: false,
            ..Default::default()
        };
        let exec = runtime.execute(command, opts).await;
        if exec.success {
            result.push_str(exec.output.trim_end_matches('\n'));
        } else {
            let reason = exec.error.unwrap_or_else(|| "failed".to_string());
            warn!(command = %command, reason = %reason, "inline command failed");
            result.push_str(&format!("[error: {reason}]"));
        }
    }

    result.push_str(&content[cursor..]);
    result
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
