//! Project context file discovery.
//!
//! When `load_context_files` is enabled, `AGENTS.md` (or `CLAUDE.md`) files
//! found in the working directory and its ancestors are injected into the
//! system prompt as delimited blocks, outermost first.

use std::path::{Path, PathBuf};

use tracing::debug;

const CONTEXT_FILE_NAMES: &[&str] = &["AGENTS.md", "CLAUDE.md"];
const MAX_CONTEXT_FILE_BYTES: usize = 32_768;

/// A discovered project context file.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextFile {
    pub path: PathBuf,
    pub content: String,
}

/// Walk from `start` up through its ancestors collecting context files,
/// ordered outermost (filesystem root side) first.
pub fn discover(start: &Path) -> Vec<ContextFile> {
    let mut found = Vec::new();
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONTEXT_FILE_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                if let Ok(mut content) = std::fs::read_to_string(&candidate) {
                    if content.len() > MAX_CONTEXT_FILE_BYTES {
                        let mut cut = MAX_CONTEXT_FILE_BYTES;
                        while !content.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        content.truncate(cut);
                    }
                    debug!(path = %candidate.display(), "loaded context file");
                    found.push(ContextFile { path: candidate, content });
                }
                // one context file per directory
                break;
            }
        }
        dir = current.parent();
    }
    found.reverse();
    found
}

/// Render context files as system-prompt blocks.
pub fn render(files: &[ContextFile]) -> String {
    files
        .iter()
        .map(|f| {
            format!(
                "<context-file path=\"{}\">\n{}\n</context-file>",
                f.path.display(),
                f.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
