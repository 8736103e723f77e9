//! Error types for the skills subsystem.

use std::path::PathBuf;

/// Skill-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// A SKILL.md file could not be loaded; the skill is skipped.
    #[error("invalid skill file `{path}`: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("skill not found: `{0}`")]
    NotFound(String),

    #[error("action `{action}` not found on skill `{skill}`")]
    ActionNotFound { skill: String, action: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkillError {
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SkillError::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias.
pub type SkillResult<T> = std::result::Result<T, SkillError>;
