//! Skillforge skills — discovery, eligibility, snapshots, and execution.
//!
//! The pipeline: loader → eligibility filter → immutable versioned snapshot →
//! prompt formatter, with hot-reload invalidation. This crate also owns the
//! shell execution runtime (timeouts, streaming output, abort propagation)
//! and the template pre-processing applied to skill content before it
//! reaches the LLM.

pub mod engine;
pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod prompt;
pub mod runtime;
pub mod template;
pub mod watcher;

pub use engine::SkillsEngine;
pub use error::{SkillError, SkillResult};
pub use filter::{check_eligibility, Eligibility, EnvProbe};
pub use loader::{LoadReport, SkillLoader, SkillRoot};
pub use model::{
    Skill, SkillAction, SkillActionParam, SkillContext, SkillInstallSpec, SkillMetadata,
    SkillRequirements, SkillSnapshot, SkillSource,
};
pub use runtime::{ExecOptions, OutputSink, ShellRuntime};
pub use watcher::SkillWatcher;
