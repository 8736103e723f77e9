//! Configuration — typed schema plus the JSON/env loader.

pub mod loader;
pub mod schema;

pub use loader::load_config;
pub use schema::{
    AgentConfig, Config, PromptFormat, SkillEntryConfig, SkillsConfig, ThinkingLevel,
};
