//! Configuration module for Factify.
//!
//! Handles loading application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{format_belief_modules, format_items, PromptTemplate, Prompts};
pub use settings::{LlmSettings, PipelineSettings, PromptSettings, Settings, ThrottleSettings};
