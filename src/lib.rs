//! Factify - auditable fact extraction from YouTube transcripts
//!
//! Turns a video's captions into structured, evidence-anchored items (quotes,
//! facts, opinions, claims, predictions) using an LLM.
//!
//! # Overview
//!
//! A run fetches the transcript, normalizes and segments it, classifies the
//! video, extracts items from every segment concurrently, validates each item
//! against the transcript, assesses credibility and clusters topic threads.
//! Every LLM call of a run goes through one [`throttle::AdaptiveThrottle`],
//! which backs off when the provider starts rate limiting and speeds up again
//! once things are quiet.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `throttle` - Adaptive concurrency and dispatch-rate control
//! - `llm` - Chat model trait, OpenAI backend and the retrying client
//! - `transcript` - Caption fetching, normalization and segmentation
//! - `classification` - Video categories, bias and credibility
//! - `extraction` - Per-segment item extraction
//! - `validation` - Quote and evidence checks
//! - `topics` - Topic thread clustering
//! - `pipeline` - Stage coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use factify::config::Settings;
//! use factify::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> factify::Result<()> {
//!     let settings = Settings::load()?;
//!     factify::logging::init_logging(&settings.pipeline.log_level)?;
//!
//!     let pipeline = Pipeline::new(settings)?;
//!     let result = pipeline.run("dQw4w9WgXcQ").await?;
//!     println!("Extracted {} items", result.items.len());
//!
//!     Ok(())
//! }
//! ```

pub mod classification;
pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod throttle;
pub mod topics;
pub mod transcript;
pub mod validation;

pub use error::{FactifyError, LlmError, Result};
