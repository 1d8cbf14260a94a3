//! Configuration settings for Factify.

use crate::error::{FactifyError, Result};
use crate::models::QuoteMismatch;
use crate::throttle::ThrottleConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub pipeline: PipelineSettings,
    pub throttle: ThrottleSettings,
    pub prompts: PromptSettings,
}

/// Chat model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Chat completion model.
    pub model: String,
    /// Alternative API base URL (OpenAI-compatible servers).
    pub api_base: Option<String>,
    /// API key. Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Retry budget; stage-level parse retries use at most 2 of these.
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            api_key: None,
            temperature: 0.0,
            timeout_seconds: 300,
            max_retries: 3,
        }
    }
}

/// Pipeline behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Target length of each LLM segment in seconds.
    pub segment_seconds: u32,
    /// What to do with direct quotes not found in the transcript.
    pub quote_mismatch: QuoteMismatch,
    /// Caption languages to try, in order.
    pub languages: Vec<String>,
    /// Show a progress bar while extracting.
    pub show_progress: bool,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            segment_seconds: 45,
            quote_mismatch: QuoteMismatch::Reject,
            languages: vec!["en".to_string()],
            show_progress: false,
            log_level: "info".to_string(),
        }
    }
}

/// Adaptive throttle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    pub max_concurrent_requests: usize,
    /// Start below the maximum and ramp up. `None` starts at the maximum.
    pub initial_concurrent_requests: Option<usize>,
    pub min_dispatch_interval_ms: u64,
    pub failure_threshold: usize,
    pub failure_window_seconds: f64,
    pub cooling_period_seconds: f64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 3,
            initial_concurrent_requests: None,
            min_dispatch_interval_ms: 200,
            failure_threshold: 3,
            failure_window_seconds: 60.0,
            cooling_period_seconds: 60.0,
        }
    }
}

impl ThrottleSettings {
    /// Build a throttle configuration for a run with `total_tasks` known tasks.
    pub fn to_config(&self, total_tasks: usize) -> Result<ThrottleConfig> {
        Ok(ThrottleConfig {
            max_concurrency: self.max_concurrent_requests,
            initial_concurrency: self.initial_concurrent_requests,
            total_tasks,
            min_dispatch_interval: Duration::from_millis(self.min_dispatch_interval_ms),
            failure_threshold: self.failure_threshold,
            failure_window: seconds_to_duration("throttle.failure_window_seconds", self.failure_window_seconds)?,
            cooling_period: seconds_to_duration("throttle.cooling_period_seconds", self.cooling_period_seconds)?,
        })
    }
}

/// Non-negative, finite seconds that fit in a `Duration`.
fn seconds_to_duration(name: &str, seconds: f64) -> Result<Duration> {
    if seconds < 0.0 {
        return Err(FactifyError::Config(format!("{} must not be negative", name)));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| FactifyError::Config(format!("{} is out of range ({}): {}", name, seconds, e)))
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.segment_seconds == 0 {
            return Err(FactifyError::Config(
                "pipeline.segment_seconds must be at least 1".to_string(),
            ));
        }
        if self.throttle.max_concurrent_requests == 0 {
            return Err(FactifyError::Config(
                "throttle.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        self.throttle.to_config(0)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("factify")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.pipeline.segment_seconds, 45);
        assert_eq!(settings.throttle.max_concurrent_requests, 3);
        assert_eq!(settings.llm.max_retries, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [llm]
            model = "gpt-4.1"

            [throttle]
            max_concurrent_requests = 8
            initial_concurrent_requests = 2
            "#,
        )
        .unwrap();

        assert_eq!(settings.llm.model, "gpt-4.1");
        assert_eq!(settings.llm.timeout_seconds, 300);
        assert_eq!(settings.throttle.max_concurrent_requests, 8);
        assert_eq!(settings.pipeline.quote_mismatch, QuoteMismatch::Reject);

        let config = settings.throttle.to_config(12).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.initial_concurrency, Some(2));
        assert_eq!(config.total_tasks, 12);
        assert_eq!(config.min_dispatch_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nquote_mismatch = \"downgrade\"\n").unwrap();

        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.pipeline.quote_mismatch, QuoteMismatch::Downgrade);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = PathBuf::from("/nonexistent/factify/config.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nsegment_seconds = 0\n").unwrap();

        assert!(matches!(
            Settings::load_from(Some(&path)),
            Err(FactifyError::Config(_))
        ));
    }

    #[test]
    fn test_unrepresentable_windows_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for body in [
            "[throttle]\ncooling_period_seconds = inf\n",
            "[throttle]\nfailure_window_seconds = 1e20\n",
            "[throttle]\nfailure_window_seconds = nan\n",
            "[throttle]\ncooling_period_seconds = -1.0\n",
        ] {
            std::fs::write(&path, body).unwrap();
            assert!(
                matches!(Settings::load_from(Some(&path)), Err(FactifyError::Config(_))),
                "accepted {:?}",
                body
            );
        }

        let throttle = ThrottleSettings {
            cooling_period_seconds: f64::INFINITY,
            ..ThrottleSettings::default()
        };
        assert!(matches!(throttle.to_config(3), Err(FactifyError::Config(_))));
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(Settings::expand_path("/tmp/prompts"), PathBuf::from("/tmp/prompts"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(Settings::expand_path("~/prompts"), home.join("prompts"));
        }
    }
}
