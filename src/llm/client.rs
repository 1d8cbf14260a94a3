//! Completion wrapper shared by every LLM-calling stage.
//!
//! Each attempt runs inside the shared throttle. Rate-limit errors feed the
//! throttle's failure window and back off exponentially (or by the provider's
//! retry hint) without consuming the normal attempt budget.

use super::{ChatMessage, ChatModel};
use crate::error::{FactifyError, LlmError, Result};
use crate::throttle::AdaptiveThrottle;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Retry behavior for LLM calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts for errors that are not rate limits.
    pub max_attempts: u32,
    /// First rate-limit backoff. Provider limits are usually per-minute
    /// budgets, so a short delay only burns an attempt.
    pub rate_limit_base_delay: Duration,
    pub rate_limit_max_delay: Duration,
    /// Rate-limit retries allowed on top of `max_attempts`.
    pub max_rate_limit_retries: u32,
    /// Call-and-parse attempts made by [`LlmClient::complete_parsed`].
    pub parse_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            rate_limit_base_delay: Duration::from_secs(15),
            rate_limit_max_delay: Duration::from_secs(120),
            max_rate_limit_retries: 6,
            parse_attempts: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy for a configured retry budget. Stages parse at most twice.
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self {
            parse_attempts: max_retries.clamp(1, 2),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn with_rate_limit_delays(mut self, base: Duration, max: Duration) -> Self {
        self.rate_limit_base_delay = base;
        self.rate_limit_max_delay = max;
        self
    }

    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn with_parse_attempts(mut self, attempts: u32) -> Self {
        self.parse_attempts = attempts.max(1);
        self
    }

    /// Backoff before the `retry`-th rate-limit retry (1-based).
    pub fn rate_limit_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.rate_limit_base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.rate_limit_max_delay)
    }
}

/// Whether an error message describes a rate limit.
pub fn is_rate_limit_text(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("too many requests")
}

/// Extract a retry hint such as "try again in 6.5s" or "retry after 20 seconds".
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    static RETRY_RE: OnceLock<Regex> = OnceLock::new();
    let re = RETRY_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:try again in|retry.after)\s+(\d+(?:\.\d+)?)\s*s").expect("Invalid regex")
    });

    let secs: f64 = re.captures(message)?.get(1)?.as_str().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Chat model handle shared by the pipeline stages.
#[derive(Clone)]
pub struct LlmClient {
    model: Arc<dyn ChatModel>,
    throttle: Option<Arc<AdaptiveThrottle>>,
    policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(model: Arc<dyn ChatModel>, policy: RetryPolicy) -> Self {
        Self {
            model,
            throttle: None,
            policy,
        }
    }

    /// Coordinate every call through a shared throttle.
    pub fn with_throttle(mut self, throttle: Arc<AdaptiveThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn throttle(&self) -> Option<&Arc<AdaptiveThrottle>> {
        self.throttle.as_ref()
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Complete a chat with the policy's attempt budget.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        context: &str,
    ) -> std::result::Result<String, LlmError> {
        self.complete_with_attempts(messages, context, self.policy.max_attempts)
            .await
    }

    /// Complete and parse, retrying the pair when either step fails.
    ///
    /// Returns the last error once `parse_attempts` are used up.
    pub async fn complete_parsed<T, F>(
        &self,
        messages: &[ChatMessage],
        context: &str,
        parse: F,
    ) -> Result<T>
    where
        F: Fn(&str) -> Result<T>,
    {
        let attempts = self.policy.parse_attempts.max(1);
        let mut last_error = FactifyError::Parse(format!("no attempts made for {}", context));

        for attempt in 1..=attempts {
            match self.complete_with_attempts(messages, context, 1).await {
                Ok(content) => match parse(&content) {
                    Ok(value) => {
                        debug!(context, attempt, "LLM response parsed");
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(context, attempt, error = %e, "Failed to parse LLM response");
                        last_error = e;
                    }
                },
                Err(e) => {
                    warn!(context, attempt, error = %e, "LLM call failed");
                    last_error = e.into();
                }
            }
        }

        Err(last_error)
    }

    async fn complete_with_attempts(
        &self,
        messages: &[ChatMessage],
        context: &str,
        max_attempts: u32,
    ) -> std::result::Result<String, LlmError> {
        let mut attempt = 0u32;
        let mut rate_limit_retries = 0u32;

        loop {
            attempt += 1;

            let (result, elapsed) = match &self.throttle {
                Some(throttle) => {
                    let _permit = throttle.acquire().await;
                    let started = Instant::now();
                    let result = self.model.complete(messages).await;
                    (result, started.elapsed())
                }
                None => {
                    let started = Instant::now();
                    let result = self.model.complete(messages).await;
                    (result, started.elapsed())
                }
            };

            let err = match result {
                Ok(content) => {
                    if let Some(throttle) = &self.throttle {
                        throttle.record_success(elapsed);
                    }
                    return Ok(content);
                }
                Err(err) => err,
            };

            if let LlmError::RateLimited { retry_after, .. } = &err {
                if let Some(throttle) = &self.throttle {
                    throttle.record_failure();
                }

                rate_limit_retries += 1;
                if rate_limit_retries > self.policy.max_rate_limit_retries {
                    error!(context, attempt, rate_limit_retries, error = %err, "Rate limit retries exhausted");
                    return Err(err);
                }

                let delay = match retry_after {
                    Some(hint) if !hint.is_zero() => *hint,
                    _ => self.policy.rate_limit_delay(rate_limit_retries),
                };
                warn!(
                    context,
                    attempt,
                    rate_limit_retry = rate_limit_retries,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if attempt >= max_attempts {
                return Err(err);
            }
            warn!(context, attempt, error = %err, "LLM call failed, retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::ThrottleConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<std::result::Result<String, LlmError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<std::result::Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> std::result::Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    fn rate_limited() -> LlmError {
        LlmError::RateLimited {
            message: "Rate limit reached".to_string(),
            retry_after: Some(Duration::from_millis(1)),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_rate_limit_delays(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn throttle() -> Arc<AdaptiveThrottle> {
        Arc::new(AdaptiveThrottle::new(ThrottleConfig {
            max_concurrency: 4,
            min_dispatch_interval: Duration::ZERO,
            ..Default::default()
        }))
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            parse_retry_after("Rate limit reached. Please try again in 6.5s."),
            Some(Duration::from_secs_f64(6.5))
        );
        assert_eq!(
            parse_retry_after("Retry-After 20 seconds"),
            Some(Duration::from_secs(20))
        );
        assert_eq!(parse_retry_after("try again in 120ms"), None);
        assert_eq!(parse_retry_after("server exploded"), None);
    }

    #[test]
    fn test_is_rate_limit_text() {
        assert!(is_rate_limit_text("Rate limit reached for gpt-4o"));
        assert!(is_rate_limit_text("error code: rate_limit_exceeded"));
        assert!(is_rate_limit_text("429 Too Many Requests"));
        assert!(!is_rate_limit_text("context length exceeded"));
    }

    #[test]
    fn test_rate_limit_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(1), Duration::from_secs(15));
        assert_eq!(policy.rate_limit_delay(2), Duration::from_secs(30));
        assert_eq!(policy.rate_limit_delay(3), Duration::from_secs(60));
        assert_eq!(policy.rate_limit_delay(4), Duration::from_secs(120));
        assert_eq!(policy.rate_limit_delay(9), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_attempts_from_max_retries() {
        assert_eq!(RetryPolicy::from_max_retries(0).parse_attempts, 1);
        assert_eq!(RetryPolicy::from_max_retries(1).parse_attempts, 1);
        assert_eq!(RetryPolicy::from_max_retries(5).parse_attempts, 2);
    }

    #[tokio::test]
    async fn test_success_is_recorded_on_throttle() {
        let model = ScriptedModel::new(vec![Ok("hello".to_string())]);
        let throttle = throttle();
        let client = LlmClient::new(model.clone(), fast_policy()).with_throttle(throttle.clone());

        let reply = client.complete(&[ChatMessage::user("hi")], "test").await.unwrap();
        assert_eq!(reply, "hello");
        assert_eq!(throttle.completed(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_records_failure_and_retries() {
        let model = ScriptedModel::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Err(rate_limited()),
            Ok("finally".to_string()),
        ]);
        let throttle = throttle();
        let client = LlmClient::new(model.clone(), fast_policy()).with_throttle(throttle.clone());

        let reply = client.complete(&[ChatMessage::user("hi")], "test").await.unwrap();
        assert_eq!(reply, "finally");
        assert_eq!(model.calls(), 4);
        // Three failures inside the window halve the limit.
        assert_eq!(throttle.concurrency(), 2);
        assert_eq!(throttle.completed(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_exhausted() {
        let model = ScriptedModel::new((0..10).map(|_| Err(rate_limited())).collect());
        let client = LlmClient::new(model.clone(), fast_policy().with_max_rate_limit_retries(2));

        let err = client.complete(&[ChatMessage::user("hi")], "test").await.unwrap_err();
        assert!(err.is_rate_limit());
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_other_errors_use_attempt_budget() {
        let model = ScriptedModel::new(vec![
            Err(LlmError::Request("boom".to_string())),
            Err(LlmError::Request("boom again".to_string())),
            Ok("unreached".to_string()),
        ]);
        let throttle = throttle();
        let client = LlmClient::new(model.clone(), fast_policy().with_max_attempts(2))
            .with_throttle(throttle.clone());

        let err = client.complete(&[ChatMessage::user("hi")], "test").await.unwrap_err();
        assert!(matches!(err, LlmError::Request(ref m) if m == "boom again"));
        assert_eq!(model.calls(), 2);
        // Non-rate-limit errors leave the throttle alone.
        assert_eq!(throttle.concurrency(), 4);
    }

    #[tokio::test]
    async fn test_complete_parsed_retries_bad_output() {
        let model = ScriptedModel::new(vec![Ok("not json".to_string()), Ok("[1, 2]".to_string())]);
        let client = LlmClient::new(model.clone(), fast_policy());

        let parsed: Vec<u32> = client
            .complete_parsed(&[ChatMessage::user("hi")], "test", |text| {
                Ok(serde_json::from_str(text)?)
            })
            .await
            .unwrap();
        assert_eq!(parsed, vec![1, 2]);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_complete_parsed_returns_last_error() {
        let model = ScriptedModel::new(vec![
            Ok("nope".to_string()),
            Err(LlmError::Request("down".to_string())),
        ]);
        let client = LlmClient::new(model.clone(), fast_policy());

        let result: Result<Vec<u32>> = client
            .complete_parsed(&[ChatMessage::user("hi")], "test", |text| {
                Ok(serde_json::from_str(text)?)
            })
            .await;
        assert!(matches!(result, Err(FactifyError::Llm(LlmError::Request(_)))));
        assert_eq!(model.calls(), 2);
    }
}
