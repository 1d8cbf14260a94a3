use async_trait::async_trait;
use factify::llm::{ChatMessage, ChatModel};
use factify::LlmError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CLASSIFICATION: &str = r#"{"categories": ["documentary", "podcast"], "bias_profile": {"primary_label": "neutral", "confidence": 0.8, "rationale": "Mostly factual", "implicit_bias_notes": []}}"#;

pub const FIRST_WINDOW_ITEMS: &str = r#"```json
[
  {"id": "q1", "type": "direct_quote", "content": "The Earth orbits the Sun", "speaker": "Host",
   "transcript_evidence": {"text": "The Earth orbits the Sun", "start_ms": 0, "end_ms": 20000}},
  {"id": "o1", "type": "speaker_opinion", "content": "Pineapple belongs on pizza",
   "transcript_evidence": {"text": "pineapple belongs on pizza", "start_ms": 20000, "end_ms": 40000}},
  {"id": "bad", "type": "direct_quote", "content": "The Moon is made of cheese",
   "transcript_evidence": {"text": "The Earth orbits", "start_ms": 0, "end_ms": 20000}}
]
```"#;

pub const SECOND_WINDOW_ITEMS: &str = r#"[
  {"id": "f1", "type": "transcript_fact", "content": "Water boils at 100C",
   "transcript_evidence": {"text": "Water boils at one hundred degrees Celsius.", "start_ms": 40000, "end_ms": 60000}},
  {"id": "p1", "type": "prediction", "content": "Prices will rise next year",
   "transcript_evidence": {"text": "prices will rise again", "start_ms": 60000, "end_ms": 80000}}
]"#;

pub const CREDIBILITY: &str = r#"[
  {"item_id": "q1", "label": "well_established", "confidence": 0.99, "rationale": "Astronomy"},
  {"item_id": "f1", "label": "well_established", "confidence": 0.95, "rationale": "At sea level"},
  {"item_id": "o1", "label": "unassessable", "confidence": 0.9, "rationale": "Taste"}
]"#;

pub const TOPICS: &str = r#"[
  {"label": "science", "display_name": "Science", "summary": "Basic physical facts", "item_ids": ["q1", "f1"]},
  {"label": "nothing", "display_name": "Nothing", "summary": "Unknown items only", "item_ids": ["zzz"]}
]"#;

/// Chat model that answers each pipeline stage from fixtures, keyed on the
/// system prompt.
#[derive(Clone)]
pub struct MockChatModel {
    /// Stage name of every call, in order.
    pub calls: Arc<Mutex<Vec<&'static str>>>,
    pub system_prompts: Arc<Mutex<Vec<String>>>,
    pub fail_stage: Option<&'static str>,
    /// Rate-limit errors to return before answering normally.
    pub rate_limits: Arc<AtomicUsize>,
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            system_prompts: Arc::new(Mutex::new(Vec::new())),
            fail_stage: None,
            rate_limits: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockChatModel {
    pub fn failing_at(stage: &'static str) -> Self {
        Self {
            fail_stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn rate_limited(times: usize) -> Self {
        Self {
            rate_limits: Arc::new(AtomicUsize::new(times)),
            ..Default::default()
        }
    }

    pub fn calls_for(&self, stage: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| **s == stage).count()
    }

    fn stage(system: &str) -> &'static str {
        if system.contains("video content classifier") {
            "classify"
        } else if system.contains("fact-extraction engine") {
            "extract"
        } else if system.contains("assess the credibility") {
            "credibility"
        } else if system.contains("into topic threads") {
            "topics"
        } else {
            "unknown"
        }
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn model_id(&self) -> &str {
        "mock-gpt"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let system = &messages[0].content;
        let user = &messages[1].content;
        let stage = Self::stage(system);

        self.calls.lock().unwrap().push(stage);
        self.system_prompts.lock().unwrap().push(system.clone());

        let limited = self
            .rate_limits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(LlmError::RateLimited {
                message: "Rate limit reached. Please try again in 0.001s".to_string(),
                retry_after: Some(Duration::from_millis(1)),
            });
        }

        if self.fail_stage == Some(stage) {
            return Err(LlmError::Request(format!("{} unavailable", stage)));
        }

        let reply = match stage {
            "classify" => CLASSIFICATION,
            "extract" if user.contains("Earth orbits") => FIRST_WINDOW_ITEMS,
            "extract" => SECOND_WINDOW_ITEMS,
            "credibility" => CREDIBILITY,
            "topics" => TOPICS,
            _ => return Err(LlmError::Request("unexpected prompt".to_string())),
        };
        Ok(reply.to_string())
    }
}
