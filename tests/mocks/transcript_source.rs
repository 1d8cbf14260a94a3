use async_trait::async_trait;
use factify::transcript::{RawSegment, RawTranscript, TranscriptSource, VideoMetadata};
use factify::{FactifyError, Result};
use std::sync::{Arc, Mutex};

pub const VIDEO_ID: &str = "dQw4w9WgXcQ";

#[derive(Clone)]
pub struct MockTranscriptSource {
    pub segments: Vec<(String, i64, i64)>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail_with: Option<String>,
}

impl MockTranscriptSource {
    pub fn new(segments: &[(&str, i64, i64)]) -> Self {
        Self {
            segments: segments
                .iter()
                .map(|(text, start, end)| (text.to_string(), *start, *end))
                .collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }
    }

    /// Four 20-second cues covering a quote, an opinion, a fact and a prediction.
    pub fn from_fixture() -> Self {
        Self::new(&[
            ("The Earth orbits the Sun once every year.", 0, 20_000),
            ("I think   pineapple belongs on pizza.", 20_000, 40_000),
            ("Water boils at one hundred degrees Celsius.", 40_000, 60_000),
            ("Next year prices will rise again.", 60_000, 80_000),
        ])
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            segments: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some(msg.to_string()),
        }
    }
}

#[async_trait]
impl TranscriptSource for MockTranscriptSource {
    async fn fetch(&self, video_id: &str) -> Result<RawTranscript> {
        self.calls.lock().unwrap().push(video_id.to_string());
        if let Some(ref msg) = self.fail_with {
            return Err(FactifyError::TranscriptFetch(msg.clone()));
        }

        Ok(RawTranscript {
            video_id: video_id.to_string(),
            segments: self
                .segments
                .iter()
                .map(|(text, start_ms, end_ms)| RawSegment {
                    text: text.clone(),
                    start_ms: *start_ms,
                    end_ms: *end_ms,
                })
                .collect(),
            language: Some("en".to_string()),
            metadata: Some(VideoMetadata {
                title: Some("Facts and Opinions".to_string()),
                ..Default::default()
            }),
        })
    }
}
