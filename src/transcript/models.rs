//! Transcript data at each stage: as fetched, normalized and segmented.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One caption cue as delivered by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Video metadata reported alongside the captions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub upload_date: Option<NaiveDate>,
    pub duration_seconds: Option<u32>,
}

/// Transcript as fetched, before any cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTranscript {
    pub video_id: String,
    pub segments: Vec<RawSegment>,
    pub language: Option<String>,
    pub metadata: Option<VideoMetadata>,
}

/// A caption cue after Unicode and whitespace normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSegment {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
    /// SHA-256 hex of `text`.
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTranscript {
    pub video_id: String,
    /// Segment texts joined by single spaces.
    pub full_text: String,
    /// SHA-256 hex of `full_text`.
    pub hash: String,
    pub segments: Vec<NormalizedSegment>,
    pub language: Option<String>,
    pub metadata: Option<VideoMetadata>,
}

impl NormalizedTranscript {
    /// Time range covered by the transcript, as `(first start, last end)`.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let start = self.segments.iter().map(|s| s.start_ms).min()?;
        let end = self.segments.iter().map(|s| s.end_ms).max()?;
        Some((start, end))
    }
}

/// A window of consecutive cues sent to the model as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub hash: String,
    /// Indices into [`NormalizedTranscript::segments`].
    pub source_segment_indices: Vec<usize>,
}
