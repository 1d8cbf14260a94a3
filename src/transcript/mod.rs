//! Transcript ingestion, normalization and segmentation.
//!
//! Captions come from a [`TranscriptSource`], get normalized into a canonical,
//! hashed form, and are then grouped into windows of roughly equal duration
//! for the extraction stage.

mod models;
mod youtube;

pub use models::{
    NormalizedSegment, NormalizedTranscript, RawSegment, RawTranscript, TranscriptSegment,
    VideoMetadata,
};
pub use youtube::{extract_video_id, upload_date_hint, YoutubeTranscriptSource};

use crate::error::{FactifyError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Trait for transcript providers.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the captions for a video.
    async fn fetch(&self, video_id: &str) -> Result<RawTranscript>;
}

/// SHA-256 hex digest of a string.
pub(crate) fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// NFC-normalize, collapse whitespace runs to a single space and trim.
fn normalize_text(text: &str) -> String {
    let nfc: String = text.nfc().collect();
    nfc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a raw transcript into canonical, hashed form.
///
/// Segments that are empty after normalization are dropped.
pub fn normalize_transcript(raw: &RawTranscript) -> Result<NormalizedTranscript> {
    if raw.segments.is_empty() {
        return Err(FactifyError::EmptyTranscript(format!(
            "Transcript for {} has no segments",
            raw.video_id
        )));
    }

    let segments: Vec<NormalizedSegment> = raw
        .segments
        .iter()
        .filter_map(|seg| {
            let text = normalize_text(&seg.text);
            if text.is_empty() {
                return None;
            }
            Some(NormalizedSegment {
                hash: sha256_hex(&text),
                text,
                start_ms: seg.start_ms,
                end_ms: seg.end_ms,
            })
        })
        .collect();

    if segments.is_empty() {
        return Err(FactifyError::EmptyTranscript(format!(
            "Transcript for {} has no non-empty segments after normalization",
            raw.video_id
        )));
    }

    let full_text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(NormalizedTranscript {
        video_id: raw.video_id.clone(),
        hash: sha256_hex(&full_text),
        full_text,
        segments,
        language: raw.language.clone(),
        metadata: raw.metadata.clone(),
    })
}

/// Group normalized cues into windows of about `target_seconds` each.
///
/// Cues accumulate until their summed duration reaches the target; the
/// leftover tail becomes a final, shorter window.
pub fn segment_transcript(
    transcript: &NormalizedTranscript,
    target_seconds: u32,
) -> Vec<TranscriptSegment> {
    let target_ms = i64::from(target_seconds) * 1000;
    let mut windows = Vec::new();

    let mut texts: Vec<&str> = Vec::new();
    let mut indices: Vec<usize> = Vec::new();
    let mut window_start = 0i64;
    let mut duration_ms = 0i64;

    for (i, seg) in transcript.segments.iter().enumerate() {
        if indices.is_empty() {
            window_start = seg.start_ms;
        }
        texts.push(&seg.text);
        indices.push(i);
        duration_ms += seg.end_ms - seg.start_ms;

        if duration_ms >= target_ms {
            windows.push(build_window(&texts, std::mem::take(&mut indices), window_start, seg.end_ms));
            texts.clear();
            duration_ms = 0;
        }
    }

    if let Some(&last) = indices.last() {
        let end_ms = transcript.segments[last].end_ms;
        windows.push(build_window(&texts, indices, window_start, end_ms));
    }

    windows
}

fn build_window(texts: &[&str], indices: Vec<usize>, start_ms: i64, end_ms: i64) -> TranscriptSegment {
    let text = texts.join(" ");
    TranscriptSegment {
        hash: sha256_hex(&text),
        text,
        start_ms,
        end_ms,
        source_segment_indices: indices,
    }
}
