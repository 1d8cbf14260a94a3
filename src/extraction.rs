//! Per-segment item extraction.
//!
//! Every segment is dispatched at once; the client's throttle decides how
//! many requests are actually in flight.

use crate::config::{format_belief_modules, Prompts};
use crate::error::{FactifyError, Result};
use crate::llm::{strip_fences, ChatMessage, LlmClient};
use crate::models::{BeliefSystemModule, ExtractedItem, VideoCategory};
use crate::transcript::TranscriptSegment;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Chat messages for extracting items from one segment.
pub fn extraction_messages(
    segment: &TranscriptSegment,
    video_id: &str,
    categories: &[VideoCategory],
    belief_modules: &[BeliefSystemModule],
    prompts: &Prompts,
) -> Vec<ChatMessage> {
    let categories_section = if categories.is_empty() {
        String::new()
    } else {
        let names = categories.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");
        format!(
            "\n\n## Video Categories\n\nThis video has been classified as: {}. \
             Use this context to inform your extraction; for example, items from a \
             comedy/satire video should be flagged as opinions rather than facts.",
            names
        )
    };

    let belief_systems_section = if belief_modules.is_empty() {
        String::new()
    } else {
        format!(
            "\n\n## Belief/Value Systems\n\nThe following belief/value systems are active \
             for this analysis. Flag items that rely on assumptions from these worldviews \
             in `belief_system_flags` as {{\"module_label\": \"<label>\", \"note\": \"<why>\"}}:\n\n{}",
            format_belief_modules(belief_modules)
        )
    };

    let vars = HashMap::from([
        ("categories_section".to_string(), categories_section),
        ("belief_systems_section".to_string(), belief_systems_section),
        ("video_id".to_string(), video_id.to_string()),
        ("start_ms".to_string(), segment.start_ms.to_string()),
        ("end_ms".to_string(), segment.end_ms.to_string()),
        ("transcript".to_string(), segment.text.clone()),
    ]);
    prompts.messages(&prompts.extraction, &vars)
}

/// Parse a JSON array of items, anchoring evidence to `video_id`.
///
/// Items without an id get `{video_id}_seg{start_ms}_{index}`. Entries that
/// do not deserialize are skipped.
fn parse_items(raw: &str, video_id: &str, segment: &TranscriptSegment) -> Result<Vec<ExtractedItem>> {
    let data: Value = serde_json::from_str(strip_fences(raw))?;
    let Value::Array(entries) = data else {
        return Err(FactifyError::Parse("Expected JSON array of items".to_string()));
    };

    let mut items = Vec::with_capacity(entries.len());
    for (index, mut entry) in entries.into_iter().enumerate() {
        if let Some(evidence) = entry.get_mut("transcript_evidence").and_then(Value::as_object_mut) {
            evidence.insert("video_id".to_string(), Value::String(video_id.to_string()));
        }

        if let Some(obj) = entry.as_object_mut() {
            let has_id = obj.get("id").and_then(Value::as_str).is_some_and(|id| !id.is_empty());
            if !has_id {
                obj.insert(
                    "id".to_string(),
                    Value::String(format!("{}_seg{}_{}", video_id, segment.start_ms, index)),
                );
            }
        }

        match serde_json::from_value::<ExtractedItem>(entry) {
            Ok(item) => items.push(item),
            Err(e) => warn!(
                index,
                video_id,
                segment_start = segment.start_ms,
                error = %e,
                "Skipping invalid item"
            ),
        }
    }

    Ok(items)
}

fn is_blank(segment: &TranscriptSegment) -> bool {
    segment.text.trim().is_empty()
}

/// Number of segments that will actually be sent to the model.
pub fn extraction_call_count(segments: &[TranscriptSegment]) -> usize {
    segments.iter().filter(|s| !is_blank(s)).count()
}

async fn extract_segment(
    segment: &TranscriptSegment,
    video_id: &str,
    categories: &[VideoCategory],
    belief_modules: &[BeliefSystemModule],
    client: &LlmClient,
    prompts: &Prompts,
) -> Result<Vec<ExtractedItem>> {
    if is_blank(segment) {
        debug!(video_id, start_ms = segment.start_ms, "Skipping empty segment");
        return Ok(Vec::new());
    }

    let messages = extraction_messages(segment, video_id, categories, belief_modules, prompts);
    let context = format!("extraction_seg{}", segment.start_ms);

    let items = client
        .complete_parsed(&messages, &context, |raw| parse_items(raw, video_id, segment))
        .await
        .map_err(|e| {
            FactifyError::Extraction(format!(
                "Failed to extract items from segment at {}ms after {} attempts: {}",
                segment.start_ms,
                client.policy().parse_attempts,
                e
            ))
        })?;

    info!(
        video_id,
        start_ms = segment.start_ms,
        item_count = items.len(),
        "Segment extracted"
    );
    Ok(items)
}

/// Give every item a unique id by suffixing repeats with 8 random hex chars.
fn dedupe_ids(items: &mut [ExtractedItem]) {
    let mut seen = HashSet::new();
    for item in items.iter_mut() {
        if seen.contains(&item.id) {
            let suffix = Uuid::new_v4().simple().to_string();
            item.id = format!("{}_{}", item.id, &suffix[..8]);
        }
        seen.insert(item.id.clone());
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("  {spinner:.green} Extracting [{bar:30.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
    pb.set_style(style);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Extract items from every segment concurrently.
///
/// A segment that still fails after its attempts is logged and contributes
/// no items; the other segments are unaffected.
pub async fn extract_items(
    segments: &[TranscriptSegment],
    video_id: &str,
    categories: &[VideoCategory],
    belief_modules: &[BeliefSystemModule],
    client: &LlmClient,
    prompts: &Prompts,
    show_progress: bool,
) -> Vec<ExtractedItem> {
    let pb = show_progress.then(|| progress_bar(segments.len()));

    let tasks = segments.iter().map(|segment| {
        let pb = pb.clone();
        async move {
            let result =
                extract_segment(segment, video_id, categories, belief_modules, client, prompts).await;
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            result
        }
    });
    let results = join_all(tasks).await;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let mut items = Vec::new();
    for (segment_index, result) in results.into_iter().enumerate() {
        match result {
            Ok(segment_items) => items.extend(segment_items),
            Err(e) => error!(video_id, segment_index, error = %e, "Segment extraction failed"),
        }
    }

    dedupe_ids(&mut items);
    items
}
