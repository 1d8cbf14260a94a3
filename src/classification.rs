//! Video categorization, bias detection and credibility assessment.

use crate::config::{format_belief_modules, format_items, Prompts};
use crate::error::{FactifyError, Result};
use crate::llm::{strip_fences, ChatMessage, LlmClient};
use crate::models::{
    BeliefSystemModule, BiasProfile, CredibilityAssessment, CredibilityLabel, ExtractedItem,
    VideoCategory, VideoClassification,
};
use crate::transcript::NormalizedTranscript;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Character budget for the transcript excerpt sent to the classifier.
const CLASSIFICATION_SAMPLE_CHARS: usize = 8000;

const CREDIBILITY_BELIEF_SECTION: &str = "\n\nConsider these worldviews when assessing credibility. \
If an item's truth value depends on assumptions from one of these systems, note it in \
`relevant_belief_systems`:\n\n";

/// Representative excerpt of a long transcript: the first, middle and last
/// two cues joined by " [...] ", capped at `max_chars`.
fn sample_transcript(transcript: &NormalizedTranscript, max_chars: usize) -> String {
    let full = &transcript.full_text;
    if full.chars().count() <= max_chars {
        return full.clone();
    }

    let segments = &transcript.segments;
    let n = segments.len();
    if n <= 6 {
        return full.chars().take(max_chars).collect();
    }

    let mid_start = n / 2 - 1;
    let sample = segments[..2]
        .iter()
        .chain(&segments[mid_start..mid_start + 2])
        .chain(&segments[n - 2..])
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" [...] ");

    sample.chars().take(max_chars).collect()
}

/// Chat messages for categorization and bias detection.
pub fn classification_messages(transcript: &NormalizedTranscript, prompts: &Prompts) -> Vec<ChatMessage> {
    let categories = VideoCategory::ALL
        .iter()
        .map(|c| format!("- `{}`", c))
        .collect::<Vec<_>>()
        .join("\n");

    let vars = HashMap::from([
        ("categories".to_string(), categories),
        ("video_id".to_string(), transcript.video_id.clone()),
        (
            "transcript".to_string(),
            sample_transcript(transcript, CLASSIFICATION_SAMPLE_CHARS),
        ),
    ]);
    prompts.messages(&prompts.classification, &vars)
}

fn parse_classification(raw: &str) -> Result<VideoClassification> {
    let data: Value = serde_json::from_str(strip_fences(raw))?;
    let obj = data
        .as_object()
        .ok_or_else(|| FactifyError::Parse("Expected JSON object for classification".to_string()))?;

    let mut categories: Vec<VideoCategory> = Vec::new();
    for value in obj.get("categories").and_then(Value::as_array).into_iter().flatten() {
        match value.as_str().map(str::parse::<VideoCategory>) {
            Some(Ok(category)) if !categories.contains(&category) => categories.push(category),
            Some(Ok(_)) => {}
            _ => warn!(category = %value, "Skipping unknown video category"),
        }
    }
    if categories.is_empty() {
        categories.push(VideoCategory::Other);
    }

    let bias = obj.get("bias_profile").cloned().unwrap_or(Value::Null);
    let confidence = bias["confidence"].as_f64().unwrap_or(0.5);
    if !(0.0..=1.0).contains(&confidence) {
        return Err(FactifyError::Parse(format!(
            "Bias confidence {} is outside [0, 1]",
            confidence
        )));
    }

    let bias_profile = BiasProfile {
        primary_label: bias["primary_label"].as_str().unwrap_or("unknown").to_string(),
        confidence,
        rationale: bias["rationale"].as_str().unwrap_or_default().to_string(),
        implicit_bias_notes: bias["implicit_bias_notes"]
            .as_array()
            .map(|notes| notes.iter().filter_map(|n| n.as_str().map(String::from)).collect())
            .unwrap_or_default(),
    };

    Ok(VideoClassification {
        categories,
        bias_profile,
    })
}

/// Classify a video's categories and bias profile.
///
/// Long transcripts are sampled rather than sent whole.
pub async fn classify_video(
    transcript: &NormalizedTranscript,
    client: &LlmClient,
    prompts: &Prompts,
) -> Result<VideoClassification> {
    let messages = classification_messages(transcript, prompts);

    let result = client
        .complete_parsed(&messages, "classification", parse_classification)
        .await
        .map_err(|e| {
            FactifyError::Classification(format!(
                "Failed to classify video {} after {} attempts: {}",
                transcript.video_id,
                client.policy().parse_attempts,
                e
            ))
        })?;

    info!(
        video_id = %transcript.video_id,
        categories = ?result.categories,
        bias_label = %result.bias_profile.primary_label,
        "Video classified"
    );
    Ok(result)
}

/// Chat messages for credibility assessment of `items`.
pub fn credibility_messages(
    items: &[ExtractedItem],
    belief_modules: &[BeliefSystemModule],
    prompts: &Prompts,
) -> Vec<ChatMessage> {
    let belief_section = if belief_modules.is_empty() {
        String::new()
    } else {
        format!("{}{}", CREDIBILITY_BELIEF_SECTION, format_belief_modules(belief_modules))
    };

    let items_text = format_items(items, |item| {
        format!("Evidence: \"{}\"", item.transcript_evidence.text)
    });

    let vars = HashMap::from([
        ("belief_systems_section".to_string(), belief_section),
        ("items".to_string(), items_text),
    ]);
    prompts.messages(&prompts.credibility, &vars)
}

fn parse_credibility_entry(entry: &Value) -> Option<CredibilityAssessment> {
    let label: CredibilityLabel = serde_json::from_value(entry.get("label")?.clone()).ok()?;
    let confidence = entry.get("confidence").map_or(Some(0.5), Value::as_f64)?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }

    Some(CredibilityAssessment {
        label,
        confidence,
        rationale: entry["rationale"].as_str().unwrap_or_default().to_string(),
        relevant_belief_systems: entry["relevant_belief_systems"]
            .as_array()
            .map(|v| v.iter().filter_map(|s| s.as_str().map(String::from)).collect())
            .unwrap_or_default(),
    })
}

/// Parse assessments keyed by item id. Unknown ids and malformed entries are skipped.
fn parse_credibility(
    raw: &str,
    item_ids: &HashSet<&str>,
) -> Result<HashMap<String, CredibilityAssessment>> {
    let data: Value = serde_json::from_str(strip_fences(raw))?;
    let entries = data
        .as_array()
        .ok_or_else(|| FactifyError::Parse("Expected JSON array for credibility".to_string()))?;

    let mut assessments = HashMap::new();
    for entry in entries {
        let item_id = entry["item_id"].as_str().unwrap_or_default();
        if !item_ids.contains(item_id) {
            warn!(item_id, "Credibility assessment for unknown item");
            continue;
        }

        match parse_credibility_entry(entry) {
            Some(assessment) => {
                assessments.insert(item_id.to_string(), assessment);
            }
            None => warn!(raw = %entry, "Skipping invalid credibility assessment"),
        }
    }

    Ok(assessments)
}

/// Attach credibility assessments to `items`.
///
/// Items the model does not assess keep `credibility = None`. An empty input
/// makes no call.
pub async fn assess_credibility(
    items: Vec<ExtractedItem>,
    belief_modules: &[BeliefSystemModule],
    client: &LlmClient,
    prompts: &Prompts,
) -> Result<Vec<ExtractedItem>> {
    if items.is_empty() {
        return Ok(items);
    }

    let messages = credibility_messages(&items, belief_modules, prompts);
    let item_ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();

    let mut assessments = client
        .complete_parsed(&messages, "credibility", |raw| parse_credibility(raw, &item_ids))
        .await
        .map_err(|e| {
            FactifyError::Credibility(format!(
                "Failed to assess credibility after {} attempts: {}",
                client.policy().parse_attempts,
                e
            ))
        })?;

    let assessed = assessments.len();
    let total = items.len();
    let items = items
        .into_iter()
        .map(|mut item| {
            match assessments.remove(&item.id) {
                Some(assessment) => item.credibility = Some(assessment),
                None => warn!(item_id = %item.id, "No credibility assessment for item"),
            }
            item
        })
        .collect();

    info!(total_items = total, assessed, "Credibility assessed");
    Ok(items)
}
