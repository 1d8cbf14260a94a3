//! Topic threads: recurring subjects grouped across the video.

use crate::config::{format_items, Prompts};
use crate::error::{FactifyError, Result};
use crate::llm::{strip_fences, ChatMessage, LlmClient};
use crate::models::{ExtractedItem, TopicThread, TopicTimeSpan};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

/// Below this many items there is nothing worth threading.
const MIN_ITEMS_FOR_THREADING: usize = 3;

/// Chat messages for topic clustering.
pub fn topic_messages(items: &[ExtractedItem], prompts: &Prompts) -> Vec<ChatMessage> {
    let items_text = format_items(items, |item| {
        format!(
            "Time: {}ms-{}ms",
            item.transcript_evidence.start_ms, item.transcript_evidence.end_ms
        )
    });

    let vars = HashMap::from([
        ("item_count".to_string(), items.len().to_string()),
        ("items".to_string(), items_text),
    ]);
    prompts.messages(&prompts.topics, &vars)
}

/// Sorted evidence spans of the referenced items, with overlaps merged.
pub fn derive_timeline(item_ids: &[String], items_by_id: &HashMap<&str, &ExtractedItem>) -> Vec<TopicTimeSpan> {
    let mut spans: Vec<(i64, i64)> = item_ids
        .iter()
        .filter_map(|id| items_by_id.get(id.as_str()))
        .map(|item| (item.transcript_evidence.start_ms, item.transcript_evidence.end_ms))
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<TopicTimeSpan> = Vec::with_capacity(spans.len());
    for (start_ms, end_ms) in spans {
        match merged.last_mut() {
            Some(prev) if start_ms <= prev.end_ms => prev.end_ms = prev.end_ms.max(end_ms),
            _ => merged.push(TopicTimeSpan { start_ms, end_ms }),
        }
    }
    merged
}

fn parse_topic_threads(raw: &str, items_by_id: &HashMap<&str, &ExtractedItem>) -> Result<Vec<TopicThread>> {
    let data: Value = serde_json::from_str(strip_fences(raw))?;
    let entries = data
        .as_array()
        .ok_or_else(|| FactifyError::Parse("Expected JSON array of topic threads".to_string()))?;

    let mut threads = Vec::new();
    for entry in entries {
        let (Some(label), Some(display_name), Some(summary)) = (
            entry["label"].as_str(),
            entry["display_name"].as_str(),
            entry["summary"].as_str(),
        ) else {
            warn!(raw = %entry, "Skipping invalid topic thread");
            continue;
        };

        let mut item_ids: Vec<String> = Vec::new();
        for id in entry["item_ids"].as_array().into_iter().flatten().filter_map(Value::as_str) {
            if items_by_id.contains_key(id) {
                item_ids.push(id.to_string());
            } else {
                warn!(thread_label = label, item_id = id, "Topic thread references unknown item");
            }
        }

        if item_ids.is_empty() {
            warn!(thread_label = label, "Topic thread empty after filtering");
            continue;
        }

        threads.push(TopicThread {
            label: label.to_string(),
            display_name: display_name.to_string(),
            summary: summary.to_string(),
            timeline: derive_timeline(&item_ids, items_by_id),
            item_ids,
        });
    }

    Ok(threads)
}

/// Group items into topic threads.
///
/// Fewer than three items yields no threads and makes no call.
pub async fn cluster_topic_threads(
    items: &[ExtractedItem],
    client: &LlmClient,
    prompts: &Prompts,
) -> Result<Vec<TopicThread>> {
    if items.len() < MIN_ITEMS_FOR_THREADING {
        info!(
            item_count = items.len(),
            min_required = MIN_ITEMS_FOR_THREADING,
            "Skipping topic threading"
        );
        return Ok(Vec::new());
    }

    let messages = topic_messages(items, prompts);
    let items_by_id: HashMap<&str, &ExtractedItem> = items.iter().map(|i| (i.id.as_str(), i)).collect();

    let threads = client
        .complete_parsed(&messages, "topic_clustering", |raw| {
            parse_topic_threads(raw, &items_by_id)
        })
        .await
        .map_err(|e| {
            FactifyError::TopicClustering(format!(
                "Failed to cluster topic threads after {} attempts: {}",
                client.policy().parse_attempts,
                e
            ))
        })?;

    info!(thread_count = threads.len(), item_count = items.len(), "Topic threads clustered");
    Ok(threads)
}
