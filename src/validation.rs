//! Checks extracted items against the transcript they claim to come from.

use crate::models::{ExtractedItem, ItemType, QuoteMismatch, ValidationResult};
use crate::transcript::NormalizedTranscript;
use tracing::{info, warn};

/// Whether `text` occurs in the transcript text overlapping `(start_ms, end_ms)`.
pub fn verify_quote(text: &str, transcript: &NormalizedTranscript, start_ms: i64, end_ms: i64) -> bool {
    let overlapping: Vec<&str> = transcript
        .segments
        .iter()
        .filter(|seg| seg.end_ms > start_ms && seg.start_ms < end_ms)
        .map(|seg| seg.text.as_str())
        .collect();

    !overlapping.is_empty() && overlapping.join(" ").contains(text)
}

fn timestamps_valid(item: &ExtractedItem, transcript: &NormalizedTranscript) -> bool {
    let evidence = &item.transcript_evidence;
    if evidence.start_ms < 0 || evidence.end_ms < 0 || evidence.start_ms >= evidence.end_ms {
        return false;
    }

    match transcript.bounds() {
        Some((start, end)) => evidence.start_ms >= start && evidence.end_ms <= end,
        None => false,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

/// Sort items into accepted, rejected and downgraded.
///
/// Direct quotes must appear verbatim in the transcript at their timestamps;
/// a mismatch is rejected or downgraded to an unverified claim depending on
/// `quote_mismatch`. Every other item needs verifiable evidence text.
pub fn validate_items(
    items: Vec<ExtractedItem>,
    transcript: &NormalizedTranscript,
    quote_mismatch: QuoteMismatch,
) -> ValidationResult {
    let total = items.len();
    let mut result = ValidationResult::default();

    for mut item in items {
        if !timestamps_valid(&item, transcript) {
            warn!(
                item_id = %item.id,
                start_ms = item.transcript_evidence.start_ms,
                end_ms = item.transcript_evidence.end_ms,
                "Rejected item with invalid timestamps"
            );
            result.rejected.push(item);
            continue;
        }

        let (start_ms, end_ms) = (item.transcript_evidence.start_ms, item.transcript_evidence.end_ms);

        if item.item_type == ItemType::DirectQuote {
            if !verify_quote(&item.content, transcript, start_ms, end_ms) {
                match quote_mismatch {
                    QuoteMismatch::Reject => {
                        warn!(item_id = %item.id, content = %preview(&item.content), "Rejected mismatched quote");
                        result.rejected.push(item);
                    }
                    QuoteMismatch::Downgrade => {
                        info!(item_id = %item.id, content = %preview(&item.content), "Downgraded mismatched quote");
                        item.item_type = ItemType::UnverifiedClaim;
                        result.downgraded.push(item);
                    }
                }
                continue;
            }
        }

        if !verify_quote(&item.transcript_evidence.text, transcript, start_ms, end_ms) {
            warn!(
                item_id = %item.id,
                evidence = %preview(&item.transcript_evidence.text),
                "Rejected item with unverifiable evidence"
            );
            result.rejected.push(item);
            continue;
        }

        result.accepted.push(item);
    }

    info!(
        total,
        accepted = result.accepted.len(),
        rejected = result.rejected.len(),
        downgraded = result.downgraded.len(),
        "Validation complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TranscriptEvidence;
    use crate::transcript::NormalizedSegment;

    fn transcript() -> NormalizedTranscript {
        let seg = |text: &str, start_ms, end_ms| NormalizedSegment {
            text: text.to_string(),
            start_ms,
            end_ms,
            hash: String::new(),
        };
        NormalizedTranscript {
            video_id: "vid".to_string(),
            full_text: "the cat sat on the mat and then it slept".to_string(),
            hash: String::new(),
            segments: vec![
                seg("the cat sat", 0, 2000),
                seg("on the mat", 2000, 4000),
                seg("and then it slept", 4000, 6000),
            ],
            language: None,
            metadata: None,
        }
    }

    fn item(id: &str, item_type: ItemType, content: &str, evidence: &str, start_ms: i64, end_ms: i64) -> ExtractedItem {
        ExtractedItem {
            id: id.to_string(),
            item_type,
            content: content.to_string(),
            speaker: None,
            transcript_evidence: TranscriptEvidence {
                video_id: "vid".to_string(),
                start_ms,
                end_ms,
                text: evidence.to_string(),
            },
            credibility: None,
            belief_system_flags: vec![],
        }
    }

    #[test]
    fn test_verify_quote_spans_segments() {
        let t = transcript();
        assert!(verify_quote("cat sat on the", &t, 0, 3000));
        assert!(!verify_quote("it slept", &t, 0, 3000));
        assert!(verify_quote("it slept", &t, 4500, 5000));
        // A range touching only a boundary overlaps nothing.
        assert!(!verify_quote("the cat", &t, 6000, 7000));
    }

    #[test]
    fn test_rejects_bad_timestamps() {
        let t = transcript();
        let items = vec![
            item("neg", ItemType::TranscriptFact, "x", "the cat", -5, 100),
            item("inverted", ItemType::TranscriptFact, "x", "the cat", 1000, 1000),
            item("past_end", ItemType::TranscriptFact, "x", "slept", 5000, 9000),
        ];
        let result = validate_items(items, &t, QuoteMismatch::Reject);
        assert!(result.accepted.is_empty());
        assert_eq!(result.rejected.len(), 3);
    }

    #[test]
    fn test_quote_mismatch_reject_and_downgrade() {
        let t = transcript();
        let make = || {
            vec![
                item("ok", ItemType::DirectQuote, "on the mat", "on the mat", 2000, 4000),
                item("bad", ItemType::DirectQuote, "on a rug", "on the mat", 2000, 4000),
            ]
        };

        let rejected = validate_items(make(), &t, QuoteMismatch::Reject);
        assert_eq!(rejected.accepted.len(), 1);
        assert_eq!(rejected.rejected[0].id, "bad");
        assert!(rejected.downgraded.is_empty());

        let downgraded = validate_items(make(), &t, QuoteMismatch::Downgrade);
        assert_eq!(downgraded.accepted.len(), 1);
        assert!(downgraded.rejected.is_empty());
        assert_eq!(downgraded.downgraded[0].item_type, ItemType::UnverifiedClaim);
    }

    #[test]
    fn test_rejects_unverifiable_evidence() {
        let t = transcript();
        let items = vec![
            item("fact", ItemType::TranscriptFact, "A cat sat down", "the cat sat", 0, 2000),
            item("made_up", ItemType::SpeakerOpinion, "Dogs are better", "dogs rule", 0, 2000),
        ];
        let result = validate_items(items, &t, QuoteMismatch::Reject);
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].id, "fact");
        assert_eq!(result.rejected[0].id, "made_up");
    }
}
