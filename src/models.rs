//! Data models for extracted items, classifications and the final result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enums
// ============================================================================

/// Kind of item extracted from a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    DirectQuote,
    TranscriptFact,
    GeneralKnowledge,
    SpeakerOpinion,
    UnverifiedClaim,
    Prediction,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::DirectQuote => "direct_quote",
            ItemType::TranscriptFact => "transcript_fact",
            ItemType::GeneralKnowledge => "general_knowledge",
            ItemType::SpeakerOpinion => "speaker_opinion",
            ItemType::UnverifiedClaim => "unverified_claim",
            ItemType::Prediction => "prediction",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credibility verdict for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredibilityLabel {
    WellEstablished,
    Credible,
    Disputed,
    Dubious,
    Unassessable,
}

/// Video category used to give extraction some context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCategory {
    News,
    Entertainment,
    MusicVideo,
    ComedySatire,
    Interview,
    Documentary,
    Tutorial,
    OpinionEditorial,
    PoliticalSpeech,
    PanelDiscussion,
    Other,
}

impl VideoCategory {
    pub const ALL: [VideoCategory; 11] = [
        VideoCategory::News,
        VideoCategory::Entertainment,
        VideoCategory::MusicVideo,
        VideoCategory::ComedySatire,
        VideoCategory::Interview,
        VideoCategory::Documentary,
        VideoCategory::Tutorial,
        VideoCategory::OpinionEditorial,
        VideoCategory::PoliticalSpeech,
        VideoCategory::PanelDiscussion,
        VideoCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCategory::News => "news",
            VideoCategory::Entertainment => "entertainment",
            VideoCategory::MusicVideo => "music_video",
            VideoCategory::ComedySatire => "comedy_satire",
            VideoCategory::Interview => "interview",
            VideoCategory::Documentary => "documentary",
            VideoCategory::Tutorial => "tutorial",
            VideoCategory::OpinionEditorial => "opinion_editorial",
            VideoCategory::PoliticalSpeech => "political_speech",
            VideoCategory::PanelDiscussion => "panel_discussion",
            VideoCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for VideoCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        VideoCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown video category: {}", s))
    }
}

impl std::fmt::Display for VideoCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What validation does with a direct quote it cannot find in the transcript.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuoteMismatch {
    /// Drop the item.
    #[default]
    Reject,
    /// Keep it as an unverified claim.
    Downgrade,
}

impl std::str::FromStr for QuoteMismatch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(QuoteMismatch::Reject),
            "downgrade" => Ok(QuoteMismatch::Downgrade),
            _ => Err(format!("Unknown quote mismatch behavior: {}", s)),
        }
    }
}

impl std::fmt::Display for QuoteMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteMismatch::Reject => write!(f, "reject"),
            QuoteMismatch::Downgrade => write!(f, "downgrade"),
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Links an extracted item to the transcript span it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvidence {
    pub video_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Exact transcript text backing the item.
    pub text: String,
}

/// Flags an item as relying on a specific worldview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefSystemFlag {
    pub module_label: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityAssessment {
    pub label: CredibilityLabel,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub rationale: String,
    #[serde(default)]
    pub relevant_belief_systems: Vec<String>,
}

/// A single fact, quote, opinion or claim pulled from the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub content: String,
    #[serde(default)]
    pub speaker: Option<String>,
    pub transcript_evidence: TranscriptEvidence,
    #[serde(default)]
    pub credibility: Option<CredibilityAssessment>,
    #[serde(default)]
    pub belief_system_flags: Vec<BeliefSystemFlag>,
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasProfile {
    pub primary_label: String,
    pub confidence: f64,
    pub rationale: String,
    #[serde(default)]
    pub implicit_bias_notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClassification {
    pub categories: Vec<VideoCategory>,
    pub bias_profile: BiasProfile,
}

/// A worldview definition that extraction and credibility prompts can reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefSystemModule {
    pub label: String,
    pub display_name: String,
    pub description: String,
    pub core_assumptions: Vec<String>,
    #[serde(default)]
    pub example_claims: Vec<String>,
}

// ============================================================================
// Topic threads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicTimeSpan {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// A named cluster of items sharing a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicThread {
    pub label: String,
    pub display_name: String,
    pub summary: String,
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TopicTimeSpan>,
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub title: Option<String>,
    pub url: String,
    pub transcript_hash: String,
    pub fetched_at: DateTime<Utc>,
}

/// Audit trail tying a result to its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBundle {
    pub model_id: String,
    pub model_version: Option<String>,
    pub prompt_templates_hash: String,
    pub processing_timestamp: DateTime<Utc>,
    pub segment_hashes: Vec<String>,
    pub factify_version: String,
}

/// Outcome of checking extracted items against the transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accepted: Vec<ExtractedItem>,
    pub rejected: Vec<ExtractedItem>,
    pub downgraded: Vec<ExtractedItem>,
}

/// Everything one pipeline run produces for a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub video: VideoInfo,
    pub classification: VideoClassification,
    pub items: Vec<ExtractedItem>,
    #[serde(default)]
    pub topic_threads: Vec<TopicThread>,
    pub audit: AuditBundle,
}
