//! Pipeline for Factify.
//!
//! Coordinates a run from transcript fetch to the final, auditable result.

use crate::classification::{assess_credibility, classify_video};
use crate::config::{Prompts, Settings};
use crate::error::{FactifyError, Result};
use crate::extraction::{extract_items, extraction_call_count};
use crate::llm::{ChatModel, LlmClient, OpenAiChatModel, RetryPolicy};
use crate::models::{AuditBundle, BeliefSystemModule, ExtractionResult, VideoInfo};
use crate::throttle::AdaptiveThrottle;
use crate::topics::cluster_topic_threads;
use crate::transcript::{
    normalize_transcript, segment_transcript, TranscriptSource, YoutubeTranscriptSource,
};
use crate::validation::validate_items;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// The main pipeline for turning a video into extracted items.
pub struct Pipeline {
    settings: Settings,
    prompts: Prompts,
    source: Arc<dyn TranscriptSource>,
    model: Arc<dyn ChatModel>,
    belief_modules: Vec<BeliefSystemModule>,
}

impl Pipeline {
    /// Create a pipeline backed by yt-dlp captions and the OpenAI API.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let source: Arc<dyn TranscriptSource> =
            Arc::new(YoutubeTranscriptSource::from_settings(&settings.pipeline));
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::from_settings(&settings.llm)?);

        info!("Using model {}", settings.llm.model);
        Ok(Self::with_components(settings, prompts, source, model))
    }

    /// Create a pipeline with custom components.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        source: Arc<dyn TranscriptSource>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            settings,
            prompts,
            source,
            model,
            belief_modules: Vec::new(),
        }
    }

    /// Belief system modules offered to extraction and credibility prompts.
    pub fn with_belief_modules(mut self, modules: Vec<BeliefSystemModule>) -> Self {
        self.belief_modules = modules;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    /// Run every stage for one video.
    ///
    /// All LLM calls of the run share one adaptive throttle. A stage failure
    /// is reported with the stage name and video id.
    #[instrument(skip(self))]
    pub async fn run(&self, video_id: &str) -> Result<ExtractionResult> {
        info!("Pipeline started");

        let raw = self
            .source
            .fetch(video_id)
            .await
            .map_err(|e| FactifyError::in_stage("fetch", video_id, e))?;
        let video_id = raw.video_id.clone();

        let transcript =
            normalize_transcript(&raw).map_err(|e| FactifyError::in_stage("normalize", &video_id, e))?;
        let title = transcript.metadata.as_ref().and_then(|m| m.title.clone());
        info!(
            video_id = %video_id,
            segment_count = transcript.segments.len(),
            title = ?title,
            "Transcript ready"
        );

        let segments = segment_transcript(&transcript, self.settings.pipeline.segment_seconds);
        info!(video_id = %video_id, segment_count = segments.len(), "Transcript segmented");

        // One task per non-blank segment plus the classification call.
        let throttle = Arc::new(AdaptiveThrottle::new(
            self.settings.throttle.to_config(extraction_call_count(&segments) + 1)?,
        ));
        let client = LlmClient::new(
            self.model.clone(),
            RetryPolicy::from_max_retries(self.settings.llm.max_retries),
        )
        .with_throttle(throttle.clone());

        let classification = classify_video(&transcript, &client, &self.prompts)
            .await
            .map_err(|e| FactifyError::in_stage("classify", &video_id, e))?;

        let raw_items = extract_items(
            &segments,
            &video_id,
            &classification.categories,
            &self.belief_modules,
            &client,
            &self.prompts,
            self.settings.pipeline.show_progress,
        )
        .await;
        info!(video_id = %video_id, item_count = raw_items.len(), "Items extracted");

        let validation = validate_items(raw_items, &transcript, self.settings.pipeline.quote_mismatch);
        let mut items = validation.accepted;
        items.extend(validation.downgraded);

        if !items.is_empty() {
            throttle.add_total(1);
        }
        let items = assess_credibility(items, &self.belief_modules, &client, &self.prompts)
            .await
            .map_err(|e| FactifyError::in_stage("credibility", &video_id, e))?;

        if items.len() >= 3 {
            throttle.add_total(1);
        }
        let topic_threads = cluster_topic_threads(&items, &client, &self.prompts)
            .await
            .map_err(|e| FactifyError::in_stage("topics", &video_id, e))?;

        debug!(progress = ?throttle.progress(), "LLM calls finished");

        let now = Utc::now();
        let audit = AuditBundle {
            model_id: client.model_id().to_string(),
            model_version: None,
            prompt_templates_hash: self.prompts.templates_hash(),
            processing_timestamp: now,
            segment_hashes: segments.iter().map(|s| s.hash.clone()).collect(),
            factify_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let video = VideoInfo {
            url: format!("https://www.youtube.com/watch?v={}", video_id),
            video_id: video_id.clone(),
            title,
            transcript_hash: transcript.hash.clone(),
            fetched_at: now,
        };

        info!(
            video_id = %video_id,
            item_count = items.len(),
            topic_thread_count = topic_threads.len(),
            "Pipeline complete"
        );

        Ok(ExtractionResult {
            video,
            classification,
            items,
            topic_threads,
            audit,
        })
    }
}
