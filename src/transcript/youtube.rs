//! YouTube captions via yt-dlp.

use super::{RawSegment, RawTranscript, TranscriptSource, VideoMetadata};
use crate::config::PipelineSettings;
use crate::error::{FactifyError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetch attempts when yt-dlp succeeds but no caption track comes back.
const FETCH_ATTEMPTS: u32 = 2;

const FETCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Extract a video ID from a YouTube URL or a bare ID.
pub fn extract_video_id(input: &str) -> Option<String> {
    static VIDEO_ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = VIDEO_ID_RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:
                # Full YouTube URLs
                (?:https?://)?
                (?:www\.|m\.)?
                (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/|youtube\.com/v/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            # Bare video ID (11 characters)
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("Invalid regex")
    });

    let caps = re.captures(input.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Explain a missing transcript based on how recently the video went up.
pub fn upload_date_hint(upload_date: Option<NaiveDate>, today: NaiveDate) -> &'static str {
    const MISSING: &str = "The video may lack captions or they may be disabled.";

    let Some(uploaded) = upload_date else {
        return MISSING;
    };

    match (today - uploaded).num_days() {
        d if d < 1 => {
            "This video was uploaded within the last 24 hours; captions may not be available yet. Try again later."
        }
        d if d <= 7 => "This video was uploaded recently; auto-generated captions may still be processing.",
        _ => MISSING,
    }
}

/// A caption track chosen from the yt-dlp info dump.
#[derive(Debug, Clone, PartialEq)]
struct CaptionTrack {
    language: String,
    url: String,
    automatic: bool,
}

#[derive(Debug, Deserialize)]
struct TrackFormat {
    ext: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Json3Captions {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: i64,
    #[serde(default)]
    d_duration_ms: i64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Pick a json3 track, preferring manual subtitles over automatic captions
/// and earlier configured languages over later ones.
fn select_track(info: &serde_json::Value, languages: &[String]) -> Option<CaptionTrack> {
    for (key, automatic) in [("subtitles", false), ("automatic_captions", true)] {
        let Some(tracks) = info[key].as_object() else {
            continue;
        };

        for lang in languages {
            let prefix = format!("{}-", lang);
            let candidate = tracks.get(lang.as_str()).map(|v| (lang.clone(), v)).or_else(|| {
                tracks
                    .iter()
                    .find(|(code, _)| code.starts_with(&prefix))
                    .map(|(code, v)| (code.clone(), v))
            });

            let Some((language, formats)) = candidate else {
                continue;
            };

            let formats: Vec<TrackFormat> = serde_json::from_value(formats.clone()).unwrap_or_default();
            if let Some(format) = formats.into_iter().find(|f| f.ext == "json3") {
                return Some(CaptionTrack {
                    language,
                    url: format.url,
                    automatic,
                });
            }
        }
    }

    None
}

fn parse_metadata(info: &serde_json::Value) -> VideoMetadata {
    // yt-dlp returns the date as YYYYMMDD
    let upload_date = info["upload_date"]
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok());

    VideoMetadata {
        title: info["title"].as_str().map(String::from),
        channel_id: info["channel_id"].as_str().map(String::from),
        channel_title: info["channel"]
            .as_str()
            .or_else(|| info["uploader"].as_str())
            .map(String::from),
        upload_date,
        duration_seconds: info["duration"].as_f64().map(|d| d as u32),
    }
}

/// Convert json3 caption events into raw segments.
fn parse_json3(body: &str) -> Result<Vec<RawSegment>> {
    let captions: Json3Captions = serde_json::from_str(body)
        .map_err(|e| FactifyError::TranscriptFetch(format!("Invalid caption track: {}", e)))?;

    Ok(captions
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            if text.trim().is_empty() {
                return None;
            }
            Some(RawSegment {
                text,
                start_ms: event.t_start_ms,
                end_ms: event.t_start_ms + event.d_duration_ms,
            })
        })
        .collect())
}

/// Transcript source backed by yt-dlp and YouTube's json3 caption format.
pub struct YoutubeTranscriptSource {
    languages: Vec<String>,
    http: reqwest::Client,
}

impl YoutubeTranscriptSource {
    pub fn new(languages: Vec<String>) -> Self {
        let languages = if languages.is_empty() {
            vec!["en".to_string()]
        } else {
            languages
        };
        Self {
            languages,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.languages.clone())
    }

    /// Fetch the video's info JSON with yt-dlp.
    async fn dump_info(&self, video_id: &str) -> Result<serde_json::Value> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);

        let output = tokio::process::Command::new("yt-dlp")
            .args(["--dump-json", "--skip-download", "--no-warnings", &url])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FactifyError::ToolNotFound("yt-dlp".to_string())
                } else {
                    FactifyError::TranscriptFetch(format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FactifyError::TranscriptFetch(format!(
                "Failed to fetch transcript for {}: {}",
                video_id,
                stderr.trim()
            )));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&json_str).map_err(|e| {
            FactifyError::TranscriptFetch(format!("Failed to parse yt-dlp output: {}", e))
        })
    }

    async fn download_track(&self, track: &CaptionTrack) -> Result<Vec<RawSegment>> {
        debug!(language = %track.language, automatic = track.automatic, "Downloading caption track");
        let body = self
            .http
            .get(&track.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_json3(&body)
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscriptSource {
    async fn fetch(&self, input: &str) -> Result<RawTranscript> {
        let video_id = extract_video_id(input).ok_or_else(|| {
            FactifyError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", input))
        })?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let info = self.dump_info(&video_id).await?;
            let metadata = parse_metadata(&info);

            if let Some(track) = select_track(&info, &self.languages) {
                let segments = self.download_track(&track).await?;
                info!(
                    video_id = %video_id,
                    language = %track.language,
                    segments = segments.len(),
                    "Fetched transcript"
                );
                return Ok(RawTranscript {
                    video_id,
                    segments,
                    language: Some(track.language),
                    metadata: Some(metadata),
                });
            }

            if attempt < FETCH_ATTEMPTS {
                warn!(
                    video_id = %video_id,
                    attempt,
                    retry_in_seconds = FETCH_RETRY_DELAY.as_secs(),
                    "No transcript returned, retrying"
                );
                tokio::time::sleep(FETCH_RETRY_DELAY).await;
                continue;
            }

            let hint = upload_date_hint(metadata.upload_date, Utc::now().date_naive());
            return Err(FactifyError::TranscriptFetch(format!(
                "No transcript available for {}. {}",
                video_id, hint
            )));
        }
    }
}
