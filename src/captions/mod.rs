//! Caption retrieval: track model, the fallback chain and its failure taxonomy.
//!
//! A [`CaptionFetcher`] walks an ordered list of [`RetrievalStrategy`] values.
//! Each strategy either produces a [`Transcript`] or reports why it could not.
//! Fatal reasons (the video is gone or age-gated) stop the chain at once; every
//! other reason moves on to the next strategy. Strategies never run
//! concurrently, so the worst-case latency is the sum of their timeouts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod attempt;
pub mod cache;
pub mod decoders;

pub use attempt::{AttemptConfig, ClientIdentity, TrackListingAttempt, TrackPreference};
pub use cache::TranscriptCache;

use crate::extractors::VideoId;

/// Whether a track was machine-generated or authored by a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Automatic,
    Manual,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Automatic => "automatic",
            TrackKind::Manual => "manual",
        }
    }
}

/// Wire format of a caption payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    Json3,
    Vtt,
    Ttml,
    Srv3,
    Srv2,
    Srv1,
    #[serde(untagged)]
    Other(String),
}

impl CaptionFormat {
    pub fn as_str(&self) -> &str {
        match self {
            CaptionFormat::Json3 => "json3",
            CaptionFormat::Vtt => "vtt",
            CaptionFormat::Ttml => "ttml",
            CaptionFormat::Srv3 => "srv3",
            CaptionFormat::Srv2 => "srv2",
            CaptionFormat::Srv1 => "srv1",
            CaptionFormat::Other(ext) => ext,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "json3" => CaptionFormat::Json3,
            "vtt" | "webvtt" => CaptionFormat::Vtt,
            "ttml" | "xml" | "dfxp" => CaptionFormat::Ttml,
            "srv3" => CaptionFormat::Srv3,
            "srv2" => CaptionFormat::Srv2,
            "srv1" => CaptionFormat::Srv1,
            other => CaptionFormat::Other(other.to_string()),
        }
    }

    /// Formats a timedtext base URL can be asked for, in preference order
    pub fn timedtext_formats() -> Vec<CaptionFormat> {
        vec![
            CaptionFormat::Json3,
            CaptionFormat::Vtt,
            CaptionFormat::Ttml,
            CaptionFormat::Srv3,
            CaptionFormat::Srv2,
            CaptionFormat::Srv1,
        ]
    }
}

impl std::fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One caption asset reported by an upstream source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    /// Language code as reported upstream (e.g. "en", "en-GB", "ja")
    pub language: String,

    pub format: CaptionFormat,

    /// URL the payload is fetched from
    pub url: String,

    pub kind: TrackKind,
}

/// All tracks one source reported for one video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackListing {
    pub tracks: Vec<CaptionTrack>,
}

impl TrackListing {
    pub fn new(tracks: Vec<CaptionTrack>) -> Self {
        Self { tracks }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Distinct language codes seen in this listing, sorted
    pub fn observed_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.tracks.iter().map(|t| t.language.clone()).collect();
        languages.sort();
        languages.dedup();
        languages
    }
}

/// A successfully retrieved transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Flat transcript text, never empty
    pub text: String,

    /// Language code of the track the text came from
    pub language: String,

    pub kind: TrackKind,

    pub format: CaptionFormat,

    /// Name of the strategy that produced the text
    pub strategy: String,
}

/// Why a transcript could not be retrieved
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("Video is unavailable: {0}")]
    VideoUnavailable(String),

    #[error("Access to the video is restricted: {0}")]
    AccessRestricted(String),

    #[error("The video has no captions")]
    NoCaptions,

    #[error("No captions in a supported language or format (available: {})", list_or_none(.observed))]
    NoSupportedTrack { observed: Vec<String> },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Caption payload could not be decoded: {0}")]
    Decode(String),

    #[error(
        "No transcript could be retrieved (caption languages seen: {}; attempts: {}). Paste the text manually instead.",
        list_or_none(.observed),
        .attempts.join("; ")
    )]
    Exhausted {
        observed: Vec<String>,
        attempts: Vec<String>,
    },
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

impl FailureReason {
    /// Fatal reasons end the fallback chain immediately
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FailureReason::VideoUnavailable(_) | FailureReason::AccessRestricted(_)
        )
    }
}

/// Outcome of a single failed strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub reason: FailureReason,

    /// Caption languages the strategy saw before failing
    pub observed: Vec<String>,
}

impl AttemptError {
    pub fn new(reason: FailureReason) -> Self {
        Self {
            reason,
            observed: Vec::new(),
        }
    }

    pub fn with_observed(reason: FailureReason, observed: Vec<String>) -> Self {
        Self { reason, observed }
    }
}

impl From<FailureReason> for AttemptError {
    fn from(reason: FailureReason) -> Self {
        Self::new(reason)
    }
}

/// One interchangeable way of getting a transcript for a video
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    /// Name used in logs and diagnostics
    fn name(&self) -> &str;

    async fn attempt(&self, video_id: &VideoId) -> Result<Transcript, AttemptError>;
}

/// Runs retrieval strategies in order until one yields a transcript
pub struct CaptionFetcher {
    strategies: Vec<Box<dyn RetrievalStrategy>>,
    cache: Option<Arc<TranscriptCache>>,
}

impl CaptionFetcher {
    pub fn new(strategies: Vec<Box<dyn RetrievalStrategy>>) -> Self {
        Self {
            strategies,
            cache: None,
        }
    }

    /// Share a results cache with this fetcher.
    ///
    /// The cache lives in memory, so it only pays off for callers that keep
    /// one fetcher (or one [`crate::ScriptPipeline`]) across many fetches.
    /// A single `scribe fetch` run starts with an empty cache.
    pub fn with_cache(mut self, cache: Arc<TranscriptCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Retrieve a transcript, trying every strategy in order.
    ///
    /// Never panics and never returns a transport-level error directly:
    /// every failure is folded into a [`FailureReason`].
    pub async fn fetch(&self, video_id: &VideoId) -> Result<Transcript, FailureReason> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(video_id) {
                tracing::debug!("Transcript cache hit for {}", video_id);
                return Ok(hit);
            }
        }

        let mut observed: Vec<String> = Vec::new();
        let mut attempts: Vec<String> = Vec::new();

        for strategy in &self.strategies {
            tracing::debug!("Trying caption strategy '{}' for {}", strategy.name(), video_id);

            match strategy.attempt(video_id).await {
                Ok(transcript) => {
                    tracing::info!(
                        "Retrieved {} {} captions ({}) via '{}'",
                        transcript.kind.as_str(),
                        transcript.language,
                        transcript.format,
                        strategy.name()
                    );
                    if let Some(cache) = &self.cache {
                        cache.insert(video_id, transcript.clone());
                    }
                    return Ok(transcript);
                }
                Err(err) if err.reason.is_fatal() => {
                    tracing::warn!("Strategy '{}' reported a fatal error: {}", strategy.name(), err.reason);
                    return Err(err.reason);
                }
                Err(err) => {
                    tracing::warn!("Strategy '{}' failed: {}", strategy.name(), err.reason);
                    observed.extend(err.observed);
                    attempts.push(format!("{}: {}", strategy.name(), err.reason));
                }
            }
        }

        observed.sort();
        observed.dedup();

        Err(FailureReason::Exhausted { observed, attempts })
    }

    /// Caller-facing contract: `(text, error)` where exactly one is non-empty
    pub async fn fetch_transcript(&self, video_id: &str) -> (String, String) {
        let Some(id) = VideoId::from_id(video_id) else {
            return (String::new(), format!("Invalid video id: '{}'", video_id));
        };

        match self.fetch(&id).await {
            Ok(transcript) => (transcript.text, String::new()),
            Err(reason) => (String::new(), reason.to_string()),
        }
    }
}
