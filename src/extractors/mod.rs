use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::USER_AGENT;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod innertube;
pub mod player;
pub mod video_id;
pub mod watch_page;
pub mod youtube;

pub use video_id::{extract_video_id, VideoId};

use crate::captions::{
    AttemptConfig, CaptionFormat, CaptionTrack, ClientIdentity, FailureReason,
    RetrievalStrategy, TrackListing, TrackListingAttempt,
};
use crate::config::Config;

/// Caption payloads larger than this are rejected
pub const MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Errors reported by an upstream caption source
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("age restricted: {0}")]
    AgeRestricted(String),

    #[error("captions are disabled for this video")]
    CaptionsDisabled,

    #[error("request blocked by upstream: {0}")]
    Blocked(String),

    #[error("{0}")]
    Transport(String),

    #[error("unexpected upstream response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Transport("request timed out".to_string())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

impl SourceError {
    /// Map onto the caller-facing failure taxonomy
    pub fn into_failure(self) -> FailureReason {
        match self {
            SourceError::VideoUnavailable(reason) => FailureReason::VideoUnavailable(reason),
            SourceError::AgeRestricted(reason) => FailureReason::AccessRestricted(reason),
            SourceError::CaptionsDisabled => FailureReason::NoCaptions,
            other @ (SourceError::Blocked(_)
            | SourceError::Transport(_)
            | SourceError::Malformed(_)) => FailureReason::Transport(other.to_string()),
        }
    }
}

/// Kinds of upstream caption sources, in their fixed chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Player response embedded in the watch page HTML
    WatchPage,
    /// Private player endpoint
    PlayerApi,
    /// The yt-dlp command-line tool
    YtDlp,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::WatchPage => "watch-page",
            SourceKind::PlayerApi => "player-api",
            SourceKind::YtDlp => "yt-dlp",
        }
    }

    pub fn all() -> [SourceKind; 3] {
        [SourceKind::WatchPage, SourceKind::PlayerApi, SourceKind::YtDlp]
    }
}

/// Trait for upstream services that can list and serve caption tracks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// List the caption tracks available for a video
    async fn list_tracks(
        &self,
        video_id: &VideoId,
        attempt: &AttemptConfig,
    ) -> Result<TrackListing, SourceError>;

    /// Fetch the raw payload of one track
    async fn fetch_payload(
        &self,
        track: &CaptionTrack,
        attempt: &AttemptConfig,
    ) -> Result<String, SourceError>;
}

/// Build the ordered fallback chain from configuration.
///
/// Page-level strategies run first, then yt-dlp passes from the broadest
/// request down to a minimal one.
pub fn build_strategies(config: &Config) -> anyhow::Result<Vec<Box<dyn RetrievalStrategy>>> {
    let captions = &config.captions;
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let english: Vec<String> = captions.english_languages.clone();
    let broad: Vec<String> = english
        .iter()
        .chain(captions.secondary_languages.iter())
        .cloned()
        .collect();
    let primary_english = english.first().cloned().unwrap_or_else(|| "en".to_string());

    let mut strategies: Vec<Box<dyn RetrievalStrategy>> = Vec::new();

    for kind in SourceKind::all() {
        if !captions.sources.contains(&kind) {
            tracing::debug!("Caption source '{}' disabled by configuration", kind.as_str());
            continue;
        }

        match kind {
            SourceKind::WatchPage => {
                let source: Arc<dyn CaptionSource> =
                    Arc::new(watch_page::WatchPageSource::new(client.clone()));
                strategies.push(Box::new(TrackListingAttempt::new(
                    source,
                    AttemptConfig::new("watch-page")
                        .timeout(Duration::from_secs(15))
                        .retries(1)
                        .client(ClientIdentity::Web)
                        .languages(broad.clone())
                        .formats(captions.formats.clone())
                        .preference(captions.track_preference),
                )));
            }
            SourceKind::PlayerApi => {
                let source: Arc<dyn CaptionSource> =
                    Arc::new(innertube::InnertubeSource::new(client.clone()));
                strategies.push(Box::new(TrackListingAttempt::new(
                    source,
                    AttemptConfig::new("player-api")
                        .timeout(Duration::from_secs(15))
                        .retries(1)
                        .client(ClientIdentity::Android)
                        .languages(broad.clone())
                        .formats(captions.formats.clone())
                        .preference(captions.track_preference),
                )));
            }
            SourceKind::YtDlp => {
                let source: Arc<dyn CaptionSource> = Arc::new(youtube::YtDlpSource::new(
                    config.download.yt_dlp_path.clone(),
                    client.clone(),
                ));
                strategies.push(Box::new(TrackListingAttempt::new(
                    source.clone(),
                    AttemptConfig::new("yt-dlp/full")
                        .timeout(Duration::from_secs(30))
                        .retries(3)
                        .languages(broad.clone())
                        .formats(captions.formats.clone())
                        .preference(captions.track_preference),
                )));
                strategies.push(Box::new(TrackListingAttempt::new(
                    source.clone(),
                    AttemptConfig::new("yt-dlp/english")
                        .timeout(Duration::from_secs(20))
                        .retries(1)
                        .client(ClientIdentity::Web)
                        .languages(english.clone())
                        .formats(vec![CaptionFormat::Json3, CaptionFormat::Vtt])
                        .preference(captions.track_preference),
                )));
                strategies.push(Box::new(TrackListingAttempt::new(
                    source,
                    AttemptConfig::new("yt-dlp/minimal")
                        .timeout(Duration::from_secs(10))
                        .retries(0)
                        .languages([primary_english.clone()])
                        .formats(vec![CaptionFormat::Vtt])
                        .preference(captions.track_preference),
                )));
            }
        }
    }

    if strategies.is_empty() {
        anyhow::bail!("No caption sources are enabled in the configuration");
    }

    Ok(strategies)
}

/// Send a request, retrying transport failures and retryable statuses
pub(crate) async fn send_with_retries<F>(
    attempt: &AttemptConfig,
    what: &str,
    build: F,
) -> Result<Response, SourceError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error = None;

    for try_number in 0..=attempt.retries {
        if try_number > 0 {
            let backoff = Duration::from_millis(500 * u64::from(try_number));
            tracing::debug!("Retrying {} in {:?} (try {})", what, backoff, try_number + 1);
            tokio::time::sleep(backoff).await;
        }

        match build().timeout(attempt.timeout).send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) if is_retryable(response.status()) => {
                last_error = Some(SourceError::Transport(format!(
                    "{} returned HTTP {}",
                    what,
                    response.status()
                )));
            }
            Ok(response) => {
                return Err(SourceError::Transport(format!(
                    "{} returned HTTP {}",
                    what,
                    response.status()
                )));
            }
            Err(e) => last_error = Some(e.into()),
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Transport(format!("{} was never sent", what))))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Read a response body as text, refusing anything over `limit` bytes
pub(crate) async fn read_body(response: Response, limit: usize) -> Result<String, SourceError> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(SourceError::Malformed(format!(
                "response body exceeds {} bytes",
                limit
            )));
        }
        body.extend_from_slice(&chunk);
    }

    String::from_utf8(body).map_err(|e| SourceError::Malformed(format!("body is not UTF-8: {}", e)))
}

/// Plain GET of a caption payload, shared by every source
pub(crate) async fn fetch_caption_payload(
    client: &Client,
    track: &CaptionTrack,
    attempt: &AttemptConfig,
) -> Result<String, SourceError> {
    let response = send_with_retries(attempt, "caption payload", || {
        client
            .get(&track.url)
            .header(USER_AGENT, attempt.client.user_agent())
    })
    .await?;

    read_body(response, MAX_PAYLOAD_BYTES).await
}
