use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::sync::OnceLock;

use super::{
    fetch_caption_payload, player, read_body, send_with_retries, CaptionSource, SourceError,
    VideoId,
};
use crate::captions::{AttemptConfig, CaptionTrack, TrackListing};

const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

/// Watch pages are large; anything beyond this is not a real page
const MAX_PAGE_BYTES: usize = 16 * 1024 * 1024;

fn player_response_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)ytInitialPlayerResponse\s*=\s*(\{.+?\})\s*;\s*(?:var\s+meta|</script>)")
            .expect("player response pattern is valid")
    })
}

/// Scrapes the player response embedded in a video's watch page
pub struct WatchPageSource {
    client: Client,
    base_url: String,
}

impl WatchPageSource {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, YOUTUBE_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn extract_player_response(html: &str) -> Result<&str, SourceError> {
        if html.contains("action=\"https://consent.youtube.com") {
            return Err(SourceError::Blocked("consent page served instead of the video".into()));
        }

        player_response_pattern()
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| SourceError::Malformed("no player response in watch page".into()))
    }
}

#[async_trait]
impl CaptionSource for WatchPageSource {
    async fn list_tracks(
        &self,
        video_id: &VideoId,
        attempt: &AttemptConfig,
    ) -> Result<TrackListing, SourceError> {
        let url = format!("{}/watch", self.base_url);
        tracing::debug!("Fetching watch page for {}", video_id);

        let response = send_with_retries(attempt, "watch page", || {
            self.client
                .get(&url)
                .query(&[("v", video_id.as_str()), ("hl", "en")])
                .header(USER_AGENT, attempt.client.user_agent())
                .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        })
        .await?;

        let html = read_body(response, MAX_PAGE_BYTES).await?;
        let json = Self::extract_player_response(&html)?;
        player::parse_player_response(json)
    }

    async fn fetch_payload(
        &self,
        track: &CaptionTrack,
        attempt: &AttemptConfig,
    ) -> Result<String, SourceError> {
        fetch_caption_payload(&self.client, track, attempt).await
    }
}
