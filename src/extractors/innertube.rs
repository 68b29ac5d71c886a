use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_json::json;

use super::{
    fetch_caption_payload, player, read_body, send_with_retries, CaptionSource, SourceError,
    VideoId,
};
use crate::captions::{AttemptConfig, CaptionTrack, ClientIdentity, TrackListing};

const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";

const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Queries the private player endpoint directly, posing as a first-party client
pub struct InnertubeSource {
    client: Client,
    endpoint: String,
}

impl InnertubeSource {
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(client, PLAYER_ENDPOINT)
    }

    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Request body identifying the simulated client
    fn request_body(video_id: &VideoId, identity: ClientIdentity) -> serde_json::Value {
        let client = match identity {
            ClientIdentity::Android => json!({
                "clientName": "ANDROID",
                "clientVersion": "20.10.38",
                "androidSdkVersion": 30,
                "hl": "en",
                "gl": "US",
            }),
            ClientIdentity::Default | ClientIdentity::Web => json!({
                "clientName": "WEB",
                "clientVersion": "2.20250626.01.00",
                "hl": "en",
                "gl": "US",
            }),
        };

        json!({
            "context": { "client": client },
            "videoId": video_id.as_str(),
        })
    }
}

#[async_trait]
impl CaptionSource for InnertubeSource {
    async fn list_tracks(
        &self,
        video_id: &VideoId,
        attempt: &AttemptConfig,
    ) -> Result<TrackListing, SourceError> {
        tracing::debug!("Querying player endpoint for {}", video_id);
        let body = Self::request_body(video_id, attempt.client);

        let response = send_with_retries(attempt, "player endpoint", || {
            self.client
                .post(&self.endpoint)
                .query(&[("prettyPrint", "false")])
                .header(USER_AGENT, attempt.client.user_agent())
                .json(&body)
        })
        .await?;

        let json = read_body(response, MAX_RESPONSE_BYTES).await?;
        player::parse_player_response(&json)
    }

    async fn fetch_payload(
        &self,
        track: &CaptionTrack,
        attempt: &AttemptConfig,
    ) -> Result<String, SourceError> {
        fetch_caption_payload(&self.client, track, attempt).await
    }
}
