use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

use super::{fetch_caption_payload, CaptionSource, SourceError, VideoId};
use crate::captions::{
    AttemptConfig, CaptionFormat, CaptionTrack, ClientIdentity, TrackKind, TrackListing,
};

/// Subset of `yt-dlp --dump-json` output that describes captions
#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    subtitles: BTreeMap<String, Vec<SubtitleEntry>>,
    #[serde(default)]
    automatic_captions: BTreeMap<String, Vec<SubtitleEntry>>,
}

#[derive(Debug, Deserialize)]
struct SubtitleEntry {
    ext: String,
    url: Option<String>,
}

/// Caption track metadata via yt-dlp
pub struct YtDlpSource {
    yt_dlp_path: String,
    client: Client,
}

impl YtDlpSource {
    pub fn new(yt_dlp_path: impl Into<String>, client: Client) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            client,
        }
    }

    /// Arguments for a metadata-only run under one attempt configuration
    fn metadata_args(video_id: &VideoId, attempt: &AttemptConfig) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--dump-json".into(),
            "--skip-download".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--socket-timeout".into(),
            attempt.timeout.as_secs().max(1).to_string(),
            "--retries".into(),
            attempt.retries.to_string(),
        ];

        match attempt.client {
            ClientIdentity::Default => {}
            ClientIdentity::Web => {
                args.push("--user-agent".into());
                args.push(attempt.client.user_agent().into());
                args.push("--extractor-args".into());
                args.push("youtube:player_client=web".into());
            }
            ClientIdentity::Android => {
                args.push("--extractor-args".into());
                args.push("youtube:player_client=android".into());
            }
        }

        args.push(video_id.watch_url());
        args
    }

    /// Parse the JSON document yt-dlp prints for a video
    fn parse_video_info(json: &str) -> Result<TrackListing, SourceError> {
        let info: VideoInfo = serde_json::from_str(json)
            .map_err(|e| SourceError::Malformed(format!("yt-dlp metadata: {}", e)))?;

        let mut tracks = Vec::new();
        for (kind, by_language) in [
            (TrackKind::Automatic, info.automatic_captions),
            (TrackKind::Manual, info.subtitles),
        ] {
            for (language, entries) in by_language {
                // Chat replays are listed next to real subtitles
                if language == "live_chat" {
                    continue;
                }
                for entry in entries {
                    let Some(url) = entry.url else { continue };
                    tracks.push(CaptionTrack {
                        language: language.clone(),
                        format: CaptionFormat::from_extension(&entry.ext),
                        url,
                        kind,
                    });
                }
            }
        }

        Ok(TrackListing::new(tracks))
    }
}

/// Classify yt-dlp's error output
pub fn classify_error(stderr: &str) -> SourceError {
    let lower = stderr.to_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();

    // Rate limiting is reported as "Video unavailable" with a retry hint
    if lower.contains("content isn't available, try again later")
        || lower.contains("content is not available, try again later")
    {
        SourceError::Blocked(message)
    } else if lower.contains("confirm your age") || lower.contains("age-restricted") || lower.contains("age restricted") {
        SourceError::AgeRestricted(message)
    } else if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("private video")
        || lower.contains("no longer available")
        || lower.contains("account associated with this video has been terminated")
    {
        SourceError::VideoUnavailable(message)
    } else if lower.contains("not a bot") || lower.contains("http error 429") {
        SourceError::Blocked(message)
    } else {
        SourceError::Transport(format!("yt-dlp failed: {}", message))
    }
}

#[async_trait]
impl CaptionSource for YtDlpSource {
    async fn list_tracks(
        &self,
        video_id: &VideoId,
        attempt: &AttemptConfig,
    ) -> Result<TrackListing, SourceError> {
        tracing::debug!("Extracting caption metadata for {} with yt-dlp", video_id);

        let run = Command::new(&self.yt_dlp_path)
            .args(Self::metadata_args(video_id, attempt))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(attempt.total_budget(), run)
            .await
            .map_err(|_| {
                SourceError::Transport(format!(
                    "yt-dlp timed out after {}s",
                    attempt.total_budget().as_secs()
                ))
            })?
            .map_err(|e| SourceError::Transport(format!("could not run {}: {}", self.yt_dlp_path, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(classify_error(&error));
        }

        let json = String::from_utf8(output.stdout)
            .map_err(|e| SourceError::Malformed(format!("yt-dlp output is not UTF-8: {}", e)))?;

        Self::parse_video_info(&json)
    }

    async fn fetch_payload(
        &self,
        track: &CaptionTrack,
        attempt: &AttemptConfig,
    ) -> Result<String, SourceError> {
        fetch_caption_payload(&self.client, track, attempt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_video_info() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "subtitles": {
                "ja": [{"ext": "vtt", "url": "https://example.test/ja.vtt"}],
                "live_chat": [{"ext": "json", "url": "https://example.test/chat"}]
            },
            "automatic_captions": {
                "en": [
                    {"ext": "json3", "url": "https://example.test/en.json3"},
                    {"ext": "srv1", "url": "https://example.test/en.srv1"},
                    {"ext": "vtt"}
                ]
            }
        }"#;

        let listing = YtDlpSource::parse_video_info(json).unwrap();
        assert_eq!(listing.tracks.len(), 3);
        assert_eq!(listing.observed_languages(), vec!["en", "ja"]);

        let first = &listing.tracks[0];
        assert_eq!(first.kind, TrackKind::Automatic);
        assert_eq!(first.format, CaptionFormat::Json3);

        let manual = listing.tracks.iter().find(|t| t.kind == TrackKind::Manual).unwrap();
        assert_eq!(manual.language, "ja");
        assert_eq!(manual.format, CaptionFormat::Vtt);
    }

    #[test]
    fn test_parse_video_without_captions() {
        let listing = YtDlpSource::parse_video_info(r#"{"id": "x"}"#).unwrap();
        assert!(listing.is_empty());
    }

    #[test]
    fn test_metadata_args() {
        let video = VideoId::from_id("dQw4w9WgXcQ").unwrap();
        let attempt = AttemptConfig::new("yt-dlp/test")
            .timeout(Duration::from_secs(20))
            .retries(2)
            .client(ClientIdentity::Android);

        let args = YtDlpSource::metadata_args(&video, &attempt);
        assert!(args.contains(&"--skip-download".to_string()));
        assert!(args.windows(2).any(|w| w == ["--socket-timeout", "20"]));
        assert!(args.windows(2).any(|w| w == ["--retries", "2"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--extractor-args", "youtube:player_client=android"]));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: Video unavailable. This video has been removed"),
            SourceError::VideoUnavailable(_)
        ));
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: Sign in to confirm your age."),
            SourceError::AgeRestricted(_)
        ));
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: Sign in to confirm you're not a bot"),
            SourceError::Blocked(_)
        ));
        assert!(matches!(
            classify_error(
                "ERROR: [youtube] abc: Video unavailable. This content isn't available, try again later."
            ),
            SourceError::Blocked(_)
        ));
        assert!(!classify_error(
            "ERROR: [youtube] abc: Video unavailable. This content isn't available, try again later."
        )
        .into_failure()
        .is_fatal());
        assert!(matches!(
            classify_error("ERROR: Unable to download webpage: timed out"),
            SourceError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_soft_failure() {
        let source = YtDlpSource::new("/nonexistent/yt-dlp-binary", Client::new());
        let video = VideoId::from_id("dQw4w9WgXcQ").unwrap();
        let attempt = AttemptConfig::new("yt-dlp/test").timeout(Duration::from_secs(5));

        let err = source.list_tracks(&video, &attempt).await.unwrap_err();
        assert!(!err.into_failure().is_fatal());
    }
}
