use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{
    decoders, AttemptError, CaptionFormat, CaptionTrack, FailureReason, RetrievalStrategy,
    TrackKind, TrackListing, Transcript,
};
use crate::extractors::{CaptionSource, VideoId};

/// Desktop browser identity used for plain page requests
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Order in which track kinds are considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackPreference {
    /// Machine-generated captions first, then manual ones
    #[default]
    AutomaticFirst,
    /// Manually authored captions first, then machine-generated ones
    ManualFirst,
}

impl TrackPreference {
    pub fn kind_order(&self) -> [TrackKind; 2] {
        match self {
            TrackPreference::AutomaticFirst => [TrackKind::Automatic, TrackKind::Manual],
            TrackPreference::ManualFirst => [TrackKind::Manual, TrackKind::Automatic],
        }
    }
}

/// Client the upstream service is told it is talking to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientIdentity {
    /// Let the source use its own default
    #[default]
    Default,
    Web,
    Android,
}

impl ClientIdentity {
    pub fn user_agent(&self) -> &'static str {
        match self {
            ClientIdentity::Default | ClientIdentity::Web => DESKTOP_USER_AGENT,
            ClientIdentity::Android => {
                "com.google.android.youtube/20.10.38 (Linux; U; Android 11) gzip"
            }
        }
    }
}

/// Configuration of one pass over an upstream source
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptConfig {
    pub name: String,

    /// Timeout for each individual network request or subprocess run
    pub timeout: Duration,

    /// Extra tries after a transport failure
    pub retries: u32,

    pub client: ClientIdentity,

    /// Accepted language codes, most preferred first
    pub languages: Vec<String>,

    /// Accepted wire formats, most preferred first
    pub formats: Vec<CaptionFormat>,

    pub preference: TrackPreference,
}

impl AttemptConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_secs(30),
            retries: 0,
            client: ClientIdentity::Default,
            languages: vec!["en".to_string()],
            formats: vec![CaptionFormat::Json3],
            preference: TrackPreference::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn client(mut self, client: ClientIdentity) -> Self {
        self.client = client;
        self
    }

    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn formats(mut self, formats: Vec<CaptionFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn preference(mut self, preference: TrackPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Upper bound on wall time for a whole attempt including retries
    pub fn total_budget(&self) -> Duration {
        self.timeout * (self.retries + 1)
    }
}

/// Pick the track to fetch: kind order, then language order, then format order.
pub fn select_track<'a>(listing: &'a TrackListing, config: &AttemptConfig) -> Option<&'a CaptionTrack> {
    for kind in config.preference.kind_order() {
        for language in &config.languages {
            for format in &config.formats {
                let found = listing.tracks.iter().find(|track| {
                    track.kind == kind
                        && track.language.eq_ignore_ascii_case(language)
                        && &track.format == format
                });
                if found.is_some() {
                    return found;
                }
            }
        }
    }
    None
}

/// Generic strategy: list tracks from a source, pick one, fetch and decode it
pub struct TrackListingAttempt {
    source: Arc<dyn CaptionSource>,
    config: AttemptConfig,
}

impl TrackListingAttempt {
    pub fn new(source: Arc<dyn CaptionSource>, config: AttemptConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }
}

#[async_trait]
impl RetrievalStrategy for TrackListingAttempt {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn attempt(&self, video_id: &VideoId) -> Result<Transcript, AttemptError> {
        let listing = self
            .source
            .list_tracks(video_id, &self.config)
            .await
            .map_err(|e| AttemptError::new(e.into_failure()))?;

        if listing.is_empty() {
            return Err(FailureReason::NoCaptions.into());
        }

        let observed = listing.observed_languages();
        tracing::debug!(
            "'{}' found {} tracks in languages: {}",
            self.config.name,
            listing.tracks.len(),
            observed.join(", ")
        );

        let Some(track) = select_track(&listing, &self.config) else {
            return Err(AttemptError::with_observed(
                FailureReason::NoSupportedTrack {
                    observed: observed.clone(),
                },
                observed,
            ));
        };

        tracing::debug!(
            "'{}' selected {} track {} ({})",
            self.config.name,
            track.kind.as_str(),
            track.language,
            track.format
        );

        let payload = self
            .source
            .fetch_payload(track, &self.config)
            .await
            .map_err(|e| AttemptError::with_observed(e.into_failure(), observed.clone()))?;

        let text = decoders::decode(&track.format, &payload).map_err(|e| {
            AttemptError::with_observed(FailureReason::Decode(e.to_string()), observed.clone())
        })?;

        if text.is_empty() {
            return Err(AttemptError::with_observed(
                FailureReason::Decode(format!("{} payload contained no text", track.format)),
                observed,
            ));
        }

        Ok(Transcript {
            text,
            language: track.language.clone(),
            kind: track.kind,
            format: track.format.clone(),
            strategy: self.config.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MockCaptionSource, SourceError};

    fn track(language: &str, format: CaptionFormat, kind: TrackKind) -> CaptionTrack {
        CaptionTrack {
            language: language.to_string(),
            url: format!("https://captions.test/{}/{}/{}", kind.as_str(), language, format),
            format,
            kind,
        }
    }

    fn full_config() -> AttemptConfig {
        AttemptConfig::new("test/full")
            .languages(["en", "en-US", "en-GB", "ja", "es"])
            .formats(vec![CaptionFormat::Json3, CaptionFormat::Vtt, CaptionFormat::Ttml])
            .retries(2)
    }

    fn video() -> VideoId {
        VideoId::from_id("dQw4w9WgXcQ").unwrap()
    }

    #[test]
    fn test_selection_prefers_automatic_then_language_then_format() {
        let listing = TrackListing::new(vec![
            track("en", CaptionFormat::Vtt, TrackKind::Manual),
            track("ja", CaptionFormat::Json3, TrackKind::Automatic),
            track("en", CaptionFormat::Vtt, TrackKind::Automatic),
            track("en", CaptionFormat::Json3, TrackKind::Automatic),
        ]);

        let selected = select_track(&listing, &full_config()).unwrap();
        assert_eq!(selected.kind, TrackKind::Automatic);
        assert_eq!(selected.language, "en");
        assert_eq!(selected.format, CaptionFormat::Json3);
    }

    #[test]
    fn test_selection_manual_first_preference() {
        let listing = TrackListing::new(vec![
            track("en", CaptionFormat::Json3, TrackKind::Automatic),
            track("en", CaptionFormat::Vtt, TrackKind::Manual),
        ]);
        let config = full_config().preference(TrackPreference::ManualFirst);

        let selected = select_track(&listing, &config).unwrap();
        assert_eq!(selected.kind, TrackKind::Manual);
        assert_eq!(selected.format, CaptionFormat::Vtt);
    }

    #[test]
    fn test_selection_rejects_unlisted_languages_and_formats() {
        let listing = TrackListing::new(vec![
            track("ko", CaptionFormat::Json3, TrackKind::Manual),
            track("en", CaptionFormat::Srv1, TrackKind::Automatic),
        ]);
        assert!(select_track(&listing, &full_config()).is_none());
    }

    #[tokio::test]
    async fn test_automatic_english_json3_on_first_attempt() {
        let mut source = MockCaptionSource::new();
        source.expect_list_tracks().times(1).returning(|_, _| {
            Ok(TrackListing::new(vec![track("en", CaptionFormat::Json3, TrackKind::Automatic)]))
        });
        source
            .expect_fetch_payload()
            .times(1)
            .withf(|t, _| t.language == "en" && t.format == CaptionFormat::Json3)
            .returning(|_, _| {
                Ok(r#"{"events":[{"segs":[{"utf8":"Hello"}]},{"segs":[{"utf8":"world"}]}]}"#.to_string())
            });

        let attempt = TrackListingAttempt::new(Arc::new(source), full_config());
        let transcript = attempt.attempt(&video()).await.unwrap();

        assert_eq!(transcript.text, "Hello world");
        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.kind, TrackKind::Automatic);
        assert_eq!(transcript.strategy, "test/full");
    }

    #[tokio::test]
    async fn test_manual_non_english_falls_back_to_secondary_language() {
        let mut source = MockCaptionSource::new();
        source.expect_list_tracks().returning(|_, _| {
            Ok(TrackListing::new(vec![
                track("ko", CaptionFormat::Vtt, TrackKind::Manual),
                track("ja", CaptionFormat::Vtt, TrackKind::Manual),
            ]))
        });
        source
            .expect_fetch_payload()
            .withf(|t, _| t.language == "ja")
            .returning(|_, _| {
                Ok("WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nこんにちは\n\n00:00:01.000 --> 00:00:02.000\n世界\n".to_string())
            });

        let attempt = TrackListingAttempt::new(Arc::new(source), full_config());
        let transcript = attempt.attempt(&video()).await.unwrap();

        assert_eq!(transcript.language, "ja");
        assert_eq!(transcript.kind, TrackKind::Manual);
        assert_eq!(transcript.text, "こんにちは 世界");
    }

    #[tokio::test]
    async fn test_unavailable_video_is_fatal() {
        let mut source = MockCaptionSource::new();
        source
            .expect_list_tracks()
            .returning(|_, _| Err(SourceError::VideoUnavailable("This video has been removed".into())));
        source.expect_fetch_payload().never();

        let attempt = TrackListingAttempt::new(Arc::new(source), full_config());
        let err = attempt.attempt(&video()).await.unwrap_err();

        assert!(err.reason.is_fatal());
        assert!(matches!(err.reason, FailureReason::VideoUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_listing_is_no_captions() {
        let mut source = MockCaptionSource::new();
        source
            .expect_list_tracks()
            .returning(|_, _| Ok(TrackListing::default()));

        let attempt = TrackListingAttempt::new(Arc::new(source), full_config());
        let err = attempt.attempt(&video()).await.unwrap_err();
        assert_eq!(err.reason, FailureReason::NoCaptions);
    }

    #[tokio::test]
    async fn test_payload_failure_keeps_observed_languages() {
        let mut source = MockCaptionSource::new();
        source.expect_list_tracks().returning(|_, _| {
            Ok(TrackListing::new(vec![track("en", CaptionFormat::Json3, TrackKind::Automatic)]))
        });
        source
            .expect_fetch_payload()
            .times(1)
            .returning(|_, _| Err(SourceError::Transport("connection reset".into())));

        let attempt = TrackListingAttempt::new(Arc::new(source), full_config());
        let err = attempt.attempt(&video()).await.unwrap_err();

        assert!(matches!(err.reason, FailureReason::Transport(_)));
        assert_eq!(err.observed, vec!["en".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_payload_does_not_try_another_track() {
        let mut source = MockCaptionSource::new();
        source.expect_list_tracks().times(1).returning(|_, _| {
            Ok(TrackListing::new(vec![
                track("en", CaptionFormat::Json3, TrackKind::Automatic),
                track("en", CaptionFormat::Vtt, TrackKind::Automatic),
            ]))
        });
        source
            .expect_fetch_payload()
            .times(1)
            .withf(|t, _| t.format == CaptionFormat::Json3)
            .returning(|_, _| Err(SourceError::Transport("connection reset".into())));

        let attempt = TrackListingAttempt::new(Arc::new(source), full_config());
        let err = attempt.attempt(&video()).await.unwrap_err();

        assert!(matches!(err.reason, FailureReason::Transport(_)));
        assert!(!err.reason.is_fatal());
    }

    #[tokio::test]
    async fn test_unavailable_stops_fetcher_before_later_sources() {
        use crate::captions::CaptionFetcher;

        let mut first = MockCaptionSource::new();
        first
            .expect_list_tracks()
            .times(1)
            .returning(|_, _| Err(SourceError::VideoUnavailable("Video unavailable".into())));

        let mut second = MockCaptionSource::new();
        second.expect_list_tracks().never();
        second.expect_fetch_payload().never();

        let fetcher = CaptionFetcher::new(vec![
            Box::new(TrackListingAttempt::new(Arc::new(first), full_config())),
            Box::new(TrackListingAttempt::new(Arc::new(second), full_config())),
        ]);

        let err = fetcher.fetch(&video()).await.unwrap_err();
        assert!(matches!(err, FailureReason::VideoUnavailable(_)));
    }

    #[tokio::test]
    async fn test_decode_failure_advances() {
        let mut source = MockCaptionSource::new();
        source.expect_list_tracks().returning(|_, _| {
            Ok(TrackListing::new(vec![track("en", CaptionFormat::Json3, TrackKind::Automatic)]))
        });
        source
            .expect_fetch_payload()
            .returning(|_, _| Ok("<html>not json</html>".to_string()));

        let attempt = TrackListingAttempt::new(Arc::new(source), full_config());
        let err = attempt.attempt(&video()).await.unwrap_err();
        assert!(matches!(err.reason, FailureReason::Decode(_)));
        assert!(!err.reason.is_fatal());
    }
}
