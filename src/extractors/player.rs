//! Player response parsing shared by the watch-page and player-endpoint sources.

use serde::Deserialize;
use url::Url;

use super::SourceError;
use crate::captions::{CaptionFormat, CaptionTrack, TrackKind, TrackListing};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrack {
    base_url: String,
    language_code: String,
    kind: Option<String>,
}

/// Turn a player response into a track listing.
///
/// Each upstream track is offered in every timedtext format, since the
/// format is chosen by a query parameter on the same base URL.
pub fn parse_player_response(json: &str) -> Result<TrackListing, SourceError> {
    let response: PlayerResponse = serde_json::from_str(json)
        .map_err(|e| SourceError::Malformed(format!("player response: {}", e)))?;

    if let Some(status) = &response.playability_status {
        check_playability(status)?;
    }

    let Some(renderer) = response
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
    else {
        return Err(SourceError::CaptionsDisabled);
    };

    let tracks = renderer
        .caption_tracks
        .into_iter()
        .flat_map(|raw| {
            let kind = if raw.kind.as_deref() == Some("asr") {
                TrackKind::Automatic
            } else {
                TrackKind::Manual
            };
            CaptionFormat::timedtext_formats()
                .into_iter()
                .map(move |format| CaptionTrack {
                    language: raw.language_code.clone(),
                    url: with_format(&raw.base_url, &format),
                    format,
                    kind,
                })
        })
        .collect();

    Ok(TrackListing::new(tracks))
}

fn check_playability(status: &PlayabilityStatus) -> Result<(), SourceError> {
    let reason = status.reason.clone().unwrap_or_else(|| status.status.clone());
    let mentions_age = is_age_gate(&reason);

    match status.status.as_str() {
        "OK" => Ok(()),
        "ERROR" => Err(SourceError::VideoUnavailable(reason)),
        "AGE_CHECK_REQUIRED" | "AGE_VERIFICATION_REQUIRED" => Err(SourceError::AgeRestricted(reason)),
        "LOGIN_REQUIRED" | "UNPLAYABLE" if mentions_age => Err(SourceError::AgeRestricted(reason)),
        "LOGIN_REQUIRED" if reason.to_lowercase().contains("private") => {
            Err(SourceError::VideoUnavailable(reason))
        }
        _ => Err(SourceError::Blocked(reason)),
    }
}

fn is_age_gate(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    ["confirm your age", "age-restricted", "age restricted", "inappropriate for some users"]
        .iter()
        .any(|marker| reason.contains(marker))
}

const YOUTUBE_ORIGIN: &str = "https://www.youtube.com";

/// Replace (or add) the `fmt` parameter of a timedtext URL.
///
/// Relative URLs are resolved against the YouTube origin.
pub fn with_format(base_url: &str, format: &CaptionFormat) -> String {
    let parsed = Url::parse(base_url).or_else(|_| Url::parse(YOUTUBE_ORIGIN)?.join(base_url));
    match parsed {
        Ok(mut url) => {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != "fmt")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("fmt", format.as_str());
            url.to_string()
        }
        Err(_) => {
            let separator = if base_url.contains('?') { '&' } else { '?' };
            format!("{}{}fmt={}", base_url, separator, format.as_str())
        }
    }
}
