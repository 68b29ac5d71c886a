use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Length of every YouTube video identifier
pub const VIDEO_ID_LEN: usize = 11;

/// URL shapes tried in order; the first match wins.
const URL_SHAPES: &[&str] = &[
    // Canonical watch URL query parameter
    r"[?&]v=([A-Za-z0-9_-]{11})",
    // Short link
    r"youtu\.be/([A-Za-z0-9_-]{11})",
    // Embedded player
    r"/embed/([A-Za-z0-9_-]{11})",
    // Shorts
    r"/shorts/([A-Za-z0-9_-]{11})",
    // Live streams and the legacy player path
    r"/live/([A-Za-z0-9_-]{11})",
    r"youtube\.com/v/([A-Za-z0-9_-]{11})",
];

fn url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        URL_SHAPES
            .iter()
            .filter_map(|shape| Regex::new(shape).ok())
            .collect()
    })
}

/// A syntactically valid YouTube video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoId(String);

impl VideoId {
    /// Parse a URL (or a bare identifier) into a video id
    pub fn parse(input: &str) -> Option<Self> {
        let id = extract_video_id(input);
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Accept only a bare 11-character identifier
    pub fn from_id(id: &str) -> Option<Self> {
        is_valid_id(id).then(|| Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch page URL for this video
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the 11-character video id from a YouTube URL.
///
/// Returns an empty string when no known URL shape matches. A bare identifier
/// is accepted as a last resort. No existence check is made.
pub fn extract_video_id(input: &str) -> String {
    let input = input.trim();

    for pattern in url_patterns() {
        if let Some(id) = pattern.captures(input).and_then(|caps| caps.get(1)) {
            return id.as_str().to_string();
        }
    }

    if is_valid_id(input) {
        return input.to_string();
    }

    String::new()
}

fn is_valid_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
