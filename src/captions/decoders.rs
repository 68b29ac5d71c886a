//! Caption payload decoders.
//!
//! Every decoder turns a wire payload into flat text: timing and structure are
//! discarded and the remaining fragments are joined with single spaces.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::OnceLock;

use super::CaptionFormat;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("invalid timed-JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a payload according to the format the track declared
pub fn decode(format: &CaptionFormat, payload: &str) -> Result<String, DecodeError> {
    match format {
        CaptionFormat::Json3 => decode_json3(payload),
        CaptionFormat::Vtt => Ok(decode_vtt(payload)),
        CaptionFormat::Ttml => Ok(decode_ttml(payload)),
        _ => Ok(decode_generic(payload)),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Json3Document {
    Bare(Vec<Json3Event>),
    Wrapped {
        #[serde(default)]
        events: Vec<Json3Event>,
    },
}

#[derive(Deserialize)]
struct Json3Event {
    #[serde(default)]
    segs: Option<Vec<Json3Segment>>,
    #[serde(default, alias = "utf8")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Json3Segment {
    #[serde(default, alias = "text")]
    utf8: Option<String>,
}

impl Json3Event {
    fn into_text(self) -> Option<String> {
        match self.segs {
            Some(segs) if !segs.is_empty() => {
                Some(segs.into_iter().filter_map(|s| s.utf8).collect::<String>())
            }
            _ => self.text,
        }
    }
}

/// Timed-JSON (`json3`): segment text concatenated per event
pub fn decode_json3(payload: &str) -> Result<String, DecodeError> {
    let document: Json3Document = serde_json::from_str(payload)?;
    let events = match document {
        Json3Document::Bare(events) => events,
        Json3Document::Wrapped { events } => events,
    };

    let fragments = events
        .into_iter()
        .filter_map(Json3Event::into_text)
        .map(|text| collapse_whitespace(&text));

    Ok(join_fragments(fragments))
}

/// Line-based caption text (WebVTT).
///
/// The payload is read as blank-line separated blocks. The header block and
/// `NOTE`/`STYLE`/`REGION` blocks are skipped whole; marker words are only
/// recognised on the first line of a block, so cue text is never mistaken
/// for one.
pub fn decode_vtt(payload: &str) -> String {
    let mut fragments: Vec<String> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut first_block = true;

    let lines = payload.lines().map(str::trim).chain(std::iter::once(""));
    for line in lines {
        if !line.is_empty() {
            block.push(line);
            continue;
        }
        if block.is_empty() {
            continue;
        }

        let is_header = first_block && block[0].trim_start_matches('\u{feff}').starts_with("WEBVTT");
        first_block = false;
        if !is_header && !is_vtt_marker_block(block[0]) {
            push_cue_text(&block, &mut fragments);
        }
        block.clear();
    }

    fragments.join(" ")
}

fn is_vtt_marker_block(first_line: &str) -> bool {
    ["NOTE", "STYLE", "REGION"].iter().any(|marker| {
        first_line
            .strip_prefix(marker)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
    })
}

fn push_cue_text(block: &[&str], fragments: &mut Vec<String>) {
    for (index, line) in block.iter().enumerate() {
        if line.contains("-->") {
            continue;
        }
        // Cue identifier
        if block.get(index + 1).is_some_and(|next| next.contains("-->")) {
            continue;
        }

        let text = collapse_whitespace(&unescape(&strip_tags(line, "")));
        if text.is_empty() {
            continue;
        }
        // Rolling auto-captions repeat the previous line
        if fragments.last() == Some(&text) {
            continue;
        }
        fragments.push(text);
    }
}

/// Markup-tree captions (TTML). Falls back to regex extraction on parse errors.
pub fn decode_ttml(payload: &str) -> String {
    match xml_text_nodes(payload) {
        Ok(fragments) => join_fragments(fragments.into_iter()),
        Err(e) => {
            tracing::debug!("TTML parse failed ({}), extracting text between tags", e);
            let fragments = inter_tag_text()
                .captures_iter(payload)
                .filter_map(|caps| caps.get(1))
                .map(|m| collapse_whitespace(&unescape(m.as_str())));
            join_fragments(fragments)
        }
    }
}

fn xml_text_nodes(payload: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut fragments = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Text(e) => fragments.push(collapse_whitespace(&e.unescape()?)),
            Event::CData(e) => {
                fragments.push(collapse_whitespace(&String::from_utf8_lossy(e.as_ref())))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(fragments)
}

/// Anything else: strip markup, drop numeric counters and timing lines
pub fn decode_generic(payload: &str) -> String {
    let fragments = payload
        .lines()
        .map(|line| collapse_whitespace(&unescape(&strip_tags(line, " "))))
        .filter(|line| !line.is_empty())
        .filter(|line| !line.chars().all(|c| c.is_ascii_digit()))
        .filter(|line| !line.contains("-->"));

    join_fragments(fragments)
}

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

fn inter_tag_text() -> &'static Regex {
    static INTER_TAG: OnceLock<Regex> = OnceLock::new();
    INTER_TAG.get_or_init(|| Regex::new(r">([^<]+)<").expect("inter-tag pattern is valid"))
}

fn strip_tags<'a>(line: &'a str, replacement: &str) -> Cow<'a, str> {
    tag_pattern().replace_all(line, replacement)
}

fn unescape(text: &str) -> String {
    match quick_xml::escape::unescape(text) {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => text.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_fragments(fragments: impl Iterator<Item = String>) -> String {
    fragments
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
