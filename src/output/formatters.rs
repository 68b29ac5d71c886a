use anyhow::Result;

use crate::pipeline::SessionReport;

const ENGLISH_HEADING: &str = "English Transcript";
const JAPANESE_HEADING: &str = "Japanese Translation";
const SCRIPT_HEADING: &str = "Shorts Script";

/// Sections present in the report, in display order
fn sections(report: &SessionReport) -> Vec<(&'static str, &str)> {
    let mut sections = vec![(ENGLISH_HEADING, report.transcript.as_str())];
    if let Some(translation) = &report.translation {
        sections.push((JAPANESE_HEADING, translation.as_str()));
    }
    if let Some(script) = &report.script {
        sections.push((SCRIPT_HEADING, script.as_str()));
    }
    sections
}

/// Plain text with one underlined heading per section
pub fn format_as_text(report: &SessionReport) -> String {
    let mut out = String::new();

    if let Some(url) = &report.video_url {
        out.push_str(&format!("Video: {}\n", url));
        if let (Some(language), Some(strategy)) = (&report.language, &report.strategy) {
            out.push_str(&format!("Captions: {} via {}\n", language, strategy));
        }
        out.push('\n');
    }

    let rendered: Vec<String> = sections(report)
        .into_iter()
        .map(|(heading, body)| format!("{}\n{}\n{}", heading, "=".repeat(heading.len()), body.trim()))
        .collect();
    out.push_str(&rendered.join("\n\n"));
    out
}

pub fn format_as_json(report: &SessionReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn format_as_markdown(report: &SessionReport) -> String {
    let mut out = String::new();

    match &report.video_id {
        Some(id) => out.push_str(&format!("# Script notes for {}\n\n", id)),
        None => out.push_str("# Script notes\n\n"),
    }

    if let Some(url) = &report.video_url {
        out.push_str(&format!("- Video: <{}>\n", url));
    }
    if let Some(language) = &report.language {
        out.push_str(&format!("- Caption language: `{}`\n", language));
    }
    out.push_str(&format!(
        "- Generated: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for (heading, body) in sections(report) {
        out.push_str(&format!("\n## {}\n\n{}\n", heading, body.trim()));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn report() -> SessionReport {
        SessionReport {
            video_id: Some("dQw4w9WgXcQ".to_string()),
            video_url: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()),
            transcript: "Hello world".to_string(),
            language: Some("en".to_string()),
            strategy: Some("watch-page".to_string()),
            translation: Some("こんにちは世界".to_string()),
            script: None,
            generated_at: Utc.with_ymd_and_hms(2025, 7, 15, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_text_sections_in_order() {
        let text = format_as_text(&report());
        let english = text.find(ENGLISH_HEADING).unwrap();
        let japanese = text.find(JAPANESE_HEADING).unwrap();
        assert!(english < japanese);
        assert!(!text.contains(SCRIPT_HEADING));
        assert!(text.contains("Captions: en via watch-page"));
    }

    #[test]
    fn test_markdown() {
        let md = format_as_markdown(&report());
        assert!(md.starts_with("# Script notes for dQw4w9WgXcQ"));
        assert!(md.contains("## Japanese Translation\n\nこんにちは世界"));
        assert!(md.contains("2025-07-15 09:30:00 UTC"));
    }

    #[test]
    fn test_json_omits_nothing() {
        let json = format_as_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["transcript"], "Hello world");
        assert!(value["script"].is_null());
    }
}
