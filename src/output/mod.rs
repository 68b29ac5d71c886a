use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::SessionReport;

pub mod formatters;

pub use formatters::*;

fn render(report: &SessionReport, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format_as_text(report),
        OutputFormat::Json => format_as_json(report)?,
        OutputFormat::Markdown => format_as_markdown(report),
    })
}

/// Save a session report to file
pub async fn save_to_file(report: &SessionReport, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(report, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Print a session report to console
pub fn print_to_console(report: &SessionReport, format: &OutputFormat) -> Result<()> {
    let content = render(report, format)?;
    println!("{}", content);
    Ok(())
}
