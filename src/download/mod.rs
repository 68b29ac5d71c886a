//! Clip and audio downloads through yt-dlp.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use uuid::Uuid;

pub mod time;

pub use time::{normalize_time, TimeError};

use crate::config::DownloadConfig;
use crate::utils::sanitize_filename;

/// Template handed to `--print` once the file is in place
const DISPLAY_NAME_TEMPLATE: &str =
    "after_move:%(title)s [%(resolution)s %(fps)sfps %(vcodec)s] [%(id)s]";

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("could not run yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("yt-dlp failed: {0}")]
    Failed(String),

    #[error("download timed out after {0}s")]
    TimedOut(u64),

    #[error("yt-dlp reported success but produced no file at {0}")]
    MissingOutput(PathBuf),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMode {
    #[default]
    Video,
    Audio,
}

impl DownloadMode {
    /// Container the output is forced into
    pub fn extension(&self) -> &'static str {
        match self {
            DownloadMode::Video => "mp4",
            DownloadMode::Audio => "mp3",
        }
    }
}

/// One download, optionally limited to a time range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub mode: DownloadMode,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            start: None,
            end: None,
            mode: DownloadMode::Video,
        }
    }

    pub fn range(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn mode(mut self, mode: DownloadMode) -> Self {
        self.mode = mode;
        self
    }

    /// The `*START-END` section, if any boundary is set.
    ///
    /// A missing start means the beginning and a missing end means the end
    /// of the media.
    pub fn section(&self) -> Result<Option<String>, TimeError> {
        let start = self.start.as_deref().map(normalize_time).transpose()?;
        let end = self.end.as_deref().map(normalize_time).transpose()?;

        Ok(match (start, end) {
            (None, None) => None,
            (start, end) => Some(format!(
                "*{}-{}",
                start.unwrap_or_else(|| "0".to_string()),
                end.unwrap_or_else(|| "inf".to_string())
            )),
        })
    }
}

/// A finished download held in memory
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub url: String,
    pub display_name: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl DownloadedMedia {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Runs yt-dlp for media downloads
pub struct Downloader {
    settings: DownloadConfig,
}

impl Downloader {
    pub fn from_config(settings: &DownloadConfig) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Full yt-dlp argument list for one request writing to `output`
    pub fn build_args(&self, request: &DownloadRequest, output: &std::path::Path) -> Result<Vec<String>, DownloadError> {
        let mut args: Vec<String> = vec!["--no-playlist".into(), "--no-warnings".into()];

        match request.mode {
            DownloadMode::Video => {
                args.push("--format".into());
                args.push(self.settings.video_format.clone());
                args.push("--merge-output-format".into());
                args.push(request.mode.extension().into());
            }
            DownloadMode::Audio => {
                args.push("--format".into());
                args.push(self.settings.audio_format.clone());
                args.push("--extract-audio".into());
                args.push("--audio-format".into());
                args.push(request.mode.extension().into());
            }
        }

        if let Some(section) = request.section()? {
            args.push("--download-sections".into());
            args.push(section);
            args.push("--force-keyframes-at-cuts".into());
        }

        args.extend([
            "--socket-timeout".into(),
            self.settings.socket_timeout_secs.to_string(),
            "--retries".into(),
            self.settings.retries.to_string(),
            "--output".into(),
            output.to_string_lossy().into_owned(),
            "--print".into(),
            DISPLAY_NAME_TEMPLATE.into(),
            request.url.clone(),
        ]);

        Ok(args)
    }

    /// Download one request into memory.
    ///
    /// The working directory is removed when this returns, whatever the
    /// outcome.
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadedMedia, DownloadError> {
        let workdir = TempDir::new()?;
        let extension = request.mode.extension();
        let output = workdir
            .path()
            .join(format!("{}.{}", Uuid::new_v4(), extension));
        let args = self.build_args(request, &output)?;

        tracing::info!("Downloading {}", request.url);
        tracing::debug!("yt-dlp arguments: {:?}", args);

        let run = Command::new(&self.settings.yt_dlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(Duration::from_secs(self.settings.timeout_secs), run)
            .await
            .map_err(|_| DownloadError::TimedOut(self.settings.timeout_secs))?
            .map_err(DownloadError::Spawn)?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(DownloadError::Failed(stderr.trim().to_string()));
        }

        if !output.exists() {
            return Err(DownloadError::MissingOutput(output));
        }

        let bytes = tokio::fs::read(&output).await?;
        let stdout = String::from_utf8_lossy(&result.stdout);
        let display_name = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("download")
            .to_string();
        let file_name = format!("{}.{}", sanitize_filename(&display_name), extension);

        tracing::info!("Downloaded '{}' ({} bytes)", display_name, bytes.len());

        Ok(DownloadedMedia {
            url: request.url.clone(),
            display_name,
            file_name,
            bytes,
        })
    }

    /// Download several requests one after another
    pub async fn download_many(
        &self,
        requests: &[DownloadRequest],
    ) -> Vec<(String, Result<DownloadedMedia, DownloadError>)> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = self.download(request).await;
            if let Err(e) = &outcome {
                tracing::warn!("Download of {} failed: {}", request.url, e);
            }
            results.push((request.url.clone(), outcome));
        }
        results
    }
}
