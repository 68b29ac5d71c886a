//! Caption Scribe - English captions to Japanese scripts from the command line
//!
//! This library fetches English captions for YouTube videos through a chain of
//! fallback strategies, translates them into Japanese and drafts a short-video
//! script with a hosted language model. It also wraps yt-dlp for clip and
//! audio downloads.

pub mod captions;
pub mod cli;
pub mod config;
pub mod download;
pub mod extractors;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod utils;

pub use captions::{CaptionFetcher, FailureReason, Transcript};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{extract_video_id, VideoId};
pub use pipeline::{PipelineOptions, ScriptPipeline, SessionReport};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the scribe
#[derive(thiserror::Error, Debug)]
pub enum ScribeError {
    #[error("Could not extract a video id from '{0}'. Check the URL.")]
    InvalidVideoUrl(String),

    #[error("English captions not found: {0}")]
    TranscriptUnavailable(#[from] FailureReason),

    #[error("No text to process")]
    EmptyInput,
}
