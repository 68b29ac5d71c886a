use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scribe",
    about = "Caption Scribe - Turn YouTube captions into Japanese translations and short-video scripts",
    version,
    long_about = "Fetches English captions for a YouTube video through several fallback strategies, translates them into polite Japanese and drafts a short-video script with Claude. Also downloads clips and audio through yt-dlp."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch captions for a video, then translate and write a script
    Fetch {
        /// YouTube URL (watch, youtu.be, embed or shorts link)
        #[arg(value_name = "URL")]
        url: String,

        /// Translate the transcript into Japanese
        #[arg(long)]
        translate: bool,

        /// Generate a short-video script from the transcript
        #[arg(long)]
        script: bool,

        /// Prompt template file; `{{ Theme }}` is replaced by the transcript
        #[arg(long, value_name = "FILE")]
        template: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Translate English text into Japanese (reads stdin without a file)
    Translate {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Generate a short-video script from English text (reads stdin without a file)
    Script {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Prompt template file
        #[arg(long, value_name = "FILE")]
        template: Option<PathBuf>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the video id found in a URL
    VideoId {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Download videos or audio, optionally cut to a time range
    Download {
        /// One or more video URLs, downloaded one at a time
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,

        /// Clip start (MM:SS, HH:MM:SS, MMSS or HHMMSS)
        #[arg(long, value_name = "TIME")]
        start: Option<String>,

        /// Clip end (MM:SS, HH:MM:SS, MMSS or HHMMSS)
        #[arg(long, value_name = "TIME")]
        end: Option<String>,

        /// Download audio only as mp3
        #[arg(long)]
        audio: bool,

        /// Directory the files are written to
        #[arg(short = 'd', long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
    },

    /// Show or edit settings
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text sections
    Text,
    /// JSON report
    Json,
    /// Markdown document
    Markdown,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}
