use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::captions::{CaptionFormat, TrackPreference};
use crate::extractors::SourceKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Caption retrieval settings
    pub captions: CaptionsConfig,

    /// Hosted text-generation settings
    pub llm: LlmConfig,

    /// Media download settings
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionsConfig {
    /// Whether machine-generated or manual tracks are tried first
    pub track_preference: TrackPreference,

    /// English language codes, most preferred first
    pub english_languages: Vec<String>,

    /// Languages tried when no English track exists
    pub secondary_languages: Vec<String>,

    /// Wire formats, most preferred first
    pub formats: Vec<CaptionFormat>,

    /// Enabled upstream sources (order is fixed regardless of listing order)
    pub sources: Vec<SourceKind>,

    /// How long fetched transcripts stay in a pipeline's in-memory cache
    pub cache_ttl_secs: u64,

    /// Maximum number of cached transcripts
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Messages endpoint
    pub api_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub model: String,

    pub max_tokens: u32,

    pub translate_temperature: f32,

    pub script_temperature: f32,

    /// Characters per translation request
    pub chunk_width: usize,

    pub timeout_secs: u64,

    /// Script prompt template; `{{ Theme }}` is replaced with the transcript
    pub prompt_template: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Format selector for video downloads
    pub video_format: String,

    /// Format selector for audio-only downloads
    pub audio_format: String,

    pub socket_timeout_secs: u64,

    pub retries: u32,

    /// Upper bound on a single download run
    pub timeout_secs: u64,
}

impl Default for CaptionsConfig {
    fn default() -> Self {
        Self {
            track_preference: TrackPreference::AutomaticFirst,
            english_languages: ["en", "en-US", "en-GB", "en-orig"]
                .into_iter()
                .map(String::from)
                .collect(),
            secondary_languages: ["ja", "es", "fr", "de", "pt", "it", "ko", "zh-Hans", "zh-Hant", "ru"]
                .into_iter()
                .map(String::from)
                .collect(),
            formats: CaptionFormat::timedtext_formats(),
            sources: SourceKind::all().to_vec(),
            cache_ttl_secs: 3600,
            cache_capacity: 64,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            translate_temperature: 0.1,
            script_temperature: 0.2,
            chunk_width: 6000,
            timeout_secs: 120,
            prompt_template: None,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            video_format: "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b".to_string(),
            audio_format: "ba/b".to_string(),
            socket_timeout_secs: 30,
            retries: 3,
            timeout_secs: 1800,
        }
    }
}

impl CaptionsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("caption-scribe").join("config.yaml"))
    }

    /// Prompt template next to the config file, used when none is configured
    pub fn default_template_path() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        Ok(config_path
            .parent()
            .map(|dir| dir.join("prompt.md"))
            .unwrap_or_else(|| PathBuf::from("prompt.md")))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.captions.english_languages.is_empty() && self.captions.secondary_languages.is_empty() {
            anyhow::bail!("At least one caption language must be configured");
        }

        if self.captions.formats.is_empty() {
            anyhow::bail!("At least one caption format must be configured");
        }

        if self.captions.sources.is_empty() {
            anyhow::bail!("At least one caption source must be enabled");
        }

        if self.captions.cache_capacity == 0 {
            anyhow::bail!("captions.cache_capacity must be at least 1");
        }

        if self.llm.chunk_width == 0 {
            anyhow::bail!("llm.chunk_width must be at least 1");
        }

        if !(0.0..=1.0).contains(&self.llm.translate_temperature)
            || !(0.0..=1.0).contains(&self.llm.script_temperature)
        {
            anyhow::bail!("LLM temperatures must be between 0.0 and 1.0");
        }

        if self.download.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("download.yt_dlp_path must not be empty");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Track Preference: {:?}", self.captions.track_preference);
        println!("  English Languages: {}", self.captions.english_languages.join(", "));
        println!("  Secondary Languages: {}", self.captions.secondary_languages.join(", "));
        println!(
            "  Formats: {}",
            self.captions
                .formats
                .iter()
                .map(|f| f.as_str().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!(
            "  Sources: {}",
            self.captions
                .sources
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!(
            "  In-process Cache: {}s TTL, {} entries (per pipeline, not kept between runs)",
            self.captions.cache_ttl_secs, self.captions.cache_capacity
        );
        println!("  Model: {}", self.llm.model);
        println!("  API Key Variable: {}", self.llm.api_key_env);
        println!("  Chunk Width: {} chars", self.llm.chunk_width);
        if let Some(template) = &self.llm.prompt_template {
            println!("  Prompt Template: {}", template.display());
        }
        println!("  yt-dlp: {}", self.download.yt_dlp_path);
    }

    /// Point the user at the files that control behavior
    pub async fn interactive_setup(&self) -> Result<()> {
        println!("Edit the config file to change settings:");
        println!("  {}", Self::config_path()?.display());
        println!("Script prompt template ({{{{ Theme }}}} is replaced by the transcript):");
        match &self.llm.prompt_template {
            Some(path) => println!("  {}", path.display()),
            None => println!("  {}", Self::default_template_path()?.display()),
        }
        println!("The API key is read from ${}", self.llm.api_key_env);
        Ok(())
    }
}
