use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::captions::{CaptionFetcher, TranscriptCache};
use crate::config::Config;
use crate::extractors::{build_strategies, extract_video_id, VideoId};
use crate::llm::{self, AnthropicClient, LlmError, TextGenerator, THEME_PLACEHOLDER};
use crate::ScribeError;

/// Used when no prompt template file is configured or present
pub const DEFAULT_SCRIPT_TEMPLATE: &str = "以下の英語スクリプトをもとに、60秒程度のショート動画用の日本語台本を作成してください。\n\
冒頭で視聴者の興味を引くフックを入れ、最後に簡潔なまとめを入れてください。\n\n\
---\n{{ Theme }}\n---\n";

/// Everything produced for one URL or one pasted text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Video the transcript came from, absent for pasted text
    pub video_id: Option<String>,

    pub video_url: Option<String>,

    /// English transcript
    pub transcript: String,

    /// Caption language, when fetched
    pub language: Option<String>,

    /// Retrieval strategy that produced the transcript
    pub strategy: Option<String>,

    /// Japanese translation, if requested
    pub translation: Option<String>,

    /// Generated short-video script, if requested
    pub script: Option<String>,

    pub generated_at: DateTime<Utc>,
}

/// Which generation stages to run after the transcript is in hand
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub translate: bool,
    pub script: bool,
    pub template: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            translate: true,
            script: true,
            template: DEFAULT_SCRIPT_TEMPLATE.to_string(),
        }
    }
}

/// Transcript, translation and script generation in sequence
pub struct ScriptPipeline {
    config: Config,
    fetcher: CaptionFetcher,
    generator: Option<Box<dyn TextGenerator>>,
    quiet: bool,
}

impl ScriptPipeline {
    /// Create a pipeline with the configured caption chain and model client.
    ///
    /// A missing API key is not an error until a generation stage runs.
    pub fn new(config: Config) -> Result<Self> {
        let strategies = build_strategies(&config)?;
        let cache = Arc::new(TranscriptCache::new(
            config.captions.cache_ttl(),
            config.captions.cache_capacity,
        ));
        let fetcher = CaptionFetcher::new(strategies).with_cache(cache);

        let generator: Option<Box<dyn TextGenerator>> = match AnthropicClient::from_config(&config.llm) {
            Ok(client) => Some(Box::new(client)),
            Err(LlmError::MissingApiKey { env_var }) => {
                tracing::debug!("{} is not set; generation stages are unavailable", env_var);
                None
            }
            Err(e) => return Err(e).context("Failed to create model client"),
        };

        Ok(Self::with_parts(config, fetcher, generator))
    }

    pub fn with_parts(
        config: Config,
        fetcher: CaptionFetcher,
        generator: Option<Box<dyn TextGenerator>>,
    ) -> Self {
        Self {
            config,
            fetcher,
            generator,
            quiet: false,
        }
    }

    /// Hide progress spinners
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Fetch captions for a video URL and run the requested stages
    pub async fn run_from_url(&self, url: &str, options: &PipelineOptions) -> Result<SessionReport> {
        let id = extract_video_id(url);
        let video_id = VideoId::from_id(&id).ok_or_else(|| ScribeError::InvalidVideoUrl(url.to_string()))?;

        tracing::info!("Fetching captions for video {}", video_id);
        let progress = self.spinner("Fetching English captions...");
        let fetched = self.fetcher.fetch(&video_id).await;
        progress.finish_and_clear();

        let transcript = fetched.map_err(ScribeError::TranscriptUnavailable)?;

        let mut report = self.process_text(&transcript.text, options).await?;
        report.video_url = Some(video_id.watch_url());
        report.video_id = Some(video_id.to_string());
        report.language = Some(transcript.language);
        report.strategy = Some(transcript.strategy);
        Ok(report)
    }

    /// Run the requested stages on text supplied by the user
    pub async fn run_from_text(&self, text: &str, options: &PipelineOptions) -> Result<SessionReport> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ScribeError::EmptyInput.into());
        }
        self.process_text(text, options).await
    }

    async fn process_text(&self, text: &str, options: &PipelineOptions) -> Result<SessionReport> {
        let mut report = SessionReport {
            video_id: None,
            video_url: None,
            transcript: text.to_string(),
            language: None,
            strategy: None,
            translation: None,
            script: None,
            generated_at: Utc::now(),
        };

        if options.translate {
            let generator = self.generator()?;
            tracing::info!("Translating {} characters into Japanese", text.chars().count());
            let progress = self.spinner("Translating into Japanese...");
            let translated = llm::translate_to_japanese(generator, text, &self.config.llm).await;
            progress.finish_and_clear();
            report.translation = Some(translated.context("Translation failed")?);
        }

        if options.script {
            let generator = self.generator()?;
            if !options.template.contains(THEME_PLACEHOLDER) {
                tracing::warn!("Prompt template has no {} placeholder; the transcript will not be included", THEME_PLACEHOLDER);
            }
            tracing::info!("Generating script");
            let progress = self.spinner("Generating short-video script...");
            let script = llm::generate_script(generator, &options.template, text, &self.config.llm).await;
            progress.finish_and_clear();
            report.script = Some(script.context("Script generation failed")?);
        }

        report.generated_at = Utc::now();
        Ok(report)
    }

    fn generator(&self) -> Result<&dyn TextGenerator> {
        self.generator.as_deref().ok_or_else(|| {
            LlmError::MissingApiKey {
                env_var: self.config.llm.api_key_env.clone(),
            }
            .into()
        })
    }

    fn spinner(&self, message: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress.set_message(message.to_string());
        progress.enable_steady_tick(Duration::from_millis(100));
        progress
    }
}

/// Resolve the script prompt template.
///
/// An explicit path must exist. Otherwise the configured template, then
/// `prompt.md` next to the config file, then the built-in default.
pub fn load_template(explicit: Option<&Path>, config: &Config) -> Result<String> {
    if let Some(path) = explicit {
        return fs_err::read_to_string(path).context("Failed to read prompt template");
    }

    if let Some(path) = &config.llm.prompt_template {
        return fs_err::read_to_string(path).context("Failed to read configured prompt template");
    }

    let fallback = Config::default_template_path()?;
    if fallback.exists() {
        tracing::debug!("Using prompt template {}", fallback.display());
        return fs_err::read_to_string(&fallback).context("Failed to read prompt template");
    }

    Ok(DEFAULT_SCRIPT_TEMPLATE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::{
        AttemptError, CaptionFormat, FailureReason, RetrievalStrategy, TrackKind, Transcript,
    };
    use crate::llm::MockTextGenerator;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Result<Transcript, AttemptError>);

    #[async_trait]
    impl RetrievalStrategy for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn attempt(&self, _video_id: &VideoId) -> Result<Transcript, AttemptError> {
            self.0.clone()
        }
    }

    fn transcript(text: &str) -> Transcript {
        Transcript {
            text: text.to_string(),
            language: "en".to_string(),
            kind: TrackKind::Automatic,
            format: CaptionFormat::Json3,
            strategy: "fixed".to_string(),
        }
    }

    fn pipeline(
        outcome: Result<Transcript, AttemptError>,
        generator: Option<Box<dyn TextGenerator>>,
    ) -> ScriptPipeline {
        let strategies: Vec<Box<dyn RetrievalStrategy>> = vec![Box::new(Fixed(outcome))];
        let fetcher = CaptionFetcher::new(strategies);
        ScriptPipeline::with_parts(Config::default(), fetcher, generator).quiet(true)
    }

    #[tokio::test]
    async fn test_full_run_from_url() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|req| req.prompt.starts_with(llm::TRANSLATION_INSTRUCTION))
            .times(1)
            .returning(|_| Ok("こんにちは世界".to_string()));
        generator
            .expect_generate()
            .withf(|req| req.prompt == "Script: Hello world")
            .times(1)
            .returning(|_| Ok("台本".to_string()));

        let pipeline = pipeline(Ok(transcript("Hello world")), Some(Box::new(generator)));
        let options = PipelineOptions {
            translate: true,
            script: true,
            template: "Script: {{ Theme }}".to_string(),
        };

        let report = pipeline
            .run_from_url("https://youtu.be/dQw4w9WgXcQ", &options)
            .await
            .unwrap();

        assert_eq!(report.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(report.transcript, "Hello world");
        assert_eq!(report.language.as_deref(), Some("en"));
        assert_eq!(report.translation.as_deref(), Some("こんにちは世界"));
        assert_eq!(report.script.as_deref(), Some("台本"));
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl RetrievalStrategy for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn attempt(&self, _video_id: &VideoId) -> Result<Transcript, AttemptError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(transcript("cached text"))
        }
    }

    #[tokio::test]
    async fn test_long_lived_pipeline_reuses_cached_transcript() {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategies: Vec<Box<dyn RetrievalStrategy>> = vec![Box::new(Counting(calls.clone()))];
        let cache = Arc::new(TranscriptCache::new(Duration::from_secs(3600), 4));
        let fetcher = CaptionFetcher::new(strategies).with_cache(cache);
        let pipeline = ScriptPipeline::with_parts(Config::default(), fetcher, None).quiet(true);
        let options = PipelineOptions {
            translate: false,
            script: false,
            ..PipelineOptions::default()
        };

        for url in ["https://youtu.be/dQw4w9WgXcQ", "https://www.youtube.com/watch?v=dQw4w9WgXcQ"] {
            let report = pipeline.run_from_url(url, &options).await.unwrap();
            assert_eq!(report.transcript, "cached text");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let pipeline = pipeline(Ok(transcript("unused")), None);
        let err = pipeline
            .run_from_url("https://example.com/video", &PipelineOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScribeError>(),
            Some(ScribeError::InvalidVideoUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_transcript_surfaces_reason() {
        let pipeline = pipeline(Err(AttemptError::new(FailureReason::NoCaptions)), None);
        let err = pipeline
            .run_from_url("https://youtu.be/dQw4w9WgXcQ", &PipelineOptions::default())
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Paste the text manually"), "{}", message);
    }

    #[tokio::test]
    async fn test_stages_without_api_key_fail() {
        let pipeline = pipeline(Ok(transcript("Hello")), None);
        let options = PipelineOptions {
            translate: true,
            script: false,
            ..PipelineOptions::default()
        };
        let err = pipeline.run_from_text("Hello", &options).await.unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn test_transcript_only_needs_no_generator() {
        let pipeline = pipeline(Ok(transcript("Just captions")), None);
        let options = PipelineOptions {
            translate: false,
            script: false,
            ..PipelineOptions::default()
        };
        let report = pipeline
            .run_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ", &options)
            .await
            .unwrap();
        assert_eq!(report.transcript, "Just captions");
        assert!(report.translation.is_none());
        assert!(report.script.is_none());
    }

    #[tokio::test]
    async fn test_empty_pasted_text() {
        let pipeline = pipeline(Ok(transcript("unused")), None);
        let err = pipeline
            .run_from_text("  \n ", &PipelineOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ScribeError>(), Some(ScribeError::EmptyInput)));
    }

    #[test]
    fn test_explicit_template_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Custom {{{{ Theme }}}}").unwrap();

        let template = load_template(Some(file.path()), &Config::default()).unwrap();
        assert_eq!(template, "Custom {{ Theme }}");

        assert!(load_template(Some(Path::new("/nonexistent/prompt.md")), &Config::default()).is_err());
    }
}
