//! Japanese translation and script generation on top of a hosted text model.

use async_trait::async_trait;

pub mod anthropic;

pub use anthropic::AnthropicClient;

use crate::config::LlmConfig;

/// Instruction placed in front of every translation chunk
pub const TRANSLATION_INSTRUCTION: &str =
    "以下の英文を自然な日本語（敬体、です・ます調）に翻訳してください。原文の改行を維持してください。\n\n";

/// Placeholder in the script template that receives the English transcript
pub const THEME_PLACEHOLDER: &str = "{{ Theme }}";

/// Separator between translated chunks
const CHUNK_SEPARATOR: &str = "\n\n";

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("API key not found: set the {env_var} environment variable")]
    MissingApiKey { env_var: String },

    #[error("request to the model API failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model API response had no text content")]
    InvalidResponse,
}

/// A single-turn generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompt: String,
}

/// Trait for anything that turns a prompt into text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

/// Split text into pieces of at most `width` characters.
///
/// Splits on character boundaries, never inside a multi-byte character.
pub fn chunk_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Translate English text into polite Japanese, one request per chunk
pub async fn translate_to_japanese(
    generator: &dyn TextGenerator,
    text: &str,
    settings: &LlmConfig,
) -> Result<String, LlmError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let chunks = chunk_text(text, settings.chunk_width);
    let total = chunks.len();
    let mut translated = Vec::with_capacity(total);

    for (index, chunk) in chunks.into_iter().enumerate() {
        tracing::debug!("Translating chunk {}/{} ({} chars)", index + 1, total, chunk.chars().count());

        let request = GenerationRequest {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.translate_temperature,
            prompt: format!("{}{}", TRANSLATION_INSTRUCTION, chunk),
        };

        let output = generator.generate(&request).await?;
        translated.push(output.trim().to_string());
    }

    Ok(translated.join(CHUNK_SEPARATOR))
}

/// Fill the template with the text and ask for a script
pub async fn generate_script(
    generator: &dyn TextGenerator,
    template: &str,
    text: &str,
    settings: &LlmConfig,
) -> Result<String, LlmError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let request = GenerationRequest {
        model: settings.model.clone(),
        max_tokens: settings.max_tokens,
        temperature: settings.script_temperature,
        prompt: template.replace(THEME_PLACEHOLDER, text),
    };

    let output = generator.generate(&request).await?;
    Ok(output.trim().to_string())
}
