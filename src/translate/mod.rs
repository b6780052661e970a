// Subtitle translation
//
// Translation services are interchangeable behind `TranslationService`:
// - OpenAi: chat completions endpoint
// - Ollama: local Ollama server
//
// Services receive SRT text and are asked to keep cue numbers and timestamps
// untouched. Nothing guarantees they do, so `translate_subtitles` checks every
// answer against the cues it sent before accepting it.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{TranslateConfig, TranslatorBackend};
use crate::error::{Result, TarjamaError};
use crate::subtitle::Subtitles;
use crate::workflow::Stage;

pub use ollama::OllamaTranslator;
pub use openai::OpenAiTranslator;

/// Main trait for translation operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translate SRT text from `source_language` into `target_language`
    async fn translate(&self, subtitle_text: &str, source_language: &str, target_language: &str) -> Result<String>;

    /// Check if the service is reachable and the model is present
    async fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    pub fn create_translator(config: &TranslateConfig) -> Result<Box<dyn TranslationService>> {
        Ok(match config.backend {
            TranslatorBackend::OpenAi => Box::new(OpenAiTranslator::new(config)?),
            TranslatorBackend::Ollama => Box::new(OllamaTranslator::new(config)?),
        })
    }
}

/// Translate stage.
///
/// Cues go out in batches of `cues_per_request`. Each answer must parse as SRT
/// and carry exactly the cue numbers and timings of its batch, otherwise the
/// stage fails with `TranslationMalformed`. Service errors are
/// `TranslationFailed`. `timeout` covers all batches together.
pub async fn translate_subtitles(
    service: &dyn TranslationService,
    source: &Subtitles,
    target_language: &str,
    cues_per_request: usize,
    timeout: Duration,
) -> Result<Subtitles> {
    let batch_size = cues_per_request.max(1);
    let batches = source.len().div_ceil(batch_size);
    info!(
        "Translating {} cues from {} to {} in {} request(s)",
        source.len(),
        source.language,
        target_language,
        batches
    );

    let work = async {
        let mut cues = Vec::with_capacity(source.len());
        for (n, chunk) in source.cues.chunks(batch_size).enumerate() {
            let batch = Subtitles::new(source.language.clone(), chunk.to_vec());
            debug!("Sending batch {}/{} ({} cues)", n + 1, batches, batch.len());

            let answer = service
                .translate(&batch.to_srt(), &source.language, target_language)
                .await
                .map_err(|e| e.for_stage(Stage::Translating))?;
            let translated = Subtitles::parse(target_language, strip_code_fences(&answer))
                .map_err(|e| e.for_stage(Stage::Translating))?;
            batch.check_same_structure(&translated).map_err(|message| {
                TarjamaError::TranslationMalformed(format!("batch {}: {}", n + 1, message))
            })?;
            cues.extend(translated.cues);
        }
        Ok::<_, TarjamaError>(Subtitles::new(target_language, cues))
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(TarjamaError::timed_out(Stage::Translating, timeout)),
    }
}

/// Instructions shared by every backend
pub fn system_prompt(source_language: &str, target_language: &str, domain_hint: Option<&str>) -> String {
    let hint = domain_hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| format!(" {}", h))
        .unwrap_or_default();
    format!(
        "You are a professional subtitle translator.{} Translate the {} subtitles you are given into {}.\n\
         The input is in SRT format. Return SRT in exactly the same shape: \
         the same number of cues in the same order, every cue number and every timestamp line copied unchanged. \
         Only the text lines are translated.\n\
         Reply with the SRT alone, without explanations or code fences.",
        hint,
        language_name(source_language),
        language_name(target_language)
    )
}

/// Remove a surrounding Markdown code fence, if the model added one
pub fn strip_code_fences(answer: &str) -> &str {
    let trimmed = answer.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```srt) along with the opening fence line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// English name of an ISO 639-1 code, or the code itself when unknown
pub fn language_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "ar" => "Arabic".to_string(),
        "en" => "English".to_string(),
        "th" => "Thai".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "es" => "Spanish".to_string(),
        "it" => "Italian".to_string(),
        "pt" => "Portuguese".to_string(),
        "ru" => "Russian".to_string(),
        "tr" => "Turkish".to_string(),
        "fa" => "Persian".to_string(),
        "ur" => "Urdu".to_string(),
        "hi" => "Hindi".to_string(),
        "id" => "Indonesian".to_string(),
        "ms" => "Malay".to_string(),
        "ja" => "Japanese".to_string(),
        "ko" => "Korean".to_string(),
        "zh" => "Chinese".to_string(),
        "nl" => "Dutch".to_string(),
        "sv" => "Swedish".to_string(),
        "pl" => "Polish".to_string(),
        "he" => "Hebrew".to_string(),
        "vi" => "Vietnamese".to_string(),
        _ => code.to_string(),
    }
}
