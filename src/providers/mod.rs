/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for the supported backends:
 * - Gemini: Google Generative Language API
 * - OpenAI: any OpenAI-compatible chat completions endpoint (e.g. Novita)
 * - Mock: scriptable in-process backend used by the test suite
 *
 * Every backend only moves a numbered batch to the service and returns the raw
 * text it answered with. Parsing and retry policy live in the translation module.
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;

use crate::app_config::{Config, TranslationProvider as ProviderKind};
use crate::errors::ProviderError;
use crate::translation::protocol::BatchRequest;

/// Common trait for all translation backends
///
/// One instance is shared by every worker of a run, so implementations must not
/// keep per-batch state.
#[async_trait]
pub trait TranslationProvider: Send + Sync + Debug {
    /// Send one numbered batch and return the raw response text
    ///
    /// # Arguments
    /// * `request` - The ordered texts of the batch
    ///
    /// # Returns
    /// * `Result<String, ProviderError>` - The unparsed response text or an error
    async fn translate_batch(&self, request: &BatchRequest) -> Result<String, ProviderError>;

    /// Short backend name used in log lines
    fn name(&self) -> &str;
}

/// Build the translation prompt for one batch
pub fn build_translation_prompt(source_language: &str, target_language: &str, request: &BatchRequest) -> String {
    format!(
        "Translate the following {} subtitles to {}. Maintain the numbering format exactly as provided.\n\
         Each subtitle is marked with [number] followed by text. Translate ONLY the text, keeping the [number] format.\n\
         Return ONLY the translated subtitles with their numbers, no additional text or explanations.\n\n{}",
        source_language,
        target_language,
        request.payload()
    )
}

/// Create the backend selected by the configuration
pub fn create_provider(config: &Config) -> Result<Arc<dyn TranslationProvider>> {
    let provider: Arc<dyn TranslationProvider> = match config.translation.provider {
        ProviderKind::Gemini => Arc::new(gemini::Gemini::from_config(config)?),
        ProviderKind::OpenAI => Arc::new(openai::OpenAI::from_config(config)?),
    };
    Ok(provider)
}

pub mod gemini;
pub mod mock;
pub mod openai;
