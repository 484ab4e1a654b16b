use std::time::Duration;
use serde::{Serialize, Deserialize};
use anyhow::{Result, Context};
use async_trait::async_trait;
use reqwest::Client;
use log::{debug, error};

use crate::app_config::Config;
use crate::errors::ProviderError;
use crate::providers::{build_translation_prompt, TranslationProvider};
use crate::translation::protocol::BatchRequest;

/// Gemini client for the Google Generative Language API
#[derive(Debug)]
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// API key, sent as the `key` query parameter
    api_key: String,
    /// API base URL
    endpoint: String,
    /// Model name, e.g. `gemini-2.0-flash-exp`
    model: String,
    /// Language of the input subtitles
    source_language: String,
    /// Language to translate into
    target_language: String,
    /// Sampling temperature
    temperature: f32,
    /// Output token limit
    max_output_tokens: u32,
}

/// `generateContent` request body
#[derive(Debug, Serialize)]
pub struct GeminiRequest {
    /// Conversation turns
    contents: Vec<GeminiContent>,

    /// Sampling settings
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

/// One conversation turn
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    /// Role of the sender; absent in some responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Content parts
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// A text part
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    /// The text of the part
    #[serde(default)]
    pub text: Option<String>,
}

/// Sampling settings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    response_mime_type: String,
}

/// `generateContent` response body
#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

/// A generated candidate
#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    /// Candidate content; missing when the candidate was blocked
    pub content: Option<GeminiContent>,
}

impl GeminiRequest {
    /// Single-turn request carrying the prompt
    pub fn new(prompt: impl Into<String>, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: Some(prompt.into()) }],
            }],
            generation_config: GenerationConfig {
                temperature,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens,
                response_mime_type: "text/plain".to_string(),
            },
        }
    }
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            source_language: "English".to_string(),
            target_language: "Vietnamese".to_string(),
            temperature: 0.1,
            max_output_tokens: 8192,
        })
    }

    /// Create a client from the active provider settings
    pub fn from_config(config: &Config) -> Result<Self> {
        let translation = &config.translation;
        let mut gemini = Self::new(
            translation.get_api_key(),
            translation.get_endpoint(),
            translation.get_model(),
            Duration::from_secs(translation.get_timeout_secs()),
        )?;
        gemini.source_language = config.source_language.clone();
        gemini.target_language = config.target_language.clone();
        gemini.temperature = translation.common.temperature;
        gemini.max_output_tokens = translation.common.max_tokens;
        Ok(gemini)
    }

    fn api_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    /// Send a `generateContent` request
    pub async fn complete(&self, request: &GeminiRequest) -> Result<GeminiResponse, ProviderError> {
        let response = self.client.post(self.api_url())
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::ConnectionError(e.to_string())
                } else {
                    ProviderError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Gemini API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        response.json::<GeminiResponse>().await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Gemini API response: {}", e)))
    }

    /// Text of the first part of the first candidate
    pub fn extract_text(response: &GeminiResponse) -> Option<String> {
        response.candidates.first()?
            .content.as_ref()?
            .parts.first()?
            .text.clone()
    }
}

#[async_trait]
impl TranslationProvider for Gemini {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<String, ProviderError> {
        let prompt = build_translation_prompt(&self.source_language, &self.target_language, request);
        let body = GeminiRequest::new(prompt, self.temperature, self.max_output_tokens);

        debug!("Gemini: sending batch of {} lines to {}", request.len(), self.model);
        let response = self.complete(&body).await?;

        Self::extract_text(&response)
            .ok_or_else(|| ProviderError::ParseError("Unexpected Gemini response shape".to_string()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
