use std::time::Duration;
use serde::{Serialize, Deserialize};
use anyhow::{Result, Context};
use async_trait::async_trait;
use reqwest::{Client, header};
use log::{debug, error};

use crate::app_config::Config;
use crate::errors::ProviderError;
use crate::providers::{build_translation_prompt, TranslationProvider};
use crate::translation::protocol::BatchRequest;

/// Client for OpenAI-compatible chat completion endpoints (OpenAI, Novita, ...)
#[derive(Debug)]
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// Bearer token
    api_key: String,
    /// API base URL, e.g. `https://api.novita.ai/v3/openai`
    endpoint: String,
    /// Model name
    model: String,
    /// Language of the input subtitles
    source_language: String,
    /// Language to translate into
    target_language: String,
    /// Sampling temperature
    temperature: f32,
    /// Completion token limit
    max_tokens: u32,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<OpenAIMessage>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,

    /// Always a single non-streamed answer
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message; can be null in some responses
    #[serde(default)]
    pub content: Option<String>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

/// A generated choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    /// The generated message
    pub message: OpenAIMessage,
}

impl OpenAIRequest {
    /// Create a new chat completion request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens,
            stream: false,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: Some(content.into()),
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl OpenAI {
    /// Create a new OpenAI-compatible client
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
            max_tokens: 8192,
        })
    }

    /// Create a client from the active provider settings
    pub fn from_config(config: &Config) -> Result<Self> {
        let translation = &config.translation;
        let mut openai = Self::new(
            translation.get_api_key(),
            translation.get_endpoint(),
            translation.get_model(),
            Duration::from_secs(translation.get_timeout_secs()),
        )?;
        openai.source_language = config.source_language.clone();
        openai.target_language = config.target_language.clone();
        openai.temperature = translation.common.temperature;
        openai.max_tokens = translation.common.max_tokens;
        Ok(openai)
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a professional translator specialized in translating {} to {}. \
             Return only the translated text with the same formatting as the input.",
            self.source_language, self.target_language
        )
    }

    /// Send a chat completion request
    pub async fn complete(&self, request: &OpenAIRequest) -> Result<OpenAIResponse, ProviderError> {
        let response = self.client.post(self.api_url())
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api_key)
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
            error!("OpenAI-compatible API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        response.json::<OpenAIResponse>().await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse chat completion response: {}", e)))
    }

    /// Content of the first choice
    pub fn extract_text(response: &OpenAIResponse) -> Option<String> {
        response.choices.first()?.message.content.clone()
    }
}

#[async_trait]
impl TranslationProvider for OpenAI {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<String, ProviderError> {
        let prompt = build_translation_prompt(&self.source_language, &self.target_language, request);
        let body = OpenAIRequest::new(&self.model, self.max_tokens)
            .add_message("system", self.system_prompt())
            .add_message("user", prompt)
            .temperature(self.temperature);

        debug!("OpenAI: sending batch of {} lines to {}", request.len(), self.model);
        let response = self.complete(&body).await?;

        Self::extract_text(&response)
            .ok_or_else(|| ProviderError::ParseError("Chat completion returned no choices".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
