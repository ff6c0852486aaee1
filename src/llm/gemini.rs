//! Generative-language API client (`models/<model>:generateContent`).

use crate::config::CompletionConfig;
use crate::error::{CompletionError, Result};
use crate::llm::Completion;
use crate::llm::prompt::{
    MALFORMED_RESPONSE_REPLY, NO_RESPONSE_REPLY, REQUEST_ERROR_REPLY, build_prompt,
};

use std::time::Duration;

/// Fixed sampling parameters sent with every request.
pub const TEMPERATURE: f64 = 0.7;
pub const MAX_OUTPUT_TOKENS: u32 = 1024;
pub const TOP_P: f64 = 0.8;
pub const TOP_K: u32 = 40;

/// Stateless client; each call is one POST with no retry.
pub struct GeminiClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client with the configured transport timeout.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(CompletionError::Request)?;

        Ok(Self::with_client(config, http_client))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_client(config: &CompletionConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            endpoint: endpoint_url(&config.base_url, &config.api_version, &config.model),
            api_key: config.api_key.clone(),
        }
    }

    /// Endpoint without the `key` query parameter.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one prompt. `Ok(None)` means the API answered without any text.
    pub async fn generate(&self, prompt: &str) -> std::result::Result<Option<String>, CompletionError> {
        // The API key travels in the query string, so strip URLs from
        // transport errors before they can reach a log line.
        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|error| CompletionError::Request(error.without_url()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|error| CompletionError::Request(error.without_url()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&response_text)
                .ok()
                .and_then(|body| body["error"]["message"].as_str().map(String::from))
                .unwrap_or_else(|| "unknown error".into());
            return Err(CompletionError::Status { status, message });
        }

        parse_response(&response_text)
    }
}

impl Completion for GeminiClient {
    async fn complete(&self, context: &str, new_text: &str) -> String {
        let prompt = build_prompt(context, new_text);

        match self.generate(&prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!("completion response carried no candidate text");
                NO_RESPONSE_REPLY.to_string()
            }
            Err(error @ CompletionError::Parse(_)) => {
                tracing::warn!(%error, "failed to parse completion response");
                MALFORMED_RESPONSE_REPLY.to_string()
            }
            Err(error) => {
                tracing::warn!(%error, "completion request failed");
                REQUEST_ERROR_REPLY.to_string()
            }
        }
    }
}

/// `<base>/<version>/models/<model>:generateContent`
pub fn endpoint_url(base_url: &str, api_version: &str, model: &str) -> String {
    format!(
        "{}/{api_version}/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

/// JSON body for a single-part user prompt with the fixed sampling config.
pub fn request_body(prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [
            { "parts": [ { "text": prompt } ] }
        ],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
            "topP": TOP_P,
            "topK": TOP_K,
        }
    })
}

/// Extract `candidates[0].content.parts[0].text`.
pub fn parse_response(body: &str) -> std::result::Result<Option<String>, CompletionError> {
    let body: serde_json::Value = serde_json::from_str(body)?;
    Ok(body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(String::from))
}
