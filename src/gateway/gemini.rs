//! Gemini `generateContent` adapter.
//!
//! Implements [`InferenceService`] over the REST API:
//!
//! ```text
//! POST {base_url}/v1beta/models/{model}:generateContent
//! x-goog-api-key: <key>
//! { "contents": [ { "role": "user", "parts": [ ... ] } ] }
//! ```
//!
//! Image parts go first, followed by the instruction text. The reply text is
//! the concatenation of `candidates[0].content.parts[*].text`.

use super::error::GatewayError;
use super::InferenceService;
use crate::config::GatewayConfig;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;
use tracing::debug;

/// HTTP client for one Gemini model with one credential.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiClient {
    /// Create a client for `config.model` authenticated with `api_key`.
    pub fn new(config: &GatewayConfig, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "gemini client builder failed, using defaults");
                reqwest::Client::new()
            });
        Self {
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    async fn generate_content(&self, parts: Vec<serde_json::Value>) -> Result<String, GatewayError> {
        let body = build_request(parts);
        debug!(model = %self.model, "sending generateContent request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(format!("Gemini request timed out: {e}"))
                } else {
                    GatewayError::Request(format!("Gemini request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Request(format!("Gemini body read failed: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Response(format!("invalid JSON: {e}")))?;
        extract_text(&value)
    }
}

/// Wrap content parts in a single-turn user request.
pub fn build_request(parts: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }]
    })
}

/// Inline image part carrying base64 data.
pub fn image_part(image: &[u8], mime_type: &str) -> serde_json::Value {
    json!({
        "inline_data": {
            "mime_type": mime_type,
            "data": base64::engine::general_purpose::STANDARD.encode(image),
        }
    })
}

pub fn text_part(text: &str) -> serde_json::Value {
    json!({ "text": text })
}

/// Pull the reply text out of a `generateContent` response.
fn extract_text(value: &serde_json::Value) -> Result<String, GatewayError> {
    let Some(candidate) = value["candidates"].get(0) else {
        let reason = value["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates returned");
        return Err(GatewayError::Response(format!("empty response: {reason}")));
    };

    let parts = candidate["content"]["parts"]
        .as_array()
        .ok_or_else(|| GatewayError::Response("candidate has no content parts".into()))?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        return Err(GatewayError::Response("candidate has no text".into()));
    }
    Ok(text)
}

/// Extract an error message from a Gemini error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl InferenceService for GeminiClient {
    async fn classify(
        &self,
        image: &[u8],
        mime_type: &str,
        instruction: &str,
    ) -> Result<String, GatewayError> {
        self.generate_content(vec![image_part(image, mime_type), text_part(instruction)])
            .await
    }

    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        self.generate_content(vec![text_part(prompt)]).await
    }
}
