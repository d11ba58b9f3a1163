use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{
    require_key, send, status_error, HttpRequest, ImagePayload, Provider, ProviderAdapter,
    RawBackendResponse, Transport, TEMPERATURE,
};
use crate::error::SearchError;
use crate::parser::SearchResult;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

const HARM_CATEGORIES: [&str; 5] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

/// Search-grounded generative-content backend.
pub struct GeminiAdapter {
    transport: Arc<dyn Transport>,
    api_base: String,
    model: String,
}

impl GeminiAdapter {
    #[cfg(test)]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, DEFAULT_API_BASE.to_string(), DEFAULT_MODEL.to_string())
    }

    pub fn with_config(transport: Arc<dyn Transport>, api_base: String, model: String) -> Self {
        GeminiAdapter {
            transport,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model,
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn safety_settings() -> Vec<Value> {
        HARM_CATEGORIES
            .into_iter()
            .map(|category| {
                json!({
                    "category": category,
                    "threshold": "BLOCK_NONE",
                })
            })
            .collect()
    }

    fn build_payload(brief: &str, image: Option<&ImagePayload>) -> Value {
        let mut parts = Vec::new();
        if let Some(image) = image {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }));
        }
        parts.push(json!({ "text": brief }));

        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "safetySettings": Self::safety_settings(),
            "tools": [{ "googleSearch": {} }],
            "generationConfig": {
                "temperature": TEMPERATURE,
            },
        })
    }

    fn first_candidate(payload: &Value) -> Option<&Value> {
        payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
    }

    /// Concatenated text parts of the first candidate.
    fn extract_text(payload: &Value) -> String {
        Self::first_candidate(payload)
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Web citations from the first candidate's grounding metadata. Chunks
    /// missing a uri or title are skipped.
    fn extract_grounding(payload: &Value) -> Vec<SearchResult> {
        Self::first_candidate(payload)
            .and_then(|candidate| candidate.get("groundingMetadata"))
            .and_then(|metadata| metadata.get("groundingChunks"))
            .and_then(Value::as_array)
            .map(|chunks| {
                chunks
                    .iter()
                    .filter_map(|chunk| {
                        let web = chunk.get("web")?;
                        let uri = web.get("uri").and_then(Value::as_str)?;
                        let title = web.get("title").and_then(Value::as_str)?;
                        if uri.is_empty() || title.is_empty() {
                            return None;
                        }
                        Some(SearchResult {
                            uri: uri.to_string(),
                            title: title.to_string(),
                            thumbnail_url: None,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn call(
        &self,
        brief: &str,
        image: Option<&ImagePayload>,
        api_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RawBackendResponse, SearchError> {
        let api_key = require_key(Provider::Gemini, api_key)?;

        let request = HttpRequest {
            url: self.endpoint(),
            headers: vec![
                ("x-goog-api-key".to_string(), api_key.to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: Self::build_payload(brief, image),
        };

        let response = send(self.transport.as_ref(), Provider::Gemini, request, cancel).await?;
        if !response.is_success() {
            return Err(status_error(Provider::Gemini, &response));
        }

        let payload: Value = serde_json::from_str(&response.body).map_err(|e| {
            debug_eprintln!("[Gemini] Response body is not JSON: {}", e);
            SearchError::Format
        })?;

        Ok(RawBackendResponse {
            text: Self::extract_text(&payload),
            grounding: Self::extract_grounding(&payload),
        })
    }
}
