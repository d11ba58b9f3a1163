use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{
    require_key, send, status_error, HttpRequest, ImagePayload, Provider, ProviderAdapter,
    RawBackendResponse, Transport, TEMPERATURE,
};
use crate::error::SearchError;

pub const DEFAULT_ENDPOINT: &str = "https://api.x.ai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "grok-4";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// xAI chat-completions backend with live search and JSON response mode.
pub struct GrokAdapter {
    transport: Arc<dyn Transport>,
    endpoint: String,
    model: String,
}

impl GrokAdapter {
    #[cfg(test)]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, DEFAULT_ENDPOINT.to_string(), DEFAULT_MODEL.to_string())
    }

    pub fn with_config(transport: Arc<dyn Transport>, endpoint: String, model: String) -> Self {
        GrokAdapter {
            transport,
            endpoint,
            model,
        }
    }

    fn build_messages(brief: &str, image: Option<&ImagePayload>) -> Value {
        match image {
            Some(image) => json!([{
                "role": "user",
                "content": [
                    { "type": "text", "text": brief },
                    {
                        "type": "image_url",
                        "image_url": { "url": image.data_uri() }
                    }
                ]
            }]),
            None => json!([{ "role": "user", "content": brief }]),
        }
    }

    fn build_payload(&self, brief: &str, image: Option<&ImagePayload>) -> Value {
        json!({
            "messages": Self::build_messages(brief, image),
            "model": self.model,
            "temperature": TEMPERATURE,
            "search_parameters": { "mode": "auto" },
            "response_format": { "type": "json_object" },
        })
    }
}

#[async_trait]
impl ProviderAdapter for GrokAdapter {
    fn provider(&self) -> Provider {
        Provider::Grok
    }

    async fn call(
        &self,
        brief: &str,
        image: Option<&ImagePayload>,
        api_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RawBackendResponse, SearchError> {
        let api_key = require_key(Provider::Grok, api_key)?;

        let request = HttpRequest {
            url: self.endpoint.clone(),
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {api_key}")),
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: self.build_payload(brief, image),
        };

        let response = send(self.transport.as_ref(), Provider::Grok, request, cancel).await?;
        if !response.is_success() {
            return Err(status_error(Provider::Grok, &response));
        }

        let completion: ChatCompletion = serde_json::from_str(&response.body).map_err(|e| {
            debug_eprintln!("[Grok] Unexpected completion body: {}", e);
            SearchError::Format
        })?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or(SearchError::Format)?;

        Ok(RawBackendResponse {
            text,
            grounding: Vec::new(),
        })
    }
}
