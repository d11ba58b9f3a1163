pub mod gemini;
pub mod grok;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::parser::SearchResult;
use crate::progress::{self, Kind};

pub use gemini::GeminiAdapter;
pub use grok::GrokAdapter;

/// Sampling temperature sent to both backends.
pub const TEMPERATURE: f64 = 0.1;

/// Longest slice of a non-JSON error body echoed back to the user.
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Grok,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Gemini, Provider::Grok];

    pub fn tag(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Grok => "grok",
        }
    }

    /// Name shown in the settings panel and timeout messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Grok => "Grok",
        }
    }

    /// Company issuing the API key.
    pub fn vendor(self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Grok => "xAI",
        }
    }

    pub fn other(self) -> Provider {
        match self {
            Provider::Gemini => Provider::Grok,
            Provider::Grok => Provider::Gemini,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Provider {
    type Err = SearchError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|provider| provider.tag() == tag)
            .ok_or_else(|| SearchError::Configuration(format!("Unknown API provider: {tag}")))
    }
}

/// An uploaded image, already base64 encoded and within the upload cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

impl ImagePayload {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// What a backend handed back before normalization: the model's text and any
/// citation links taken from response metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBackendResponse {
    pub text: String,
    pub grounding: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, SearchError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        ReqwestTransport {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, SearchError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let exchange = async {
            let response = builder
                .send()
                .await
                .map_err(|e| SearchError::Network(e.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| SearchError::Network(e.to_string()))?;
            Ok::<_, SearchError>(HttpResponse { status, body })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SearchError::Cancelled),
            result = exchange => result,
        }
    }
}

/// Capability shared by both backends: send a brief, get raw output back.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn call(
        &self,
        brief: &str,
        image: Option<&ImagePayload>,
        api_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RawBackendResponse, SearchError>;
}

pub(crate) fn require_key(provider: Provider, api_key: Option<&str>) -> Result<&str, SearchError> {
    api_key
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            SearchError::Configuration(format!("{} API key is not configured.", provider.vendor()))
        })
}

/// Sends `request`, logging the exchange. A failure seen after `cancel` fired
/// is reported as cancellation whatever the transport said.
pub(crate) async fn send(
    transport: &dyn Transport,
    provider: Provider,
    request: HttpRequest,
    cancel: &CancellationToken,
) -> Result<HttpResponse, SearchError> {
    if cancel.is_cancelled() {
        return Err(SearchError::Cancelled);
    }

    let host = host_from_url(&request.url).to_string();
    debug_eprintln!("[{}] POST {}", provider.display_name(), request.url);

    match transport.post_json(request, cancel).await {
        Ok(response) => {
            progress::log_with(
                Kind::Http,
                format!("POST {} → {} [{}]", host, response.status, provider),
            );
            Ok(response)
        }
        Err(_) if cancel.is_cancelled() => {
            progress::log_with(Kind::Http, format!("POST {host} cancelled [{provider}]"));
            Err(SearchError::Cancelled)
        }
        Err(e) => {
            progress::log_with(Kind::Http, format!("POST {host} failed: {e}"));
            Err(e)
        }
    }
}

/// Maps a non-2xx response onto the transport error taxonomy.
pub(crate) fn status_error(provider: Provider, response: &HttpResponse) -> SearchError {
    match response.status {
        401 | 403 => SearchError::Authentication {
            provider,
            status: response.status,
        },
        429 => SearchError::RateLimited {
            status: response.status,
        },
        status => SearchError::Http {
            provider,
            status,
            message: error_detail(&response.body),
        },
    }
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => match parsed.get("error") {
            Some(Value::Object(error)) => match error.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => Value::Object(error.clone()).to_string(),
            },
            Some(Value::String(message)) => message.clone(),
            _ => parsed.to_string(),
        },
        Err(_) => body.chars().take(ERROR_BODY_PREVIEW).collect(),
    }
}

fn host_from_url(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    enum Behaviour {
        Reply(VecDeque<HttpResponse>),
        /// Blocks until cancelled, then reports a generic abort like a browser fetch would.
        HangUntilCancelled,
    }

    pub struct MockTransport {
        behaviour: Mutex<Behaviour>,
        calls: AtomicUsize,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub fn replying(status: u16, body: impl Into<String>) -> Self {
            let mut replies = VecDeque::new();
            replies.push_back(HttpResponse {
                status,
                body: body.into(),
            });
            Self::with(Behaviour::Reply(replies))
        }

        pub fn replying_json(body: Value) -> Self {
            Self::replying(200, body.to_string())
        }

        pub fn hanging() -> Self {
            Self::with(Behaviour::HangUntilCancelled)
        }

        fn with(behaviour: Behaviour) -> Self {
            MockTransport {
                behaviour: Mutex::new(behaviour),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<HttpRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post_json(
            &self,
            request: HttpRequest,
            cancel: &CancellationToken,
        ) -> Result<HttpResponse, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            let reply = {
                let mut behaviour = self.behaviour.lock().unwrap();
                match &mut *behaviour {
                    Behaviour::Reply(replies) => Some(replies.pop_front().unwrap_or(HttpResponse {
                        status: 500,
                        body: "no more canned replies".to_string(),
                    })),
                    Behaviour::HangUntilCancelled => None,
                }
            };

            match reply {
                Some(response) => Ok(response),
                None => {
                    cancel.cancelled().await;
                    Err(SearchError::Network("The user aborted a request.".to_string()))
                }
            }
        }
    }
}
