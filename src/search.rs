use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::SearchError;
use crate::parser::{self, NormalizedResult};
use crate::permutations;
use crate::progress::{self, Kind};
use crate::prompt;
use crate::providers::{
    GeminiAdapter, GrokAdapter, ImagePayload, Provider, ProviderAdapter, Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Creator,
    Work,
}

impl SearchMode {
    pub fn toggled(self) -> Self {
        match self {
            SearchMode::Creator => SearchMode::Work,
            SearchMode::Work => SearchMode::Creator,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Creator => f.write_str("creator"),
            SearchMode::Work => f.write_str("work"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub mode: SearchMode,
    pub image: Option<ImagePayload>,
    pub use_wildcard: bool,
    pub search_for_emails: bool,
}

/// Everything one backend call needs. `provider` is the raw tag so that an
/// unrecognized value can be rejected here rather than defaulted upstream.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub provider: String,
    pub query: SearchQuery,
    pub gemini_api_key: Option<String>,
    pub xai_api_key: Option<String>,
    pub age_verified: bool,
}

impl SearchParams {
    fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini_api_key.as_deref(),
            Provider::Grok => self.xai_api_key.as_deref(),
        }
    }
}

/// Single entry point over both backends.
pub struct SearchClient {
    gemini: GeminiAdapter,
    grok: GrokAdapter,
}

impl SearchClient {
    #[cfg(test)]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, &ProviderConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: &ProviderConfig) -> Self {
        SearchClient {
            gemini: GeminiAdapter::with_config(
                transport.clone(),
                config.gemini_api_base.clone(),
                config.gemini_model.clone(),
            ),
            grok: GrokAdapter::with_config(
                transport,
                config.xai_endpoint.clone(),
                config.xai_model.clone(),
            ),
        }
    }

    fn adapter(&self, provider: Provider) -> &dyn ProviderAdapter {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::Grok => &self.grok,
        }
    }

    /// Builds the brief, calls the selected backend and normalizes its reply.
    ///
    /// Cancellation and configuration errors come back as-is; everything else
    /// is wrapped with the provider name.
    pub async fn find_content(
        &self,
        params: &SearchParams,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult, SearchError> {
        let provider: Provider = params.provider.parse()?;

        self.dispatch(provider, params, cancel)
            .await
            .map_err(|e| match e {
                passthrough if passthrough.is_cancelled() || passthrough.is_configuration() => {
                    passthrough
                }
                other => {
                    debug_eprintln!("Error calling {} API: {}", provider, other);
                    SearchError::Provider {
                        provider,
                        source: Box::new(other),
                    }
                }
            })
    }

    async fn dispatch(
        &self,
        provider: Provider,
        params: &SearchParams,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult, SearchError> {
        let adapter = self.adapter(provider);
        let permutations = permutations::generate(&params.query.text);
        let brief = prompt::build_brief(
            adapter.provider(),
            &params.query,
            params.age_verified,
            &permutations,
        );

        progress::log_with(
            Kind::Search,
            format!(
                "{} search ({}) with {} username candidate(s)",
                provider.display_name(),
                params.query.mode,
                permutations.len()
            ),
        );

        let raw = adapter
            .call(
                &brief,
                params.query.image.as_ref(),
                params.api_key(provider),
                cancel,
            )
            .await?;

        let (result, report) = parser::normalize_with_report(&raw, provider)?;
        progress::log_with(
            Kind::Search,
            format!(
                "{} result(s), {} alias(es), {} community link(s); {} entr(ies) discarded",
                result.results.len(),
                result.aliases.len(),
                result.community_links.len(),
                report.total_dropped()
            ),
        );
        Ok(result)
    }
}
