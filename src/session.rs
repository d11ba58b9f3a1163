//! Search state owned by the front-end: settings, validation before a call,
//! the timeout policy around it, and folding results into what is shown.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::parser::{NormalizedResult, SearchResult};
use crate::permutations::split_query;
use crate::progress::{self, Kind};
use crate::providers::{ImagePayload, Provider};
use crate::search::{SearchClient, SearchMode, SearchParams, SearchQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub provider: Provider,
    pub gemini_api_key: String,
    pub xai_api_key: String,
    // Session only; never written to config.
    grok_age_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub provider: Provider,
    pub gemini_api_key: String,
    pub xai_api_key: String,
    pub age_confirmed: bool,
}

impl Settings {
    pub fn new(provider: Provider, gemini_api_key: String, xai_api_key: String) -> Self {
        Settings {
            provider,
            gemini_api_key,
            xai_api_key,
            grok_age_verified: false,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.default_provider(),
            config.gemini_api_key.clone(),
            config.xai_api_key.clone(),
        )
    }

    pub fn is_age_verified(&self) -> bool {
        self.grok_age_verified
    }

    /// Switching provider always revokes age verification.
    pub fn select_provider(&mut self, provider: Provider) {
        if provider != self.provider {
            self.provider = provider;
            self.grok_age_verified = false;
        }
    }

    pub fn save(&mut self, update: SettingsUpdate) {
        self.select_provider(update.provider);
        self.gemini_api_key = update.gemini_api_key;
        self.xai_api_key = update.xai_api_key;

        match self.provider {
            Provider::Grok if update.age_confirmed => self.grok_age_verified = true,
            Provider::Grok => {}
            Provider::Gemini => self.grok_age_verified = false,
        }
    }

    pub fn api_key(&self, provider: Provider) -> &str {
        match provider {
            Provider::Gemini => &self.gemini_api_key,
            Provider::Grok => &self.xai_api_key,
        }
    }

    /// Copies the persistable part back into `config`.
    pub fn write_to(&self, config: &mut ProviderConfig) {
        config.default = self.provider.tag().to_string();
        config.gemini_api_key = self.gemini_api_key.clone();
        config.xai_api_key = self.xai_api_key.clone();
    }
}

/// Why a search was refused before any request was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Please enter a search term or upload an image.")]
    EmptyQuery,
    #[error("{} API key is missing. Please add it in the settings.", .0.vendor())]
    MissingKey(Provider),
    #[error("You must confirm the content warning for Grok in settings before searching.")]
    AgeUnverified,
    #[error("A search is already running.")]
    Busy,
}

impl Rejection {
    pub fn opens_settings(&self) -> bool {
        matches!(self, Rejection::MissingKey(_) | Rejection::AgeUnverified)
    }
}

/// A validated search, ready to hand to [`run_search`].
#[derive(Debug, Clone)]
pub struct PendingSearch {
    params: SearchParams,
    provider: Provider,
    append: bool,
}

impl PendingSearch {
    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn append(&self) -> bool {
        self.append
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Completed(NormalizedResult),
    TimedOut(Provider),
    /// Cancelled by the user; nothing to report.
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSearch {
    pub append: bool,
    pub outcome: SearchOutcome,
}

pub fn timeout_message(provider: Provider) -> String {
    format!(
        "The search with {} took too long and was cancelled. Please try again or use the other provider.",
        provider.display_name()
    )
}

/// Runs `pending` with a timer that cancels it after `timeout`. `cancel`
/// lets the caller abort early; such aborts finish as [`SearchOutcome::Cancelled`].
pub async fn run_search(
    client: Arc<SearchClient>,
    pending: PendingSearch,
    timeout: Duration,
    cancel: CancellationToken,
) -> FinishedSearch {
    let token = cancel.child_token();
    let timed_out = Arc::new(AtomicBool::new(false));

    let timer = {
        let token = token.clone();
        let timed_out = timed_out.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timed_out.store(true, Ordering::SeqCst);
            token.cancel();
        })
    };

    let result = client.find_content(&pending.params, &token).await;
    timer.abort();

    let outcome = match result {
        Ok(result) => SearchOutcome::Completed(result),
        Err(e) if e.is_cancelled() && timed_out.load(Ordering::SeqCst) => {
            progress::log_with(Kind::Search, format!("Timed out after {}s", timeout.as_secs()));
            SearchOutcome::TimedOut(pending.provider)
        }
        Err(e) if e.is_cancelled() => SearchOutcome::Cancelled,
        Err(e) => {
            progress::log_with(Kind::Search, format!("Failed: {}", e.root()));
            SearchOutcome::Failed(e.to_string())
        }
    };

    FinishedSearch {
        append: pending.append,
        outcome,
    }
}

#[derive(Debug, Clone)]
pub struct SearchSession {
    pub settings: Settings,
    pub query: String,
    pub mode: SearchMode,
    pub image: Option<ImagePayload>,
    pub use_wildcard: bool,
    pub search_for_emails: bool,

    pub summary: String,
    pub aliases: Vec<String>,
    pub results: Vec<SearchResult>,
    pub community_links: Vec<SearchResult>,
    pub error: Option<String>,
    pub has_searched: bool,
    pub is_loading: bool,
}

impl SearchSession {
    pub fn new(settings: Settings) -> Self {
        SearchSession {
            settings,
            query: String::new(),
            mode: SearchMode::Creator,
            image: None,
            use_wildcard: false,
            search_for_emails: false,
            summary: String::new(),
            aliases: Vec::new(),
            results: Vec::new(),
            community_links: Vec::new(),
            error: None,
            has_searched: false,
            is_loading: false,
        }
    }

    /// Validates the current form and starts a fresh search.
    pub fn start_search(&mut self) -> Result<PendingSearch, Rejection> {
        self.prepare(false)
    }

    /// Adds one discovered alias to the query and searches again, keeping the
    /// results already shown. `None` if the alias is already in the query.
    pub fn alias_search(&mut self, alias: &str) -> Option<Result<PendingSearch, Rejection>> {
        let existing = lowercase_tokens(&self.query);
        if existing.contains(&alias.trim().to_lowercase()) {
            return None;
        }

        self.query = if self.query.is_empty() {
            alias.to_string()
        } else {
            format!("{}, {}", self.query, alias)
        };
        Some(self.follow_up())
    }

    /// Adds every discovered alias not yet in the query and searches again.
    pub fn add_all_aliases(&mut self) -> Option<Result<PendingSearch, Rejection>> {
        let existing = lowercase_tokens(&self.query);
        let new_aliases: Vec<&String> = self
            .aliases
            .iter()
            .filter(|alias| !existing.contains(&alias.trim().to_lowercase()))
            .collect();
        if new_aliases.is_empty() {
            return None;
        }

        let mut parts: Vec<String> = split_query(&self.query)
            .into_iter()
            .map(str::to_string)
            .collect();
        parts.extend(new_aliases.into_iter().cloned());
        self.query = parts.join(", ");
        Some(self.follow_up())
    }

    fn follow_up(&mut self) -> Result<PendingSearch, Rejection> {
        self.mode = SearchMode::Creator;
        self.image = None;
        self.prepare(true)
    }

    fn prepare(&mut self, append: bool) -> Result<PendingSearch, Rejection> {
        let rejection = if self.is_loading {
            Some(Rejection::Busy)
        } else if self.query.trim().is_empty() && self.image.is_none() {
            Some(Rejection::EmptyQuery)
        } else if self.settings.api_key(self.settings.provider).trim().is_empty() {
            Some(Rejection::MissingKey(self.settings.provider))
        } else if self.settings.provider == Provider::Grok && !self.settings.is_age_verified() {
            Some(Rejection::AgeUnverified)
        } else {
            None
        };
        if let Some(rejection) = rejection {
            self.error = Some(rejection.to_string());
            return Err(rejection);
        }

        self.is_loading = true;
        self.error = None;
        self.has_searched = true;
        if !append {
            self.summary.clear();
            self.aliases.clear();
            self.results.clear();
            self.community_links.clear();
        }

        let provider = self.settings.provider;
        let non_empty = |key: &str| Some(key.to_string()).filter(|k| !k.trim().is_empty());
        Ok(PendingSearch {
            params: SearchParams {
                provider: provider.tag().to_string(),
                query: SearchQuery {
                    text: self.query.clone(),
                    mode: self.mode,
                    image: self.image.clone(),
                    use_wildcard: self.use_wildcard,
                    search_for_emails: self.search_for_emails,
                },
                gemini_api_key: non_empty(&self.settings.gemini_api_key),
                xai_api_key: non_empty(&self.settings.xai_api_key),
                age_verified: self.settings.is_age_verified(),
            },
            provider,
            append,
        })
    }

    pub fn apply_outcome(&mut self, finished: FinishedSearch) {
        self.is_loading = false;
        match finished.outcome {
            SearchOutcome::Completed(result) => {
                self.summary = result.summary;
                self.aliases = result.aliases;
                self.community_links = result.community_links;
                if finished.append {
                    let existing: HashSet<String> =
                        self.results.iter().map(|r| r.uri.clone()).collect();
                    self.results.extend(
                        result
                            .results
                            .into_iter()
                            .filter(|r| !existing.contains(&r.uri)),
                    );
                } else {
                    self.results = result.results;
                }
            }
            SearchOutcome::TimedOut(provider) => {
                self.error = Some(timeout_message(provider));
            }
            SearchOutcome::Cancelled => {}
            SearchOutcome::Failed(message) => {
                self.error = Some(format!(
                    "An API error occurred: {}. Check your API key or try a different provider.",
                    message
                ));
            }
        }
    }
}

fn lowercase_tokens(query: &str) -> HashSet<String> {
    split_query(query)
        .into_iter()
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::MockTransport;

    fn gemini_settings() -> Settings {
        Settings::new(Provider::Gemini, "g-key".to_string(), String::new())
    }

    fn link(uri: &str) -> SearchResult {
        SearchResult {
            uri: uri.to_string(),
            title: uri.to_string(),
            thumbnail_url: None,
        }
    }

    fn completed(results: &[&str], aliases: &[&str]) -> SearchOutcome {
        SearchOutcome::Completed(NormalizedResult {
            summary: "summary".to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            results: results.iter().map(|u| link(u)).collect(),
            community_links: Vec::new(),
        })
    }

    #[test]
    fn switching_provider_revokes_age_verification() {
        let mut settings = Settings::new(Provider::Grok, String::new(), "x".to_string());
        settings.save(SettingsUpdate {
            provider: Provider::Grok,
            gemini_api_key: String::new(),
            xai_api_key: "x".to_string(),
            age_confirmed: true,
        });
        assert!(settings.is_age_verified());

        settings.select_provider(Provider::Gemini);
        assert!(!settings.is_age_verified());

        settings.select_provider(Provider::Grok);
        assert!(!settings.is_age_verified());
    }

    #[test]
    fn saving_grok_without_confirmation_keeps_existing_verification() {
        let mut settings = Settings::new(Provider::Grok, String::new(), "x".to_string());
        let mut update = SettingsUpdate {
            provider: Provider::Grok,
            gemini_api_key: String::new(),
            xai_api_key: "x".to_string(),
            age_confirmed: true,
        };
        settings.save(update.clone());
        update.age_confirmed = false;
        settings.save(update);
        assert!(settings.is_age_verified());
    }

    #[test]
    fn saving_a_provider_switch_needs_fresh_confirmation() {
        let mut settings = Settings::new(Provider::Gemini, "g".to_string(), "x".to_string());
        settings.save(SettingsUpdate {
            provider: Provider::Grok,
            gemini_api_key: "g".to_string(),
            xai_api_key: "x".to_string(),
            age_confirmed: false,
        });
        assert_eq!(settings.provider, Provider::Grok);
        assert!(!settings.is_age_verified());
    }

    #[test]
    fn settings_write_back_excludes_verification() {
        let settings = Settings::new(Provider::Grok, "g".to_string(), "x".to_string());
        let mut config = ProviderConfig::default();
        settings.write_to(&mut config);
        assert_eq!(config.default, "grok");
        assert_eq!(config.xai_api_key, "x");
        assert_eq!(Settings::from_config(&config), settings);
    }

    #[test]
    fn validation_runs_in_order() {
        let mut session = SearchSession::new(Settings::new(Provider::Grok, String::new(), String::new()));
        assert_eq!(session.start_search().unwrap_err(), Rejection::EmptyQuery);
        assert_eq!(
            session.error.as_deref(),
            Some("Please enter a search term or upload an image.")
        );

        session.query = "artist".to_string();
        let missing = session.start_search().unwrap_err();
        assert_eq!(missing, Rejection::MissingKey(Provider::Grok));
        assert!(missing.opens_settings());
        assert_eq!(
            missing.to_string(),
            "xAI API key is missing. Please add it in the settings."
        );

        session.settings.xai_api_key = "x".to_string();
        assert_eq!(session.start_search().unwrap_err(), Rejection::AgeUnverified);
        assert!(!session.is_loading);
    }

    #[test]
    fn image_alone_is_enough_to_search() {
        let mut session = SearchSession::new(gemini_settings());
        session.image = Some(ImagePayload {
            mime_type: "image/png".to_string(),
            data: "AA==".to_string(),
        });
        let pending = session.start_search().unwrap();
        assert_eq!(pending.provider(), Provider::Gemini);
        assert!(session.is_loading);
        assert_eq!(session.start_search().unwrap_err(), Rejection::Busy);
    }

    #[test]
    fn fresh_search_replaces_and_follow_up_appends() {
        let mut session = SearchSession::new(gemini_settings());
        session.query = "artist".to_string();
        let pending = session.start_search().unwrap();
        assert!(!pending.append());
        session.apply_outcome(FinishedSearch {
            append: false,
            outcome: completed(&["https://a", "https://b"], &["Alt_Name", "artist"]),
        });
        assert_eq!(session.results.len(), 2);

        let pending = session.alias_search("Alt_Name").unwrap().unwrap();
        assert!(pending.append());
        assert_eq!(session.query, "artist, Alt_Name");
        session.apply_outcome(FinishedSearch {
            append: true,
            outcome: completed(&["https://b", "https://c"], &[]),
        });
        let uris: Vec<&str> = session.results.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn alias_already_in_query_is_ignored() {
        let mut session = SearchSession::new(gemini_settings());
        session.query = "Artist, other".to_string();
        assert!(session.alias_search("artist").is_none());
        assert_eq!(session.query, "Artist, other");
    }

    #[test]
    fn alias_follow_up_resets_mode_and_image() {
        let mut session = SearchSession::new(gemini_settings());
        session.query = "Some Work".to_string();
        session.mode = SearchMode::Work;
        session.image = Some(ImagePayload {
            mime_type: "image/png".to_string(),
            data: String::new(),
        });
        session.alias_search("creator_x").unwrap().unwrap();
        assert_eq!(session.mode, SearchMode::Creator);
        assert!(session.image.is_none());
    }

    #[test]
    fn add_all_aliases_skips_known_ones() {
        let mut session = SearchSession::new(gemini_settings());
        session.query = "one,  Two".to_string();
        session.aliases = vec!["two".to_string(), "three".to_string(), "Four".to_string()];
        session.add_all_aliases().unwrap().unwrap();
        assert_eq!(session.query, "one, Two, three, Four");

        session.is_loading = false;
        session.aliases = vec!["ONE".to_string()];
        assert!(session.add_all_aliases().is_none());
    }

    #[test]
    fn failures_and_timeouts_set_messages_but_cancellation_is_silent() {
        let mut session = SearchSession::new(gemini_settings());
        session.apply_outcome(FinishedSearch {
            append: false,
            outcome: SearchOutcome::TimedOut(Provider::Gemini),
        });
        assert_eq!(
            session.error.as_deref(),
            Some("The search with Gemini took too long and was cancelled. Please try again or use the other provider.")
        );

        session.apply_outcome(FinishedSearch {
            append: false,
            outcome: SearchOutcome::Cancelled,
        });
        assert!(session.error.as_deref().unwrap().contains("took too long"));

        session.apply_outcome(FinishedSearch {
            append: false,
            outcome: SearchOutcome::Failed("boom".to_string()),
        });
        assert_eq!(
            session.error.as_deref(),
            Some("An API error occurred: boom. Check your API key or try a different provider.")
        );
    }

    #[tokio::test]
    async fn timer_cancellation_becomes_a_timeout() {
        let mut session = SearchSession::new(gemini_settings());
        session.query = "artist".to_string();
        let pending = session.start_search().unwrap();

        let transport = Arc::new(MockTransport::hanging());
        let client = Arc::new(SearchClient::new(transport.clone()));
        let finished = run_search(
            client,
            pending,
            Duration::from_millis(30),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(finished.outcome, SearchOutcome::TimedOut(Provider::Gemini));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn user_cancellation_is_not_a_timeout() {
        let mut session = SearchSession::new(gemini_settings());
        session.query = "artist".to_string();
        let pending = session.start_search().unwrap();

        let client = Arc::new(SearchClient::new(Arc::new(MockTransport::hanging())));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let finished = run_search(client, pending, Duration::from_secs(30), cancel).await;
        assert_eq!(finished.outcome, SearchOutcome::Cancelled);
    }

    #[tokio::test]
    async fn successful_search_completes() {
        let mut session = SearchSession::new(Settings::new(Provider::Grok, String::new(), "x".to_string()));
        session.settings.save(SettingsUpdate {
            provider: Provider::Grok,
            gemini_api_key: String::new(),
            xai_api_key: "x".to_string(),
            age_confirmed: true,
        });
        session.query = "artist".to_string();
        let pending = session.start_search().unwrap();

        let content = json!({
            "summary": "done",
            "aliases": ["a2"],
            "results": [{"uri": "https://x.com/artist", "title": "X"}],
            "communityLinks": []
        });
        let transport = Arc::new(MockTransport::replying_json(json!({
            "choices": [{ "message": { "content": content.to_string() } }]
        })));
        let client = Arc::new(SearchClient::new(transport.clone()));
        let finished = run_search(client, pending, Duration::from_secs(5), CancellationToken::new()).await;
        session.apply_outcome(finished);

        assert!(!session.is_loading);
        assert_eq!(session.summary, "done");
        assert_eq!(session.aliases, vec!["a2"]);
        assert_eq!(session.results.len(), 1);
        let brief = transport.last_request().unwrap().body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(brief.contains("PRIORITY DIRECTIVE"));
    }

    #[tokio::test]
    async fn backend_errors_become_failed_outcomes() {
        let mut session = SearchSession::new(gemini_settings());
        session.query = "artist".to_string();
        let pending = session.start_search().unwrap();

        let client = Arc::new(SearchClient::new(Arc::new(MockTransport::replying(
            500,
            r#"{"error":{"message":"backend down"}}"#,
        ))));
        let finished = run_search(client, pending, Duration::from_secs(5), CancellationToken::new()).await;
        assert_eq!(
            finished.outcome,
            SearchOutcome::Failed(
                "Failed to fetch data from gemini API. Gemini API error (500): backend down".to_string()
            )
        );

        session.apply_outcome(finished);
        assert!(session.error.as_deref().unwrap().starts_with("An API error occurred: Failed to fetch"));
    }
}
