use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SearchError;
use crate::progress::{self, Kind};
use crate::providers::{Provider, RawBackendResponse};

pub const INVALID_SUMMARY: &str = "The AI returned an invalid summary.";

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("fence pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub uri: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub summary: String,
    pub aliases: Vec<String>,
    pub results: Vec<SearchResult>,
    pub community_links: Vec<SearchResult>,
}

/// What leniency threw away while normalizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub dropped_results: usize,
    pub dropped_community_links: usize,
    pub duplicate_community_links: usize,
}

impl NormalizeReport {
    pub fn total_dropped(&self) -> usize {
        self.dropped_results + self.dropped_community_links + self.duplicate_community_links
    }
}

#[derive(Clone, Copy)]
enum Scheme {
    /// `http…` or `mailto:`
    ResultLink,
    /// `http…` only
    CommunityLink,
}

impl Scheme {
    fn accepts(self, uri: &str) -> bool {
        match self {
            Scheme::ResultLink => uri.starts_with("http") || uri.starts_with("mailto:"),
            Scheme::CommunityLink => uri.starts_with("http"),
        }
    }
}

/// Body of the first ```json fence in `text`, if any.
pub fn extract_json_fence(text: &str) -> Option<&str> {
    JSON_FENCE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
}

#[cfg(test)]
pub fn normalize(raw: &RawBackendResponse, provider: Provider) -> Result<NormalizedResult, SearchError> {
    normalize_with_report(raw, provider).map(|(result, _)| result)
}

/// Turns raw backend output into a [`NormalizedResult`]. Only a missing or
/// unparseable payload is an error; malformed entries are dropped and counted.
pub fn normalize_with_report(
    raw: &RawBackendResponse,
    provider: Provider,
) -> Result<(NormalizedResult, NormalizeReport), SearchError> {
    let payload = match provider {
        Provider::Gemini => {
            let fenced = extract_json_fence(&raw.text).ok_or_else(|| {
                debug_eprintln!("[Parse] No ```json fence in {} chars of output", raw.text.len());
                SearchError::Format
            })?;
            parse_object(fenced)?
        }
        Provider::Grok => parse_object(raw.text.trim())?,
    };

    let mut report = NormalizeReport::default();

    let summary = match payload.get("summary") {
        Some(Value::String(summary)) => summary.clone(),
        _ => INVALID_SUMMARY.to_string(),
    };

    let aliases = match payload.get("aliases") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let (results, dropped) = link_entries(payload.get("results"), Scheme::ResultLink);
    report.dropped_results = dropped;

    let community_candidates = match provider {
        // Citations come from grounding metadata, not from the model's own JSON.
        Provider::Gemini => raw.grounding.clone(),
        Provider::Grok => {
            let (links, dropped) = link_entries(payload.get("communityLinks"), Scheme::CommunityLink);
            report.dropped_community_links = dropped;
            links
        }
    };

    let result_uris: HashSet<&str> = results.iter().map(|r| r.uri.as_str()).collect();
    let before = community_candidates.len();
    let community_links: Vec<SearchResult> = community_candidates
        .into_iter()
        .filter(|link| !result_uris.contains(link.uri.as_str()))
        .collect();
    report.duplicate_community_links = before - community_links.len();

    if report.total_dropped() > 0 {
        progress::log_with(
            Kind::Parse,
            format!(
                "Dropped {} malformed result(s), {} malformed community link(s), {} duplicate(s)",
                report.dropped_results, report.dropped_community_links, report.duplicate_community_links
            ),
        );
    }

    Ok((
        NormalizedResult {
            summary,
            aliases,
            results,
            community_links,
        },
        report,
    ))
}

fn parse_object(text: &str) -> Result<Map<String, Value>, SearchError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => {
            debug_eprintln!("[Parse] Payload is JSON but not an object: {}", other);
            Err(SearchError::Format)
        }
        Err(e) => {
            debug_eprintln!("[Parse] Failed to parse JSON from AI response: {}", e);
            Err(SearchError::Format)
        }
    }
}

/// Keeps array entries whose `uri` is a string in an accepted scheme.
/// Returns the survivors and how many were dropped.
fn link_entries(value: Option<&Value>, scheme: Scheme) -> (Vec<SearchResult>, usize) {
    let Some(Value::Array(items)) = value else {
        return (Vec::new(), 0);
    };

    let links: Vec<SearchResult> = items
        .iter()
        .filter_map(|item| {
            let uri = item.get("uri").and_then(Value::as_str)?;
            if !scheme.accepts(uri) {
                return None;
            }
            let title = item
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(uri)
                .to_string();
            let thumbnail_url = item
                .get("thumbnailUrl")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(SearchResult {
                uri: uri.to_string(),
                title,
                thumbnail_url,
            })
        })
        .collect();

    let dropped = items.len() - links.len();
    (links, dropped)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn grok(body: Value) -> RawBackendResponse {
        RawBackendResponse {
            text: body.to_string(),
            grounding: Vec::new(),
        }
    }

    fn gemini(text: &str, grounding: Vec<SearchResult>) -> RawBackendResponse {
        RawBackendResponse {
            text: text.to_string(),
            grounding,
        }
    }

    fn link(uri: &str, title: &str) -> SearchResult {
        SearchResult {
            uri: uri.to_string(),
            title: title.to_string(),
            thumbnail_url: None,
        }
    }

    #[test]
    fn overlapping_community_link_is_removed() {
        let raw = grok(json!({
            "summary": "found",
            "aliases": [],
            "results": [{"uri": "https://x.com/a", "title": "A"}],
            "communityLinks": [{"uri": "https://x.com/a", "title": "dup"}]
        }));
        let (result, report) = normalize_with_report(&raw, Provider::Grok).unwrap();
        assert_eq!(result.results, vec![link("https://x.com/a", "A")]);
        assert!(result.community_links.is_empty());
        assert_eq!(report.duplicate_community_links, 1);
    }

    #[test]
    fn bad_scheme_entries_are_dropped() {
        let raw = grok(json!({
            "summary": "s",
            "results": [
                {"uri": "ftp://bad", "title": "bad"},
                {"uri": "https://good.example", "title": "good"},
                {"uri": "mailto:someone@example.com", "title": "mail"},
                {"title": "no uri"},
                {"uri": 7},
                "not an object"
            ]
        }));
        let (result, report) = normalize_with_report(&raw, Provider::Grok).unwrap();
        let uris: Vec<&str> = result.results.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["https://good.example", "mailto:someone@example.com"]);
        assert_eq!(report.dropped_results, 4);
    }

    #[test]
    fn community_links_reject_mailto() {
        let raw = grok(json!({
            "summary": "s",
            "communityLinks": [
                {"uri": "mailto:a@b.c", "title": "mail"},
                {"uri": "https://reddit.com/r/x", "title": "thread"}
            ]
        }));
        let result = normalize(&raw, Provider::Grok).unwrap();
        assert_eq!(result.community_links, vec![link("https://reddit.com/r/x", "thread")]);
    }

    #[test]
    fn missing_fields_are_coerced() {
        let raw = grok(json!({ "results": "nope", "communityLinks": {} }));
        let result = normalize(&raw, Provider::Grok).unwrap();
        assert_eq!(result.summary, INVALID_SUMMARY);
        assert!(result.aliases.is_empty());
        assert!(result.results.is_empty());
        assert!(result.community_links.is_empty());
    }

    #[test]
    fn non_string_aliases_are_skipped() {
        let raw = grok(json!({ "summary": "s", "aliases": ["one", 2, null, "two"] }));
        assert_eq!(normalize(&raw, Provider::Grok).unwrap().aliases, vec!["one", "two"]);
    }

    #[test]
    fn optional_fields_of_entries() {
        let raw = grok(json!({
            "summary": "s",
            "results": [
                {"uri": "https://a.example", "thumbnailUrl": "https://a.example/t.png"},
                {"uri": "https://b.example", "title": "B", "thumbnailUrl": 3}
            ]
        }));
        let result = normalize(&raw, Provider::Grok).unwrap();
        assert_eq!(result.results[0].title, "https://a.example");
        assert_eq!(
            result.results[0].thumbnail_url.as_deref(),
            Some("https://a.example/t.png")
        );
        assert_eq!(result.results[1].thumbnail_url, None);
    }

    #[test]
    fn gemini_without_fence_is_a_format_error() {
        let raw = gemini(r#"{"summary": "raw json but unfenced"}"#, Vec::new());
        assert!(matches!(
            normalize(&raw, Provider::Gemini),
            Err(SearchError::Format)
        ));
    }

    #[test]
    fn gemini_with_broken_fence_is_a_format_error() {
        let raw = gemini("text\n```json\n{ not json }\n```", Vec::new());
        assert!(matches!(
            normalize(&raw, Provider::Gemini),
            Err(SearchError::Format)
        ));
    }

    #[test]
    fn gemini_fence_after_narrative_is_parsed() {
        let text = "I searched everywhere.\n\n```json\n{\n  \"summary\": \"Artist found\",\n  \"aliases\": [\"alt\"],\n  \"results\": [{\"uri\": \"https://insta.example/a\", \"title\": \"IG\"}]\n}\n```";
        let grounding = vec![
            link("https://insta.example/a", "same as result"),
            link("https://blog.example/post", "Blog"),
        ];
        let (result, report) = normalize_with_report(&gemini(text, grounding), Provider::Gemini).unwrap();
        assert_eq!(result.summary, "Artist found");
        assert_eq!(result.aliases, vec!["alt"]);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.community_links, vec![link("https://blog.example/post", "Blog")]);
        assert_eq!(report.duplicate_community_links, 1);
    }

    #[test]
    fn gemini_ignores_community_links_inside_fence() {
        let text = "```json\n{\"summary\": \"s\", \"communityLinks\": [{\"uri\": \"https://c.example\", \"title\": \"c\"}]}\n```";
        let result = normalize(&gemini(text, Vec::new()), Provider::Gemini).unwrap();
        assert!(result.community_links.is_empty());
    }

    #[test]
    fn grok_body_must_be_an_object() {
        assert!(matches!(
            normalize(&grok(json!(["summary"])), Provider::Grok),
            Err(SearchError::Format)
        ));
        let garbage = RawBackendResponse {
            text: "Sure! Here you go".to_string(),
            grounding: Vec::new(),
        };
        assert!(matches!(normalize(&garbage, Provider::Grok), Err(SearchError::Format)));
    }

    #[test]
    fn result_serializes_with_camel_case_keys() {
        let result = NormalizedResult {
            summary: "s".to_string(),
            aliases: vec![],
            results: vec![link("https://a", "a")],
            community_links: vec![],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("communityLinks").is_some());
        assert!(value["results"][0].get("thumbnailUrl").is_none());
    }
}
