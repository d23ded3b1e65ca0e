// =============================================================================
// public_search.rs — THE FREE SEATS AT THE BACK OF THE COURTROOM
// =============================================================================
//
// A public legal-document search engine indexes judgments and orders from
// every court in the country and asks for nothing in return. No CAPTCHA.
// No session. No cookies. Just a query and an answer, like the internet
// was supposed to work.
//
// The catch: it's a DOCUMENT index, not a case-status system. It can tell
// you a case exists and roughly where, but it has no hearing history, no
// next-hearing date, no live status. So this provider is search-only — its
// descriptor says supports_status_lookup: false, and get_status answers
// None without apology. Anyone treating it as a status source is holding
// it wrong, and now the type system agrees.
//
// Each result carries a free-text "document source" label ("Supreme Court
// of India", "Kerala High Court", "NCDRC"...). We infer the court category
// from that label with an ordered multi-pattern keyword scan — checked
// most-specific-first, because "Supreme Court" must win before "court"
// means anything, and an unrecognizable label defaults to DistrictCourt,
// the statistically safe guess.
// =============================================================================

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::Config;
use crate::extract::clean_fragment;
use crate::models::{
    CaseIdentifier, CaseSnapshot, CourtCategory, ProviderKind, SearchQuery, SearchResult,
};
use crate::providers::{CourtProvider, ProviderDescriptor, ProviderError};

// =============================================================================
// Category inference automatons
// =============================================================================
// One automaton per category bucket, checked IN ORDER. The order is the
// semantics: a label matching both "supreme court" and "court" is a
// Supreme Court label. Don't reorder these.
// =============================================================================

static SUPREME_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["supreme court", "sci "]) // trailing space so "disciplinary" doesn't become a court
        .expect("failed to build supreme-court automaton")
});

static HIGH_COURT_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["high court", "hc "])
        .expect("failed to build high-court automaton")
});

static TRIBUNAL_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "tribunal",
            "nclt",
            "nclat",
            "company law",
            "appellate board",
            "itat",
        ])
        .expect("failed to build tribunal automaton")
});

static CONSUMER_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "consumer",
            "ncdrc",
            "district commission",
            "state commission",
        ])
        .expect("failed to build consumer automaton")
});

/// Infer a court category from a free-text document-source label.
/// Ordered: Supreme Court, High Court, Tribunal, Consumer Forum, and
/// DistrictCourt as the default when nothing rings a bell.
pub(crate) fn infer_category(source_label: &str) -> CourtCategory {
    // Cheap pre-check: an empty or tag-only label goes straight to the
    // default without waking four automatons.
    if source_label.trim().is_empty() {
        return CourtCategory::DistrictCourt;
    }

    if SUPREME_AUTOMATON.is_match(source_label) {
        CourtCategory::SupremeCourt
    } else if HIGH_COURT_AUTOMATON.is_match(source_label) {
        CourtCategory::HighCourt
    } else if TRIBUNAL_AUTOMATON.is_match(source_label) {
        CourtCategory::Tribunal
    } else if CONSUMER_AUTOMATON.is_match(source_label) {
        CourtCategory::ConsumerForum
    } else {
        CourtCategory::DistrictCourt
    }
}

/// The search engine's response: a list of docs, each with a title (which
/// arrives with <b> highlighting baked in), a source label, and a snippet.
#[derive(Debug, Default, Deserialize)]
struct PublicSearchResponse {
    #[serde(default)]
    docs: Option<Vec<PublicDoc>>,
}

#[derive(Debug, Default, Deserialize)]
struct PublicDoc {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    docsource: Option<String>,
    #[serde(default)]
    headline: Option<String>,
}

/// The public search adapter. Search-grade summaries only, by design and
/// by descriptor.
pub struct PublicCaseSearchProvider {
    client: reqwest::Client,
    base_url: String,
}

impl PublicCaseSearchProvider {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to build public-search HTTP client");
        Self {
            client,
            base_url: config.public_search_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CourtProvider for PublicCaseSearchProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::PublicSearch,
            supports_registry_lookup: false,
            // Search only. A document index has no live case status to give.
            supports_status_lookup: false,
        }
    }

    async fn search_by_party(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let url = format!(
            "{}/search/?formInput={}&pagenum=0",
            self.base_url,
            urlencoding::encode(query.party_name.trim())
        );

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "search engine returned HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: PublicSearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("malformed JSON: {e}")))?;

        let docs = parsed.docs.unwrap_or_default();
        debug!(count = docs.len(), party = %query.party_name, "public search: docs received");

        let mut results: Vec<SearchResult> = docs
            .into_iter()
            .filter_map(|doc| {
                // Titles arrive with <b> highlight tags around the match.
                let title = clean_fragment(&doc.title.unwrap_or_default());
                if title.is_empty() {
                    return None;
                }
                let source_label = clean_fragment(&doc.docsource.unwrap_or_default());
                let category = infer_category(&source_label);
                let (petitioner, respondent) =
                    super::supreme_court::split_title_parties(&title);
                let _ = doc.headline; // snippet text — search UI concern, not ours

                Some(SearchResult {
                    title,
                    case_number: None,
                    case_year: None,
                    case_type: None,
                    category,
                    court_name: if source_label.is_empty() {
                        None
                    } else {
                        Some(source_label)
                    },
                    court_code: None,
                    cnr: None,
                    status: None,
                    petitioner,
                    respondent,
                    source: ProviderKind::PublicSearch,
                })
            })
            .collect();

        // Honor the caller's category filter when one was given: a user
        // searching High Court cases doesn't want tribunal judgments.
        if let Some(wanted) = query.category {
            results.retain(|r| r.category == wanted);
        }

        Ok(results)
    }

    /// Not a status source. Answer immediately, touch nothing.
    async fn get_status(
        &self,
        _identifier: &CaseIdentifier,
    ) -> Result<Option<CaseSnapshot>, ProviderError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supreme_court_label_wins_first() {
        assert_eq!(
            infer_category("Supreme Court of India"),
            CourtCategory::SupremeCourt
        );
        // "court" alone must not shadow the specific match.
        assert_eq!(
            infer_category("SUPREME COURT OF INDIA - DIVISION BENCH"),
            CourtCategory::SupremeCourt
        );
    }

    #[test]
    fn high_court_labels() {
        assert_eq!(infer_category("Kerala High Court"), CourtCategory::HighCourt);
        assert_eq!(
            infer_category("HIGH COURT OF JUDICATURE AT BOMBAY"),
            CourtCategory::HighCourt
        );
    }

    #[test]
    fn tribunal_labels() {
        assert_eq!(
            infer_category("National Company Law Tribunal"),
            CourtCategory::Tribunal
        );
        assert_eq!(infer_category("NCLAT New Delhi"), CourtCategory::Tribunal);
        assert_eq!(
            infer_category("Income Tax Appellate Tribunal - ITAT"),
            CourtCategory::Tribunal
        );
    }

    #[test]
    fn consumer_labels() {
        assert_eq!(infer_category("NCDRC"), CourtCategory::ConsumerForum);
        assert_eq!(
            infer_category("State Consumer Disputes Redressal Commission"),
            CourtCategory::ConsumerForum
        );
    }

    #[test]
    fn unrecognizable_label_defaults_to_district() {
        assert_eq!(
            infer_category("Principal Sessions Judge, Ernakulam"),
            CourtCategory::DistrictCourt
        );
        assert_eq!(infer_category(""), CourtCategory::DistrictCourt);
        assert_eq!(infer_category("Some Random Registry"), CourtCategory::DistrictCourt);
    }

    #[test]
    fn search_response_parses_and_titles_lose_their_bold_tags() {
        let json = r#"{
            "docs": [
                {"title": "<b>Ravi Kumar</b> vs State of Kerala", "docsource": "Kerala High Court", "headline": "snippet..."},
                {"title": "M/s Acme Ltd vs Registrar", "docsource": "National Company Law Tribunal"}
            ]
        }"#;
        let parsed: PublicSearchResponse = serde_json::from_str(json).unwrap();
        let docs = parsed.docs.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            clean_fragment(docs[0].title.as_deref().unwrap()),
            "Ravi Kumar vs State of Kerala"
        );
        assert_eq!(
            infer_category(docs[1].docsource.as_deref().unwrap()),
            CourtCategory::Tribunal
        );
    }
}
