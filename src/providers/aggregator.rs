// =============================================================================
// aggregator.rs — THE ONE UPSTREAM THAT SENDS JSON ON PURPOSE
// =============================================================================
//
// A paid legal-data API that sits in front of the court records and serves
// them as honest JSON. No cookies, no CSRF, no CAPTCHA, no markup
// archaeology. You send an API key, you get a case. It's beautiful. It's
// also metered, which is why it's the fallback and not the front line.
//
// Two quirks worth knowing:
//
// 1. The API's field names drift between deployments and versions —
//    "title" vs "case_title", "next_hearing_date" vs "next_date". We paper
//    over all of it with serde aliases, so the drift dies at the
//    deserializer and never reaches the rest of the engine.
//
// 2. A 200 response can still carry an explicit "error" field ("case not
//    found", "invalid case number"). That is a NOT FOUND, not a transport
//    failure — the provider answers None and the orchestrator moves on
//    without logging a scary stack of nothing.
//
// No API key configured = the provider politely sits out every call.
// =============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{
    CaseIdentifier, CaseSnapshot, CourtCategory, HearingEntry, OrderEntry, ProviderKind,
    SearchQuery, SearchResult,
};
use crate::providers::{CourtProvider, ProviderDescriptor, ProviderError};

/// The wire shape of a case, with aliases for every spelling we've met.
/// Everything optional: the API omits what it doesn't know, and so do we.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiCase {
    #[serde(default)]
    error: Option<String>,

    #[serde(default, alias = "case_title", alias = "cause_title")]
    title: Option<String>,
    #[serde(default, alias = "case_status", alias = "stage")]
    status: Option<String>,
    #[serde(default, alias = "petitioner_name")]
    petitioner: Option<String>,
    #[serde(default, alias = "respondent_name")]
    respondent: Option<String>,
    #[serde(default, alias = "petitioner_advocate_name")]
    petitioner_advocate: Option<String>,
    #[serde(default, alias = "respondent_advocate_name")]
    respondent_advocate: Option<String>,
    #[serde(default, alias = "judge", alias = "coram", alias = "bench")]
    judges: Option<String>,
    #[serde(default, alias = "date_of_filing")]
    filing_date: Option<String>,
    #[serde(default, alias = "date_of_registration")]
    registration_date: Option<String>,
    #[serde(default, alias = "date_of_decision", alias = "disposal_date")]
    decision_date: Option<String>,
    #[serde(default, alias = "next_date", alias = "next_hearing")]
    next_hearing_date: Option<String>,
    #[serde(default, alias = "last_order_date")]
    order_date: Option<String>,
    #[serde(default, alias = "last_order_summary")]
    order_summary: Option<String>,
    #[serde(default, alias = "history", alias = "hearings")]
    hearing_history: Option<Vec<ApiHearing>>,
    #[serde(default, alias = "order_list")]
    orders: Option<Vec<ApiOrder>>,
    #[serde(default, alias = "acts", alias = "under_acts")]
    acts_cited: Option<Vec<String>>,
    #[serde(default, alias = "cnr_number", alias = "cino")]
    cnr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiHearing {
    #[serde(default, alias = "hearing_date", alias = "business_date")]
    date: Option<String>,
    #[serde(default, alias = "business", alias = "purpose_of_hearing")]
    purpose: Option<String>,
    #[serde(default, alias = "court_no")]
    court_room: Option<String>,
    #[serde(default, alias = "judge_name")]
    judge: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiOrder {
    #[serde(default, alias = "order_date")]
    date: Option<String>,
    #[serde(default, alias = "order_type", alias = "type")]
    kind: Option<String>,
    #[serde(default, alias = "order_summary")]
    summary: Option<String>,
    #[serde(default, alias = "pdf_url", alias = "order_url", alias = "document_link")]
    document_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, alias = "cases", alias = "data")]
    results: Option<Vec<ApiSearchHit>>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSearchHit {
    #[serde(default, alias = "case_title", alias = "cause_title")]
    title: Option<String>,
    #[serde(default, alias = "case_number")]
    number: Option<String>,
    #[serde(default, alias = "year")]
    case_year: Option<String>,
    #[serde(default, alias = "type")]
    case_type: Option<String>,
    #[serde(default)]
    court: Option<String>,
    #[serde(default, alias = "case_status")]
    status: Option<String>,
    #[serde(default, alias = "cnr_number", alias = "cino")]
    cnr: Option<String>,
}

/// The aggregator API adapter.
pub struct LegalAggregatorApiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LegalAggregatorApiProvider {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .expect("failed to build aggregator HTTP client");
        Self {
            client,
            base_url: config.aggregator_base_url.trim_end_matches('/').to_string(),
            api_key: config.aggregator_api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Category -> endpoint path segment. Fixed mapping, no discovery.
    fn category_path(category: CourtCategory) -> &'static str {
        match category {
            CourtCategory::SupremeCourt => "supreme-court",
            CourtCategory::HighCourt => "high-court",
            CourtCategory::DistrictCourt => "district-court",
            CourtCategory::Tribunal => "tribunal",
            CourtCategory::ConsumerForum => "consumer-forum",
        }
    }

    async fn fetch_case(
        &self,
        url: String,
        query: Vec<(&'static str, String)>,
        identifier: &CaseIdentifier,
    ) -> Result<Option<CaseSnapshot>, ProviderError> {
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", self.api_key.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        // A 404 from this API means exactly what it says.
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "aggregator returned HTTP {}",
                status.as_u16()
            )));
        }

        let case: ApiCase = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("malformed JSON: {e}")))?;

        if let Some(error) = &case.error {
            debug!(error = %error, case = %identifier, "aggregator: error field in body — treating as not found");
            return Ok(None);
        }

        Ok(Some(snapshot_from_api(case, identifier)))
    }
}

/// Lower an ApiCase into the canonical snapshot. Pure, so it's testable
/// without an API key or a network.
pub(crate) fn snapshot_from_api(case: ApiCase, identifier: &CaseIdentifier) -> CaseSnapshot {
    let mut snap = CaseSnapshot::empty();

    snap.title = case.title.unwrap_or_default();
    snap.status = case.status.unwrap_or_default();
    snap.petitioner = clean(case.petitioner);
    snap.respondent = clean(case.respondent);
    snap.petitioner_advocate = clean(case.petitioner_advocate);
    snap.respondent_advocate = clean(case.respondent_advocate);
    snap.judges = clean(case.judges);
    snap.filing_date = clean(case.filing_date);
    snap.registration_date = clean(case.registration_date);
    snap.decision_date = clean(case.decision_date);
    snap.next_hearing_date = clean(case.next_hearing_date);
    snap.last_order_date = clean(case.order_date);
    snap.last_order_summary = clean(case.order_summary);

    for hearing in case.hearing_history.unwrap_or_default() {
        snap.hearing_history.push(HearingEntry {
            date: hearing.date.unwrap_or_default(),
            purpose: hearing.purpose.unwrap_or_default(),
            court_room: clean(hearing.court_room),
            judge: clean(hearing.judge),
        });
    }
    for order in case.orders.unwrap_or_default() {
        snap.orders.push(OrderEntry {
            date: order.date.unwrap_or_default(),
            order_type: order.kind.unwrap_or_else(|| "Order".to_string()),
            summary: clean(order.summary),
            document_url: clean(order.document_url),
        });
    }
    if snap.last_order_date.is_none() {
        if let Some(last) = snap.orders.last() {
            snap.last_order_date = clean(Some(last.date.clone()));
            snap.last_order_summary = last.summary.clone();
        }
    }
    snap.acts_cited = case.acts_cited.filter(|acts| !acts.is_empty());

    snap.normalize_status();
    snap.ensure_title(identifier);
    snap
}

fn clean(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[async_trait]
impl CourtProvider for LegalAggregatorApiProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::AggregatorApi,
            supports_registry_lookup: true,
            supports_status_lookup: true,
        }
    }

    async fn search_by_party(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        if !self.is_configured() {
            debug!("aggregator: no API key — sitting out the search");
            return Ok(Vec::new());
        }

        let url = format!("{}/search", self.base_url);
        let mut params: Vec<(&str, String)> = vec![("party", query.party_name.clone())];
        if let Some(category) = query.category {
            params.push(("court", Self::category_path(category).to_string()));
        }
        if let Some(year) = &query.year {
            params.push(("year", year.clone()));
        }

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", self.api_key.clone())
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "aggregator returned HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: ApiSearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("malformed JSON: {e}")))?;

        if let Some(error) = &parsed.error {
            warn!(error = %error, "aggregator: search error field — returning empty");
            return Ok(Vec::new());
        }

        let hits = parsed.results.unwrap_or_default();
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let title = hit.title?.trim().to_string();
                if title.is_empty() {
                    return None;
                }
                let (petitioner, respondent) =
                    super::supreme_court::split_title_parties(&title);
                Some(SearchResult {
                    title,
                    case_number: clean(hit.number),
                    case_year: clean(hit.case_year),
                    case_type: clean(hit.case_type),
                    category: query.category.unwrap_or(CourtCategory::DistrictCourt),
                    court_name: clean(hit.court),
                    court_code: None,
                    cnr: clean(hit.cnr),
                    status: clean(hit.status),
                    petitioner,
                    respondent,
                    source: ProviderKind::AggregatorApi,
                })
            })
            .collect())
    }

    async fn get_status(
        &self,
        identifier: &CaseIdentifier,
    ) -> Result<Option<CaseSnapshot>, ProviderError> {
        if !self.is_configured() {
            debug!("aggregator: no API key — sitting out the lookup");
            return Ok(None);
        }

        let url = format!(
            "{}/{}/case",
            self.base_url,
            Self::category_path(identifier.category)
        );
        let query = vec![
            ("type", identifier.case_type.clone()),
            ("number", identifier.case_number.clone()),
            ("year", identifier.case_year.clone()),
        ];
        self.fetch_case(url, query, identifier).await
    }

    async fn get_status_by_cnr(&self, cnr: &str) -> Result<Option<CaseSnapshot>, ProviderError> {
        if !self.is_configured() {
            return Ok(None);
        }

        let url = format!("{}/cnr/{}", self.base_url, urlencoding::encode(cnr));
        let identifier = CaseIdentifier {
            category: CourtCategory::DistrictCourt,
            case_type: String::new(),
            type_code: None,
            case_number: String::new(),
            case_year: String::new(),
            cnr: Some(cnr.to_string()),
            court_code: None,
            state_code: None,
            district_code: None,
        };
        self.fetch_case(url, Vec::new(), &identifier).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier() -> CaseIdentifier {
        CaseIdentifier {
            category: CourtCategory::HighCourt,
            case_type: "W.P.(C)".into(),
            type_code: None,
            case_number: "8812".into(),
            case_year: "2022".into(),
            cnr: None,
            court_code: None,
            state_code: None,
            district_code: None,
        }
    }

    #[test]
    fn aliases_normalize_snake_case_spellings() {
        let json = r#"{
            "case_title": "Ravi Kumar vs State",
            "case_status": "Disposed",
            "petitioner_name": "Ravi Kumar",
            "respondent_name": "State",
            "next_date": "2025-09-22",
            "date_of_decision": "2025-01-15",
            "hearings": [
                {"hearing_date": "2025-01-10", "business": "Arguments"}
            ],
            "order_list": [
                {"order_date": "2025-01-15", "type": "Judgment", "pdf_url": "https://x/o.pdf"}
            ]
        }"#;
        let case: ApiCase = serde_json::from_str(json).unwrap();
        let snap = snapshot_from_api(case, &identifier());
        assert_eq!(snap.title, "Ravi Kumar vs State");
        assert_eq!(snap.status, "Disposed");
        assert_eq!(snap.next_hearing_date.as_deref(), Some("2025-09-22"));
        assert_eq!(snap.decision_date.as_deref(), Some("2025-01-15"));
        assert_eq!(snap.hearing_history.len(), 1);
        assert_eq!(snap.hearing_history[0].purpose, "Arguments");
        assert_eq!(snap.orders.len(), 1);
        assert_eq!(snap.orders[0].order_type, "Judgment");
        assert_eq!(
            snap.orders[0].document_url.as_deref(),
            Some("https://x/o.pdf")
        );
        // Last order fields backfilled from the newest order entry.
        assert_eq!(snap.last_order_date.as_deref(), Some("2025-01-15"));
    }

    #[test]
    fn canonical_spellings_also_parse() {
        let json = r#"{
            "title": "A vs B",
            "status": "Pending",
            "next_hearing_date": "2025-10-01"
        }"#;
        let case: ApiCase = serde_json::from_str(json).unwrap();
        let snap = snapshot_from_api(case, &identifier());
        assert_eq!(snap.title, "A vs B");
        assert_eq!(snap.next_hearing_date.as_deref(), Some("2025-10-01"));
    }

    #[test]
    fn error_field_is_detectable() {
        let json = r#"{"error": "case not found"}"#;
        let case: ApiCase = serde_json::from_str(json).unwrap();
        assert!(case.error.is_some());
    }

    #[test]
    fn empty_body_yields_pending_snapshot_with_derived_title() {
        let case: ApiCase = serde_json::from_str("{}").unwrap();
        let snap = snapshot_from_api(case, &identifier());
        assert_eq!(snap.status, crate::models::STATUS_PENDING);
        assert!(snap.title.contains("W.P.(C) 8812/2022"));
    }

    #[tokio::test]
    async fn unconfigured_provider_sits_out() {
        let mut config = Config::from_env();
        config.aggregator_api_key = String::new();
        let provider = LegalAggregatorApiProvider::new(&config);
        assert!(!provider.is_configured());
        assert_eq!(provider.get_status(&identifier()).await.unwrap(), None);
        assert_eq!(
            provider.get_status_by_cnr("KLER010012342023").await.unwrap(),
            None
        );
        assert!(provider
            .search_by_party(&SearchQuery {
                party_name: "Ravi".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .is_empty());
    }
}
