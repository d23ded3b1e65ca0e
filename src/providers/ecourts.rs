// =============================================================================
// ecourts.rs — THE NATIONAL GRID OF ADJOURNMENTS
// =============================================================================
//
// The eCourts project serves case status for every High Court and district
// court in the country — through two separate portals with two separate
// session schemes, two separate CAPTCHAs, and markup that agrees on almost
// nothing except being difficult.
//
// Routing is by court category: High Court cases go to the hcservices
// portal; district courts, tribunals, and consumer forums all go to the
// district services portal, because that's how the upstream bucketed them
// and we are not going to argue with a government routing table.
//
// CNR lookups are special. A CNR is nationally unique, but nothing in its
// prefix tells US (reliably, today, with the documentation available)
// which portal tier holds the case. So we ask both portals at once and
// take the first real answer, preferring the High Court's on a double hit.
// Brute force? Yes. Two requests instead of an afternoon of reverse
// engineering the registry's encoding? Also yes.
// =============================================================================

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backoff::PortalGate;
use crate::captcha::CaptchaSolver;
use crate::config::Config;
use crate::extract::{extract_field, extract_table_rows};
use crate::models::{
    CaseIdentifier, CaseSnapshot, CourtCategory, HearingEntry, OrderEntry, ProviderKind,
    SearchQuery, SearchResult,
};
use crate::providers::{
    browser_client, looks_like_captcha_rejection, looks_like_no_record, retry_with_fresh_session,
    AttemptOutcome, CourtProvider, ProviderDescriptor, ProviderError,
};
use crate::session::{open_session, PortalSession};

/// Which of the two eCourts portals a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    HighCourt,
    District,
}

impl Tier {
    fn name(self) -> &'static str {
        match self {
            Tier::HighCourt => "ecourts-hc",
            Tier::District => "ecourts-district",
        }
    }
}

/// The eCourts adapter: one provider, two portals, zero mercy.
pub struct EcourtsProvider {
    client: reqwest::Client,
    hc_base_url: String,
    district_base_url: String,
    solver: Arc<CaptchaSolver>,
    hc_gate: PortalGate,
    district_gate: PortalGate,
    max_attempts: u32,
}

impl EcourtsProvider {
    pub fn new(config: &Config, solver: Arc<CaptchaSolver>) -> Self {
        Self {
            client: browser_client(&config.user_agent, config.ecourts_timeout),
            hc_base_url: config.ecourts_hc_base_url.trim_end_matches('/').to_string(),
            district_base_url: config
                .ecourts_district_base_url
                .trim_end_matches('/')
                .to_string(),
            solver,
            hc_gate: PortalGate::new(
                "ecourts-hc",
                config.gate_failure_threshold,
                config.gate_base_cooldown,
                config.gate_max_cooldown,
            ),
            district_gate: PortalGate::new(
                "ecourts-district",
                config.gate_failure_threshold,
                config.gate_base_cooldown,
                config.gate_max_cooldown,
            ),
            max_attempts: config.max_lookup_attempts,
        }
    }

    pub fn gates(&self) -> [&PortalGate; 2] {
        [&self.hc_gate, &self.district_gate]
    }

    fn tier_for(category: CourtCategory) -> Tier {
        if category.uses_district_endpoint() {
            Tier::District
        } else {
            Tier::HighCourt
        }
    }

    fn base_url(&self, tier: Tier) -> &str {
        match tier {
            Tier::HighCourt => &self.hc_base_url,
            Tier::District => &self.district_base_url,
        }
    }

    fn gate(&self, tier: Tier) -> &PortalGate {
        match tier {
            Tier::HighCourt => &self.hc_gate,
            Tier::District => &self.district_gate,
        }
    }

    /// One status-lookup attempt against one tier: handshake, POST, classify.
    async fn attempt_status(
        &self,
        tier: Tier,
        identifier: &CaseIdentifier,
        attempt: u32,
    ) -> Result<AttemptOutcome<CaseSnapshot>, ProviderError> {
        let base = self.base_url(tier);
        let page_url = format!("{}/cases/case_no", base);
        let Some(session) = open_session(&self.client, &page_url, base, &self.solver, false).await else {
            self.gate(tier).record_failure();
            return Err(ProviderError::Transport(
                "session negotiation failed".to_string(),
            ));
        };

        debug!(
            portal = tier.name(),
            attempt = attempt,
            case = %identifier,
            "ecourts: submitting case-status query"
        );

        let mut form: Vec<(&str, String)> = vec![
            ("case_type", identifier.case_type.clone()),
            ("case_no", identifier.case_number.clone()),
            ("rgyear", identifier.case_year.clone()),
        ];
        if let Some(code) = &identifier.state_code {
            form.push(("state_code", code.clone()));
        }
        if let Some(code) = &identifier.district_code {
            form.push(("dist_code", code.clone()));
        }
        if let Some(code) = &identifier.court_code {
            form.push(("court_code", code.clone()));
        }
        if let Some(answer) = &session.captcha_answer {
            form.push(("captcha_code", answer.clone()));
        }
        if let Some(token) = &session.csrf_token {
            form.push(("app_token", token.clone()));
        }

        let submit_url = format!("{}/cases/submit_case_no", base);
        let body = self.submit(tier, &session, &submit_url, &form).await?;
        self.classify_status_body(&body, identifier)
    }

    /// One CNR-lookup attempt against one tier.
    async fn attempt_cnr(
        &self,
        tier: Tier,
        cnr: &str,
        identifier: &CaseIdentifier,
        attempt: u32,
    ) -> Result<AttemptOutcome<CaseSnapshot>, ProviderError> {
        let base = self.base_url(tier);
        let page_url = format!("{}/cases/cnr_status", base);
        let Some(session) = open_session(&self.client, &page_url, base, &self.solver, false).await else {
            self.gate(tier).record_failure();
            return Err(ProviderError::Transport(
                "session negotiation failed".to_string(),
            ));
        };

        debug!(
            portal = tier.name(),
            attempt = attempt,
            cnr = cnr,
            "ecourts: submitting CNR query"
        );

        let mut form: Vec<(&str, String)> = vec![("cino", cnr.to_string())];
        if let Some(answer) = &session.captcha_answer {
            form.push(("captcha_code", answer.clone()));
        }
        if let Some(token) = &session.csrf_token {
            form.push(("app_token", token.clone()));
        }

        let submit_url = format!("{}/cases/submit_cnr", base);
        let body = self.submit(tier, &session, &submit_url, &form).await?;
        self.classify_status_body(&body, identifier)
    }

    fn classify_status_body(
        &self,
        body: &str,
        identifier: &CaseIdentifier,
    ) -> Result<AttemptOutcome<CaseSnapshot>, ProviderError> {
        if looks_like_captcha_rejection(body) {
            return Ok(AttemptOutcome::CaptchaRejected);
        }
        if looks_like_no_record(body) {
            return Ok(AttemptOutcome::NoRecord);
        }
        match parse_status_markup(body, identifier) {
            Some(snapshot) => Ok(AttemptOutcome::Success(snapshot)),
            None => Ok(AttemptOutcome::NoRecord),
        }
    }

    async fn submit(
        &self,
        tier: Tier,
        session: &PortalSession,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::COOKIE, session.cookies.clone())
            .form(form)
            .send()
            .await
            .map_err(|e| {
                self.gate(tier).record_failure();
                ProviderError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            self.gate(tier).record_failure();
            return Err(ProviderError::Transport(format!(
                "portal returned HTTP {}",
                status.as_u16()
            )));
        }
        self.gate(tier).record_success();

        response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }

    /// CNR lookup on one tier, full retry loop included, errors flattened
    /// to None so the race can shrug one tier off.
    async fn cnr_on_tier(&self, tier: Tier, cnr: &str) -> Option<CaseSnapshot> {
        if !self.gate(tier).is_open() {
            debug!(portal = tier.name(), "ecourts: tier in cooldown — skipping CNR race arm");
            return None;
        }
        let identifier = cnr_identifier(cnr, tier);
        let result = retry_with_fresh_session(tier.name(), self.max_attempts, |n| {
            self.attempt_cnr(tier, cnr, &identifier, n)
        })
        .await;
        match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(portal = tier.name(), cnr = cnr, error = %e, "ecourts: CNR race arm failed");
                None
            }
        }
    }
}

/// A synthetic identifier for CNR-only lookups, so title fallback and
/// category tagging have something to stand on.
fn cnr_identifier(cnr: &str, tier: Tier) -> CaseIdentifier {
    CaseIdentifier {
        category: match tier {
            Tier::HighCourt => CourtCategory::HighCourt,
            Tier::District => CourtCategory::DistrictCourt,
        },
        case_type: String::new(),
        type_code: None,
        case_number: String::new(),
        case_year: String::new(),
        cnr: Some(cnr.to_string()),
        court_code: None,
        state_code: None,
        district_code: None,
    }
}

#[async_trait]
impl CourtProvider for EcourtsProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::Ecourts,
            supports_registry_lookup: true,
            supports_status_lookup: true,
        }
    }

    async fn search_by_party(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        // Party search goes to the tier the caller asked about, defaulting
        // to district — that's where the bulk of the docket lives.
        let tier = query
            .category
            .map(Self::tier_for)
            .unwrap_or(Tier::District);
        if !self.gate(tier).is_open() {
            return Err(ProviderError::Transport("portal in cooldown".to_string()));
        }
        if !self.solver.is_configured() {
            return Err(ProviderError::SolverUnavailable);
        }

        let results = retry_with_fresh_session(tier.name(), self.max_attempts, |_n| {
            self.attempt_party_search(tier, query)
        })
        .await?;
        Ok(results.unwrap_or_default())
    }

    async fn get_status(
        &self,
        identifier: &CaseIdentifier,
    ) -> Result<Option<CaseSnapshot>, ProviderError> {
        let tier = Self::tier_for(identifier.category);
        if !self.gate(tier).is_open() {
            return Err(ProviderError::Transport("portal in cooldown".to_string()));
        }
        if !self.solver.is_configured() {
            return Err(ProviderError::SolverUnavailable);
        }

        retry_with_fresh_session(tier.name(), self.max_attempts, |n| {
            self.attempt_status(tier, identifier, n)
        })
        .await
    }

    /// CNR race: both portals queried concurrently, first real parse wins,
    /// High Court preferred when both answer.
    async fn get_status_by_cnr(&self, cnr: &str) -> Result<Option<CaseSnapshot>, ProviderError> {
        if !self.solver.is_configured() {
            return Err(ProviderError::SolverUnavailable);
        }

        let (hc, district) = futures::future::join(
            self.cnr_on_tier(Tier::HighCourt, cnr),
            self.cnr_on_tier(Tier::District, cnr),
        )
        .await;
        Ok(hc.or(district))
    }
}

impl EcourtsProvider {
    async fn attempt_party_search(
        &self,
        tier: Tier,
        query: &SearchQuery,
    ) -> Result<AttemptOutcome<Vec<SearchResult>>, ProviderError> {
        let base = self.base_url(tier);
        let page_url = format!("{}/cases/party_name", base);
        let Some(session) = open_session(&self.client, &page_url, base, &self.solver, false).await else {
            self.gate(tier).record_failure();
            return Err(ProviderError::Transport(
                "session negotiation failed".to_string(),
            ));
        };

        let mut form: Vec<(&str, String)> = vec![("petres_name", query.party_name.clone())];
        if let Some(year) = &query.year {
            form.push(("rgyear", year.clone()));
        }
        if let Some(code) = &query.state_code {
            form.push(("state_code", code.clone()));
        }
        if let Some(answer) = &session.captcha_answer {
            form.push(("captcha_code", answer.clone()));
        }
        if let Some(token) = &session.csrf_token {
            form.push(("app_token", token.clone()));
        }

        let submit_url = format!("{}/cases/submit_party_name", base);
        let body = self.submit(tier, &session, &submit_url, &form).await?;

        if looks_like_captcha_rejection(&body) {
            return Ok(AttemptOutcome::CaptchaRejected);
        }
        if looks_like_no_record(&body) {
            return Ok(AttemptOutcome::NoRecord);
        }

        let category = match tier {
            Tier::HighCourt => CourtCategory::HighCourt,
            Tier::District => CourtCategory::DistrictCourt,
        };
        Ok(AttemptOutcome::Success(parse_search_markup(&body, category)))
    }
}

/// Parse an eCourts case-status page into the canonical snapshot.
fn parse_status_markup(markup: &str, identifier: &CaseIdentifier) -> Option<CaseSnapshot> {
    let mut snap = CaseSnapshot::empty();

    // eCourts calls the status field "Case Status" on some screens and
    // "Stage of Case" on others. Both get a shot.
    snap.status = {
        let s = extract_field(markup, "Case Status");
        if s.is_empty() {
            extract_field(markup, "Stage of Case")
        } else {
            s
        }
    };

    snap.petitioner = non_empty(extract_field(markup, "Petitioner and Advocate"))
        .map(|v| strip_advocate(&v))
        .or_else(|| non_empty(extract_field(markup, "Petitioner")));
    snap.respondent = non_empty(extract_field(markup, "Respondent and Advocate"))
        .map(|v| strip_advocate(&v))
        .or_else(|| non_empty(extract_field(markup, "Respondent")));
    snap.petitioner_advocate =
        non_empty(extract_field(markup, "Petitioner and Advocate")).and_then(|v| advocate_part(&v));
    snap.respondent_advocate =
        non_empty(extract_field(markup, "Respondent and Advocate")).and_then(|v| advocate_part(&v));

    snap.judges = non_empty(extract_field(markup, "Court Number and Judge"))
        .or_else(|| non_empty(extract_field(markup, "Judge")));
    snap.filing_date = non_empty(extract_field(markup, "Filing Date"));
    snap.registration_date = non_empty(extract_field(markup, "Registration Date"));
    snap.decision_date = non_empty(extract_field(markup, "Decision Date"));
    snap.next_hearing_date = non_empty(extract_field(markup, "Next Hearing Date"))
        .or_else(|| non_empty(extract_field(markup, "Next Date")));

    // Case history table. The district portal prints
    // [Judge, Business on Date, Hearing Date, Purpose]; narrower variants
    // drop the judge column. We key off the row width.
    for row in extract_table_rows(markup, &["case history", "case proceedings", "history of case hearing"]) {
        let entry = match row.len() {
            0 => continue,
            1 => HearingEntry {
                date: row[0].clone(),
                purpose: String::new(),
                court_room: None,
                judge: None,
            },
            2 | 3 => HearingEntry {
                date: row[0].clone(),
                purpose: row.last().cloned().unwrap_or_default(),
                court_room: None,
                judge: None,
            },
            _ => HearingEntry {
                date: row[2].clone(),
                purpose: row[3].clone(),
                court_room: None,
                judge: non_empty(row[0].clone()),
            },
        };
        snap.hearing_history.push(entry);
    }

    // Orders table: [number, order date, details/link] or [date, details].
    for row in extract_table_rows(markup, &["orders", "interim orders", "final orders"]) {
        if row.is_empty() {
            continue;
        }
        let (date, order_type) = if row.len() >= 3 {
            (row[1].clone(), row[2].clone())
        } else {
            (row[0].clone(), row.get(1).cloned().unwrap_or_else(|| "Order".to_string()))
        };
        snap.orders.push(OrderEntry {
            date,
            order_type,
            summary: None,
            document_url: None,
        });
    }

    if snap.last_order_date.is_none() {
        if let Some(last) = snap.orders.last() {
            snap.last_order_date = non_empty(last.date.clone());
            snap.last_order_summary = non_empty(last.order_type.clone());
        }
    }

    // Acts table: [act, section].
    let acts: Vec<String> = extract_table_rows(markup, &["acts", "under act"])
        .into_iter()
        .filter_map(|row| {
            let joined = row.join(" ").trim().to_string();
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        })
        .collect();
    if !acts.is_empty() {
        snap.acts_cited = Some(acts);
    }

    let meaningful = !snap.status.trim().is_empty()
        || snap.petitioner.is_some()
        || snap.respondent.is_some()
        || !snap.hearing_history.is_empty();
    if !meaningful {
        return None;
    }

    snap.raw_payload = markup.to_string();
    snap.normalize_status();
    snap.ensure_title(identifier);
    Some(snap)
}

/// "Ravi Kumar Adv.- S. Nair" -> party half.
fn strip_advocate(combined: &str) -> String {
    combined
        .split("Adv.-")
        .next()
        .unwrap_or(combined)
        .trim()
        .trim_end_matches(|c| c == '-' || c == ',')
        .trim()
        .to_string()
}

/// "Ravi Kumar Adv.- S. Nair" -> advocate half, when present.
fn advocate_part(combined: &str) -> Option<String> {
    combined
        .split_once("Adv.-")
        .map(|(_, adv)| adv.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse an eCourts party-search result table. Expected row shape:
/// serial / case details / parties / status-or-court.
fn parse_search_markup(markup: &str, category: CourtCategory) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for row in extract_table_rows(markup, &["search result", "party name", "case details"]) {
        if row.len() < 2 {
            continue;
        }
        let details = row.get(1).cloned().unwrap_or_default();
        let parties = row.get(2).cloned().unwrap_or_default();
        let trailing = row.get(3).cloned();

        let title = if parties.trim().is_empty() {
            details.clone()
        } else {
            parties.clone()
        };
        let (petitioner, respondent) = super::supreme_court::split_title_parties(&title);
        let (case_number, case_year) = split_details(&details);

        results.push(SearchResult {
            title,
            case_number,
            case_year,
            case_type: None,
            category,
            court_name: trailing.clone().and_then(non_empty),
            court_code: None,
            cnr: None,
            status: None,
            petitioner,
            respondent,
            source: ProviderKind::Ecourts,
        });
    }
    results
}

/// "O.S./142/2023" or "142/2023" -> (number, year).
fn split_details(details: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = details.split('/').map(str::trim).collect();
    match parts.as_slice() {
        [.., number, year] if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) => {
            (non_empty((*number).to_string()), non_empty((*year).to_string()))
        }
        _ => (None, None),
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
