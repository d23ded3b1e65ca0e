// =============================================================================
// supreme_court.rs — ONE COURT TO RULE THEM ALL
// =============================================================================
//
// The Supreme Court of India runs its own case status portal, separate from
// the eCourts infrastructure, with its own form, its own CAPTCHA, and its
// own numeric registry code for every case type. You don't search for a
// "Civil Appeal" — you search for case type 3 and you'd better know that.
//
// Users, of course, do not know that. They type "Civil Appeal", "CA",
// "C.A.", or "ca", and occasionally something we've never seen before.
// The registry table below resolves all of it: exact label match first,
// then a normalized alias match (strip punctuation, uppercase), and when
// a case type is genuinely unrecognizable we fall back to the most common
// code with a logged warning — a wrong-type search that returns "no
// record" beats an error that returns nothing.
//
// The portal does NOT do CNR lookups. The descriptor says so, and the
// default trait impl answers None before a single byte leaves the machine.
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

/// The registry's case-type table: canonical label, numeric code, and the
/// abbreviations humans actually type. Compiled from the portal's own
/// dropdown; extend it when the registry invents a new flavor of petition.
const CASE_TYPE_TABLE: &[(&str, u32, &[&str])] = &[
    ("Special Leave Petition (Civil)", 1, &["SLP", "SLPC", "SLP(C)", "SLP (CIVIL)"]),
    ("Special Leave Petition (Criminal)", 2, &["SLP(CRL)", "SLPCRL", "SLP (CRIMINAL)"]),
    ("Civil Appeal", 3, &["CA", "C.A.", "CIV APP", "CIVIL APP"]),
    ("Criminal Appeal", 4, &["CRLA", "CRL.A.", "CRL APP", "CRIMINAL APP"]),
    ("Writ Petition (Civil)", 5, &["WP(C)", "WPC", "W.P.(C)", "WRIT (CIVIL)"]),
    ("Writ Petition (Criminal)", 6, &["WP(CRL)", "WPCRL", "W.P.(CRL)", "WRIT (CRIMINAL)"]),
    ("Transfer Petition (Civil)", 7, &["TP(C)", "TPC"]),
    ("Review Petition (Civil)", 8, &["RP(C)", "RPC", "REVIEW"]),
    ("Contempt Petition (Civil)", 9, &["CONMT", "CONTEMPT"]),
    ("Diary Number", 10, &["DIARY", "DIARY NO"]),
];

/// Where an unrecognized case type lands: Civil Appeal, the single most
/// common case type on the docket. A wrong guess here yields "no record",
/// which is survivable; refusing to search is not.
const DEFAULT_CASE_TYPE_CODE: u32 = 3;

/// Strip punctuation and whitespace, uppercase. "C.A." == "ca" == "CA".
fn normalize_type_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Resolve a free-text case type to its registry code.
/// Exact label match, then normalized alias match, then the default code
/// with a warning. Never fails.
pub(crate) fn resolve_case_type_code(label: &str) -> u32 {
    let trimmed = label.trim();

    // Pass 1: exact canonical label.
    for (canonical, code, _aliases) in CASE_TYPE_TABLE {
        if trimmed.eq_ignore_ascii_case(canonical) {
            return *code;
        }
    }

    // Pass 2: normalized label against canonical + aliases.
    let normalized = normalize_type_label(trimmed);
    if !normalized.is_empty() {
        for (canonical, code, aliases) in CASE_TYPE_TABLE {
            if normalize_type_label(canonical) == normalized {
                return *code;
            }
            if aliases.iter().any(|a| normalize_type_label(a) == normalized) {
                return *code;
            }
        }
    }

    warn!(
        case_type = trimmed,
        fallback_code = DEFAULT_CASE_TYPE_CODE,
        "supreme court: unrecognized case type — using the default registry code"
    );
    DEFAULT_CASE_TYPE_CODE
}

/// The Supreme Court portal adapter.
pub struct SupremeCourtProvider {
    client: reqwest::Client,
    base_url: String,
    solver: Arc<CaptchaSolver>,
    gate: PortalGate,
    max_attempts: u32,
}

impl SupremeCourtProvider {
    pub fn new(config: &Config, solver: Arc<CaptchaSolver>) -> Self {
        Self {
            client: browser_client(&config.user_agent, config.sci_timeout),
            base_url: config.sci_base_url.trim_end_matches('/').to_string(),
            solver,
            gate: PortalGate::new(
                "supreme-court",
                config.gate_failure_threshold,
                config.gate_base_cooldown,
                config.gate_max_cooldown,
            ),
            max_attempts: config.max_lookup_attempts,
        }
    }

    pub fn gate(&self) -> &PortalGate {
        &self.gate
    }

    /// One full lookup attempt: fresh handshake, one form POST, classify.
    async fn attempt_status(
        &self,
        identifier: &CaseIdentifier,
        attempt: u32,
    ) -> Result<AttemptOutcome<CaseSnapshot>, ProviderError> {
        let page_url = format!("{}/case-status", self.base_url);
        let Some(session) = open_session(&self.client, &page_url, &self.base_url, &self.solver, false).await
        else {
            self.gate.record_failure();
            return Err(ProviderError::Transport(
                "session negotiation failed".to_string(),
            ));
        };

        let type_code = identifier
            .type_code
            .as_deref()
            .and_then(|c| c.parse::<u32>().ok())
            .unwrap_or_else(|| resolve_case_type_code(&identifier.case_type));

        debug!(
            attempt = attempt,
            case = %identifier,
            type_code = type_code,
            "supreme court: submitting case-status query"
        );

        let mut form: Vec<(&str, String)> = vec![
            ("case_type", type_code.to_string()),
            ("case_no", identifier.case_number.clone()),
            ("year", identifier.case_year.clone()),
        ];
        if let Some(answer) = &session.captcha_answer {
            form.push(("captcha", answer.clone()));
        }
        if let Some(token) = &session.csrf_token {
            form.push(("app_token", token.clone()));
        }

        let body = self.submit(&session, &page_url, &form).await?;

        if looks_like_captcha_rejection(&body) {
            return Ok(AttemptOutcome::CaptchaRejected);
        }
        if looks_like_no_record(&body) {
            return Ok(AttemptOutcome::NoRecord);
        }

        match parse_status_markup(&body, identifier) {
            Some(snapshot) => Ok(AttemptOutcome::Success(snapshot)),
            // A page with none of our fields on it and no "no record"
            // banner is a page we don't understand. Treat it as no record
            // rather than inventing a snapshot out of boilerplate.
            None => Ok(AttemptOutcome::NoRecord),
        }
    }

    async fn submit(
        &self,
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
                self.gate.record_failure();
                ProviderError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            self.gate.record_failure();
            return Err(ProviderError::Transport(format!(
                "portal returned HTTP {}",
                status.as_u16()
            )));
        }
        self.gate.record_success();

        response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

#[async_trait]
impl CourtProvider for SupremeCourtProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::SupremeCourt,
            supports_registry_lookup: false,
            supports_status_lookup: true,
        }
    }

    async fn search_by_party(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        if !self.gate.is_open() {
            return Err(ProviderError::Transport("portal in cooldown".to_string()));
        }
        if !self.solver.is_configured() {
            return Err(ProviderError::SolverUnavailable);
        }

        let results = retry_with_fresh_session("supreme-court", self.max_attempts, |_n| {
            self.attempt_party_search(query)
        })
        .await?;
        Ok(results.unwrap_or_default())
    }

    async fn get_status(
        &self,
        identifier: &CaseIdentifier,
    ) -> Result<Option<CaseSnapshot>, ProviderError> {
        if !self.gate.is_open() {
            return Err(ProviderError::Transport("portal in cooldown".to_string()));
        }
        // The portal always poses a CAPTCHA; without a solver, don't burn
        // three handshakes discovering that.
        if !self.solver.is_configured() {
            return Err(ProviderError::SolverUnavailable);
        }

        retry_with_fresh_session("supreme-court", self.max_attempts, |n| {
            self.attempt_status(identifier, n)
        })
        .await
    }
}

impl SupremeCourtProvider {
    async fn attempt_party_search(
        &self,
        query: &SearchQuery,
    ) -> Result<AttemptOutcome<Vec<SearchResult>>, ProviderError> {
        let page_url = format!("{}/party-name-search", self.base_url);
        let Some(session) = open_session(&self.client, &page_url, &self.base_url, &self.solver, false).await
        else {
            self.gate.record_failure();
            return Err(ProviderError::Transport(
                "session negotiation failed".to_string(),
            ));
        };

        let mut form: Vec<(&str, String)> = vec![("party_name", query.party_name.clone())];
        if let Some(year) = &query.year {
            form.push(("year", year.clone()));
        }
        if let Some(answer) = &session.captcha_answer {
            form.push(("captcha", answer.clone()));
        }
        if let Some(token) = &session.csrf_token {
            form.push(("app_token", token.clone()));
        }

        let body = self.submit(&session, &page_url, &form).await?;

        if looks_like_captcha_rejection(&body) {
            return Ok(AttemptOutcome::CaptchaRejected);
        }
        if looks_like_no_record(&body) {
            return Ok(AttemptOutcome::NoRecord);
        }

        Ok(AttemptOutcome::Success(parse_search_markup(&body)))
    }
}

/// Pull a canonical snapshot out of the portal's result markup.
/// Every field is best-effort; None only when the page yielded nothing
/// recognizable at all.
fn parse_status_markup(markup: &str, identifier: &CaseIdentifier) -> Option<CaseSnapshot> {
    let mut snap = CaseSnapshot::empty();

    snap.status = extract_field(markup, "Status");
    snap.petitioner = non_empty(extract_field(markup, "Petitioner(s)"))
        .or_else(|| non_empty(extract_field(markup, "Petitioner")));
    snap.respondent = non_empty(extract_field(markup, "Respondent(s)"))
        .or_else(|| non_empty(extract_field(markup, "Respondent")));
    snap.petitioner_advocate = non_empty(extract_field(markup, "Petitioner Advocate"));
    snap.respondent_advocate = non_empty(extract_field(markup, "Respondent Advocate"));
    // The portal labels the bench "Coram".
    snap.judges = non_empty(extract_field(markup, "Coram"))
        .or_else(|| non_empty(extract_field(markup, "Judge")));
    snap.filing_date = non_empty(extract_field(markup, "Filing Date"))
        .or_else(|| non_empty(extract_field(markup, "Date of Filing")));
    snap.registration_date = non_empty(extract_field(markup, "Registration Date"));
    snap.decision_date = non_empty(extract_field(markup, "Date of Decision"));
    snap.next_hearing_date = non_empty(extract_field(markup, "Next Date of Hearing"))
        .or_else(|| non_empty(extract_field(markup, "Tentative Date")));
    snap.last_order_date = non_empty(extract_field(markup, "Last Order Date"));

    // Listing history table: date / purpose / bench.
    for row in extract_table_rows(markup, &["listing history", "hearing history"]) {
        if row.is_empty() {
            continue;
        }
        snap.hearing_history.push(HearingEntry {
            date: row.first().cloned().unwrap_or_default(),
            purpose: row.get(1).cloned().unwrap_or_default(),
            court_room: None,
            judge: row.get(2).and_then(|c| non_empty(c.clone())),
        });
    }

    // Orders table: date / type / (link column we can't resolve here).
    for row in extract_table_rows(markup, &["judgment/order", "orders", "daily order"]) {
        if row.is_empty() {
            continue;
        }
        snap.orders.push(OrderEntry {
            date: row.first().cloned().unwrap_or_default(),
            order_type: row.get(1).cloned().unwrap_or_else(|| "Order".to_string()),
            summary: row.get(2).and_then(|c| non_empty(c.clone())),
            document_url: None,
        });
    }

    // Newest order closes the loop on last_order_date when the portal
    // didn't print it as a labelled field.
    if snap.last_order_date.is_none() {
        if let Some(last) = snap.orders.last() {
            snap.last_order_date = non_empty(last.date.clone());
            snap.last_order_summary = last.summary.clone();
        }
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

/// Parse a party-name search result table into SearchResults.
/// Expected row shape: serial / case number / title / status — but rows
/// with fewer cells happen and are tolerated.
fn parse_search_markup(markup: &str) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for row in extract_table_rows(markup, &["search result", "case details", "party name"]) {
        if row.len() < 2 {
            continue;
        }
        let (case_no_cell, title_cell, status_cell) = (
            row.get(1).cloned().unwrap_or_default(),
            row.get(2).cloned().unwrap_or_default(),
            row.get(3).cloned(),
        );
        let title = if title_cell.trim().is_empty() {
            case_no_cell.clone()
        } else {
            title_cell
        };
        let (case_number, case_year, case_type) = split_case_number_cell(&case_no_cell);
        let (petitioner, respondent) = split_title_parties(&title);

        results.push(SearchResult {
            title,
            case_number,
            case_year,
            case_type,
            category: CourtCategory::SupremeCourt,
            court_name: Some("Supreme Court of India".to_string()),
            court_code: None,
            cnr: None,
            status: status_cell.and_then(non_empty),
            petitioner,
            respondent,
            source: ProviderKind::SupremeCourt,
        });
    }
    results
}

/// "Civil Appeal 1234/2019" -> (Some("1234"), Some("2019"), Some("Civil Appeal")).
fn split_case_number_cell(cell: &str) -> (Option<String>, Option<String>, Option<String>) {
    let trimmed = cell.trim();
    let Some((head, year)) = trimmed.rsplit_once('/') else {
        return (non_empty(trimmed.to_string()), None, None);
    };
    let year = year.trim();
    let (case_type, number) = match head.trim().rsplit_once(' ') {
        Some((t, n)) if n.chars().any(|c| c.is_ascii_digit()) => {
            (non_empty(t.trim().to_string()), n.trim().to_string())
        }
        _ => (None, head.trim().to_string()),
    };
    (
        non_empty(number),
        non_empty(year.to_string()),
        case_type,
    )
}

/// "A vs B" -> (Some("A"), Some("B")). Courts write "vs", "v.", "versus".
pub(crate) fn split_title_parties(title: &str) -> (Option<String>, Option<String>) {
    let lower = title.to_lowercase();
    for sep in [" vs. ", " vs ", " v. ", " versus "] {
        if let Some(idx) = lower.find(sep) {
            let pet = title[..idx].trim().to_string();
            let resp = title[idx + sep.len()..].trim().to_string();
            return (non_empty(pet), non_empty(resp));
        }
    }
    (None, None)
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_type_aliases_converge() {
        let expected = resolve_case_type_code("Civil Appeal");
        assert_eq!(expected, 3);
        assert_eq!(resolve_case_type_code("CA"), expected);
        assert_eq!(resolve_case_type_code("C.A."), expected);
        assert_eq!(resolve_case_type_code("ca"), expected);
        assert_eq!(resolve_case_type_code("  civil appeal "), expected);
    }

    #[test]
    fn slp_maps_to_its_own_code() {
        assert_eq!(resolve_case_type_code("SLP"), 1);
        assert_eq!(resolve_case_type_code("Special Leave Petition (Civil)"), 1);
        assert_eq!(resolve_case_type_code("slp(c)"), 1);
    }

    #[test]
    fn unrecognized_type_falls_back_to_default() {
        assert_eq!(
            resolve_case_type_code("Frobnicate Petition"),
            DEFAULT_CASE_TYPE_CODE
        );
        assert_eq!(resolve_case_type_code(""), DEFAULT_CASE_TYPE_CODE);
    }

    #[test]
    fn status_markup_parses_labelled_fields() {
        let markup = r#"
            <table>
              <tr><td>Status</td><td>DISPOSED</td></tr>
              <tr><td>Petitioner(s)</td><td>Ravi Kumar</td></tr>
              <tr><td>Respondent(s)</td><td>State of Kerala</td></tr>
              <tr><td>Coram</td><td>HON'BLE THE CHIEF JUSTICE</td></tr>
              <tr><td>Next Date of Hearing</td><td>14-08-2025</td></tr>
            </table>
            <h3>Listing History</h3>
            <table>
              <tr><th>Sl</th><th>Date</th><th>Purpose</th></tr>
              <tr><td>10-01-2025</td><td>Arguments</td><td>Bench I</td></tr>
            </table>
        "#;
        let id = CaseIdentifier {
            category: CourtCategory::SupremeCourt,
            case_type: "Civil Appeal".into(),
            type_code: None,
            case_number: "1234".into(),
            case_year: "2019".into(),
            cnr: None,
            court_code: None,
            state_code: None,
            district_code: None,
        };
        let snap = parse_status_markup(markup, &id).expect("should parse");
        assert_eq!(snap.status, "DISPOSED");
        assert_eq!(snap.petitioner.as_deref(), Some("Ravi Kumar"));
        assert_eq!(snap.respondent.as_deref(), Some("State of Kerala"));
        assert_eq!(snap.judges.as_deref(), Some("HON'BLE THE CHIEF JUSTICE"));
        assert_eq!(snap.next_hearing_date.as_deref(), Some("14-08-2025"));
        assert_eq!(snap.title, "Ravi Kumar vs State of Kerala");
        assert_eq!(snap.hearing_history.len(), 1);
        assert_eq!(snap.hearing_history[0].purpose, "Arguments");
        assert!(!snap.raw_payload.is_empty());
    }

    #[test]
    fn boilerplate_markup_parses_to_none() {
        let id = CaseIdentifier {
            category: CourtCategory::SupremeCourt,
            case_type: "CA".into(),
            type_code: None,
            case_number: "1".into(),
            case_year: "2020".into(),
            cnr: None,
            court_code: None,
            state_code: None,
            district_code: None,
        };
        assert!(parse_status_markup("<html><body>Welcome</body></html>", &id).is_none());
    }

    #[test]
    fn case_number_cell_splits() {
        assert_eq!(
            split_case_number_cell("Civil Appeal 1234/2019"),
            (
                Some("1234".to_string()),
                Some("2019".to_string()),
                Some("Civil Appeal".to_string())
            )
        );
        assert_eq!(
            split_case_number_cell("1234/2019"),
            (Some("1234".to_string()), Some("2019".to_string()), None)
        );
        assert_eq!(split_case_number_cell(""), (None, None, None));
    }

    #[test]
    fn title_party_split() {
        assert_eq!(
            split_title_parties("Ravi Kumar vs State of Kerala"),
            (
                Some("Ravi Kumar".to_string()),
                Some("State of Kerala".to_string())
            )
        );
        assert_eq!(
            split_title_parties("A versus B"),
            (Some("A".to_string()), Some("B".to_string()))
        );
        assert_eq!(split_title_parties("In re: Something"), (None, None));
    }
}
