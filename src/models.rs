// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF LITIGATION
// =============================================================================
//
// These structs represent the fundamental building blocks of our court case
// tracking system. Indian court data arrives from four upstream sources, in
// three markup dialects and two JSON spellings, and every one of them has a
// different opinion about what a "case" is. These types are the one canonical
// opinion that wins.
//
// Is it overkill to model a hearing history entry with its own struct?
// Yes. Do we care? Absolutely not.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The status string we fall back to when an upstream genuinely tells us
/// nothing. This is a documented convention of the court portals themselves
/// (a case with no disposal information is "Pending"), not our invention.
pub const STATUS_PENDING: &str = "Pending";

/// The sentinel a freshly created tracked case carries before its first
/// successful check. The change detector treats a transition away from this
/// value as "we learned the status for the first time", not as a change
/// worth waking anyone up for.
pub const STATUS_UNKNOWN: &str = "Unknown";

/// Which tier of the Indian judiciary a case lives in.
/// This single enum decides which provider gets called, which upstream
/// endpoint gets hit, and how much CAPTCHA suffering lies ahead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CourtCategory {
    /// The Supreme Court of India. One court, one portal, one very
    /// particular case-type code table.
    SupremeCourt,

    /// The 25 High Courts, served by the eCourts high court services portal.
    HighCourt,

    /// District and sessions courts — the vast majority of tracked cases,
    /// served by the eCourts district services portal.
    DistrictCourt,

    /// NCLT/NCLAT and friends. The eCourts district endpoint handles these
    /// too, because the government's routing table is vibes-based.
    Tribunal,

    /// Consumer forums (district commissions up through the NCDRC).
    /// Also bucketed with district courts upstream.
    ConsumerForum,
}

impl CourtCategory {
    /// Whether this category routes to the eCourts *district* endpoint
    /// rather than the high court one. Tribunals and consumer forums ride
    /// along with the district courts; nobody knows why, least of all the
    /// portals themselves.
    pub fn uses_district_endpoint(&self) -> bool {
        matches!(
            self,
            CourtCategory::DistrictCourt | CourtCategory::Tribunal | CourtCategory::ConsumerForum
        )
    }
}

impl fmt::Display for CourtCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourtCategory::SupremeCourt => write!(f, "SUPREME_COURT"),
            CourtCategory::HighCourt => write!(f, "HIGH_COURT"),
            CourtCategory::DistrictCourt => write!(f, "DISTRICT_COURT"),
            CourtCategory::Tribunal => write!(f, "TRIBUNAL"),
            CourtCategory::ConsumerForum => write!(f, "CONSUMER_FORUM"),
        }
    }
}

/// Which upstream adapter produced a result. Each provider has its own
/// client, its own cooldown gate, and its own existential crisis when the
/// portal redesigns its HTML at 2am on a Sunday.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// The Supreme Court of India's own case status portal.
    SupremeCourt,
    /// The eCourts services portals (high court + district court).
    Ecourts,
    /// A paid third-party API that returns pre-normalized JSON. The one
    /// upstream that doesn't make us solve arithmetic to read public records.
    AggregatorApi,
    /// A free public legal-document search engine. Search-grade results
    /// only — it has opinions and judgments, not live case status.
    PublicSearch,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::SupremeCourt => write!(f, "SCI_PORTAL"),
            ProviderKind::Ecourts => write!(f, "ECOURTS"),
            ProviderKind::AggregatorApi => write!(f, "AGGREGATOR_API"),
            ProviderKind::PublicSearch => write!(f, "PUBLIC_SEARCH"),
        }
    }
}

/// The addressable key a caller hands us to resolve a case.
///
/// Invariant: either (case_type + case_number + case_year) or the CNR must
/// be present — `is_addressable()` checks this. When a CNR exists it wins,
/// because it's a single nationally unique string that needs no routing
/// codes, no case-type table, and no guessing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseIdentifier {
    /// Which court tier this case belongs to. Decides provider routing.
    pub category: CourtCategory,

    /// Free-text case type as the user entered it: "Civil Appeal",
    /// "W.P.(C)", "SLP", "O.S.", or whatever their lawyer scribbled.
    pub case_type: String,

    /// Normalized type code, when we already know it. The Supreme Court
    /// provider fills this from its registry table; other providers pass
    /// the free text through.
    pub type_code: Option<String>,

    /// The case number within its type and year. A string, not a number,
    /// because courts issue numbers like "1234-A" and we've stopped arguing.
    pub case_number: String,

    /// Filing/registration year, four digits.
    pub case_year: String,

    /// CNR — the Case Number Record, a fixed-format 16-character identifier
    /// issued by the national registry. Unique across every court in the
    /// country. When present, this is the key we actually want to use.
    pub cnr: Option<String>,

    /// Portal-specific routing codes. The eCourts endpoints want to know
    /// which court complex, state, and district they're looking in, because
    /// a nationally unified system is apparently too much to ask.
    pub court_code: Option<String>,
    pub state_code: Option<String>,
    pub district_code: Option<String>,
}

impl CaseIdentifier {
    /// Can this identifier actually address a case? Either the
    /// (type, number, year) triple or a CNR will do.
    pub fn is_addressable(&self) -> bool {
        let triple = !self.case_type.trim().is_empty()
            && !self.case_number.trim().is_empty()
            && !self.case_year.trim().is_empty();
        triple || self.cnr.as_deref().map(|c| !c.trim().is_empty()).unwrap_or(false)
    }
}

impl fmt::Display for CaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cnr {
            Some(cnr) if !cnr.trim().is_empty() => {
                write!(f, "[{}] CNR {}", self.category, cnr)
            }
            _ => write!(
                f,
                "[{}] {} {}/{}",
                self.category, self.case_type, self.case_number, self.case_year
            ),
        }
    }
}

/// One row of a case's hearing history: the case came up, something
/// happened (usually "adjourned"), and it will come up again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HearingEntry {
    /// Hearing date, verbatim as the upstream printed it. Formats vary by
    /// portal and sometimes by court room, so we keep the string.
    pub date: String,
    /// The business/purpose of the hearing: "Arguments", "Evidence",
    /// "For Orders", or the eternal "Adjourned".
    pub purpose: String,
    /// Court room or bench, when printed.
    pub court_room: Option<String>,
    /// Presiding judge for this listing, when printed.
    pub judge: Option<String>,
}

/// One order or judgment on the case record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderEntry {
    /// Order date, verbatim from the upstream.
    pub date: String,
    /// "Order", "Judgment", "Daily Order" — whatever label the portal used.
    pub order_type: String,
    /// Short summary when the upstream provides one.
    pub summary: Option<String>,
    /// Link to the order PDF, when present. We never fetch it; it's for
    /// the humans downstream.
    pub document_url: Option<String>,
}

/// The canonical normalized view of a case at a point in time.
///
/// This is what every provider, regardless of how deranged its upstream
/// markup was, must produce. The change detector compares one of these
/// against the last-known TrackedCase fields to decide what's new.
///
/// Absence of data is `None`. Never "N/A", never "-", never "". The one
/// exception is `status`, which defaults to the literal "Pending" because
/// that's the portals' own convention for a case with no disposal info.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseSnapshot {
    /// Case title. Always non-empty: when the upstream supplies none, we
    /// derive "Petitioner vs Respondent" ourselves. See [`CaseSnapshot::ensure_title`].
    pub title: String,

    /// Current status, free text. Upstream vocabularies vary wildly
    /// ("Pending", "Disposed", "CONTESTED -- DISMISSED", ...) so there is
    /// deliberately no enum here.
    pub status: String,

    pub petitioner: Option<String>,
    pub respondent: Option<String>,
    pub petitioner_advocate: Option<String>,
    pub respondent_advocate: Option<String>,

    /// Presiding judge(s), free text. A division bench arrives as one
    /// string with both names and we leave it that way.
    pub judges: Option<String>,

    /// Dates kept verbatim as strings: the portals print dd-mm-yyyy,
    /// dd/mm/yyyy, "2nd January 2024", and worse. The change detector
    /// compares strings; anything that needs a real date goes through
    /// [`parse_flexible_date`].
    pub filing_date: Option<String>,
    pub registration_date: Option<String>,
    pub decision_date: Option<String>,
    pub next_hearing_date: Option<String>,

    pub last_order_date: Option<String>,
    pub last_order_summary: Option<String>,

    /// Ordered hearing history, oldest first as the portal lists it.
    pub hearing_history: Vec<HearingEntry>,
    /// Ordered order/judgment list.
    pub orders: Vec<OrderEntry>,

    /// Acts and sections cited, when the portal lists them.
    pub acts_cited: Option<Vec<String>>,

    /// The unparsed upstream response, kept for audit and for the day a
    /// portal redesign breaks our extractor and we need to know what we
    /// actually received. Never interpreted downstream.
    pub raw_payload: String,
}

impl CaseSnapshot {
    /// A snapshot with nothing in it but the invariant defaults.
    /// Providers start from this and fill in what they managed to extract.
    pub fn empty() -> Self {
        Self {
            title: String::new(),
            status: STATUS_PENDING.to_string(),
            petitioner: None,
            respondent: None,
            petitioner_advocate: None,
            respondent_advocate: None,
            judges: None,
            filing_date: None,
            registration_date: None,
            decision_date: None,
            next_hearing_date: None,
            last_order_date: None,
            last_order_summary: None,
            hearing_history: Vec::new(),
            orders: Vec::new(),
            acts_cited: None,
            raw_payload: String::new(),
        }
    }

    /// Enforce the title invariant: if the upstream gave us no explicit
    /// title, derive one from the parties. If it gave us no parties either,
    /// fall back to the identifier's own rendering — a title must exist.
    pub fn ensure_title(&mut self, identifier: &CaseIdentifier) {
        if !self.title.trim().is_empty() {
            return;
        }
        match (&self.petitioner, &self.respondent) {
            (Some(p), Some(r)) if !p.trim().is_empty() && !r.trim().is_empty() => {
                self.title = format!("{} vs {}", p.trim(), r.trim());
            }
            (Some(p), _) if !p.trim().is_empty() => {
                self.title = p.trim().to_string();
            }
            _ => {
                self.title = identifier.to_string();
            }
        }
    }

    /// Normalize status: trim, and substitute the documented "Pending"
    /// convention when the upstream left it genuinely blank.
    pub fn normalize_status(&mut self) {
        let trimmed = self.status.trim();
        self.status = if trimmed.is_empty() {
            STATUS_PENDING.to_string()
        } else {
            trimmed.to_string()
        };
    }
}

/// A lighter-weight result from party-name search: just enough for a user
/// to say "yes, that one" and start tracking it. Never persisted by the
/// engine itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub case_number: Option<String>,
    pub case_year: Option<String>,
    pub case_type: Option<String>,
    pub category: CourtCategory,
    pub court_name: Option<String>,
    pub court_code: Option<String>,
    pub cnr: Option<String>,
    pub status: Option<String>,
    pub petitioner: Option<String>,
    pub respondent: Option<String>,
    /// Which provider found it, for display and debugging.
    pub source: ProviderKind,
}

impl SearchResult {
    /// Dedup key for cross-provider merges: the same case surfaced by two
    /// providers almost always shares a title prefix even when the suffixes
    /// ("& Ors", "and others") drift. First ~30 chars, lowercased.
    pub fn title_prefix_key(&self) -> String {
        self.title.trim().to_lowercase().chars().take(30).collect()
    }
}

/// A query for party-name search, with the optional narrowing the web app
/// lets users specify.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub party_name: String,
    pub category: Option<CourtCategory>,
    pub state_code: Option<String>,
    pub year: Option<String>,
}

/// The persisted tracked-case record, as the external store hands it to us.
///
/// The engine reads this once per cycle, resolves a fresh snapshot, diffs,
/// and writes the flattened fields back. It does NOT own this record's
/// lifecycle — users create it, users tag it, users deactivate it; we only
/// sync the case-status fields and the bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedCase {
    /// Store-assigned id, opaque to the engine.
    pub id: String,
    /// Which user tracks this case — carried through to notifications so
    /// the dispatcher knows whose channels to light up.
    pub user_id: String,

    pub identifier: CaseIdentifier,

    // Last-known snapshot fields, flattened. These are what the change
    // detector compares the fresh snapshot against.
    pub title: String,
    pub status: String,
    pub petitioner: Option<String>,
    pub respondent: Option<String>,
    pub judges: Option<String>,
    pub next_hearing_date: Option<String>,
    pub last_order_date: Option<String>,
    pub last_order_summary: Option<String>,

    // Tracking metadata. `active == false` is a soft delete.
    pub active: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_changed_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

impl TrackedCase {
    /// A fresh tracked case for a newly added identifier: status starts at
    /// the sentinel so the first real status doesn't fire a false alarm.
    pub fn new(id: String, user_id: String, identifier: CaseIdentifier) -> Self {
        let title = identifier.to_string();
        Self {
            id,
            user_id,
            identifier,
            title,
            status: STATUS_UNKNOWN.to_string(),
            petitioner: None,
            respondent: None,
            judges: None,
            next_hearing_date: None,
            last_order_date: None,
            last_order_summary: None,
            active: true,
            last_checked_at: None,
            last_changed_at: None,
            tags: Vec::new(),
            notes: None,
        }
    }

    /// Copy the comparable fields of a fresh snapshot onto this record.
    /// Called after change detection, so the diff ran against the old state.
    pub fn absorb_snapshot(&mut self, fresh: &CaseSnapshot) {
        self.title = fresh.title.clone();
        self.status = fresh.status.clone();
        self.petitioner = fresh.petitioner.clone();
        self.respondent = fresh.respondent.clone();
        self.judges = fresh.judges.clone();
        self.next_hearing_date = fresh.next_hearing_date.clone();
        self.last_order_date = fresh.last_order_date.clone();
        self.last_order_summary = fresh.last_order_summary.clone();
    }

    /// Dedup key for the hearing-reminder ledger: one reminder per case
    /// per calendar day, no matter how often the pipeline runs.
    pub fn reminder_key(&self, today: NaiveDate) -> String {
        format!("remind:{}:{}", self.id, today.format("%Y-%m-%d"))
    }
}

/// What kind of change happened. The wire names are what the downstream
/// web app and its notification templates key on — change them and someone's
/// "your hearing is tomorrow" email becomes a JSON parse error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    StatusChange,
    HearingDateChange,
    NewOrder,
    JudgeChange,
    NewCase,
    HearingReminder,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::StatusChange => write!(f, "status_change"),
            ChangeKind::HearingDateChange => write!(f, "hearing_date_change"),
            ChangeKind::NewOrder => write!(f, "new_order"),
            ChangeKind::JudgeChange => write!(f, "judge_change"),
            ChangeKind::NewCase => write!(f, "new_case"),
            ChangeKind::HearingReminder => write!(f, "hearing_reminder"),
        }
    }
}

/// One detected change, immutable once created. These get persisted as the
/// audit trail and fanned out to notification channels; they are never
/// mutated, merged, or second-guessed after the fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    /// UUID v4. Every adjournment deserves to feel unique and special.
    pub id: String,
    /// The tracked case this change belongs to.
    pub case_id: String,
    /// The user who gets told about it.
    pub user_id: String,
    pub kind: ChangeKind,
    /// Which snapshot field changed, e.g. "status", "next_hearing_date".
    pub field: String,
    /// The previous value. None on first observation.
    pub previous: Option<String>,
    /// The new value. Never empty — we don't report "became unknown".
    /// May embed context, e.g. a new order arrives as "{date}: {summary}".
    pub new_value: String,
    /// Case title at detection time, so notifications can render without
    /// a store round-trip.
    pub case_title: String,
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        case: &TrackedCase,
        kind: ChangeKind,
        field: &str,
        previous: Option<String>,
        new_value: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: case.id.clone(),
            user_id: case.user_id.clone(),
            kind,
            field: field.to_string(),
            previous,
            new_value,
            case_title: case.title.clone(),
            detected_at: Utc::now(),
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {} -> {}",
            self.id,
            self.case_id,
            self.kind,
            self.previous.as_deref().unwrap_or("(none)"),
            self.new_value
        )
    }
}

/// Parse the date formats Indian court portals actually emit.
/// Tried in observed-frequency order. Returns None rather than guessing:
/// a date we can't parse is a date we don't schedule reminders off.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return None;
    }
    const FORMATS: &[&str] = &[
        "%d-%m-%Y", // 15-03-2025 — eCourts' favorite
        "%d/%m/%Y", // 15/03/2025 — the Supreme Court portal
        "%Y-%m-%d", // 2025-03-15 — the aggregator API
        "%d-%b-%Y", // 15-Mar-2025 — some high court cause lists
        "%d %B %Y", // 15 March 2025 — judgment headers
    ];
    for fmt in FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(cleaned, fmt) {
            return Some(d);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier() -> CaseIdentifier {
        CaseIdentifier {
            category: CourtCategory::DistrictCourt,
            case_type: "O.S.".to_string(),
            type_code: None,
            case_number: "142".to_string(),
            case_year: "2023".to_string(),
            cnr: None,
            court_code: None,
            state_code: None,
            district_code: None,
        }
    }

    #[test]
    fn identifier_addressable_by_triple() {
        assert!(identifier().is_addressable());
    }

    #[test]
    fn identifier_addressable_by_cnr_alone() {
        let id = CaseIdentifier {
            case_type: String::new(),
            case_number: String::new(),
            case_year: String::new(),
            cnr: Some("DLHC010012342023".to_string()),
            ..identifier()
        };
        assert!(id.is_addressable());
    }

    #[test]
    fn identifier_not_addressable_when_both_missing() {
        let id = CaseIdentifier {
            case_type: String::new(),
            case_number: String::new(),
            case_year: String::new(),
            cnr: Some("   ".to_string()),
            ..identifier()
        };
        assert!(!id.is_addressable());
    }

    #[test]
    fn title_derived_from_parties() {
        let mut snap = CaseSnapshot::empty();
        snap.petitioner = Some("Ravi Kumar".to_string());
        snap.respondent = Some("State of Kerala".to_string());
        snap.ensure_title(&identifier());
        assert_eq!(snap.title, "Ravi Kumar vs State of Kerala");
    }

    #[test]
    fn title_falls_back_to_identifier() {
        let mut snap = CaseSnapshot::empty();
        snap.ensure_title(&identifier());
        assert!(snap.title.contains("O.S. 142/2023"));
    }

    #[test]
    fn explicit_title_untouched() {
        let mut snap = CaseSnapshot::empty();
        snap.title = "Ravi Kumar vs State of Kerala & Ors".to_string();
        snap.petitioner = Some("Someone Else".to_string());
        snap.ensure_title(&identifier());
        assert_eq!(snap.title, "Ravi Kumar vs State of Kerala & Ors");
    }

    #[test]
    fn blank_status_becomes_pending() {
        let mut snap = CaseSnapshot::empty();
        snap.status = "   ".to_string();
        snap.normalize_status();
        assert_eq!(snap.status, STATUS_PENDING);
    }

    #[test]
    fn new_tracked_case_starts_at_sentinel() {
        let case = TrackedCase::new("c1".into(), "u1".into(), identifier());
        assert_eq!(case.status, STATUS_UNKNOWN);
        assert!(case.active);
        assert!(case.last_checked_at.is_none());
    }

    #[test]
    fn title_prefix_key_truncates_and_lowercases() {
        let mut a = SearchResult {
            title: "Ravi Kumar vs State of Kerala and Others".to_string(),
            case_number: None,
            case_year: None,
            case_type: None,
            category: CourtCategory::HighCourt,
            court_name: None,
            court_code: None,
            cnr: None,
            status: None,
            petitioner: None,
            respondent: None,
            source: ProviderKind::Ecourts,
        };
        let key_a = a.title_prefix_key();
        a.title = "RAVI KUMAR VS STATE OF KERALA & Ors".to_string();
        let key_b = a.title_prefix_key();
        assert_eq!(key_a, key_b);
        assert!(key_a.chars().count() <= 30);
    }

    #[test]
    fn flexible_date_handles_portal_formats() {
        let expect = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(parse_flexible_date("15-03-2025"), Some(expect));
        assert_eq!(parse_flexible_date("15/03/2025"), Some(expect));
        assert_eq!(parse_flexible_date("2025-03-15"), Some(expect));
        assert_eq!(parse_flexible_date(" 15-Mar-2025 "), Some(expect));
        assert_eq!(parse_flexible_date("15 March 2025"), Some(expect));
        assert_eq!(parse_flexible_date("Not Fixed"), None);
        assert_eq!(parse_flexible_date(""), None);
    }

    #[test]
    fn change_kind_wire_names_are_snake_case() {
        let json = serde_json::to_string(&ChangeKind::HearingDateChange).unwrap();
        assert_eq!(json, "\"hearing_date_change\"");
        let back: ChangeKind = serde_json::from_str("\"new_order\"").unwrap();
        assert_eq!(back, ChangeKind::NewOrder);
    }
}
