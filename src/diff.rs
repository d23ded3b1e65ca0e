// =============================================================================
// diff.rs — THE CHANGE DETECTOR
// =============================================================================
//
// The entire point of this engine funnels through this one file: given what
// we knew about a case and what we just fetched, what actually CHANGED?
//
// The detector is a pure function. No I/O, no clock reads beyond the event
// timestamp, no state. Same inputs, same events, every time. That property
// is not negotiable — it's what makes a "you got 47 duplicate
// notifications" bug report impossible to write.
//
// Comparison is exact string equality after trimming. Deliberately. No
// fuzzy matching, no "Disposed ≈ DISPOSED", no date normalization. If the
// upstream wobbles its casing, that's the extractor's mess to clean before
// the snapshot gets here; the detector stays dumb, deterministic, and
// therefore testable.
//
// Four rules, each independent, all evaluated — one run can emit several
// events, in a fixed order (status, hearing, order, judge). Two standing
// suppressions:
//   - an EMPTY fresh field never fires ("became unknown" is not news),
//   - a previous status of the "Unknown" sentinel never fires a
//     status_change (learning the status for the first time is sync,
//     not change).
// =============================================================================

use crate::models::{CaseSnapshot, ChangeEvent, ChangeKind, TrackedCase, STATUS_UNKNOWN};

/// Diff a fresh snapshot against the last-known tracked fields.
/// Returns the change events in stable rule order; empty when nothing
/// noteworthy happened, which is most of the time — the wheels of justice
/// being famously well-paced.
pub fn detect(previous: &TrackedCase, fresh: &CaseSnapshot) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    // Rule 1: status change. Sentinel-suppressed on the first real check.
    let fresh_status = fresh.status.trim();
    let prev_status = previous.status.trim();
    if !fresh_status.is_empty()
        && fresh_status != prev_status
        && prev_status != STATUS_UNKNOWN
    {
        events.push(ChangeEvent::new(
            previous,
            ChangeKind::StatusChange,
            "status",
            Some(prev_status.to_string()),
            fresh_status.to_string(),
        ));
    }

    // Rule 2: next hearing date moved.
    let fresh_hearing = opt_trimmed(&fresh.next_hearing_date);
    let prev_hearing = opt_trimmed(&previous.next_hearing_date);
    if !fresh_hearing.is_empty() && fresh_hearing != prev_hearing {
        events.push(ChangeEvent::new(
            previous,
            ChangeKind::HearingDateChange,
            "next_hearing_date",
            if prev_hearing.is_empty() {
                None
            } else {
                Some(prev_hearing.to_string())
            },
            fresh_hearing.to_string(),
        ));
    }

    // Rule 3: a new order appeared. The new value carries the summary
    // inline ("{date}: {summary}") when we have one, so the notification
    // can say something more useful than a bare date.
    let fresh_order = opt_trimmed(&fresh.last_order_date);
    let prev_order = opt_trimmed(&previous.last_order_date);
    if !fresh_order.is_empty() && fresh_order != prev_order {
        let new_value = match opt_trimmed(&fresh.last_order_summary) {
            "" => fresh_order.to_string(),
            summary => format!("{}: {}", fresh_order, summary),
        };
        events.push(ChangeEvent::new(
            previous,
            ChangeKind::NewOrder,
            "last_order_date",
            if prev_order.is_empty() {
                None
            } else {
                Some(prev_order.to_string())
            },
            new_value,
        ));
    }

    // Rule 4: the bench changed.
    let fresh_judges = opt_trimmed(&fresh.judges);
    let prev_judges = opt_trimmed(&previous.judges);
    if !fresh_judges.is_empty() && fresh_judges != prev_judges {
        events.push(ChangeEvent::new(
            previous,
            ChangeKind::JudgeChange,
            "judges",
            if prev_judges.is_empty() {
                None
            } else {
                Some(prev_judges.to_string())
            },
            fresh_judges.to_string(),
        ));
    }

    events
}

fn opt_trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseIdentifier, CourtCategory};

    fn tracked() -> TrackedCase {
        let identifier = CaseIdentifier {
            category: CourtCategory::DistrictCourt,
            case_type: "O.S.".into(),
            type_code: None,
            case_number: "142".into(),
            case_year: "2023".into(),
            cnr: None,
            court_code: None,
            state_code: None,
            district_code: None,
        };
        let mut case = TrackedCase::new("case-1".into(), "user-1".into(), identifier);
        case.status = "Pending".into();
        case
    }

    fn snapshot() -> CaseSnapshot {
        let mut snap = CaseSnapshot::empty();
        snap.title = "Ravi Kumar vs State".into();
        snap.status = "Pending".into();
        snap
    }

    #[test]
    fn identical_fields_emit_nothing() {
        let mut prev = tracked();
        prev.next_hearing_date = Some("22-09-2025".into());
        prev.judges = Some("Sh. A. K. Menon".into());
        prev.last_order_date = Some("10-01-2025".into());

        let mut fresh = snapshot();
        fresh.next_hearing_date = Some("22-09-2025".into());
        fresh.judges = Some("Sh. A. K. Menon".into());
        fresh.last_order_date = Some("10-01-2025".into());

        assert!(detect(&prev, &fresh).is_empty());
    }

    #[test]
    fn status_change_is_precise() {
        let prev = tracked(); // status: Pending
        let mut fresh = snapshot();
        fresh.status = "Disposed".into();

        let events = detect(&prev, &fresh);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::StatusChange);
        assert_eq!(events[0].previous.as_deref(), Some("Pending"));
        assert_eq!(events[0].new_value, "Disposed");
        assert_eq!(events[0].case_id, "case-1");
    }

    #[test]
    fn sentinel_previous_status_is_suppressed() {
        let mut prev = tracked();
        prev.status = STATUS_UNKNOWN.into(); // first-ever check
        let mut fresh = snapshot();
        fresh.status = "Pending".into();

        let events = detect(&prev, &fresh);
        assert!(events.iter().all(|e| e.kind != ChangeKind::StatusChange));
    }

    #[test]
    fn multi_field_changes_are_independent_and_ordered() {
        let mut prev = tracked();
        prev.next_hearing_date = Some("2024-01-01".into());
        let mut fresh = snapshot();
        fresh.status = "Disposed".into();
        fresh.next_hearing_date = Some("2024-02-01".into());

        let events = detect(&prev, &fresh);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ChangeKind::StatusChange);
        assert_eq!(events[1].kind, ChangeKind::HearingDateChange);
        assert_eq!(events[1].previous.as_deref(), Some("2024-01-01"));
        assert_eq!(events[1].new_value, "2024-02-01");
    }

    #[test]
    fn empty_fresh_fields_never_fire() {
        let mut prev = tracked();
        prev.status = "Disposed".into();
        prev.next_hearing_date = Some("22-09-2025".into());
        prev.judges = Some("Sh. A. K. Menon".into());
        prev.last_order_date = Some("10-01-2025".into());

        // The fresh snapshot lost everything except a blank-ish status.
        let mut fresh = CaseSnapshot::empty();
        fresh.status = "   ".into();

        assert!(detect(&prev, &fresh).is_empty());
    }

    #[test]
    fn first_hearing_date_fires_with_no_previous() {
        let prev = tracked(); // next_hearing_date: None
        let mut fresh = snapshot();
        fresh.next_hearing_date = Some("2025-03-01".into());

        let events = detect(&prev, &fresh);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::HearingDateChange);
        assert_eq!(events[0].previous, None);
        assert_eq!(events[0].new_value, "2025-03-01");
    }

    #[test]
    fn new_order_embeds_summary_when_present() {
        let prev = tracked();
        let mut fresh = snapshot();
        fresh.last_order_date = Some("15-03-2025".into());
        fresh.last_order_summary = Some("Interim stay granted".into());

        let events = detect(&prev, &fresh);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::NewOrder);
        assert_eq!(events[0].new_value, "15-03-2025: Interim stay granted");
    }

    #[test]
    fn new_order_without_summary_is_just_the_date() {
        let prev = tracked();
        let mut fresh = snapshot();
        fresh.last_order_date = Some("15-03-2025".into());

        let events = detect(&prev, &fresh);
        assert_eq!(events[0].new_value, "15-03-2025");
    }

    #[test]
    fn judge_change_fires() {
        let mut prev = tracked();
        prev.judges = Some("Sh. A. K. Menon".into());
        let mut fresh = snapshot();
        fresh.judges = Some("Smt. R. Nair".into());

        let events = detect(&prev, &fresh);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::JudgeChange);
        assert_eq!(events[0].previous.as_deref(), Some("Sh. A. K. Menon"));
    }

    #[test]
    fn whitespace_drift_is_not_a_change() {
        let mut prev = tracked();
        prev.judges = Some("Sh. A. K. Menon".into());
        let mut fresh = snapshot();
        fresh.judges = Some("  Sh. A. K. Menon  ".into());

        assert!(detect(&prev, &fresh).is_empty());
    }

    #[test]
    fn detector_is_deterministic() {
        let mut prev = tracked();
        prev.next_hearing_date = Some("01-01-2024".into());
        let mut fresh = snapshot();
        fresh.status = "Disposed".into();
        fresh.next_hearing_date = Some("01-02-2024".into());
        fresh.judges = Some("Sh. X".into());
        fresh.last_order_date = Some("05-01-2024".into());

        let a = detect(&prev, &fresh);
        let b = detect(&prev, &fresh);
        let kinds_a: Vec<_> = a.iter().map(|e| e.kind).collect();
        let kinds_b: Vec<_> = b.iter().map(|e| e.kind).collect();
        assert_eq!(kinds_a, kinds_b);
        assert_eq!(
            kinds_a,
            vec![
                ChangeKind::StatusChange,
                ChangeKind::HearingDateChange,
                ChangeKind::NewOrder,
                ChangeKind::JudgeChange
            ]
        );
    }
}
