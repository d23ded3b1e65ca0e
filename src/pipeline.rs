// =============================================================================
// pipeline.rs — THE BATCH DRIVER
// =============================================================================
//
// One run: read the active docket oldest-checked-first, and for each case —
// resolve, diff, persist, notify — with a polite pause between cases and a
// hard eye on the clock.
//
// The pacing rules are the personality of this module:
//
//   * STRICTLY SEQUENTIAL. No parallel case resolution, ever. The delay
//     between cases only means something if the cases actually queue, and
//     the eCourts servers deserve whatever gentleness we can afford.
//
//   * DEADLINE, CHECKED ONCE PER CASE. Before starting each case we ask
//     "is there budget left?" — and that's the only time we ask. A case
//     already in flight when the budget expires finishes; a run can
//     overshoot by one worst-case portal timeout and that's fine. Work
//     already done is never thrown away.
//
//   * FAILURE IS PER-CASE. One case that won't resolve advances its
//     last-checked timestamp (so it doesn't hog the front of the queue)
//     and counts as a soft failure. One case whose store write fails gets
//     counted and logged. Neither stops case N+1. The only run-fatal
//     condition is failing to read the docket at all.
//
// After the main loop, a reminder sweep finds hearings within the next
// day and emits hearing_reminder events, deduped through the ledger so a
// 30-minute trigger cadence doesn't become a 30-minute nag cadence.
// =============================================================================

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::diff::detect;
use crate::metrics::{MetricsCollector, TriggerSource};
use crate::models::{parse_flexible_date, ChangeEvent, ChangeKind, TrackedCase};
use crate::notify::Notifier;
use crate::reminders::ReminderLedger;
use crate::resolve::CourtResolutionService;
use crate::store::{CaseStore, StoreError};

/// The pacing knobs, split from Config so tests can squeeze a whole
/// "55-second" run into a few paused-clock milliseconds.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Pause between consecutive cases.
    pub inter_case_delay: Duration,
    /// Wall-clock budget for the run. Checked once per case.
    pub run_deadline: Duration,
    /// How far ahead the reminder sweep looks.
    pub reminder_window: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inter_case_delay: config.inter_case_delay,
            run_deadline: config.run_deadline,
            reminder_window: config.reminder_window,
        }
    }
}

/// What one run accomplished. Logged, surfaced through metrics, and — on a
/// good day — full of zeros.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub cases_total: usize,
    pub cases_checked: usize,
    pub cases_changed: usize,
    pub events_emitted: usize,
    pub soft_failures: usize,
    pub case_errors: usize,
    pub reminders_sent: usize,
    pub deadline_hit: bool,
}

/// The batch driver. Construct once, run on every trigger.
pub struct UpdatePipeline {
    resolution: Arc<CourtResolutionService>,
    store: Arc<dyn CaseStore>,
    notifier: Arc<dyn Notifier>,
    ledger: Arc<ReminderLedger>,
    metrics: Arc<MetricsCollector>,
    settings: PipelineSettings,
}

impl UpdatePipeline {
    pub fn new(
        resolution: Arc<CourtResolutionService>,
        store: Arc<dyn CaseStore>,
        notifier: Arc<dyn Notifier>,
        ledger: Arc<ReminderLedger>,
        metrics: Arc<MetricsCollector>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolution,
            store,
            notifier,
            ledger,
            metrics,
            settings,
        }
    }

    /// Execute one batch run. Err only when the initial docket read fails —
    /// that's the condition operational alerting needs to see.
    pub async fn run(&self, source: TriggerSource) -> Result<RunSummary, StoreError> {
        self.metrics.run_started();
        let started = tokio::time::Instant::now();

        let cases = match self.store.active_cases_oldest_first().await {
            Ok(cases) => cases,
            Err(e) => {
                self.metrics.run_failed();
                error!(error = %e, "pipeline: FATAL — could not read the active docket");
                return Err(e);
            }
        };

        let mut summary = RunSummary {
            cases_total: cases.len(),
            ..Default::default()
        };
        info!(
            trigger = %source,
            cases = cases.len(),
            deadline_secs = self.settings.run_deadline.as_secs(),
            "pipeline: run starting"
        );

        for (index, case) in cases.iter().enumerate() {
            if started.elapsed() >= self.settings.run_deadline {
                summary.deadline_hit = true;
                self.metrics.deadline_hit();
                info!(
                    processed = summary.cases_checked,
                    remaining = cases.len() - index,
                    "pipeline: wall-clock budget spent — stopping here, work is preserved"
                );
                break;
            }

            self.process_case(case, &mut summary).await;

            // Inter-case pacing. The last case in the docket gets no
            // trailing pause — there's nobody behind it to be polite to.
            if index + 1 < cases.len() {
                tokio::time::sleep(self.settings.inter_case_delay).await;
            }
        }

        self.reminder_sweep(&mut summary).await;

        self.metrics.add_cases_checked(summary.cases_checked as u64);
        self.metrics.add_cases_changed(summary.cases_changed as u64);
        self.metrics.add_events_emitted(summary.events_emitted as u64);
        self.metrics.add_soft_failures(summary.soft_failures as u64);
        self.metrics.add_case_errors(summary.case_errors as u64);
        self.metrics.add_reminders_sent(summary.reminders_sent as u64);
        self.metrics.run_completed();

        info!(
            trigger = %source,
            checked = summary.cases_checked,
            changed = summary.cases_changed,
            events = summary.events_emitted,
            soft_failures = summary.soft_failures,
            reminders = summary.reminders_sent,
            deadline_hit = summary.deadline_hit,
            "pipeline: run complete"
        );
        Ok(summary)
    }

    /// One case, fully isolated: nothing that happens in here stops the
    /// next case from getting its turn.
    async fn process_case(&self, case: &TrackedCase, summary: &mut RunSummary) {
        summary.cases_checked += 1;
        let now = Utc::now();

        let fresh = self.resolution.resolve_status(&case.identifier).await;

        let Some(fresh) = fresh else {
            // Unresolvable this cycle. The timestamp still advances so the
            // case goes to the back of the queue instead of blocking the
            // front of it forever; the user just sees slightly stale data.
            summary.soft_failures += 1;
            debug!(case = %case.identifier, "pipeline: unresolvable this cycle — soft failure");
            let mut updated = case.clone();
            updated.last_checked_at = Some(now);
            if let Err(e) = self.store.update_case(&updated).await {
                summary.case_errors += 1;
                warn!(case_id = %case.id, error = %e, "pipeline: timestamp write failed");
            }
            return;
        };

        // Diff against the OLD state before absorbing the new one.
        let events = detect(case, &fresh);

        for event in &events {
            if let Err(e) = self.store.append_change_event(event).await {
                summary.case_errors += 1;
                error!(event_id = %event.id, error = %e, "pipeline: change event persist failed");
            }
            self.notifier.dispatch(event).await;
        }

        let mut updated = case.clone();
        updated.absorb_snapshot(&fresh);
        updated.last_checked_at = Some(now);
        if !events.is_empty() {
            updated.last_changed_at = Some(now);
            summary.cases_changed += 1;
        }
        summary.events_emitted += events.len();

        if let Err(e) = self.store.update_case(&updated).await {
            summary.case_errors += 1;
            error!(case_id = %case.id, error = %e, "pipeline: case write-back failed");
        }
    }

    /// The upcoming-hearing sweep: every active case whose next hearing
    /// falls inside the window gets one reminder — today's first run wins,
    /// the rest hit the ledger.
    async fn reminder_sweep(&self, summary: &mut RunSummary) {
        let cases = match self.store.active_cases_oldest_first().await {
            Ok(cases) => cases,
            Err(e) => {
                // Not fatal: the main batch already did its work. The
                // reminders will catch up next cycle.
                warn!(error = %e, "pipeline: reminder sweep skipped — docket re-read failed");
                return;
            }
        };

        let today = Utc::now().date_naive();
        // Date-granular data vs a duration window: a hearing "within 24
        // hours" is one dated today or tomorrow.
        let max_days_ahead = (self.settings.reminder_window.as_secs() / 86_400).max(1) as i64;

        for case in &cases {
            let Some(raw) = case.next_hearing_date.as_deref() else {
                continue;
            };
            let Some(hearing) = parse_flexible_date(raw) else {
                continue;
            };
            let days_until = (hearing - today).num_days();
            if !(0..=max_days_ahead).contains(&days_until) {
                continue;
            }
            if !self.ledger.check_and_mark(&case.reminder_key(today), today) {
                continue;
            }

            let event = ChangeEvent::new(
                case,
                ChangeKind::HearingReminder,
                "next_hearing_date",
                None,
                format!("Hearing on {}", raw.trim()),
            );
            if let Err(e) = self.store.append_change_event(&event).await {
                summary.case_errors += 1;
                error!(event_id = %event.id, error = %e, "pipeline: reminder persist failed");
            }
            self.notifier.dispatch(&event).await;
            summary.reminders_sent += 1;
            info!(
                case = %event.case_title,
                hearing = raw,
                "pipeline: hearing reminder emitted"
            );
        }
    }
}
