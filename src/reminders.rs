// =============================================================================
// reminders.rs — THE DO-NOT-NAG LEDGER
// =============================================================================
//
// The pipeline sweeps for hearings landing in the next 24 hours and emits a
// reminder for each. The pipeline also runs every half hour. Without a
// ledger, a user with a hearing tomorrow would be reminded 48 times, which
// is less "helpful legal assistant" and more "anxiety dispenser".
//
// So: one reminder per case per calendar day, enforced by a hybrid
// Bloom filter + LRU cache.
//
// 1. The Bloom filter answers "definitely not reminded today" in O(1).
//    Bloom filters never have false negatives, so a "no" is gospel.
// 2. On a Bloom "maybe", the LRU cache gives the definitive answer —
//    catching the filter's occasional false positive, which here would
//    mean silently SKIPPING a reminder someone wanted.
// 3. The whole apparatus resets when the calendar day rolls over; keys
//    are day-scoped, so yesterday's ledger is pure noise.
//
// Is this overkill for a few thousand reminder keys a day? Yes.
// Could a HashSet do it? Also yes.
// Are we using a HashSet? Absolutely not.
// =============================================================================

use bloomfilter::Bloom;
use chrono::NaiveDate;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use tracing::{debug, info};

/// Ledger statistics, for the metrics endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerSnapshot {
    pub checks: u64,
    pub reminders_allowed: u64,
    pub reminders_suppressed: u64,
    pub day_rotations: u64,
}

struct LedgerInner {
    bloom: Bloom<String>,
    lru: LruCache<String, bool>,
    day: Option<NaiveDate>,
    checks: u64,
    allowed: u64,
    suppressed: u64,
    rotations: u64,
}

/// The reminder dedup ledger. In-process only: a restart forgets the day's
/// ledger and may repeat at most one reminder per case, which we accept in
/// exchange for keeping the store schema out of it.
pub struct ReminderLedger {
    inner: RwLock<LedgerInner>,
    expected_items: u64,
    fp_rate: f64,
    lru_capacity: usize,
}

impl ReminderLedger {
    pub fn new(expected_items: u64, fp_rate: f64, lru_capacity: usize) -> Self {
        info!(
            expected_items = expected_items,
            fp_rate = fp_rate,
            lru_capacity = lru_capacity,
            "reminder ledger online — users will be nagged exactly once"
        );
        Self {
            inner: RwLock::new(LedgerInner {
                bloom: Bloom::new_for_fp_rate(expected_items as usize, fp_rate),
                lru: LruCache::new(nonzero(lru_capacity)),
                day: None,
                checks: 0,
                allowed: 0,
                suppressed: 0,
                rotations: 0,
            }),
            expected_items,
            fp_rate,
            lru_capacity,
        }
    }

    /// Has this reminder already gone out today? If not, mark it sent and
    /// return true. `today` is passed in rather than read from the clock so
    /// the pipeline and the ledger agree on what day it is, tests included.
    pub fn check_and_mark(&self, key: &str, today: NaiveDate) -> bool {
        let mut inner = self.inner.write();
        inner.checks += 1;

        // Day rollover: yesterday's ledger is irrelevant by construction
        // (keys embed the date), so a fresh filter keeps the bloom from
        // slowly saturating into a yes-machine.
        if inner.day != Some(today) {
            inner.bloom = Bloom::new_for_fp_rate(self.expected_items as usize, self.fp_rate);
            inner.lru = LruCache::new(nonzero(self.lru_capacity));
            inner.day = Some(today);
            inner.rotations += 1;
            debug!(day = %today, "reminder ledger rotated for a new day");
        }

        let key_owned = key.to_string();
        if inner.bloom.check(&key_owned) {
            // Bloom says "maybe seen". The LRU arbitrates.
            if inner.lru.get(&key_owned).is_some() {
                inner.suppressed += 1;
                debug!(key = key, "reminder suppressed — already sent today");
                return false;
            }
            // Bloom false positive rescued by the LRU: actually new.
        }

        inner.bloom.set(&key_owned);
        inner.lru.put(key_owned, true);
        inner.allowed += 1;
        true
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.read();
        LedgerSnapshot {
            checks: inner.checks,
            reminders_allowed: inner.allowed,
            reminders_suppressed: inner.suppressed,
            day_rotations: inner.rotations,
        }
    }
}

fn nonzero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or_else(|| NonZeroUsize::new(1000).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    #[test]
    fn first_reminder_is_allowed() {
        let ledger = ReminderLedger::new(1000, 0.001, 100);
        assert!(ledger.check_and_mark("remind:case-1:2025-08-06", day(6)));
    }

    #[test]
    fn second_reminder_same_day_is_suppressed() {
        let ledger = ReminderLedger::new(1000, 0.001, 100);
        assert!(ledger.check_and_mark("remind:case-1:2025-08-06", day(6)));
        assert!(!ledger.check_and_mark("remind:case-1:2025-08-06", day(6)));
        let snap = ledger.snapshot();
        assert_eq!(snap.reminders_allowed, 1);
        assert_eq!(snap.reminders_suppressed, 1);
    }

    #[test]
    fn different_cases_do_not_collide() {
        let ledger = ReminderLedger::new(1000, 0.001, 100);
        assert!(ledger.check_and_mark("remind:case-1:2025-08-06", day(6)));
        assert!(ledger.check_and_mark("remind:case-2:2025-08-06", day(6)));
    }

    #[test]
    fn day_rollover_resets_the_ledger() {
        let ledger = ReminderLedger::new(1000, 0.001, 100);
        assert!(ledger.check_and_mark("remind:case-1:2025-08-06", day(6)));
        // Next day, same case (and a new day-scoped key): allowed again.
        assert!(ledger.check_and_mark("remind:case-1:2025-08-07", day(7)));
        assert_eq!(ledger.snapshot().day_rotations, 2);
    }
}
