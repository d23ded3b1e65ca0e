// =============================================================================
// backoff.rs — THE PORTAL COOLDOWN GATE
// =============================================================================
//
// Government court portals go down. Not "sometimes" — as a matter of
// routine, like a scheduled municipal service. When one does, hammering it
// with more requests is (1) pointless, (2) rude, and (3) a good way to get
// the engine's IP added to a blocklist maintained by someone who will never
// answer your email.
//
// So every portal gets a gate. After N consecutive failures the gate closes
// and lookups against that portal are skipped outright for a cooldown
// period. Each consecutive trip doubles the cooldown, up to a ceiling. One
// success resets everything.
//
// A full three-state breaker with half-open probing would be overkill here:
// the pipeline is a single sequential loop, so "the next real request" IS
// the probe. Two states, a counter, and a clock. That's the whole machine.
// =============================================================================

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

struct GateInner {
    consecutive_failures: u32,
    /// How many times the gate has tripped without an intervening success.
    /// Drives the cooldown doubling.
    trip_streak: u32,
    cooling_until: Option<Instant>,
    total_trips: u64,
}

/// Per-portal failure gate. Thread-safe because the trigger server and the
/// scheduler both own Arcs to the providers, even though runs themselves
/// are serialized.
pub struct PortalGate {
    /// Portal name for logs and metrics, so we know WHICH government
    /// server is having a personal day.
    name: &'static str,
    failure_threshold: u32,
    base_cooldown: Duration,
    max_cooldown: Duration,
    inner: Mutex<GateInner>,
}

impl PortalGate {
    pub fn new(
        name: &'static str,
        failure_threshold: u32,
        base_cooldown: Duration,
        max_cooldown: Duration,
    ) -> Self {
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            base_cooldown,
            max_cooldown,
            inner: Mutex::new(GateInner {
                consecutive_failures: 0,
                trip_streak: 0,
                cooling_until: None,
                total_trips: 0,
            }),
        }
    }

    /// Is this portal worth talking to right now?
    /// A gate whose cooldown has lapsed answers yes — the caller's next
    /// request doubles as the recovery probe.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.cooling_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                // Cooldown lapsed. Clear it; the trip streak stays so the
                // next trip cools for longer.
                inner.cooling_until = None;
                info!(portal = self.name, "gate: cooldown lapsed — next request is the probe");
                true
            }
            None => true,
        }
    }

    /// One request against the portal worked. All is forgiven.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.trip_streak = 0;
        inner.cooling_until = None;
    }

    /// One request against the portal failed (transport-level — a
    /// NoRecord answer is a success as far as the gate cares).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures < self.failure_threshold {
            return;
        }

        // Trip: cooldown doubles per consecutive trip, capped.
        let cooldown = self
            .base_cooldown
            .saturating_mul(1u32 << inner.trip_streak.min(16))
            .min(self.max_cooldown);
        inner.cooling_until = Some(Instant::now() + cooldown);
        inner.consecutive_failures = 0;
        inner.trip_streak += 1;
        inner.total_trips += 1;
        warn!(
            portal = self.name,
            cooldown_secs = cooldown.as_secs(),
            trips = inner.total_trips,
            "gate: portal tripped into cooldown"
        );
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Lifetime trip count, for the metrics endpoint.
    pub fn total_trips(&self) -> u64 {
        self.inner.lock().total_trips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> PortalGate {
        PortalGate::new("test-portal", 3, Duration::from_secs(60), Duration::from_secs(600))
    }

    #[test]
    fn starts_open() {
        let g = gate();
        assert!(g.is_open());
        assert_eq!(g.total_trips(), 0);
    }

    #[test]
    fn trips_after_threshold_failures() {
        let g = gate();
        g.record_failure();
        g.record_failure();
        assert!(g.is_open());
        g.record_failure();
        assert!(!g.is_open());
        assert_eq!(g.total_trips(), 1);
    }

    #[test]
    fn success_resets_the_streak() {
        let g = gate();
        g.record_failure();
        g.record_failure();
        g.record_success();
        g.record_failure();
        g.record_failure();
        assert!(g.is_open());
    }

    #[test]
    fn zero_cooldown_gate_reopens_immediately() {
        let g = PortalGate::new("instant", 1, Duration::ZERO, Duration::ZERO);
        g.record_failure();
        // Cooldown of zero has already lapsed; the gate reopens and the
        // next request acts as the probe.
        assert!(g.is_open());
        assert_eq!(g.total_trips(), 1);
    }

    #[test]
    fn failed_probe_retrips_at_once() {
        let g = PortalGate::new("instant", 2, Duration::ZERO, Duration::ZERO);
        g.record_failure();
        g.record_failure(); // trip #1
        assert!(g.is_open()); // zero cooldown lapsed
        g.record_failure();
        g.record_failure(); // trip #2
        assert_eq!(g.total_trips(), 2);
    }
}
