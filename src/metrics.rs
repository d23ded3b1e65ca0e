// ═══════════════════════════════════════════════════════════════
// METRICS + TRIGGER SERVER - Because if you can't measure it, it didn't happen
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for everything the pipeline does, plus a tiny HTTP
// server with exactly two routes:
//
//   GET  /metrics   JSON snapshot, for dashboards and the incurably curious
//   POST /run       the authenticated batch-run trigger
//
// The trigger is how runs start: an external scheduler POSTs here on a
// timer, and a human can POST here manually — same route, same effect,
// verified by an exact shared-secret match on the X-Trigger-Secret header.
// Responses:
//   202  run accepted and queued
//   401  secret missing or wrong (or no secret configured at all)
//   404  route does not exist
//   409  a run is already in flight — come back later
//
// Raw TCP with a hand-rolled request-line parser, because pulling in a web
// framework for two routes is how dependency trees become dependency
// forests. This is the Rust equivalent of mounting a turret on a
// skateboard, and it has never once let us down.

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// The metrics snapshot - what gets serialized to JSON
#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_rejected_overlap: u64,
    pub cases_checked: u64,
    pub cases_changed: u64,
    pub events_emitted: u64,
    pub soft_failures: u64,
    pub case_errors: u64,
    pub reminders_sent: u64,
    pub deadline_hits: u64,
    pub uptime_seconds: u64,
    pub status: String,
}

/// Thread-safe atomic metrics collector.
/// Every counter is atomic because mutexes are for the weak.
pub struct MetricsCollector {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_rejected_overlap: AtomicU64,
    cases_checked: AtomicU64,
    cases_changed: AtomicU64,
    events_emitted: AtomicU64,
    soft_failures: AtomicU64,
    case_errors: AtomicU64,
    reminders_sent: AtomicU64,
    deadline_hits: AtomicU64,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_rejected_overlap: AtomicU64::new(0),
            cases_checked: AtomicU64::new(0),
            cases_changed: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            soft_failures: AtomicU64::new(0),
            case_errors: AtomicU64::new(0),
            reminders_sent: AtomicU64::new(0),
            deadline_hits: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_rejected_overlap(&self) {
        self.runs_rejected_overlap.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cases_checked(&self, n: u64) {
        self.cases_checked.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_cases_changed(&self, n: u64) {
        self.cases_changed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_events_emitted(&self, n: u64) {
        self.events_emitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_soft_failures(&self, n: u64) {
        self.soft_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_case_errors(&self, n: u64) {
        self.case_errors.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_reminders_sent(&self, n: u64) {
        self.reminders_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn deadline_hit(&self) {
        self.deadline_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_rejected_overlap: self.runs_rejected_overlap.load(Ordering::Relaxed),
            cases_checked: self.cases_checked.load(Ordering::Relaxed),
            cases_changed: self.cases_changed.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            soft_failures: self.soft_failures.load(Ordering::Relaxed),
            case_errors: self.case_errors.load(Ordering::Relaxed),
            reminders_sent: self.reminders_sent.load(Ordering::Relaxed),
            deadline_hits: self.deadline_hits.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            status: "operational".to_string(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a run was triggered — logged with the run summary so operators can
/// tell the scheduler's work from a human's impatience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Scheduled => write!(f, "scheduled"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

/// The parsed-out essentials of an incoming request. A real HTTP parser
/// has 600 pages of RFC to honor; we have two routes.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MiniRequest {
    pub method: String,
    pub path: String,
    pub trigger_secret: Option<String>,
}

/// Parse the request head (everything before the blank line).
pub(crate) fn parse_request_head(head: &str) -> Option<MiniRequest> {
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut trigger_secret = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("x-trigger-secret") {
                trigger_secret = Some(value.trim().to_string());
            }
        }
    }

    Some(MiniRequest {
        method,
        path,
        trigger_secret,
    })
}

/// Decide what a request gets back. Pure, so the auth logic is testable
/// without sockets.
pub(crate) fn route(
    request: &MiniRequest,
    configured_secret: &str,
    run_accepted: bool,
) -> (u16, &'static str) {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/metrics") => (200, "metrics"),
        ("POST", "/run") => {
            // An empty configured secret rejects everything: the safest
            // possible misconfiguration.
            if configured_secret.is_empty()
                || request.trigger_secret.as_deref() != Some(configured_secret)
            {
                (401, "unauthorized")
            } else if run_accepted {
                (202, "accepted")
            } else {
                (409, "run already in flight")
            }
        }
        _ => (404, "not found"),
    }
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        202 => "Accepted",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Internal Server Error",
    }
}

/// Run the trigger+metrics HTTP server until shutdown.
/// Accepted triggers go down `run_tx`; the scheduler loop in main consumes
/// them. The channel has capacity 1, so try_send doubles as the overlap
/// check — a second trigger while one is queued or running gets a 409.
pub async fn run_http_server(
    metrics: Arc<MetricsCollector>,
    trigger_secret: String,
    port: u16,
    run_tx: mpsc::Sender<TriggerSource>,
    shutdown: &mut watch::Receiver<bool>,
) {
    use tokio::net::TcpListener;

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(l) => l,
        Err(e) => {
            error!(port = port, error = %e, "failed to bind trigger/metrics server");
            return;
        }
    };

    info!(port = port, "trigger/metrics server listening");

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, _addr)) => {
                        // Read the request head. 4 KiB is generous for a
                        // request with one interesting header.
                        let mut buf = vec![0u8; 4096];
                        let n = match stream.read(&mut buf).await {
                            Ok(n) => n,
                            Err(e) => {
                                debug!(error = %e, "trigger server: read failed");
                                continue;
                            }
                        };
                        let head = String::from_utf8_lossy(&buf[..n]);

                        let Some(request) = parse_request_head(&head) else {
                            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n").await;
                            continue;
                        };

                        // Only attempt to queue a run for authenticated
                        // trigger requests; route() re-checks and answers.
                        let wants_run = request.method == "POST"
                            && request.path == "/run"
                            && !trigger_secret.is_empty()
                            && request.trigger_secret.as_deref() == Some(trigger_secret.as_str());
                        let run_accepted = wants_run && run_tx.try_send(TriggerSource::Manual).is_ok();
                        if wants_run && !run_accepted {
                            metrics.run_rejected_overlap();
                            warn!("manual trigger rejected — a run is already in flight");
                        }

                        let (code, label) = route(&request, &trigger_secret, run_accepted);
                        let body = if code == 200 {
                            serde_json::to_string_pretty(&metrics.snapshot())
                                .unwrap_or_else(|_| "{}".to_string())
                        } else {
                            format!("{{\"status\":\"{}\"}}", label)
                        };

                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\n\r\n{}",
                            code,
                            status_text(code),
                            body.len(),
                            body,
                        );
                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        error!(error = %e, "trigger server: accept error");
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("trigger/metrics server: shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, path: &str, secret: Option<&str>) -> MiniRequest {
        MiniRequest {
            method: method.to_string(),
            path: path.to_string(),
            trigger_secret: secret.map(str::to_string),
        }
    }

    #[test]
    fn request_head_parses_method_path_and_secret() {
        let head = "POST /run HTTP/1.1\r\nHost: localhost\r\nX-Trigger-Secret: hunter2\r\n\r\n";
        let parsed = parse_request_head(head).unwrap();
        assert_eq!(parsed.method, "POST");
        assert_eq!(parsed.path, "/run");
        assert_eq!(parsed.trigger_secret.as_deref(), Some("hunter2"));
    }

    #[test]
    fn secret_header_name_is_case_insensitive() {
        let head = "POST /run HTTP/1.1\r\nx-trigger-secret: hunter2\r\n\r\n";
        let parsed = parse_request_head(head).unwrap();
        assert_eq!(parsed.trigger_secret.as_deref(), Some("hunter2"));
    }

    #[test]
    fn correct_secret_is_accepted() {
        let req = request("POST", "/run", Some("hunter2"));
        assert_eq!(route(&req, "hunter2", true), (202, "accepted"));
    }

    #[test]
    fn wrong_or_missing_secret_is_401() {
        assert_eq!(
            route(&request("POST", "/run", Some("wrong")), "hunter2", true).0,
            401
        );
        assert_eq!(route(&request("POST", "/run", None), "hunter2", true).0, 401);
    }

    #[test]
    fn empty_configured_secret_rejects_everything() {
        assert_eq!(route(&request("POST", "/run", Some("")), "", true).0, 401);
        assert_eq!(route(&request("POST", "/run", None), "", true).0, 401);
    }

    #[test]
    fn overlapping_run_is_409() {
        let req = request("POST", "/run", Some("hunter2"));
        assert_eq!(route(&req, "hunter2", false).0, 409);
    }

    #[test]
    fn metrics_route_and_unknown_route() {
        assert_eq!(route(&request("GET", "/metrics", None), "s", false).0, 200);
        assert_eq!(route(&request("GET", "/nope", None), "s", false).0, 404);
        assert_eq!(route(&request("DELETE", "/run", None), "s", false).0, 404);
    }

    #[test]
    fn snapshot_reflects_counters() {
        let m = MetricsCollector::new();
        m.run_started();
        m.add_cases_checked(4);
        m.add_events_emitted(2);
        m.deadline_hit();
        let snap = m.snapshot();
        assert_eq!(snap.runs_started, 1);
        assert_eq!(snap.cases_checked, 4);
        assert_eq!(snap.events_emitted, 2);
        assert_eq!(snap.deadline_hits, 1);
        assert_eq!(snap.status, "operational");
    }
}
