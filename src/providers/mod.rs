// =============================================================================
// providers/mod.rs — THE WAR ROOM
// =============================================================================
//
// This module is the command center for our four-headed hydra of case
// resolution. Each provider adapts one upstream source — the Supreme Court
// portal, the eCourts portals, a paid aggregator API, a free public search
// engine — behind one trait, so the orchestrator can line them up, knock
// them down, and never care which one actually answered.
//
// Three rules every provider lives by:
//
// 1. CAPABILITIES ARE DECLARED, NOT DISCOVERED. A provider that can't do
//    CNR lookups says so in its descriptor. Nobody calls a method to find
//    out it doesn't exist.
//
// 2. "NO SUCH CASE" IS NOT AN ERROR. It's Ok(None). Errors are for
//    transport failures and CAPTCHA rejections — things that say nothing
//    about whether the case exists.
//
// 3. THE RETRY LOOP LIVES HERE, ONCE. Session + CAPTCHA retry used to be
//    copy-pasted into every provider, and the copies drifted until one of
//    them quietly had no retry at all. Now there is exactly one
//    retry_with_fresh_session, and every session-gated lookup goes
//    through it.
// =============================================================================

pub mod aggregator;
pub mod ecourts;
pub mod public_search;
pub mod supreme_court;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{CaseIdentifier, CaseSnapshot, ProviderKind, SearchQuery, SearchResult};

/// Ways a provider attempt can fail. "The case doesn't exist" is not on
/// this list on purpose — that's a successful answer of None.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The vision solver is unconfigured or erroring. Recoverable in the
    /// sense that the rest of the batch continues; this lookup is toast.
    #[error("CAPTCHA solver unavailable")]
    SolverUnavailable,

    /// The portal rejected our CAPTCHA answer. Recoverable with a fresh
    /// session, bounded by the retry loop.
    #[error("upstream rejected the CAPTCHA answer")]
    CaptchaRejected,

    /// Network failure, timeout, non-2xx with no recognizable reason.
    /// Terminal for this provider attempt; the orchestrator moves on.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// What one lookup attempt concluded, for the shared retry loop.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// Parsed a result. Done.
    Success(T),
    /// The portal explicitly said there's no such case. Done, answer is None.
    NoRecord,
    /// The portal rejected the CAPTCHA. The whole session is poisoned —
    /// retry means a brand new handshake, not a new answer on old cookies.
    CaptchaRejected,
}

/// A provider's self-declared capabilities. Checked before calling, so
/// "does this provider do CNR lookups" is a field read, not an experiment.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    /// Can this provider resolve a case by CNR registry number?
    pub supports_registry_lookup: bool,
    /// Can this provider return full case status at all? The public search
    /// engine can't — it's search-grade summaries only.
    pub supports_status_lookup: bool,
}

/// The common contract over every upstream source.
#[async_trait]
pub trait CourtProvider: Send + Sync {
    fn descriptor(&self) -> ProviderDescriptor;

    /// Party-name search. Best-effort, possibly empty, never panics the
    /// waterfall.
    async fn search_by_party(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError>;

    /// Full status lookup by (type, number, year) identifier.
    async fn get_status(
        &self,
        identifier: &CaseIdentifier,
    ) -> Result<Option<CaseSnapshot>, ProviderError>;

    /// Status lookup by CNR registry number. Default: capability absent,
    /// answer immediately with None — never guess.
    async fn get_status_by_cnr(&self, cnr: &str) -> Result<Option<CaseSnapshot>, ProviderError> {
        let _ = cnr;
        Ok(None)
    }
}

/// The one shared session+CAPTCHA retry loop.
///
/// Runs `attempt` up to `max_attempts` times. Every attempt is expected to
/// negotiate an ENTIRELY fresh session internally — a rejected CAPTCHA
/// invalidates cookies, token, and answer together, so there is nothing
/// worth salvaging between attempts.
///
/// Exhausting the attempts yields Ok(None), not an error: "we couldn't get
/// past the door" and "the case doesn't exist" look identical to the
/// caller, and both mean "try the next provider".
pub async fn retry_with_fresh_session<T, F, Fut>(
    portal: &str,
    max_attempts: u32,
    mut attempt: F,
) -> Result<Option<T>, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<AttemptOutcome<T>, ProviderError>>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        match attempt(n).await? {
            AttemptOutcome::Success(value) => return Ok(Some(value)),
            AttemptOutcome::NoRecord => {
                debug!(portal = portal, attempt = n, "lookup: portal reports no record");
                return Ok(None);
            }
            AttemptOutcome::CaptchaRejected => {
                warn!(
                    portal = portal,
                    attempt = n,
                    max = max_attempts,
                    "lookup: CAPTCHA rejected — discarding session and starting over"
                );
            }
        }
    }
    warn!(
        portal = portal,
        attempts = max_attempts,
        "lookup: CAPTCHA retry budget exhausted — giving up on this provider"
    );
    Ok(None)
}

/// Build the browser-impersonating HTTP client the portals demand.
/// The headers are not a design choice — the portals serve different
/// (broken) markup to anything that doesn't look like Chrome.
pub(crate) fn browser_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-IN,en;q=0.9,hi;q=0.8"));

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent.to_string())
        .default_headers(headers)
        .build()
        .expect("failed to build portal HTTP client")
}

/// Did the portal reject our CAPTCHA answer? The portals phrase this a
/// dozen ways; these substrings cover the ones we've actually seen.
pub(crate) fn looks_like_captcha_rejection(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["invalid captcha", "incorrect captcha", "wrong captcha", "captcha mismatch", "enter captcha"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Did the portal explicitly say there's no matching case?
pub(crate) fn looks_like_no_record(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["no record found", "no records found", "record not found", "no data found", "no case found"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_fresh_session("test", 3, |_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>(AttemptOutcome::Success(42)) }
        })
        .await;
        assert_eq!(result.unwrap(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_stops_on_no_record() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<u32>, _> = retry_with_fresh_session("test", 3, |_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(AttemptOutcome::NoRecord) }
        })
        .await;
        assert_eq!(result.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn captcha_rejection_burns_exactly_the_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<u32>, _> = retry_with_fresh_session("test", 3, |_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(AttemptOutcome::CaptchaRejected) }
        })
        .await;
        // Exhausted budget is Ok(None), not an error.
        assert_eq!(result.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejection_then_success_uses_two_attempts() {
        let calls = AtomicU32::new(0);
        let result = retry_with_fresh_session("test", 3, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    Ok::<_, ProviderError>(AttemptOutcome::CaptchaRejected)
                } else {
                    Ok(AttemptOutcome::Success("parsed"))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), Some("parsed"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transport_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<u32>, _> = retry_with_fresh_session("test", 3, |_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Transport("connection reset".into())) }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn captcha_rejection_phrases() {
        assert!(looks_like_captcha_rejection("<b>Invalid CAPTCHA entered</b>"));
        assert!(looks_like_captcha_rejection("Wrong Captcha. Try again."));
        assert!(!looks_like_captcha_rejection("<td>Case Status</td>"));
    }

    #[test]
    fn no_record_phrases() {
        assert!(looks_like_no_record("NO RECORD FOUND for the given criteria"));
        assert!(looks_like_no_record("Record Not Found"));
        assert!(!looks_like_no_record("<td>Disposed</td>"));
    }
}
