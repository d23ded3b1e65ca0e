// =============================================================================
// config.rs — THE GRAND CONFIGURATION CATHEDRAL
// =============================================================================
//
// Every system needs configuration, but not every system needs THIS MUCH
// configuration. We have knobs for knobs. Timeouts for timeouts. A policy
// enum that controls which providers get asked first, because apparently
// even our fallback order deserves a committee decision.
//
// All values can be overridden via environment variables, because hardcoding
// configuration is how you end up on the front page of Hacker News for the
// wrong reasons.
//
// Default values have been carefully chosen through a rigorous process of
// "that seems about right" and "the portal will probably IP-ban us if we
// go faster than this."
// =============================================================================

use std::env;
use std::time::Duration;

/// Which order the party-name search waterfall tries providers in.
///
/// This was tuned back and forth enough times that it's now an explicit,
/// named decision instead of something a refactor quietly flips:
/// - `OfficialFirst` asks the official portals (Supreme Court, eCourts)
///   and only falls back to the public search engine when they return
///   nothing. Authoritative, but you pay the CAPTCHA tax up front.
/// - `PublicFirst` asks the free public engine first — no CAPTCHA, fast —
///   and short-circuits on any non-empty result before touching the
///   official portals at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPolicy {
    OfficialFirst,
    PublicFirst,
}

impl SearchPolicy {
    fn from_env_value(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "public_first" | "public-first" | "publicfirst" => SearchPolicy::PublicFirst,
            _ => SearchPolicy::OfficialFirst,
        }
    }
}

/// The Grand Configuration Struct. Every tunable parameter in the entire
/// engine lives here. Think of it as the cockpit of a fighter jet, except
/// instead of weapons systems you're controlling how aggressively we poll
/// government court portals for signs of an adjournment.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // REDIS (STORE + NOTIFICATION CHANNEL)
    // =========================================================================

    /// Redis connection URL. Tracked cases live here, and change events get
    /// screamed into a pub/sub channel the web app listens on.
    /// Default: redis://127.0.0.1:6379
    pub redis_url: String,

    /// The pub/sub channel change events are published to.
    pub redis_channel: String,

    /// Key prefix for all engine-owned keys (tracked-case hash, the
    /// oldest-checked-first index, event log, delivery log).
    pub redis_key_prefix: String,

    // =========================================================================
    // UPSTREAM PORTALS
    // These are REAL public endpoints. No mocks. No fakes. Just pure,
    // unfiltered access to the machinery of Indian justice.
    // =========================================================================

    /// Supreme Court of India case status portal.
    pub sci_base_url: String,

    /// eCourts high court services portal.
    pub ecourts_hc_base_url: String,

    /// eCourts district court services portal.
    pub ecourts_district_base_url: String,

    /// The paid legal-data aggregator API base URL. Only used when an API
    /// key is configured — without one the provider politely sits out.
    pub aggregator_base_url: String,

    /// Aggregator API key. Empty = provider disabled.
    pub aggregator_api_key: String,

    /// Public legal-document search engine (Indian Kanoon's API host).
    /// Free, CAPTCHA-less, and glorious. Search-grade data only.
    pub public_search_base_url: String,

    // =========================================================================
    // VISION CAPTCHA SOLVER
    // =========================================================================

    /// OpenAI-compatible chat completions endpoint for CAPTCHA solving.
    pub vision_api_url: String,

    /// Vision API key. Empty = solver disabled, CAPTCHA-gated lookups
    /// degrade to soft failures.
    pub vision_api_key: String,

    /// Which vision model reads the squiggly arithmetic.
    pub vision_model: String,

    /// Timeout for one solve call. Vision models are slow; portals are
    /// slower; our patience is finite.
    pub vision_timeout: Duration,

    // =========================================================================
    // HTTP BEHAVIOR
    // =========================================================================

    /// Per-request timeout against the Supreme Court portal.
    pub sci_timeout: Duration,

    /// Per-request timeout against the eCourts portals. These are the
    /// slowest machines on the public internet. 15 seconds is optimism.
    pub ecourts_timeout: Duration,

    /// Per-request timeout against the aggregator and public search APIs.
    pub api_timeout: Duration,

    /// The User-Agent we present. The portals serve different (worse) HTML
    /// to things that don't look like browsers, so we look like a browser.
    pub user_agent: String,

    // =========================================================================
    // LOOKUP RETRY
    // =========================================================================

    /// Maximum attempts per logical lookup. Each attempt negotiates an
    /// entirely fresh session, because a rejected CAPTCHA poisons the whole
    /// session, not just the answer.
    pub max_lookup_attempts: u32,

    // =========================================================================
    // PIPELINE PACING
    // Because the eCourts servers are load-bearing infrastructure for a
    // billion people and also apparently two Pentium IIIs in a closet.
    // =========================================================================

    /// Delay between consecutive cases in a batch run.
    pub inter_case_delay: Duration,

    /// Wall-clock budget for one batch run. Checked once per case; a case
    /// already in flight when the deadline passes is allowed to finish.
    pub run_deadline: Duration,

    /// How far ahead the upcoming-hearing sweep looks.
    pub reminder_window: Duration,

    /// Interval between scheduled pipeline runs. Zero disables the internal
    /// scheduler (external cron then owns the trigger).
    pub run_interval: Duration,

    // =========================================================================
    // PORTAL COOLDOWN GATE
    // =========================================================================

    /// Consecutive failures before a portal goes into cooldown.
    pub gate_failure_threshold: u32,

    /// Initial cooldown once a portal trips. Doubles per consecutive trip.
    pub gate_base_cooldown: Duration,

    /// Cooldown growth ceiling.
    pub gate_max_cooldown: Duration,

    // =========================================================================
    // REMINDER LEDGER
    // =========================================================================

    /// Expected reminder keys per day for the bloom filter sizing.
    pub ledger_expected_items: u64,

    /// Bloom false-positive rate. A false positive here means one missed
    /// reminder out of ~1000, which beats one duplicate out of one.
    pub ledger_false_positive_rate: f64,

    /// LRU backup capacity behind the bloom filter.
    pub ledger_lru_size: usize,

    // =========================================================================
    // TRIGGER + METRICS SERVER
    // =========================================================================

    /// Port for the trigger/metrics HTTP server.
    pub http_port: u16,

    /// Shared secret for the batch-run trigger. An empty secret rejects
    /// every trigger, which is the safest possible misconfiguration.
    pub trigger_secret: String,

    // =========================================================================
    // SEARCH POLICY
    // =========================================================================

    /// Party-name search waterfall ordering. See [`SearchPolicy`].
    pub search_policy: SearchPolicy,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    /// "Sensible" here meaning "will work out of the box without any env
    /// vars but will also respect your wishes if you set them."
    ///
    /// Every parameter can be overridden via variables prefixed with
    /// DOCKET_WATCH_. Namespacing your env vars is what separates the
    /// professionals from the amateurs.
    pub fn from_env() -> Self {
        // Try to load .env if it exists. Fail silently if it doesn't,
        // because not everyone has their life together enough to create one.
        let _ = dotenvy::dotenv();

        Config {
            // Redis
            redis_url: env_or_default("DOCKET_WATCH_REDIS_URL", "redis://127.0.0.1:6379"),
            redis_channel: env_or_default("DOCKET_WATCH_REDIS_CHANNEL", "case:changes"),
            redis_key_prefix: env_or_default("DOCKET_WATCH_REDIS_PREFIX", "docket_watch"),

            // Upstream portals — the real deal
            sci_base_url: env_or_default("DOCKET_WATCH_SCI_BASE_URL", "https://main.sci.gov.in"),
            ecourts_hc_base_url: env_or_default(
                "DOCKET_WATCH_ECOURTS_HC_BASE_URL",
                "https://hcservices.ecourts.gov.in/hcservices",
            ),
            ecourts_district_base_url: env_or_default(
                "DOCKET_WATCH_ECOURTS_DISTRICT_BASE_URL",
                "https://services.ecourts.gov.in/ecourtindia_v6",
            ),
            aggregator_base_url: env_or_default(
                "DOCKET_WATCH_AGGREGATOR_BASE_URL",
                "https://api.legaldata.example/v1",
            ),
            aggregator_api_key: env_or_default("DOCKET_WATCH_AGGREGATOR_API_KEY", ""),
            public_search_base_url: env_or_default(
                "DOCKET_WATCH_PUBLIC_SEARCH_BASE_URL",
                "https://api.indiankanoon.org",
            ),

            // Vision solver
            vision_api_url: env_or_default(
                "DOCKET_WATCH_VISION_API_URL",
                "https://api.openai.com/v1/chat/completions",
            ),
            vision_api_key: env_or_default("DOCKET_WATCH_VISION_API_KEY", ""),
            vision_model: env_or_default("DOCKET_WATCH_VISION_MODEL", "gpt-4o-mini"),
            vision_timeout: secs("DOCKET_WATCH_VISION_TIMEOUT_SECS", 15),

            // HTTP behavior
            sci_timeout: secs("DOCKET_WATCH_SCI_TIMEOUT_SECS", 12),
            ecourts_timeout: secs("DOCKET_WATCH_ECOURTS_TIMEOUT_SECS", 15),
            api_timeout: secs("DOCKET_WATCH_API_TIMEOUT_SECS", 9),
            user_agent: env_or_default(
                "DOCKET_WATCH_USER_AGENT",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),

            // Lookup retry
            max_lookup_attempts: env_or_default("DOCKET_WATCH_MAX_LOOKUP_ATTEMPTS", "3")
                .parse()
                .unwrap_or(3),

            // Pipeline pacing
            inter_case_delay: secs("DOCKET_WATCH_INTER_CASE_DELAY_SECS", 1),
            run_deadline: secs("DOCKET_WATCH_RUN_DEADLINE_SECS", 55),
            reminder_window: secs("DOCKET_WATCH_REMINDER_WINDOW_SECS", 24 * 3600),
            run_interval: secs("DOCKET_WATCH_RUN_INTERVAL_SECS", 1800),

            // Cooldown gate
            gate_failure_threshold: env_or_default("DOCKET_WATCH_GATE_FAILURES", "4")
                .parse()
                .unwrap_or(4),
            gate_base_cooldown: secs("DOCKET_WATCH_GATE_BASE_COOLDOWN_SECS", 120),
            gate_max_cooldown: secs("DOCKET_WATCH_GATE_MAX_COOLDOWN_SECS", 1800),

            // Reminder ledger
            ledger_expected_items: env_or_default("DOCKET_WATCH_LEDGER_ITEMS", "50000")
                .parse()
                .unwrap_or(50_000),
            ledger_false_positive_rate: env_or_default("DOCKET_WATCH_LEDGER_FP_RATE", "0.001")
                .parse()
                .unwrap_or(0.001),
            ledger_lru_size: env_or_default("DOCKET_WATCH_LEDGER_LRU_SIZE", "10000")
                .parse()
                .unwrap_or(10_000),

            // Trigger + metrics server
            http_port: env_or_default("DOCKET_WATCH_HTTP_PORT", "9090")
                .parse()
                .unwrap_or(9090),
            trigger_secret: env_or_default("DOCKET_WATCH_TRIGGER_SECRET", ""),

            // Search policy
            search_policy: SearchPolicy::from_env_value(&env_or_default(
                "DOCKET_WATCH_SEARCH_POLICY",
                "official_first",
            )),
        }
    }
}

/// Helper to read an environment variable with a default fallback.
/// Because unwrap_or on env::var is ugly and we have standards.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Same, but for the many knobs measured in seconds.
fn secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        env_or_default(key, &default.to_string())
            .parse()
            .unwrap_or(default),
    )
}
