// =============================================================================
// captcha.rs — THE ARITHMETIC HOMEWORK OUTSOURCING DEPARTMENT
// =============================================================================
//
// The court portals guard public case records behind CAPTCHA images of
// squiggly arithmetic ("4 + 7 = ?"), presumably to keep out robots. We are
// a robot. So we forward the homework to a multimodal vision model, which
// reads the squiggle with the full weight of several billion parameters and
// returns "11".
//
// Using a frontier vision model to do single-digit addition is the computing
// equivalent of hiring a senior advocate to fill out a parking ticket.
// It is also the only approach that reliably works, so here we are.
//
// Contract: solve() returns Some(answer) or None. NEVER an error. An
// unconfigured key, a dead endpoint, a garbled reply — all of these mean
// "this lookup attempt won't have a CAPTCHA answer", and the caller's retry
// policy takes it from there. The solver holds no state; every call is
// independent homework.
// =============================================================================

use base64::Engine;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::Config;

/// First run of digits anywhere in the reply. Vision models love prose
/// ("The answer to the expression is 11."); we love the 11.
static NUMERIC_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("numeric-token regex is invalid somehow"));

/// Chat-completions response, reduced to the one field we care about.
/// Everything optional, because a 200 with a surprise body shape is a
/// solver failure, not a crash.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// The vision-backed CAPTCHA solver. Stateless between calls: one image in,
/// one best-effort answer out.
pub struct CaptchaSolver {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl CaptchaSolver {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.vision_timeout)
            .build()
            .expect("failed to build vision HTTP client");
        Self {
            client,
            api_url: config.vision_api_url.clone(),
            api_key: config.vision_api_key.clone(),
            model: config.vision_model.clone(),
        }
    }

    /// Whether a vision key is configured at all. Without one, every
    /// CAPTCHA-gated portal is effectively offline for us — callers can
    /// check this to log the situation once instead of per lookup.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Solve a CAPTCHA image. Returns the first numeric token of the
    /// model's reply, or None for every flavor of failure: no key, network
    /// error, non-2xx, unparseable body, or a reply with no digits in it.
    pub async fn solve(&self, image_bytes: &[u8]) -> Option<String> {
        if !self.is_configured() {
            debug!("CAPTCHA solver: no vision API key configured — sitting this one out");
            return None;
        }
        if image_bytes.is_empty() {
            debug!("CAPTCHA solver: handed an empty image — declining the homework");
            return None;
        }

        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image_bytes)
        );

        // Constrained instruction + tiny token budget. The model has one
        // job and sixteen tokens to do it in.
        let body = json!({
            "model": self.model,
            "max_tokens": 16,
            "messages": [
                {
                    "role": "system",
                    "content": "You read CAPTCHA images from government portals. \
                        The image contains a simple arithmetic expression. \
                        Read the expression and reply with only the numeric result. \
                        No words, no punctuation, just the number."
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "Read the expression, return only the result." },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
            ]
        });

        let response = match self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "CAPTCHA solver: vision request failed — the homework never arrived");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                "CAPTCHA solver: vision endpoint returned non-success — no answer today"
            );
            return None;
        }

        let parsed: ChatResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "CAPTCHA solver: malformed JSON from vision endpoint");
                return None;
            }
        };

        let reply = parsed
            .choices
            .and_then(|mut c| if c.is_empty() { None } else { c.remove(0).message })
            .and_then(|m| m.content)
            .unwrap_or_default();

        match first_numeric_token(&reply) {
            Some(answer) => {
                debug!(answer = %answer, "CAPTCHA solver: homework complete");
                Some(answer)
            }
            None => {
                debug!(reply = %reply, "CAPTCHA solver: reply contained no numeric token");
                None
            }
        }
    }
}

/// Pull the first run of digits out of a model reply, prose and all.
pub(crate) fn first_numeric_token(reply: &str) -> Option<String> {
    NUMERIC_TOKEN_RE
        .find(reply)
        .map(|m| m.as_str().to_string())
}
