// =============================================================================
// session.rs — THE PORTAL HANDSHAKE RITUAL
// =============================================================================
//
// Before a court portal will answer a case-status query, it demands a small
// ceremony: fetch the form page, accept its cookies, find the hidden CSRF
// token it tucked into the form, and solve the CAPTCHA it drew for you.
// Skip any step and you get a blank page, an error page, or — the portals'
// favorite — a 200 OK containing nothing.
//
// Two load-bearing behaviors in here:
//
// 1. Cookies are captured VERBATIM, in arrival order, semicolon-joined, and
//    replayed exactly. The portals' session affinity breaks if you
//    normalize, reorder, or drop attributes. We learned this empirically
//    and we are not eager to learn it again.
//
// 2. Before downloading the CAPTCHA image and paying for a vision call, we
//    check whether the page LEAKED the answer — several deployments embed
//    the expression or even the computed answer in an alt text, a data
//    attribute, or a hidden input. Free answers are tried first. Always.
//
// Failure is an Option, not an error: a portal we couldn't handshake with
// is a lookup attempt that won't happen, and the caller's retry loop owns
// what happens next.
// =============================================================================

use regex::Regex;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use crate::captcha::CaptchaSolver;

/// An arithmetic expression leaked into markup: "4 + 7", "12- 5", with or
/// without a trailing "=".
static LEAKED_EXPR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3})\s*([+\-])\s*(\d{1,3})\s*=?")
        .expect("leaked-expression regex is invalid somehow")
});

/// A precomputed answer hiding in a hidden input or data attribute. Seen in
/// the wild as captcha_value, captcha_answer, cap_ans, data-answer.
static LEAKED_ANSWER_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:name|id)=["']?(?:captcha_value|captcha_answer|cap_ans|captcha_code)["']?[^>]*value=["']([^"']+)["']"#,
    )
    .expect("leaked-answer regex is invalid somehow")
});

static DATA_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)data-(?:answer|captcha|result)=["']([^"']+)["']"#)
        .expect("data-answer regex is invalid somehow")
});

/// Alt text on the CAPTCHA img element. Some deployments describe the
/// challenge for screen readers, which is considerate of them.
static ALT_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]*captcha[^>]*alt=["']([^"']+)["']"#)
        .expect("alt-text regex is invalid somehow")
});

/// The CAPTCHA image itself: any <img> whose src mentions captcha.
static CAPTCHA_IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]*src=["']([^"']*captcha[^"']*)["']"#)
        .expect("captcha-img regex is invalid somehow")
});

/// Hidden CSRF-ish token inputs, value-after-name and name-after-value
/// attribute orders both observed in the wild.
static CSRF_NAME_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<input[^>]*name=["']?(?:[^"'>]*(?:csrf|_token|app_token)[^"'>]*)["']?[^>]*value=["']([^"']+)["']"#,
    )
    .expect("csrf regex is invalid somehow")
});

static CSRF_VALUE_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<input[^>]*value=["']([^"']+)["'][^>]*name=["']?(?:[^"'>]*(?:csrf|_token|app_token)[^"'>]*)["']?"#,
    )
    .expect("csrf regex is invalid somehow")
});

/// Everything a provider needs to actually submit a case-status query.
#[derive(Debug, Clone)]
pub struct PortalSession {
    /// The verbatim, order-preserving, semicolon-joined Set-Cookie capture.
    /// Replay this exactly as the Cookie header.
    pub cookies: String,
    /// Hidden CSRF token, when the portal uses one.
    pub csrf_token: Option<String>,
    /// The CAPTCHA answer, when the portal posed one and we solved it.
    pub captcha_answer: Option<String>,
}

/// Negotiate a session against a portal's case-status page.
///
/// `page_url` is the form page to fetch; `base_url` anchors relative
/// CAPTCHA image URLs. Set `require_csrf` for portals that reject
/// token-less submissions — a missing token then fails the negotiation
/// instead of failing the submission five seconds later.
///
/// Returns None when the page fetch fails, when a required token is
/// absent, or when the page poses a CAPTCHA we could not answer through
/// either the leak path or the solver.
pub async fn open_session(
    client: &reqwest::Client,
    page_url: &str,
    base_url: &str,
    solver: &CaptchaSolver,
    require_csrf: bool,
) -> Option<PortalSession> {
    let response = match client.get(page_url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url = page_url, error = %e, "session: form page fetch failed");
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(
            url = page_url,
            status = response.status().as_u16(),
            "session: form page returned non-success"
        );
        return None;
    }

    let mut cookies = collect_cookies(response.headers());

    let markup = match response.text().await {
        Ok(b) => b,
        Err(e) => {
            warn!(url = page_url, error = %e, "session: failed to read form page body");
            return None;
        }
    };

    let csrf_token = find_csrf_token(&markup);
    if require_csrf && csrf_token.is_none() {
        warn!(url = page_url, "session: portal requires a CSRF token and none was found");
        return None;
    }

    // Leak path first. Nobody pays a vision model for an answer that's
    // sitting in the markup.
    if let Some(answer) = recover_inline_answer(&markup) {
        debug!(url = page_url, "session: CAPTCHA answer recovered from markup — no vision call needed");
        return Some(PortalSession {
            cookies,
            csrf_token,
            captcha_answer: Some(answer),
        });
    }

    let Some(img_src) = find_captcha_image_url(&markup) else {
        // No CAPTCHA on this page at all. The handshake is just cookies
        // and maybe a token — some portals do have mercy.
        return Some(PortalSession {
            cookies,
            csrf_token,
            captcha_answer: None,
        });
    };

    let img_url = resolve_image_url(base_url, &img_src)?;

    let img_response = match client.get(&img_url).header(COOKIE, cookies.clone()).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %img_url, error = %e, "session: CAPTCHA image fetch failed");
            return None;
        }
    };
    if !img_response.status().is_success() {
        warn!(
            url = %img_url,
            status = img_response.status().as_u16(),
            "session: CAPTCHA image fetch returned non-success"
        );
        return None;
    }

    // Some portals set an extra cookie on the image response and then
    // check for it on the form submit. Append, preserving order.
    let extra = collect_cookies(img_response.headers());
    if !extra.is_empty() {
        if cookies.is_empty() {
            cookies = extra;
        } else {
            cookies = format!("{}; {}", cookies, extra);
        }
    }

    let image_bytes = match img_response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!(url = %img_url, error = %e, "session: failed to read CAPTCHA image bytes");
            return None;
        }
    };

    match solver.solve(&image_bytes).await {
        Some(answer) => Some(PortalSession {
            cookies,
            csrf_token,
            captcha_answer: Some(answer),
        }),
        None => {
            debug!(url = page_url, "session: CAPTCHA posed and unsolved — negotiation failed");
            None
        }
    }
}

/// Capture every Set-Cookie value verbatim, in arrival order,
/// semicolon-joined. No parsing, no normalization, no opinions.
pub(crate) fn collect_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Try to recover the CAPTCHA answer without touching the image:
///   1. a leaked arithmetic expression in alt text or a data attribute
///      (evaluated here — it's addition or subtraction, we can manage),
///   2. a precomputed answer in a hidden input or data attribute, taken
///      verbatim when it looks like a short answer token.
pub(crate) fn recover_inline_answer(markup: &str) -> Option<String> {
    // Expression in alt text.
    if let Some(caps) = ALT_TEXT_RE.captures(markup) {
        if let Some(answer) = eval_leaked_expression(&caps[1]) {
            return Some(answer);
        }
    }

    // Precomputed answer in a known hidden input.
    if let Some(caps) = LEAKED_ANSWER_INPUT_RE.captures(markup) {
        let value = caps[1].trim().to_string();
        if looks_like_answer(&value) {
            return Some(value);
        }
    }

    // data-answer style attributes: may hold the answer or the expression.
    if let Some(caps) = DATA_ANSWER_RE.captures(markup) {
        let value = caps[1].trim();
        if let Some(answer) = eval_leaked_expression(value) {
            return Some(answer);
        }
        if looks_like_answer(value) {
            return Some(value.to_string());
        }
    }

    None
}

/// Evaluate "a + b" / "a - b" leaked text. None if it isn't an expression.
fn eval_leaked_expression(text: &str) -> Option<String> {
    let caps = LEAKED_EXPR_RE.captures(text)?;
    let a: i64 = caps[1].parse().ok()?;
    let b: i64 = caps[3].parse().ok()?;
    let result = match &caps[2] {
        "+" => a + b,
        "-" => a - b,
        _ => return None,
    };
    Some(result.to_string())
}

/// A plausible verbatim answer token: short, no whitespace, alphanumeric.
fn looks_like_answer(value: &str) -> bool {
    (2..=6).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// The src of the CAPTCHA image on the page, if any.
pub(crate) fn find_captcha_image_url(markup: &str) -> Option<String> {
    CAPTCHA_IMG_RE
        .captures(markup)
        .map(|caps| decode_src(&caps[1]))
}

/// Hidden CSRF-ish token, either attribute order.
pub(crate) fn find_csrf_token(markup: &str) -> Option<String> {
    CSRF_NAME_FIRST_RE
        .captures(markup)
        .or_else(|| CSRF_VALUE_FIRST_RE.captures(markup))
        .map(|caps| caps[1].to_string())
}

/// Resolve a possibly-relative image src against the portal base.
pub(crate) fn resolve_image_url(base_url: &str, src: &str) -> Option<String> {
    if src.starts_with("http://") || src.starts_with("https://") {
        return Some(src.to_string());
    }
    let base = Url::parse(base_url).ok()?;
    base.join(src).ok().map(|u| u.to_string())
}

/// src attributes arrive entity-encoded ("&amp;" in query strings).
fn decode_src(src: &str) -> String {
    crate::extract::decode_entities(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn cookies_join_verbatim_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("JSESSION=abc123; Path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("PHPSESSID=xyz789"));
        assert_eq!(
            collect_cookies(&headers),
            "JSESSION=abc123; Path=/; HttpOnly; PHPSESSID=xyz789"
        );
    }

    #[test]
    fn no_cookies_is_empty_string() {
        assert_eq!(collect_cookies(&HeaderMap::new()), "");
    }

    #[test]
    fn inline_answer_from_alt_expression() {
        let markup = r#"<img id="captcha_image" src="/captcha.png" alt="4 + 7 =">"#;
        assert_eq!(recover_inline_answer(markup), Some("11".to_string()));
    }

    #[test]
    fn inline_answer_from_alt_subtraction() {
        let markup = r#"<img class="captcha" src="/cap.png" alt="12 - 5">"#;
        assert_eq!(recover_inline_answer(markup), Some("7".to_string()));
    }

    #[test]
    fn inline_answer_from_hidden_input() {
        let markup = r#"<input type="hidden" name="captcha_value" value="8342">"#;
        assert_eq!(recover_inline_answer(markup), Some("8342".to_string()));
    }

    #[test]
    fn inline_answer_from_data_attribute_expression() {
        let markup = r#"<div class="captcha-box" data-captcha="9+3"></div>"#;
        assert_eq!(recover_inline_answer(markup), Some("12".to_string()));
    }

    #[test]
    fn no_leak_means_none() {
        let markup = r#"<img src="/securimage/captcha.php?sid=44"><input name="q" value="">"#;
        assert_eq!(recover_inline_answer(markup), None);
    }

    #[test]
    fn captcha_image_url_found_and_entity_decoded() {
        let markup = r#"<img src="/vendor/captcha.php?t=1&amp;r=2" class="img">"#;
        assert_eq!(
            find_captcha_image_url(markup),
            Some("/vendor/captcha.php?t=1&r=2".to_string())
        );
    }

    #[test]
    fn csrf_token_found_in_either_attribute_order() {
        let name_first = r#"<input type="hidden" name="app_token" value="tok123">"#;
        assert_eq!(find_csrf_token(name_first), Some("tok123".to_string()));

        let value_first = r#"<input type="hidden" value="tok456" name="csrf_token">"#;
        assert_eq!(find_csrf_token(value_first), Some("tok456".to_string()));

        assert_eq!(find_csrf_token("<input name='q' value='x'>"), None);
    }

    #[test]
    fn relative_image_url_resolves_against_base() {
        assert_eq!(
            resolve_image_url("https://example.gov.in/portal/", "captcha.php?x=1"),
            Some("https://example.gov.in/portal/captcha.php?x=1".to_string())
        );
        assert_eq!(
            resolve_image_url("https://example.gov.in/portal/", "/root/captcha.php"),
            Some("https://example.gov.in/root/captcha.php".to_string())
        );
        assert_eq!(
            resolve_image_url("https://example.gov.in", "https://cdn.example/c.png"),
            Some("https://cdn.example/c.png".to_string())
        );
    }
}
