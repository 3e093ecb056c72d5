//! Reading GitHub's rate-limit and pagination headers.

use reqwest::header::HeaderMap;
use std::time::Duration;

/// Wait used when GitHub reports an exhausted quota without a reset time.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// How long to wait before retrying, if the response headers describe a
/// rate limit. `now` is the current Unix time in seconds.
///
/// A `retry-after` header (secondary limits) wins. Otherwise an exhausted
/// primary quota (`x-ratelimit-remaining: 0`) waits until
/// `x-ratelimit-reset`, at least one second. Returns `None` when neither is
/// present, i.e. the 403 is a plain permission error.
pub fn rate_limit_wait(headers: &HeaderMap, now: i64) -> Option<Duration> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs.max(1)));
    }

    if header_str(headers, "x-ratelimit-remaining") != Some("0") {
        return None;
    }

    let wait = header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .map(|reset| Duration::from_secs(reset.saturating_sub(now).max(1) as u64))
        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
    Some(wait)
}

/// URL of the next page from a `Link` header, if any.
pub fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = header_str(headers, "link")?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let url = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if is_next {
            url.strip_prefix('<')?.strip_suffix('>').map(str::to_string)
        } else {
            None
        }
    })
}
