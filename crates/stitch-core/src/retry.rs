use std::time::Duration;

use chrono::{DateTime, Utc};

const MAX_BACKOFF_SHIFT: u32 = 6;

/// Returns true for HTTP statuses worth another attempt: timeouts,
/// rate limits, and server-side failures.
pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Returns true for transport errors that may succeed on a fresh connection.
pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Parses a `retry-after` header as either delay-seconds or an HTTP date.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    if delay_ms <= 0 {
        return Some(Duration::ZERO);
    }
    u64::try_from(delay_ms).ok().map(Duration::from_millis)
}

/// Delay before retry number `attempt` (1-based): exponential backoff from
/// `base_delay_ms`, floored by any server-provided `retry-after` value.
pub fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    let shift = u32::try_from(attempt.saturating_sub(1))
        .unwrap_or(MAX_BACKOFF_SHIFT)
        .min(MAX_BACKOFF_SHIFT);
    let backoff = Duration::from_millis(base_delay_ms.max(1).saturating_mul(1_u64 << shift));
    match retry_after {
        Some(retry_after) => backoff.max(retry_after),
        None => backoff,
    }
}

/// Clips an HTTP error body for inclusion in error messages.
pub fn truncate_for_error(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let clipped: String = trimmed.chars().take(max_chars).collect();
    format!("{clipped}... [truncated]")
}
