//! Shared HTTP utilities for the backup-restore workspace.
//!
//! Provides challenge URL building, token redaction for logs, and small
//! formatting helpers used by the hackattic client and the binary.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

/// Default public endpoint of the challenge service.
pub const DEFAULT_BASE_URL: &str = "https://hackattic.com";

/// Query parameter carrying the access token on every challenge call.
pub const TOKEN_PARAM: &str = "access_token";

// ============================================================================
// URL Building
// ============================================================================

/// Build a challenge endpoint URL.
///
/// `{base}/challenges/{challenge}/{action}?access_token={token}`, with the
/// token percent-encoded and any trailing slash on `base` ignored.
pub fn challenge_url(base: &str, challenge: &str, action: &str, token: &str) -> String {
    format!(
        "{}/challenges/{}/{}?{}={}",
        base.trim_end_matches('/'),
        challenge,
        action,
        TOKEN_PARAM,
        urlencoding::encode(token)
    )
}

/// Replace the value of the `access_token` query parameter with `***`.
///
/// URLs without the parameter are returned unchanged.
pub fn redact_access_token(url: &str) -> String {
    let Some((path, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == TOKEN_PARAM => format!("{}=***", key),
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", path, redacted.join("&"))
}

/// Validate a base URL: http(s) scheme and a non-empty host part.
pub fn is_valid_base_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    match rest {
        Some(r) => !r.trim_end_matches('/').is_empty() && !r.contains(char::is_whitespace),
        None => false,
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Shorten a response body for error messages, respecting char boundaries.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}… ({} bytes total)", head, body.len())
    } else {
        head
    }
}

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_url() {
        assert_eq!(
            challenge_url("https://hackattic.com", "backup_restore", "problem", "abc"),
            "https://hackattic.com/challenges/backup_restore/problem?access_token=abc"
        );
        // trailing slash tolerated
        assert_eq!(
            challenge_url("http://localhost:8080/", "backup_restore", "solve", "abc"),
            "http://localhost:8080/challenges/backup_restore/solve?access_token=abc"
        );
        // token is percent-encoded
        assert_eq!(
            challenge_url("https://h", "c", "a", "a+b/c"),
            "https://h/challenges/c/a?access_token=a%2Bb%2Fc"
        );
    }

    #[test]
    fn test_redact_access_token() {
        assert_eq!(
            redact_access_token("https://h/p?access_token=secret"),
            "https://h/p?access_token=***"
        );
        assert_eq!(
            redact_access_token("https://h/p?x=1&access_token=secret&y=2"),
            "https://h/p?x=1&access_token=***&y=2"
        );
        assert_eq!(redact_access_token("https://h/p"), "https://h/p");
    }

    #[test]
    fn test_is_valid_base_url() {
        assert!(is_valid_base_url("https://hackattic.com"));
        assert!(is_valid_base_url("http://127.0.0.1:9000/"));
        assert!(!is_valid_base_url("ftp://hackattic.com"));
        assert!(!is_valid_base_url("https://"));
        assert!(!is_valid_base_url("hackattic.com"));
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short", 10), "short");
        assert_eq!(truncate_body("abcdef", 3), "abc… (6 bytes total)");
        // multi-byte chars are not split
        assert_eq!(truncate_body("ééé", 2), "éé… (6 bytes total)");
    }

    #[test]
    fn test_system_time_to_rfc3339() {
        assert_eq!(
            system_time_to_rfc3339(SystemTime::UNIX_EPOCH),
            "1970-01-01T00:00:00Z"
        );
    }
}
