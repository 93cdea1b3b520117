//! C6 — Error Classifier.
//!
//! Deterministic mapping from a raw provider error string to the fixed
//! taxonomy in `domain::ErrorKind`, plus whether the Provider Manager may
//! retry the call against a different provider.

use crate::domain::ErrorKind;

/// Ordered substring table over a lower-cased, trimmed representation of the
/// raw error. First match wins, so more specific patterns are listed first.
const RULES: &[(&[&str], ErrorKind)] = &[
    (&["quota", "rate limit", "429", "too many requests"], ErrorKind::QuotaExceeded),
    (&["timeout", "timed out", "deadline exceeded"], ErrorKind::Timeout),
    (
        &["unauthorized", "401", "403", "forbidden", "invalid api key", "authentication"],
        ErrorKind::Authentication,
    ),
    (
        &["500", "502", "503", "bad gateway", "internal server error", "service unavailable"],
        ErrorKind::ServerError,
    ),
    (
        &["connection", "network", "dns", "reset by peer", "broken pipe"],
        ErrorKind::Network,
    ),
    (&["validation", "invalid input", "malformed"], ErrorKind::Validation),
    (&["missing", "required field", "no such key"], ErrorKind::MissingData),
];

/// Classify a raw error representation into `(kind, retryable)`.
pub fn classify(raw: &str) -> (ErrorKind, bool) {
    let normalized = raw.to_lowercase();
    for (patterns, kind) in RULES {
        if patterns.iter().any(|p| normalized.contains(p)) {
            return (*kind, kind.retryable());
        }
    }
    (ErrorKind::Unknown, ErrorKind::Unknown.retryable())
}
