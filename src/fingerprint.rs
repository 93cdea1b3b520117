//! C1 — maps submission inputs to an idempotency key and a content hash.
//!
//! Both are stable SHA-256 digests over a normalized representation, so the
//! same inputs always resolve to the same keys across process restarts.

use sha2::{Digest, Sha256};

use crate::domain::SubmitInputs;

/// Casefold, collapse whitespace runs to a single space, trim ends. The
/// normalization is a documented constant: any change to it invalidates
/// every previously computed idempotency key and content hash.
pub fn normalize(text: &str) -> String {
    let folded = text.to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut last_was_space = false;
    for ch in folded.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

fn hex_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\x1f"); // unit separator, avoids field-concatenation collisions
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Idempotency key: stable hash over the normalized `(shop_name,
/// specialization, policy_type, policy_text)` tuple.
pub fn idempotency_key(inputs: &SubmitInputs) -> String {
    hex_digest(&[
        &normalize(&inputs.shop_name),
        &normalize(&inputs.shop_specialization),
        &normalize(&inputs.policy_type),
        &normalize(&inputs.policy_text),
    ])
}

/// Content hash: stable hash over the normalized policy text alone, used for
/// cross-shop fallback lookup in the Degradation Store.
pub fn content_hash(policy_text: &str) -> String {
    hex_digest(&[&normalize(policy_text)])
}
