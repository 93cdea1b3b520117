//! Key layout and encoding utilities for Fjall partitions.
//!
//! Partition structure:
//! - `jobs`: job:{job_id} -> Job (JSON)
//! - `idempotency`: idem:{key} -> IdempotencyRecord (JSON)
//! - `degradation`: degr:{policy_type}:{content_hash} -> DegradationRecord (JSON)
//! - `quota`: quota:{provider_id}:{period_type}:{period_key} -> QuotaCounter (JSON)
//! - `metadata`: meta:{key} -> value (string)

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Decode a job key: job:{job_id} -> job_id
pub fn decode_job_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("job:").map(String::from)
}

/// Encode an idempotency key: idem:{key}
pub fn encode_idem_key(key: &str) -> Vec<u8> {
    format!("idem:{}", key).into_bytes()
}

/// Encode a degradation cache key: degr:{policy_type}:{content_hash}
pub fn encode_degradation_key(policy_type: &str, content_hash: &str) -> Vec<u8> {
    format!("degr:{}:{}", policy_type, content_hash).into_bytes()
}

/// Encode the shared prefix of every degradation key for a given
/// `policy_type`, used to scan-and-clear a category's fallback cache.
pub fn encode_degradation_prefix(policy_type: &str) -> Vec<u8> {
    format!("degr:{}:", policy_type).into_bytes()
}

/// Encode a quota counter key: quota:{provider_id}:{period_type}:{period_key}
pub fn encode_quota_key(provider_id: &str, period_type: &str, period_key: &str) -> Vec<u8> {
    format!("quota:{}:{}:{}", provider_id, period_type, period_key).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
