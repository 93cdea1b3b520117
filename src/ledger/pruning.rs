//! Retention enforcement for the idempotency, degradation, and quota
//! partitions.
//!
//! Unlike a blunt "clear everything once N days have elapsed since the last
//! prune" sweep, every record here carries its own `expires_at_epoch_ms`
//! (set at write time from the relevant TTL config). Pruning is therefore a
//! per-key comparison against the current clock, which also means
//! `FjallStore::get_*` never needs to return a record this pass would have
//! deleted — pruning is an optimization, not a correctness dependency.

use std::time::{SystemTime, UNIX_EPOCH};

use fjall::{Keyspace, PartitionHandle};
use tracing::info;

use super::error::Result;
use super::partitions::encode_meta_key;

const META_LAST_PRUNE: &str = "last_prune_epoch_ms";

#[derive(Debug, Default)]
pub struct PruneStats {
    pub idempotency_pruned: usize,
    pub degradation_pruned: usize,
    pub quota_pruned: usize,
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

fn prune_partition_by_expiry(partition: &PartitionHandle, now: i64) -> Result<usize> {
    let mut pruned = 0;
    let mut expired_keys = Vec::new();

    for item in partition.iter() {
        let (key, value) = item?;
        let expires_at = serde_json::from_slice::<serde_json::Value>(&value)
            .ok()
            .and_then(|v| v.get("expires_at_epoch_ms").and_then(|e| e.as_i64()));
        if let Some(expires_at) = expires_at {
            if expires_at <= now {
                expired_keys.push(key);
            }
        }
    }

    for key in expired_keys {
        partition.remove(key)?;
        pruned += 1;
    }

    Ok(pruned)
}

/// Prune every record across the idempotency, degradation, and quota
/// partitions whose `expires_at_epoch_ms` has passed.
pub fn prune_expired(
    keyspace: &Keyspace,
    idem_partition: &PartitionHandle,
    degradation_partition: &PartitionHandle,
    quota_partition: &PartitionHandle,
    metadata_partition: &PartitionHandle,
) -> Result<PruneStats> {
    let now = now_ms();

    let stats = PruneStats {
        idempotency_pruned: prune_partition_by_expiry(idem_partition, now)?,
        degradation_pruned: prune_partition_by_expiry(degradation_partition, now)?,
        quota_pruned: prune_partition_by_expiry(quota_partition, now)?,
    };

    metadata_partition.insert(encode_meta_key(META_LAST_PRUNE), now.to_string().as_bytes())?;
    keyspace.persist(fjall::PersistMode::SyncAll)?;
    info!(?stats, "pruned expired ledger records");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::store::FjallStore;
    use crate::domain::{DegradationRecord, IdempotencyRecord};
    use tempfile::TempDir;

    #[test]
    fn prune_removes_only_expired_idempotency_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("ledger")).unwrap();
        let now = super::now_ms();

        store
            .remember_idempotency(&IdempotencyRecord {
                key: "fresh".to_string(),
                value: crate::domain::AnalysisResult {
                    success: true,
                    compliance_report: None,
                    improved_policy: None,
                    match_verdict: crate::domain::MatchVerdict::Match,
                    served_from_fallback: false,
                    failed_stages: Vec::new(),
                },
                job_id: "job_fresh".to_string(),
                expires_at_epoch_ms: now + 60_000,
            })
            .unwrap();

        store
            .remember_idempotency(&IdempotencyRecord {
                key: "stale".to_string(),
                value: crate::domain::AnalysisResult {
                    success: true,
                    compliance_report: None,
                    improved_policy: None,
                    match_verdict: crate::domain::MatchVerdict::Match,
                    served_from_fallback: false,
                    failed_stages: Vec::new(),
                },
                job_id: "job_stale".to_string(),
                expires_at_epoch_ms: now - 1,
            })
            .unwrap();

        let stats = store.prune_expired().unwrap();
        assert_eq!(stats.idempotency_pruned, 1);

        let remaining = store.stats().unwrap();
        assert_eq!(remaining.idem_count, 1);
    }

    #[test]
    fn prune_removes_only_expired_degradation_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("ledger")).unwrap();
        let now = super::now_ms();
        let result = crate::domain::AnalysisResult {
            success: true,
            compliance_report: None,
            improved_policy: None,
            match_verdict: crate::domain::MatchVerdict::Match,
            served_from_fallback: true,
            failed_stages: Vec::new(),
        };

        store
            .upsert_degradation(&DegradationRecord {
                policy_type: "returns".to_string(),
                content_hash: "fresh_hash".to_string(),
                result: result.clone(),
                expires_at_epoch_ms: now + 60_000,
            })
            .unwrap();
        store
            .upsert_degradation(&DegradationRecord {
                policy_type: "returns".to_string(),
                content_hash: "stale_hash".to_string(),
                result,
                expires_at_epoch_ms: now - 1,
            })
            .unwrap();

        let stats = store.prune_expired().unwrap();
        assert_eq!(stats.degradation_pruned, 1);
    }
}
