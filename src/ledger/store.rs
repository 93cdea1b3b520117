use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::domain::{DegradationRecord, IdempotencyRecord, Job, QuotaCounter, QuotaPeriod};

use super::error::Result;
use super::partitions::{
    encode_degradation_key, encode_degradation_prefix, encode_idem_key, encode_job_key,
    encode_quota_key,
};
use super::pruning::{prune_expired, PruneStats};

/// Current epoch milliseconds. Centralized here so every TTL comparison in
/// this module uses the same clock source.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Fjall-backed persistent storage for jobs, the idempotency cache, the
/// degradation cache, and per-provider quota counters (spec §5 Data Model).
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    idempotency: PartitionHandle,
    degradation: PartitionHandle,
    quota: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let idempotency =
            keyspace.open_partition("idempotency", PartitionCreateOptions::default())?;
        let degradation =
            keyspace.open_partition("degradation", PartitionCreateOptions::default())?;
        let quota = keyspace.open_partition("quota", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self { keyspace, jobs, idempotency, degradation, quota, metadata })
    }

    // --- Jobs (C2) ------------------------------------------------------

    pub fn upsert_job(&self, job: &Job) -> Result<()> {
        let key = encode_job_key(&job.job_id);
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %job.job_id, "upserted job");
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let key = encode_job_key(job_id);
        match self.jobs.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    // --- Idempotency cache (C3) -----------------------------------------

    /// Upsert an idempotency record, keyed by its idempotency key.
    pub fn remember_idempotency(&self, record: &IdempotencyRecord) -> Result<()> {
        let key = encode_idem_key(&record.key);
        let value = serde_json::to_vec(record)?;
        self.idempotency.insert(key, value)?;
        debug!(key = %record.key, job_id = %record.job_id, "remembered idempotency key");
        Ok(())
    }

    /// Look up an idempotency record. Records whose `expires_at_epoch_ms` is
    /// in the past are treated as absent, even if not yet physically pruned
    /// (spec invariant: expired records MUST NOT be returned).
    pub fn get_idempotent(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let idem_key = encode_idem_key(key);
        match self.idempotency.get(idem_key)? {
            Some(value) => {
                let record: IdempotencyRecord = serde_json::from_slice(&value)?;
                if record.expires_at_epoch_ms <= now_epoch_ms() {
                    Ok(None)
                } else {
                    Ok(Some(record))
                }
            }
            None => Ok(None),
        }
    }

    /// Whether an unexpired idempotency record exists for `key` (C2 `has`).
    pub fn has_idempotent(&self, key: &str) -> Result<bool> {
        Ok(self.get_idempotent(key)?.is_some())
    }

    /// Remove an idempotency record outright, regardless of TTL (C2 `delete`).
    pub fn delete_idempotent(&self, key: &str) -> Result<()> {
        let idem_key = encode_idem_key(key);
        self.idempotency.remove(idem_key)?;
        debug!(key, "deleted idempotency record");
        Ok(())
    }

    // --- Degradation cache (C3) ------------------------------------------

    pub fn upsert_degradation(&self, record: &DegradationRecord) -> Result<()> {
        let key = encode_degradation_key(&record.policy_type, &record.content_hash);
        let value = serde_json::to_vec(record)?;
        self.degradation.insert(key, value)?;
        debug!(policy_type = %record.policy_type, "cached degradation fallback result");
        Ok(())
    }

    pub fn get_degradation(
        &self,
        policy_type: &str,
        content_hash: &str,
    ) -> Result<Option<DegradationRecord>> {
        let key = encode_degradation_key(policy_type, content_hash);
        match self.degradation.get(key)? {
            Some(value) => {
                let record: DegradationRecord = serde_json::from_slice(&value)?;
                if record.expires_at_epoch_ms <= now_epoch_ms() {
                    Ok(None)
                } else {
                    Ok(Some(record))
                }
            }
            None => Ok(None),
        }
    }

    /// Remove every degradation record cached under `policy_type` (C3 `clear`),
    /// via a prefix scan over the degradation partition.
    pub fn clear_degradation(&self, policy_type: &str) -> Result<usize> {
        let prefix = encode_degradation_prefix(policy_type);
        let mut keys = Vec::new();
        for item in self.degradation.iter() {
            let (key, _) = item?;
            if key.starts_with(prefix.as_slice()) {
                keys.push(key);
            }
        }
        let cleared = keys.len();
        for key in keys {
            self.degradation.remove(key)?;
        }
        debug!(policy_type, cleared, "cleared degradation records");
        Ok(cleared)
    }

    // --- Quota counters (C4) ----------------------------------------------

    pub fn get_quota(
        &self,
        provider_id: &str,
        period: QuotaPeriod,
        period_key: &str,
    ) -> Result<Option<QuotaCounter>> {
        let period_type = match period {
            QuotaPeriod::Daily => "daily",
            QuotaPeriod::Hourly => "hourly",
        };
        let key = encode_quota_key(provider_id, period_type, period_key);
        match self.quota.get(key)? {
            Some(value) => {
                let counter: QuotaCounter = serde_json::from_slice(&value)?;
                if counter.expires_at_epoch_ms <= now_epoch_ms() {
                    Ok(None)
                } else {
                    Ok(Some(counter))
                }
            }
            None => Ok(None),
        }
    }

    pub fn upsert_quota(&self, counter: &QuotaCounter) -> Result<()> {
        let period_type = match counter.period_type {
            QuotaPeriod::Daily => "daily",
            QuotaPeriod::Hourly => "hourly",
        };
        let key = encode_quota_key(&counter.provider_id, period_type, &counter.period_key);
        let value = serde_json::to_vec(counter)?;
        self.quota.insert(key, value)?;
        Ok(())
    }

    // --- Maintenance ------------------------------------------------------

    /// Prune expired idempotency, degradation, and quota records.
    pub fn prune_expired(&self) -> Result<PruneStats> {
        info!("starting ledger prune");
        let stats = prune_expired(
            &self.keyspace,
            &self.idempotency,
            &self.degradation,
            &self.quota,
            &self.metadata,
        )?;
        info!(?stats, "ledger prune complete");
        Ok(stats)
    }

    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut job_count = 0;
        let mut idem_count = 0;
        let mut degradation_count = 0;
        let mut quota_count = 0;

        for item in self.jobs.iter() {
            item?;
            job_count += 1;
        }
        for item in self.idempotency.iter() {
            item?;
            idem_count += 1;
        }
        for item in self.degradation.iter() {
            item?;
            degradation_count += 1;
        }
        for item in self.quota.iter() {
            item?;
            quota_count += 1;
        }

        Ok(StoreStats { job_count, idem_count, degradation_count, quota_count })
    }

}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub job_count: usize,
    pub idem_count: usize,
    pub degradation_count: usize,
    pub quota_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisResult, JobStatus, MatchVerdict, SubmitInputs};
    use tempfile::TempDir;

    fn create_test_store() -> (FjallStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("test_ledger")).unwrap();
        (store, temp_dir)
    }

    fn test_inputs() -> SubmitInputs {
        SubmitInputs {
            shop_name: "Acme".to_string(),
            shop_specialization: "Electronics".to_string(),
            policy_type: "returns".to_string(),
            policy_text: "Items may be returned within 30 days.".to_string(),
        }
    }

    fn test_result() -> AnalysisResult {
        AnalysisResult {
            success: true,
            compliance_report: None,
            improved_policy: None,
            match_verdict: MatchVerdict::Match,
            served_from_fallback: false,
            failed_stages: Vec::new(),
        }
    }

    #[test]
    fn test_open_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("test_ledger"));
        assert!(store.is_ok());
    }

    #[test]
    fn test_upsert_and_get_job() {
        let (store, _temp) = create_test_store();
        let job = Job::new("job_123".to_string(), test_inputs(), "idem".to_string(), "hash".to_string(), "2026-07-28T00:00:00Z");

        store.upsert_job(&job).unwrap();
        let retrieved = store.get_job("job_123").unwrap().unwrap();

        assert_eq!(retrieved.job_id, "job_123");
        assert_eq!(retrieved.status, JobStatus::Pending);
        assert_eq!(retrieved.total_stages, 5);
    }

    #[test]
    fn test_get_nonexistent_job() {
        let (store, _temp) = create_test_store();
        assert!(store.get_job("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_idempotency_roundtrip() {
        let (store, _temp) = create_test_store();
        let record = IdempotencyRecord {
            key: "key_123".to_string(),
            value: test_result(),
            job_id: "job_456".to_string(),
            expires_at_epoch_ms: now_epoch_ms() + 60_000,
        };
        store.remember_idempotency(&record).unwrap();

        let found = store.get_idempotent("key_123").unwrap();
        assert_eq!(found.unwrap().job_id, "job_456");

        assert!(store.get_idempotent("missing_key").unwrap().is_none());
    }

    #[test]
    fn test_idempotency_expired_not_returned() {
        let (store, _temp) = create_test_store();
        let record = IdempotencyRecord {
            key: "stale".to_string(),
            value: test_result(),
            job_id: "job_x".to_string(),
            expires_at_epoch_ms: now_epoch_ms() - 1,
        };
        store.remember_idempotency(&record).unwrap();
        assert!(store.get_idempotent("stale").unwrap().is_none());
    }

    #[test]
    fn test_degradation_roundtrip() {
        let (store, _temp) = create_test_store();
        let record = DegradationRecord {
            policy_type: "returns".to_string(),
            content_hash: "abc".to_string(),
            result: test_result(),
            expires_at_epoch_ms: now_epoch_ms() + 60_000,
        };
        store.upsert_degradation(&record).unwrap();

        assert!(store.get_degradation("returns", "abc").unwrap().is_some());
        assert!(store.get_degradation("returns", "other").unwrap().is_none());
    }

    #[test]
    fn test_has_and_delete_idempotent() {
        let (store, _temp) = create_test_store();
        let record = IdempotencyRecord {
            key: "key_has".to_string(),
            value: test_result(),
            job_id: "job_has".to_string(),
            expires_at_epoch_ms: now_epoch_ms() + 60_000,
        };
        store.remember_idempotency(&record).unwrap();

        assert!(store.has_idempotent("key_has").unwrap());
        assert!(!store.has_idempotent("missing").unwrap());

        store.delete_idempotent("key_has").unwrap();
        assert!(!store.has_idempotent("key_has").unwrap());
        assert!(store.get_idempotent("key_has").unwrap().is_none());
    }

    #[test]
    fn test_clear_degradation_only_removes_matching_policy_type() {
        let (store, _temp) = create_test_store();
        store
            .upsert_degradation(&DegradationRecord {
                policy_type: "returns".to_string(),
                content_hash: "abc".to_string(),
                result: test_result(),
                expires_at_epoch_ms: now_epoch_ms() + 60_000,
            })
            .unwrap();
        store
            .upsert_degradation(&DegradationRecord {
                policy_type: "returns".to_string(),
                content_hash: "def".to_string(),
                result: test_result(),
                expires_at_epoch_ms: now_epoch_ms() + 60_000,
            })
            .unwrap();
        store
            .upsert_degradation(&DegradationRecord {
                policy_type: "privacy".to_string(),
                content_hash: "abc".to_string(),
                result: test_result(),
                expires_at_epoch_ms: now_epoch_ms() + 60_000,
            })
            .unwrap();

        let cleared = store.clear_degradation("returns").unwrap();
        assert_eq!(cleared, 2);
        assert!(store.get_degradation("returns", "abc").unwrap().is_none());
        assert!(store.get_degradation("returns", "def").unwrap().is_none());
        assert!(store.get_degradation("privacy", "abc").unwrap().is_some());
    }

    #[test]
    fn test_quota_roundtrip() {
        let (store, _temp) = create_test_store();
        let counter = QuotaCounter {
            provider_id: "primary".to_string(),
            period_type: QuotaPeriod::Daily,
            period_key: "2026-07-28".to_string(),
            tokens: 100,
            requests: 1,
            expires_at_epoch_ms: now_epoch_ms() + 60_000,
        };
        store.upsert_quota(&counter).unwrap();

        let found = store.get_quota("primary", QuotaPeriod::Daily, "2026-07-28").unwrap().unwrap();
        assert_eq!(found.tokens, 100);
        assert!(store.get_quota("primary", QuotaPeriod::Hourly, "2026-07-28").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let (store, _temp) = create_test_store();
        let job = Job::new("job_1".to_string(), test_inputs(), "idem".to_string(), "hash".to_string(), "2026-07-28T00:00:00Z");
        store.upsert_job(&job).unwrap();
        store
            .remember_idempotency(&IdempotencyRecord {
                key: "key_1".to_string(),
                value: test_result(),
                job_id: "job_1".to_string(),
                expires_at_epoch_ms: now_epoch_ms() + 60_000,
            })
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.job_count, 1);
        assert_eq!(stats.idem_count, 1);
    }

    #[test]
    fn test_persist() {
        let (store, _temp) = create_test_store();
        let job = Job::new("job_persist".to_string(), test_inputs(), "idem".to_string(), "hash".to_string(), "2026-07-28T00:00:00Z");
        store.upsert_job(&job).unwrap();
        store.persist().unwrap();
    }
}
