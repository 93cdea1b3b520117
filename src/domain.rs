//! Core domain types shared by the pipeline, stores, and API layer.
//!
//! These are the record shapes that flow through the job lifecycle:
//! submission -> pipeline execution -> terminal result -> event stream.

use serde::{Deserialize, Serialize};

/// Policy category understood by the pipeline. Kept as an open string with a
/// small recognized set rather than a closed enum: new categories must not
/// require a core code change.
pub type PolicyType = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Fixed error taxonomy (spec §7), plus the dedicated worker-level `cancelled`
/// kind surfaced through the same shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    QuotaExceeded,
    Timeout,
    Authentication,
    ServerError,
    Network,
    MissingData,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Transient errors are retried across providers; see C6/C7.
    pub fn retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::ServerError | ErrorKind::Network)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    /// Finer-grained sub-classification, populated for `validation` failures
    /// (e.g. `length_error`, `forbidden_pattern`, `spam_detected`); absent
    /// for every other kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_action: Option<String>,
    #[serde(default)]
    pub completed_stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            category: None,
            details: None,
            user_action: None,
            completed_stages: Vec::new(),
            failed_stage: None,
        }
    }
}

/// Severity used across `ComplianceReport` finding lists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub phrase: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Produced by stage 2 (Compliance analysis). §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub overall_compliance_ratio: f64,
    pub compliance_grade: String,
    pub summary: String,
    #[serde(default)]
    pub critical_issues: Vec<Finding>,
    #[serde(default)]
    pub weaknesses: Vec<Finding>,
    #[serde(default)]
    pub strengths: Vec<Finding>,
    #[serde(default)]
    pub ambiguities: Vec<Finding>,
    #[serde(default)]
    pub recommendations: Vec<Finding>,
}

/// Produced by stage 3 (Policy regeneration), only when the compliance ratio
/// is below the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovedPolicy {
    pub improved_policy: String,
    pub improvements_made: Vec<String>,
    pub estimated_new_compliance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchVerdict {
    Match,
    Mismatch,
    Unsure,
}

/// Final assembled result written to C2/C3 and surfaced on `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_report: Option<ComplianceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_policy: Option<ImprovedPolicy>,
    pub match_verdict: MatchVerdict,
    #[serde(default)]
    pub served_from_fallback: bool,
    #[serde(default)]
    pub failed_stages: Vec<String>,
}

/// Request payload shared by `submit` and `force_new` (spec Design Notes:
/// the two are one logical operation parameterized by `bypass_cache`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitInputs {
    pub shop_name: String,
    pub shop_specialization: String,
    pub policy_type: PolicyType,
    pub policy_text: String,
}

/// Durable job record (C10 Data Model "Job"). One row per job_id in the
/// jobs partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub inputs: SubmitInputs,
    pub idempotency_key: String,
    pub content_hash: String,
    pub status: JobStatus,
    pub current_stage: u32,
    pub total_stages: u32,
    pub progress_message: String,
    #[serde(default)]
    pub completed_stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    pub fn new(job_id: String, inputs: SubmitInputs, idempotency_key: String, content_hash: String, now: &str) -> Self {
        Self {
            job_id,
            inputs,
            idempotency_key,
            content_hash,
            status: JobStatus::Pending,
            current_stage: 0,
            total_stages: 5,
            progress_message: "queued".to_string(),
            completed_stages: Vec::new(),
            result: None,
            error: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

/// One per stage execution, accumulated in the pipeline `Context` (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: String,
    pub outcome: StageOutcomeKind,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcomeKind {
    Ok,
    Skipped,
    Failed,
}

/// Per-provider health row (C5 Data Model "ProviderHealth").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub is_primary: bool,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklisted_until_epoch_ms: Option<i64>,
    pub success_count: u64,
    pub failure_count: u64,
}

/// Per-(provider, period) counter row (C4 Data Model "QuotaCounter").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub provider_id: String,
    pub period_type: QuotaPeriod,
    pub period_key: String,
    pub tokens: u64,
    pub requests: u64,
    pub expires_at_epoch_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    Daily,
    Hourly,
}

/// `(key, value, expires_at)` — C2 Idempotency Store record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub value: AnalysisResult,
    pub job_id: String,
    pub expires_at_epoch_ms: i64,
}

/// `(policy_type, content_hash, result, expires_at)` — C3 Degradation Store record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationRecord {
    pub policy_type: PolicyType,
    pub content_hash: String,
    pub result: AnalysisResult,
    pub expires_at_epoch_ms: i64,
}

/// Transient event published through C11. `EventRecord` is never persisted
/// as such; the job's terminal state in the jobs partition is the durable
/// record consulted for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        current: u32,
        total: u32,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shop_name: Option<String>,
    },
    Completed {
        result: AnalysisResult,
    },
    Failed {
        error: ErrorRecord,
    },
}

/// Bucketed work item handed from the supervisor to the broker and on to a
/// worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: String,
    pub inputs: SubmitInputs,
    pub idempotency_key: String,
    pub content_hash: String,
    pub attempt: u32,
}
