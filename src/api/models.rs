use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisResult, ErrorRecord, Job, JobStatus, SubmitInputs};

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub shop_name: String,
    pub shop_specialization: String,
    pub policy_type: String,
    pub policy_text: String,
}

impl From<SubmitRequest> for SubmitInputs {
    fn from(req: SubmitRequest) -> Self {
        SubmitInputs {
            shop_name: req.shop_name,
            shop_specialization: req.shop_specialization,
            policy_type: req.policy_type,
            policy_text: req.policy_text,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub current_stage: u32,
    pub total_stages: u32,
    pub progress_message: String,
    pub completed_stages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            current_stage: job.current_stage,
            total_stages: job.total_stages,
            progress_message: job.progress_message,
            completed_stages: job.completed_stages,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_action: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker_reachable: bool,
    pub document_store_reachable: bool,
    pub available_providers: usize,
    pub quota_utilization: f64,
    pub job_count: usize,
    pub idempotency_count: usize,
    pub degradation_count: usize,
}
