//! End-to-end exercise of the HTTP surface: submit -> poll status -> cancel
//! -> force-new -> health, all driven through the real router via
//! `tower::ServiceExt::oneshot` rather than a bound TCP listener.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use compliance_engine::api::models::{HealthResponse, JobStatusResponse, SubmitResponse};
use compliance_engine::api::state::AppState;
use compliance_engine::config::{Config, ProviderEndpoint};
use compliance_engine::domain::JobStatus;
use compliance_engine::events::EventHub;
use compliance_engine::ledger::FjallStore;
use compliance_engine::observability::Metrics;
use compliance_engine::providers::{
    LlmClient, LlmClientError, LlmRequest, LlmResponse, ProviderManager, QuotaTracker,
};
use compliance_engine::queue::{FjallQueue, TaskBroker};
use compliance_engine::supervisor::Supervisor;
use compliance_engine::worker;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::RwLock;
use tower::ServiceExt;

/// Always answers "match" with high confidence, so a submitted job runs the
/// full pipeline to completion without touching the network.
struct EchoMatchClient;

#[async_trait]
impl LlmClient for EchoMatchClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmClientError> {
        let text = if request.system_prompt.contains("rewrite") {
            json!({
                "improved_policy": "Items may be returned within 30 days for a full refund.",
                "improvements_made": ["clarified refund window"],
                "estimated_new_compliance": 97.0
            })
            .to_string()
        } else if request.system_prompt.contains("audit") {
            json!({
                "overall_compliance_ratio": 92.0,
                "compliance_grade": "compliant",
                "summary": "Policy meets the stated requirements.",
                "critical_issues": [],
                "weaknesses": [],
                "strengths": [],
                "ambiguities": [],
                "recommendations": []
            })
            .to_string()
        } else {
            json!({"verdict": "match", "confidence": 0.92}).to_string()
        };
        Ok(LlmResponse { text, tokens_used: 40 })
    }
}

fn test_config() -> Config {
    let mut config = Config {
        server: Default::default(),
        idempotency: Default::default(),
        degradation: Default::default(),
        quota: Default::default(),
        provider: Default::default(),
        pipeline: Default::default(),
        worker: Default::default(),
        validation: Default::default(),
        force_new: Default::default(),
    };
    config.provider.providers =
        vec![ProviderEndpoint { id: "primary".into(), base_url: None, api_key_env: None }];
    config.provider.primary = "primary".into();
    config
}

async fn test_app(dir: &TempDir) -> AppState {
    let config = Arc::new(test_config());
    let ledger = FjallStore::open(dir.path().join("ledger")).unwrap();
    let quota_store = FjallStore::open(dir.path().join("quota")).unwrap();
    let queue = Arc::new(RwLock::new(FjallQueue::open(dir.path().join("queue")).unwrap()));
    let (broker, receivers) = TaskBroker::new(queue, 1, 10);

    let metrics = Arc::new(Metrics::new());
    let quota = QuotaTracker::new(quota_store, config.quota.clone());
    let mut clients: HashMap<String, Arc<dyn LlmClient>> = HashMap::new();
    clients.insert("primary".into(), Arc::new(EchoMatchClient));
    let providers =
        Arc::new(ProviderManager::with_clients(&config.provider, quota, clients, metrics.clone()));

    let events = Arc::new(EventHub::new());
    let supervisor = Arc::new(Supervisor::new(
        ledger,
        Arc::new(broker),
        events.clone(),
        providers,
        config.clone(),
        metrics.clone(),
    ));

    worker::spawn_workers(supervisor.clone(), receivers);

    AppState { supervisor, events, config, metrics }
}

fn submit_body() -> Body {
    Body::from(
        json!({
            "shop_name": "Acme Outfitters",
            "shop_specialization": "Outdoor gear",
            "policy_type": "returns",
            "policy_text": "Items may be returned within 30 days for a full refund or exchange, money back guaranteed on all purchases."
        })
        .to_string(),
    )
}

async fn poll_until_terminal(
    router: &axum::Router,
    job_id: &str,
) -> JobStatusResponse {
    for _ in 0..50 {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/analyses/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: JobStatusResponse = serde_json::from_slice(&bytes).unwrap();
        if matches!(status.status, JobStatus::Completed | JobStatus::Failed) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn submit_then_status_runs_the_job_to_completion() {
    let dir = TempDir::new().unwrap();
    let state = test_app(&dir).await;
    let router = compliance_engine::api::router(state);

    let response = router
        .clone()
        .oneshot(Request::builder().method("POST").uri("/analyses").header("content-type", "application/json").body(submit_body()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let submitted: SubmitResponse = serde_json::from_slice(&bytes).unwrap();

    let status = poll_until_terminal(&router, &submitted.job_id).await;
    assert_eq!(status.status, JobStatus::Completed);
    assert!(status.result.is_some());
}

#[tokio::test]
async fn stream_opened_after_completion_replays_the_terminal_event_then_closes() {
    let dir = TempDir::new().unwrap();
    let state = test_app(&dir).await;
    let router = compliance_engine::api::router(state);

    let submitted = router
        .clone()
        .oneshot(Request::builder().method("POST").uri("/analyses").header("content-type", "application/json").body(submit_body()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(submitted.into_body(), usize::MAX).await.unwrap();
    let submitted: SubmitResponse = serde_json::from_slice(&bytes).unwrap();
    poll_until_terminal(&router, &submitted.job_id).await;

    // The job's live broadcast channel is retired once it terminates, so
    // connecting now must replay the terminal event from the persisted job
    // row rather than hang on an empty channel that never fires.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/analyses/{}/stream", submitted.job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("\"kind\":\"completed\""), "expected a replayed completed event, got: {body}");
}

#[tokio::test]
async fn resubmitting_identical_inputs_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let state = test_app(&dir).await;
    let router = compliance_engine::api::router(state);

    let first = router
        .clone()
        .oneshot(Request::builder().method("POST").uri("/analyses").header("content-type", "application/json").body(submit_body()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
    let first: SubmitResponse = serde_json::from_slice(&bytes).unwrap();
    poll_until_terminal(&router, &first.job_id).await;

    let second = router
        .clone()
        .oneshot(Request::builder().method("POST").uri("/analyses").header("content-type", "application/json").body(submit_body()).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let second: SubmitResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(second.job_id, first.job_id);
    assert_eq!(second.status, JobStatus::Completed);
}

#[tokio::test]
async fn status_for_unknown_job_is_404() {
    let dir = TempDir::new().unwrap();
    let state = test_app(&dir).await;
    let router = compliance_engine::api::router(state);

    let response = router
        .oneshot(Request::builder().uri("/analyses/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_on_unknown_job_is_404() {
    let dir = TempDir::new().unwrap();
    let state = test_app(&dir).await;
    let router = compliance_engine::api::router(state);

    let response = router
        .oneshot(Request::builder().method("POST").uri("/analyses/does-not-exist/cancel").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submission_with_blank_policy_text_is_rejected() {
    let dir = TempDir::new().unwrap();
    let state = test_app(&dir).await;
    let router = compliance_engine::api::router(state);

    let body = Body::from(
        json!({
            "shop_name": "Acme",
            "shop_specialization": "Outdoor gear",
            "policy_type": "returns",
            "policy_text": "too short"
        })
        .to_string(),
    );
    let response = router
        .oneshot(Request::builder().method("POST").uri("/analyses").header("content-type", "application/json").body(body).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_reports_store_counts() {
    let dir = TempDir::new().unwrap();
    let state = test_app(&dir).await;
    let router = compliance_engine::api::router(state);

    let response = router
        .clone()
        .oneshot(Request::builder().method("POST").uri("/analyses").header("content-type", "application/json").body(submit_body()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let submitted: SubmitResponse = serde_json::from_slice(&bytes).unwrap();
    poll_until_terminal(&router, &submitted.job_id).await;

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "healthy");
    assert!(health.broker_reachable);
    assert!(health.available_providers >= 1);
    assert!(health.job_count >= 1);
}
