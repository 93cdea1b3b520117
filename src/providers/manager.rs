//! C7 — Provider Manager.
//!
//! The single entry point the pipeline stages call through to reach an LLM.
//! Owns failover across C5's candidate order, quota enforcement via C4, and
//! translates whatever the transport throws into the fixed error taxonomy
//! via C6, attaching the stage name and completed-stage list expected on a
//! terminal `ErrorRecord`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::domain::{ErrorKind, ErrorRecord};
use crate::observability::Metrics;

use super::classify::classify;
use super::client::{HttpLlmClient, LlmClient, LlmClientError, LlmRequest, LlmResponse};
use super::quota::{QuotaError, QuotaTracker};
use super::registry::ProviderRegistry;

pub struct ProviderManager {
    registry: ProviderRegistry,
    quota: QuotaTracker,
    clients: HashMap<String, Arc<dyn LlmClient>>,
    call_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ProviderManager {
    pub fn new(config: &ProviderConfig, quota: QuotaTracker, metrics: Arc<Metrics>) -> Self {
        let call_timeout = Duration::from_secs(config.llm_call_timeout_secs);
        let clients = config
            .providers
            .iter()
            .map(|endpoint| {
                let client: Arc<dyn LlmClient> =
                    Arc::new(HttpLlmClient::new(endpoint, call_timeout));
                (endpoint.id.clone(), client)
            })
            .collect();
        Self { registry: ProviderRegistry::new(config), quota, clients, call_timeout, metrics }
    }

    /// Build a manager over caller-supplied clients (e.g. `MockLlmClient`),
    /// used by the pipeline's own test suite to exercise failover
    /// deterministically without a network dependency.
    pub fn with_clients(
        config: &ProviderConfig,
        quota: QuotaTracker,
        clients: HashMap<String, Arc<dyn LlmClient>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry: ProviderRegistry::new(config),
            quota,
            clients,
            call_timeout: Duration::from_secs(config.llm_call_timeout_secs),
            metrics,
        }
    }

    /// Run `request` against providers in failover order until one
    /// succeeds or every candidate has been exhausted (spec §4.7).
    pub async fn call(&self, request: LlmRequest) -> Result<LlmResponse, ErrorRecord> {
        let candidates = self.registry.select_order();
        if candidates.is_empty() {
            warn!("no provider available: all candidates blacklisted or unconfigured");
            return Err(ErrorRecord::new(
                ErrorKind::ServerError,
                "no LLM provider is currently available",
            ));
        }

        let mut last_error: Option<ErrorRecord> = None;

        for provider_id in candidates {
            let reservation = self.quota.check_and_reserve(&provider_id, request.estimated_tokens);
            let snapshot = match reservation {
                Ok(snapshot) => snapshot,
                Err(err @ QuotaError::Exceeded { .. }) => {
                    info!(provider = %provider_id, "quota exceeded, trying next provider");
                    self.metrics.quota_denied();
                    if self.registry.mark_failure(&provider_id, ErrorKind::QuotaExceeded) {
                        self.metrics.provider_blacklisted();
                    }
                    last_error = Some(ErrorRecord::new(err.kind(), err.to_string()));
                    continue;
                }
                Err(err) => {
                    last_error = Some(ErrorRecord::new(ErrorKind::ServerError, err.to_string()));
                    continue;
                }
            };

            let utilization = self.quota.utilization(&snapshot);
            if self.quota.warn_thresholds().iter().any(|t| utilization >= *t) {
                warn!(provider = %provider_id, utilization, "provider approaching quota cap");
            }

            let Some(client) = self.clients.get(&provider_id) else {
                warn!(provider = %provider_id, "candidate has no registered client, skipping");
                continue;
            };

            match tokio::time::timeout(self.call_timeout, client.complete(request.clone())).await
            {
                Ok(Ok(response)) => {
                    self.registry.mark_success(&provider_id);
                    if let Err(err) =
                        self.quota.record(&provider_id, response.tokens_used, request.estimated_tokens)
                    {
                        warn!(provider = %provider_id, error = %err, "failed to record actual token usage");
                    }
                    return Ok(response);
                }
                Ok(Err(err)) => {
                    let (kind, _retryable) = classify_client_error(&err);
                    if self.registry.mark_failure(&provider_id, kind) {
                        self.metrics.provider_blacklisted();
                    }
                    warn!(provider = %provider_id, error = %err, "provider call failed");
                    last_error = Some(ErrorRecord::new(kind, err.to_string()));
                }
                Err(_elapsed) => {
                    if self.registry.mark_failure(&provider_id, ErrorKind::Timeout) {
                        self.metrics.provider_blacklisted();
                    }
                    warn!(provider = %provider_id, "provider call timed out");
                    last_error =
                        Some(ErrorRecord::new(ErrorKind::Timeout, "provider call timed out"));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ErrorRecord::new(ErrorKind::ServerError, "all providers exhausted")
        }))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Highest quota utilization ratio across all configured providers,
    /// used by the health endpoint to report `degraded` once any provider
    /// nears its cap.
    pub fn max_quota_utilization(&self) -> f64 {
        self.registry
            .snapshot()
            .iter()
            .filter_map(|health| self.quota.snapshot(&health.provider_id).ok())
            .map(|snapshot| self.quota.utilization(&snapshot))
            .fold(0.0, f64::max)
    }
}

fn classify_client_error(err: &LlmClientError) -> (ErrorKind, bool) {
    match err {
        LlmClientError::Timeout => (ErrorKind::Timeout, true),
        LlmClientError::Status { status, body } => classify(&format!("{status} {body}")),
        LlmClientError::Request(message) => classify(message),
    }
}
