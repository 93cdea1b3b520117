use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration (spec §6 "Configuration").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub degradation: DegradationConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub force_new: ForceNewConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            fjall_path: default_fjall_path(),
            num_workers: default_num_workers(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_num_workers() -> usize {
    4
}

/// `idempotency.ttl`, default 24h.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_idempotency_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_secs: default_idempotency_ttl_secs() }
    }
}

fn default_idempotency_ttl_secs() -> u64 {
    24 * 3600
}

/// `degradation.ttl`, default 7d.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DegradationConfig {
    #[serde(default = "default_degradation_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self { ttl_secs: default_degradation_ttl_secs() }
    }
}

fn default_degradation_ttl_secs() -> u64 {
    7 * 24 * 3600
}

/// `quota.daily_requests`, `quota.daily_tokens`, `quota.hourly_requests`,
/// `quota.hourly_tokens`. One set of caps applies uniformly to every
/// registered provider (a per-provider override map is left for a future
/// revision).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_requests")]
    pub daily_requests: u64,
    #[serde(default = "default_daily_tokens")]
    pub daily_tokens: u64,
    #[serde(default = "default_hourly_requests")]
    pub hourly_requests: u64,
    #[serde(default = "default_hourly_tokens")]
    pub hourly_tokens: u64,
    #[serde(default = "default_warn_thresholds")]
    pub warn_thresholds: Vec<f64>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_requests: default_daily_requests(),
            daily_tokens: default_daily_tokens(),
            hourly_requests: default_hourly_requests(),
            hourly_tokens: default_hourly_tokens(),
            warn_thresholds: default_warn_thresholds(),
        }
    }
}

fn default_daily_requests() -> u64 {
    10_000
}
fn default_daily_tokens() -> u64 {
    5_000_000
}
fn default_hourly_requests() -> u64 {
    1_000
}
fn default_hourly_tokens() -> u64 {
    500_000
}
fn default_warn_thresholds() -> Vec<f64> {
    vec![0.75, 0.90]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEndpoint {
    pub id: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// `provider.primary`, `provider.blacklist_duration`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderEndpoint>,
    #[serde(default = "default_primary")]
    pub primary: String,
    #[serde(default = "default_blacklist_duration_secs")]
    pub blacklist_duration_secs: u64,
    #[serde(default = "default_llm_call_timeout_secs")]
    pub llm_call_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            primary: default_primary(),
            blacklist_duration_secs: default_blacklist_duration_secs(),
            llm_call_timeout_secs: default_llm_call_timeout_secs(),
        }
    }
}

fn default_providers() -> Vec<ProviderEndpoint> {
    vec![
        ProviderEndpoint { id: "primary".to_string(), base_url: None, api_key_env: None },
        ProviderEndpoint { id: "secondary".to_string(), base_url: None, api_key_env: None },
    ]
}
fn default_primary() -> String {
    "primary".to_string()
}
fn default_blacklist_duration_secs() -> u64 {
    5 * 60
}
fn default_llm_call_timeout_secs() -> u64 {
    120
}

/// `pipeline.compliance_regeneration_threshold`,
/// `pipeline.stage1_uncertainty_band`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_tau")]
    pub compliance_regeneration_threshold: f64,
    #[serde(default = "default_uncertainty_band")]
    pub stage1_uncertainty_band: (f64, f64),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compliance_regeneration_threshold: default_tau(),
            stage1_uncertainty_band: default_uncertainty_band(),
        }
    }
}

fn default_tau() -> f64 {
    95.0
}
fn default_uncertainty_band() -> (f64, f64) {
    (0.30, 0.70)
}

/// `worker.soft_time_limit`, `worker.hard_time_limit`,
/// `worker.max_retries`, `worker.retry_backoff`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_soft_time_limit_secs")]
    pub soft_time_limit_secs: u64,
    #[serde(default = "default_hard_time_limit_secs")]
    pub hard_time_limit_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            soft_time_limit_secs: default_soft_time_limit_secs(),
            hard_time_limit_secs: default_hard_time_limit_secs(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            prefetch: default_prefetch(),
        }
    }
}

fn default_soft_time_limit_secs() -> u64 {
    540
}
fn default_hard_time_limit_secs() -> u64 {
    600
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_secs() -> u64 {
    60
}
fn default_prefetch() -> usize {
    1
}

/// `validation.text_min_length`, `validation.text_max_length`,
/// `validation.spam_word_frequency_threshold`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    #[serde(default = "default_text_min_length")]
    pub text_min_length: usize,
    #[serde(default = "default_text_max_length")]
    pub text_max_length: usize,
    #[serde(default = "default_spam_threshold")]
    pub spam_word_frequency_threshold: f64,
    #[serde(default = "default_min_name_length")]
    pub min_name_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            text_min_length: default_text_min_length(),
            text_max_length: default_text_max_length(),
            spam_word_frequency_threshold: default_spam_threshold(),
            min_name_length: default_min_name_length(),
        }
    }
}

fn default_text_min_length() -> usize {
    50
}
fn default_text_max_length() -> usize {
    50_000
}
fn default_spam_threshold() -> f64 {
    0.30
}
fn default_min_name_length() -> usize {
    2
}

/// `force_new.rate_limit_per_hour` (§6 "Force new analysis").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForceNewConfig {
    #[serde(default = "default_force_new_rate_limit")]
    pub rate_limit_per_hour: u64,
}

impl Default for ForceNewConfig {
    fn default() -> Self {
        Self { rate_limit_per_hour: default_force_new_rate_limit() }
    }
}

fn default_force_new_rate_limit() -> u64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config {
            server: ServerConfig::default(),
            idempotency: IdempotencyConfig::default(),
            degradation: DegradationConfig::default(),
            quota: QuotaConfig::default(),
            provider: ProviderConfig::default(),
            pipeline: PipelineConfig::default(),
            worker: WorkerConfig::default(),
            validation: ValidationConfig::default(),
            force_new: ForceNewConfig::default(),
        };

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.idempotency.ttl_secs, 24 * 3600);
        assert_eq!(config.degradation.ttl_secs, 7 * 24 * 3600);
        assert_eq!(config.pipeline.compliance_regeneration_threshold, 95.0);
        assert_eq!(config.pipeline.stage1_uncertainty_band, (0.30, 0.70));
        assert_eq!(config.force_new.rate_limit_per_hour, 3);
    }
}
