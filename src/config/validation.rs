use thiserror::Error;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("compliance_regeneration_threshold must be within [0, 100], got {0}")]
    InvalidThreshold(f64),

    #[error("stage1_uncertainty_band must be ordered within [0, 1], got ({0}, {1})")]
    InvalidUncertaintyBand(f64, f64),

    #[error("no providers configured")]
    NoProvidersConfigured,

    #[error("provider.primary '{0}' does not name a configured provider")]
    UnknownPrimaryProvider(String),

    #[error("duplicate provider id '{0}'")]
    DuplicateProviderId(String),

    #[error("idempotency.ttl_secs must be positive")]
    InvalidIdempotencyTtl,

    #[error("degradation.ttl_secs must be positive")]
    InvalidDegradationTtl,

    #[error("force_new.rate_limit_per_hour must be positive")]
    InvalidForceNewRateLimit,

    #[error("validation.text_min_length ({min}) must be less than text_max_length ({max})")]
    InvalidTextLengthBounds { min: usize, max: usize },

    #[error("worker.soft_time_limit_secs ({soft}) must not exceed hard_time_limit_secs ({hard})")]
    InvalidWorkerTimeLimits { soft: u64, hard: u64 },
}

/// Compose every cross-field invariant check into one entry point.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_pipeline(config)?;
    validate_providers(config)?;
    validate_ttls(config)?;
    validate_text_bounds(config)?;
    validate_worker_limits(config)?;
    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    let tau = config.pipeline.compliance_regeneration_threshold;
    if !(0.0..=100.0).contains(&tau) {
        return Err(ValidationError::InvalidThreshold(tau));
    }

    let (low, high) = config.pipeline.stage1_uncertainty_band;
    if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low >= high {
        return Err(ValidationError::InvalidUncertaintyBand(low, high));
    }

    Ok(())
}

fn validate_providers(config: &Config) -> Result<(), ValidationError> {
    if config.provider.providers.is_empty() {
        return Err(ValidationError::NoProvidersConfigured);
    }

    let mut seen = std::collections::HashSet::new();
    for provider in &config.provider.providers {
        if !seen.insert(provider.id.clone()) {
            return Err(ValidationError::DuplicateProviderId(provider.id.clone()));
        }
    }

    if !config.provider.providers.iter().any(|p| p.id == config.provider.primary) {
        return Err(ValidationError::UnknownPrimaryProvider(config.provider.primary.clone()));
    }

    Ok(())
}

fn validate_ttls(config: &Config) -> Result<(), ValidationError> {
    if config.idempotency.ttl_secs == 0 {
        return Err(ValidationError::InvalidIdempotencyTtl);
    }
    if config.degradation.ttl_secs == 0 {
        return Err(ValidationError::InvalidDegradationTtl);
    }
    if config.force_new.rate_limit_per_hour == 0 {
        return Err(ValidationError::InvalidForceNewRateLimit);
    }
    Ok(())
}

fn validate_text_bounds(config: &Config) -> Result<(), ValidationError> {
    let v = &config.validation;
    if v.text_min_length >= v.text_max_length {
        return Err(ValidationError::InvalidTextLengthBounds {
            min: v.text_min_length,
            max: v.text_max_length,
        });
    }
    Ok(())
}

fn validate_worker_limits(config: &Config) -> Result<(), ValidationError> {
    let w = &config.worker;
    if w.soft_time_limit_secs > w.hard_time_limit_secs {
        return Err(ValidationError::InvalidWorkerTimeLimits {
            soft: w.soft_time_limit_secs,
            hard: w.hard_time_limit_secs,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            server: Default::default(),
            idempotency: Default::default(),
            degradation: Default::default(),
            quota: Default::default(),
            provider: Default::default(),
            pipeline: Default::default(),
            worker: Default::default(),
            validation: Default::default(),
            force_new: Default::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = create_test_config();
        config.pipeline.compliance_regeneration_threshold = 150.0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidThreshold(_))));
    }

    #[test]
    fn test_invalid_uncertainty_band_unordered() {
        let mut config = create_test_config();
        config.pipeline.stage1_uncertainty_band = (0.7, 0.3);
        assert!(matches!(validate(&config), Err(ValidationError::InvalidUncertaintyBand(_, _))));
    }

    #[test]
    fn test_no_providers() {
        let mut config = create_test_config();
        config.provider.providers.clear();
        assert!(matches!(validate(&config), Err(ValidationError::NoProvidersConfigured)));
    }

    #[test]
    fn test_unknown_primary() {
        let mut config = create_test_config();
        config.provider.primary = "nonexistent".to_string();
        assert!(matches!(validate(&config), Err(ValidationError::UnknownPrimaryProvider(_))));
    }

    #[test]
    fn test_duplicate_provider_id() {
        let mut config = create_test_config();
        let first = config.provider.providers[0].clone();
        config.provider.providers.push(first);
        assert!(matches!(validate(&config), Err(ValidationError::DuplicateProviderId(_))));
    }

    #[test]
    fn test_zero_idempotency_ttl() {
        let mut config = create_test_config();
        config.idempotency.ttl_secs = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidIdempotencyTtl)));
    }

    #[test]
    fn test_zero_force_new_rate_limit() {
        let mut config = create_test_config();
        config.force_new.rate_limit_per_hour = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidForceNewRateLimit)));
    }

    #[test]
    fn test_text_bounds_inverted() {
        let mut config = create_test_config();
        config.validation.text_min_length = 100;
        config.validation.text_max_length = 50;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidTextLengthBounds { .. })
        ));
    }

    #[test]
    fn test_worker_soft_exceeds_hard() {
        let mut config = create_test_config();
        config.worker.soft_time_limit_secs = 700;
        config.worker.hard_time_limit_secs = 600;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidWorkerTimeLimits { .. })
        ));
    }
}
