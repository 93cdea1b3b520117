//! Input validator.
//!
//! Pure, stateless checks over a `SubmitInputs` payload, run before a job is
//! ever admitted to the pipeline: a `validate(&T) -> Result<(), ValidationError>`
//! free function with one variant per failure mode.

use thiserror::Error;

use crate::config::ValidationConfig;
use crate::domain::{ErrorRecord, ErrorKind, SubmitInputs};

/// Sub-classification surfaced alongside a `ValidationError` so a caller
/// can distinguish failure modes without string-matching the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCategory {
    FieldTooShort,
    LengthError,
    ForbiddenPattern,
    SpamDetected,
}

impl ValidationCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationCategory::FieldTooShort => "field_too_short",
            ValidationCategory::LengthError => "length_error",
            ValidationCategory::ForbiddenPattern => "forbidden_pattern",
            ValidationCategory::SpamDetected => "spam_detected",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("shop_name must be at least {min} characters")]
    ShopNameTooShort { min: usize },
    #[error("shop_specialization must be at least {min} characters")]
    ShopSpecializationTooShort { min: usize },
    #[error("policy_type must not be empty")]
    PolicyTypeEmpty,
    #[error("policy_text must be at least {min} characters, got {actual}")]
    PolicyTextTooShort { min: usize, actual: usize },
    #[error("policy_text must be at most {max} characters, got {actual}")]
    PolicyTextTooLong { max: usize, actual: usize },
    #[error("policy_text contains a forbidden pattern: {pattern}")]
    ForbiddenPattern { pattern: &'static str },
    #[error("policy_text looks like spam or filler (repeated word ratio {ratio:.2} exceeds {threshold:.2})")]
    PolicyTextLooksLikeSpam { ratio: f64, threshold: f64 },
}

impl ValidationError {
    pub fn category(&self) -> ValidationCategory {
        match self {
            ValidationError::ShopNameTooShort { .. }
            | ValidationError::ShopSpecializationTooShort { .. }
            | ValidationError::PolicyTypeEmpty => ValidationCategory::FieldTooShort,
            ValidationError::PolicyTextTooShort { .. } | ValidationError::PolicyTextTooLong { .. } => {
                ValidationCategory::LengthError
            }
            ValidationError::ForbiddenPattern { .. } => ValidationCategory::ForbiddenPattern,
            ValidationError::PolicyTextLooksLikeSpam { .. } => ValidationCategory::SpamDetected,
        }
    }

    pub fn user_action(&self) -> &'static str {
        match self {
            ValidationError::ShopNameTooShort { .. } => "provide a longer shop_name",
            ValidationError::ShopSpecializationTooShort { .. } => {
                "provide a longer shop_specialization"
            }
            ValidationError::PolicyTypeEmpty => "provide a non-empty policy_type",
            ValidationError::PolicyTextTooShort { .. } => "submit a longer policy_text",
            ValidationError::PolicyTextTooLong { .. } => "shorten policy_text",
            ValidationError::ForbiddenPattern { .. } => {
                "remove scripts, data URLs, or markup from policy_text"
            }
            ValidationError::PolicyTextLooksLikeSpam { .. } => {
                "submit a genuine policy document, not repeated filler text"
            }
        }
    }
}

impl From<ValidationError> for ErrorRecord {
    fn from(err: ValidationError) -> Self {
        let category = err.category().as_str().to_string();
        let user_action = err.user_action().to_string();
        let mut record = ErrorRecord::new(ErrorKind::Validation, err.to_string());
        record.category = Some(category);
        record.user_action = Some(user_action);
        record
    }
}

/// Patterns that are never acceptable in a submitted policy document,
/// regardless of category: markup/script injection and data URLs. Matched
/// as plain substrings over a lower-cased copy of the text.
const FORBIDDEN_PATTERNS: &[&str] = &[
    "<script",
    "</script",
    "javascript:",
    "data:text/html",
    "data:application",
    "<iframe",
    "onerror=",
    "onload=",
];

fn forbidden_pattern(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    FORBIDDEN_PATTERNS.iter().copied().find(|pattern| lower.contains(pattern))
}

/// Validate a submission against the configured bounds.
pub fn validate(inputs: &SubmitInputs, config: &ValidationConfig) -> Result<(), ValidationError> {
    if inputs.shop_name.trim().chars().count() < config.min_name_length {
        return Err(ValidationError::ShopNameTooShort { min: config.min_name_length });
    }
    if inputs.shop_specialization.trim().chars().count() < config.min_name_length {
        return Err(ValidationError::ShopSpecializationTooShort { min: config.min_name_length });
    }
    if inputs.policy_type.trim().is_empty() {
        return Err(ValidationError::PolicyTypeEmpty);
    }

    let text = inputs.policy_text.trim();
    let len = text.chars().count();
    if len < config.text_min_length {
        return Err(ValidationError::PolicyTextTooShort { min: config.text_min_length, actual: len });
    }
    if len > config.text_max_length {
        return Err(ValidationError::PolicyTextTooLong { max: config.text_max_length, actual: len });
    }

    if let Some(pattern) = forbidden_pattern(text) {
        return Err(ValidationError::ForbiddenPattern { pattern });
    }

    let ratio = dominant_word_frequency(text);
    if ratio > config.spam_word_frequency_threshold {
        return Err(ValidationError::PolicyTextLooksLikeSpam {
            ratio,
            threshold: config.spam_word_frequency_threshold,
        });
    }

    Ok(())
}

/// Fraction of all words in `text` taken up by its single most frequent
/// word. A policy that is mostly one word repeated is treated as spam/
/// filler rather than a genuine policy document.
fn dominant_word_frequency(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 {
        return 0.0;
    }

    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for word in &words {
        *counts.entry(word.to_lowercase()).or_insert(0) += 1;
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    max_count as f64 / words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ValidationConfig {
        ValidationConfig {
            text_min_length: 20,
            text_max_length: 200,
            spam_word_frequency_threshold: 0.30,
            min_name_length: 2,
        }
    }

    fn base_inputs() -> SubmitInputs {
        SubmitInputs {
            shop_name: "Acme".into(),
            shop_specialization: "Electronics".into(),
            policy_type: "returns".into(),
            policy_text: "Items may be returned within thirty days of purchase for a full refund."
                .into(),
        }
    }

    #[test]
    fn accepts_a_well_formed_submission() {
        assert!(validate(&base_inputs(), &config()).is_ok());
    }

    #[test]
    fn rejects_short_shop_name() {
        let mut inputs = base_inputs();
        inputs.shop_name = "A".into();
        assert_eq!(
            validate(&inputs, &config()),
            Err(ValidationError::ShopNameTooShort { min: 2 })
        );
    }

    #[test]
    fn rejects_empty_policy_type() {
        let mut inputs = base_inputs();
        inputs.policy_type = "   ".into();
        assert_eq!(validate(&inputs, &config()), Err(ValidationError::PolicyTypeEmpty));
    }

    #[test]
    fn rejects_text_below_minimum_length() {
        let mut inputs = base_inputs();
        inputs.policy_text = "too short".into();
        assert!(matches!(
            validate(&inputs, &config()),
            Err(ValidationError::PolicyTextTooShort { .. })
        ));
    }

    #[test]
    fn rejects_text_above_maximum_length() {
        let mut inputs = base_inputs();
        inputs.policy_text = "a".repeat(500);
        assert!(matches!(
            validate(&inputs, &config()),
            Err(ValidationError::PolicyTextTooLong { .. })
        ));
    }

    #[test]
    fn rejects_spammy_repeated_word_text() {
        let mut inputs = base_inputs();
        inputs.policy_text = "refund refund refund refund refund refund refund policy".into();
        assert!(matches!(
            validate(&inputs, &config()),
            Err(ValidationError::PolicyTextLooksLikeSpam { .. })
        ));
    }
}
