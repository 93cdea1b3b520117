//! Provider subsystem: C4 Quota Tracker, C5 Provider Registry, C6 Error
//! Classifier, C7 Provider Manager.

pub mod classify;
pub mod client;
pub mod manager;
pub mod quota;
pub mod registry;

pub use classify::classify;
pub use client::{HttpLlmClient, LlmClient, LlmClientError, LlmRequest, LlmResponse};
pub use manager::ProviderManager;
pub use quota::{QuotaError, QuotaSnapshot, QuotaTracker};
pub use registry::ProviderRegistry;
