//! C5 — Provider Registry.
//!
//! In-memory health table over the configured LLM providers: consecutive
//! failure counts, blacklist expiry, and which provider is currently
//! primary. The registry does not make HTTP calls itself; C7 (the Provider
//! Manager) consults `select_order` and reports outcomes back via
//! `mark_success`/`mark_failure`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::ProviderConfig;
use crate::domain::{ErrorKind, ProviderHealth};
use crate::ledger::now_epoch_ms;

/// Consecutive timeouts before a provider is blacklisted. A single timeout
/// is treated as noise; a run of them looks like an outage. A single
/// server error blacklists immediately (spec: "service crash class").
const TIMEOUT_STRIKES_BEFORE_BLACKLIST: u32 = 2;

pub struct ProviderRegistry {
    blacklist_duration_ms: i64,
    primary: Mutex<String>,
    health: Mutex<HashMap<String, ProviderHealth>>,
    // Preserves configuration order for deterministic failover beyond primary.
    order: Vec<String>,
}

impl ProviderRegistry {
    pub fn new(config: &ProviderConfig) -> Self {
        let order: Vec<String> = config.providers.iter().map(|p| p.id.clone()).collect();
        let mut health = HashMap::new();
        for id in &order {
            health.insert(
                id.clone(),
                ProviderHealth {
                    provider_id: id.clone(),
                    is_primary: *id == config.primary,
                    consecutive_failures: 0,
                    blacklisted_until_epoch_ms: None,
                    success_count: 0,
                    failure_count: 0,
                },
            );
        }
        Self {
            blacklist_duration_ms: (config.blacklist_duration_secs * 1000) as i64,
            primary: Mutex::new(config.primary.clone()),
            health: Mutex::new(health),
            order,
        }
    }

    /// Candidate providers in failover order: the current primary first
    /// (unless blacklisted), then the rest in configuration order, with
    /// blacklisted providers filtered out entirely.
    pub fn select_order(&self) -> Vec<String> {
        let now = now_epoch_ms();
        let health = self.health.lock();
        let primary = self.primary.lock().clone();

        let is_available = |id: &str| -> bool {
            health
                .get(id)
                .map(|h| h.blacklisted_until_epoch_ms.map(|until| until <= now).unwrap_or(true))
                .unwrap_or(false)
        };

        let mut ordered = Vec::with_capacity(self.order.len());
        if is_available(&primary) {
            ordered.push(primary.clone());
        }
        for id in &self.order {
            if *id != primary && is_available(id) {
                ordered.push(id.clone());
            }
        }
        ordered
    }

    pub fn mark_success(&self, provider_id: &str) {
        let mut health = self.health.lock();
        if let Some(h) = health.get_mut(provider_id) {
            h.consecutive_failures = 0;
            h.success_count += 1;
            h.blacklisted_until_epoch_ms = None;
        }
    }

    /// Record a failed call and apply the blacklist policy for its kind.
    /// Returns `true` if this call newly blacklisted the provider (it was
    /// not already blacklisted before this failure).
    pub fn mark_failure(&self, provider_id: &str, kind: ErrorKind) -> bool {
        let mut health = self.health.lock();
        let Some(h) = health.get_mut(provider_id) else { return false };
        h.failure_count += 1;
        h.consecutive_failures += 1;

        let was_blacklisted = h.blacklisted_until_epoch_ms.is_some();
        let should_blacklist = match kind {
            ErrorKind::ServerError => true,
            ErrorKind::Timeout => h.consecutive_failures >= TIMEOUT_STRIKES_BEFORE_BLACKLIST,
            _ => false,
        };
        if should_blacklist {
            h.blacklisted_until_epoch_ms = Some(now_epoch_ms() + self.blacklist_duration_ms);
        }
        should_blacklist && !was_blacklisted
    }

    /// Explicitly promote a different provider to primary, e.g. after an
    /// operator decides the configured primary is unhealthy long-term.
    pub fn switch_primary(&self, provider_id: &str) {
        *self.primary.lock() = provider_id.to_string();
        let mut health = self.health.lock();
        for (id, h) in health.iter_mut() {
            h.is_primary = id == provider_id;
        }
    }

    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        self.health.lock().values().cloned().collect()
    }
}
