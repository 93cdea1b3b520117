//! C4 — Quota Tracker.
//!
//! Wraps the ledger's quota partition with the read-check-increment
//! atomicity the bare store doesn't provide on its own, and derives the
//! daily/hourly period keys and expiries from wall-clock time.

use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::QuotaConfig;
use crate::domain::{ErrorKind, QuotaCounter, QuotaPeriod};
use crate::ledger::{now_epoch_ms, FjallStore, LedgerError};

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("quota exceeded for provider {provider_id} ({period:?})")]
    Exceeded { provider_id: String, period: QuotaPeriod },
}

impl QuotaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuotaError::Exceeded { .. } => ErrorKind::QuotaExceeded,
            QuotaError::Ledger(_) => ErrorKind::ServerError,
        }
    }
}

/// Snapshot of a provider's current daily and hourly counters, used to warn
/// at the configured thresholds without re-reading the store.
#[derive(Debug, Clone)]
pub struct QuotaSnapshot {
    pub daily: QuotaCounter,
    pub hourly: QuotaCounter,
}

pub struct QuotaTracker {
    store: FjallStore,
    config: QuotaConfig,
    // Guards the read-modify-write around a single provider's counters;
    // Fjall itself only guarantees atomicity per key, not across the pair.
    lock: Mutex<()>,
}

impl QuotaTracker {
    pub fn new(store: FjallStore, config: QuotaConfig) -> Self {
        Self { store, config, lock: Mutex::new(()) }
    }

    /// Check both windows have headroom for one more request plus
    /// `estimated_tokens`, and if so reserve it by incrementing the
    /// counters. Atomic under this tracker's lock.
    pub fn check_and_reserve(
        &self,
        provider_id: &str,
        estimated_tokens: u64,
    ) -> Result<QuotaSnapshot, QuotaError> {
        let _guard = self.lock.lock();
        let now = now_epoch_ms();

        let daily = self.load_or_init(provider_id, QuotaPeriod::Daily, now)?;
        let hourly = self.load_or_init(provider_id, QuotaPeriod::Hourly, now)?;

        if daily.requests + 1 > self.config.daily_requests
            || daily.tokens + estimated_tokens > self.config.daily_tokens
        {
            return Err(QuotaError::Exceeded {
                provider_id: provider_id.to_string(),
                period: QuotaPeriod::Daily,
            });
        }
        if hourly.requests + 1 > self.config.hourly_requests
            || hourly.tokens + estimated_tokens > self.config.hourly_tokens
        {
            return Err(QuotaError::Exceeded {
                provider_id: provider_id.to_string(),
                period: QuotaPeriod::Hourly,
            });
        }

        let daily = bump(daily, estimated_tokens);
        let hourly = bump(hourly, estimated_tokens);
        self.store.upsert_quota(&daily)?;
        self.store.upsert_quota(&hourly)?;

        Ok(QuotaSnapshot { daily, hourly })
    }

    /// Correct the estimate `check_and_reserve` already booked against
    /// `provider_id` to the real token count once the call returns.
    /// `requests` was already incremented at reservation time, so this only
    /// adjusts the token delta (never below zero).
    pub fn record(
        &self,
        provider_id: &str,
        actual_tokens: u64,
        estimated_tokens: u64,
    ) -> Result<QuotaSnapshot, QuotaError> {
        let _guard = self.lock.lock();
        let now = now_epoch_ms();

        let daily = adjust(self.load_or_init(provider_id, QuotaPeriod::Daily, now)?, estimated_tokens, actual_tokens);
        let hourly = adjust(self.load_or_init(provider_id, QuotaPeriod::Hourly, now)?, estimated_tokens, actual_tokens);
        self.store.upsert_quota(&daily)?;
        self.store.upsert_quota(&hourly)?;

        Ok(QuotaSnapshot { daily, hourly })
    }

    /// Zero out a provider's current daily and hourly counters.
    pub fn reset(&self, provider_id: &str) -> Result<(), QuotaError> {
        let _guard = self.lock.lock();
        let now = now_epoch_ms();

        let daily = QuotaCounter {
            provider_id: provider_id.to_string(),
            period_type: QuotaPeriod::Daily,
            period_key: period_key(QuotaPeriod::Daily, now),
            tokens: 0,
            requests: 0,
            expires_at_epoch_ms: period_expiry(QuotaPeriod::Daily, now),
        };
        let hourly = QuotaCounter {
            provider_id: provider_id.to_string(),
            period_type: QuotaPeriod::Hourly,
            period_key: period_key(QuotaPeriod::Hourly, now),
            tokens: 0,
            requests: 0,
            expires_at_epoch_ms: period_expiry(QuotaPeriod::Hourly, now),
        };
        self.store.upsert_quota(&daily)?;
        self.store.upsert_quota(&hourly)?;
        Ok(())
    }

    pub fn snapshot(&self, provider_id: &str) -> Result<QuotaSnapshot, QuotaError> {
        let now = now_epoch_ms();
        Ok(QuotaSnapshot {
            daily: self.load_or_init(provider_id, QuotaPeriod::Daily, now)?,
            hourly: self.load_or_init(provider_id, QuotaPeriod::Hourly, now)?,
        })
    }

    /// Ratio of the most-utilized dimension across both windows, used to
    /// decide whether to log a quota warning at the configured thresholds.
    pub fn utilization(&self, snapshot: &QuotaSnapshot) -> f64 {
        let ratios = [
            ratio(snapshot.daily.requests, self.config.daily_requests),
            ratio(snapshot.daily.tokens, self.config.daily_tokens),
            ratio(snapshot.hourly.requests, self.config.hourly_requests),
            ratio(snapshot.hourly.tokens, self.config.hourly_tokens),
        ];
        ratios.into_iter().fold(0.0, f64::max)
    }

    pub fn warn_thresholds(&self) -> &[f64] {
        &self.config.warn_thresholds
    }

    fn load_or_init(
        &self,
        provider_id: &str,
        period: QuotaPeriod,
        now: i64,
    ) -> Result<QuotaCounter, LedgerError> {
        let key = period_key(period, now);
        if let Some(counter) = self.store.get_quota(provider_id, period, &key)? {
            return Ok(counter);
        }
        Ok(QuotaCounter {
            provider_id: provider_id.to_string(),
            period_type: period,
            period_key: key,
            tokens: 0,
            requests: 0,
            expires_at_epoch_ms: period_expiry(period, now),
        })
    }
}

fn bump(mut counter: QuotaCounter, tokens: u64) -> QuotaCounter {
    counter.requests += 1;
    counter.tokens += tokens;
    counter
}

/// Replace a counter's estimated-token contribution with the real count.
fn adjust(mut counter: QuotaCounter, estimated: u64, actual: u64) -> QuotaCounter {
    if actual >= estimated {
        counter.tokens += actual - estimated;
    } else {
        counter.tokens = counter.tokens.saturating_sub(estimated - actual);
    }
    counter
}

fn ratio(used: u64, cap: u64) -> f64 {
    if cap == 0 {
        1.0
    } else {
        used as f64 / cap as f64
    }
}

/// `YYYY-MM-DD` for daily, `YYYY-MM-DDTHH` for hourly, in UTC.
fn period_key(period: QuotaPeriod, now_ms: i64) -> String {
    let dt = epoch_ms_to_utc(now_ms);
    match period {
        QuotaPeriod::Daily => format!("{:04}-{:02}-{:02}", dt.year(), dt.month(), dt.day()),
        QuotaPeriod::Hourly => {
            format!("{:04}-{:02}-{:02}T{:02}", dt.year(), dt.month(), dt.day(), dt.hour())
        }
    }
}

/// Epoch millis of the start of the *next* period boundary, used as the
/// counter's `expires_at_epoch_ms` so it's naturally pruned by the ledger.
fn period_expiry(period: QuotaPeriod, now_ms: i64) -> i64 {
    let dt = epoch_ms_to_utc(now_ms);
    let next = match period {
        QuotaPeriod::Daily => dt
            .date_naive()
            .succ_opt()
            .unwrap_or(dt.date_naive())
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time"),
        QuotaPeriod::Hourly => {
            dt.date_naive()
                .and_hms_opt(dt.hour(), 0, 0)
                .expect("dt.hour() is always a valid hour-of-day")
                + chrono::Duration::hours(1)
        }
    };
    next.and_utc().timestamp_millis()
}

fn epoch_ms_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}
