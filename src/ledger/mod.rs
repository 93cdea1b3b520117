//! Fjall-backed persistence layer (C2/C3/C4 Data Model).
//!
//! Fjall is an embedded LSM key-value store; this module holds one partition
//! each for jobs, the idempotency cache, the degradation cache, and
//! per-provider quota counters. Everything here runs in-process — both the
//! API and worker processes open the same store path.
//!
//! Idempotency, degradation, and quota records carry an explicit
//! `expires_at_epoch_ms` checked at read time, so TTL enforcement never
//! depends on when `prune_expired()` last ran.
//!
//! ```rust,ignore
//! use compliance_engine::ledger::FjallStore;
//!
//! let store = FjallStore::open("data/ledger")?;
//! store.upsert_job(&job)?;
//! let job = store.get_job(&job_id)?;
//! ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::PruneStats;
pub use store::{now_epoch_ms, FjallStore, StoreStats};
