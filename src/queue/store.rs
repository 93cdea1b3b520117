use crate::domain::WorkItem;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task not found: seq={0}")]
    TaskNotFound(u64),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// `FjallQueue` persists `WorkItem`s under sequential u64 keys before they
/// are handed to a worker, so an API-process crash between enqueue and
/// dispatch never loses a submitted job.
///
/// - `tasks` partition: u64 (big-endian) -> WorkItem (JSON)
/// - `metadata` partition: "next_seq" -> u64
pub struct FjallQueue {
    keyspace: Keyspace,
    tasks: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: Arc<AtomicU64>,
}

impl FjallQueue {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening FjallQueue at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;

        let tasks = keyspace.open_partition("tasks", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let current_seq = metadata
            .get(b"next_seq")?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        info!("FjallQueue opened, current sequence: {}", current_seq);

        Ok(Self { keyspace, tasks, metadata, seq_counter: Arc::new(AtomicU64::new(current_seq)) })
    }

    /// Enqueue a work item and return its sequence number.
    ///
    /// 1. Increment sequence counter (in-memory)
    /// 2. Persist the item to Fjall
    /// 3. Persist the updated counter
    pub fn enqueue(&self, item: &WorkItem) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        let value = serde_json::to_vec(item)?;
        let key = seq.to_be_bytes();
        self.tasks.insert(key, value)?;

        let next_seq = seq + 1;
        self.metadata.insert(b"next_seq", next_seq.to_be_bytes())?;

        debug!(seq, job_id = %item.job_id, "work item enqueued");

        Ok(seq)
    }

    pub fn get_task(&self, seq: u64) -> Result<Option<WorkItem>> {
        let key = seq.to_be_bytes();
        match self.tasks.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(b"next_seq")?;
        Ok(())
    }
}
