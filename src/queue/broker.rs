use crate::domain::WorkItem;
use crate::queue::store::{FjallQueue, QueueError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Wraps a `WorkItem` with its durable sequence number.
#[derive(Clone, Debug)]
pub struct TaskEnvelope {
    pub seq: u64,
    pub item: WorkItem,
}

/// Distributes work items from the supervisor to the worker pool.
///
/// 1. Supervisor calls `broker.enqueue(item)`
/// 2. Broker persists the item to `FjallQueue` (atomic, gets a seq)
/// 3. Broker sends `TaskEnvelope{seq, item}` to a worker via an mpsc channel
/// 4. Round-robin distribution across the worker pool
/// 5. Backpressure via bounded channels
///
/// The broker is not itself a task; it's a struct whose methods are called
/// by the submit/force-new handlers and by retry dispatch.
pub struct TaskBroker {
    queue: Arc<RwLock<FjallQueue>>,
    worker_channels: Vec<mpsc::Sender<TaskEnvelope>>,
    next_worker: AtomicUsize,
}

impl TaskBroker {
    pub fn new(
        queue: Arc<RwLock<FjallQueue>>,
        num_workers: usize,
        channel_size: usize,
    ) -> (Self, Vec<mpsc::Receiver<TaskEnvelope>>) {
        info!(num_workers, channel_size, "creating TaskBroker with worker channels");

        let mut worker_channels = Vec::with_capacity(num_workers);
        let mut worker_receivers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(channel_size);
            worker_channels.push(tx);
            worker_receivers.push(rx);
            debug!(worker_id, "created worker channel");
        }

        let broker = Self { queue, worker_channels, next_worker: AtomicUsize::new(0) };

        (broker, worker_receivers)
    }

    /// Persist a work item and hand it to the next worker (round-robin).
    /// Returns the sequence number, which is the durable handle; if the
    /// worker channel turns out to be closed the item is still safe in
    /// Fjall and can be redelivered on worker restart.
    pub async fn enqueue(&self, item: WorkItem) -> Result<u64, QueueError> {
        let seq = {
            let queue = self.queue.write().await;
            queue.enqueue(&item)?
        };

        debug!(seq, job_id = %item.job_id, "work item persisted to queue");

        let envelope = TaskEnvelope { seq, item: item.clone() };

        let worker_idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();

        match self.worker_channels[worker_idx].send(envelope).await {
            Ok(_) => {
                debug!(seq, worker_idx, "work item sent to worker");
                Ok(seq)
            }
            Err(_) => {
                warn!(seq, worker_idx, "worker channel closed, item not delivered");
                Ok(seq)
            }
        }
    }

    pub fn num_workers(&self) -> usize {
        self.worker_channels.len()
    }

    pub fn health_check(&self) -> bool {
        self.worker_channels.iter().all(|ch| !ch.is_closed())
    }
}
