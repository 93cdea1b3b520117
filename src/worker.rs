//! Worker process: dequeues `TaskEnvelope`s handed out by the `TaskBroker`
//! and drives each one through the `Supervisor`. It's the only process that
//! actually executes the pipeline; the API process only ever admits and
//! queries jobs.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::queue::TaskEnvelope;
use crate::supervisor::Supervisor;

/// Spawn one Tokio task per worker channel, each pulling `TaskEnvelope`s in
/// order and running them to completion before asking for the next. The
/// number of concurrently-running jobs therefore equals the number of
/// channels the broker was built with (`server.num_workers`).
pub fn spawn_workers(
    supervisor: Arc<Supervisor>,
    receivers: Vec<mpsc::Receiver<TaskEnvelope>>,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(worker_id, receiver)| {
            let supervisor = supervisor.clone();
            tokio::spawn(run_worker_loop(worker_id, receiver, supervisor))
        })
        .collect()
}

async fn run_worker_loop(
    worker_id: usize,
    mut receiver: mpsc::Receiver<TaskEnvelope>,
    supervisor: Arc<Supervisor>,
) {
    info!(worker_id, "worker loop started");
    while let Some(envelope) = receiver.recv().await {
        let job_id = envelope.item.job_id.clone();
        info!(worker_id, seq = envelope.seq, job_id = %job_id, "dequeued job");
        supervisor.run_job(envelope.item).await;
    }
    warn!(worker_id, "worker channel closed, loop exiting");
}
