//! Shared component wiring for both entrypoints (spec §10.4): the API
//! process and the worker process open the same Fjall store path and agree
//! on the same provider/quota/supervisor stack, so either can be restarted
//! independently without orphaning in-flight jobs.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::config::Config;
use crate::events::EventHub;
use crate::ledger::FjallStore;
use crate::observability::Metrics;
use crate::providers::{ProviderManager, QuotaTracker};
use crate::queue::{FjallQueue, TaskBroker, TaskEnvelope};
use crate::supervisor::Supervisor;

pub struct Components {
    pub supervisor: Arc<Supervisor>,
    pub events: Arc<EventHub>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
    pub worker_receivers: Vec<mpsc::Receiver<TaskEnvelope>>,
}

pub async fn build(config: Config) -> Result<Components, Box<dyn std::error::Error + Send + Sync>> {
    let config = Arc::new(config);

    let ledger = FjallStore::open(&config.server.fjall_path)?;
    let quota_ledger = ledger.clone();
    let queue = Arc::new(RwLock::new(FjallQueue::open(config.server.fjall_path.join("queue"))?));

    let (broker, worker_receivers) = TaskBroker::new(queue, config.server.num_workers, 64);
    let broker = Arc::new(broker);

    let metrics = Arc::new(Metrics::new());

    let quota = QuotaTracker::new(quota_ledger, config.quota.clone());
    let providers = Arc::new(ProviderManager::new(&config.provider, quota, metrics.clone()));

    let events = Arc::new(EventHub::new());

    let supervisor = Arc::new(Supervisor::new(
        ledger,
        broker,
        events.clone(),
        providers,
        config.clone(),
        metrics.clone(),
    ));

    Ok(Components { supervisor, events, metrics, config, worker_receivers })
}
