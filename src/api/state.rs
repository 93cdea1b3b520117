use std::sync::Arc;

use crate::config::Config;
use crate::events::EventHub;
use crate::observability::Metrics;
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub events: Arc<EventHub>,
    pub config: Arc<Config>,
    pub metrics: Arc<Metrics>,
}
