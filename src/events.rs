//! C11 — Event Stream Hub.
//!
//! One `broadcast` channel per in-flight job, fanned out to however many
//! HTTP subscribers are attached to its SSE stream. A late subscriber
//! receives only events published after it subscribes; the job's durable
//! row in the ledger is the source of truth for anything that happened
//! before (the `status` endpoint reads that, not this hub).

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::domain::JobEvent;

/// Bounded so a slow subscriber can't hold arbitrary memory; a subscriber
/// that falls behind this far sees a `Lagged` error on its stream and can
/// fall back to polling `status`.
const CHANNEL_CAPACITY: usize = 64;

pub struct EventHub {
    channels: Mutex<HashMap<String, broadcast::Sender<JobEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self { channels: Mutex::new(HashMap::new()) }
    }

    /// Publish an event for `job_id`. Creates the channel on first use so a
    /// publisher never needs to race a subscriber to set it up. If nobody is
    /// subscribed the event is simply dropped, which is fine — progress
    /// events are a live tail, not a queue.
    pub fn publish(&self, job_id: &str, event: JobEvent) {
        let sender = self.sender_for(job_id);
        let _ = sender.send(event);
    }

    /// Subscribe to `job_id`'s event stream as a `Stream<Item = JobEvent>`,
    /// axum-SSE-ready via `async_stream` at the call site.
    pub fn subscribe(&self, job_id: &str) -> BroadcastStream<JobEvent> {
        let sender = self.sender_for(job_id);
        BroadcastStream::new(sender.subscribe())
    }

    /// Drop the channel for a job once it reaches a terminal state, so a
    /// long-running process doesn't accumulate one `broadcast::Sender` per
    /// job ever submitted.
    pub fn retire(&self, job_id: &str) {
        let mut channels = self.channels.lock();
        if channels.remove(job_id).is_some() {
            debug!(job_id, "retired event channel");
        }
    }

    fn sender_for(&self, job_id: &str) -> broadcast::Sender<JobEvent> {
        let mut channels = self.channels.lock();
        channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorRecord;
    use crate::domain::ErrorKind;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let hub = EventHub::new();
        let mut stream = hub.subscribe("job-1");

        hub.publish(
            "job-1",
            JobEvent::Progress { current: 1, total: 5, status: "running".into(), shop_name: None },
        );

        let received = stream.next().await.unwrap().unwrap();
        assert!(matches!(received, JobEvent::Progress { current: 1, .. }));
    }

    #[tokio::test]
    async fn events_published_before_subscribing_are_not_seen() {
        let hub = EventHub::new();
        hub.publish(
            "job-2",
            JobEvent::Failed { error: ErrorRecord::new(ErrorKind::Unknown, "boom") },
        );

        let mut stream = hub.subscribe("job-2");
        hub.publish(
            "job-2",
            JobEvent::Completed { result: crate::domain::AnalysisResult {
                success: true,
                compliance_report: None,
                improved_policy: None,
                match_verdict: crate::domain::MatchVerdict::Match,
                served_from_fallback: false,
                failed_stages: Vec::new(),
            } },
        );

        let received = stream.next().await.unwrap().unwrap();
        assert!(matches!(received, JobEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn retire_drops_the_channel() {
        let hub = EventHub::new();
        let _stream = hub.subscribe("job-3");
        hub.retire("job-3");
        assert!(hub.channels.lock().get("job-3").is_none());
    }
}
