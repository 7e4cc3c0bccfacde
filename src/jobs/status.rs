use std::collections::HashMap;

use tokio::sync::{broadcast, Mutex};

use crate::payload::{JobState, StepStatus};

const CHANNEL_CAPACITY: usize = 64;

/// Per-step progress event, published on the `job:<id>:steps` topic by the
/// instrumentation wrapper.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub step_id: String,
    pub processor: String,
    pub status: StepStatus,
}

/// In-process pub/sub fabric for live job status.
///
/// The topic `job:<job_id>` carries exactly one message per job state
/// transition, in canonical order, ending with a terminal state. A separate
/// `job:<job_id>:steps` topic carries per-step events so the transition
/// topic stays canonical. Subscribers receive messages published after they
/// attach; publications with no subscribers are dropped.
#[derive(Default)]
pub struct StatusHub {
    jobs: Mutex<HashMap<String, broadcast::Sender<JobState>>>,
    steps: Mutex<HashMap<String, broadcast::Sender<StepEvent>>>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe_job(&self, job_id: &str) -> broadcast::Receiver<JobState> {
        let mut topics = self.jobs.lock().await;
        topics
            .entry(format!("job:{job_id}"))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn publish_job(&self, job_id: &str, state: JobState) {
        let topics = self.jobs.lock().await;
        if let Some(sender) = topics.get(&format!("job:{job_id}")) {
            let _ = sender.send(state);
        }
    }

    pub async fn subscribe_steps(&self, job_id: &str) -> broadcast::Receiver<StepEvent> {
        let mut topics = self.steps.lock().await;
        topics
            .entry(format!("job:{job_id}:steps"))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn publish_step(&self, job_id: &str, event: StepEvent) {
        let topics = self.steps.lock().await;
        if let Some(sender) = topics.get(&format!("job:{job_id}:steps")) {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_transitions_in_order() {
        let hub = StatusHub::new();
        let mut rx = hub.subscribe_job("job-1").await;

        hub.publish_job("job-1", JobState::InProgress).await;
        hub.publish_job("job-1", JobState::Success).await;

        assert_eq!(rx.recv().await.unwrap(), JobState::InProgress);
        assert_eq!(rx.recv().await.unwrap(), JobState::Success);
    }

    #[tokio::test]
    async fn topics_are_isolated_per_job() {
        let hub = StatusHub::new();
        let mut rx_a = hub.subscribe_job("a").await;
        let _rx_b = hub.subscribe_job("b").await;

        hub.publish_job("b", JobState::Failed).await;
        hub.publish_job("a", JobState::InProgress).await;

        assert_eq!(rx_a.recv().await.unwrap(), JobState::InProgress);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let hub = StatusHub::new();
        // No panic, no buffering for later subscribers.
        hub.publish_job("ghost", JobState::InProgress).await;
        let mut rx = hub.subscribe_job("ghost").await;
        hub.publish_job("ghost", JobState::Success).await;
        assert_eq!(rx.recv().await.unwrap(), JobState::Success);
    }
}
