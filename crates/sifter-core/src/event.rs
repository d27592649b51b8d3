use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{EventEnvelope, JobEvent, JobId};

/// Failure to deliver a job event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no open event channel for job {0}")]
    ChannelClosed(JobId),
}

/// Outbound side of the per-job event stream.
pub trait Publisher: Send + Sync + 'static {
    /// Publish an event on the job's channel.
    fn publish(&self, job_id: &JobId, event: JobEvent) -> Result<(), PublishError>;
}

struct Channel {
    next_seq: u64,
    subscribers: Vec<mpsc::UnboundedSender<EventEnvelope>>,
}

/// Event bus with one ordered channel per job.
///
/// Every subscriber gets its own unbounded queue, so a slow reader never
/// causes another subscriber to lose or reorder events. Taps receive the
/// events of every job.
pub struct EventBus {
    channels: Mutex<HashMap<JobId, Channel>>,
    taps: Mutex<Vec<mpsc::UnboundedSender<EventEnvelope>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            taps: Mutex::new(Vec::new()),
        }
    }

    /// Open the channel for a job. Opening an already open channel is a no-op.
    pub fn open(&self, job_id: &JobId) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(job_id.clone()).or_insert_with(|| Channel {
            next_seq: 0,
            subscribers: Vec::new(),
        });
    }

    /// Subscribe to a job's channel. Returns `None` if the channel is not open.
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe(&self, job_id: &JobId) -> Option<mpsc::UnboundedReceiver<EventEnvelope>> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let channel = channels.get_mut(job_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        channel.subscribers.push(tx);
        Some(rx)
    }

    /// Receive the events of every job.
    pub fn tap(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.taps.lock().unwrap_or_else(|e| e.into_inner()).push(tx);
        rx
    }

    /// Release a job's channel. Subscribers see end-of-stream once drained.
    pub fn close(&self, job_id: &JobId) {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
    }

    pub fn is_open(&self, job_id: &JobId) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(job_id)
    }

    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .map_or(0, |c| c.subscribers.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for EventBus {
    fn publish(&self, job_id: &JobId, event: JobEvent) -> Result<(), PublishError> {
        let envelope = {
            let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            let channel = channels
                .get_mut(job_id)
                .ok_or_else(|| PublishError::ChannelClosed(job_id.clone()))?;

            let envelope = EventEnvelope {
                job_id: job_id.clone(),
                seq: channel.next_seq,
                timestamp: Utc::now(),
                event,
            };
            channel.next_seq += 1;

            // Drop subscribers whose receiver is gone
            channel
                .subscribers
                .retain(|tx| tx.send(envelope.clone()).is_ok());
            envelope
        };

        self.taps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_to_unopened_channel_fails() {
        let bus = EventBus::new();
        let job = JobId::new();
        let err = bus.publish(&job, JobEvent::Started).unwrap_err();
        assert!(matches!(err, PublishError::ChannelClosed(_)));
    }

    #[tokio::test]
    async fn subscribers_receive_in_order_with_seq() {
        let bus = EventBus::new();
        let job = JobId::new();
        bus.open(&job);
        let mut rx = bus.subscribe(&job).unwrap();

        bus.publish(&job, JobEvent::Started).unwrap();
        bus.publish(&job, JobEvent::Results { items: vec![] }).unwrap();
        bus.publish(&job, JobEvent::Complete).unwrap();
        bus.close(&job);

        let mut seen = Vec::new();
        while let Some(env) = rx.recv().await {
            seen.push((env.seq, env.event.kind()));
        }
        assert_eq!(
            seen,
            vec![(0, "started"), (1, "results"), (2, "complete")]
        );
    }

    #[tokio::test]
    async fn channels_are_isolated_per_job() {
        let bus = EventBus::new();
        let a = JobId::new();
        let b = JobId::new();
        bus.open(&a);
        bus.open(&b);
        let mut rx_a = bus.subscribe(&a).unwrap();

        bus.publish(&b, JobEvent::Started).unwrap();
        bus.publish(&a, JobEvent::Complete).unwrap();

        let env = rx_a.recv().await.unwrap();
        assert_eq!(env.job_id, a);
        assert_eq!(env.seq, 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn taps_see_every_job() {
        let bus = EventBus::new();
        let mut tap = bus.tap();
        let a = JobId::new();
        let b = JobId::new();
        bus.open(&a);
        bus.open(&b);

        bus.publish(&a, JobEvent::Started).unwrap();
        bus.publish(&b, JobEvent::Started).unwrap();

        assert_eq!(tap.recv().await.unwrap().job_id, a);
        assert_eq!(tap.recv().await.unwrap().job_id, b);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let job = JobId::new();
        bus.open(&job);
        let rx = bus.subscribe(&job).unwrap();
        assert_eq!(bus.subscriber_count(&job), 1);
        drop(rx);

        bus.publish(&job, JobEvent::Started).unwrap();
        assert_eq!(bus.subscriber_count(&job), 0);
    }

    #[test]
    fn subscribe_after_close_returns_none() {
        let bus = EventBus::new();
        let job = JobId::new();
        bus.open(&job);
        bus.close(&job);
        assert!(!bus.is_open(&job));
        assert!(bus.subscribe(&job).is_none());
    }
}
