//! Experiment lifecycle events

use chrono::{DateTime, Utc};
use domain::value_objects::{ExecutionPhase, ExperimentId, ExperimentStatus, FaultId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something that happened to an experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExperimentEventKind {
    Created,
    Started,
    PhaseChanged { phase: ExecutionPhase },
    FaultInjected { fault_id: FaultId },
    FaultRemoved { fault_id: FaultId },
    Finished { status: ExperimentStatus },
}

/// Timestamped event for one experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentEvent {
    pub experiment_id: ExperimentId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ExperimentEventKind,
}

impl ExperimentEvent {
    pub fn new(experiment_id: ExperimentId, kind: ExperimentEventKind) -> Self {
        Self {
            experiment_id,
            at: Utc::now(),
            kind,
        }
    }
}

/// Broadcast sender that ignores the absence of subscribers
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<ExperimentEvent>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventPublisher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn publish(&self, experiment_id: &ExperimentId, kind: ExperimentEventKind) {
        let _ = self
            .sender
            .send(ExperimentEvent::new(experiment_id.clone(), kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let publisher = EventPublisher::default();
        let mut rx = publisher.subscribe();
        let id = ExperimentId::new("exp-1");

        publisher.publish(&id, ExperimentEventKind::Created);
        publisher.publish(
            &id,
            ExperimentEventKind::PhaseChanged {
                phase: ExecutionPhase::Injection,
            },
        );

        assert_eq!(rx.recv().await.unwrap().kind, ExperimentEventKind::Created);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.experiment_id, id);
        assert!(matches!(
            second.kind,
            ExperimentEventKind::PhaseChanged { .. }
        ));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        EventPublisher::new(0).publish(&ExperimentId::new("exp-1"), ExperimentEventKind::Started);
    }

    #[test]
    fn serialized_with_event_tag() {
        let event = ExperimentEvent::new(
            ExperimentId::new("exp-1"),
            ExperimentEventKind::Finished {
                status: ExperimentStatus::Completed,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "finished");
        assert_eq!(json["status"], "completed");
    }
}
