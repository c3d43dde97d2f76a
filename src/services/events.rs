//! Event system for negotiation operations
//!
//! Services emit an event after every committed write. Presence and
//! notification collaborators subscribe to the bus; delivering events to
//! viewers is their concern, not this crate's.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::value::{ProposalStatus, ProposalType};

/// Events emitted by the lifecycle services
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    // Proposal events
    ProposalSubmitted {
        id: String,
        project_id: String,
        proposal_type: ProposalType,
        proposer_id: String,
    },
    ProposalEdited {
        id: String,
        project_id: String,
    },
    ProposalDeleted {
        id: String,
        project_id: String,
    },
    ProposalDecided {
        id: String,
        project_id: String,
        from: ProposalStatus,
        to: ProposalStatus,
        validator_id: String,
        /// Siblings moved to rejected by a singleton acceptance
        retired: Vec<String>,
    },

    // Project events
    ProjectCreated {
        id: String,
        administrator_id: String,
    },
    ProjectActivated {
        id: String,
    },
    ProjectRejected {
        id: String,
    },
    ProjectDeleted {
        id: String,
        proposals_removed: usize,
    },
}

impl NegotiationEvent {
    /// Project the event belongs to
    pub fn project_id(&self) -> &str {
        match self {
            NegotiationEvent::ProposalSubmitted { project_id, .. }
            | NegotiationEvent::ProposalEdited { project_id, .. }
            | NegotiationEvent::ProposalDeleted { project_id, .. }
            | NegotiationEvent::ProposalDecided { project_id, .. } => project_id,
            NegotiationEvent::ProjectCreated { id, .. }
            | NegotiationEvent::ProjectActivated { id }
            | NegotiationEvent::ProjectRejected { id }
            | NegotiationEvent::ProjectDeleted { id, .. } => id,
        }
    }
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &NegotiationEvent);
}

/// Event bus for broadcasting negotiation events
pub struct EventBus {
    sender: broadcast::Sender<NegotiationEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: NegotiationEvent) {
        trace!(event = ?event, "Emitting negotiation event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<NegotiationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &NegotiationEvent) {
        match event {
            NegotiationEvent::ProposalSubmitted {
                id,
                project_id,
                proposal_type,
                proposer_id,
            } => {
                debug!(
                    id = %id,
                    project = %project_id,
                    kind = %proposal_type,
                    proposer = %proposer_id,
                    "Proposal submitted"
                );
            }
            NegotiationEvent::ProposalDecided {
                id,
                project_id,
                from,
                to,
                validator_id,
                retired,
            } => {
                info!(
                    id = %id,
                    project = %project_id,
                    from = %from,
                    to = %to,
                    validator = %validator_id,
                    retired = ?retired,
                    "Proposal decided"
                );
            }
            NegotiationEvent::ProjectActivated { id } => {
                info!(id = %id, "Project activated");
            }
            NegotiationEvent::ProjectDeleted {
                id,
                proposals_removed,
            } => {
                debug!(id = %id, proposals_removed, "Project deleted");
            }
            _ => {
                trace!(event = ?event, "Negotiation event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(NegotiationEvent::ProposalDecided {
            id: "b2".into(),
            project_id: "p1".into(),
            from: ProposalStatus::Pending,
            to: ProposalStatus::Accepted,
            validator_id: "alice".into(),
            retired: vec!["b1".into()],
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            NegotiationEvent::ProposalDecided { id, retired, .. } => {
                assert_eq!(id, "b2");
                assert_eq!(retired, vec!["b1".to_string()]);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        bus.emit(NegotiationEvent::ProjectRejected { id: "p1".into() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_events_name_their_project() {
        let submitted = NegotiationEvent::ProposalSubmitted {
            id: "x".into(),
            project_id: "p1".into(),
            proposal_type: ProposalType::Goal,
            proposer_id: "bob".into(),
        };
        assert_eq!(submitted.project_id(), "p1");
        assert_eq!(
            NegotiationEvent::ProjectActivated { id: "p2".into() }.project_id(),
            "p2"
        );
    }

    #[tokio::test]
    async fn test_logging_listener_stops_when_bus_dropped() {
        let bus = Arc::new(EventBus::new());
        let handle = spawn_logging_listener(bus.clone());
        bus.emit(NegotiationEvent::ProjectActivated { id: "p1".into() });
        drop(bus);

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener did not stop")
            .expect("listener panicked");
    }
}
