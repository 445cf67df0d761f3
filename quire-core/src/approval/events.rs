use quire_model::RequestId;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Outcome notifications for whoever delivers messages to requesters and
/// admins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalEvent {
    /// Approved without a catalog service to send it to.
    Approved { request_id: RequestId, actor: String },
    Queued {
        request_id: RequestId,
        reason: String,
    },
    Declined { request_id: RequestId, actor: String },
    Failed {
        request_id: RequestId,
        reason: String,
    },
}

impl ApprovalEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Approved { request_id, .. }
            | Self::Queued { request_id, .. }
            | Self::Declined { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }
}

/// In-process fan-out of [`ApprovalEvent`]s. Publishing never blocks and
/// never fails; events sent with no subscriber are dropped.
#[derive(Debug, Clone)]
pub struct ApprovalEventBus {
    sender: broadcast::Sender<ApprovalEvent>,
}

impl Default for ApprovalEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ApprovalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ApprovalEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = ApprovalEventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(ApprovalEvent::Declined {
            request_id: RequestId(3),
            actor: "admin".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id(), RequestId(3));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        ApprovalEventBus::new(0).publish(ApprovalEvent::Failed {
            request_id: RequestId(1),
            reason: "x".into(),
        });
    }
}
