use std::sync::Arc;
use std::time::Duration;

use crate::models::{RoomId, UserId};
use crate::ws::{Envelope, SessionRegistry};

/// Result of a point-to-point relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    /// Target not connected in that room; dropped silently
    NoTarget,
    /// Target found but the send failed; it has been evicted
    Failed,
}

/// Delivers signaling messages to exactly one peer
#[derive(Clone)]
pub struct DirectedRelay {
    registry: Arc<SessionRegistry>,
    send_timeout: Duration,
}

impl DirectedRelay {
    pub fn new(registry: Arc<SessionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub async fn relay(&self, room_id: RoomId, target_user_id: UserId, envelope: &Envelope) -> RelayOutcome {
        let Some(target) = self.registry.find_by_user_in_room(room_id, target_user_id) else {
            tracing::debug!(
                room_id = %room_id,
                target_user_id = %target_user_id,
                event = %envelope.event,
                "Relay target not in room, dropping"
            );
            return RelayOutcome::NoTarget;
        };

        match target.deliver(envelope.to_json().into(), self.send_timeout).await {
            Ok(()) => RelayOutcome::Delivered,
            Err(e) => {
                tracing::warn!(
                    conn_id = %target.conn_id,
                    room_id = %room_id,
                    event = %envelope.event,
                    error = %e,
                    "Relay delivery failed"
                );
                self.registry.evict(&target.conn_id);
                RelayOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::session::tests::test_handle;
    use crate::ws::EventKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_relay_reaches_only_target() {
        let registry = Arc::new(SessionRegistry::new());
        let (a, mut rx_a) = test_handle(1);
        let (b, mut rx_b) = test_handle(2);
        let (c, mut rx_c) = test_handle(3);
        for h in [&a, &b, &c] {
            registry.register(h.clone());
            registry.join_room(&h.conn_id, 5);
        }
        let relay = DirectedRelay::new(registry, Duration::from_millis(100));

        let envelope = Envelope::new(EventKind::RtcOffer, &json!({ "from_user_id": 1, "sdp": "v=0" }));
        assert_eq!(relay.relay(5, 2, &envelope).await, RelayOutcome::Delivered);

        assert!(rx_b.try_recv().unwrap().contains("v=0"));
        assert!(rx_b.try_recv().is_err());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_to_absent_user_is_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let (b, mut rx_b) = test_handle(2);
        registry.register(b.clone());
        registry.join_room(&b.conn_id, 6);
        let relay = DirectedRelay::new(registry, Duration::from_millis(100));

        let envelope = Envelope::new(EventKind::RtcAnswer, &json!({ "from_user_id": 1, "sdp": "v=0" }));
        // Connected, but in another room
        assert_eq!(relay.relay(5, 2, &envelope).await, RelayOutcome::NoTarget);
        assert_eq!(relay.relay(5, 42, &envelope).await, RelayOutcome::NoTarget);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_failure_evicts_target() {
        let registry = Arc::new(SessionRegistry::new());
        let (b, rx_b) = test_handle(2);
        registry.register(b.clone());
        registry.join_room(&b.conn_id, 5);
        drop(rx_b);
        let relay = DirectedRelay::new(registry.clone(), Duration::from_millis(100));

        let envelope = Envelope::new(EventKind::RtcIceCandidate, &json!({ "from_user_id": 1 }));
        assert_eq!(relay.relay(5, 2, &envelope).await, RelayOutcome::Failed);
        assert!(registry.find_by_user_in_room(5, 2).is_none());
    }
}
