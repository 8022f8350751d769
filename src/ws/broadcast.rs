use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use crate::models::RoomId;
use crate::ws::{ConnectionHandle, Envelope, OutboundFrame, SessionRegistry};

/// Fans an envelope out to every connection in a room
#[derive(Clone)]
pub struct RoomBroadcaster {
    registry: Arc<SessionRegistry>,
    send_timeout: Duration,
}

impl RoomBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// Deliver to all current members of `room_id` except `exclude`.
    ///
    /// Sends run concurrently, each bounded by the send timeout. A recipient that
    /// fails is evicted; the others are unaffected. Returns how many were reached.
    pub async fn broadcast(&self, room_id: RoomId, envelope: &Envelope, exclude: Option<Uuid>) -> usize {
        let recipients: Vec<ConnectionHandle> = self
            .registry
            .members_of(room_id)
            .into_iter()
            .filter(|member| Some(member.conn_id) != exclude)
            .collect();

        if recipients.is_empty() {
            return 0;
        }

        let frame: OutboundFrame = envelope.to_json().into();
        let sends = recipients
            .iter()
            .map(|member| member.deliver(frame.clone(), self.send_timeout));
        let results = join_all(sends).await;

        let mut delivered = 0;
        for (member, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        conn_id = %member.conn_id,
                        room_id = %room_id,
                        event = %envelope.event,
                        error = %e,
                        "Broadcast delivery failed"
                    );
                    self.registry.evict(&member.conn_id);
                }
            }
        }

        tracing::trace!(room_id = %room_id, event = %envelope.event, delivered, "Broadcast sent");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::session::tests::test_handle;
    use crate::ws::EventKind;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn registry_with(room_id: RoomId, handles: &[&ConnectionHandle]) -> Arc<SessionRegistry> {
        let registry = Arc::new(SessionRegistry::new());
        for h in handles {
            registry.register((*h).clone());
            registry.join_room(&h.conn_id, room_id);
        }
        registry
    }

    #[tokio::test]
    async fn test_broadcast_respects_exclude() {
        let (a, mut rx_a) = test_handle(1);
        let (b, mut rx_b) = test_handle(2);
        let registry = registry_with(5, &[&a, &b]);
        let broadcaster = RoomBroadcaster::new(registry, Duration::from_millis(100));

        let envelope = Envelope::new(EventKind::UserJoined, &json!({ "user_id": 1 }));
        assert_eq!(broadcaster.broadcast(5, &envelope, Some(a.conn_id)).await, 1);

        assert!(rx_a.try_recv().is_err());
        let frame = rx_b.try_recv().unwrap();
        assert!(frame.contains("user_joined"));
        // Exactly once
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room() {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = RoomBroadcaster::new(registry, Duration::from_millis(100));

        let envelope = Envelope::new(EventKind::UserLeft, &json!({}));
        assert_eq!(broadcaster.broadcast(9, &envelope, None).await, 0);
    }

    #[tokio::test]
    async fn test_failed_recipient_is_evicted_others_still_served() {
        let (a, mut rx_a) = test_handle(1);
        let (b, rx_b) = test_handle(2);
        // A stalled peer: buffer of one, already full
        let (tx_c, _rx_c) = mpsc::channel(1);
        let c = ConnectionHandle::new(Uuid::new_v4(), crate::ws::session::tests::test_user(3), tx_c);
        c.deliver("backlog".into(), Duration::from_millis(10)).await.unwrap();

        let registry = registry_with(5, &[&a, &b, &c]);
        drop(rx_b);
        let broadcaster = RoomBroadcaster::new(registry.clone(), Duration::from_millis(20));

        let envelope = Envelope::new(EventKind::MessageReceived, &json!({ "message": "hi" }));
        assert_eq!(broadcaster.broadcast(5, &envelope, None).await, 1);
        assert!(rx_a.try_recv().is_ok());

        let remaining: Vec<Uuid> = registry.members_of(5).into_iter().map(|h| h.conn_id).collect();
        assert_eq!(remaining, vec![a.conn_id]);

        // A later broadcast no longer tries the evicted peers
        assert_eq!(broadcaster.broadcast(5, &envelope, None).await, 1);
    }
}
