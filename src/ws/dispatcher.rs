//! Per-frame event handling.
//!
//! Every inbound frame goes decode → validate → handler. Handlers never send
//! anything themselves: they return the broadcasts and relays they want, or a
//! [`HandlerError`]. Only a successful handler's effects are applied, so a failed
//! persistence call can never be followed by a broadcast.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{RoomId, UserId};
use crate::store::{ensure_object_in_room, ChatStore, ObjectStore, RoomStore, Stores, ToolsStore};
use crate::ws::messages::{
    ChatMessagePayload, ClientEvent, DecodeError, JoinRoomData, RoomRef, RtcIceCandidateData,
    RtcIceCandidatePayload, RtcPeerPayload, RtcSessionDescriptionData, RtcSessionDescriptionPayload,
    SendMessageData, ToolUsedPayload, UpdatePositionData, UseToolData, UserPositionPayload,
};
use crate::ws::{
    ConnectionHandle, Departure, DirectedRelay, Envelope, EventKind, RoomBroadcaster, SessionRegistry,
};

/// Outbound work requested by a handler
#[derive(Debug)]
pub enum Effect {
    Broadcast {
        room_id: RoomId,
        envelope: Envelope,
        exclude: Option<Uuid>,
    },
    Relay {
        room_id: RoomId,
        to_user_id: UserId,
        envelope: Envelope,
    },
}

/// Why a handler refused or failed an event
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("not in room {0}")]
    NotInRoom(RoomId),

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

pub type HandlerResult = Result<Vec<Effect>, HandlerError>;

/// Error text sent back when a handler for `kind` fails
fn failure_message(kind: EventKind) -> &'static str {
    match kind {
        EventKind::JoinRoom => "Failed to join room",
        EventKind::LeaveRoom => "Failed to leave room",
        EventKind::UpdatePosition => "Failed to update position",
        EventKind::SendMessage => "Failed to send message",
        EventKind::UseTool => "Failed to use tool",
        EventKind::RtcJoin => "Failed to join call",
        EventKind::RtcLeave => "Failed to leave call",
        EventKind::RtcOffer => "Failed to relay offer",
        EventKind::RtcAnswer => "Failed to relay answer",
        EventKind::RtcIceCandidate => "Failed to relay ICE candidate",
        EventKind::UserJoined
        | EventKind::UserLeft
        | EventKind::PositionUpdated
        | EventKind::MessageReceived
        | EventKind::ToolUsed
        | EventKind::Error => "Unsupported event",
    }
}

impl From<&DecodeError> for Envelope {
    fn from(err: &DecodeError) -> Self {
        match err {
            DecodeError::Malformed(e) => Envelope::error("Invalid message format", Some(e.to_string())),
            DecodeError::UnknownEvent(name) => Envelope::error("Unknown event type", Some(name.clone())),
            DecodeError::ServerOnly(kind) => Envelope::error("Unsupported event", Some(kind.to_string())),
            DecodeError::InvalidPayload { kind, source } => {
                Envelope::error(failure_message(*kind), Some(source.to_string()))
            }
        }
    }
}

/// Routes decoded client events to their handlers
pub struct EventDispatcher {
    registry: Arc<SessionRegistry>,
    broadcaster: RoomBroadcaster,
    relay: DirectedRelay,
    rooms: Arc<dyn RoomStore>,
    chat: Arc<dyn ChatStore>,
    tools: Arc<dyn ToolsStore>,
    objects: Arc<dyn ObjectStore>,
    send_timeout: Duration,
}

impl EventDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, stores: &Stores, send_timeout: Duration) -> Self {
        Self {
            broadcaster: RoomBroadcaster::new(registry.clone(), send_timeout),
            relay: DirectedRelay::new(registry.clone(), send_timeout),
            registry,
            rooms: stores.rooms.clone(),
            chat: stores.chat.clone(),
            tools: stores.tools.clone(),
            objects: stores.objects.clone(),
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle one text frame from `conn`. Failures are reported to `conn` only.
    pub async fn dispatch(&self, conn: &ConnectionHandle, text: &str) {
        let event = match ClientEvent::decode(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(conn_id = %conn.conn_id, error = %err, "Rejected frame");
                self.reply(conn, Envelope::from(&err)).await;
                return;
            }
        };

        let kind = event.kind();
        tracing::debug!(conn_id = %conn.conn_id, user_id = %conn.user_id(), event = %kind, "Received event");

        match self.handle(conn, event).await {
            Ok(effects) => self.apply(effects).await,
            Err(err) => {
                tracing::warn!(
                    conn_id = %conn.conn_id,
                    user_id = %conn.user_id(),
                    event = %kind,
                    error = %err,
                    "Event handler failed"
                );
                self.reply(conn, Envelope::error(failure_message(kind), Some(err.to_string())))
                    .await;
            }
        }
    }

    async fn handle(&self, conn: &ConnectionHandle, event: ClientEvent) -> HandlerResult {
        match event {
            ClientEvent::JoinRoom(data) => self.join_room(conn, data).await,
            ClientEvent::LeaveRoom(data) => self.leave_room(conn, data).await,
            ClientEvent::UpdatePosition(data) => self.update_position(conn, data).await,
            ClientEvent::SendMessage(data) => self.send_message(conn, data).await,
            ClientEvent::UseTool(data) => self.use_tool(conn, data).await,
            ClientEvent::RtcJoin(data) => self.rtc_presence(conn, data, EventKind::RtcJoin),
            ClientEvent::RtcLeave(data) => self.rtc_presence(conn, data, EventKind::RtcLeave),
            ClientEvent::RtcOffer(data) => self.rtc_description(conn, data, EventKind::RtcOffer),
            ClientEvent::RtcAnswer(data) => self.rtc_description(conn, data, EventKind::RtcAnswer),
            ClientEvent::RtcIceCandidate(data) => self.rtc_ice_candidate(conn, data),
        }
    }

    async fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Broadcast {
                    room_id,
                    envelope,
                    exclude,
                } => {
                    self.broadcaster.broadcast(room_id, &envelope, exclude).await;
                }
                Effect::Relay {
                    room_id,
                    to_user_id,
                    envelope,
                } => {
                    self.relay.relay(room_id, to_user_id, &envelope).await;
                }
            }
        }
    }

    /// Send directly to the originating connection
    async fn reply(&self, conn: &ConnectionHandle, envelope: Envelope) {
        if let Err(e) = conn.deliver(envelope.to_json().into(), self.send_timeout).await {
            tracing::warn!(conn_id = %conn.conn_id, error = %e, "Reply delivery failed");
            self.registry.evict(&conn.conn_id);
        }
    }

    fn require_member(&self, conn: &ConnectionHandle, room_id: RoomId) -> Result<(), HandlerError> {
        if self.registry.room_of(&conn.conn_id) == Some(room_id) {
            Ok(())
        } else {
            Err(HandlerError::NotInRoom(room_id))
        }
    }

    /// `user_left` for a room the user no longer has any connection in
    fn departure_notice(&self, conn: &ConnectionHandle, room_id: RoomId) -> Option<Effect> {
        if self.registry.find_by_user_in_room(room_id, conn.user_id()).is_some() {
            return None;
        }

        Some(Effect::Broadcast {
            room_id,
            envelope: Envelope::new(EventKind::UserLeft, &UserPositionPayload::new(&conn.user, 0, 0)),
            exclude: Some(conn.conn_id),
        })
    }

    // ==================== Handlers ====================

    async fn join_room(&self, conn: &ConnectionHandle, data: JoinRoomData) -> HandlerResult {
        if !self.rooms.room_exists(data.room_id).await? {
            return Err(HandlerError::RoomNotFound(data.room_id));
        }

        self.rooms
            .join_room(conn.user_id(), data.room_id, data.x, data.y)
            .await?;

        let mut effects = Vec::with_capacity(2);
        if let Some(old_room) = self.registry.join_room(&conn.conn_id, data.room_id) {
            effects.extend(self.departure_notice(conn, old_room));
        }

        tracing::info!(
            conn_id = %conn.conn_id,
            user_id = %conn.user_id(),
            room_id = %data.room_id,
            "User joined room"
        );

        effects.push(Effect::Broadcast {
            room_id: data.room_id,
            envelope: Envelope::new(
                EventKind::UserJoined,
                &UserPositionPayload::new(&conn.user, data.x, data.y),
            ),
            exclude: Some(conn.conn_id),
        });

        Ok(effects)
    }

    async fn leave_room(&self, conn: &ConnectionHandle, data: RoomRef) -> HandlerResult {
        self.require_member(conn, data.room_id)?;

        self.registry.leave_room(&conn.conn_id);

        tracing::info!(
            conn_id = %conn.conn_id,
            user_id = %conn.user_id(),
            room_id = %data.room_id,
            "User left room"
        );

        // Another device of the same user keeps the presence record alive
        let Some(notice) = self.departure_notice(conn, data.room_id) else {
            return Ok(Vec::new());
        };
        self.rooms.leave_room(conn.user_id(), data.room_id).await?;

        Ok(vec![notice])
    }

    async fn update_position(&self, conn: &ConnectionHandle, data: UpdatePositionData) -> HandlerResult {
        self.require_member(conn, data.room_id)?;

        self.rooms
            .update_position(conn.user_id(), data.room_id, data.x, data.y)
            .await?
            .ok_or_else(|| {
                HandlerError::Rejected(format!("no presence record in room {}", data.room_id))
            })?;

        Ok(vec![Effect::Broadcast {
            room_id: data.room_id,
            envelope: Envelope::new(
                EventKind::PositionUpdated,
                &UserPositionPayload::new(&conn.user, data.x, data.y),
            ),
            exclude: Some(conn.conn_id),
        }])
    }

    async fn send_message(&self, conn: &ConnectionHandle, data: SendMessageData) -> HandlerResult {
        self.require_member(conn, data.room_id)?;

        if data.message.trim().is_empty() {
            return Err(HandlerError::Rejected("message must not be empty".to_string()));
        }

        let log = self
            .chat
            .append_message(data.room_id, conn.user_id(), &data.message)
            .await?;

        // Sender included: it needs the stored timestamp
        Ok(vec![Effect::Broadcast {
            room_id: data.room_id,
            envelope: Envelope::new(
                EventKind::MessageReceived,
                &ChatMessagePayload {
                    user_id: conn.user.id,
                    username: conn.user.username.clone(),
                    avatar_url: conn.user.avatar_url.clone(),
                    message: log.message,
                    timestamp: log.created_at,
                },
            ),
            exclude: None,
        }])
    }

    async fn use_tool(&self, conn: &ConnectionHandle, data: UseToolData) -> HandlerResult {
        self.require_member(conn, data.room_id)?;
        ensure_object_in_room(self.objects.as_ref(), data.room_id, data.target_object_id).await?;

        let log = self
            .tools
            .record_usage(conn.user_id(), data.room_id, data.target_object_id, data.action)
            .await?;

        Ok(vec![Effect::Broadcast {
            room_id: data.room_id,
            envelope: Envelope::new(
                EventKind::ToolUsed,
                &ToolUsedPayload {
                    user_id: conn.user.id,
                    username: conn.user.username.clone(),
                    target_object_id: log.target_object_id,
                    action: log.action,
                    timestamp: log.created_at,
                },
            ),
            exclude: None,
        }])
    }

    fn rtc_presence(&self, conn: &ConnectionHandle, data: RoomRef, kind: EventKind) -> HandlerResult {
        self.require_member(conn, data.room_id)?;

        Ok(vec![Effect::Broadcast {
            room_id: data.room_id,
            envelope: Envelope::new(kind, &RtcPeerPayload::new(&conn.user)),
            exclude: Some(conn.conn_id),
        }])
    }

    fn rtc_description(
        &self,
        conn: &ConnectionHandle,
        data: RtcSessionDescriptionData,
        kind: EventKind,
    ) -> HandlerResult {
        self.require_member(conn, data.room_id)?;

        Ok(vec![Effect::Relay {
            room_id: data.room_id,
            to_user_id: data.to_user_id,
            envelope: Envelope::new(
                kind,
                &RtcSessionDescriptionPayload {
                    from_user_id: conn.user_id(),
                    sdp: data.sdp,
                },
            ),
        }])
    }

    fn rtc_ice_candidate(&self, conn: &ConnectionHandle, data: RtcIceCandidateData) -> HandlerResult {
        self.require_member(conn, data.room_id)?;

        Ok(vec![Effect::Relay {
            room_id: data.room_id,
            to_user_id: data.to_user_id,
            envelope: Envelope::new(
                EventKind::RtcIceCandidate,
                &RtcIceCandidatePayload {
                    from_user_id: conn.user_id(),
                    candidate: data.candidate,
                },
            ),
        }])
    }

    // ==================== Teardown ====================

    /// Announce a torn-down connection to the room it was in.
    /// Skipped while the same user still has another connection in that room.
    pub async fn handle_disconnect(&self, departure: Departure) {
        let Some(room_id) = departure.room_id else {
            return;
        };
        let conn = &departure.handle;

        let Some(notice) = self.departure_notice(conn, room_id) else {
            return;
        };

        if let Err(e) = self.rooms.leave_room(conn.user_id(), room_id).await {
            tracing::warn!(
                user_id = %conn.user_id(),
                room_id = %room_id,
                error = %e,
                "Failed to clear presence on disconnect"
            );
        }

        self.apply(vec![notice]).await;
    }
}
