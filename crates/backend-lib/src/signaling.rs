// ============================
// crates/backend-lib/src/signaling.rs
// ============================
//! Per-room signaling relay.
//!
//! One broadcast bus per room carries offer/answer/ICE/reaction
//! envelopes between the participants of that room. Delivery is
//! best-effort, at-most-once, ordered per sender; there is no
//! store-and-forward, so a participant who joins after a send never
//! sees it.
use campusmeet_common::{RoomId, SignalEnvelope, SignalKind, UserId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::validation;

const ROOM_BUS_CAPACITY: usize = 64;

type SignalHandler = Box<dyn Fn(SignalEnvelope) + Send + Sync>;

/// Registry of live room buses. Shared by the relay router and by
/// in-process session coordinators.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, broadcast::Sender<SignalEnvelope>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: DashMap::new(),
        }
    }

    /// Get or create the bus for a room
    pub(crate) fn bus(&self, room_id: &str) -> broadcast::Sender<SignalEnvelope> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_BUS_CAPACITY).0)
            .clone()
    }

    /// Number of live subscriptions to a room's bus
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop a room's bus once the last subscriber is gone
    pub(crate) fn release(&self, room_id: &str) {
        self.rooms
            .remove_if(room_id, |_, tx| tx.receiver_count() == 0);
    }

    /// Get all rooms with a live bus
    pub fn active_rooms(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's subscription to one room's signaling bus.
///
/// Handlers registered with [`on`](Self::on) run on a dispatch task as
/// envelopes arrive; a sender never observes its own envelopes, and
/// envelopes with an unknown event name are dropped silently.
pub struct SignalingChannel {
    room_id: RoomId,
    user_id: UserId,
    tx: broadcast::Sender<SignalEnvelope>,
    handlers: Arc<DashMap<SignalKind, SignalHandler>>,
    dispatch: Option<JoinHandle<()>>,
    registry: Arc<RoomRegistry>,
}

impl std::fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("room_id", &self.room_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl SignalingChannel {
    /// Subscribe to a room's bus.
    pub fn join(
        registry: Arc<RoomRegistry>,
        room_id: impl Into<RoomId>,
        user_id: impl Into<UserId>,
    ) -> Result<Self, AppError> {
        let room_id = room_id.into();
        let user_id = user_id.into();
        validation::validate_room_id(&room_id)?;

        let tx = registry.bus(&room_id);
        let mut rx = tx.subscribe();
        let handlers: Arc<DashMap<SignalKind, SignalHandler>> = Arc::new(DashMap::new());

        let dispatch = {
            let handlers = Arc::clone(&handlers);
            let own_id = user_id.clone();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(envelope) => {
                            if envelope.sender_id == own_id {
                                continue;
                            }
                            // unknown kinds are ignored, not an error
                            let Some(kind) = SignalKind::parse(&envelope.event) else {
                                continue;
                            };
                            if let Some(handler) = handlers.get(&kind) {
                                (handler.value())(envelope);
                            }
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // best-effort delivery: skip and move on
                            tracing::warn!(skipped, "signaling subscriber lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        Ok(SignalingChannel {
            room_id,
            user_id,
            tx,
            handlers,
            dispatch: Some(dispatch),
            registry,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Register the handler for one signal kind, replacing any previous
    /// handler for that kind.
    pub fn on<F>(&self, kind: SignalKind, handler: F)
    where
        F: Fn(SignalEnvelope) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    /// Broadcast an envelope to the other participants of the room.
    pub fn send(&self, kind: SignalKind, payload: serde_json::Value) -> Result<(), AppError> {
        if self.dispatch.is_none() {
            return Err(AppError::Signaling(
                "channel has already been left".to_string(),
            ));
        }

        let envelope = SignalEnvelope {
            room_id: self.room_id.clone(),
            sender_id: self.user_id.clone(),
            event: kind.as_str().to_string(),
            payload,
        };

        self.tx
            .send(envelope)
            .map(|_| ())
            .map_err(|_| AppError::Signaling("room bus is closed".to_string()))
    }

    /// Unsubscribe and release the channel. Idempotent: the second call
    /// is a no-op.
    pub fn leave(&mut self) {
        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
            self.handlers.clear();
            self.registry.release(&self.room_id);
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn collector(
        channel: &SignalingChannel,
        kind: SignalKind,
    ) -> mpsc::UnboundedReceiver<SignalEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        channel.on(kind, move |envelope| {
            let _ = tx.send(envelope);
        });
        rx
    }

    async fn recv(
        rx: &mut mpsc::UnboundedReceiver<SignalEnvelope>,
    ) -> SignalEnvelope {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for signal")
            .expect("collector closed")
    }

    #[tokio::test]
    async fn test_offer_answer_round_trip() {
        let registry = Arc::new(RoomRegistry::new());
        let a = SignalingChannel::join(registry.clone(), "room-1", "alice").unwrap();
        let b = SignalingChannel::join(registry.clone(), "room-1", "bob").unwrap();

        let mut b_offers = collector(&b, SignalKind::Offer);
        let mut a_answers = collector(&a, SignalKind::Answer);

        let offer = json!({"type": "offer", "sdp": "v=0 alice"});
        a.send(SignalKind::Offer, offer.clone()).unwrap();

        let received = recv(&mut b_offers).await;
        assert_eq!(received.sender_id, "alice");
        assert_eq!(received.payload, offer);

        let answer = json!({"type": "answer", "sdp": "v=0 bob"});
        b.send(SignalKind::Answer, answer.clone()).unwrap();

        let received = recv(&mut a_answers).await;
        assert_eq!(received.sender_id, "bob");
        assert_eq!(received.payload, answer);

        // exactly once: nothing else arrives
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a_answers.try_recv().is_err());
        assert!(b_offers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sender_does_not_hear_itself() {
        let registry = Arc::new(RoomRegistry::new());
        let a = SignalingChannel::join(registry.clone(), "room-1", "alice").unwrap();
        let _b = SignalingChannel::join(registry.clone(), "room-1", "bob").unwrap();

        let mut a_offers = collector(&a, SignalKind::Offer);
        a.send(SignalKind::Offer, json!({"sdp": "x"})).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a_offers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_replay_for_late_joiners() {
        let registry = Arc::new(RoomRegistry::new());
        let a = SignalingChannel::join(registry.clone(), "room-1", "alice").unwrap();

        a.send(SignalKind::Offer, json!({"sdp": "early"})).unwrap();

        // bob joins after the send and must never see it
        let b = SignalingChannel::join(registry.clone(), "room-1", "bob").unwrap();
        let mut b_offers = collector(&b, SignalKind::Offer);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(b_offers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_per_sender_ordering() {
        let registry = Arc::new(RoomRegistry::new());
        let a = SignalingChannel::join(registry.clone(), "room-1", "alice").unwrap();
        let b = SignalingChannel::join(registry.clone(), "room-1", "bob").unwrap();

        let mut candidates = collector(&b, SignalKind::IceCandidate);

        for i in 0..5 {
            a.send(SignalKind::IceCandidate, json!({"index": i})).unwrap();
        }

        for i in 0..5 {
            let envelope = recv(&mut candidates).await;
            assert_eq!(envelope.payload["index"], i);
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_ignored() {
        let registry = Arc::new(RoomRegistry::new());
        let a = SignalingChannel::join(registry.clone(), "room-1", "alice").unwrap();

        let mut offers = collector(&a, SignalKind::Offer);

        // a foreign client broadcasts an event name this build does not
        // know; receivers must drop it silently
        registry
            .bus("room-1")
            .send(SignalEnvelope {
                room_id: "room-1".to_string(),
                sender_id: "bob".to_string(),
                event: "chat".to_string(),
                payload: json!({"text": "hi"}),
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(offers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let registry = Arc::new(RoomRegistry::new());
        let mut a = SignalingChannel::join(registry.clone(), "room-1", "alice").unwrap();

        a.leave();
        // second call is a no-op, not a panic
        a.leave();

        let err = a.send(SignalKind::Offer, json!({})).unwrap_err();
        assert!(matches!(err, AppError::Signaling(_)));
    }

    #[tokio::test]
    async fn test_invalid_room_id_rejected() {
        let registry = Arc::new(RoomRegistry::new());
        let err = SignalingChannel::join(registry, "bad room!", "alice").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
