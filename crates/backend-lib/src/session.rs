// ============================
// crates/backend-lib/src/session.rs
// ============================
//! Per-participant session coordinator.
//!
//! Owns one participant's media session within a room: local capture,
//! peer-connection establishment, screen-share track swap, reaction
//! dispatch, teardown. The coordinator is driven from a single task;
//! signals arrive through [`next_signal`](SessionCoordinator::next_signal)
//! and user actions as method calls, so arbitrary interleavings at
//! suspension points resolve to a defined state. Everything after
//! `Ended` is silently discarded.
use campusmeet_common::{RoomId, SignalEnvelope, SignalKind, UserId};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::error::AppError;
use crate::media::{MediaSource, MediaStream, PeerConnection, PeerConnectionFactory, TrackKind};
use crate::signaling::{RoomRegistry, SignalingChannel};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Connected,
    ScreenSharing,
    Ended,
}

/// Transient reactions participants can flash at each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Hand,
    Heart,
    Like,
}

impl ReactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Hand => "hand",
            ReactionKind::Heart => "heart",
            ReactionKind::Like => "like",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hand" => Some(ReactionKind::Hand),
            "heart" => Some(ReactionKind::Heart),
            "like" => Some(ReactionKind::Like),
            _ => None,
        }
    }
}

/// Per-type reaction counters with independent decay.
///
/// Each application increments a counter and schedules exactly one
/// decrement after the decay window, so rapid repeats of the same type
/// accumulate and drain one by one rather than resetting to zero.
#[derive(Clone)]
pub struct ReactionBoard {
    counts: Arc<DashMap<ReactionKind, u32>>,
    decay: Duration,
}

impl ReactionBoard {
    pub fn new(decay: Duration) -> Self {
        ReactionBoard {
            counts: Arc::new(DashMap::new()),
            decay,
        }
    }

    /// Increment the counter for `kind` and schedule one decrement at
    /// `+decay`.
    pub fn apply(&self, kind: ReactionKind) {
        *self.counts.entry(kind).or_insert(0) += 1;

        let counts = Arc::clone(&self.counts);
        let decay = self.decay;
        tokio::spawn(async move {
            tokio::time::sleep(decay).await;
            if let Some(mut count) = counts.get_mut(&kind) {
                *count = count.saturating_sub(1);
            }
        });
    }

    pub fn count(&self, kind: ReactionKind) -> u32 {
        self.counts.get(&kind).map(|count| *count).unwrap_or(0)
    }
}

/// Session-level knobs, lifted from [`Settings`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ice_servers: Vec<String>,
    pub reaction_decay: Duration,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        SessionConfig {
            ice_servers: settings.stun_servers.clone(),
            reaction_decay: Duration::from_millis(settings.reaction_decay_ms),
        }
    }
}

/// Coordinator for one participant's session in one room.
pub struct SessionCoordinator {
    state: SessionState,
    room_id: RoomId,
    user_id: UserId,
    config: SessionConfig,
    media_source: Arc<dyn MediaSource>,
    peer_factory: Arc<dyn PeerConnectionFactory>,
    registry: Arc<RoomRegistry>,
    local: Option<MediaStream>,
    screen: Option<MediaStream>,
    peer: Option<Arc<dyn PeerConnection>>,
    channel: Option<SignalingChannel>,
    signals: Option<mpsc::UnboundedReceiver<SignalEnvelope>>,
    reactions: ReactionBoard,
}

impl SessionCoordinator {
    pub fn new(
        room_id: impl Into<RoomId>,
        user_id: impl Into<UserId>,
        media_source: Arc<dyn MediaSource>,
        peer_factory: Arc<dyn PeerConnectionFactory>,
        registry: Arc<RoomRegistry>,
        config: SessionConfig,
    ) -> Self {
        let reactions = ReactionBoard::new(config.reaction_decay);
        SessionCoordinator {
            state: SessionState::Idle,
            room_id: room_id.into(),
            user_id: user_id.into(),
            config,
            media_source,
            peer_factory,
            registry,
            local: None,
            screen: None,
            peer: None,
            channel: None,
            signals: None,
            reactions,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reaction_count(&self, kind: ReactionKind) -> u32 {
        self.reactions.count(kind)
    }

    /// Enter the meeting room: acquire capture, build the peer
    /// connection, subscribe to the room's signaling bus.
    ///
    /// Capture denial is fatal to this attempt and is not retried;
    /// signaling failure tears the session down. Either way the
    /// coordinator lands in a defined state.
    pub async fn join(&mut self) -> Result<(), AppError> {
        if self.state != SessionState::Idle {
            return Err(AppError::Signaling(format!(
                "cannot join from {:?}",
                self.state
            )));
        }
        self.state = SessionState::Initializing;

        let local = match self.media_source.capture_user_media().await {
            Ok(stream) => stream,
            Err(err) => {
                self.teardown().await;
                return Err(err);
            },
        };
        // a hang-up may have landed while capture was pending
        if self.state == SessionState::Ended {
            local.stop_all();
            return Ok(());
        }
        self.local = Some(local);

        if self.config.ice_servers.is_empty() {
            self.teardown().await;
            return Err(AppError::Signaling(
                "no STUN server configured".to_string(),
            ));
        }
        let peer = match self.peer_factory.create(&self.config.ice_servers) {
            Ok(peer) => peer,
            Err(err) => {
                self.teardown().await;
                return Err(err);
            },
        };

        let tracks: Vec<_> = self
            .local
            .as_ref()
            .map(|stream| stream.tracks().to_vec())
            .unwrap_or_default();
        for track in tracks {
            if let Err(err) = peer.add_track(track).await {
                self.peer = Some(peer);
                self.teardown().await;
                return Err(err);
            }
        }
        if self.state == SessionState::Ended {
            peer.close().await;
            return Ok(());
        }
        self.peer = Some(peer);

        let channel = match SignalingChannel::join(
            Arc::clone(&self.registry),
            self.room_id.clone(),
            self.user_id.clone(),
        ) {
            Ok(channel) => channel,
            Err(err) => {
                self.teardown().await;
                return Err(AppError::Signaling(err.to_string()));
            },
        };

        // forward every signal kind into the coordinator's queue; the
        // driving task hands them back through next_signal
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        for kind in [
            SignalKind::Offer,
            SignalKind::Answer,
            SignalKind::IceCandidate,
            SignalKind::Reaction,
        ] {
            let signal_tx = signal_tx.clone();
            channel.on(kind, move |envelope| {
                let _ = signal_tx.send(envelope);
            });
        }

        self.channel = Some(channel);
        self.signals = Some(signal_rx);

        // connected does not require a remote peer yet; the UI shows a
        // waiting indicator until remote tracks arrive
        self.state = SessionState::Connected;
        tracing::info!(room_id = %self.room_id, user_id = %self.user_id, "session connected");
        Ok(())
    }

    /// Next signaling envelope for this session, or `None` once ended.
    pub async fn next_signal(&mut self) -> Option<SignalEnvelope> {
        match self.signals.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Start a (re)negotiation: create an offer, set it locally, send
    /// it over the channel.
    pub async fn make_offer(&mut self) -> Result<(), AppError> {
        let Some(peer) = self.active_peer() else {
            return Ok(());
        };

        let offer = peer.create_offer().await?;
        // hang-up may have resolved while the offer was being created;
        // the torn-down connection must not be revived
        if self.state == SessionState::Ended {
            return Ok(());
        }
        peer.set_local_description(offer.clone()).await?;
        if self.state == SessionState::Ended {
            return Ok(());
        }

        self.send_signal(SignalKind::Offer, offer).await
    }

    /// Apply one incoming envelope. Anything arriving after `Ended` is
    /// discarded silently.
    pub async fn handle_signal(&mut self, envelope: SignalEnvelope) -> Result<(), AppError> {
        if self.state == SessionState::Ended {
            return Ok(());
        }
        let Some(kind) = SignalKind::parse(&envelope.event) else {
            return Ok(());
        };

        match kind {
            SignalKind::Offer => {
                let Some(peer) = self.active_peer() else {
                    return Ok(());
                };
                peer.set_remote_description(envelope.payload).await?;
                if self.state == SessionState::Ended {
                    return Ok(());
                }

                let answer = peer.create_answer().await?;
                if self.state == SessionState::Ended {
                    return Ok(());
                }
                peer.set_local_description(answer.clone()).await?;
                if self.state == SessionState::Ended {
                    return Ok(());
                }

                self.send_signal(SignalKind::Answer, answer).await?;
            },
            SignalKind::Answer => {
                let Some(peer) = self.active_peer() else {
                    return Ok(());
                };
                peer.set_remote_description(envelope.payload).await?;
            },
            SignalKind::IceCandidate => {
                let Some(peer) = self.active_peer() else {
                    return Ok(());
                };
                peer.add_ice_candidate(envelope.payload).await?;
            },
            SignalKind::Reaction => {
                if let Some(kind) = envelope
                    .payload
                    .get("type")
                    .and_then(|value| value.as_str())
                    .and_then(ReactionKind::parse)
                {
                    self.reactions.apply(kind);
                }
            },
        }

        Ok(())
    }

    /// Forward a locally gathered ICE candidate to the other
    /// participants. The peer-connection implementation calls this for
    /// every candidate it surfaces, as it surfaces it.
    pub async fn announce_ice_candidate(
        &mut self,
        candidate: serde_json::Value,
    ) -> Result<(), AppError> {
        if self.state == SessionState::Ended {
            return Ok(());
        }
        self.send_signal(SignalKind::IceCandidate, candidate).await
    }

    /// Broadcast a reaction and apply the local effect optimistically.
    pub async fn send_reaction(&mut self, kind: ReactionKind) -> Result<(), AppError> {
        if self.state == SessionState::Ended {
            return Ok(());
        }

        self.send_signal(SignalKind::Reaction, json!({ "type": kind.as_str() }))
            .await?;
        self.reactions.apply(kind);
        Ok(())
    }

    /// Flip the enabled flag of the local audio tracks in place. No
    /// track removal, no renegotiation. Returns the new enabled state.
    pub fn toggle_audio(&mut self) -> bool {
        Self::toggle_tracks(self.local.as_ref(), TrackKind::Audio)
    }

    /// Flip the enabled flag of the local video tracks in place.
    pub fn toggle_video(&mut self) -> bool {
        Self::toggle_tracks(self.local.as_ref(), TrackKind::Video)
    }

    fn toggle_tracks(stream: Option<&MediaStream>, kind: TrackKind) -> bool {
        let Some(stream) = stream else {
            return false;
        };
        let enabled = stream
            .tracks_of(kind)
            .next()
            .map(|track| track.is_enabled())
            .unwrap_or(false);

        for track in stream.tracks_of(kind) {
            track.set_enabled(!enabled);
        }
        !enabled
    }

    /// Toggle screen sharing on or off.
    pub async fn toggle_screen_share(&mut self) -> Result<(), AppError> {
        match self.state {
            SessionState::Connected => self.start_screen_share().await,
            SessionState::ScreenSharing => {
                self.stop_screen_share();
                Ok(())
            },
            _ => Ok(()),
        }
    }

    async fn start_screen_share(&mut self) -> Result<(), AppError> {
        let screen = self.media_source.capture_display().await?;
        if self.state == SessionState::Ended {
            screen.stop_all();
            return Ok(());
        }

        if let Some(peer) = self.active_peer() {
            for track in screen.tracks() {
                peer.add_track(Arc::clone(track)).await?;
            }
        }
        if self.state == SessionState::Ended {
            screen.stop_all();
            return Ok(());
        }

        self.screen = Some(screen);
        self.state = SessionState::ScreenSharing;

        // adding the track renegotiates the session
        self.make_offer().await
    }

    /// Tear down screen sharing. Both the explicit toggle and the
    /// platform's "user stopped sharing" signal drive this same path.
    pub fn stop_screen_share(&mut self) {
        if let Some(screen) = self.screen.take() {
            screen.stop_all();
        }
        if self.state == SessionState::ScreenSharing {
            self.state = SessionState::Connected;
        }
    }

    /// The platform noticed the user ended the capture from the outside.
    pub fn on_display_capture_ended(&mut self) {
        self.stop_screen_share();
    }

    /// End the session: release tracks, close the peer connection,
    /// leave the signaling channel. Reachable from every state and
    /// idempotent; the second call is a no-op.
    pub async fn hang_up(&mut self) {
        if self.state == SessionState::Ended {
            return;
        }
        self.teardown().await;
        tracing::info!(room_id = %self.room_id, user_id = %self.user_id, "session ended");
    }

    async fn teardown(&mut self) {
        self.state = SessionState::Ended;

        if let Some(local) = self.local.take() {
            local.stop_all();
        }
        if let Some(screen) = self.screen.take() {
            screen.stop_all();
        }
        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
        if let Some(mut channel) = self.channel.take() {
            channel.leave();
        }
        self.signals = None;
    }

    fn active_peer(&self) -> Option<Arc<dyn PeerConnection>> {
        if self.state == SessionState::Ended {
            return None;
        }
        self.peer.clone()
    }

    async fn send_signal(
        &mut self,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> Result<(), AppError> {
        let result = match &self.channel {
            Some(channel) => channel.send(kind, payload),
            None => Err(AppError::Signaling("no signaling channel".to_string())),
        };

        // a failed send means the room is unreachable; end the session
        // rather than retrying in a loop
        if let Err(err) = result {
            tracing::warn!(room_id = %self.room_id, error = %err, "signaling send failed");
            self.teardown().await;
            return Err(err);
        }
        Ok(())
    }
}
