// ============================
// crates/backend-lib/src/media.rs
// ============================
//! Media capture and peer-connection seams.
//!
//! The session coordinator drives capture devices and the peer
//! connection through these traits; the concrete implementations wrap
//! the platform's native media stack and are supplied by the embedding
//! application.
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One local capture track. Mute/camera toggles flip `enabled` in
/// place; `stop` releases the underlying device and is idempotent.
#[derive(Debug)]
pub struct MediaTrack {
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        MediaTrack {
            kind,
            label: label.into(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Release the device behind this track. Returns whether this call
    /// performed the release (false when already stopped).
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A set of tracks captured together.
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<Arc<MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<MediaTrack>>) -> Self {
        MediaStream { tracks }
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.tracks.iter().filter(move |track| track.kind() == kind)
    }

    /// Stop every track in the stream.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Capture devices of the participant's machine.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire audio+video capture. Denial or absence of a device is a
    /// `MediaAccess` error; the session treats it as fatal.
    async fn capture_user_media(&self) -> Result<MediaStream, AppError>;

    /// Acquire a display-capture stream for screen sharing.
    async fn capture_display(&self) -> Result<MediaStream, AppError>;
}

/// Offer/answer/ICE surface of one peer connection. Exclusively owned
/// by a single session coordinator until closed.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<serde_json::Value, AppError>;
    async fn create_answer(&self) -> Result<serde_json::Value, AppError>;
    async fn set_local_description(&self, sdp: serde_json::Value) -> Result<(), AppError>;
    async fn set_remote_description(&self, sdp: serde_json::Value) -> Result<(), AppError>;
    /// Apply a remote candidate as it arrives; candidates are additive
    /// and applied in per-sender arrival order.
    async fn add_ice_candidate(&self, candidate: serde_json::Value) -> Result<(), AppError>;
    async fn add_track(&self, track: Arc<MediaTrack>) -> Result<(), AppError>;
    async fn close(&self);
}

/// Factory creating peer connections configured with the given STUN
/// servers.
pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, ice_servers: &[String]) -> Result<Arc<dyn PeerConnection>, AppError>;
}
