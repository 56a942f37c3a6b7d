// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the `CampusMeet` meeting
//! coordination server.

pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod media;
pub mod permissions;
pub mod scheduler;
pub mod session;
pub mod signaling;
pub mod store;
pub mod validation;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::directory::MeetingDirectory;
use crate::mail::{HttpMailSender, MailSender, NoopMailSender};
use crate::signaling::RoomRegistry;
use crate::store::MeetingStore;

/// Application state shared across all handlers
pub struct AppState<S> {
    /// Meeting directory over the row store
    pub directory: MeetingDirectory<S>,
    /// Live signaling room registry
    pub rooms: Arc<RoomRegistry>,
    /// Settings
    pub settings: Arc<Settings>,
    /// Outbound invitation mail
    pub mailer: Arc<dyn MailSender>,
}

impl<S: MeetingStore> AppState<S> {
    /// Create a new application state
    pub fn new(store: S, settings: Settings) -> Self {
        let mailer: Arc<dyn MailSender> = match &settings.mail.endpoint {
            Some(endpoint) => Arc::new(HttpMailSender::new(endpoint.clone())),
            None => Arc::new(NoopMailSender),
        };

        Self {
            directory: MeetingDirectory::new(store),
            rooms: Arc::new(RoomRegistry::new()),
            settings: Arc::new(settings),
            mailer,
        }
    }
}
