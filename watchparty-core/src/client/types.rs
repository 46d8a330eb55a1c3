//! Client-facing types

use std::time::Duration;

use crate::network::{NetworkConfig, NetworkError};
use crate::sync::{PlaybackPhase, RoomState};

/// Errors returned by [`WatchSession`](super::WatchSession)
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not connected to the coordinator")]
    NotConnected,

    #[error("Not in a session")]
    NotInSession,

    #[error("Already in a session")]
    AlreadyInSession,

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    /// Give up on a join that got no answer after this long
    pub join_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// Callback interface for session events
pub trait SessionCallback: Send + Sync {
    fn on_connected(&self, participant_id: String);
    fn on_joined(&self, state: RoomState);
    fn on_room_state_changed(&self, state: RoomState);
    fn on_playback_changed(&self, phase: PlaybackPhase);
    fn on_participant_joined(&self, participant_id: String);
    fn on_participant_left(&self, participant_id: String);
    fn on_error(&self, message: String);
    fn on_disconnected(&self);
}
