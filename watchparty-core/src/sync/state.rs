//! Room State Management
//!
//! What a viewer knows about the session it is in. Playback itself is owned
//! by the [`ReconciliationEngine`](super::ReconciliationEngine).

use std::collections::HashSet;
use std::time::Instant;

use super::protocol::{ParticipantId, SessionId};

/// Current state of the session we are in
#[derive(Debug, Clone)]
pub struct RoomState {
    /// Session we joined
    pub session_id: SessionId,
    /// Our participant ID (assigned by the coordinator)
    pub local_participant_id: ParticipantId,
    /// Video everyone is watching
    pub video_url: String,
    /// All participants including ourselves
    pub participants: HashSet<ParticipantId>,
}

impl RoomState {
    pub fn new(
        session_id: SessionId,
        local_participant_id: ParticipantId,
        video_url: String,
        participants: impl IntoIterator<Item = ParticipantId>,
    ) -> Self {
        let mut participants: HashSet<ParticipantId> = participants.into_iter().collect();
        // The join snapshot may race a concurrent leave; we are in regardless
        participants.insert(local_participant_id.clone());

        Self {
            session_id,
            local_participant_id,
            video_url,
            participants,
        }
    }

    /// Participants sorted by ID, ourselves first
    pub fn participant_list(&self) -> Vec<&ParticipantId> {
        let mut list: Vec<&ParticipantId> = self.participants.iter().collect();
        list.sort_by(|a, b| {
            match (*a == &self.local_participant_id, *b == &self.local_participant_id) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => a.cmp(b),
            }
        });
        list
    }

    /// Replace the membership with a snapshot from the coordinator
    pub fn set_participants(&mut self, participants: impl IntoIterator<Item = ParticipantId>) {
        self.participants = participants.into_iter().collect();
        self.participants.insert(self.local_participant_id.clone());
    }

    /// Add a participant
    pub fn add_participant(&mut self, participant_id: ParticipantId) -> bool {
        self.participants.insert(participant_id)
    }

    /// Remove a participant
    pub fn remove_participant(&mut self, participant_id: &str) -> bool {
        self.participants.remove(participant_id)
    }
}

/// Represents the session we're in (or not)
#[derive(Debug, Default)]
pub enum Room {
    /// Not in any session
    #[default]
    None,
    /// Join request sent, waiting for the coordinator to answer
    Joining {
        session_id: SessionId,
        request_id: u64,
        sent_at: Instant,
    },
    /// In an active session
    Active(RoomState),
}

impl Room {
    /// Check if we're in an active session
    pub fn is_active(&self) -> bool {
        matches!(self, Room::Active(_))
    }

    /// Check if we're joining or in a session
    pub fn is_busy(&self) -> bool {
        !matches!(self, Room::None)
    }

    /// Session we are joining or in
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Room::None => None,
            Room::Joining { session_id, .. } => Some(session_id),
            Room::Active(state) => Some(&state.session_id),
        }
    }

    /// Whether a join response with this request ID is the one we wait for
    pub fn is_awaiting(&self, id: u64) -> bool {
        matches!(self, Room::Joining { request_id, .. } if *request_id == id)
    }

    /// Get the active session state if we're in one
    pub fn state(&self) -> Option<&RoomState> {
        match self {
            Room::Active(state) => Some(state),
            _ => None,
        }
    }

    /// Get mutable reference to active session state
    pub fn state_mut(&mut self) -> Option<&mut RoomState> {
        match self {
            Room::Active(state) => Some(state),
            _ => None,
        }
    }

    /// Active state for `session_id`, ignoring messages about other sessions
    pub fn active_in(&mut self, session_id: &str) -> Option<&mut RoomState> {
        self.state_mut().filter(|s| s.session_id == session_id)
    }
}
