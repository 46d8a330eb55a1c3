//! Session Registry and Membership Tracker
//!
//! The registry map is only locked to look up or insert a session. Each
//! session carries its own lock, so work on one session never waits on
//! another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::sync::{ControlEvent, ParticipantId, SessionId};

use super::error::CoordinatorError;
use super::event_log::{EventLog, Playhead};

/// Participants currently joined to a session
#[derive(Debug, Clone, Default)]
pub struct Membership {
    participants: HashSet<ParticipantId>,
}

impl Membership {
    /// Add a participant. Returns false if it was already a member.
    pub fn insert(&mut self, participant_id: &str) -> bool {
        self.participants.insert(participant_id.to_string())
    }

    /// Remove a participant. Returns false if it was not a member.
    pub fn remove(&mut self, participant_id: &str) -> bool {
        self.participants.remove(participant_id)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.participants.contains(participant_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Sorted copy of the member IDs
    pub fn snapshot(&self) -> Vec<ParticipantId> {
        let mut list: Vec<ParticipantId> = self.participants.iter().cloned().collect();
        list.sort();
        list
    }
}

/// State of one watch party
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub video_url: String,
    pub created_at: u64,
    pub members: Membership,
    pub events: EventLog,
}

impl Session {
    pub fn new(id: SessionId, video_url: String, created_at: u64, history_limit: usize) -> Self {
        Self {
            id,
            video_url,
            created_at,
            members: Membership::default(),
            events: EventLog::new(history_limit),
        }
    }

    pub fn playhead(&self, now_ms: u64) -> Playhead {
        self.events.playhead(now_ms)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            video_url: self.video_url.clone(),
            created_at: self.created_at,
            participants: self.members.snapshot(),
            last_event: self.events.last().copied(),
        }
    }
}

/// Read-only copy of a session, safe to hand out without holding its lock
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub video_url: String,
    pub created_at: u64,
    pub participants: Vec<ParticipantId>,
    pub last_event: Option<ControlEvent>,
}

pub type SharedSession = Arc<Mutex<Session>>;

/// All live sessions, keyed by ID
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
    history_limit: usize,
}

impl SessionRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    /// Create a session. Fails if the ID is already taken.
    pub fn create(
        &self,
        id: &str,
        video_url: &str,
        now_ms: u64,
    ) -> Result<SharedSession, CoordinatorError> {
        if id.trim().is_empty() {
            return Err(CoordinatorError::InvalidSession(
                "session id must not be empty".to_string(),
            ));
        }

        let mut sessions = self.sessions.write();
        if sessions.contains_key(id) {
            return Err(CoordinatorError::AlreadyExists(id.to_string()));
        }

        let session = Arc::new(Mutex::new(Session::new(
            id.to_string(),
            video_url.to_string(),
            now_ms,
            self.history_limit,
        )));
        sessions.insert(id.to_string(), Arc::clone(&session));
        info!("Created session {} ({})", id, video_url);
        Ok(session)
    }

    /// Look up a session, or create it with `init` if missing
    pub fn get_or_create_with(
        &self,
        id: &str,
        now_ms: u64,
        init: impl FnOnce(&mut Session),
    ) -> Result<SharedSession, CoordinatorError> {
        if let Some(session) = self.get(id) {
            return Ok(session);
        }
        match self.create(id, "", now_ms) {
            Ok(session) => {
                init(&mut session.lock());
                Ok(session)
            }
            // Lost a race with another creator
            Err(CoordinatorError::AlreadyExists(_)) => self
                .get(id)
                .ok_or_else(|| CoordinatorError::NotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.read().get(id).cloned()
    }

    /// Like [`get`](Self::get), but an unknown ID is an error
    pub fn require(&self, id: &str) -> Result<SharedSession, CoordinatorError> {
        self.get(id)
            .ok_or_else(|| CoordinatorError::NotFound(id.to_string()))
    }

    /// All sessions, for operations that must visit every one of them
    pub fn all(&self) -> Vec<SharedSession> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::new(0);
        registry.create("s1", "https://example.com/v.mp4", 10).unwrap();

        let session = registry.get("s1").unwrap();
        let snapshot = session.lock().snapshot();
        assert_eq!(snapshot.video_url, "https://example.com/v.mp4");
        assert_eq!(snapshot.created_at, 10);
        assert!(snapshot.participants.is_empty());
        assert!(snapshot.last_event.is_none());
    }

    #[test]
    fn test_duplicate_create_fails() {
        let registry = SessionRegistry::new(0);
        registry.create("s1", "a", 0).unwrap();

        let err = registry.create("s1", "b", 0).unwrap_err();
        assert_eq!(err, CoordinatorError::AlreadyExists("s1".to_string()));
        // The original session is untouched
        assert_eq!(registry.get("s1").unwrap().lock().video_url, "a");
    }

    #[test]
    fn test_empty_id_rejected() {
        let registry = SessionRegistry::new(0);
        assert!(matches!(
            registry.create("  ", "v", 0),
            Err(CoordinatorError::InvalidSession(_))
        ));
    }

    #[test]
    fn test_require_unknown_is_not_found() {
        let registry = SessionRegistry::new(0);
        assert_eq!(
            registry.require("nope").unwrap_err(),
            CoordinatorError::NotFound("nope".to_string())
        );
    }

    #[test]
    fn test_get_or_create_runs_init_once() {
        let registry = SessionRegistry::new(0);
        let mut calls = 0;
        registry
            .get_or_create_with("s1", 0, |s| {
                calls += 1;
                s.video_url = "first".to_string();
            })
            .unwrap();
        registry
            .get_or_create_with("s1", 0, |s| {
                calls += 1;
                s.video_url = "second".to_string();
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(registry.get("s1").unwrap().lock().video_url, "first");
    }

    #[test]
    fn test_membership_is_idempotent() {
        let mut members = Membership::default();
        assert!(members.insert("b"));
        assert!(members.insert("a"));
        assert!(!members.insert("a"));
        assert_eq!(members.snapshot(), vec!["a", "b"]);

        assert!(members.remove("a"));
        assert!(!members.remove("a"));
        assert_eq!(members.len(), 1);
    }
}
