//! Sync Protocol Messages
//!
//! Everything exchanged over the real-time channel between viewers and the
//! coordinator. Progress is always absolute seconds into the video.

use serde::{Deserialize, Serialize};

/// Externally supplied session identifier
pub type SessionId = String;

/// Connection-scoped participant identifier assigned by the coordinator
pub type ParticipantId = String;

/// Kind of a playback control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlKind {
    Play,
    Pause,
    /// Not playing, back at the start of the content
    End,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Play => "PLAY",
            ControlKind::Pause => "PAUSE",
            ControlKind::End => "END",
        }
    }

    /// Whether a viewer applying this kind should end up playing
    pub fn is_playing(&self) -> bool {
        matches!(self, ControlKind::Play)
    }
}

impl std::fmt::Display for ControlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control action as a viewer sends it. The coordinator stamps the time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub kind: ControlKind,
    /// Playback offset in seconds
    pub progress: f64,
}

impl ControlRequest {
    pub fn play(progress: f64) -> Self {
        Self { kind: ControlKind::Play, progress }
    }

    pub fn pause(progress: f64) -> Self {
        Self { kind: ControlKind::Pause, progress }
    }

    pub fn end() -> Self {
        Self { kind: ControlKind::End, progress: 0.0 }
    }
}

/// A control event as recorded by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvent {
    pub kind: ControlKind,
    /// Playback offset in seconds
    pub progress: f64,
    /// Coordinator wall clock on arrival, milliseconds since UNIX epoch
    pub observed_at: u64,
}

impl ControlEvent {
    /// The wire form of this event, without its timestamp
    pub fn request(&self) -> ControlRequest {
        ControlRequest {
            kind: self.kind,
            progress: self.progress,
        }
    }
}

/// What a viewer needs to line its player up with the rest of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinState {
    pub video_url: String,
    pub progress: f64,
    pub is_playing: bool,
}

/// Messages sent from a viewer to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a session; answered with `JoinAccepted` or `JoinRejected`
    Join {
        request_id: u64,
        session_id: SessionId,
    },

    /// Leave a session (no response)
    Leave { session_id: SessionId },

    /// Play/pause/seek/end performed locally (fire-and-forget)
    Control {
        session_id: SessionId,
        event: ControlRequest,
    },
}

/// Messages sent from the coordinator to a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection
    Welcome {
        participant_id: ParticipantId,
        version: String,
    },

    /// Successful join, carrying the reconciled playback state
    JoinAccepted {
        request_id: u64,
        session_id: SessionId,
        video_url: String,
        progress: f64,
        is_playing: bool,
        participants: Vec<ParticipantId>,
    },

    /// Failed join
    JoinRejected {
        request_id: u64,
        session_id: SessionId,
        code: String,
        message: String,
    },

    /// A peer's control action
    VideoControl {
        session_id: SessionId,
        origin: ParticipantId,
        event: ControlRequest,
    },

    /// Someone joined; `participants` is the post-join snapshot
    UserJoined {
        session_id: SessionId,
        participant_id: ParticipantId,
        participants: Vec<ParticipantId>,
    },

    /// Someone left or disconnected; `participants` is what remains
    UserLeft {
        session_id: SessionId,
        participant_id: ParticipantId,
        participants: Vec<ParticipantId>,
    },
}

impl ServerMessage {
    /// The session this message is about, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Welcome { .. } => None,
            ServerMessage::JoinAccepted { session_id, .. }
            | ServerMessage::JoinRejected { session_id, .. }
            | ServerMessage::VideoControl { session_id, .. }
            | ServerMessage::UserJoined { session_id, .. }
            | ServerMessage::UserLeft { session_id, .. } => Some(session_id),
        }
    }

    /// The join state carried by a `JoinAccepted`
    pub fn join_state(&self) -> Option<JoinState> {
        match self {
            ServerMessage::JoinAccepted {
                video_url,
                progress,
                is_playing,
                ..
            } => Some(JoinState {
                video_url: video_url.clone(),
                progress: *progress,
                is_playing: *is_playing,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_wire_format() {
        let msg = ClientMessage::Control {
            session_id: "s1".to_string(),
            event: ControlRequest::play(10.5),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "control");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["event"]["kind"], "PLAY");
        assert_eq!(json["event"]["progress"], 10.5);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let raw = r#"{"type":"control","session_id":"s1","event":{"kind":"REWIND","progress":1.0}}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn test_join_accepted_parses() {
        let raw = r#"{"type":"join_accepted","request_id":7,"session_id":"s1","video_url":"v","progress":15.0,"is_playing":true,"participants":["a","b"]}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.session_id(), Some("s1"));
        assert_eq!(
            msg.join_state(),
            Some(JoinState {
                video_url: "v".to_string(),
                progress: 15.0,
                is_playing: true,
            })
        );
    }

    #[test]
    fn test_control_event_uses_camel_case() {
        let event = ControlEvent {
            kind: ControlKind::Pause,
            progress: 3.0,
            observed_at: 1_000,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["observedAt"], 1_000);
        assert_eq!(json["kind"], "PAUSE");
    }
}
