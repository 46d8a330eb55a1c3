//! Connection Lifecycle Handler
//!
//! Binds connections to participant IDs and turns their requests into
//! registry updates and broadcasts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::sync::{
    ClientMessage, ControlEvent, ControlKind, ControlRequest, JoinState, ParticipantId,
    ServerMessage,
};

use super::broadcast::{BroadcastRouter, DeliveryReport};
use super::error::CoordinatorError;
use super::event_log::{self, Playhead};
use super::registry::{SessionRegistry, SessionSnapshot};

/// Characters used in participant IDs
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Participant ID length
const ID_LENGTH: usize = 12;

/// What happens when a viewer joins a session nobody created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// Reject with `not_found`
    #[default]
    RequireExisting,
    /// Create it on the fly, with no video and an END event so nobody
    /// starts mid-way
    AutoCreate,
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub join_policy: JoinPolicy,
    /// Control events kept per session for inspection (0 = last event only)
    pub history_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            join_policy: JoinPolicy::RequireExisting,
            history_limit: 100,
        }
    }
}

/// A freshly bound connection
#[derive(Debug)]
pub struct Connection {
    pub participant_id: ParticipantId,
    /// Everything the coordinator wants delivered on this connection
    pub receiver: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub state: JoinState,
    pub participants: Vec<ParticipantId>,
}

/// The synchronized playback coordinator
pub struct Coordinator {
    registry: SessionRegistry,
    router: BroadcastRouter,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    delivery_failures: AtomicU64,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: SessionRegistry::new(config.history_limit),
            router: BroadcastRouter::new(),
            clock,
            config,
            delivery_failures: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // === Sessions ===

    pub fn create_session(&self, id: &str, video_url: &str) -> Result<(), CoordinatorError> {
        self.registry.create(id, video_url, self.now_ms()).map(|_| ())
    }

    pub fn get_session(&self, id: &str) -> Result<SessionSnapshot, CoordinatorError> {
        let session = self.registry.require(id)?;
        let snapshot = session.lock().snapshot();
        Ok(snapshot)
    }

    /// Mark a session as over. Members stay bound; late joiners start paused at 0.
    pub fn end_session(&self, id: &str) -> Result<ControlEvent, CoordinatorError> {
        let event = self.record_event(id, &ControlRequest::end())?;
        info!("Ended session {}", id);
        Ok(event)
    }

    /// Whether `participant_id` is currently joined to `session_id`
    pub fn is_member(&self, session_id: &str, participant_id: &str) -> bool {
        self.registry
            .get(session_id)
            .is_some_and(|session| session.lock().members.contains(participant_id))
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.registry.session_ids()
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn connection_count(&self) -> usize {
        self.router.connection_count()
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    // === Event log ===

    /// Validate and store a control event as the session's newest
    pub fn record_event(
        &self,
        session_id: &str,
        request: &ControlRequest,
    ) -> Result<ControlEvent, CoordinatorError> {
        let session = self.registry.require(session_id)?;
        let mut session = session.lock();
        let event = event_log::validate(request, self.now_ms())?;
        session.events.record(event);
        drop(session);
        debug!(
            "Recorded {} at {:.3}s in session {}",
            event.kind, event.progress, session_id
        );
        Ok(event)
    }

    pub fn last_event(&self, session_id: &str) -> Result<Option<ControlEvent>, CoordinatorError> {
        let session = self.registry.require(session_id)?;
        let last = session.lock().events.last().copied();
        Ok(last)
    }

    pub fn history(&self, session_id: &str) -> Result<Vec<ControlEvent>, CoordinatorError> {
        let session = self.registry.require(session_id)?;
        let history = session.lock().events.history();
        Ok(history)
    }

    /// Where a viewer joining `session_id` right now should be
    pub fn compute_join_state(&self, session_id: &str) -> Result<JoinState, CoordinatorError> {
        self.compute_join_state_at(session_id, self.now_ms())
    }

    pub fn compute_join_state_at(
        &self,
        session_id: &str,
        now_ms: u64,
    ) -> Result<JoinState, CoordinatorError> {
        let session = self.registry.require(session_id)?;
        let session = session.lock();
        let Playhead {
            progress,
            is_playing,
        } = session.playhead(now_ms);
        Ok(JoinState {
            video_url: session.video_url.clone(),
            progress,
            is_playing,
        })
    }

    // === Connections ===

    /// Bind a new connection to a fresh participant ID
    pub fn connect(&self) -> Connection {
        let participant_id = loop {
            let candidate = random_participant_id();
            if !self.router.is_registered(&candidate) {
                break candidate;
            }
        };
        let receiver = self.router.register(&participant_id);
        info!("Participant {} connected", participant_id);
        Connection {
            participant_id,
            receiver,
        }
    }

    /// Add a participant to a session and announce it to everyone else
    pub fn join(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let now = self.now_ms();
        let session = match self.config.join_policy {
            JoinPolicy::RequireExisting => self.registry.require(session_id)?,
            JoinPolicy::AutoCreate => self.registry.get_or_create_with(session_id, now, |s| {
                s.events.record(ControlEvent {
                    kind: ControlKind::End,
                    progress: 0.0,
                    observed_at: now,
                });
            })?,
        };

        let outcome = {
            let mut session = session.lock();
            let newly_added = session.members.insert(participant_id);
            let playhead = session.playhead(self.now_ms());
            let outcome = JoinOutcome {
                state: JoinState {
                    video_url: session.video_url.clone(),
                    progress: playhead.progress,
                    is_playing: playhead.is_playing,
                },
                participants: session.members.snapshot(),
            };

            if newly_added {
                let message = ServerMessage::UserJoined {
                    session_id: session_id.to_string(),
                    participant_id: participant_id.to_string(),
                    participants: outcome.participants.clone(),
                };
                // The joiner gets the snapshot in its join response instead
                self.fan_out(&outcome.participants, &message, Some(participant_id));
            }
            outcome
        };

        info!(
            "Participant {} joined session {} ({} members, progress {:.3}s, playing: {})",
            participant_id,
            session_id,
            outcome.participants.len(),
            outcome.state.progress,
            outcome.state.is_playing
        );

        Ok(outcome)
    }

    /// Remove a participant from a session. `None` if it was not a member.
    pub fn leave(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Option<Vec<ParticipantId>>, CoordinatorError> {
        let session = self.registry.require(session_id)?;
        let remaining = {
            let mut session = session.lock();
            if !session.members.remove(participant_id) {
                return Ok(None);
            }
            let remaining = session.members.snapshot();
            self.announce_left(session_id, participant_id, &remaining);
            remaining
        };

        info!(
            "Participant {} left session {} ({} remaining)",
            participant_id,
            session_id,
            remaining.len()
        );
        Ok(Some(remaining))
    }

    /// Record a control event and relay it to every other member.
    ///
    /// Recording and fan-out happen under the session lock, so peers receive
    /// controls in the order they were recorded and the last one they see is
    /// the session's last event.
    pub fn control(
        &self,
        session_id: &str,
        participant_id: &str,
        request: &ControlRequest,
    ) -> Result<ControlEvent, CoordinatorError> {
        let session = self.registry.require(session_id)?;
        let mut session = session.lock();
        let event = event_log::validate(request, self.now_ms())?;
        session.events.record(event);

        let message = ServerMessage::VideoControl {
            session_id: session_id.to_string(),
            origin: participant_id.to_string(),
            event: event.request(),
        };
        let members = session.members.snapshot();
        let report = self.fan_out(&members, &message, Some(participant_id));
        drop(session);

        debug!(
            "Relayed {} at {:.3}s from {} to {} peers in session {}",
            event.kind, event.progress, participant_id, report.delivered, session_id
        );
        Ok(event)
    }

    /// Connection dropped: leave every session it was in.
    ///
    /// Returns the sessions the participant was removed from.
    pub fn disconnect(&self, participant_id: &str) -> Vec<String> {
        let mut left = Vec::new();

        for session in self.registry.all() {
            let removed = {
                let mut session = session.lock();
                if session.members.remove(participant_id) {
                    let remaining = session.members.snapshot();
                    self.announce_left(&session.id, participant_id, &remaining);
                    Some(session.id.clone())
                } else {
                    None
                }
            };
            if let Some(session_id) = removed {
                left.push(session_id);
            }
        }

        self.router.unregister(participant_id);
        left.sort();
        info!(
            "Participant {} disconnected (removed from {} sessions)",
            participant_id,
            left.len()
        );
        left
    }

    /// Handle one inbound message from a connection.
    ///
    /// Returns the direct response, if the message has one. Fire-and-forget
    /// messages never produce a response, even when they fail.
    pub fn handle_message(&self, participant_id: &str, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Join {
                request_id,
                session_id,
            } => match self.join(&session_id, participant_id) {
                Ok(outcome) => Some(ServerMessage::JoinAccepted {
                    request_id,
                    session_id,
                    video_url: outcome.state.video_url,
                    progress: outcome.state.progress,
                    is_playing: outcome.state.is_playing,
                    participants: outcome.participants,
                }),
                Err(e) => {
                    warn!("Join of {} to {} rejected: {}", participant_id, session_id, e);
                    Some(ServerMessage::JoinRejected {
                        request_id,
                        session_id,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    })
                }
            },

            ClientMessage::Leave { session_id } => {
                match self.leave(&session_id, participant_id) {
                    Ok(Some(_)) => {}
                    Ok(None) => debug!(
                        "Leave from {} ignored: not a member of {}",
                        participant_id, session_id
                    ),
                    Err(e) => warn!("Leave from {} failed: {}", participant_id, e),
                }
                None
            }

            ClientMessage::Control { session_id, event } => {
                if let Err(e) = self.control(&session_id, participant_id, &event) {
                    warn!("Control from {} dropped: {}", participant_id, e);
                }
                None
            }
        }
    }

    fn announce_left(&self, session_id: &str, participant_id: &str, remaining: &[ParticipantId]) {
        let message = ServerMessage::UserLeft {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            participants: remaining.to_vec(),
        };
        self.fan_out(remaining, &message, None);
    }

    fn fan_out(
        &self,
        recipients: &[ParticipantId],
        message: &ServerMessage,
        exclude: Option<&str>,
    ) -> DeliveryReport {
        let report = self.router.broadcast(recipients, message, exclude);
        if !report.failed.is_empty() {
            self.delivery_failures
                .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
        }
        report
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

fn random_participant_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
