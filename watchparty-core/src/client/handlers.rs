//! Network event and server message handlers
//!
//! Nothing in here sends a control message. Remote state is applied to the
//! player only; outgoing controls come from local actions in `session.rs`.

use tracing::{debug, info, warn};

use crate::network::NetworkEvent;
use crate::sync::{EnginePhase, JoinState, Room, RoomState, ServerMessage};

use super::session::SessionContext;

/// Handle a network event
pub(super) fn handle_network_event(event: NetworkEvent, ctx: &SessionContext) {
    match event {
        NetworkEvent::Connected { participant_id } => {
            info!("Connected as {}", participant_id);
            *ctx.participant_id.write() = Some(participant_id.clone());
            ctx.notify(|cb| cb.on_connected(participant_id));
        }

        NetworkEvent::Message(message) => handle_server_message(message, ctx),

        NetworkEvent::Disconnected { reason } => {
            warn!(
                "Lost connection to coordinator: {}",
                reason.as_deref().unwrap_or("no reason given")
            );
            *ctx.room.write() = Room::None;
            ctx.engine.lock().reset();
            *ctx.network.write() = None;
            ctx.latency.write().clear_pending();
            ctx.notify(|cb| cb.on_disconnected());
        }

        NetworkEvent::Error(e) => {
            warn!("Network error: {}", e);
            ctx.notify(|cb| cb.on_error(e));
        }
    }
}

/// Handle a message from the coordinator
pub(super) fn handle_server_message(message: ServerMessage, ctx: &SessionContext) {
    match message {
        ServerMessage::Welcome { participant_id, .. } => {
            *ctx.participant_id.write() = Some(participant_id);
        }

        ServerMessage::JoinAccepted {
            request_id,
            session_id,
            video_url,
            progress,
            is_playing,
            participants,
        } => {
            let local_id = ctx.participant_id.read().clone().unwrap_or_default();
            let state = RoomState::new(session_id.clone(), local_id, video_url.clone(), participants);
            let join = JoinState {
                video_url,
                progress,
                is_playing,
            };

            // Held until Active is set, so a leave or join timeout landing in
            // between cannot be overwritten
            let phase = {
                let mut room = ctx.room.write();
                if !room.is_awaiting(request_id) {
                    debug!("Ignoring stale join response {}", request_id);
                    return;
                }

                let latency = {
                    let mut tracker = ctx.latency.write();
                    tracker.response_received(request_id);
                    tracker.one_way_latency()
                };

                let phase = {
                    let mut engine = ctx.engine.lock();
                    engine.apply_join(&join, latency);
                    engine.phase()
                };
                *room = Room::Active(state.clone());
                phase
            };

            info!(
                "Joined session {} with {} participants",
                session_id,
                state.participants.len()
            );
            ctx.notify(|cb| {
                cb.on_joined(state);
                if let EnginePhase::Joined(phase) = phase {
                    cb.on_playback_changed(phase);
                }
            });
        }

        ServerMessage::JoinRejected {
            request_id,
            session_id,
            code,
            message,
        } => {
            {
                let mut room = ctx.room.write();
                if !room.is_awaiting(request_id) {
                    debug!("Ignoring stale join rejection {}", request_id);
                    return;
                }
                *room = Room::None;
            }
            ctx.latency.write().response_received(request_id);

            warn!("Join of {} rejected ({}): {}", session_id, code, message);
            ctx.notify(|cb| cb.on_error(format!("Could not join {}: {}", session_id, message)));
        }

        ServerMessage::VideoControl {
            session_id,
            origin,
            event,
        } => {
            if ctx.room.write().active_in(&session_id).is_none() {
                debug!("Ignoring control for session {} we are not in", session_id);
                return;
            }
            if ctx.participant_id.read().as_deref() == Some(origin.as_str()) {
                debug!("Ignoring our own {} event", event.kind);
                return;
            }

            debug!("{} at {:.3}s from {}", event.kind, event.progress, origin);
            let phase = {
                let mut engine = ctx.engine.lock();
                engine.apply_remote(&event);
                engine.phase()
            };
            if let EnginePhase::Joined(phase) = phase {
                ctx.notify(|cb| cb.on_playback_changed(phase));
            }
        }

        ServerMessage::UserJoined {
            session_id,
            participant_id,
            participants,
        } => {
            let state = {
                let mut room = ctx.room.write();
                let Some(state) = room.active_in(&session_id) else {
                    return;
                };
                state.set_participants(participants);
                state.clone()
            };

            info!("{} joined session {}", participant_id, session_id);
            ctx.notify(|cb| {
                cb.on_participant_joined(participant_id);
                cb.on_room_state_changed(state);
            });
        }

        ServerMessage::UserLeft {
            session_id,
            participant_id,
            participants,
        } => {
            let state = {
                let mut room = ctx.room.write();
                let Some(state) = room.active_in(&session_id) else {
                    return;
                };
                state.set_participants(participants);
                state.clone()
            };

            info!("{} left session {}", participant_id, session_id);
            ctx.notify(|cb| {
                cb.on_participant_left(participant_id);
                cb.on_room_state_changed(state);
            });
        }
    }
}
