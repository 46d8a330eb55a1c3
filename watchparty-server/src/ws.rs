//! WebSocket connection handler
//!
//! One task per connection. Inbound frames are handled in order; outbound
//! messages queued by the coordinator are forwarded as they arrive.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use watchparty_core::coordinator::Connection;
use watchparty_core::{ClientMessage, ServerMessage, PROTOCOL_VERSION};

use crate::metrics::{LogLevel, Metrics};
use crate::AppState;

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one viewer connection until it closes
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Connection {
        participant_id,
        receiver: mut outbound,
    } = state.coordinator.connect();
    state.metrics.write().connection_established(&participant_id);

    let welcome = ServerMessage::Welcome {
        participant_id: participant_id.clone(),
        version: PROTOCOL_VERSION.to_string(),
    };
    match serde_json::to_string(&welcome) {
        Ok(json) => {
            if sender.send(Message::Text(json.into())).await.is_err() {
                cleanup(&state, &participant_id);
                return;
            }
        }
        Err(e) => {
            error!("Failed to serialize welcome for {}: {}", participant_id, e);
            cleanup(&state, &participant_id);
            return;
        }
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", participant_id, text.as_str());

                        let message = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("Skipping malformed frame from {}: {}", participant_id, e);
                                state.metrics.write().log(
                                    LogLevel::Warning,
                                    format!("Malformed frame from {}", participant_id),
                                );
                                continue;
                            }
                        };

                        // Only this task removes this participant, so the check is exact
                        let was_member = match &message {
                            ClientMessage::Leave { session_id } => {
                                state.coordinator.is_member(session_id, &participant_id)
                            }
                            _ => false,
                        };
                        let response = state.coordinator.handle_message(&participant_id, message.clone());
                        record(
                            &mut state.metrics.write(),
                            &participant_id,
                            &message,
                            response.as_ref(),
                            was_member,
                        );

                        if let Some(response) = response {
                            if let Ok(json) = serde_json::to_string(&response) {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Participant {} closed the connection", participant_id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", participant_id, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            queued = outbound.recv() => {
                match queued {
                    Some(message) => {
                        if let Ok(json) = serde_json::to_string(&message) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => {
                        debug!("Outbound channel for {} closed", participant_id);
                        break;
                    }
                }
            }
        }
    }

    cleanup(&state, &participant_id);
}

fn cleanup(state: &AppState, participant_id: &str) {
    let left = state.coordinator.disconnect(participant_id);
    state.metrics.write().connection_closed(participant_id, &left);
    state.refresh_metrics();
}

/// Mirror a handled message into the dashboard metrics.
///
/// `was_member` is whether the sender was in the message's session before it
/// was handled; a leave only counts when it was.
fn record(
    metrics: &mut Metrics,
    participant_id: &str,
    message: &ClientMessage,
    response: Option<&ServerMessage>,
    was_member: bool,
) {
    match (message, response) {
        (ClientMessage::Join { .. }, Some(ServerMessage::JoinAccepted { session_id, .. })) => {
            metrics.join_accepted(participant_id, session_id);
        }
        (
            ClientMessage::Join { .. },
            Some(ServerMessage::JoinRejected {
                session_id, code, ..
            }),
        ) => {
            metrics.join_rejected(participant_id, session_id, code);
        }
        (ClientMessage::Leave { session_id }, _) if was_member => {
            metrics.participant_left(participant_id, session_id);
        }
        (ClientMessage::Control { session_id, event }, _) => {
            metrics.control_received(
                participant_id,
                session_id,
                &format!("{} at {:.1}s", event.kind, event.progress),
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchparty_core::ControlRequest;

    fn leave(session_id: &str) -> ClientMessage {
        ClientMessage::Leave {
            session_id: session_id.to_string(),
        }
    }

    #[test]
    fn test_leave_counts_only_when_it_removed_someone() {
        let mut metrics = Metrics::new();
        metrics.connection_established("a");
        metrics.join_accepted("a", "s1");
        let logged = metrics.logs.len();

        record(&mut metrics, "a", &leave("s2"), None, false);
        assert_eq!(metrics.logs.len(), logged);
        assert_eq!(metrics.participant_list[0].sessions, vec!["s1".to_string()]);

        record(&mut metrics, "a", &leave("s1"), None, true);
        assert_eq!(metrics.logs.len(), logged + 1);
        assert!(metrics.participant_list[0].sessions.is_empty());
    }

    #[test]
    fn test_control_is_counted() {
        let mut metrics = Metrics::new();
        let message = ClientMessage::Control {
            session_id: "s1".to_string(),
            event: ControlRequest::play(4.0),
        };

        record(&mut metrics, "a", &message, None, false);

        assert_eq!(metrics.controls_received, 1);
    }
}
