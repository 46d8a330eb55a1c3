//! WebSocket transport
//!
//! Runs the socket in a background task. The rest of the client talks to it
//! through a [`NetworkHandle`] and reads [`NetworkEvent`]s back.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::sync::{ClientMessage, ControlRequest, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default coordinator WebSocket endpoint
const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3050/ws";

/// Network configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Coordinator WebSocket URL
    pub server_url: String,
    /// How long to wait for the socket to open
    pub connect_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl NetworkConfig {
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }
}

/// Network-related errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("Connection timed out")]
    Timeout,

    #[error("Connection closed")]
    Closed,
}

/// Events emitted by the connection task
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// The coordinator greeted us with our participant ID
    Connected { participant_id: String },
    /// Any other message from the coordinator
    Message(ServerMessage),
    /// The socket went away
    Disconnected { reason: Option<String> },
    /// Non-fatal problem (e.g. a frame we could not parse)
    Error(String),
}

/// Commands sent to the connection task
#[derive(Debug)]
pub(crate) enum NetworkCommand {
    Send(ClientMessage),
    Shutdown,
}

/// Handle to communicate with the running connection
#[derive(Clone)]
pub struct NetworkHandle {
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
}

impl NetworkHandle {
    pub fn send(&self, message: ClientMessage) -> Result<(), NetworkError> {
        self.command_tx
            .send(NetworkCommand::Send(message))
            .map_err(|_| NetworkError::Closed)
    }

    pub fn join(&self, request_id: u64, session_id: &str) -> Result<(), NetworkError> {
        self.send(ClientMessage::Join {
            request_id,
            session_id: session_id.to_string(),
        })
    }

    pub fn leave(&self, session_id: &str) -> Result<(), NetworkError> {
        self.send(ClientMessage::Leave {
            session_id: session_id.to_string(),
        })
    }

    pub fn control(&self, session_id: &str, event: ControlRequest) -> Result<(), NetworkError> {
        self.send(ClientMessage::Control {
            session_id: session_id.to_string(),
            event,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(NetworkCommand::Shutdown);
    }

    /// Handle with no socket behind it; commands land on the returned receiver
    #[cfg(test)]
    pub(crate) fn loopback() -> (Self, mpsc::UnboundedReceiver<NetworkCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (Self { command_tx }, command_rx)
    }
}

/// Opens the coordinator connection
pub struct NetworkManager;

impl NetworkManager {
    /// Connect and spawn the connection task
    pub async fn connect(
        config: &NetworkConfig,
    ) -> Result<(NetworkHandle, mpsc::UnboundedReceiver<NetworkEvent>), NetworkError> {
        let url = config.server_url.as_str();
        let (ws_stream, _) = tokio::time::timeout(config.connect_timeout, connect_async(url))
            .await
            .map_err(|_| NetworkError::Timeout)?
            .map_err(|e| NetworkError::Connection {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!("Connected to coordinator at {}", url);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(run(ws_stream, event_tx, command_rx));

        Ok((NetworkHandle { command_tx }, event_rx))
    }
}

/// Connection event loop
async fn run(
    ws_stream: WsStream,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    mut command_rx: mpsc::UnboundedReceiver<NetworkCommand>,
) {
    let (mut write, mut read) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::Welcome { participant_id, version }) => {
                                info!("Assigned participant ID {} (coordinator {})", participant_id, version);
                                let _ = event_tx.send(NetworkEvent::Connected { participant_id });
                            }
                            Ok(message) => {
                                let _ = event_tx.send(NetworkEvent::Message(message));
                            }
                            Err(e) => {
                                warn!("Skipping malformed frame: {}", e);
                                let _ = event_tx.send(NetworkEvent::Error(format!("Malformed frame: {}", e)));
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            }
            command = command_rx.recv() => {
                match command {
                    Some(NetworkCommand::Send(message)) => {
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode {:?}: {}", message, e);
                                continue;
                            }
                        };
                        debug!("Sending {}", text);
                        if write.send(Message::Text(text)).await.is_err() {
                            break Some("send failed".to_string());
                        }
                    }
                    Some(NetworkCommand::Shutdown) | None => {
                        info!("Connection shutting down");
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
        }
    };

    info!("Disconnected from coordinator");
    let _ = event_tx.send(NetworkEvent::Disconnected { reason });
}
