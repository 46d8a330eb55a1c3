//! Watch session
//!
//! One viewer's connection to the coordinator, its local player and the
//! session it is in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::latency::{self, SharedLatencyTracker};
use crate::network::{NetworkEvent, NetworkHandle, NetworkManager};
use crate::player::MediaPlayer;
use crate::sync::{ControlRequest, EnginePhase, ReconciliationEngine, Room, RoomState};

use super::handlers::handle_network_event;
use super::types::{ClientConfig, CoreError, SessionCallback};

/// State shared between the session and its event loop
pub(super) struct SessionContext {
    pub(super) room: RwLock<Room>,
    pub(super) engine: Mutex<ReconciliationEngine>,
    pub(super) callback: RwLock<Option<Arc<dyn SessionCallback>>>,
    pub(super) network: RwLock<Option<NetworkHandle>>,
    pub(super) participant_id: RwLock<Option<String>>,
    pub(super) latency: SharedLatencyTracker,
}

impl SessionContext {
    /// Run `f` against the callback, if one is set, without holding the lock
    pub(super) fn notify(&self, f: impl FnOnce(&dyn SessionCallback)) {
        let callback = self.callback.read().clone();
        if let Some(cb) = callback {
            f(cb.as_ref());
        }
    }
}

/// A viewer's watch-party session
pub struct WatchSession {
    ctx: Arc<SessionContext>,
    config: ClientConfig,
    next_request_id: AtomicU64,
}

impl WatchSession {
    /// Connect to the coordinator and start processing its messages
    pub async fn connect(
        config: ClientConfig,
        player: Arc<dyn MediaPlayer>,
    ) -> Result<Self, CoreError> {
        let (handle, events) = NetworkManager::connect(&config.network).await?;
        let session = Self::detached(config, player, handle);
        session.spawn_event_loop(events);
        Ok(session)
    }

    fn detached(config: ClientConfig, player: Arc<dyn MediaPlayer>, handle: NetworkHandle) -> Self {
        Self {
            ctx: Arc::new(SessionContext {
                room: RwLock::new(Room::None),
                engine: Mutex::new(ReconciliationEngine::new(player)),
                callback: RwLock::new(None),
                network: RwLock::new(Some(handle)),
                participant_id: RwLock::new(None),
                latency: latency::new_shared_tracker(),
            }),
            config,
            next_request_id: AtomicU64::new(1),
        }
    }

    fn spawn_event_loop(&self, mut events: mpsc::UnboundedReceiver<NetworkEvent>) {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                handle_network_event(event, &ctx);
            }
        });
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Box<dyn SessionCallback>) {
        *self.ctx.callback.write() = Some(Arc::from(callback));
    }

    /// Ask to join a session. The outcome arrives through the callback.
    ///
    /// Returns the request ID of the join.
    pub fn join(&self, session_id: &str) -> Result<u64, CoreError> {
        let handle = self.network()?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut room = self.ctx.room.write();
            if room.is_busy() {
                return Err(CoreError::AlreadyInSession);
            }
            *room = Room::Joining {
                session_id: session_id.to_string(),
                request_id,
                sent_at: std::time::Instant::now(),
            };
        }

        self.ctx.latency.write().request_sent(request_id);
        if let Err(e) = handle.join(request_id, session_id) {
            *self.ctx.room.write() = Room::None;
            return Err(e.into());
        }

        // No answer in time: give up so the user can retry
        let ctx = Arc::clone(&self.ctx);
        let timeout = self.config.join_timeout;
        let session_id_for_timeout = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let timed_out = {
                let mut room = ctx.room.write();
                if room.is_awaiting(request_id) {
                    *room = Room::None;
                    true
                } else {
                    false
                }
            };
            if timed_out {
                warn!("No answer to join of {} after {:?}", session_id_for_timeout, timeout);
                ctx.notify(|cb| {
                    cb.on_error(format!("Joining {} timed out", session_id_for_timeout))
                });
            }
        });

        info!("Joining session {}", session_id);
        Ok(request_id)
    }

    /// Leave the current session (or abandon a pending join)
    pub fn leave(&self) -> Result<(), CoreError> {
        let session_id = {
            let mut room = self.ctx.room.write();
            let session_id = room
                .session_id()
                .map(str::to_string)
                .ok_or(CoreError::NotInSession)?;
            *room = Room::None;
            session_id
        };

        self.ctx.engine.lock().reset();
        self.ctx.latency.write().clear_pending();

        if let Some(handle) = self.ctx.network.read().as_ref() {
            if let Err(e) = handle.leave(&session_id) {
                warn!("Failed to send leave for {}: {}", session_id, e);
            }
        }

        info!("Left session {}", session_id);
        Ok(())
    }

    /// User pressed play/pause
    pub fn toggle_play_pause(&self) -> Result<(), CoreError> {
        self.local_action(|engine| engine.toggle_play_pause())
    }

    /// User released the seek bar at `progress` seconds
    pub fn seek(&self, progress: f64) -> Result<(), CoreError> {
        self.local_action(|engine| engine.seek_released(progress))
    }

    /// The local player reached the end of the video
    pub fn media_ended(&self) -> Result<(), CoreError> {
        self.local_action(|engine| engine.media_ended())
    }

    pub fn room_state(&self) -> Option<RoomState> {
        self.ctx.room.read().state().cloned()
    }

    pub fn is_in_session(&self) -> bool {
        self.ctx.room.read().is_active()
    }

    pub fn playback_phase(&self) -> EnginePhase {
        self.ctx.engine.lock().phase()
    }

    pub fn participant_id(&self) -> Option<String> {
        self.ctx.participant_id.read().clone()
    }

    /// Close the connection
    pub fn shutdown(&self) {
        if let Some(handle) = self.ctx.network.write().take() {
            handle.shutdown();
        }
        *self.ctx.room.write() = Room::None;
        self.ctx.engine.lock().reset();
        info!("Session shut down");
    }

    fn network(&self) -> Result<NetworkHandle, CoreError> {
        self.ctx
            .network
            .read()
            .clone()
            .filter(|h| !h.is_closed())
            .ok_or(CoreError::NotConnected)
    }

    /// Apply a local action and send the control event it produces
    fn local_action(
        &self,
        action: impl FnOnce(&mut ReconciliationEngine) -> Option<ControlRequest>,
    ) -> Result<(), CoreError> {
        let session_id = self
            .ctx
            .room
            .read()
            .state()
            .map(|s| s.session_id.clone())
            .ok_or(CoreError::NotInSession)?;
        let handle = self.network()?;

        let request = action(&mut self.ctx.engine.lock());
        if let Some(request) = request {
            handle.control(&session_id, request)?;
            if let EnginePhase::Joined(phase) = self.playback_phase() {
                self.ctx.notify(|cb| cb.on_playback_changed(phase));
            }
        }
        Ok(())
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Some(handle) = self.ctx.network.read().as_ref() {
            handle.shutdown();
        }
    }
}
