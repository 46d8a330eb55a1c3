//! Test server harness for integration tests.
//!
//! Spins up the real router on a random port for WebSocket and HTTP clients.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use watchparty_core::{Coordinator, CoordinatorConfig, JoinPolicy};
use watchparty_server::{build_router, AppState};

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server that rejects joins to unknown sessions.
    pub async fn start() -> Self {
        Self::start_with(CoordinatorConfig::default()).await
    }

    /// Start a server that creates unknown sessions on join.
    #[allow(dead_code)]
    pub async fn start_auto_create() -> Self {
        Self::start_with(CoordinatorConfig {
            join_policy: JoinPolicy::AutoCreate,
            ..CoordinatorConfig::default()
        })
        .await
    }

    pub async fn start_with(config: CoordinatorConfig) -> Self {
        let state = AppState::new(Coordinator::new(config));
        let app = build_router(state.clone(), "*");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("failed to get local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server error");
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// WebSocket URL of the real-time channel.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Base URL of the HTTP API.
    #[allow(dead_code)]
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shared state, for assertions against the coordinator.
    #[allow(dead_code)]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Gracefully shut down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(tokio::time::Duration::from_secs(5), self.handle).await;
    }
}
