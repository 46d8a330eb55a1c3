//! Listener setup and the two run modes

use std::error::Error;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use watchparty_core::Coordinator;
use watchparty_server::config::ServerConfig;
use watchparty_server::metrics::{LogLevel, Metrics, ServerStatus};
use watchparty_server::{build_router, AppState};

/// Events for the dashboard
#[derive(Debug)]
pub enum NetworkEvent {
    /// Listening on the given address
    Ready { addr: String },
    /// Server stopped with an error
    Failed(String),
}

/// Run the server with dashboard integration
pub async fn run_with_dashboard(
    config: ServerConfig,
    state: AppState,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("Watch Party coordinator starting...");

    let addr = config.socket_addr().await?;
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            let mut m = state.metrics.write();
            m.status = ServerStatus::Error;
            m.log(LogLevel::Error, format!("Failed to bind {}: {}", addr, e));
            let _ = event_tx.send(NetworkEvent::Failed(e.to_string()));
            return Err(e.into());
        }
    };
    let local_addr = listener.local_addr()?;

    {
        let mut m = state.metrics.write();
        m.listen_addr = Some(local_addr.to_string());
        m.join_policy = if config.auto_create {
            "auto-create".to_string()
        } else {
            "explicit".to_string()
        };
        m.status = ServerStatus::Running;
        m.log(LogLevel::Info, format!("Listening on {}", local_addr));
    }
    info!("Listening on {}", local_addr);

    let _ = event_tx.send(NetworkEvent::Ready {
        addr: local_addr.to_string(),
    });

    let app = build_router(state.clone(), &config.cors_origin);
    if let Err(e) = axum::serve(listener, app).await {
        let mut m = state.metrics.write();
        m.status = ServerStatus::Error;
        m.log(LogLevel::Error, format!("Server error: {}", e));
        let _ = event_tx.send(NetworkEvent::Failed(e.to_string()));
        return Err(e.into());
    }

    Ok(())
}

/// Run with plain logging (no dashboard)
pub async fn run_with_logging(
    config: ServerConfig,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("watchparty_server=info".parse()?)
                .add_directive("watchparty_core=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(
        "Config: {}:{}, auto-create {}, history {}",
        config.host, config.port, config.auto_create, config.history_limit
    );

    let state = AppState::with_metrics(Coordinator::new(config.coordinator_config()), metrics);
    let (tx, _rx) = mpsc::unbounded_channel();
    run_with_dashboard(config, state, tx)
        .await
        .map_err(|e| -> Box<dyn Error> { e })
}
