//! Watch Party - Coordinator Server
//!
//! Session registry, broadcast and late-join reconciliation over WebSocket,
//! with a terminal dashboard.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --no-dashboard  # Plain logging mode

mod dashboard;
mod network;

use watchparty_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let use_dashboard = !args.contains(&"--no-dashboard".to_string());

    let config = ServerConfig::from_env()?;

    if use_dashboard {
        let state = dashboard::app_state(&config);
        dashboard::run(config, state).await
    } else {
        let metrics = std::sync::Arc::new(parking_lot::RwLock::new(
            watchparty_server::metrics::Metrics::new(),
        ));
        network::run_with_logging(config, metrics).await
    }
}
