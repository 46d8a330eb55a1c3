//! Watch Party coordinator server
//!
//! Serves the real-time WebSocket channel at `/ws` and the session HTTP API
//! on top of a [`Coordinator`].

pub mod config;
pub mod http;
pub mod metrics;
pub mod ws;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use parking_lot::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use watchparty_core::Coordinator;

use crate::metrics::Metrics;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub metrics: Arc<RwLock<Metrics>>,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            metrics: Arc::new(RwLock::new(Metrics::new())),
        }
    }

    pub fn with_metrics(coordinator: Coordinator, metrics: Arc<RwLock<Metrics>>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            metrics,
        }
    }

    /// Copy coordinator-owned counters into the metrics
    pub fn refresh_metrics(&self) {
        self.metrics.write().sync_from_coordinator(
            self.coordinator.session_count(),
            self.coordinator.delivery_failures(),
        );
    }
}

/// Build the application router
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/ws", get(ws::ws_handler))
        .route("/session", post(http::create_session))
        .route("/session/{id}", get(http::get_session))
        .route("/session/{id}/end", post(http::end_session))
        .route("/session/{id}/lastVideoEvent", get(http::last_event))
        .route("/session/{id}/events", get(http::events))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!("Ignoring invalid CORS origin {:?}", origin);
            layer
        }
    }
}
