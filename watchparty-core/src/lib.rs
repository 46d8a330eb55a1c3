//! Watch Party - Core Library
//!
//! Synchronized video playback across viewers. The coordinator keeps
//! sessions, their members and the last control event of each; viewers
//! reconcile their local player against it.

pub mod api;
pub mod client;
pub mod clock;
pub mod coordinator;
pub mod latency;
pub mod network;
pub mod player;
pub mod sync;

// Re-exports for convenience
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, JoinPolicy};
pub use sync::{ClientMessage, ControlEvent, ControlKind, ControlRequest, JoinState, ServerMessage};

/// Protocol version announced in `welcome`
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
