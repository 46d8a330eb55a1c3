//! Coordinator Connection
//!
//! WebSocket link between a viewer and the coordinator.

mod connection;

pub use connection::{NetworkConfig, NetworkError, NetworkEvent, NetworkHandle, NetworkManager};

#[cfg(test)]
pub(crate) use connection::NetworkCommand;
