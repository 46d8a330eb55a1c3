//! Viewer client
//!
//! Connects a local player to the coordinator and keeps it in step with the
//! rest of the session.

mod handlers;
mod session;
mod types;

pub use session::WatchSession;
pub use types::*;
