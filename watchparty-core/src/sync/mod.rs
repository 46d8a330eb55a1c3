//! Sync Engine
//!
//! Wire protocol, viewer-side session state and playback reconciliation.

mod engine;
mod protocol;
mod state;

pub use engine::*;
pub use protocol::*;
pub use state::*;
