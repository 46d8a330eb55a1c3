//! Coordinator
//!
//! Server-side half of the system: sessions, who is in them, the last
//! control event of each, and fan-out to connected viewers.

mod broadcast;
mod error;
mod event_log;
mod lifecycle;
mod registry;

pub use broadcast::{BroadcastRouter, DeliveryReport};
pub use error::{CoordinatorError, DeliveryFailure};
pub use event_log::{compute_playhead, EventLog, Playhead};
pub use lifecycle::{Connection, Coordinator, CoordinatorConfig, JoinOutcome, JoinPolicy};
pub use registry::{Membership, Session, SessionRegistry, SessionSnapshot, SharedSession};
