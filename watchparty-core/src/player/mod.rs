//! Media Player
//!
//! The rendering widget is not part of this crate. Anything that can play,
//! pause, seek and report its position can be driven by the sync engine.

mod memory;

pub use memory::{MemoryPlayer, PlayerCommand};

/// Playback primitives of the local media widget. Positions are in seconds.
pub trait MediaPlayer: Send + Sync {
    fn play(&self);

    fn pause(&self);

    fn seek(&self, seconds: f64);

    /// Total length of the media, if the widget knows it yet
    fn duration(&self) -> Option<f64>;

    /// Current playback position
    fn position(&self) -> f64;
}
