//! In-memory player for headless viewers and tests

use parking_lot::Mutex;

use super::MediaPlayer;

/// A primitive issued to the player, in call order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Seek(f64),
}

#[derive(Debug, Default)]
struct Inner {
    commands: Vec<PlayerCommand>,
    position: f64,
    playing: bool,
    duration: Option<f64>,
}

/// Player that keeps its state in memory and records every command.
///
/// Time does not advance on its own; use [`MemoryPlayer::set_position`] to
/// simulate playback progress.
#[derive(Debug, Default)]
pub struct MemoryPlayer {
    inner: Mutex<Inner>,
}

impl MemoryPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(duration: f64) -> Self {
        let player = Self::default();
        player.inner.lock().duration = Some(duration);
        player
    }

    pub fn set_position(&self, seconds: f64) {
        self.inner.lock().position = seconds;
    }

    pub fn set_duration(&self, duration: Option<f64>) {
        self.inner.lock().duration = duration;
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.inner.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.inner.lock().commands.clear();
    }
}

impl MediaPlayer for MemoryPlayer {
    fn play(&self) {
        let mut inner = self.inner.lock();
        inner.playing = true;
        inner.commands.push(PlayerCommand::Play);
    }

    fn pause(&self) {
        let mut inner = self.inner.lock();
        inner.playing = false;
        inner.commands.push(PlayerCommand::Pause);
    }

    fn seek(&self, seconds: f64) {
        let mut inner = self.inner.lock();
        inner.position = seconds;
        inner.commands.push(PlayerCommand::Seek(seconds));
    }

    fn duration(&self) -> Option<f64> {
        self.inner.lock().duration
    }

    fn position(&self) -> f64 {
        self.inner.lock().position
    }
}
