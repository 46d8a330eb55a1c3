//! Client Reconciliation Engine
//!
//! Drives the local player from two directions:
//!
//! - remote state (a join response or a peer's control broadcast) is applied
//!   to the player and never produces an outgoing event;
//! - local actions are applied to the player and produce exactly one
//!   [`ControlRequest`] for the coordinator.
//!
//! Keeping those two paths apart is what stops peers from echoing each
//! other's events back and forth forever.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::protocol::{ControlKind, ControlRequest, JoinState};
use crate::player::MediaPlayer;

/// Local playback state once joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Paused,
    Playing,
    /// Stopped at the end (or reset to the start by an END event)
    Ended,
}

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    NotJoined,
    Joined(PlaybackPhase),
}

pub struct ReconciliationEngine {
    player: Arc<dyn MediaPlayer>,
    phase: EnginePhase,
}

impl ReconciliationEngine {
    pub fn new(player: Arc<dyn MediaPlayer>) -> Self {
        Self {
            player,
            phase: EnginePhase::NotJoined,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.phase, EnginePhase::Joined(_))
    }

    /// Apply the state returned by the coordinator on join.
    ///
    /// When the session is playing, `latency` (estimated one-way delay of the
    /// join response) is added on top of the coordinator's extrapolation.
    pub fn apply_join(&mut self, state: &JoinState, latency: Duration) {
        let target = if state.is_playing {
            state.progress + latency.as_secs_f64()
        } else {
            state.progress
        };
        debug!(
            "Applying join state: progress={:.3}s playing={} (latency {}ms)",
            target,
            state.is_playing,
            latency.as_millis()
        );
        let phase = self.settle(target, state.is_playing);
        self.phase = EnginePhase::Joined(phase);
    }

    /// Apply a peer's control event. Ignored until joined.
    pub fn apply_remote(&mut self, event: &ControlRequest) {
        if !self.is_joined() {
            debug!("Ignoring {} before join completed", event.kind);
            return;
        }
        let phase = match event.kind {
            ControlKind::Play => self.settle(event.progress, true),
            ControlKind::Pause => self.settle(event.progress, false),
            ControlKind::End => self.rewind(),
        };
        self.phase = EnginePhase::Joined(phase);
    }

    /// User pressed play/pause. From `Ended`, playback restarts at 0.
    pub fn toggle_play_pause(&mut self) -> Option<ControlRequest> {
        let EnginePhase::Joined(current) = self.phase else {
            return None;
        };
        let (progress, play) = match current {
            PlaybackPhase::Playing => (self.player.position(), false),
            PlaybackPhase::Paused => (self.player.position(), true),
            PlaybackPhase::Ended => (0.0, true),
        };
        Some(self.local(progress, play))
    }

    /// User released the seek bar; playback continues from there
    pub fn seek_released(&mut self, progress: f64) -> Option<ControlRequest> {
        if !self.is_joined() {
            return None;
        }
        Some(self.local(progress, true))
    }

    /// The player reached the end of the media on its own
    pub fn media_ended(&mut self) -> Option<ControlRequest> {
        if !self.is_joined() {
            return None;
        }
        self.phase = EnginePhase::Joined(self.rewind());
        Some(ControlRequest::end())
    }

    /// Forget the session and stop the player
    pub fn reset(&mut self) {
        if self.is_joined() {
            self.player.pause();
        }
        self.phase = EnginePhase::NotJoined;
    }

    fn local(&mut self, progress: f64, play: bool) -> ControlRequest {
        let phase = self.settle(progress, play);
        if phase == PlaybackPhase::Ended {
            // Ran off the end: same as the media ending, so peers rewind too
            self.phase = EnginePhase::Joined(self.rewind());
            return ControlRequest::end();
        }
        self.phase = EnginePhase::Joined(phase);
        // Report where the player actually landed, after clamping
        let landed = self.player.position();
        if phase == PlaybackPhase::Playing {
            ControlRequest::play(landed)
        } else {
            ControlRequest::pause(landed)
        }
    }

    /// Seek and set play/pause, stopping at the end of known media
    fn settle(&self, progress: f64, play: bool) -> PlaybackPhase {
        let target = progress.max(0.0);

        if let Some(duration) = self.player.duration().filter(|d| *d > 0.0) {
            if target >= duration {
                self.player.seek(duration);
                self.player.pause();
                return PlaybackPhase::Ended;
            }
        }

        self.player.seek(target);
        if play {
            self.player.play();
            PlaybackPhase::Playing
        } else {
            self.player.pause();
            PlaybackPhase::Paused
        }
    }

    fn rewind(&self) -> PlaybackPhase {
        self.player.seek(0.0);
        self.player.pause();
        PlaybackPhase::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{MemoryPlayer, PlayerCommand};

    fn engine_with(player: &Arc<MemoryPlayer>) -> ReconciliationEngine {
        ReconciliationEngine::new(Arc::clone(player) as Arc<dyn MediaPlayer>)
    }

    fn join_state(progress: f64, is_playing: bool) -> JoinState {
        JoinState {
            video_url: "v".to_string(),
            progress,
            is_playing,
        }
    }

    #[test]
    fn test_join_paused_seeks_without_playing() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);

        engine.apply_join(&join_state(42.0, false), Duration::from_millis(80));

        assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Paused));
        assert_eq!(
            player.commands(),
            vec![PlayerCommand::Seek(42.0), PlayerCommand::Pause]
        );
    }

    #[test]
    fn test_join_playing_adds_latency() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);

        engine.apply_join(&join_state(15.0, true), Duration::from_millis(250));

        assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Playing));
        assert!((player.position() - 15.25).abs() < 1e-9);
        assert!(player.is_playing());
    }

    #[test]
    fn test_join_past_duration_stops_at_end() {
        let player = Arc::new(MemoryPlayer::with_duration(100.0));
        let mut engine = engine_with(&player);

        engine.apply_join(&join_state(130.0, true), Duration::ZERO);

        assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Ended));
        assert_eq!(player.position(), 100.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_remote_events_follow_kind() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(0.0, false), Duration::ZERO);

        engine.apply_remote(&ControlRequest::play(12.0));
        assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Playing));
        assert_eq!(player.position(), 12.0);

        engine.apply_remote(&ControlRequest::pause(20.0));
        assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Paused));
        assert_eq!(player.position(), 20.0);

        engine.apply_remote(&ControlRequest {
            kind: ControlKind::End,
            progress: 55.0,
        });
        assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Ended));
        assert_eq!(player.position(), 0.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_remote_event_before_join_is_ignored() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);

        engine.apply_remote(&ControlRequest::play(5.0));

        assert_eq!(engine.phase(), EnginePhase::NotJoined);
        assert!(player.commands().is_empty());
    }

    #[test]
    fn test_applying_remote_state_twice_is_idempotent() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(0.0, false), Duration::ZERO);

        engine.apply_remote(&ControlRequest::play(30.0));
        let after_first = (engine.phase(), player.position(), player.is_playing());
        engine.apply_remote(&ControlRequest::play(30.0));
        let after_second = (engine.phase(), player.position(), player.is_playing());

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_toggle_emits_resulting_state() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(8.0, false), Duration::ZERO);

        let request = engine.toggle_play_pause().unwrap();
        assert_eq!(request, ControlRequest::play(8.0));
        assert!(player.is_playing());

        player.set_position(11.5);
        let request = engine.toggle_play_pause().unwrap();
        assert_eq!(request, ControlRequest::pause(11.5));
        assert!(!player.is_playing());
    }

    #[test]
    fn test_toggle_from_ended_restarts() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(0.0, false), Duration::ZERO);
        player.set_position(99.0);
        engine.media_ended();

        let request = engine.toggle_play_pause().unwrap();
        assert_eq!(request, ControlRequest::play(0.0));
    }

    #[test]
    fn test_seek_release_plays_from_target() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(0.0, false), Duration::ZERO);

        let request = engine.seek_released(64.0).unwrap();

        assert_eq!(request, ControlRequest::play(64.0));
        assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Playing));
    }

    #[test]
    fn test_seek_past_end_emits_end() {
        let player = Arc::new(MemoryPlayer::with_duration(60.0));
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(0.0, false), Duration::ZERO);

        for target in [60.0, 75.0] {
            let request = engine.seek_released(target).unwrap();

            assert_eq!(request, ControlRequest::end());
            assert_eq!(engine.phase(), EnginePhase::Joined(PlaybackPhase::Ended));
            assert_eq!(player.position(), 0.0);
            assert!(!player.is_playing());
        }
    }

    #[test]
    fn test_seek_just_before_end_stays_in_range() {
        let player = Arc::new(MemoryPlayer::with_duration(60.0));
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(0.0, false), Duration::ZERO);

        let request = engine.seek_released(59.5).unwrap();

        assert_eq!(request, ControlRequest::play(59.5));
    }

    #[test]
    fn test_media_end_emits_end() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(0.0, true), Duration::ZERO);

        let request = engine.media_ended().unwrap();

        assert_eq!(request, ControlRequest::end());
        assert_eq!(player.position(), 0.0);
    }

    #[test]
    fn test_local_actions_need_a_session() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);

        assert!(engine.toggle_play_pause().is_none());
        assert!(engine.seek_released(3.0).is_none());
        assert!(engine.media_ended().is_none());
        assert!(player.commands().is_empty());
    }

    #[test]
    fn test_reset_pauses_and_forgets() {
        let player = Arc::new(MemoryPlayer::new());
        let mut engine = engine_with(&player);
        engine.apply_join(&join_state(1.0, true), Duration::ZERO);

        engine.reset();

        assert_eq!(engine.phase(), EnginePhase::NotJoined);
        assert!(!player.is_playing());
    }
}
