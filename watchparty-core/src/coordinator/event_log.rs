//! Event Log
//!
//! Keeps the last control event of a session (and, if enabled, a bounded
//! history) and answers "where should a viewer joining right now be".

use std::collections::VecDeque;

use crate::sync::{ControlEvent, ControlKind, ControlRequest};

use super::error::CoordinatorError;

/// Playback position a joining viewer should adopt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playhead {
    pub progress: f64,
    pub is_playing: bool,
}

/// Compute the playhead from the last recorded event.
///
/// PLAY is extrapolated by the wall-clock time elapsed since it was
/// observed. The result is never negative; there is no upper bound because
/// the coordinator does not know the media duration.
pub fn compute_playhead(last: Option<&ControlEvent>, now_ms: u64) -> Playhead {
    let Some(event) = last else {
        return Playhead {
            progress: 0.0,
            is_playing: false,
        };
    };

    match event.kind {
        ControlKind::Pause | ControlKind::End => Playhead {
            progress: event.progress,
            is_playing: false,
        },
        ControlKind::Play => {
            let elapsed_ms = now_ms.saturating_sub(event.observed_at);
            let progress = event.progress + elapsed_ms as f64 / 1000.0;
            Playhead {
                progress: progress.max(0.0),
                is_playing: true,
            }
        }
    }
}

/// Check a control request and turn it into the event to store
pub fn validate(request: &ControlRequest, now_ms: u64) -> Result<ControlEvent, CoordinatorError> {
    let progress = match request.kind {
        // END always means "back at the start"
        ControlKind::End => 0.0,
        ControlKind::Play | ControlKind::Pause => {
            if !request.progress.is_finite() {
                return Err(CoordinatorError::InvalidEvent(format!(
                    "progress must be finite, got {}",
                    request.progress
                )));
            }
            if request.progress < 0.0 {
                return Err(CoordinatorError::InvalidEvent(format!(
                    "progress must not be negative, got {}",
                    request.progress
                )));
            }
            request.progress
        }
    };

    Ok(ControlEvent {
        kind: request.kind,
        progress,
        observed_at: now_ms,
    })
}

/// Last-state cache plus optional bounded history for one session
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    last: Option<ControlEvent>,
    history: VecDeque<ControlEvent>,
    history_limit: usize,
}

impl EventLog {
    /// `history_limit` of 0 keeps only the last event
    pub fn new(history_limit: usize) -> Self {
        Self {
            last: None,
            history: VecDeque::with_capacity(history_limit.min(64)),
            history_limit,
        }
    }

    /// Overwrite the last event. Arrival order wins, whatever the timestamps say.
    pub fn record(&mut self, event: ControlEvent) {
        self.last = Some(event);
        if self.history_limit == 0 {
            return;
        }
        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    pub fn last(&self) -> Option<&ControlEvent> {
        self.last.as_ref()
    }

    /// Recorded events, oldest first
    pub fn history(&self) -> Vec<ControlEvent> {
        self.history.iter().copied().collect()
    }

    pub fn playhead(&self, now_ms: u64) -> Playhead {
        compute_playhead(self.last.as_ref(), now_ms)
    }
}
