//! Tracking loss and recovery state machine.
//!
//! ```text
//!            valid (first detection)
//!   Lost ───────────────────────────────▶ Tracking
//!    ▲ │ valid                              │  no valid frame for
//!    │ ▼                                    │  longer than the timeout
//!   Recovering ──recovery_frames valid──▶ Tracking
//!    │ invalid                              │
//!    └──────────────▶ Lost ◀────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracking status of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingState {
    Tracking,
    Lost,
    Recovering,
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tracking => "tracking",
            Self::Lost => "lost",
            Self::Recovering => "recovering",
        };
        f.write_str(name)
    }
}

/// Thresholds driving the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryParams {
    /// Seconds without a valid frame before `Tracking` becomes `Lost`
    pub timeout: f64,
    /// Consecutive valid frames needed to leave `Recovering`
    pub recovery_frames: usize,
}

/// A state change caused by one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TrackingState,
    pub to: TrackingState,
}

/// Runs for the lifetime of the session; there is no terminal state.
#[derive(Debug, Clone)]
pub struct RecoveryStateMachine {
    state: TrackingState,
    /// Timestamp of the last valid frame
    last_valid: Option<f64>,
    consecutive_invalid: u32,
    recovery_count: usize,
    acquired: bool,
}

impl Default for RecoveryStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryStateMachine {
    /// Starts `Lost`: nothing has been detected yet
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: TrackingState::Lost,
            last_valid: None,
            consecutive_invalid: 0,
            recovery_count: 0,
            acquired: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Consecutive frames that were missing or below the confidence threshold
    #[must_use]
    pub fn tracking_loss(&self) -> u32 {
        self.consecutive_invalid
    }

    /// Valid frames counted so far in the current recovery
    #[must_use]
    pub fn recovery_progress(&self) -> usize {
        self.recovery_count
    }

    /// Feed one frame outcome, returning the transition it caused
    pub fn observe(&mut self, valid: bool, timestamp: f64, params: &RecoveryParams) -> Option<Transition> {
        let from = self.state;
        if valid {
            self.on_valid(timestamp, params);
        } else {
            self.on_invalid(timestamp, params);
        }

        (from != self.state).then(|| {
            let transition = Transition { from, to: self.state };
            log::info!("Tracking state {} -> {}", transition.from, transition.to);
            transition
        })
    }

    fn on_valid(&mut self, timestamp: f64, params: &RecoveryParams) {
        self.last_valid = Some(timestamp);
        self.consecutive_invalid = 0;

        match self.state {
            TrackingState::Tracking => {}
            TrackingState::Lost if !self.acquired => {
                self.acquired = true;
                self.state = TrackingState::Tracking;
            }
            TrackingState::Lost | TrackingState::Recovering => {
                self.recovery_count += 1;
                if self.recovery_count >= params.recovery_frames {
                    self.recovery_count = 0;
                    self.state = TrackingState::Tracking;
                } else {
                    self.state = TrackingState::Recovering;
                }
            }
        }
    }

    fn on_invalid(&mut self, timestamp: f64, params: &RecoveryParams) {
        self.consecutive_invalid = self.consecutive_invalid.saturating_add(1);

        match self.state {
            TrackingState::Tracking => {
                let elapsed = self.last_valid.map_or(f64::INFINITY, |last| timestamp - last);
                if elapsed > params.timeout {
                    self.state = TrackingState::Lost;
                }
            }
            TrackingState::Recovering => {
                self.recovery_count = 0;
                self.state = TrackingState::Lost;
            }
            TrackingState::Lost => {}
        }
    }

    /// Back to the initial state
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
