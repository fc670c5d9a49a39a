//! Core state machine implementation
//!
//! Turns a stream of `RadioSample`s into edge-triggered activation and
//! deactivation events. Holds no I/O; the monitor drives it.

use std::time::Instant;

use crate::events::{DeactivationCause, RadioEvent};
use crate::sampler::RadioSample;

/// Whether the user radio is playing in game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Radio off, other station, or player on foot
    #[default]
    Inactive,
    /// Player in a vehicle with the user radio selected
    Active,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Inactive => write!(f, "Inactive"),
            State::Active => write!(f, "Active"),
        }
    }
}

/// The state machine that tracks the user radio
pub struct RadioStateMachine {
    /// Current state
    state: State,
    /// Station id that means "user radio playing"
    user_radio_station: u8,
    /// Time when the current state was entered
    state_entered_at: Instant,
}

impl RadioStateMachine {
    /// Create a new state machine in the `Inactive` state
    pub fn new(user_radio_station: u8) -> Self {
        Self {
            state: State::Inactive,
            user_radio_station,
            state_entered_at: Instant::now(),
        }
    }

    /// Get the current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the user radio is currently active
    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Evaluate one sample, returning the event for a transition if any.
    ///
    /// Leaving the vehicle always deactivates, whatever the station byte says.
    pub fn evaluate(&mut self, sample: &RadioSample) -> Option<RadioEvent> {
        let (next, cause) = self.compute_next_state(sample);

        if next == self.state {
            return None;
        }

        Some(self.transition_to(next, cause))
    }

    /// Return to `Inactive` without emitting anything
    pub fn reset(&mut self) {
        self.state = State::Inactive;
        self.state_entered_at = Instant::now();
    }

    fn compute_next_state(&self, sample: &RadioSample) -> (State, DeactivationCause) {
        // Station is not even looked at while on foot
        if !sample.in_vehicle {
            return (State::Inactive, DeactivationCause::ExitedVehicle);
        }

        if sample.station_id == Some(self.user_radio_station) {
            (State::Active, DeactivationCause::StationChanged)
        } else {
            (State::Inactive, DeactivationCause::StationChanged)
        }
    }

    fn transition_to(&mut self, next: State, cause: DeactivationCause) -> RadioEvent {
        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;

        self.state = next;
        self.state_entered_at = Instant::now();

        match next {
            State::Active => RadioEvent::Activated { duration_ms },
            State::Inactive => RadioEvent::Deactivated { cause, duration_ms },
        }
    }
}
