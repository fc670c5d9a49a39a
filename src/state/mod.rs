//! State machine module for the user radio
//!
//! Provides an explicit two-state machine:
//! - Inactive: Default state, radio off or player on foot
//! - Active: Player in a vehicle with the user radio playing
//!
//! plus `RadioState`, the shared flag the hotkey path reads.

mod machine;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use machine::{RadioStateMachine, State};

/// Whether the user radio is currently active, shared across tasks.
///
/// Only the monitor writes it; hotkey handlers read it concurrently.
#[derive(Debug, Clone, Default)]
pub struct RadioState(Arc<AtomicBool>);

impl RadioState {
    /// New state, inactive
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the user radio is on right now
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Publish the monitor's latest decision
    pub fn set_active(&self, active: bool) {
        self.0.store(active, Ordering::Release);
    }

    /// Back to inactive, used when the game detaches or on shutdown
    pub fn reset(&self) {
        self.set_active(false);
    }
}
