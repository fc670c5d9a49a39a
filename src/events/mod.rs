//! Events module for radio state transitions
//!
//! Provides the edge-triggered events emitted by the radio state machine.
//! Exactly one event is produced per observed transition.

/// Why the user radio stopped being active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationCause {
    /// Player left the vehicle; the station byte is not consulted
    ExitedVehicle,
    /// Player is still in a vehicle but switched away from the user radio
    StationChanged,
}

impl std::fmt::Display for DeactivationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeactivationCause::ExitedVehicle => write!(f, "exited vehicle"),
            DeactivationCause::StationChanged => write!(f, "station changed"),
        }
    }
}

/// Events emitted by the state machine during transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// User radio became active (in vehicle, user station selected)
    Activated {
        /// Milliseconds spent inactive before this activation
        duration_ms: u64,
    },

    /// User radio stopped being active
    Deactivated {
        cause: DeactivationCause,
        /// Milliseconds the user radio was active
        duration_ms: u64,
    },
}

impl RadioEvent {
    /// Whether this event leaves the radio active
    pub fn is_activation(&self) -> bool {
        matches!(self, RadioEvent::Activated { .. })
    }
}

impl std::fmt::Display for RadioEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioEvent::Activated { duration_ms } => {
                write!(f, "USER_RADIO_ACTIVATED (idle {}ms)", duration_ms)
            }
            RadioEvent::Deactivated { cause, duration_ms } => {
                write!(f, "USER_RADIO_DEACTIVATED ({}, active {}ms)", cause, duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = RadioEvent::Deactivated {
            cause: DeactivationCause::ExitedVehicle,
            duration_ms: 1500,
        };
        let text = event.to_string();
        assert!(text.contains("DEACTIVATED"));
        assert!(text.contains("exited vehicle"));
        assert!(text.contains("1500"));
    }

    #[test]
    fn test_is_activation() {
        assert!(RadioEvent::Activated { duration_ms: 0 }.is_activation());
        assert!(!RadioEvent::Deactivated {
            cause: DeactivationCause::StationChanged,
            duration_ms: 0,
        }
        .is_activation());
    }
}
