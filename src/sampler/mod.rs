//! Vehicle/radio sampler
//!
//! Reads the vehicle occupancy and current station out of the game once
//! per tick and turns them into a `RadioSample`.

mod layout;

pub use layout::{GameLayout, GameVersion};

use crate::memory::{MemoryError, ReadMemory};

/// Raw facts read from the game on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadioSample {
    /// Player is sitting in a vehicle
    pub in_vehicle: bool,
    /// Current station byte; only read while in a vehicle
    pub station_id: Option<u8>,
}

impl RadioSample {
    /// Sample taken while the player is outside any vehicle
    pub fn on_foot() -> Self {
        Self::default()
    }

    /// Sample taken in a vehicle tuned to `station_id`
    pub fn in_vehicle(station_id: u8) -> Self {
        Self {
            in_vehicle: true,
            station_id: Some(station_id),
        }
    }
}

/// Result of one sampling attempt
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub sample: RadioSample,
    /// Set when a read failed; the session should be dropped
    pub fault: Option<MemoryError>,
}

/// Samples radio state through a memory session
#[derive(Debug, Clone)]
pub struct RadioSampler {
    layout: GameLayout,
}

impl RadioSampler {
    pub fn new(layout: GameLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &GameLayout {
        &self.layout
    }

    /// Take one sample.
    ///
    /// With no session, or when any read fails, the player is reported on
    /// foot with no station. The station is not read while on foot.
    pub fn sample(&self, session: Option<&dyn ReadMemory>) -> SampleOutcome {
        let Some(session) = session else {
            return SampleOutcome {
                sample: RadioSample::on_foot(),
                fault: None,
            };
        };

        match self.read(session) {
            Ok(sample) => SampleOutcome {
                sample,
                fault: None,
            },
            Err(e) => SampleOutcome {
                sample: RadioSample::on_foot(),
                fault: Some(e),
            },
        }
    }

    fn read(&self, session: &dyn ReadMemory) -> Result<RadioSample, MemoryError> {
        let base = session.base_address();

        let occupancy = session.read_i32(self.layout.vehicle_address(base))?;
        if occupancy <= 0 {
            return Ok(RadioSample::on_foot());
        }

        let station = session.read_u8(self.layout.station_address(base))?;
        Ok(RadioSample::in_vehicle(station))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeGame;
    use super::*;

    #[test]
    fn test_no_session_reports_on_foot() {
        let sampler = RadioSampler::new(GameLayout::default());
        let outcome = sampler.sample(None);
        assert_eq!(outcome.sample, RadioSample::on_foot());
        assert!(outcome.fault.is_none());
    }

    #[test]
    fn test_in_vehicle_reads_station() {
        let game = FakeGame::new();
        game.set(1, 12);

        let sampler = RadioSampler::new(game.layout);
        let outcome = sampler.sample(Some(&game));
        assert_eq!(outcome.sample, RadioSample::in_vehicle(12));
    }

    #[test]
    fn test_on_foot_skips_station() {
        let game = FakeGame::new();
        game.set(0, 12);

        let sampler = RadioSampler::new(game.layout);
        let outcome = sampler.sample(Some(&game));
        assert!(!outcome.sample.in_vehicle);
        assert_eq!(outcome.sample.station_id, None);
    }

    #[test]
    fn test_negative_occupancy_is_on_foot() {
        let game = FakeGame::new();
        game.set(-1, 12);

        let outcome = RadioSampler::new(game.layout).sample(Some(&game));
        assert!(!outcome.sample.in_vehicle);
    }

    #[test]
    fn test_read_failure_reports_fault() {
        let game = FakeGame::new();
        game.set(1, 12);
        game.fail_reads(true);

        let outcome = RadioSampler::new(game.layout).sample(Some(&game));
        assert_eq!(outcome.sample, RadioSample::on_foot());
        assert!(matches!(outcome.fault, Some(MemoryError::ReadFailed { .. })));
    }
}
