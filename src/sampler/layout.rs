//! Memory layout of a specific game build
//!
//! Offsets are relative to the main module base and only hold for the
//! build they were taken from.

/// Known builds of the game executable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameVersion {
    /// GTA San Andreas v1.0, US executable
    V1_0Us,
}

impl GameVersion {
    /// Parse a version name as used in configuration
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "1.0-us" | "1.0" | "v1.0" | "v1.0-us" => Some(Self::V1_0Us),
            _ => None,
        }
    }

    pub fn layout(self) -> GameLayout {
        match self {
            GameVersion::V1_0Us => GameLayout {
                version: self,
                preferred_base: 0x0040_0000,
                station_offset: 0x004C_B7A5,
                vehicle_offset: 0x007A_18FC,
                user_radio_station: 12,
            },
        }
    }
}

impl std::fmt::Display for GameVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameVersion::V1_0Us => write!(f, "1.0-us"),
        }
    }
}

/// Where the radio and vehicle values live in the game process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameLayout {
    pub version: GameVersion,
    /// Image base the executable is linked at
    pub preferred_base: u64,
    /// Offset of the current radio station (u8)
    pub station_offset: u64,
    /// Offset of the vehicle occupancy value (i32, > 0 while in a vehicle)
    pub vehicle_offset: u64,
    /// Station id of the User Radio genre while it is playing
    pub user_radio_station: u8,
}

impl GameLayout {
    pub fn station_address(&self, base: u64) -> u64 {
        base.wrapping_add(self.station_offset)
    }

    pub fn vehicle_address(&self, base: u64) -> u64 {
        base.wrapping_add(self.vehicle_offset)
    }
}

impl Default for GameLayout {
    fn default() -> Self {
        GameVersion::V1_0Us.layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_addresses_at_preferred_base() {
        let layout = GameVersion::V1_0Us.layout();
        assert_eq!(layout.station_address(layout.preferred_base), 0x8CB7A5);
        assert_eq!(layout.vehicle_address(layout.preferred_base), 0xBA18FC);
        assert_eq!(layout.user_radio_station, 12);
    }

    #[test]
    fn test_version_names() {
        assert_eq!(GameVersion::from_name("1.0-US"), Some(GameVersion::V1_0Us));
        assert_eq!(GameVersion::from_name(" v1.0 "), Some(GameVersion::V1_0Us));
        assert_eq!(GameVersion::from_name("2.0"), None);
        assert_eq!(GameVersion::V1_0Us.to_string(), "1.0-us");
    }
}
