//! Hardware generation profiles.
//!
//! Every supported bike generation is one variant of [`BikeProfile`], a
//! fixed table of characteristic identifiers, command bytes, capability
//! flags and pure encode/decode functions. All bit layout knowledge lives
//! in the per-generation modules; the enum keeps dispatch exhaustive and
//! free of trait objects. Request builders return `None` when a
//! generation does not support an operation; callers treat that as a
//! silent no-op.

use bytes::Buf;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{
    Alarm, BatteryState, ErrorCode, Lighting, Lock, ModuleState, MotorAssistance, MutedSounds,
    Parameters, Region, Sound, Unit,
};

mod electrified2018;
mod smartbike2016;
mod smartbike2018;

/// All bluetooth low energy profile names known to date
///
/// The vendor web service reports these as strings; unknown strings are
/// preserved verbatim so that device records round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProfileName {
    /// A SmartBike
    SmartBike2016,
    /// A Smart S or Smart X
    SmartBike2018,
    /// An Electrified S or X (2016)
    Electrified2016,
    /// An Electrified S or X (2016 - 2017)
    Electrified20162017,
    /// An Electrified S or X (2017)
    Electrified2017,
    /// An S2 or X2
    Electrified2018,
    /// An S3 or X3
    Electrified2020,
    /// An unknown bike
    Electrified2021,
    /// An S5 or A5
    Electrified2022,
    /// An unknown bike
    Electrified2023Track1a,
    /// An unknown bike
    Electrified2023Track1b,
    /// A profile name this crate does not recognize
    Unknown(String),
}

impl ProfileName {
    /// Parse a profile name string as reported by the vendor web service
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_uppercase().as_str() {
            "SMARTBIKE_2016" => Self::SmartBike2016,
            "SMARTBIKE_2018" => Self::SmartBike2018,
            "ELECTRIFIED_2016" => Self::Electrified2016,
            "ELECTRIFIED_2016_2017" => Self::Electrified20162017,
            "ELECTRIFIED_2017" => Self::Electrified2017,
            "ELECTRIFIED_2018" => Self::Electrified2018,
            "ELECTRIFIED_2020" => Self::Electrified2020,
            "ELECTRIFIED_2021" => Self::Electrified2021,
            "ELECTRIFIED_2022" => Self::Electrified2022,
            "ELECTRIFIED_2023_TRACK1" => Self::Electrified2023Track1a,
            "ELECTRIFIED_2023_TRACK_1" => Self::Electrified2023Track1b,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for ProfileName {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ProfileName> for String {
    fn from(value: ProfileName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmartBike2016 => write!(f, "SMARTBIKE_2016"),
            Self::SmartBike2018 => write!(f, "SMARTBIKE_2018"),
            Self::Electrified2016 => write!(f, "ELECTRIFIED_2016"),
            Self::Electrified20162017 => write!(f, "ELECTRIFIED_2016_2017"),
            Self::Electrified2017 => write!(f, "ELECTRIFIED_2017"),
            Self::Electrified2018 => write!(f, "ELECTRIFIED_2018"),
            Self::Electrified2020 => write!(f, "ELECTRIFIED_2020"),
            Self::Electrified2021 => write!(f, "ELECTRIFIED_2021"),
            Self::Electrified2022 => write!(f, "ELECTRIFIED_2022"),
            Self::Electrified2023Track1a => write!(f, "ELECTRIFIED_2023_TRACK1"),
            Self::Electrified2023Track1b => write!(f, "ELECTRIFIED_2023_TRACK_1"),
            Self::Unknown(name) => write!(f, "{name}"),
        }
    }
}

/// The hardware capabilities a bike generation may have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hardware(u8);

impl Hardware {
    /// An electronically disengaging, physical lock
    pub const ELOCK: Self = Self(1 << 0);
    /// An automatic anti-theft device
    pub const ALARM: Self = Self(1 << 1);
    /// A motor
    pub const MOTOR: Self = Self(1 << 2);
    /// A speaker
    pub const SPEAKER: Self = Self(1 << 3);

    /// Check whether every capability in `other` is present
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The union of both capability sets
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for Hardware {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A read from one characteristic, decoded into a typed value
///
/// `parse` receives `None` when the characteristic yielded no data and
/// decodes missing or short frames to the generation's documented
/// defaults. Returning `None` means the field has no value and must not
/// be published.
pub struct ReadRequest<T> {
    /// The characteristic to read from or to subscribe to
    pub characteristic: Uuid,
    /// Whether the raw frame must be decrypted with the device key first
    pub decrypt: bool,
    /// Pure decode function from the (decrypted) frame to a typed value
    pub parse: fn(Option<&[u8]>) -> Option<T>,
}

/// A write to one characteristic
///
/// The payload is wrapped in the challenge-response scheme before it goes
/// out: challenge bytes, then the optional command discriminator, then
/// the payload, encrypted as a whole with the device key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// The characteristic to write to
    pub characteristic: Uuid,
    /// Command discriminator, for generations that multiplex one
    /// characteristic over many commands
    pub command: Option<u8>,
    /// The plaintext payload
    pub payload: Vec<u8>,
}

/// A fixed, stateless hardware generation table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BikeProfile {
    /// The 2016 SmartBike
    SmartBike2016,
    /// The 2018 Smart S/X
    SmartBike2018,
    /// The Electrified line (2016 through 2018, S2/X2)
    Electrified2018,
}

impl BikeProfile {
    /// Resolve a profile name to a supported hardware generation
    ///
    /// Returns `None` for generations this crate has not ported; sessions
    /// treat that as an unsupported bike.
    #[must_use]
    pub fn named(name: &ProfileName) -> Option<Self> {
        match name {
            ProfileName::SmartBike2016 => Some(Self::SmartBike2016),
            ProfileName::SmartBike2018 => Some(Self::SmartBike2018),
            ProfileName::Electrified2016
            | ProfileName::Electrified20162017
            | ProfileName::Electrified2017
            | ProfileName::Electrified2018 => Some(Self::Electrified2018),
            _ => None,
        }
    }

    /// The technical model name of this generation
    #[must_use]
    pub const fn model(self) -> &'static str {
        match self {
            Self::SmartBike2016 => "SmartBike",
            Self::SmartBike2018 => "SmartS/X",
            Self::Electrified2018 => "S/X2",
        }
    }

    /// The BLE service identifier this generation advertises
    #[must_use]
    pub const fn service(self) -> Uuid {
        match self {
            Self::SmartBike2016 => smartbike2016::SERVICE,
            Self::SmartBike2018 => smartbike2018::SERVICE,
            Self::Electrified2018 => electrified2018::SERVICE,
        }
    }

    /// The hardware capabilities of this generation
    #[must_use]
    pub const fn hardware(self) -> Hardware {
        match self {
            Self::SmartBike2016 => Hardware::ELOCK,
            Self::SmartBike2018 => Hardware(Hardware::ALARM.0 | Hardware::SPEAKER.0),
            Self::Electrified2018 => {
                Hardware(Hardware::MOTOR.0 | Hardware::ELOCK.0 | Hardware::SPEAKER.0)
            }
        }
    }

    /// The challenge read that precedes every write
    #[must_use]
    pub fn challenge_read_request(self) -> ReadRequest<Vec<u8>> {
        match self {
            Self::SmartBike2016 => smartbike2016::challenge_read_request(),
            Self::SmartBike2018 => smartbike2018::challenge_read_request(),
            Self::Electrified2018 => electrified2018::challenge_read_request(),
        }
    }

    /// The authentication write performed right after the transport is ready
    #[must_use]
    pub fn authentication_write_request(self, key: &[u8]) -> WriteRequest {
        match self {
            Self::SmartBike2016 => smartbike2016::authentication_write_request(key),
            Self::SmartBike2018 => smartbike2018::authentication_write_request(key),
            Self::Electrified2018 => electrified2018::authentication_write_request(key),
        }
    }

    /// The combined parameters read, on generations that expose one
    #[must_use]
    pub fn parameters_read_request(self) -> Option<ReadRequest<Parameters>> {
        match self {
            Self::SmartBike2016 => Some(smartbike2016::parameters_read_request()),
            Self::SmartBike2018 => None,
            Self::Electrified2018 => Some(electrified2018::parameters_read_request()),
        }
    }

    /// Read the lock state
    #[must_use]
    pub fn lock_read_request(self) -> Option<ReadRequest<Lock>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::lock_read_request()),
            _ => None,
        }
    }

    /// Read the alarm state
    #[must_use]
    pub fn alarm_read_request(self) -> Option<ReadRequest<Alarm>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::alarm_read_request()),
            _ => None,
        }
    }

    /// Read the lighting mode
    #[must_use]
    pub fn lighting_read_request(self) -> Option<ReadRequest<Lighting>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::lighting_read_request()),
            _ => None,
        }
    }

    /// Read the battery charge in percent
    #[must_use]
    pub fn battery_level_read_request(self) -> Option<ReadRequest<u8>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::battery_level_read_request()),
            _ => None,
        }
    }

    /// Read the battery charging state
    #[must_use]
    pub fn battery_state_read_request(self) -> Option<ReadRequest<BatteryState>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::battery_state_read_request()),
            _ => None,
        }
    }

    /// Read the smart module state
    #[must_use]
    pub fn module_state_read_request(self) -> Option<ReadRequest<ModuleState>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::module_state_read_request()),
            _ => None,
        }
    }

    /// Read the fault code
    #[must_use]
    pub fn error_code_read_request(self) -> Option<ReadRequest<ErrorCode>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::error_code_read_request()),
            _ => None,
        }
    }

    /// Read the muted sounds bit set
    #[must_use]
    pub fn muted_sounds_read_request(self) -> Option<ReadRequest<MutedSounds>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::muted_sounds_read_request()),
            _ => None,
        }
    }

    /// Read the current speed
    #[must_use]
    pub fn speed_read_request(self) -> Option<ReadRequest<u8>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::speed_read_request()),
            _ => None,
        }
    }

    /// Read the total distance
    #[must_use]
    pub fn distance_read_request(self) -> Option<ReadRequest<f64>> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::distance_read_request()),
            _ => None,
        }
    }

    /// Set the lock state
    #[must_use]
    pub fn lock_write_request(self, value: Lock) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2016 => Some(smartbike2016::lock_write_request(value)),
            Self::SmartBike2018 => Some(smartbike2018::lock_write_request(value)),
            Self::Electrified2018 => Some(electrified2018::lock_write_request(value)),
        }
    }

    /// Set the alarm state
    #[must_use]
    pub fn alarm_write_request(self, value: Alarm) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2016 => None,
            Self::SmartBike2018 => Some(smartbike2018::alarm_write_request(value)),
            Self::Electrified2018 => Some(electrified2018::alarm_write_request(value)),
        }
    }

    /// Set the lighting mode
    #[must_use]
    pub fn lighting_write_request(self, value: Lighting) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2016 => Some(smartbike2016::lighting_write_request(value)),
            Self::SmartBike2018 => Some(smartbike2018::lighting_write_request(value)),
            Self::Electrified2018 => Some(electrified2018::lighting_write_request(value)),
        }
    }

    /// Set motor assistance and region; the firmware takes both in one frame
    #[must_use]
    pub fn motor_assistance_write_request(
        self,
        value: MotorAssistance,
        region: Region,
    ) -> Option<WriteRequest> {
        match self {
            Self::Electrified2018 => {
                Some(electrified2018::motor_assistance_write_request(value, region))
            }
            _ => None,
        }
    }

    /// Set the muted sounds bit set
    #[must_use]
    pub fn muted_sounds_write_request(self, value: MutedSounds) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2016 => None,
            Self::SmartBike2018 => Some(smartbike2018::muted_sounds_write_request(value)),
            Self::Electrified2018 => Some(electrified2018::muted_sounds_write_request(value)),
        }
    }

    /// Play a sound on the speaker
    #[must_use]
    pub fn play_sound_write_request(self, sound: Sound, repeats: u8) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2018 => Some(smartbike2018::play_sound_write_request(sound, repeats)),
            _ => None,
        }
    }

    /// Set the smart module state
    #[must_use]
    pub fn module_state_write_request(self, value: ModuleState) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2016 => Some(smartbike2016::module_state_write_request(value)),
            Self::SmartBike2018 => Some(smartbike2018::module_state_write_request(value)),
            Self::Electrified2018 => Some(electrified2018::module_state_write_request(value)),
        }
    }

    /// Set the backup unlock code
    #[must_use]
    pub fn backup_code_write_request(self, code: u16) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2016 => None,
            Self::SmartBike2018 => Some(smartbike2018::backup_code_write_request(code)),
            Self::Electrified2018 => Some(electrified2018::backup_code_write_request(code)),
        }
    }

    /// Set the measuring unit
    #[must_use]
    pub fn unit_write_request(self, value: Unit) -> Option<WriteRequest> {
        match self {
            Self::SmartBike2016 => Some(smartbike2016::unit_write_request(value)),
            Self::SmartBike2018 => None,
            Self::Electrified2018 => Some(electrified2018::unit_write_request(value)),
        }
    }
}

/// Decode the 32 bit distance counter: little-endian, tenths of a unit.
///
/// Deployed hardware sends this field little-endian; a big-endian decode
/// produces garbage distances on every real frame.
pub(crate) fn distance_from(data: &[u8]) -> f64 {
    if data.len() < 4 {
        return 0.0;
    }
    let mut buf = data;
    f64::from(buf.get_u32_le()) / 10.0
}

/// The decimal digits of a backup code, most significant first.
pub(crate) fn backup_code_digits(code: u16) -> Vec<u8> {
    code.to_string()
        .bytes()
        .map(|digit| digit - b'0')
        .collect()
}

fn first_byte(data: Option<&[u8]>) -> Option<u8> {
    data.and_then(|frame| frame.first()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_name_roundtrip() {
        for name in [
            "SMARTBIKE_2016",
            "SMARTBIKE_2018",
            "ELECTRIFIED_2016",
            "ELECTRIFIED_2016_2017",
            "ELECTRIFIED_2017",
            "ELECTRIFIED_2018",
            "ELECTRIFIED_2020",
            "ELECTRIFIED_2023_TRACK_1",
        ] {
            assert_eq!(ProfileName::parse(name).to_string(), name);
        }
        assert_eq!(
            ProfileName::parse("electrified_2018"),
            ProfileName::Electrified2018
        );
        assert_eq!(
            ProfileName::parse("SMARTBIKE_2042"),
            ProfileName::Unknown("SMARTBIKE_2042".to_string())
        );
    }

    #[test]
    fn test_profile_mapping() {
        assert_eq!(
            BikeProfile::named(&ProfileName::SmartBike2016),
            Some(BikeProfile::SmartBike2016)
        );
        assert_eq!(
            BikeProfile::named(&ProfileName::SmartBike2018),
            Some(BikeProfile::SmartBike2018)
        );
        for name in [
            ProfileName::Electrified2016,
            ProfileName::Electrified20162017,
            ProfileName::Electrified2017,
            ProfileName::Electrified2018,
        ] {
            assert_eq!(BikeProfile::named(&name), Some(BikeProfile::Electrified2018));
        }
        assert_eq!(BikeProfile::named(&ProfileName::Electrified2020), None);
        assert_eq!(
            BikeProfile::named(&ProfileName::Unknown("WHATEVER".to_string())),
            None
        );
    }

    #[test]
    fn test_hardware_capabilities() {
        assert!(BikeProfile::SmartBike2018
            .hardware()
            .contains(Hardware::ALARM | Hardware::SPEAKER));
        assert!(!BikeProfile::SmartBike2018.hardware().contains(Hardware::MOTOR));
        assert!(BikeProfile::Electrified2018.hardware().contains(Hardware::MOTOR));
        assert!(BikeProfile::SmartBike2016.hardware().contains(Hardware::ELOCK));
    }

    #[test]
    fn test_distance_is_little_endian() {
        assert_eq!(distance_from(&[12, 34, 56, 78]), 131_230_158.0);
        assert_eq!(distance_from(&[1, 0, 0, 0]), 0.1);
        assert_eq!(distance_from(&[12, 34]), 0.0);
    }

    #[test]
    fn test_backup_code_digits() {
        assert_eq!(backup_code_digits(123), vec![1, 2, 3]);
        assert_eq!(backup_code_digits(999), vec![9, 9, 9]);
    }

    #[test]
    fn test_unsupported_requests_are_absent() {
        assert!(BikeProfile::SmartBike2016.alarm_write_request(Alarm::Off).is_none());
        assert!(BikeProfile::SmartBike2016
            .play_sound_write_request(Sound::Bell, 1)
            .is_none());
        assert!(BikeProfile::SmartBike2018.unit_write_request(Unit::Metric).is_none());
        assert!(BikeProfile::SmartBike2018
            .motor_assistance_write_request(MotorAssistance::One, Region::Eu)
            .is_none());
        assert!(BikeProfile::Electrified2018
            .play_sound_write_request(Sound::Bell, 1)
            .is_none());
        assert!(BikeProfile::Electrified2018.lock_read_request().is_none());
    }
}
