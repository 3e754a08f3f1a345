use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hexstring;

/// The lock state of the bike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lock {
    /// The bike is currently unlocked
    Unlocked = 0,
    /// The bike is currently locked
    Locked = 1,
    /// The bike is triggered to unlock and awaits physical user interaction
    AwaitingUnlock = 2,
}

impl Lock {
    /// Convert from the wire byte
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unlocked),
            1 => Some(Self::Locked),
            2 => Some(Self::AwaitingUnlock),
            _ => None,
        }
    }

    /// The complementary lock state
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Locked => Self::Unlocked,
            _ => Self::Locked,
        }
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlocked => write!(f, "unlocked"),
            Self::Locked => write!(f, "locked"),
            Self::AwaitingUnlock => write!(f, "awaiting unlock"),
        }
    }
}

/// The lighting mode of the bike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lighting {
    /// The lights switch on or off depending on the ambient light
    Automatic = 0,
    /// The lights are always switched on
    AlwaysOn = 1,
    /// The lights are switched off
    Off = 2,
}

impl Lighting {
    /// Convert from the wire byte
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Automatic),
            1 => Some(Self::AlwaysOn),
            2 => Some(Self::Off),
            _ => None,
        }
    }
}

impl fmt::Display for Lighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::AlwaysOn => write!(f, "always on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// The anti-theft alarm state of the bike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alarm {
    /// The anti-theft device is disabled
    Off = 0,
    /// The anti-theft device has to be armed manually
    Manual = 1,
    /// The bike arms the anti-theft device automatically after a while
    Automatic = 2,
}

impl Alarm {
    /// Convert from the wire byte
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Manual),
            2 => Some(Self::Automatic),
            _ => None,
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Manual => write!(f, "manual"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

/// The state of the battery
///
/// For bikes with a motor this refers to the motor battery, otherwise to
/// the smart module battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryState {
    /// The battery is currently discharging
    Discharging = 0,
    /// The battery is currently charging
    Charging = 1,
}

impl fmt::Display for BatteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discharging => write!(f, "discharging"),
            Self::Charging => write!(f, "charging"),
        }
    }
}

/// The state of the bike's smart module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// The module is on
    On = 0,
    /// The module is off
    Off = 1,
    /// The bike is in shipping mode
    Shipping = 2,
    /// The module is in standby
    Standby = 3,
    /// The anti-theft device triggered once
    AlarmOne = 4,
    /// The anti-theft device triggered twice
    AlarmTwo = 5,
    /// The anti-theft device triggered thrice
    AlarmThree = 6,
    /// The module is sleeping
    Sleeping = 7,
    /// The module is tracking the bike's location
    Tracking = 8,
}

impl ModuleState {
    /// Convert from the wire byte
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::On),
            1 => Some(Self::Off),
            2 => Some(Self::Shipping),
            3 => Some(Self::Standby),
            4 => Some(Self::AlarmOne),
            5 => Some(Self::AlarmTwo),
            6 => Some(Self::AlarmThree),
            7 => Some(Self::Sleeping),
            8 => Some(Self::Tracking),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
            Self::Shipping => write!(f, "shipping"),
            Self::Standby => write!(f, "standby"),
            Self::AlarmOne => write!(f, "alarm stage one"),
            Self::AlarmTwo => write!(f, "alarm stage two"),
            Self::AlarmThree => write!(f, "alarm stage three"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Tracking => write!(f, "tracking"),
        }
    }
}

/// The level of motor assistance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MotorAssistance {
    /// Motor assistance is switched off
    Off = 0,
    /// Level 1
    One = 1,
    /// Level 2
    Two = 2,
    /// Level 3
    Three = 3,
    /// Level 4
    Four = 4,
}

impl MotorAssistance {
    /// Convert from the wire byte
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            _ => None,
        }
    }
}

impl fmt::Display for MotorAssistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", *self as u8)
    }
}

/// The region the bike is configured for; implicitly sets the speed limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    /// European Union, 25 km/h
    Eu = 0,
    /// United States, 32 km/h
    Us = 1,
    /// Offroad, 37 km/h
    Offroad = 2,
    /// Japan, 24 km/h
    Japan = 3,
}

impl Region {
    /// Convert from the wire byte
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Eu),
            1 => Some(Self::Us),
            2 => Some(Self::Offroad),
            3 => Some(Self::Japan),
            _ => None,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eu => write!(f, "eu"),
            Self::Us => write!(f, "us"),
            Self::Offroad => write!(f, "offroad"),
            Self::Japan => write!(f, "japan"),
        }
    }
}

/// The measuring unit used for speed and distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// km/h and km
    Metric = 0,
    /// mph and miles
    Imperial = 1,
}

impl Unit {
    /// Convert from the wire byte
    #[must_use]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Metric),
            1 => Some(Self::Imperial),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric => write!(f, "metric"),
            Self::Imperial => write!(f, "imperial"),
        }
    }
}

/// A sound the bike's speaker can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sound {
    /// Played when an option got selected
    Selection = 0x01,
    /// Played when an action turned out not ok
    NegativeBeep = 0x02,
    /// Played when an action turned out ok
    AffirmativeBeep = 0x03,
    /// Short countdown tick
    ShortCountdown = 0x04,
    /// Long countdown tick
    LongCountdown = 0x05,
    /// Played when beginning the manual disarm sequence
    BeginDisarm = 0x06,
    /// Soft bell
    Bell = 0x07,
    /// Hard bell
    Horn = 0x08,
    /// Played when the bike got locked
    Lock = 0x09,
    /// Played when the bike got unlocked
    Unlock = 0x0A,
    /// Anti-theft alarm sound
    Alarm1 = 0x0B,
    /// Anti-theft alarm sound
    Alarm2 = 0x0C,
    /// Played when the bike wakes up
    Wakeup = 0x0D,
    /// Played when the bike shuts down
    Sleep = 0x0E,
}

/// The set of sounds that are muted, provided the bike has a speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutedSounds(u16);

impl MutedSounds {
    /// No sound at all
    pub const NONE: Self = Self(0);
    /// Feedback to configuration changes
    pub const FEEDBACK: Self = Self(1 << 0);
    /// The lock timer tick
    pub const TIMER: Self = Self(1 << 3);
    /// The sound that signals the bike got locked
    pub const LOCK: Self = Self(1 << 8);
    /// The sound that signals the bike got unlocked
    pub const UNLOCK: Self = Self(1 << 9);
    /// The sound that signals the bike wakes up from sleep
    pub const WAKEUP: Self = Self(1 << 12);
    /// The sound that signals the bike shuts down
    pub const SLEEP: Self = Self(1 << 13);
    /// All sounds related to the module state
    pub const MODULE_STATE: Self = Self(Self::WAKEUP.0 | Self::SLEEP.0);
    /// All sounds related to the lock
    pub const LOCK_STATE: Self = Self(Self::LOCK.0 | Self::UNLOCK.0);
    /// All sounds
    pub const ALL: Self =
        Self(Self::FEEDBACK.0 | Self::TIMER.0 | Self::LOCK_STATE.0 | Self::MODULE_STATE.0);

    /// Construct from the raw wire bit mask
    #[must_use]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// The raw wire bit mask
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Check whether every sound in `other` is muted
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The union of both mute sets
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for MutedSounds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for MutedSounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(MutedSounds, &str); 6] = [
            (MutedSounds::FEEDBACK, "feedback"),
            (MutedSounds::TIMER, "timer"),
            (MutedSounds::LOCK, "lock"),
            (MutedSounds::UNLOCK, "unlock"),
            (MutedSounds::WAKEUP, "wakeup"),
            (MutedSounds::SLEEP, "sleep"),
        ];
        if *self == Self::NONE {
            return write!(f, "none");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(", "))
    }
}

/// A fault code reported by the bike
///
/// Holds the raw bytes as received; a small set of known vendor codes
/// prints by name, everything else prints as hex.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorCode(Vec<u8>);

impl ErrorCode {
    /// An empty error code, used before the first read
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Construct from a single fault code byte
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        Self(vec![code])
    }

    /// Construct from a raw characteristic frame
    #[must_use]
    pub fn from_raw(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    /// The raw bytes as received from the bike
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0.as_slice() {
            [0] => "no error",
            [1] => "motor stalled",
            [2] => "over voltage",
            [3] => "under voltage",
            [4] => "motor fast",
            [6] => "over current",
            [7] => "torque abnormal",
            [8] => "torque initial abnormal",
            [9] => "over temperature",
            [16] => "hall arrangement mismatch",
            [25] => "i2c bus error",
            [26] => "gsm uart timeout",
            [27] => "controller uart timeout",
            [28] => "gsm registration failure",
            [29] => "no battery output",
            raw => return write!(f, "{}", hexstring::to_hex(raw)),
        };
        write!(f, "{name}")
    }
}

/// One decoded snapshot of every parameter a profile exposes
///
/// Produced either by the combined parameters read on bikes that have one,
/// or assembled from individual characteristic reads on bikes that do not.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Alarm state, absent on hardware without an anti-theft device
    pub alarm: Option<Alarm>,
    /// Smart module state
    pub module_state: ModuleState,
    /// Lock state
    pub lock: Lock,
    /// Battery charging state
    pub battery_state: BatteryState,
    /// Current speed
    pub speed: u8,
    /// Motor battery charge in percent, absent without a motor
    pub motor_battery_level: Option<u8>,
    /// Smart module battery charge in percent
    pub module_battery_level: u8,
    /// Lighting mode
    pub lighting: Lighting,
    /// Measuring unit, absent when the generation does not report one
    pub unit: Option<Unit>,
    /// Motor assistance level, absent without a motor
    pub motor_assistance: Option<MotorAssistance>,
    /// Region, absent when the generation does not report one
    pub region: Option<Region>,
    /// Muted sounds bit set
    pub muted_sounds: MutedSounds,
    /// Total distance in km (or miles, depending on `unit`)
    pub distance: f64,
    /// Current fault code
    pub error_code: ErrorCode,
}

impl Parameters {
    /// The battery level to publish: the motor battery when the bike has
    /// one, the module battery otherwise.
    #[must_use]
    pub fn battery_level(&self) -> u8 {
        self.motor_battery_level.unwrap_or(self.module_battery_level)
    }
}

/// The live, decoded view of the bike's state
///
/// Owned by the session and updated from reads and notifications. The
/// values are authoritative once a ready session has completed its first
/// full parameter read; they persist across reconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct BikeState {
    /// Lock state
    pub lock: Lock,
    /// Alarm state, absent on hardware without an anti-theft device
    pub alarm: Option<Alarm>,
    /// Lighting mode
    pub lighting: Lighting,
    /// Battery charge in percent
    pub battery_level: u8,
    /// Battery charging state
    pub battery_state: BatteryState,
    /// Smart module state
    pub module_state: ModuleState,
    /// Current fault code
    pub error_code: ErrorCode,
    /// Motor assistance level, absent without a motor
    pub motor_assistance: Option<MotorAssistance>,
    /// Muted sounds bit set
    pub muted_sounds: MutedSounds,
    /// Current speed
    pub speed: u8,
    /// Total distance
    pub distance: f64,
    /// Region, absent until first reported
    pub region: Option<Region>,
    /// Measuring unit, absent until first reported
    pub unit: Option<Unit>,
}

impl Default for BikeState {
    fn default() -> Self {
        Self {
            lock: Lock::Locked,
            alarm: None,
            lighting: Lighting::Off,
            battery_level: 0,
            battery_state: BatteryState::Discharging,
            module_state: ModuleState::Off,
            error_code: ErrorCode::new(),
            motor_assistance: None,
            muted_sounds: MutedSounds::NONE,
            speed: 0,
            distance: 0.0,
            region: None,
            unit: None,
        }
    }
}
