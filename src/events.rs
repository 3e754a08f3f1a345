//! Typed event channel for session observers.
//!
//! The session republishes every decoded state change, connection state
//! transition and asynchronous failure on a single broadcast channel.
//! A field event fires on every successful decode, even when the value
//! did not change; optional fields that decode to no value do not fire.

use tokio::sync::broadcast;

use crate::manager::ConnectionState;
use crate::types::{
    Alarm, BatteryState, ErrorCode, Lighting, Lock, ModuleState, MotorAssistance, MutedSounds,
    Region, Unit,
};

/// A single decoded field update
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// Lock state changed
    Lock(Lock),
    /// Alarm state changed
    Alarm(Alarm),
    /// Lighting mode changed
    Lighting(Lighting),
    /// Battery charge in percent changed
    BatteryLevel(u8),
    /// Battery charging state changed
    BatteryState(BatteryState),
    /// Smart module state changed
    ModuleState(ModuleState),
    /// Fault code changed
    ErrorCode(ErrorCode),
    /// Motor assistance level changed
    MotorAssistance(MotorAssistance),
    /// Muted sounds bit set changed
    MutedSounds(MutedSounds),
    /// Speed changed
    Speed(u8),
    /// Total distance changed
    Distance(f64),
    /// Region changed
    Region(Region),
    /// Measuring unit changed
    Unit(Unit),
}

/// An event emitted by a bike session
#[derive(Debug, Clone)]
pub enum BikeEvent {
    /// The connection state machine moved to a new state
    ConnectionState(ConnectionState),
    /// An asynchronous operation failed outside a caller's await
    Error(String),
    /// A field decoded successfully from a read or a notification
    StateChanged(StateChange),
}

/// Receiver half of the session event channel
pub type EventReceiver = broadcast::Receiver<BikeEvent>;

pub(crate) type EventSender = broadcast::Sender<BikeEvent>;

pub(crate) fn channel() -> EventSender {
    broadcast::channel(64).0
}
