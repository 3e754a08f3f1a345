//! The 2016 SmartBike.
//!
//! Same service table as the Electrified line, but a shorter
//! authentication payload, a simpler parameters layout and no alarm,
//! speaker or motor hardware.

use uuid::{uuid, Uuid};

use super::{ReadRequest, WriteRequest};
use crate::types::{
    BatteryState, ErrorCode, Lighting, Lock, ModuleState, MutedSounds, Parameters, Region, Unit,
};

pub(super) const SERVICE: Uuid = uuid!("8e7f1a50-087a-44c9-b292-a2c628fdd9aa");

const CHALLENGE: Uuid = uuid!("8e7f1a51-087a-44c9-b292-a2c628fdd9aa");
const FUNCTIONS: Uuid = uuid!("8e7f1a53-087a-44c9-b292-a2c628fdd9aa");
const PARAMETERS: Uuid = uuid!("8e7f1a54-087a-44c9-b292-a2c628fdd9aa");

const SET_PASSCODE: u8 = 1;
const SET_MODULE_STATE: u8 = 2;
const REQUEST_LOCK: u8 = 3;
const SET_LIGHTING: u8 = 5;
const SET_UNIT: u8 = 7;

pub(super) fn challenge_read_request() -> ReadRequest<Vec<u8>> {
    ReadRequest {
        characteristic: CHALLENGE,
        decrypt: false,
        parse: |data| data.map(<[u8]>::to_vec),
    }
}

pub(super) fn authentication_write_request(key: &[u8]) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_PASSCODE),
        payload: key[..6].to_vec(),
    }
}

pub(super) fn parameters_read_request() -> ReadRequest<Parameters> {
    ReadRequest {
        characteristic: PARAMETERS,
        decrypt: true,
        parse: |data| {
            let data = data?;
            if data.len() < 16 {
                return None;
            }

            Some(Parameters {
                alarm: None,
                module_state: if data[2] == 1 {
                    ModuleState::On
                } else {
                    ModuleState::Standby
                },
                lock: if data[3] == 1 {
                    Lock::Locked
                } else {
                    Lock::Unlocked
                },
                battery_state: if data[15] & 0x01 == 0x01 {
                    BatteryState::Charging
                } else {
                    BatteryState::Discharging
                },
                speed: data[4],
                motor_battery_level: None,
                module_battery_level: data[6],
                lighting: Lighting::from_raw(data[7]).unwrap_or(Lighting::Off),
                unit: Some(Unit::from_raw(data[10]).unwrap_or(Unit::Metric)),
                motor_assistance: None,
                region: Some(Region::from_raw(data[9]).unwrap_or(Region::Offroad)),
                muted_sounds: MutedSounds::NONE,
                distance: super::distance_from(&data[11..15]),
                error_code: ErrorCode::from_code((data[15] & 0xF8) >> 3),
            })
        },
    }
}

pub(super) fn lock_write_request(value: Lock) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(REQUEST_LOCK),
        payload: vec![value as u8],
    }
}

pub(super) fn lighting_write_request(value: Lighting) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_LIGHTING),
        payload: vec![value as u8],
    }
}

pub(super) fn module_state_write_request(value: ModuleState) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_MODULE_STATE),
        payload: vec![value as u8],
    }
}

pub(super) fn unit_write_request(value: Unit) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_UNIT),
        payload: vec![value as u8],
    }
}
