//! The Electrified line (S2/X2 and the 2016 - 2017 Electrified S/X).
//!
//! All state lives in one encrypted parameters frame and all writes are
//! multiplexed over a single functions characteristic, discriminated by a
//! command byte.

use uuid::{uuid, Uuid};

use super::{ReadRequest, WriteRequest};
use crate::types::{
    Alarm, BatteryState, ErrorCode, Lighting, Lock, ModuleState, MotorAssistance, MutedSounds,
    Parameters, Region, Unit,
};

pub(super) const SERVICE: Uuid = uuid!("8e7f1a50-087a-44c9-b292-a2c628fdd9aa");

const CHALLENGE: Uuid = uuid!("8e7f1a51-087a-44c9-b292-a2c628fdd9aa");
const FUNCTIONS: Uuid = uuid!("8e7f1a53-087a-44c9-b292-a2c628fdd9aa");
const PARAMETERS: Uuid = uuid!("8e7f1a54-087a-44c9-b292-a2c628fdd9aa");

const SET_PASSCODE: u8 = 1;
const SET_MODULE_STATE: u8 = 2;
const REQUEST_LOCK: u8 = 3;
const SET_MOTOR_ASSISTANCE: u8 = 4;
const SET_LIGHTING: u8 = 5;
const SET_SOUND: u8 = 6;
const SET_UNIT: u8 = 7;
const SET_BACKUP_CODE: u8 = 0x0B;
const SET_ALARM: u8 = 0x0F;

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
        payload: key[..12].to_vec(),
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

            let is_tracking = data[2] & 16 != 0;
            let is_sleeping = data[2] & 32 != 0;
            let module_state = if data[2] & 1 == 1 {
                ModuleState::On
            } else if is_tracking {
                ModuleState::Tracking
            } else if is_sleeping {
                ModuleState::Sleeping
            } else {
                ModuleState::Standby
            };

            Some(Parameters {
                alarm: Some(Alarm::from_raw((data[2] & 14) >> 1).unwrap_or(Alarm::Automatic)),
                module_state,
                lock: if data[3] & 2 == 2 {
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
                motor_battery_level: Some(data[5]),
                module_battery_level: data[6],
                lighting: Lighting::from_raw(data[7] & 3).unwrap_or(Lighting::Off),
                unit: Some(Unit::from_raw((data[7] & 4) >> 2).unwrap_or(Unit::Metric)),
                motor_assistance: Some(
                    MotorAssistance::from_raw((data[8] & 0x1C) >> 2).unwrap_or(MotorAssistance::Off),
                ),
                region: Some(Region::from_raw(data[8] & 3).unwrap_or(Region::Offroad)),
                muted_sounds: MutedSounds::from_raw(u16::from(data[10]) << 6),
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

pub(super) fn alarm_write_request(value: Alarm) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_ALARM),
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

pub(super) fn motor_assistance_write_request(
    value: MotorAssistance,
    region: Region,
) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_MOTOR_ASSISTANCE),
        payload: vec![value as u8, region as u8],
    }
}

pub(super) fn muted_sounds_write_request(value: MutedSounds) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_SOUND),
        payload: vec![0x00, (value.raw() >> 6) as u8],
    }
}

pub(super) fn module_state_write_request(value: ModuleState) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_MODULE_STATE),
        payload: vec![value as u8],
    }
}

pub(super) fn backup_code_write_request(code: u16) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_BACKUP_CODE),
        payload: super::backup_code_digits(code),
    }
}

pub(super) fn unit_write_request(value: Unit) -> WriteRequest {
    WriteRequest {
        characteristic: FUNCTIONS,
        command: Some(SET_UNIT),
        payload: vec![value as u8],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> [u8; 16] {
        [
            0x00,
            0x00,
            0x01 | (Alarm::Automatic as u8) << 1,
            0x02,
            0x23,
            0x42,
            0x47,
            Lighting::AlwaysOn as u8 | (Unit::Imperial as u8) << 2,
            (MotorAssistance::Three as u8) << 2 | Region::Us as u8,
            0x00,
            (MutedSounds::LOCK_STATE.raw() >> 6) as u8,
            12,
            34,
            56,
            78,
            28 << 3 | 0x01,
        ]
    }

    #[test]
    fn test_parameters_decode() {
        let request = parameters_read_request();
        assert!(request.decrypt);

        let parameters = (request.parse)(Some(&frame())).unwrap();
        assert_eq!(parameters.module_state, ModuleState::On);
        assert_eq!(parameters.alarm, Some(Alarm::Automatic));
        assert_eq!(parameters.lock, Lock::Locked);
        assert_eq!(parameters.speed, 0x23);
        assert_eq!(parameters.motor_battery_level, Some(0x42));
        assert_eq!(parameters.module_battery_level, 0x47);
        assert_eq!(parameters.battery_level(), 0x42);
        assert_eq!(parameters.lighting, Lighting::AlwaysOn);
        assert_eq!(parameters.unit, Some(Unit::Imperial));
        assert_eq!(parameters.motor_assistance, Some(MotorAssistance::Three));
        assert_eq!(parameters.region, Some(Region::Us));
        assert_eq!(parameters.muted_sounds, MutedSounds::LOCK_STATE);
        assert_eq!(parameters.distance, 131_230_158.0);
        assert_eq!(parameters.error_code, ErrorCode::from_code(28));
        assert_eq!(parameters.battery_state, BatteryState::Charging);
    }

    #[test]
    fn test_parameters_module_state_bits() {
        let request = parameters_read_request();
        let mut tracking = frame();
        tracking[2] = 16;
        assert_eq!(
            (request.parse)(Some(&tracking)).unwrap().module_state,
            ModuleState::Tracking
        );
        let mut sleeping = frame();
        sleeping[2] = 32;
        assert_eq!(
            (request.parse)(Some(&sleeping)).unwrap().module_state,
            ModuleState::Sleeping
        );
        let mut standby = frame();
        standby[2] = 0;
        assert_eq!(
            (request.parse)(Some(&standby)).unwrap().module_state,
            ModuleState::Standby
        );
    }

    #[test]
    fn test_parameters_rejects_short_frame() {
        let request = parameters_read_request();
        assert_eq!((request.parse)(Some(&[0u8; 15])), None);
        assert_eq!((request.parse)(None), None);
    }

    #[test]
    fn test_authentication_command_and_payload() {
        let key = *b"ABCDEFGHIJKLMNOP";
        let request = authentication_write_request(&key);
        assert_eq!(request.characteristic, FUNCTIONS);
        assert_eq!(request.command, Some(SET_PASSCODE));
        assert_eq!(request.payload, b"ABCDEFGHIJKL".to_vec());
    }

    #[test]
    fn test_muted_sounds_write_shifts_by_six() {
        let request = muted_sounds_write_request(MutedSounds::LOCK_STATE);
        assert_eq!(request.payload, vec![0x00, 0x0C]);
    }

    #[test]
    fn test_motor_assistance_write_couples_region() {
        let request = motor_assistance_write_request(MotorAssistance::Two, Region::Japan);
        assert_eq!(request.command, Some(SET_MOTOR_ASSISTANCE));
        assert_eq!(request.payload, vec![2, 3]);
    }
}
