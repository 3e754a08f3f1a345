//! The 2018 Smart S/X.
//!
//! This generation spreads its state over many small characteristics in
//! three custom services plus the standard battery service; there is no
//! combined parameters frame. Only the challenge-response framing is
//! encrypted, the individual reads are plaintext.

use uuid::{uuid, Uuid};

use super::{first_byte, ReadRequest, WriteRequest};
use crate::types::{Alarm, BatteryState, ErrorCode, Lighting, Lock, ModuleState, MutedSounds, Sound};

pub(super) const SERVICE: Uuid = uuid!("f0005500-0451-4000-b000-000000000000");

// Security service 6acb5520
const CHALLENGE: Uuid = uuid!("6acb5522-e631-4069-944d-b8ca7598ad50");
const PASSCODE: Uuid = uuid!("6acb5523-e631-4069-944d-b8ca7598ad50");

// Settings service 6acb5510
const LIGHT: Uuid = uuid!("6acb5511-e631-4069-944d-b8ca7598ad50");
const ALARM: Uuid = uuid!("6acb5512-e631-4069-944d-b8ca7598ad50");
const BACKUP_CODE: Uuid = uuid!("6acb5515-e631-4069-944d-b8ca7598ad50");

// Command service 6acb5500
const LOCK: Uuid = uuid!("6acb5501-e631-4069-944d-b8ca7598ad50");
const DISTANCE: Uuid = uuid!("6acb5502-e631-4069-944d-b8ca7598ad50");
const SPEED: Uuid = uuid!("6acb5503-e631-4069-944d-b8ca7598ad50");
const SOUNDS: Uuid = uuid!("6acb5505-e631-4069-944d-b8ca7598ad50");
const MODULE_STATE: Uuid = uuid!("6acb5507-e631-4069-944d-b8ca7598ad50");
const ERROR_CODE: Uuid = uuid!("6acb5508-e631-4069-944d-b8ca7598ad50");

// Standard battery service
const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");
const BATTERY_POWER_STATE: Uuid = uuid!("00002a1a-0000-1000-8000-00805f9b34fb");

pub(super) fn challenge_read_request() -> ReadRequest<Vec<u8>> {
    ReadRequest {
        characteristic: CHALLENGE,
        decrypt: false,
        parse: |data| data.map(<[u8]>::to_vec),
    }
}

pub(super) fn authentication_write_request(key: &[u8]) -> WriteRequest {
    WriteRequest {
        characteristic: PASSCODE,
        command: None,
        payload: key[..12].to_vec(),
    }
}

pub(super) fn lock_read_request() -> ReadRequest<Lock> {
    ReadRequest {
        characteristic: LOCK,
        decrypt: false,
        parse: |data| {
            Some(if first_byte(data).unwrap_or(1) != 0 {
                Lock::Locked
            } else {
                Lock::Unlocked
            })
        },
    }
}

pub(super) fn alarm_read_request() -> ReadRequest<Alarm> {
    ReadRequest {
        characteristic: ALARM,
        decrypt: false,
        parse: |data| Some(Alarm::from_raw(first_byte(data).unwrap_or(0)).unwrap_or(Alarm::Off)),
    }
}

pub(super) fn lighting_read_request() -> ReadRequest<Lighting> {
    ReadRequest {
        characteristic: LIGHT,
        decrypt: false,
        parse: |data| {
            Some(Lighting::from_raw(first_byte(data).unwrap_or(0)).unwrap_or(Lighting::Automatic))
        },
    }
}

pub(super) fn battery_level_read_request() -> ReadRequest<u8> {
    ReadRequest {
        characteristic: BATTERY_LEVEL,
        decrypt: false,
        parse: |data| Some(first_byte(data).unwrap_or(0)),
    }
}

pub(super) fn battery_state_read_request() -> ReadRequest<BatteryState> {
    ReadRequest {
        characteristic: BATTERY_POWER_STATE,
        decrypt: false,
        // bits 76: overall level, bits 54: charging, bits 32: discharging,
        // bits 10: presence
        parse: |data| {
            Some(if first_byte(data).unwrap_or(0) & 0x30 == 0x30 {
                BatteryState::Charging
            } else {
                BatteryState::Discharging
            })
        },
    }
}

pub(super) fn module_state_read_request() -> ReadRequest<ModuleState> {
    ReadRequest {
        characteristic: MODULE_STATE,
        decrypt: false,
        parse: |data| {
            Some(ModuleState::from_raw(first_byte(data).unwrap_or(0)).unwrap_or(ModuleState::Off))
        },
    }
}

pub(super) fn error_code_read_request() -> ReadRequest<ErrorCode> {
    ReadRequest {
        characteristic: ERROR_CODE,
        decrypt: false,
        parse: |data| Some(ErrorCode::from_raw(data.unwrap_or(&[]))),
    }
}

pub(super) fn muted_sounds_read_request() -> ReadRequest<MutedSounds> {
    ReadRequest {
        characteristic: SOUNDS,
        decrypt: false,
        parse: |data| {
            let byte = |index: usize| data.and_then(|frame| frame.get(index)).copied().unwrap_or(0);
            let muted = (u16::from(byte(2) & 0x33) << 8) | u16::from(byte(3) & 0x33);
            Some(MutedSounds::from_raw(muted))
        },
    }
}

pub(super) fn speed_read_request() -> ReadRequest<u8> {
    ReadRequest {
        characteristic: SPEED,
        decrypt: false,
        parse: |data| Some(first_byte(data).unwrap_or(0)),
    }
}

pub(super) fn distance_read_request() -> ReadRequest<f64> {
    ReadRequest {
        characteristic: DISTANCE,
        decrypt: false,
        parse: |data| Some(super::distance_from(data.unwrap_or(&[]))),
    }
}

pub(super) fn lock_write_request(value: Lock) -> WriteRequest {
    WriteRequest {
        characteristic: LOCK,
        command: None,
        payload: vec![value as u8],
    }
}

pub(super) fn alarm_write_request(value: Alarm) -> WriteRequest {
    WriteRequest {
        characteristic: ALARM,
        command: None,
        payload: vec![value as u8],
    }
}

pub(super) fn lighting_write_request(value: Lighting) -> WriteRequest {
    WriteRequest {
        characteristic: LIGHT,
        command: None,
        payload: vec![value as u8],
    }
}

pub(super) fn muted_sounds_write_request(value: MutedSounds) -> WriteRequest {
    let raw = value.raw();
    WriteRequest {
        characteristic: SOUNDS,
        command: None,
        payload: vec![0x00, 0x00, 0x00, (raw >> 8) as u8, (raw & 0xFF) as u8],
    }
}

pub(super) fn play_sound_write_request(sound: Sound, repeats: u8) -> WriteRequest {
    WriteRequest {
        characteristic: SOUNDS,
        command: None,
        payload: vec![sound as u8, 0x00, 0x00, 0x00, repeats],
    }
}

pub(super) fn module_state_write_request(value: ModuleState) -> WriteRequest {
    WriteRequest {
        characteristic: MODULE_STATE,
        command: None,
        payload: vec![value as u8],
    }
}

pub(super) fn backup_code_write_request(code: u16) -> WriteRequest {
    WriteRequest {
        characteristic: BACKUP_CODE,
        command: None,
        payload: super::backup_code_digits(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_decode_defaults_to_locked() {
        let request = lock_read_request();
        assert_eq!((request.parse)(Some(&[0])), Some(Lock::Unlocked));
        assert_eq!((request.parse)(Some(&[1])), Some(Lock::Locked));
        assert_eq!((request.parse)(None), Some(Lock::Locked));
    }

    #[test]
    fn test_lighting_decode_defaults_to_automatic() {
        let request = lighting_read_request();
        assert_eq!((request.parse)(Some(&[2])), Some(Lighting::Off));
        assert_eq!((request.parse)(None), Some(Lighting::Automatic));
        assert_eq!((request.parse)(Some(&[9])), Some(Lighting::Automatic));
    }

    #[test]
    fn test_battery_state_decode() {
        let request = battery_state_read_request();
        assert_eq!((request.parse)(Some(&[0x30])), Some(BatteryState::Charging));
        assert_eq!((request.parse)(Some(&[0x20])), Some(BatteryState::Discharging));
        assert_eq!((request.parse)(None), Some(BatteryState::Discharging));
    }

    #[test]
    fn test_muted_sounds_roundtrip_bits() {
        let read = muted_sounds_read_request();
        assert_eq!(
            (read.parse)(Some(&[0x00, 0x00, 0x03, 0x00])),
            Some(MutedSounds::LOCK_STATE)
        );
        let write = muted_sounds_write_request(MutedSounds::LOCK_STATE);
        assert_eq!(write.payload, vec![0x00, 0x00, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn test_play_sound_payload() {
        let request = play_sound_write_request(Sound::Bell, 3);
        assert_eq!(request.payload, vec![0x07, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(request.characteristic, SOUNDS);
    }

    #[test]
    fn test_authentication_uses_first_twelve_key_bytes() {
        let key = *b"ABCDEFGHIJKLMNOP";
        let request = authentication_write_request(&key);
        assert_eq!(request.characteristic, PASSCODE);
        assert_eq!(request.command, None);
        assert_eq!(request.payload, b"ABCDEFGHIJKL".to_vec());
    }

    #[test]
    fn test_distance_decode() {
        let request = distance_read_request();
        assert_eq!((request.parse)(Some(&[12, 34, 56, 78])), Some(131_230_158.0));
        assert_eq!((request.parse)(None), Some(0.0));
    }
}
