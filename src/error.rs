use thiserror::Error;

/// Errors that can occur when working with VanMoof bikes
#[derive(Error, Debug)]
pub enum BikeError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No peripheral with the given identifier could be found
    #[error("No bike with the given identifier could be found")]
    PeripheralNotFound,

    /// Scanning did not find a matching peripheral in time
    #[error("No bike could be found via bluetooth in a reasonable time")]
    Timeout,

    /// The application is not authorized to use bluetooth
    #[error("Bluetooth needs to be enabled for this application in the settings")]
    Unauthorized,

    /// The local adapter does not support bluetooth low energy
    #[error("This device does not support bluetooth")]
    Unsupported,

    /// The bluetooth adapter is switched off
    #[error("Bluetooth is currently switched off")]
    PoweredOff,

    /// The peripheral is not connected or did disconnect
    #[error("The bike is disconnected")]
    Disconnected,

    /// A read, write or subscription targeted a characteristic the
    /// peripheral does not expose
    #[error("Characteristic {0} could not be found")]
    CharacteristicNotFound(uuid::Uuid),

    /// A scan is already in flight on this scanner
    #[error("The scanner is busy")]
    Busy,

    /// The bike's profile name maps to no supported hardware generation
    #[error("This bike is currently not supported")]
    BikeNotSupported,

    /// A command was issued while the connection was not ready
    #[error("The bike is currently not connected")]
    NotConnected,

    /// The mac address is not in MAC-48 format
    #[error("Invalid mac address: {0:?}")]
    InvalidMacAddress(String),

    /// The encryption key is not a 32 character hexadecimal string
    #[error("The encryption key must be 16 bytes, as a hexadecimal string")]
    InvalidEncryptionKey,

    /// The cipher was handed a key that is not exactly 16 bytes long
    #[error("Invalid key size: {0} bytes, expected 16")]
    InvalidKeySize(usize),

    /// The backup code is outside 111..=999 or contains a zero digit
    #[error("Invalid backup code {0}: must be 111 to 999 without zero digits")]
    InvalidBackupCode(u16),

    /// Hex string decoding failed
    #[error("Invalid hex string: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A frame from the bike could not be decoded
    #[error("Failed to decode frame: {0}")]
    Decode(String),
}

/// Result type for bike operations
pub type Result<T> = std::result::Result<T, BikeError>;

impl BikeError {
    /// Check if this error indicates a connectivity problem
    ///
    /// Connectivity failures during steady state trigger automatic
    /// reconnection rather than terminating the session.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::PeripheralNotFound
                | Self::Timeout
                | Self::Unauthorized
                | Self::Unsupported
                | Self::PoweredOff
                | Self::Disconnected
                | Self::CharacteristicNotFound(_)
                | Self::Busy
        )
    }

    /// Check if this error was rejected locally, before any transport I/O
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMacAddress(_)
                | Self::InvalidEncryptionKey
                | Self::InvalidKeySize(_)
                | Self::InvalidBackupCode(_)
        )
    }
}
