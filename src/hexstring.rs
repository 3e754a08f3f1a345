//! Hex string conversions for encryption keys and diagnostics.

use crate::error::Result;

/// Convert a hex string into bytes, skipping any whitespace.
///
/// # Errors
///
/// Returns [`crate::BikeError::Hex`] if the string has an odd number of
/// hex digits or contains a character that is neither a hex digit nor
/// whitespace.
pub fn from_hex(string: &str) -> Result<Vec<u8>> {
    let digits: String = string.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(digits)?)
}

/// Convert bytes into a lowercase hex string.
#[must_use]
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}
