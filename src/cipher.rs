//! AES-128-ECB with zero padding, as mandated by the bike firmware.
//!
//! Every authenticated write and every encrypted read uses this exact
//! construction: the plaintext is padded with zero bytes up to the next
//! 16 byte boundary and encrypted block by block with no IV and no
//! chaining. Decryption returns the raw, still block-aligned plaintext;
//! there is no padding removal step because all fields are read by
//! position. Substituting a different mode breaks compatibility with
//! deployed hardware.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{BikeError, Result};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Required key length in bytes
pub const KEY_SIZE: usize = 16;

fn cipher_for(key: &[u8]) -> Result<Aes128> {
    Aes128::new_from_slice(key).map_err(|_| BikeError::InvalidKeySize(key.len()))
}

/// Encrypt `plain` with AES-128-ECB, zero padding to the block size.
///
/// # Errors
///
/// Returns [`BikeError::InvalidKeySize`] if `key` is not exactly 16 bytes.
pub fn encrypt(plain: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let padded = plain.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    let mut buffer = plain.to_vec();
    buffer.resize(padded, 0);
    for block in buffer.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(buffer)
}

/// Decrypt `data` with AES-128-ECB.
///
/// The result keeps its zero padding; callers know the meaningful prefix
/// length of each frame.
///
/// # Errors
///
/// Returns [`BikeError::InvalidKeySize`] if `key` is not exactly 16 bytes,
/// or [`BikeError::Decode`] if `data` is not block-aligned.
pub fn decrypt(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    if data.len() % BLOCK_SIZE != 0 {
        return Err(BikeError::Decode(format!(
            "ciphertext length {} is not a multiple of {BLOCK_SIZE}",
            data.len()
        )));
    }
    let mut buffer = data.to_vec();
    for block in buffer.chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn test_known_vector() {
        let plain = [
            0xde, 0xad, 0xbe, 0xef, 0xc0, 0xff, 0xee, 0x8b, 0xad, 0xf0, 0x0d,
        ];
        let encrypted = encrypt(&plain, &KEY).unwrap();
        assert_eq!(
            encrypted,
            vec![
                0x6d, 0x57, 0x30, 0x16, 0xbc, 0xe6, 0x83, 0xcb, 0xa2, 0xbf, 0xbf, 0x09, 0xe8,
                0xe2, 0x34, 0x50
            ]
        );
    }

    #[test]
    fn test_roundtrip_keeps_zero_padding() {
        let plain = [
            0xde, 0xad, 0xbe, 0xef, 0xc0, 0xff, 0xee, 0x8b, 0xad, 0xf0, 0x0d,
        ];
        let decrypted = decrypt(&encrypt(&plain, &KEY).unwrap(), &KEY).unwrap();
        assert_eq!(
            decrypted,
            vec![
                0xde, 0xad, 0xbe, 0xef, 0xc0, 0xff, 0xee, 0x8b, 0xad, 0xf0, 0x0d, 0x00, 0x00,
                0x00, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_roundtrip_aligned_input() {
        let plain = [0x42u8; 32];
        let decrypted = decrypt(&encrypt(&plain, &KEY).unwrap(), &KEY).unwrap();
        assert_eq!(decrypted, plain.to_vec());
    }

    #[test]
    fn test_invalid_key_size() {
        let plain = [0x01u8, 0x02];
        for key in [&b"0123456789abcde"[..], &b"0123456789abcdefg"[..]] {
            match encrypt(&plain, key) {
                Err(BikeError::InvalidKeySize(len)) => assert_eq!(len, key.len()),
                other => panic!("expected InvalidKeySize, got {other:?}"),
            }
            match decrypt(&[0u8; 16], key) {
                Err(BikeError::InvalidKeySize(len)) => assert_eq!(len, key.len()),
                other => panic!("expected InvalidKeySize, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_misaligned_ciphertext() {
        assert!(matches!(
            decrypt(&[0u8; 15], &KEY),
            Err(BikeError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        assert!(encrypt(&[], &KEY).unwrap().is_empty());
    }
}
