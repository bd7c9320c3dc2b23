//! IV-prefixed single-block AES-256-CBC frame sealing.
//!
//! The command path is end-to-end encrypted: a client seals a 16-byte
//! command frame under the shared key with a fresh IV, the relay opens it to
//! record and route the command, then re-seals it with the same IV for the
//! device. A sealed block is always `IV (16 bytes) ++ ciphertext (one
//! 16-byte block)` — 32 bytes total. Payloads are exactly one cipher block,
//! so no padding scheme exists on the wire; any other length is rejected
//! rather than guessed at.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use thiserror::Error;

use crate::protocol::messages::{FRAME_LEN, SEALED_LEN};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES-256 key size in bytes.
pub const KEY_LEN: usize = 32;

/// CBC initialisation vector size in bytes.
pub const IV_LEN: usize = 16;

/// Errors from sealing or opening a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    /// The plaintext is not exactly one cipher block.
    #[error("payload must be exactly {FRAME_LEN} bytes (one cipher block), got {got}")]
    BadPayloadLength { got: usize },

    /// The sealed input is not IV + exactly one ciphertext block.
    #[error("sealed frame must be exactly {SEALED_LEN} bytes (IV plus one block), got {got}")]
    BadFrameLength { got: usize },
}

/// Seals one 16-byte frame under `key` with `iv`.
///
/// Returns the IV bytes followed by the single ciphertext block.
///
/// # Errors
///
/// Returns [`SealError::BadPayloadLength`] unless `payload` is exactly one
/// cipher block.
pub fn seal(
    payload: &[u8],
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<[u8; SEALED_LEN], SealError> {
    if payload.len() != FRAME_LEN {
        return Err(SealError::BadPayloadLength { got: payload.len() });
    }

    let mut block = GenericArray::clone_from_slice(payload);
    let mut enc = Aes256CbcEnc::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(iv),
    );
    enc.encrypt_block_mut(&mut block);

    let mut sealed = [0u8; SEALED_LEN];
    sealed[..IV_LEN].copy_from_slice(iv);
    sealed[IV_LEN..].copy_from_slice(&block);
    Ok(sealed)
}

/// Opens a sealed frame: splits the leading IV and decrypts the single block.
///
/// Returns `(iv, payload)` so the caller can re-seal under the same IV.
///
/// # Errors
///
/// Returns [`SealError::BadFrameLength`] unless `sealed` is exactly
/// [`SEALED_LEN`] bytes.
pub fn open(
    sealed: &[u8],
    key: &[u8; KEY_LEN],
) -> Result<([u8; IV_LEN], [u8; FRAME_LEN]), SealError> {
    if sealed.len() != SEALED_LEN {
        return Err(SealError::BadFrameLength { got: sealed.len() });
    }

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&sealed[..IV_LEN]);

    let mut block = GenericArray::clone_from_slice(&sealed[IV_LEN..]);
    let mut dec = Aes256CbcDec::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(&iv),
    );
    dec.decrypt_block_mut(&mut block);

    let mut payload = [0u8; FRAME_LEN];
    payload.copy_from_slice(&block);
    Ok((iv, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];
    const IV: [u8; IV_LEN] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, //
        0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    ];

    #[test]
    fn test_seal_open_round_trip() {
        let payload = *b"0123456789abcdef";
        let sealed = seal(&payload, &KEY, &IV).unwrap();
        let (iv, opened) = open(&sealed, &KEY).unwrap();
        assert_eq!(iv, IV);
        assert_eq!(opened, payload);
    }

    #[test]
    fn test_sealed_frame_is_iv_plus_one_block() {
        let sealed = seal(&[0u8; FRAME_LEN], &KEY, &IV).unwrap();
        assert_eq!(sealed.len(), SEALED_LEN);
        assert_eq!(&sealed[..IV_LEN], &IV);
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let payload = [0x11u8; FRAME_LEN];
        let sealed = seal(&payload, &KEY, &IV).unwrap();
        assert_ne!(&sealed[IV_LEN..], &payload);
    }

    #[test]
    fn test_different_iv_produces_different_ciphertext() {
        let payload = [0x11u8; FRAME_LEN];
        let a = seal(&payload, &KEY, &IV).unwrap();
        let b = seal(&payload, &KEY, &[0xFF; IV_LEN]).unwrap();
        assert_ne!(a[IV_LEN..], b[IV_LEN..]);
    }

    #[test]
    fn test_wrong_key_does_not_recover_plaintext() {
        let payload = *b"0123456789abcdef";
        let sealed = seal(&payload, &KEY, &IV).unwrap();
        let (_, opened) = open(&sealed, &[0x43; KEY_LEN]).unwrap();
        assert_ne!(opened, payload);
    }

    #[test]
    fn test_seal_rejects_wrong_payload_length() {
        assert_eq!(
            seal(&[0u8; 8], &KEY, &IV),
            Err(SealError::BadPayloadLength { got: 8 })
        );
        assert_eq!(
            seal(&[0u8; 32], &KEY, &IV),
            Err(SealError::BadPayloadLength { got: 32 })
        );
    }

    #[test]
    fn test_open_rejects_wrong_frame_length() {
        // Historical captures sometimes claim a double-length ciphertext;
        // those are rejected, not reinterpreted.
        assert_eq!(
            open(&[0u8; 64], &KEY),
            Err(SealError::BadFrameLength { got: 64 })
        );
        assert_eq!(
            open(&[0u8; FRAME_LEN], &KEY),
            Err(SealError::BadFrameLength { got: FRAME_LEN })
        );
    }
}
