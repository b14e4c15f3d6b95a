//! Content decryption module seam
//!
//! The player never looks inside a CDM. It hands one to the decode threads,
//! which pass it to [`EncodedFrame::decrypt`](crate::frames::EncodedFrame::decrypt)
//! one protected region at a time.

use crate::error::MediaResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Cipher mode a protected region is encrypted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionScheme {
    /// AES-128 in counter mode ('cenc' and 'cens')
    AesCtr,
    /// AES-128 in cipher-block-chaining mode ('cbc1' and 'cbcs')
    AesCbc,
}

/// Pattern encryption: of every `crypt_byte_block + skip_byte_block` blocks,
/// the first `crypt_byte_block` are encrypted. All zero means every block is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionPattern {
    /// Encrypted blocks per pattern
    pub crypt_byte_block: u32,
    /// Clear blocks per pattern
    pub skip_byte_block: u32,
}

impl EncryptionPattern {
    /// Create a new pattern
    pub fn new(crypt_byte_block: u32, skip_byte_block: u32) -> Self {
        Self {
            crypt_byte_block,
            skip_byte_block,
        }
    }

    /// True when no pattern is in use
    pub fn is_none(&self) -> bool {
        self.crypt_byte_block == 0 && self.skip_byte_block == 0
    }
}

/// Opaque key system handle.
///
/// `decrypt` returns [`MediaError::KeyNotFound`](crate::error::MediaError::KeyNotFound)
/// while the key for `key_id` has not been delivered yet.
pub trait Cdm: Send + Sync + fmt::Debug {
    /// Key system name, e.g. `org.w3.clearkey`
    fn key_system(&self) -> &str;

    /// Decrypt one protected region.
    ///
    /// `block_offset` is the offset into the current AES block at which
    /// `src` starts; it is non-zero only for counter mode.
    fn decrypt(
        &self,
        scheme: EncryptionScheme,
        pattern: EncryptionPattern,
        block_offset: usize,
        key_id: &[u8],
        iv: &[u8],
        src: &[u8],
    ) -> MediaResult<Vec<u8>>;
}
