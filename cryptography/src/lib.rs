//! Seal and open authenticated messages with interchangeable AEAD ciphers.
//!
//! Callers never touch a cipher directly. Every operation goes through a [Provider], keyed by a
//! [CipherKind], a 16-byte key, a nonce, and associated data. Two kinds are supported and are
//! drop-in substitutable:
//!
//! - [CipherKind::Aes128Gcm]: a high-assurance block-cipher AEAD.
//! - [CipherKind::Ascon128]: a lightweight sponge-based AEAD.
//!
//! Both produce a detached 16-byte tag. Nonce lengths differ by kind and are validated by the
//! provider (not assumed by callers).
//!
//! # Status
//!
//! `trustlet-cryptography` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use thiserror::Error;

pub mod aead;
pub use aead::Software;
pub mod secret;
pub use secret::{ct_eq_bytes, Secret};

/// Length of every key accepted by a [Provider].
pub const KEY_LENGTH: usize = 16;

/// Length of the authentication tag produced by every [CipherKind].
pub const TAG_LENGTH: usize = 16;

/// A 16-byte symmetric key.
pub type Key = [u8; KEY_LENGTH];

/// A detached authentication tag.
pub type Tag = [u8; TAG_LENGTH];

/// Errors that can occur when sealing or opening a message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("invalid key length: {0}")]
    InvalidKeyLength(usize),
    #[error("invalid nonce length for {0}: {1}")]
    InvalidNonceLength(CipherKind, usize),
    #[error("invalid tag length: {0}")]
    InvalidTagLength(usize),
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(u8),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
}

/// The AEAD algorithm protecting a message.
///
/// The discriminant is the selector byte carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipherKind {
    /// AES-128 in Galois/Counter Mode.
    Aes128Gcm = 0,
    /// Ascon-128.
    Ascon128 = 1,
}

impl CipherKind {
    /// Nonce lengths accepted by this kind, preferred length first.
    pub const fn nonce_lengths(&self) -> &'static [usize] {
        match self {
            // 16-byte nonces are folded into the initial counter block with GHASH.
            CipherKind::Aes128Gcm => &[12, 16],
            CipherKind::Ascon128 => &[16],
        }
    }

    /// The preferred (shortest native) nonce length of this kind.
    pub const fn nonce_length(&self) -> usize {
        self.nonce_lengths()[0]
    }

    /// Returns the selector byte of this kind.
    pub const fn selector(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for CipherKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CipherKind::Aes128Gcm),
            1 => Ok(CipherKind::Ascon128),
            other => Err(Error::UnsupportedCipher(other)),
        }
    }
}

impl std::fmt::Display for CipherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherKind::Aes128Gcm => f.write_str("aes-128-gcm"),
            CipherKind::Ascon128 => f.write_str("ascon-128"),
        }
    }
}

/// A sealed message with its tag kept detached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: Tag,
}

/// Authenticated encryption with associated data.
///
/// Implementations must fail closed: [Provider::open] returns plaintext if-and-only-if the tag
/// verifies over the ciphertext and associated data.
pub trait Provider {
    /// Encrypt `plaintext` and authenticate it together with `aad`.
    fn seal(
        &self,
        kind: CipherKind,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Sealed, Error>;

    /// Verify `tag` over `ciphertext` and `aad`, then decrypt.
    fn open(
        &self,
        kind: CipherKind,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, Error>;
}
