//! Per-connection replay state.
//!
//! Each connection carries a 16-bit counter that starts at zero and advances by one after every
//! decryption (or encryption) attempt, whether or not it authenticated. The counter value is folded
//! into the associated data of every message, so a ciphertext accepted at one counter value fails
//! authentication at every later value.

use trustlet_cryptography::CipherKind;

/// Length of the associated data derived from a [Counter].
pub const AAD_LENGTH: usize = 2;

/// All-zero bytes sliced to the nonce length of each cipher.
const ZERO_NONCE: [u8; 16] = [0u8; 16];

/// Returns the nonce used for command traffic under `kind`.
///
/// This is all-zero (12 bytes for AES-128-GCM, 16 bytes for Ascon-128). Per-message uniqueness
/// comes only from the counter-derived associated data.
pub fn command_nonce(kind: CipherKind) -> &'static [u8] {
    &ZERO_NONCE[..kind.nonce_length()]
}

/// A replay counter that never wraps.
///
/// Once the counter has been used at `u16::MAX`, it is exhausted and can no longer be used.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counter {
    value: u16,
    exhausted: bool,
}

impl Counter {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a live counter at `value`.
    #[cfg(test)]
    pub(crate) fn at(value: u16) -> Self {
        Self {
            value,
            exhausted: false,
        }
    }

    /// The current counter value.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Returns `true` if every counter value has been used.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Encodes the current counter value as associated data (high byte first).
    pub fn aad(&self) -> [u8; AAD_LENGTH] {
        self.value.to_be_bytes()
    }

    /// Advances the counter by 1 (to prevent reuse).
    ///
    /// Marks the counter exhausted (rather than wrapping to 0) after `u16::MAX` is used.
    pub fn advance(&mut self) {
        match self.value.checked_add(1) {
            Some(next) => self.value = next,
            None => self.exhausted = true,
        }
    }
}
