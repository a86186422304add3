//! A wrapper type for secret values that prevents accidental leakage.
//!
//! `Secret<T>` provides the following guarantees:
//! - Debug and Display always show `[REDACTED]` instead of the actual value
//! - The inner value is zeroized on drop
//! - Access to the inner value requires an explicit `expose()` call
//!
//! Memory locking and page protection belong to the platform's secure allocator and are not
//! provided here.

use core::fmt::{Debug, Display, Formatter};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Constant-time equality comparison for byte slices.
///
/// XORs all bytes together and checks if the result is zero.
/// This prevents timing attacks by always comparing all bytes.
#[inline]
pub fn ct_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// A wrapper for secret values that prevents accidental leakage.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Creates a new `Secret` wrapping the given value.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Exposes the secret value for use.
    ///
    /// # Warning
    ///
    /// This method should be used sparingly and only when the secret
    /// value is actually needed for cryptographic operations. The returned
    /// reference must not be copied into memory that outlives the call.
    #[inline]
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Exposes the secret value mutably.
    ///
    /// # Warning
    ///
    /// This method should be used sparingly and only when mutable access
    /// to the secret value is actually needed (e.g. to fill it in place).
    #[inline]
    pub fn expose_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: Zeroize> Debug for Secret<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> Display for Secret<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize> ZeroizeOnDrop for Secret<T> {}
