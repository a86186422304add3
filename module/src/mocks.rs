//! Mock implementations for testing.

use crate::{attestation, Error};
use std::cell::Cell;
use trustlet_cryptography::{self as cryptography, CipherKind, Provider as _, Sealed, Software};
use zeroize::Zeroizing;

enum Behavior {
    Issue(Vec<u8>),
    Unreachable,
}

/// An attestation authority with scripted behavior.
pub struct Authority {
    behavior: Behavior,
    calls: usize,
}

impl Authority {
    /// An authority that issues `key`.
    pub fn new(key: [u8; 16]) -> Self {
        Self {
            behavior: Behavior::Issue(key.to_vec()),
            calls: 0,
        }
    }

    /// An authority that cannot be contacted.
    pub fn unreachable() -> Self {
        Self {
            behavior: Behavior::Unreachable,
            calls: 0,
        }
    }

    /// An authority that issues key material of `len` bytes.
    pub fn malformed(len: usize) -> Self {
        Self {
            behavior: Behavior::Issue(vec![0xee; len]),
            calls: 0,
        }
    }

    /// Number of times the module key was requested.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl attestation::Authority for Authority {
    fn module_key(&mut self) -> Result<Zeroizing<Vec<u8>>, Error> {
        self.calls += 1;
        match &self.behavior {
            Behavior::Issue(key) => Ok(Zeroizing::new(key.clone())),
            Behavior::Unreachable => Err(Error::AuthorityUnreachable(
                "attestation service refused connection".into(),
            )),
        }
    }
}

/// A [cryptography::Provider] that defers to [Software] until told to misbehave.
#[derive(Default)]
pub struct Provider {
    seals: Cell<usize>,
    fail_seal_at: Option<usize>,
    truncate_open: Option<usize>,
}

impl Provider {
    /// Fail the `n`th call to `seal` (counting from 1) and every call after it.
    pub fn fail_seal_at(n: usize) -> Self {
        Self {
            fail_seal_at: Some(n),
            ..Self::default()
        }
    }

    /// Return only the first `len` bytes of every opened plaintext.
    pub fn truncate_open(len: usize) -> Self {
        Self {
            truncate_open: Some(len),
            ..Self::default()
        }
    }

    /// Number of times `seal` was called.
    pub fn seals(&self) -> usize {
        self.seals.get()
    }
}

impl cryptography::Provider for Provider {
    fn seal(
        &self,
        kind: CipherKind,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Sealed, cryptography::Error> {
        let seals = self.seals.get() + 1;
        self.seals.set(seals);
        if self.fail_seal_at.is_some_and(|n| seals >= n) {
            return Err(cryptography::Error::EncryptionFailed);
        }
        Software.seal(kind, key, nonce, aad, plaintext)
    }

    fn open(
        &self,
        kind: CipherKind,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, cryptography::Error> {
        let mut plaintext = Software.open(kind, key, nonce, aad, ciphertext, tag)?;
        if let Some(len) = self.truncate_open {
            plaintext.truncate(len);
        }
        Ok(plaintext)
    }
}
