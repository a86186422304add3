//! Obtain the module key and prove possession of it.
//!
//! The module key is issued by an external attestation [Authority] and fetched once at startup.
//! After that it is read-only for the lifetime of the [Client] and never leaves it in plaintext.
//!
//! To answer a challenge, the client seals the configured canary under the module key with
//! AES-128-GCM, using the challenge as associated data. The resulting tag is the proof: only a
//! holder of the module key can produce it, and a verifier holding the same key can recompute it
//! (see [crate::peer::verify_proof]).

use crate::{Config, Error};
use tracing::{debug, info};
use trustlet_cryptography::{CipherKind, Key, Provider, Sealed, Secret, KEY_LENGTH};
use zeroize::Zeroizing;

/// The long-term secret of this module.
pub type ModuleKey = Secret<Key>;

/// Issues the module key.
///
/// The exchange with the authority is opaque to the module. Implementations may block; bounding
/// the call in time is the responsibility of whoever starts the module.
pub trait Authority {
    /// Fetch the module key.
    ///
    /// Returns [Error::AuthorityUnreachable] if the authority cannot be contacted.
    fn module_key(&mut self) -> Result<Zeroizing<Vec<u8>>, Error>;
}

/// Holds the module key and answers attestation challenges.
#[derive(Debug, Default)]
pub struct Client {
    key: Option<ModuleKey>,
}

impl Client {
    /// Create a client that has not yet fetched its module key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the module key from `authority`.
    ///
    /// Fails if the authority is unreachable or returns a key of the wrong length. Once a key has
    /// been acquired, later calls leave it untouched.
    pub fn fetch_module_key<A: Authority>(&mut self, authority: &mut A) -> Result<(), Error> {
        if self.key.is_some() {
            debug!("module key already acquired");
            return Ok(());
        }
        let material = authority.module_key()?;
        if material.len() != KEY_LENGTH {
            return Err(Error::MalformedMessage("module key has wrong length"));
        }
        let mut key: ModuleKey = Secret::new([0u8; KEY_LENGTH]);
        key.expose_mut().copy_from_slice(&material);
        self.key = Some(key);
        info!("module key acquired");
        Ok(())
    }

    /// Returns the module key, if it has been fetched.
    pub fn module_key(&self) -> Result<&ModuleKey, Error> {
        self.key.as_ref().ok_or(Error::ModuleKeyUnavailable)
    }

    /// Prove possession of the module key to the sender of `challenge`.
    ///
    /// Only the returned tag needs to be sent back to the verifier.
    pub fn respond_to_challenge<P: Provider>(
        &self,
        provider: &P,
        config: &Config,
        challenge: &[u8],
    ) -> Result<Sealed, Error> {
        let key = self.module_key()?;
        if challenge.is_empty() {
            return Err(Error::MalformedMessage("empty challenge"));
        }
        if challenge.len() > config.max_challenge_size {
            return Err(Error::MalformedMessage("challenge too large"));
        }
        let sealed = provider.seal(
            CipherKind::Aes128Gcm,
            key.expose(),
            &config.attestation_nonce,
            challenge,
            &config.canary,
        )?;
        debug!(
            challenge_len = challenge.len(),
            "answered attestation challenge"
        );
        Ok(sealed)
    }
}
