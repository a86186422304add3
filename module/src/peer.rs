//! The remote side of a connection.
//!
//! A [Peer] holds the same session key and replay state as the module's record for its connection.
//! It wraps its session key for provisioning, seals commands for the module, and opens the module's
//! output. Commands and output share a single counter, so both sides must observe every message in
//! the same order.

use crate::{
    counter::{command_nonce, Counter},
    provisioning::{Metadata, WrappedKey},
    Config, Error,
};
use tracing::debug;
use trustlet_cryptography::{ct_eq_bytes, CipherKind, Key, Provider, Secret, Tag};
use zeroize::Zeroizing;

/// A peer's view of one connection.
#[derive(Debug)]
pub struct Peer {
    metadata: Metadata,
    key: Secret<Key>,
    counter: Counter,
}

impl Peer {
    pub fn new(connection_id: u16, channel_id: u16, cipher: CipherKind, key: Key) -> Self {
        Self {
            metadata: Metadata {
                cipher,
                connection_id,
                channel_id,
            },
            key: Secret::new(key),
            counter: Counter::new(),
        }
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    /// Current replay state.
    pub fn counter(&self) -> Counter {
        self.counter
    }

    /// Wrap this peer's session key for a module holding `module_key`.
    pub fn wrap<P: Provider>(
        &self,
        provider: &P,
        config: &Config,
        module_key: &[u8],
    ) -> Result<WrappedKey, Error> {
        WrappedKey::wrap(
            provider,
            config,
            module_key,
            self.metadata,
            self.key.expose(),
        )
    }

    /// Seal a command under the current counter and advance it.
    pub fn seal<P: Provider>(
        &mut self,
        provider: &P,
        data: &[u8],
    ) -> Result<(Vec<u8>, Tag), Error> {
        self.check_live()?;
        let cipher = self.metadata.cipher;
        let sealed = provider.seal(
            cipher,
            self.key.expose(),
            command_nonce(cipher),
            &self.counter.aad(),
            data,
        )?;
        self.counter.advance();
        Ok((sealed.ciphertext, sealed.tag))
    }

    /// Open module output under the current counter and advance it.
    ///
    /// The counter advances even if authentication fails, mirroring the module.
    pub fn open<P: Provider>(
        &mut self,
        provider: &P,
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        self.check_live()?;
        let cipher = self.metadata.cipher;
        let result = provider.open(
            cipher,
            self.key.expose(),
            command_nonce(cipher),
            &self.counter.aad(),
            ciphertext,
            tag,
        );
        self.counter.advance();
        Ok(Zeroizing::new(result?))
    }

    fn check_live(&self) -> Result<(), Error> {
        if self.counter.is_exhausted() {
            return Err(Error::CounterOverflow(self.metadata.connection_id));
        }
        Ok(())
    }
}

/// Check that `tag` proves possession of `module_key` for `challenge`.
pub fn verify_proof<P: Provider>(
    provider: &P,
    config: &Config,
    module_key: &[u8],
    challenge: &[u8],
    tag: &[u8],
) -> Result<(), Error> {
    let expected = provider.seal(
        CipherKind::Aes128Gcm,
        module_key,
        &config.attestation_nonce,
        challenge,
        &config.canary,
    )?;
    if !ct_eq_bytes(&expected.tag, tag) {
        debug!(
            challenge_len = challenge.len(),
            "attestation proof rejected"
        );
        return Err(Error::AuthenticationFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{attestation::Client, mocks};
    use trustlet_cryptography::Software;

    const MODULE_KEY: Key = [0x5a; 16];

    #[test]
    fn test_seal_open_share_counter() {
        let mut sender = Peer::new(1, 1, CipherKind::Aes128Gcm, [9; 16]);
        let mut receiver = Peer::new(1, 1, CipherKind::Aes128Gcm, [9; 16]);

        let (ciphertext, tag) = sender.seal(&Software, b"first").unwrap();
        assert_eq!(sender.counter().value(), 1);
        let plaintext = receiver.open(&Software, &ciphertext, &tag).unwrap();
        assert_eq!(&plaintext[..], b"first");
        assert_eq!(receiver.counter().value(), 1);

        // Replay is checked against the advanced counter
        let (ciphertext, tag) = sender.seal(&Software, b"second").unwrap();
        receiver.open(&Software, &ciphertext, &tag).unwrap();
        assert_eq!(
            receiver.open(&Software, &ciphertext, &tag).unwrap_err(),
            Error::AuthenticationFailed
        );
        assert_eq!(receiver.counter().value(), 3);
    }

    #[test]
    fn test_verify_proof() {
        let config = Config::recommended();
        let mut client = Client::new();
        client
            .fetch_module_key(&mut mocks::Authority::new(MODULE_KEY))
            .unwrap();
        let proof = client
            .respond_to_challenge(&Software, &config, b"fresh challenge")
            .unwrap();

        let fresh = b"fresh challenge";
        let tag = &proof.tag;
        verify_proof(&Software, &config, &MODULE_KEY, fresh, tag).unwrap();

        // Wrong challenge, wrong key, truncated tag
        assert_eq!(
            verify_proof(&Software, &config, &MODULE_KEY, b"stale", tag),
            Err(Error::AuthenticationFailed)
        );
        assert_eq!(
            verify_proof(&Software, &config, &[0x5b; 16], fresh, tag),
            Err(Error::AuthenticationFailed)
        );
        assert_eq!(
            verify_proof(&Software, &config, &MODULE_KEY, fresh, &tag[..8]),
            Err(Error::AuthenticationFailed)
        );
    }

    #[test]
    fn test_wrap_matches_metadata() {
        let peer = Peer::new(0x0102, 0x0304, CipherKind::Ascon128, [1; 16]);
        let wrapped = peer
            .wrap(&Software, &Config::recommended(), &MODULE_KEY)
            .unwrap();
        assert_eq!(&wrapped.header[..], &[1, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(wrapped.ciphertext.len(), 16);
        assert_eq!(wrapped.tag.len(), 16);
    }
}
