//! Unwrap peer-issued session keys into new connections.
//!
//! # Format
//!
//! A wrapped key (`SET_KEY`) carries three fields:
//!
//! ```txt
//! +---------------------+------------------------+-------------+
//! | header (5 bytes)    | ciphertext (16 bytes)  | tag (16)    |
//! +---------------------+------------------------+-------------+
//! ```
//!
//! The header is sent in the clear and authenticated as associated data. The ciphertext is the
//! session key sealed under the module key with AES-128-GCM and the provisioning nonce.
//!
//! The header layout is:
//!
//! | offset | field |
//! |---|---|
//! | 0 | cipher selector (0 = AES-128-GCM, 1 = Ascon-128) |
//! | 1..3 | connection id, byte 1 is the high byte |
//! | 3..5 | channel id, byte 3 is the high byte |

use crate::{
    attestation::ModuleKey,
    registry::{Connection, Registry},
    Config, Error,
};
use bytes::Bytes;
use tracing::{debug, info};
use trustlet_cryptography::{CipherKind, Key, Provider, Secret, KEY_LENGTH, TAG_LENGTH};
use zeroize::Zeroizing;

/// Length of the provisioning header.
pub const HEADER_LENGTH: usize = 5;

/// Connection parameters chosen by the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub cipher: CipherKind,
    pub connection_id: u16,
    pub channel_id: u16,
}

impl Metadata {
    /// Parse a provisioning header.
    pub fn parse(header: &[u8]) -> Result<Self, Error> {
        let header: &[u8; HEADER_LENGTH] = header
            .try_into()
            .map_err(|_| Error::MalformedMessage("header has wrong length"))?;
        Ok(Self {
            cipher: CipherKind::try_from(header[0])?,
            connection_id: u16::from_be_bytes([header[1], header[2]]),
            channel_id: u16::from_be_bytes([header[3], header[4]]),
        })
    }

    /// Encode as a provisioning header.
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let [connection_hi, connection_lo] = self.connection_id.to_be_bytes();
        let [channel_hi, channel_lo] = self.channel_id.to_be_bytes();
        [
            self.cipher.selector(),
            connection_hi,
            connection_lo,
            channel_hi,
            channel_lo,
        ]
    }
}

/// A session key wrapped under the module key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedKey {
    pub header: Bytes,
    pub ciphertext: Bytes,
    pub tag: Bytes,
}

impl WrappedKey {
    pub fn new(header: Bytes, ciphertext: Bytes, tag: Bytes) -> Self {
        Self {
            header,
            ciphertext,
            tag,
        }
    }

    /// Wrap `session_key` for delivery to a module holding `module_key`.
    pub fn wrap<P: Provider>(
        provider: &P,
        config: &Config,
        module_key: &[u8],
        metadata: Metadata,
        session_key: &Key,
    ) -> Result<Self, Error> {
        let header = metadata.encode();
        let sealed = provider.seal(
            CipherKind::Aes128Gcm,
            module_key,
            &config.provisioning_nonce,
            &header,
            session_key,
        )?;
        Ok(Self {
            header: Bytes::copy_from_slice(&header),
            ciphertext: Bytes::from(sealed.ciphertext),
            tag: Bytes::copy_from_slice(&sealed.tag),
        })
    }

    /// Reject fields of the wrong length before any cryptographic work.
    fn validate(&self) -> Result<(), Error> {
        if self.header.len() != HEADER_LENGTH {
            return Err(Error::MalformedMessage("header has wrong length"));
        }
        if self.ciphertext.len() != KEY_LENGTH {
            return Err(Error::MalformedMessage("wrapped key has wrong length"));
        }
        if self.tag.len() != TAG_LENGTH {
            return Err(Error::MalformedMessage("tag has wrong length"));
        }
        Ok(())
    }
}

/// Unwrap `message` under `module_key` and store the resulting connection in `registry`.
///
/// Nothing is inserted unless the message authenticates and its connection id is free.
pub fn provision<P: Provider>(
    provider: &P,
    config: &Config,
    module_key: &ModuleKey,
    registry: &mut Registry,
    message: &WrappedKey,
) -> Result<Metadata, Error> {
    message.validate()?;

    // Unwrap the session key
    let plaintext = Zeroizing::new(provider.open(
        CipherKind::Aes128Gcm,
        module_key.expose(),
        &config.provisioning_nonce,
        &message.header,
        &message.ciphertext,
        &message.tag,
    )?);
    if plaintext.len() != KEY_LENGTH {
        let err = trustlet_cryptography::Error::InvalidKeyLength(plaintext.len());
        return Err(Error::Crypto(err));
    }
    let mut key: Secret<Key> = Secret::new([0u8; KEY_LENGTH]);
    key.expose_mut().copy_from_slice(&plaintext);

    // The header is only trusted once authenticated
    let metadata = Metadata::parse(&message.header)?;
    registry.insert(Connection::new(
        metadata.connection_id,
        metadata.channel_id,
        metadata.cipher,
        key,
    ))?;
    info!(
        connection_id = metadata.connection_id,
        channel_id = metadata.channel_id,
        cipher = %metadata.cipher,
        "provisioned connection"
    );
    debug!(connections = registry.len(), "registry updated");
    Ok(metadata)
}
