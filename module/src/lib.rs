//! Provision per-peer session keys, attest to peers, and dispatch authenticated commands.
//!
//! A [Module] is a trusted endpoint running behind a secure execution boundary. The host that
//! drives it cannot inspect its memory, and everything the host hands over is untrusted until
//! authenticated.
//!
//! # Protocol
//!
//! 1. At startup, the module fetches its long-term module key from an attestation
//!    [attestation::Authority]. Failing to obtain it is fatal.
//! 2. A peer that knows the module key sends a wrapped session key (`SET_KEY`). The 5-byte
//!    [provisioning::Metadata] header travels in the clear but is authenticated as associated data,
//!    and the 16-byte session key is encrypted under the module key. On success, a new
//!    [registry::Connection] is stored.
//! 3. The peer then sends commands (`HANDLE_INPUT`) for that connection. Each command is decrypted
//!    with the connection's own cipher and key, using associated data derived from the
//!    connection's replay [counter::Counter]. The counter advances after every attempt, so a
//!    ciphertext accepted once can never verify again.
//! 4. Independently, a verifier can send a challenge (`ATTEST`). The module seals a fixed canary
//!    under the module key with the challenge as associated data and returns the tag as proof of
//!    possession.
//!
//! # Known Weaknesses
//!
//! Provisioning, attestation, and command traffic all use fixed (all-zero by default) nonces.
//! Command uniqueness comes only from the counter-derived associated data. The counter also
//! advances when authentication fails. Both behaviors are required for compatibility with
//! existing peers.
//!
//! Output sealed by [dispatch::Engine::emit] uses the same session key, all-zero nonce, and
//! counter sequence as inbound commands. Under AES-128-GCM the keystream does not depend on
//! associated data, so every message on a connection (commands and emitted output alike) is
//! encrypted with one keystream, and XOR-ing two ciphertexts reveals the XOR of their plaintexts.
//! Ascon-128 absorbs the counter before encrypting, and since both directions draw from one
//! counter no two messages share a state.
//!
//! # Status
//!
//! `trustlet-module` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use thiserror::Error;

pub mod attestation;
pub mod command;
mod config;
pub use config::Config;
pub mod counter;
pub mod dispatch;
pub mod mocks;
mod module;
pub use module::Module;
pub mod peer;
pub mod provisioning;
pub mod registry;

/// Errors that can occur when interacting with a [Module].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Message errors
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(u8),
    #[error("unsupported command: {0}")]
    UnsupportedCommand(u32),

    // Registry errors
    #[error("duplicate connection: {0}")]
    DuplicateConnection(u16),
    #[error("unknown connection: {0}")]
    UnknownConnection(u16),
    #[error("replay counter exhausted for connection: {0}")]
    CounterOverflow(u16),

    // Attestation errors
    #[error("authority unreachable: {0}")]
    AuthorityUnreachable(String),
    #[error("module key unavailable")]
    ModuleKeyUnavailable,

    #[error("crypto: {0}")]
    Crypto(trustlet_cryptography::Error),
}

impl From<trustlet_cryptography::Error> for Error {
    fn from(err: trustlet_cryptography::Error) -> Self {
        match err {
            // A tag mismatch means the message is untrusted, whatever produced it
            trustlet_cryptography::Error::DecryptionFailed => Error::AuthenticationFailed,
            trustlet_cryptography::Error::UnsupportedCipher(selector) => {
                Error::UnsupportedCipher(selector)
            }
            other => Error::Crypto(other),
        }
    }
}

impl Error {
    /// The status code reported to the host for this error.
    pub fn status(&self) -> u32 {
        use command::status;
        match self {
            Error::AuthenticationFailed => status::MAC_INVALID,
            Error::MalformedMessage(_) => status::BAD_PARAMETERS,
            Error::UnsupportedCipher(_) | Error::UnsupportedCommand(_) => status::NOT_SUPPORTED,
            Error::DuplicateConnection(_) => status::ACCESS_CONFLICT,
            Error::UnknownConnection(_) => status::ITEM_NOT_FOUND,
            Error::CounterOverflow(_) => status::OVERFLOW,
            Error::AuthorityUnreachable(_) => status::COMMUNICATION,
            Error::ModuleKeyUnavailable => status::BAD_STATE,
            Error::Crypto(_) => status::GENERIC,
        }
    }
}
