/// Configuration for a [crate::Module].
///
/// # Warning
///
/// Every field except `max_payload_size` and `max_challenge_size` must match the configuration of
/// the peers and verifiers talking to this module. If they differ, provisioning and attestation
/// will fail authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Value sealed under the module key to answer an attestation challenge.
    pub canary: [u8; 16],

    /// Nonce used when answering attestation challenges.
    pub attestation_nonce: [u8; 16],

    /// Nonce used to unwrap session keys.
    ///
    /// Reserved for provisioning and never used for command traffic (command nonces are derived
    /// per cipher, see [crate::counter::command_nonce]).
    pub provisioning_nonce: [u8; 16],

    /// Largest command (or emitted output) plaintext accepted, in bytes.
    pub max_payload_size: usize,

    /// Largest attestation challenge accepted, in bytes.
    pub max_challenge_size: usize,
}

impl Config {
    /// Generates a configuration compatible with existing peers.
    pub fn recommended() -> Self {
        Self {
            canary: [0u8; 16],
            attestation_nonce: [0u8; 16],
            provisioning_nonce: [0u8; 16],
            max_payload_size: 4 * 1024,
            max_challenge_size: 256,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::recommended()
    }
}
