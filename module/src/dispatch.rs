//! Decrypt authenticated commands and route them to channel handlers.
//!
//! Every command names a connection. The command is opened with that connection's cipher and
//! session key, the all-zero [command_nonce], and associated data derived from the connection's
//! current replay [crate::counter::Counter]. The counter advances once the attempt reaches the
//! cipher, whether or not the tag verified, so a replayed ciphertext is checked against a newer
//! counter value and fails.
//!
//! Output flows the other way through [Engine::emit]: data produced for a channel is sealed once
//! per connection bound to that channel, advancing each connection's counter in the same way.

use crate::{counter::command_nonce, registry::Registry, Config, Error};
use std::collections::HashMap;
use tracing::{debug, trace, warn};
use trustlet_cryptography::{Provider, Tag, TAG_LENGTH};
use zeroize::Zeroizing;

/// Consumes authenticated plaintext for a channel (e.g. toggles an actuator).
pub trait Handler {
    /// Handle `data` received over `connection_id`.
    fn handle(&mut self, connection_id: u16, data: &[u8]);
}

impl<F: FnMut(u16, &[u8])> Handler for F {
    fn handle(&mut self, connection_id: u16, data: &[u8]) {
        self(connection_id, data)
    }
}

/// A sealed output for one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    pub connection_id: u16,
    pub ciphertext: Vec<u8>,
    pub tag: Tag,
}

/// Routes decrypted commands to the handler registered for their channel.
#[derive(Default)]
pub struct Engine {
    handlers: HashMap<u16, Box<dyn Handler>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `channel`, returning the handler it replaced (if any).
    pub fn register<H: Handler + 'static>(
        &mut self,
        channel: u16,
        handler: H,
    ) -> Option<Box<dyn Handler>> {
        self.handlers.insert(channel, Box::new(handler))
    }

    /// Decrypt a command for `connection_id` and route it.
    ///
    /// Fails without touching the registry if the message is malformed or the connection is
    /// unknown or exhausted. Otherwise, the connection's counter advances exactly once.
    pub fn dispatch<P: Provider>(
        &mut self,
        provider: &P,
        config: &Config,
        registry: &mut Registry,
        connection_id: u16,
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<(), Error> {
        if tag.len() != TAG_LENGTH {
            return Err(Error::MalformedMessage("tag has wrong length"));
        }
        if ciphertext.len() > config.max_payload_size {
            return Err(Error::MalformedMessage("command too large"));
        }
        let connection = registry
            .get_mut(connection_id)
            .ok_or(Error::UnknownConnection(connection_id))?;
        if !connection.is_live() {
            return Err(Error::CounterOverflow(connection_id));
        }

        // Attempt decryption under the current replay state
        let counter = connection.counter();
        let cipher = connection.cipher();
        let result = provider.open(
            cipher,
            connection.key().expose(),
            command_nonce(cipher),
            &counter.aad(),
            ciphertext,
            tag,
        );
        connection.advance();
        if !connection.is_live() {
            warn!(
                connection_id,
                "replay counter exhausted, connection must be re-provisioned"
            );
        }
        let plaintext = match result {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(err) => {
                debug!(connection_id, counter = counter.value(), error = ?err, "rejected command");
                return Err(err.into());
            }
        };

        // Route to the channel
        let channel = connection.channel();
        match self.handlers.get_mut(&channel) {
            Some(handler) => {
                debug!(
                    connection_id,
                    channel_id = channel,
                    counter = counter.value(),
                    "routing command"
                );
                handler.handle(connection_id, &plaintext);
            }
            None => trace!(
                connection_id,
                channel_id = channel,
                "no handler for channel"
            ),
        }
        Ok(())
    }

    /// Seal `data` for every live connection bound to `channel`.
    ///
    /// Connections are visited in insertion order. Exhausted connections are skipped. Counters only
    /// advance once every output has been sealed, so a failure leaves all connections untouched.
    pub fn emit<P: Provider>(
        &self,
        provider: &P,
        config: &Config,
        registry: &mut Registry,
        channel: u16,
        data: &[u8],
    ) -> Result<Vec<Outgoing>, Error> {
        if data.len() > config.max_payload_size {
            return Err(Error::MalformedMessage("output too large"));
        }

        // Seal under the current replay state
        let mut outgoing = Vec::new();
        for connection_id in registry.find_by_channel(channel) {
            let Some(connection) = registry.get(connection_id) else {
                continue;
            };
            if !connection.is_live() {
                warn!(
                    connection_id,
                    channel_id = channel,
                    "skipping exhausted connection"
                );
                continue;
            }
            let cipher = connection.cipher();
            let sealed = provider.seal(
                cipher,
                connection.key().expose(),
                command_nonce(cipher),
                &connection.counter().aad(),
                data,
            )?;
            outgoing.push(Outgoing {
                connection_id,
                ciphertext: sealed.ciphertext,
                tag: sealed.tag,
            });
        }

        // Commit
        for output in &outgoing {
            if let Some(connection) = registry.get_mut(output.connection_id) {
                connection.advance();
            }
        }
        debug!(
            channel_id = channel,
            connections = outgoing.len(),
            "emitted output"
        );
        Ok(outgoing)
    }
}
