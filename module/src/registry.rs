//! Track authenticated peer connections.

use crate::{counter::Counter, Error};
use std::collections::HashMap;
use tracing::debug;
use trustlet_cryptography::{CipherKind, Key, Secret};

/// One authenticated peer channel.
///
/// The session key is owned exclusively by the connection and zeroized when it is dropped.
#[derive(Debug)]
pub struct Connection {
    id: u16,
    channel: u16,
    cipher: CipherKind,
    key: Secret<Key>,
    counter: Counter,
}

impl Connection {
    /// Create a new connection with its replay counter at zero.
    pub fn new(id: u16, channel: u16, cipher: CipherKind, key: Secret<Key>) -> Self {
        Self {
            id,
            channel,
            cipher,
            key,
            counter: Counter::new(),
        }
    }

    /// Identifier assigned by the peer at provisioning time.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Logical I/O channel driven by this connection.
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Cipher negotiated at provisioning time.
    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    /// Session key of this connection.
    pub fn key(&self) -> &Secret<Key> {
        &self.key
    }

    /// Current replay state.
    pub fn counter(&self) -> Counter {
        self.counter
    }

    /// Advance the replay counter after an attempt.
    pub(crate) fn advance(&mut self) {
        self.counter.advance();
    }

    #[cfg(test)]
    pub(crate) fn set_counter(&mut self, counter: Counter) {
        self.counter = counter;
    }

    /// Returns `true` if the connection can still process messages.
    pub fn is_live(&self) -> bool {
        !self.counter.is_exhausted()
    }
}

/// In-memory mapping from connection identifier to [Connection].
///
/// Records are only mutated by replay counter advancement. Iteration follows insertion order.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<u16, Connection>,
    order: Vec<u16>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new connection.
    ///
    /// Fails if a live connection with the same identifier exists. An exhausted connection is
    /// replaced (its key is zeroized when the old record drops), which is how a connection is
    /// re-provisioned after its counter runs out.
    pub fn insert(&mut self, connection: Connection) -> Result<(), Error> {
        let id = connection.id;
        if let Some(existing) = self.connections.get(&id) {
            if existing.is_live() {
                return Err(Error::DuplicateConnection(id));
            }
            debug!(connection_id = id, "replacing exhausted connection");
            self.order.retain(|other| *other != id);
        }
        self.connections.insert(id, connection);
        self.order.push(id);
        Ok(())
    }

    /// Get a connection by identifier.
    pub fn get(&self, id: u16) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Get a connection by identifier for replay counter advancement.
    pub fn get_mut(&mut self, id: u16) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Returns the identifiers of all connections driving `channel`, in insertion order.
    pub fn find_by_channel(&self, channel: u16) -> Vec<u16> {
        self.iter()
            .filter(|connection| connection.channel == channel)
            .map(|connection| connection.id)
            .collect()
    }

    /// Remove a connection, returning it if it existed.
    pub fn remove(&mut self, id: u16) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(connection)
    }

    /// Iterate over all connections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.order.iter().filter_map(|id| self.connections.get(id))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(id: u16, channel: u16, key: u8) -> Connection {
        Connection::new(id, channel, CipherKind::Aes128Gcm, Secret::new([key; 16]))
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        registry.insert(connection(7, 1, 0xaa)).unwrap();

        let stored = registry.get(7).unwrap();
        assert_eq!(stored.id(), 7);
        assert_eq!(stored.channel(), 1);
        assert_eq!(stored.cipher(), CipherKind::Aes128Gcm);
        assert_eq!(stored.key().expose(), &[0xaa; 16]);
        assert_eq!(stored.counter().value(), 0);
        assert!(registry.get(8).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = Registry::new();
        registry.insert(connection(7, 1, 0xaa)).unwrap();
        registry.get_mut(7).unwrap().advance();

        assert_eq!(
            registry.insert(connection(7, 2, 0xbb)),
            Err(Error::DuplicateConnection(7))
        );

        // Existing record untouched
        let stored = registry.get(7).unwrap();
        assert_eq!(stored.channel(), 1);
        assert_eq!(stored.key().expose(), &[0xaa; 16]);
        assert_eq!(stored.counter().value(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_exhausted_replaced() {
        let mut registry = Registry::new();
        registry.insert(connection(7, 1, 0xaa)).unwrap();
        registry.insert(connection(8, 1, 0xcc)).unwrap();

        // Burn through every counter value
        let stored = registry.get_mut(7).unwrap();
        for _ in 0..=u16::MAX as u32 {
            stored.advance();
        }
        assert!(!stored.is_live());

        registry.insert(connection(7, 1, 0xbb)).unwrap();
        let stored = registry.get(7).unwrap();
        assert!(stored.is_live());
        assert_eq!(stored.counter().value(), 0);
        assert_eq!(stored.key().expose(), &[0xbb; 16]);

        // Replacement moves to the back of the insertion order
        assert_eq!(registry.find_by_channel(1), vec![8, 7]);
    }

    #[test]
    fn test_find_by_channel_insertion_order() {
        let mut registry = Registry::new();
        registry.insert(connection(30, 1, 1)).unwrap();
        registry.insert(connection(10, 2, 2)).unwrap();
        registry.insert(connection(20, 1, 3)).unwrap();
        registry.insert(connection(5, 1, 4)).unwrap();

        assert_eq!(registry.find_by_channel(1), vec![30, 20, 5]);
        assert_eq!(registry.find_by_channel(2), vec![10]);
        assert!(registry.find_by_channel(3).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::new();
        registry.insert(connection(1, 1, 1)).unwrap();
        registry.insert(connection(2, 1, 2)).unwrap();

        let removed = registry.remove(1).unwrap();
        assert_eq!(removed.id(), 1);
        assert!(registry.remove(1).is_none());
        assert_eq!(registry.find_by_channel(1), vec![2]);

        // Id can be provisioned again once removed
        registry.insert(connection(1, 1, 3)).unwrap();
        assert_eq!(registry.find_by_channel(1), vec![2, 1]);
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", connection(1, 1, 0x42));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("66"));
    }
}
