//! Registry of live connections.
//!
//! Connections are keyed by their controller handle. Notification callbacks
//! are registered on a connection and routed here by attribute handle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::ble::connection::{Connection, NotificationRegistration};
use crate::error::{Error, Result};

/// Tracks every established [`Connection`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<u16, Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateConnectionHandle`] if the handle is already
    /// registered.
    pub fn add(&self, connection: Connection) -> Result<()> {
        let handle = connection.handle();
        let mut connections = self.connections.write();
        if connections.contains_key(&handle) {
            return Err(Error::DuplicateConnectionHandle { handle });
        }
        debug!("Registering connection {:#06x}", handle);
        connections.insert(handle, connection);
        Ok(())
    }

    /// Remove a connection by handle and return it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionNotFound`] if no connection has the handle.
    pub fn remove(&self, handle: u16) -> Result<Connection> {
        let removed = self.connections.write().remove(&handle);
        match removed {
            Some(connection) => {
                debug!("Removed connection {:#06x}", handle);
                Ok(connection)
            }
            None => Err(Error::ConnectionNotFound { handle }),
        }
    }

    /// Look up a connection by handle.
    pub fn get(&self, handle: u16) -> Option<Connection> {
        self.connections.read().get(&handle).cloned()
    }

    /// Check whether this exact connection record is registered.
    pub fn contains(&self, connection: &Connection) -> bool {
        self.connections
            .read()
            .get(&connection.handle())
            .is_some_and(|c| c.same_record(connection))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Check whether there are no live connections.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Snapshot of all live connections.
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.read().values().cloned().collect()
    }

    /// Register a notification callback for an attribute of a connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionNotFound`] if the connection is not
    /// registered.
    pub fn register_notification(
        &self,
        connection: &Connection,
        attribute_handle: u16,
        callback: impl Fn(&[u8]) + Send + Sync + 'static,
    ) -> Result<Arc<NotificationRegistration>> {
        if !self.contains(connection) {
            return Err(Error::ConnectionNotFound {
                handle: connection.handle(),
            });
        }

        let registration = Arc::new(NotificationRegistration::new(attribute_handle, callback));
        connection.add_notification(registration.clone());
        debug!(
            "Notification registered for attribute {:#06x} on connection {:#06x}",
            attribute_handle,
            connection.handle()
        );
        Ok(registration)
    }

    /// Find the notification registration for an attribute of a connection.
    pub fn find_notification(
        &self,
        connection_handle: u16,
        attribute_handle: u16,
    ) -> Option<Arc<NotificationRegistration>> {
        self.get(connection_handle)?.find_notification(attribute_handle)
    }

    /// Route a notified value to its registered callback.
    ///
    /// Returns `false` if no callback is registered for the pair of handles.
    pub fn dispatch_notification(
        &self,
        connection_handle: u16,
        attribute_handle: u16,
        value: &[u8],
    ) -> bool {
        match self.find_notification(connection_handle, attribute_handle) {
            Some(registration) => {
                registration.notify(value);
                true
            }
            None => {
                trace!(
                    "Unrouted notification for attribute {:#06x} on connection {:#06x}",
                    attribute_handle,
                    connection_handle
                );
                false
            }
        }
    }
}
