//! BLE connection establishment.
//!
//! [`Connector`] initiates links to peers over the HCI transport and records
//! the resulting [`Connection`]s in the [`ConnectionRegistry`].

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::ble::address::Address;
use crate::ble::registry::ConnectionRegistry;
use crate::config::{
    duration_to_units, ConnectionDefaults, GapConfig, CONNECTION_INTERVAL_UNIT,
    SUPERVISION_TIMEOUT_UNIT,
};
use crate::error::{Error, Result};
use crate::protocol::hci::{
    ConnectionComplete, CreateConnectionParameters, SharedTransport, ADDRESS_TYPE_PUBLIC,
    REASON_REMOTE_USER_TERMINATED,
};

/// ATT MTU used until a larger one is negotiated.
pub const DEFAULT_MTU: u16 = 23;

/// Callback invoked with the new value of a notified attribute.
pub type NotificationCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// A callback registered for value-change notifications of one attribute.
pub struct NotificationRegistration {
    handle: u16,
    callback: NotificationCallback,
}

impl NotificationRegistration {
    /// Create a registration for an attribute handle.
    pub fn new(handle: u16, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        Self {
            handle,
            callback: Box::new(callback),
        }
    }

    /// The attribute handle this registration listens to.
    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Invoke the callback with a notified value.
    pub fn notify(&self, value: &[u8]) {
        (self.callback)(value)
    }
}

impl fmt::Debug for NotificationRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRegistration")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

struct ConnectionState {
    mtu: AtomicU16,
    connected_at: DateTime<Utc>,
    notifications: RwLock<Vec<Arc<NotificationRegistration>>>,
}

/// An established link to a peer.
///
/// Clones share the same state: an MTU update or a notification registered
/// through one clone is visible through every other clone and through the
/// registry.
#[derive(Clone)]
pub struct Connection {
    address: Address,
    handle: u16,
    state: Arc<ConnectionState>,
}

impl Connection {
    /// Create a connection record with the default MTU.
    pub fn new(address: Address, handle: u16) -> Self {
        Self {
            address,
            handle,
            state: Arc::new(ConnectionState {
                mtu: AtomicU16::new(DEFAULT_MTU),
                connected_at: Utc::now(),
                notifications: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The peer address as reported by the controller.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The controller-assigned connection handle.
    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// The negotiated ATT MTU.
    pub fn mtu(&self) -> u16 {
        self.state.mtu.load(Ordering::SeqCst)
    }

    /// Record a renegotiated ATT MTU.
    pub fn set_mtu(&self, mtu: u16) {
        self.state.mtu.store(mtu, Ordering::SeqCst);
    }

    /// When the link was established.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.state.connected_at
    }

    /// Check whether two values refer to the same connection record.
    pub fn same_record(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn add_notification(&self, registration: Arc<NotificationRegistration>) {
        self.state.notifications.write().push(registration);
    }

    pub(crate) fn find_notification(&self, handle: u16) -> Option<Arc<NotificationRegistration>> {
        self.state
            .notifications
            .read()
            .iter()
            .find(|n| n.handle() == handle)
            .cloned()
    }

    /// Number of notification registrations.
    pub fn notification_count(&self) -> usize {
        self.state.notifications.read().len()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("handle", &self.handle)
            .field("mtu", &self.mtu())
            .field("notifications", &self.notification_count())
            .finish()
    }
}

/// Caller overrides for the connection parameters.
///
/// Unset fields keep the adapter's [`ConnectionDefaults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionParams {
    /// Minimum connection interval.
    pub min_interval: Option<Duration>,
    /// Maximum connection interval.
    pub max_interval: Option<Duration>,
    /// Supervision timeout.
    pub timeout: Option<Duration>,
}

/// Build the LE Create Connection command for a peer.
pub fn create_connection_parameters(
    address: &Address,
    params: &ConnectionParams,
    defaults: &ConnectionDefaults,
) -> CreateConnectionParameters {
    let interval = |d: Option<Duration>, fallback: u16| {
        d.map(|d| duration_to_units(d, CONNECTION_INTERVAL_UNIT))
            .unwrap_or(fallback)
    };

    CreateConnectionParameters {
        scan_interval: defaults.scan_interval,
        scan_window: defaults.scan_window,
        initiator_filter_policy: 0x00,
        peer_address_type: address.hci_address_type(),
        peer_address: address.mac,
        own_address_type: ADDRESS_TYPE_PUBLIC,
        interval_min: interval(params.min_interval, defaults.interval_min),
        interval_max: interval(params.max_interval, defaults.interval_max),
        latency: defaults.latency,
        supervision_timeout: params
            .timeout
            .map(|d| duration_to_units(d, SUPERVISION_TIMEOUT_UNIT))
            .unwrap_or(defaults.supervision_timeout),
        min_ce_length: defaults.min_ce_length,
        max_ce_length: defaults.max_ce_length,
    }
}

/// Establishes and tears down connections.
pub struct Connector {
    transport: SharedTransport,
    registry: Arc<ConnectionRegistry>,
    config: Arc<GapConfig>,
}

impl Connector {
    /// Create a connector over a shared transport.
    pub fn new(
        transport: SharedTransport,
        registry: Arc<ConnectionRegistry>,
        config: Arc<GapConfig>,
    ) -> Self {
        Self {
            transport,
            registry,
            config,
        }
    }

    /// Connect to a peer.
    ///
    /// Issues LE Create Connection and polls until the controller reports
    /// the link or `connect_timeout` elapses. On timeout the attempt is
    /// cancelled and [`Error::ConnectionFailed`] is returned. No retries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] on timeout or a failed connection
    /// complete event, and [`Error::Transport`] if a command or poll fails.
    pub async fn connect(&self, address: Address, params: ConnectionParams) -> Result<Connection> {
        let command = create_connection_parameters(&address, &params, &self.config.connection);
        info!("Connecting to {}", address);
        debug!("LE Create Connection: {:?}", command);

        self.transport.lock().await.le_create_connection(&command).await?;

        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            let complete = {
                let mut hci = self.transport.lock().await;
                hci.poll().await?;
                let complete = hci.connection_complete();
                if complete.is_some() {
                    hci.clear_connection_complete();
                }
                complete
            };

            if let Some(event) = complete {
                return self.on_connection_complete(address, event).await;
            }

            if Instant::now() >= deadline {
                break;
            }

            sleep(self.config.poll_interval).await;
        }

        warn!(
            "No connection to {} within {:?}, cancelling",
            address, self.config.connect_timeout
        );
        self.transport
            .lock()
            .await
            .le_create_connection_cancel()
            .await?;

        Err(Error::ConnectionFailed {
            reason: format!(
                "no response from {} within {:?}",
                address, self.config.connect_timeout
            ),
        })
    }

    async fn on_connection_complete(
        &self,
        requested: Address,
        event: ConnectionComplete,
    ) -> Result<Connection> {
        if event.status != 0 {
            warn!(
                "Connection to {} failed with status {:#04x}",
                requested, event.status
            );
            return Err(Error::ConnectionFailed {
                reason: format!("controller reported status {:#04x}", event.status),
            });
        }

        let address = Address::from_hci(event.peer_address_type, event.peer_address);
        if address.is_random != requested.is_random {
            warn!(
                "Peer {} reported as {} address, requested as {}",
                address,
                if address.is_random { "random" } else { "public" },
                if requested.is_random { "random" } else { "public" },
            );
        }

        let connection = Connection::new(address, event.handle);
        if let Err(e) = self.registry.add(connection.clone()) {
            warn!(
                "Handle {:#06x} already registered, disconnecting {}",
                event.handle, address
            );
            self.transport
                .lock()
                .await
                .disconnect(event.handle, REASON_REMOTE_USER_TERMINATED)
                .await?;
            return Err(e);
        }

        info!("Connected to {} (handle {:#06x})", address, event.handle);
        Ok(connection)
    }

    /// Disconnect an established connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionNotFound`] without sending anything if the
    /// connection is not registered, which includes a second disconnect.
    pub async fn disconnect(&self, connection: &Connection) -> Result<()> {
        let handle = connection.handle();
        if !self.registry.contains(connection) {
            return Err(Error::ConnectionNotFound { handle });
        }

        self.transport
            .lock()
            .await
            .disconnect(handle, REASON_REMOTE_USER_TERMINATED)
            .await?;
        self.registry.remove(handle)?;

        info!("Disconnected from {} (handle {:#06x})", connection.address(), handle);
        Ok(())
    }
}
