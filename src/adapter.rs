//! Adapter facade.
//!
//! The [`Adapter`] is the entry point of the crate. It owns the shared
//! collaborators and hands out the scan engine, the connector and the
//! single advertisement.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::advertisement::{Advertisement, AdvertisementContext};
use crate::ble::address::Address;
use crate::ble::connection::{Connection, ConnectionParams, Connector};
use crate::ble::registry::ConnectionRegistry;
use crate::ble::scanner::{ScanResult, Scanner};
use crate::config::GapConfig;
use crate::error::{Error, Result};
use crate::protocol::gatt::{AttServer, ServiceTable, SharedAttServer, SharedServiceTable};
use crate::protocol::hci::{shared_transport, HciTransport, SharedTransport};

/// A BLE adapter driven over HCI.
///
/// Cloning is cheap; clones share the transport, the connection registry
/// and the advertising slot.
#[derive(Clone)]
pub struct Adapter {
    transport: SharedTransport,
    att: SharedAttServer,
    services: SharedServiceTable,
    config: Arc<GapConfig>,
    scanner: Arc<Scanner>,
    connector: Arc<Connector>,
    registry: Arc<ConnectionRegistry>,
    advertisement_claimed: Arc<AtomicBool>,
    generic_services_added: Arc<AtomicUsize>,
}

impl Adapter {
    /// Create an adapter with the default configuration.
    pub fn new<T, A, S>(transport: T, att: A, services: S) -> Self
    where
        T: HciTransport + 'static,
        A: AttServer + 'static,
        S: ServiceTable + 'static,
    {
        Self::with_config(transport, att, services, GapConfig::default())
    }

    /// Create an adapter with a custom configuration.
    pub fn with_config<T, A, S>(transport: T, att: A, services: S, config: GapConfig) -> Self
    where
        T: HciTransport + 'static,
        A: AttServer + 'static,
        S: ServiceTable + 'static,
    {
        let transport = shared_transport(transport);
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());

        info!("HCI adapter created");

        Self {
            scanner: Arc::new(Scanner::new(transport.clone(), config.clone())),
            connector: Arc::new(Connector::new(
                transport.clone(),
                registry.clone(),
                config.clone(),
            )),
            transport,
            att: Arc::new(tokio::sync::Mutex::new(att)),
            services: Arc::new(parking_lot::Mutex::new(services)),
            config,
            registry,
            advertisement_claimed: Arc::new(AtomicBool::new(false)),
            generic_services_added: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The adapter configuration.
    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    /// The registry of live connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Scan for advertisers; see [`Scanner::scan`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanAlreadyActive`] if a scan is running, and
    /// [`Error::Transport`] if the controller fails.
    pub async fn scan<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(ScanResult) -> ControlFlow<()> + Send,
    {
        self.scanner.scan(callback).await
    }

    /// Stop the running scan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanNotActive`] if no scan is running.
    pub async fn stop_scan(&self) -> Result<()> {
        self.scanner.stop_scan().await
    }

    /// Check if a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Connect to a peer; see [`Connector::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the peer does not connect.
    pub async fn connect(&self, address: Address, params: ConnectionParams) -> Result<Connection> {
        self.connector.connect(address, params).await
    }

    /// Disconnect from a peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionNotFound`] if the connection is not live.
    pub async fn disconnect(&self, connection: &Connection) -> Result<()> {
        self.connector.disconnect(connection).await
    }

    /// Claim the adapter's advertising set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdvertisementInUse`] while another advertisement from
    /// this adapter is alive.
    pub fn default_advertisement(&self) -> Result<Advertisement> {
        if self
            .advertisement_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AdvertisementInUse);
        }

        Ok(Advertisement::new(AdvertisementContext {
            transport: self.transport.clone(),
            att: self.att.clone(),
            services: self.services.clone(),
            config: self.config.clone(),
            claimed: self.advertisement_claimed.clone(),
            generic_services_added: self.generic_services_added.clone(),
        }))
    }
}
