//! BLE scanning.
//!
//! Provides the scan engine for discovering nearby advertisers.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::ble::address::Address;
use crate::ble::advertising::{decode, AdvertisementFields, MAX_PACKET_LEN};
use crate::config::GapConfig;
use crate::error::{Error, Result};
use crate::protocol::hci::{
    AdvertisingReport, ScanParameters, SharedTransport, TransportError, ADDRESS_TYPE_PUBLIC,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// A decoded advertising report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// The advertiser's address.
    pub address: Address,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// Decoded advertising data.
    pub fields: AdvertisementFields,
}

impl ScanResult {
    fn from_report(report: &AdvertisingReport) -> Self {
        Self {
            address: Address::from_hci(report.peer_address_type, report.peer_address),
            rssi: i16::from(report.rssi),
            fields: decode(&report.data, usize::from(report.data_length)),
        }
    }
}

/// Scan engine driving the controller's passive scan.
pub struct Scanner {
    transport: SharedTransport,
    scanning: Arc<AtomicBool>,
    config: Arc<GapConfig>,
}

impl Scanner {
    /// Create a scanner over a shared transport.
    pub fn new(transport: SharedTransport, config: Arc<GapConfig>) -> Self {
        Self {
            transport,
            scanning: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Check if a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Scan until [`stop_scan`](Self::stop_scan) is called or the callback
    /// returns [`ControlFlow::Break`].
    ///
    /// The callback runs on the calling task once per decoded report. Reports
    /// declaring more than 31 bytes of data are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanAlreadyActive`] if a scan is running, and
    /// [`Error::Transport`] if the controller fails, which also ends the scan.
    pub async fn scan<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(ScanResult) -> ControlFlow<()> + Send,
    {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::ScanAlreadyActive);
        }

        let result = self.run(&mut callback).await;
        if result.is_err() {
            self.scanning.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn run<F>(&self, callback: &mut F) -> Result<()>
    where
        F: FnMut(ScanResult) -> ControlFlow<()> + Send,
    {
        self.start().await?;
        info!("Scan started");

        let mut last_heartbeat = Instant::now();
        loop {
            if !self.is_scanning() {
                info!("Scan stopped");
                return Ok(());
            }

            match self.next_report().await? {
                Some(report) if usize::from(report.data_length) > MAX_PACKET_LEN => {
                    warn!(
                        "Discarding report from {:02X?} with {} byte data length",
                        report.peer_address, report.data_length
                    );
                }
                Some(report) => {
                    let result = ScanResult::from_report(&report);
                    trace!(
                        "Report from {} rssi {} dBm: {:?}",
                        result.address,
                        result.rssi,
                        result.fields
                    );
                    if callback(result).is_break() {
                        self.finish().await?;
                        info!("Scan ended by callback");
                        return Ok(());
                    }
                }
                None => {
                    if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
                        trace!("Still scanning");
                        last_heartbeat = Instant::now();
                    }
                }
            }

            sleep(self.config.poll_interval).await;
        }
    }

    async fn start(&self) -> std::result::Result<(), TransportError> {
        let params = ScanParameters {
            scan_type: 0x00,
            interval: self.config.scan_interval,
            window: self.config.scan_window,
            own_address_type: ADDRESS_TYPE_PUBLIC,
            filter_policy: 0x00,
        };

        let mut hci = self.transport.lock().await;
        hci.le_set_scan_enable(false, false).await?;
        debug!("LE Set Scan Parameters: {:?}", params);
        hci.le_set_scan_parameters(&params).await?;
        hci.le_set_scan_enable(true, false).await
    }

    async fn next_report(&self) -> std::result::Result<Option<AdvertisingReport>, TransportError> {
        let mut hci = self.transport.lock().await;
        hci.poll().await?;
        let report = hci.advertising_report();
        if report.is_some() {
            hci.clear_advertising_report();
        }
        Ok(report)
    }

    async fn finish(&self) -> Result<()> {
        self.scanning.store(false, Ordering::SeqCst);
        self.transport
            .lock()
            .await
            .le_set_scan_enable(false, false)
            .await?;
        Ok(())
    }

    /// Stop the running scan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanNotActive`] if no scan is running, and
    /// [`Error::Transport`] if the controller rejects the disable.
    pub async fn stop_scan(&self) -> Result<()> {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return Err(Error::ScanNotActive);
        }

        info!("Stopping scan");
        self.transport
            .lock()
            .await
            .le_set_scan_enable(false, false)
            .await?;
        Ok(())
    }
}
