//! Beacon example: advertise a changing temperature reading
//!
//! Advertises "Go Bluetooth" as a scannable beacon carrying temperature
//! service data, reconfiguring and restarting the advertisement every second.
//! The controller is a loopback transport that logs each HCI command.
//!
//! Run with: cargo run --example beacon
//!
//! To stop after a number of rounds:
//!   cargo run --example beacon -- --rounds 5

use std::time::Duration;

use async_trait::async_trait;
use hci_gap::ble::CHARACTERISTIC_TEMPERATURE_UUID;
use hci_gap::protocol::hci::{
    AdvertisingParameters, AdvertisingReport, ConnectionComplete, CreateConnectionParameters,
    ScanParameters,
};
use hci_gap::{
    Adapter, AdvertisementOptions, AdvertisingType, AttServer, HciTransport, Result, Service,
    ServiceDataElement, ServiceTable, TransportError,
};
use tracing::info;

/// Controller stand-in that logs every command it receives.
struct LoopbackHci;

#[async_trait]
impl HciTransport for LoopbackHci {
    async fn le_set_scan_enable(
        &mut self,
        enabled: bool,
        filter_duplicates: bool,
    ) -> std::result::Result<(), TransportError> {
        info!("HCI LE Set Scan Enable {} {}", enabled, filter_duplicates);
        Ok(())
    }

    async fn le_set_scan_parameters(
        &mut self,
        params: &ScanParameters,
    ) -> std::result::Result<(), TransportError> {
        info!("HCI LE Set Scan Parameters {:?}", params);
        Ok(())
    }

    async fn le_create_connection(
        &mut self,
        params: &CreateConnectionParameters,
    ) -> std::result::Result<(), TransportError> {
        info!("HCI LE Create Connection {:?}", params);
        Ok(())
    }

    async fn le_create_connection_cancel(&mut self) -> std::result::Result<(), TransportError> {
        info!("HCI LE Create Connection Cancel");
        Ok(())
    }

    async fn disconnect(
        &mut self,
        handle: u16,
        reason: u8,
    ) -> std::result::Result<(), TransportError> {
        info!("HCI Disconnect {:#06x} reason {:#04x}", handle, reason);
        Ok(())
    }

    async fn le_set_advertising_parameters(
        &mut self,
        params: &AdvertisingParameters,
    ) -> std::result::Result<(), TransportError> {
        info!("HCI LE Set Advertising Parameters {:?}", params);
        Ok(())
    }

    async fn le_set_advertising_data(
        &mut self,
        data: &[u8],
    ) -> std::result::Result<(), TransportError> {
        info!("HCI LE Set Advertising Data {:02X?}", data);
        Ok(())
    }

    async fn le_set_scan_response_data(
        &mut self,
        data: &[u8],
    ) -> std::result::Result<(), TransportError> {
        info!("HCI LE Set Scan Response Data {:02X?}", data);
        Ok(())
    }

    async fn le_set_advertise_enable(
        &mut self,
        enabled: bool,
    ) -> std::result::Result<(), TransportError> {
        info!("HCI LE Set Advertise Enable {}", enabled);
        Ok(())
    }

    async fn poll(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    fn advertising_report(&self) -> Option<AdvertisingReport> {
        None
    }

    fn clear_advertising_report(&mut self) {}

    fn connection_complete(&self) -> Option<ConnectionComplete> {
        None
    }

    fn clear_connection_complete(&mut self) {}
}

/// ATT server with nothing to answer.
struct IdleAtt;

#[async_trait]
impl AttServer for IdleAtt {
    async fn poll(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    fn clear_local_data(&mut self) {}
}

/// Service table that logs what is registered.
struct LoggingServices;

impl ServiceTable for LoggingServices {
    fn add_service(&mut self, service: Service) -> Result<()> {
        info!(
            "Service {} with {} characteristics",
            service.uuid,
            service.characteristics.len()
        );
        Ok(())
    }
}

/// A reading between 100 and 499, like a sensor would report.
fn temperature_reading() -> u16 {
    100 + (chrono::Utc::now().timestamp_subsec_millis() % 400) as u16
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let rounds = args
        .iter()
        .position(|arg| arg == "--rounds")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<usize>().ok());

    let adapter = Adapter::new(LoopbackHci, IdleAtt, LoggingServices);
    let mut adv = adapter.default_advertisement()?;

    println!("advertising...");

    let mut round = 0;
    loop {
        if rounds.is_some_and(|limit| round >= limit) {
            break;
        }

        let reading = temperature_reading();
        adv.configure(AdvertisementOptions {
            advertisement_type: AdvertisingType::ScanInd,
            local_name: "Go Bluetooth".to_string(),
            service_data: vec![ServiceDataElement {
                uuid: CHARACTERISTIC_TEMPERATURE_UUID,
                data: reading.to_le_bytes().to_vec(),
            }],
            ..Default::default()
        })?;
        adv.start().await?;

        println!("Go Bluetooth / temperature {}", reading);
        tokio::time::sleep(Duration::from_secs(1)).await;
        adv.stop().await?;

        round += 1;
    }

    Ok(())
}
