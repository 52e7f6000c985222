//! Recording fakes of the collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use hci_gap::protocol::hci::{
    AdvertisingParameters, AdvertisingReport, ConnectionComplete, CreateConnectionParameters,
    ScanParameters,
};
use hci_gap::{AttServer, HciTransport, Service, ServiceTable, TransportError};

/// A command sent to the fake controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetScanEnable { enabled: bool, filter_duplicates: bool },
    SetScanParameters(ScanParameters),
    CreateConnection(CreateConnectionParameters),
    CreateConnectionCancel,
    Disconnect { handle: u16, reason: u8 },
    SetAdvertisingParameters(AdvertisingParameters),
    SetAdvertisingData(Vec<u8>),
    SetScanResponseData(Vec<u8>),
    SetAdvertiseEnable(bool),
}

#[derive(Debug, Default)]
pub struct HciState {
    pub commands: Vec<Command>,
    pub polls: usize,
    pub queued_reports: VecDeque<AdvertisingReport>,
    pub report: Option<AdvertisingReport>,
    /// Event delivered after the given number of polls following a create
    /// connection command.
    pub connect_response: Option<(usize, ConnectionComplete)>,
    pending_connect: Option<(usize, ConnectionComplete)>,
    pub complete: Option<ConnectionComplete>,
}

impl HciState {
    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }
}

/// Fake controller recording every command.
#[derive(Debug, Clone, Default)]
pub struct FakeHci {
    pub state: Arc<Mutex<HciState>>,
}

impl FakeHci {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_report(&self, report: AdvertisingReport) {
        self.state.lock().queued_reports.push_back(report);
    }

    pub fn respond_to_connect(&self, after_polls: usize, event: ConnectionComplete) {
        self.state.lock().connect_response = Some((after_polls, event));
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    fn record(&self, command: Command) -> Result<(), TransportError> {
        self.state.lock().commands.push(command);
        Ok(())
    }
}

#[async_trait]
impl HciTransport for FakeHci {
    async fn le_set_scan_enable(
        &mut self,
        enabled: bool,
        filter_duplicates: bool,
    ) -> Result<(), TransportError> {
        self.record(Command::SetScanEnable {
            enabled,
            filter_duplicates,
        })
    }

    async fn le_set_scan_parameters(
        &mut self,
        params: &ScanParameters,
    ) -> Result<(), TransportError> {
        self.record(Command::SetScanParameters(*params))
    }

    async fn le_create_connection(
        &mut self,
        params: &CreateConnectionParameters,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.pending_connect = state.connect_response;
        state.commands.push(Command::CreateConnection(*params));
        Ok(())
    }

    async fn le_create_connection_cancel(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.pending_connect = None;
        state.commands.push(Command::CreateConnectionCancel);
        Ok(())
    }

    async fn disconnect(&mut self, handle: u16, reason: u8) -> Result<(), TransportError> {
        self.record(Command::Disconnect { handle, reason })
    }

    async fn le_set_advertising_parameters(
        &mut self,
        params: &AdvertisingParameters,
    ) -> Result<(), TransportError> {
        self.record(Command::SetAdvertisingParameters(*params))
    }

    async fn le_set_advertising_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.record(Command::SetAdvertisingData(data.to_vec()))
    }

    async fn le_set_scan_response_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.record(Command::SetScanResponseData(data.to_vec()))
    }

    async fn le_set_advertise_enable(&mut self, enabled: bool) -> Result<(), TransportError> {
        self.record(Command::SetAdvertiseEnable(enabled))
    }

    async fn poll(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.polls += 1;

        if state.report.is_none() {
            state.report = state.queued_reports.pop_front();
        }

        if let Some((remaining, event)) = state.pending_connect.take() {
            if remaining == 0 {
                state.complete = Some(event);
            } else {
                state.pending_connect = Some((remaining - 1, event));
            }
        }
        Ok(())
    }

    fn advertising_report(&self) -> Option<AdvertisingReport> {
        self.state.lock().report.clone()
    }

    fn clear_advertising_report(&mut self) {
        self.state.lock().report = None;
    }

    fn connection_complete(&self) -> Option<ConnectionComplete> {
        self.state.lock().complete
    }

    fn clear_connection_complete(&mut self) {
        self.state.lock().complete = None;
    }
}

/// Fake ATT server counting polls and clears.
#[derive(Debug, Clone, Default)]
pub struct FakeAtt {
    pub polls: Arc<AtomicUsize>,
    pub clears: Arc<AtomicUsize>,
}

impl FakeAtt {
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttServer for FakeAtt {
    async fn poll(&mut self) -> Result<(), TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear_local_data(&mut self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fake service table keeping every added service.
#[derive(Debug, Clone, Default)]
pub struct FakeServices {
    pub services: Arc<Mutex<Vec<Service>>>,
}

impl FakeServices {
    pub fn added(&self) -> Vec<Service> {
        self.services.lock().clone()
    }
}

impl ServiceTable for FakeServices {
    fn add_service(&mut self, service: Service) -> hci_gap::Result<()> {
        self.services.lock().push(service);
        Ok(())
    }
}

pub fn report(peer: [u8; 6], data: &[u8]) -> AdvertisingReport {
    AdvertisingReport {
        peer_address_type: 0x00,
        peer_address: peer,
        rssi: -42,
        data_length: data.len() as u8,
        data: Bytes::copy_from_slice(data),
    }
}

pub fn connection_complete(
    handle: u16,
    peer: [u8; 6],
    peer_address_type: u8,
) -> ConnectionComplete {
    ConnectionComplete {
        status: 0x00,
        handle,
        role: 0x00,
        peer_address_type,
        peer_address: peer,
        interval: 0x0006,
        latency: 0,
        supervision_timeout: 0x00C8,
    }
}
