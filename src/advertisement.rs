//! Advertisement controller.
//!
//! An [`Advertisement`] owns the adapter's single advertising set. While it
//! is advertising a background task keeps the ATT server polled so peers
//! that connect get their requests answered.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::advertising::{
    AdvertisementFields, AdvertisementPayload, ManufacturerDataElement, ServiceDataElement,
};
use crate::config::{duration_to_units, GapConfig, ADVERTISING_UNIT};
use crate::error::{Error, Result};
use crate::protocol::gatt::{generic_services, SharedAttServer, SharedServiceTable};
use crate::protocol::hci::{AdvertisingParameters, SharedTransport, ADDRESS_TYPE_PUBLIC};

/// Advertising PDU type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AdvertisingType {
    /// Connectable and scannable undirected.
    #[default]
    Ind = 0x00,
    /// Connectable directed, high duty cycle.
    DirectIndHighDuty = 0x01,
    /// Scannable undirected.
    ScanInd = 0x02,
    /// Non-connectable undirected.
    NonConnInd = 0x03,
    /// Connectable directed, low duty cycle.
    DirectIndLowDuty = 0x04,
}

impl From<AdvertisingType> for u8 {
    fn from(value: AdvertisingType) -> Self {
        value as u8
    }
}

/// What to advertise and how.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisementOptions {
    /// Advertising PDU type.
    pub advertisement_type: AdvertisingType,
    /// Local name; blank falls back to the adapter's default name.
    pub local_name: String,
    /// Service UUIDs; only a single UUID is placed in the packet.
    pub service_uuids: Vec<Uuid>,
    /// Advertising interval; zero falls back to the adapter's default.
    pub interval: Duration,
    /// Manufacturer specific data elements.
    pub manufacturer_data: Vec<ManufacturerDataElement>,
    /// Service data elements, 16-bit service UUIDs only.
    pub service_data: Vec<ServiceDataElement>,
}

/// Lifecycle state of an [`Advertisement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvertisementState {
    /// No options set yet.
    Unconfigured,
    /// Options set, not on air.
    Configured,
    /// On air with the background task running.
    Advertising,
}

impl fmt::Display for AdvertisementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdvertisementState::Unconfigured => "unconfigured",
            AdvertisementState::Configured => "configured",
            AdvertisementState::Advertising => "advertising",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
struct Settings {
    advertisement_type: AdvertisingType,
    local_name: String,
    service_uuids: Vec<Uuid>,
    interval: u16,
    manufacturer_data: Vec<ManufacturerDataElement>,
    service_data: Vec<ServiceDataElement>,
}

impl Settings {
    fn fields(&self) -> AdvertisementFields {
        AdvertisementFields {
            local_name: Some(self.local_name.clone()),
            service_uuids: self.service_uuids.clone(),
            manufacturer_data: self.manufacturer_data.clone(),
            service_data: self.service_data.clone(),
        }
    }

    fn parameters(&self) -> AdvertisingParameters {
        AdvertisingParameters {
            interval_min: self.interval,
            interval_max: self.interval,
            advertising_type: self.advertisement_type.into(),
            own_address_type: ADDRESS_TYPE_PUBLIC,
            peer_address_type: 0x00,
            peer_address: [0u8; 6],
            channel_map: 0x07,
            filter_policy: 0x00,
        }
    }
}

struct AttTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Collaborators an advertisement shares with its adapter.
#[derive(Clone)]
pub(crate) struct AdvertisementContext {
    pub(crate) transport: SharedTransport,
    pub(crate) att: SharedAttServer,
    pub(crate) services: SharedServiceTable,
    pub(crate) config: Arc<GapConfig>,
    pub(crate) claimed: Arc<AtomicBool>,
    /// Number of generic services already in the service table.
    pub(crate) generic_services_added: Arc<AtomicUsize>,
}

/// The adapter's advertising set.
///
/// Obtained from [`Adapter::default_advertisement`](crate::Adapter::default_advertisement).
/// Dropping it while advertising stops the background task and disables
/// advertising on the controller before the slot is freed for the next
/// advertisement.
pub struct Advertisement {
    context: AdvertisementContext,
    state: AdvertisementState,
    settings: Settings,
    task: Option<AttTask>,
}

impl Advertisement {
    pub(crate) fn new(context: AdvertisementContext) -> Self {
        Self {
            context,
            state: AdvertisementState::Unconfigured,
            settings: Settings::default(),
            task: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AdvertisementState {
        self.state
    }

    /// Configured local name, empty until configured.
    pub fn local_name(&self) -> &str {
        &self.settings.local_name
    }

    /// Configured advertising interval in 0.625 ms units, zero until configured.
    pub fn interval(&self) -> u16 {
        self.settings.interval
    }

    /// Set what to advertise.
    ///
    /// The first call on an adapter also registers the Generic Access and
    /// Generic Attribute services.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAdvertisementState`] while advertising, and
    /// [`Error::ServiceRegistration`] if the service table rejects a generic
    /// service.
    pub fn configure(&mut self, options: AdvertisementOptions) -> Result<()> {
        if self.state == AdvertisementState::Advertising {
            return Err(self.invalid_state("configure"));
        }

        let config = &self.context.config;
        let local_name = if options.local_name.trim().is_empty() {
            config.default_local_name.clone()
        } else {
            options.local_name
        };
        let interval = if options.interval.is_zero() {
            config.default_advertising_interval
        } else {
            duration_to_units(options.interval, ADVERTISING_UNIT)
        };

        self.register_generic_services(&local_name)?;

        self.settings = Settings {
            advertisement_type: options.advertisement_type,
            local_name,
            service_uuids: options.service_uuids,
            interval,
            manufacturer_data: options.manufacturer_data,
            service_data: options.service_data,
        };
        self.state = AdvertisementState::Configured;

        debug!(
            "Advertisement configured: {:?} \"{}\" every {} units",
            self.settings.advertisement_type, self.settings.local_name, interval
        );
        Ok(())
    }

    fn register_generic_services(&self, local_name: &str) -> Result<()> {
        let added = &self.context.generic_services_added;
        let mut services = self.context.services.lock();
        let pending = generic_services(local_name.as_bytes(), self.context.config.appearance)
            .into_iter()
            .skip(added.load(Ordering::SeqCst));

        for service in pending {
            debug!("Registering generic service {}", service.uuid);
            services.add_service(service)?;
            added.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Put the advertisement on air.
    ///
    /// Both packets are encoded before anything is sent to the controller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAdvertisementState`] unless configured, a
    /// capacity error if the data does not fit, and [`Error::Transport`] if
    /// the controller fails.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != AdvertisementState::Configured {
            return Err(self.invalid_state("start"));
        }

        let AdvertisementPayload {
            advertising_data,
            scan_response,
        } = self.settings.fields().encode()?;
        let params = self.settings.parameters();

        {
            let mut hci = self.context.transport.lock().await;
            debug!("LE Set Advertising Parameters: {:?}", params);
            hci.le_set_advertising_parameters(&params).await?;
            hci.le_set_advertising_data(&advertising_data).await?;
            hci.le_set_scan_response_data(&scan_response).await?;
            hci.le_set_advertise_enable(true).await?;
        }

        self.task = Some(self.spawn_att_task());
        self.state = AdvertisementState::Advertising;

        info!("Advertising \"{}\"", self.settings.local_name);
        Ok(())
    }

    fn spawn_att_task(&self) -> AttTask {
        let (stop, mut stop_rx) = oneshot::channel();
        let att = self.context.att.clone();
        let poll_interval = self.context.config.poll_interval;

        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = att.lock().await.poll().await {
                    warn!("ATT poll failed: {}", e);
                }

                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = sleep(poll_interval) => {}
                }
            }
            debug!("ATT task ended");
        });

        AttTask { stop, handle }
    }

    /// Take the advertisement off air.
    ///
    /// Returns once the background task has terminated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAdvertisementState`] unless advertising,
    /// [`Error::Transport`] if the controller fails, and [`Error::Internal`]
    /// if the background task panicked.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != AdvertisementState::Advertising {
            return Err(self.invalid_state("stop"));
        }

        self.context
            .transport
            .lock()
            .await
            .le_set_advertise_enable(false)
            .await?;

        sleep(self.context.config.poll_interval).await;
        self.context.att.lock().await.clear_local_data();

        self.state = AdvertisementState::Configured;
        if let Some(task) = self.task.take() {
            let _ = task.stop.send(());
            task.handle
                .await
                .map_err(|e| Error::Internal(format!("ATT task failed: {}", e)))?;
        }

        info!("Advertising stopped");
        Ok(())
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidAdvertisementState {
            operation,
            state: self.state.to_string(),
        }
    }
}

impl fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advertisement")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        let claimed = self.context.claimed.clone();
        let Some(task) = self.task.take() else {
            claimed.store(false, Ordering::SeqCst);
            return;
        };

        let _ = task.stop.send(());
        let Ok(runtime) = Handle::try_current() else {
            warn!("Advertisement dropped outside a runtime, advertising left enabled");
            claimed.store(false, Ordering::SeqCst);
            return;
        };

        // The slot stays claimed until the controller has stopped advertising.
        let transport = self.context.transport.clone();
        runtime.spawn(async move {
            if let Err(e) = task.handle.await {
                warn!("ATT task failed: {}", e);
            }
            if let Err(e) = transport.lock().await.le_set_advertise_enable(false).await {
                warn!("Failed to disable advertising on drop: {}", e);
            }
            claimed.store(false, Ordering::SeqCst);
            info!("Advertising stopped on drop");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::{
        uuid_from_u16, CHARACTERISTIC_TEMPERATURE_UUID, SERVICE_GENERIC_ACCESS_UUID,
        SERVICE_GENERIC_ATTRIBUTE_UUID,
    };
    use crate::protocol::gatt::{MockAttServer, MockServiceTable};
    use crate::protocol::hci::{shared_transport, MockHciTransport};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use tokio_test::assert_ok;

    fn context(
        hci: MockHciTransport,
        att: MockAttServer,
        services: MockServiceTable,
    ) -> AdvertisementContext {
        AdvertisementContext {
            transport: shared_transport(hci),
            att: Arc::new(tokio::sync::Mutex::new(att)),
            services: Arc::new(parking_lot::Mutex::new(services)),
            config: Arc::new(GapConfig::default()),
            claimed: Arc::new(AtomicBool::new(true)),
            generic_services_added: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn accepting_services(times: usize) -> MockServiceTable {
        let mut services = MockServiceTable::new();
        services.expect_add_service().times(times).returning(|_| Ok(()));
        services
    }

    fn options(name: &str) -> AdvertisementOptions {
        AdvertisementOptions {
            advertisement_type: AdvertisingType::ScanInd,
            local_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AdvertisementState::Unconfigured.to_string(), "unconfigured");
        assert_eq!(AdvertisementState::Advertising.to_string(), "advertising");
    }

    #[test]
    fn test_configure_defaults() {
        let ctx = context(
            MockHciTransport::new(),
            MockAttServer::new(),
            accepting_services(2),
        );
        let mut adv = Advertisement::new(ctx);
        assert_eq!(adv.state(), AdvertisementState::Unconfigured);

        adv.configure(options("  ")).unwrap();

        assert_eq!(adv.state(), AdvertisementState::Configured);
        assert_eq!(adv.local_name(), "hci-gap");
        assert_eq!(adv.interval(), 0x0800);
    }

    #[test]
    fn test_configure_registers_generic_services_once() {
        let ctx = context(
            MockHciTransport::new(),
            MockAttServer::new(),
            accepting_services(2),
        );
        let mut adv = Advertisement::new(ctx);

        adv.configure(options("first")).unwrap();
        adv.configure(AdvertisementOptions {
            interval: Duration::from_millis(100),
            ..options("second")
        })
        .unwrap();

        assert_eq!(adv.local_name(), "second");
        assert_eq!(adv.interval(), 160);
    }

    #[test]
    fn test_configure_service_table_failure() {
        let mut services = MockServiceTable::new();
        services.expect_add_service().times(1).returning(|_| {
            Err(Error::ServiceRegistration {
                reason: "table full".to_string(),
            })
        });
        let ctx = context(MockHciTransport::new(), MockAttServer::new(), services);
        let added = ctx.generic_services_added.clone();
        let mut adv = Advertisement::new(ctx);

        let err = adv.configure(options("sensor")).unwrap_err();

        assert!(matches!(err, Error::ServiceRegistration { .. }));
        assert_eq!(adv.state(), AdvertisementState::Unconfigured);
        assert_eq!(added.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_configure_retry_adds_only_missing_services() {
        let table: Arc<parking_lot::Mutex<Vec<Uuid>>> = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut services = MockServiceTable::new();
        let sink = table.clone();
        let counter = calls.clone();
        services.expect_add_service().returning(move |service| {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(Error::ServiceRegistration {
                    reason: "table full".to_string(),
                });
            }
            sink.lock().push(service.uuid);
            Ok(())
        });
        let mut adv = Advertisement::new(context(
            MockHciTransport::new(),
            MockAttServer::new(),
            services,
        ));

        adv.configure(options("sensor")).unwrap_err();
        adv.configure(options("sensor")).unwrap();
        adv.configure(options("sensor")).unwrap();

        assert_eq!(
            *table.lock(),
            vec![SERVICE_GENERIC_ACCESS_UUID, SERVICE_GENERIC_ATTRIBUTE_UUID]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(adv.state(), AdvertisementState::Configured);
    }

    #[tokio::test]
    async fn test_start_requires_configuration() {
        let ctx = context(
            MockHciTransport::new(),
            MockAttServer::new(),
            MockServiceTable::new(),
        );
        let mut adv = Advertisement::new(ctx);

        let err = adv.start().await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot start advertisement while unconfigured");

        let err = adv.stop().await.unwrap_err();
        assert!(matches!(err, Error::InvalidAdvertisementState { .. }));
    }

    #[tokio::test]
    async fn test_start_capacity_error_writes_nothing() {
        let ctx = context(
            MockHciTransport::new(),
            MockAttServer::new(),
            accepting_services(2),
        );
        let mut adv = Advertisement::new(ctx);
        adv.configure(AdvertisementOptions {
            manufacturer_data: vec![ManufacturerDataElement {
                company_id: 0xFFFF,
                data: vec![0u8; 30],
            }],
            ..options("sensor")
        })
        .unwrap();

        let err = adv.start().await.unwrap_err();

        assert!(matches!(err, Error::ManufacturerDataTooLong { .. }));
        assert_eq!(adv.state(), AdvertisementState::Configured);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let mut hci = MockHciTransport::new();
        hci.expect_le_set_advertising_parameters()
            .withf(|p| {
                p.interval_min == 0x0800
                    && p.interval_max == 0x0800
                    && p.advertising_type == 0x02
                    && p.channel_map == 0x07
            })
            .times(1)
            .returning(|_| Ok(()));
        hci.expect_le_set_advertising_data()
            .withf(|data| data.to_vec() == vec![0x02, 0x01, 0x06, 0x03, 0x03, 0x1A, 0x18])
            .times(1)
            .returning(|_| Ok(()));
        hci.expect_le_set_scan_response_data()
            .times(1)
            .returning(|_| Ok(()));
        hci.expect_le_set_advertise_enable()
            .times(2)
            .returning(|_| Ok(()));

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut att = MockAttServer::new();
        att.expect_poll().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        att.expect_clear_local_data().times(1).return_const(());

        let mut adv = Advertisement::new(context(hci, att, accepting_services(2)));
        adv.configure(AdvertisementOptions {
            service_uuids: vec![uuid_from_u16(0x181A)],
            service_data: vec![ServiceDataElement {
                uuid: CHARACTERISTIC_TEMPERATURE_UUID,
                data: vec![0x34, 0x08],
            }],
            ..options("Go Bluetooth")
        })
        .unwrap();

        assert_ok!(adv.start().await);
        assert_eq!(adv.state(), AdvertisementState::Advertising);

        sleep(Duration::from_millis(50)).await;
        assert!(polls.load(Ordering::SeqCst) > 1);

        let err = adv.configure(options("busy")).unwrap_err();
        assert!(matches!(err, Error::InvalidAdvertisementState { .. }));

        assert_ok!(adv.stop().await);
        assert_eq!(adv.state(), AdvertisementState::Configured);
        assert!(adv.task.is_none());

        let after_stop = polls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(polls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_att_poll_errors_do_not_end_task() {
        let mut hci = MockHciTransport::new();
        hci.expect_le_set_advertising_parameters()
            .returning(|_| Ok(()));
        hci.expect_le_set_advertising_data().returning(|_| Ok(()));
        hci.expect_le_set_scan_response_data().returning(|_| Ok(()));
        hci.expect_le_set_advertise_enable().returning(|_| Ok(()));

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut att = MockAttServer::new();
        att.expect_poll().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(crate::protocol::hci::TransportError::Other("bad request".into()))
        });
        att.expect_clear_local_data().return_const(());

        let mut adv = Advertisement::new(context(hci, att, accepting_services(2)));
        adv.configure(options("sensor")).unwrap();
        adv.start().await.unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(polls.load(Ordering::SeqCst) > 2);

        adv.stop().await.unwrap();
    }

    #[test]
    fn test_drop_releases_claim() {
        let ctx = context(
            MockHciTransport::new(),
            MockAttServer::new(),
            MockServiceTable::new(),
        );
        let claimed = ctx.claimed.clone();
        let adv = Advertisement::new(ctx);
        assert!(claimed.load(Ordering::SeqCst));

        drop(adv);
        assert!(!claimed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_while_advertising_disables_before_release() {
        let mut hci = MockHciTransport::new();
        hci.expect_le_set_advertising_parameters()
            .returning(|_| Ok(()));
        hci.expect_le_set_advertising_data().returning(|_| Ok(()));
        hci.expect_le_set_scan_response_data().returning(|_| Ok(()));
        hci.expect_le_set_advertise_enable()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(()));
        hci.expect_le_set_advertise_enable()
            .with(eq(false))
            .times(1)
            .returning(|_| Ok(()));

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut att = MockAttServer::new();
        att.expect_poll().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let ctx = context(hci, att, accepting_services(2));
        let claimed = ctx.claimed.clone();
        let mut adv = Advertisement::new(ctx);
        adv.configure(options("sensor")).unwrap();
        adv.start().await.unwrap();
        sleep(Duration::from_millis(20)).await;

        drop(adv);
        assert!(claimed.load(Ordering::SeqCst));

        sleep(Duration::from_millis(20)).await;
        assert!(!claimed.load(Ordering::SeqCst));

        let after_release = polls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(polls.load(Ordering::SeqCst), after_release);
    }
}
