//! Adapter configuration.
//!
//! Timing parameters and protocol defaults live here so they can be tuned in
//! one place. HCI interval values are in controller units (0.625 ms for scan
//! and advertising intervals, 1.25 ms for connection intervals, 10 ms for
//! supervision timeouts).

use std::time::Duration;

use crate::ble::uuids::APPEARANCE_GENERIC_SENSOR;

/// Default pause between two polls of a collaborator.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Default deadline for a connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default scan interval, 40 ms.
pub const DEFAULT_SCAN_INTERVAL: u16 = 0x0040;

/// Default scan window, 30 ms.
pub const DEFAULT_SCAN_WINDOW: u16 = 0x0030;

/// Default advertising interval, 1.28 s.
pub const DEFAULT_ADVERTISING_INTERVAL: u16 = 0x0800;

/// Local name used when an advertisement is configured without one.
pub const DEFAULT_LOCAL_NAME: &str = "hci-gap";

/// Connection parameters sent with LE Create Connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionDefaults {
    /// Scan interval while initiating (0x0060 = 60 ms).
    pub scan_interval: u16,
    /// Scan window while initiating (0x0030 = 30 ms).
    pub scan_window: u16,
    /// Minimum connection interval (0x0006 = 7.5 ms).
    pub interval_min: u16,
    /// Maximum connection interval (0x000C = 15 ms).
    pub interval_max: u16,
    /// Peripheral latency.
    pub latency: u16,
    /// Supervision timeout (0x00C8 = 2 s).
    pub supervision_timeout: u16,
    /// Minimum connection event length.
    pub min_ce_length: u16,
    /// Maximum connection event length.
    pub max_ce_length: u16,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            scan_interval: 0x0060,
            scan_window: 0x0030,
            interval_min: 0x0006,
            interval_max: 0x000C,
            latency: 0x0000,
            supervision_timeout: 0x00C8,
            min_ce_length: 0x0004,
            max_ce_length: 0x0006,
        }
    }
}

/// Configuration of an [`Adapter`](crate::Adapter).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GapConfig {
    /// Pause between two polls in every polling loop.
    pub poll_interval: Duration,
    /// Scan interval in 0.625 ms units.
    pub scan_interval: u16,
    /// Scan window in 0.625 ms units.
    pub scan_window: u16,
    /// Deadline for a connection attempt.
    pub connect_timeout: Duration,
    /// Parameters sent with LE Create Connection.
    pub connection: ConnectionDefaults,
    /// Local name used when an advertisement has none.
    pub default_local_name: String,
    /// Advertising interval used when an advertisement has none, 0.625 ms units.
    pub default_advertising_interval: u16,
    /// Appearance exposed by the Generic Access service.
    pub appearance: u16,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            scan_window: DEFAULT_SCAN_WINDOW,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connection: ConnectionDefaults::default(),
            default_local_name: DEFAULT_LOCAL_NAME.to_string(),
            default_advertising_interval: DEFAULT_ADVERTISING_INTERVAL,
            appearance: APPEARANCE_GENERIC_SENSOR,
        }
    }
}

impl GapConfig {
    /// Set the pause between polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the scan interval and window, both in 0.625 ms units.
    pub fn with_scan_timing(mut self, interval: u16, window: u16) -> Self {
        self.scan_interval = interval;
        self.scan_window = window;
        self
    }

    /// Set the connection attempt deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the LE Create Connection parameters.
    pub fn with_connection_defaults(mut self, connection: ConnectionDefaults) -> Self {
        self.connection = connection;
        self
    }

    /// Set the fallback local name.
    pub fn with_default_local_name(mut self, name: impl Into<String>) -> Self {
        self.default_local_name = name.into();
        self
    }

    /// Set the Generic Access appearance value.
    pub fn with_appearance(mut self, appearance: u16) -> Self {
        self.appearance = appearance;
        self
    }
}

/// Convert a duration to a count of `unit` ticks, saturating at `u16::MAX`.
pub fn duration_to_units(duration: Duration, unit: Duration) -> u16 {
    let ticks = duration.as_micros() / unit.as_micros().max(1);
    ticks.min(u16::MAX as u128) as u16
}

/// 0.625 ms, the unit of scan and advertising intervals.
pub const ADVERTISING_UNIT: Duration = Duration::from_micros(625);

/// 1.25 ms, the unit of connection intervals.
pub const CONNECTION_INTERVAL_UNIT: Duration = Duration::from_micros(1250);

/// 10 ms, the unit of supervision timeouts.
pub const SUPERVISION_TIMEOUT_UNIT: Duration = Duration::from_millis(10);
