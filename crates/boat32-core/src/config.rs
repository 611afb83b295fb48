//! Startup configuration
//!
//! Everything here is fixed once the firmware starts. The firmware fills it
//! from build-time environment values; the simulator from its own env.

use core::str::FromStr;

use embassy_time::Duration;
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::sensors::ProbeAddress;

pub const MAX_CREDENTIALS: usize = 8;
/// Name answered over mDNS on the local network (`boat-companion.local`).
pub const LOCAL_HOSTNAME: &str = "boat-companion";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("credential table is empty")]
    NoCredentials,
    #[error("credential entry {0} has no ':' separator")]
    MalformedCredential(usize),
    #[error("credential entry {0} has an empty network name")]
    EmptySsid(usize),
    #[error("too many credentials")]
    TooManyCredentials,
    #[error("{0} is too long")]
    TooLong(&'static str),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub ssid: String<32>,
    pub password: String<64>,
}

/// Ordered, non-empty list of networks to try.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialTable {
    entries: Vec<Credential, MAX_CREDENTIALS>,
}

impl CredentialTable {
    /// Parse `ssid:password;ssid:password`, keeping the written order.
    ///
    /// The password is everything after the first `:`, so it may itself
    /// contain colons. Empty segments (e.g. a trailing `;`) are skipped.
    pub fn parse(encoded: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();

        for (index, entry) in encoded
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .enumerate()
        {
            let (ssid, password) = entry
                .split_once(':')
                .ok_or(ConfigError::MalformedCredential(index))?;
            if ssid.is_empty() {
                return Err(ConfigError::EmptySsid(index));
            }

            let credential = Credential {
                ssid: String::from_str(ssid).map_err(|_| ConfigError::TooLong("ssid"))?,
                password: String::from_str(password)
                    .map_err(|_| ConfigError::TooLong("password"))?,
            };
            entries
                .push(credential)
                .map_err(|_| ConfigError::TooManyCredentials)?;
        }

        if entries.is_empty() {
            return Err(ConfigError::NoCredentials);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.entries.iter()
    }
}

/// Overlay VPN identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    pub hostname: String<32>,
    pub join_code: String<96>,
    pub dashboard: String<64>,
    /// Pause between failed join attempts
    pub retry_ms: u64,
}

impl OverlayConfig {
    pub fn new(hostname: &str, join_code: &str, dashboard: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            hostname: String::from_str(hostname).map_err(|_| ConfigError::TooLong("hostname"))?,
            join_code: String::from_str(join_code)
                .map_err(|_| ConfigError::TooLong("join code"))?,
            dashboard: String::from_str(dashboard)
                .map_err(|_| ConfigError::TooLong("dashboard"))?,
            retry_ms: 5_000,
        })
    }

    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityConfig {
    /// Interval between association status polls
    pub poll_interval_ms: u64,
    /// Status polls per credential before moving on
    pub max_polls: u8,
    /// Pause between cycles and between link health checks
    pub cooldown_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_polls: 6,
            cooldown_ms: 5_000,
        }
    }
}

impl ConnectivityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Sender identifiers stamped on every telemetry frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryIds {
    pub system_id: u8,
    pub component_id: u8,
}

impl Default for TelemetryIds {
    fn default() -> Self {
        Self {
            system_id: 1,
            component_id: 191,
        }
    }
}

/// Sampling periods of the acquisition tasks, in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub temperature_ms: u64,
    pub position_ms: u64,
    pub instrumentation_ms: u64,
    pub auxiliary_ms: u64,
    pub control_ms: u64,
    pub diagnostics_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            temperature_ms: 10_000,
            position_ms: 6_000,
            instrumentation_ms: 8_000,
            auxiliary_ms: 100,
            control_ms: 5,
            diagnostics_ms: 25_000,
        }
    }
}

/// Addresses of the motor and secondary temperature probes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeAddresses {
    pub motor: ProbeAddress,
    pub secondary: ProbeAddress,
}

impl Default for ProbeAddresses {
    fn default() -> Self {
        Self {
            motor: [0x28, 0x86, 0x1C, 0x07, 0xD6, 0x01, 0x3C, 0x8C],
            // Unassigned until a rescan reports the second probe.
            secondary: [0; 8],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub credentials: CredentialTable,
    pub overlay: OverlayConfig,
    pub connectivity: ConnectivityConfig,
    pub telemetry: TelemetryIds,
    pub timings: Timings,
    pub probes: ProbeAddresses,
}

impl Config {
    /// Build a configuration with default timings from the provisioning values.
    pub fn new(credentials: CredentialTable, overlay: OverlayConfig) -> Self {
        Self {
            credentials,
            overlay,
            connectivity: ConnectivityConfig::default(),
            telemetry: TelemetryIds::default(),
            timings: Timings::default(),
            probes: ProbeAddresses::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_keep_written_order() {
        let table = CredentialTable::parse("harbour:secret;dock:pa:ss;").unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().ssid.as_str(), "harbour");
        assert_eq!(table.get(1).unwrap().ssid.as_str(), "dock");
        assert_eq!(table.get(1).unwrap().password.as_str(), "pa:ss");
    }

    #[test]
    fn test_empty_table_rejected() {
        assert_eq!(CredentialTable::parse(""), Err(ConfigError::NoCredentials));
        assert_eq!(CredentialTable::parse(" ; "), Err(ConfigError::NoCredentials));
    }

    #[test]
    fn test_entry_without_separator_rejected() {
        assert_eq!(
            CredentialTable::parse("ok:pw;broken"),
            Err(ConfigError::MalformedCredential(1))
        );
    }

    #[test]
    fn test_open_network_allowed() {
        let table = CredentialTable::parse("guest:").unwrap();
        assert!(table.get(0).unwrap().password.is_empty());
    }

    #[test]
    fn test_default_identifiers() {
        let ids = TelemetryIds::default();
        assert_eq!((ids.system_id, ids.component_id), (1, 191));
    }
}
