//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/acquire.toml`)
//! 2. environment variables prefixed with `DAQ_ACQUIRE_`, using `__` between nested
//!    keys (e.g. `DAQ_ACQUIRE_SCAN__TIMEOUT_MS=30000`)
//!
//! Every section has defaults, so an empty or missing file yields a usable config.
//!
//! # Example
//! ```no_run
//! use daq_acquire::config::AcquireConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AcquireConfig::load()?;
//! config.validate()?;
//! println!("Scanning every {:?}", config.scan.period());
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{AcquireError, AcquireResult};
use crate::hardware::mock::{ConnectBehavior, MockDevice, MockEnumerator, MockProvisioner};
use crate::hardware::DeviceIdentity;
use crate::logging;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/acquire.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DAQ_ACQUIRE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Scan loop settings
    #[serde(default)]
    pub scan: ScanConfig,
    /// Status consumer settings
    #[serde(default)]
    pub status: StatusConfig,
    /// Simulated bus used when no hardware backend is linked in
    #[serde(default)]
    pub devices: Vec<SimulatedDevice>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Scan loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Interval between bus scans in milliseconds
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Give up after this many milliseconds (absent = wait forever)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Status consumer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// How long a result stays visible before it is acted on, in milliseconds
    #[serde(default = "default_convenience_delay_ms")]
    pub convenience_delay_ms: u64,
}

/// One device on the simulated bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedDevice {
    /// Bus identity
    pub id: DeviceIdentity,
    /// Model name
    pub name: String,
    /// Enumerates in its bootloader and needs an upload
    #[serde(default)]
    pub needs_firmware: bool,
    /// Uploads fail with this message
    #[serde(default)]
    pub firmware_error: Option<String>,
    /// Handshakes fail with this message
    #[serde(default)]
    pub connect_error: Option<String>,
    /// Handshakes fail this many times before succeeding (requires `connect_error`)
    #[serde(default)]
    pub connect_failures: Option<u32>,
    /// Device is plugged in on this scan (1-based); absent = present from the start
    #[serde(default)]
    pub appears_on_scan: Option<u64>,
}

// Default value functions
fn default_name() -> String {
    "daq-acquire".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_period_ms() -> u64 {
    1000
}

fn default_convenience_delay_ms() -> u64 {
    2000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            timeout_ms: None,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            convenience_delay_ms: default_convenience_delay_ms(),
        }
    }
}

impl ScanConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl StatusConfig {
    pub fn convenience_delay(&self) -> Duration {
        Duration::from_millis(self.convenience_delay_ms)
    }
}

impl SimulatedDevice {
    fn to_mock(&self) -> MockDevice {
        let mut device = MockDevice::new(self.name.clone());
        if self.needs_firmware {
            device = device.without_firmware();
        }
        if let Some(message) = &self.firmware_error {
            device = device.with_firmware_error(message.clone());
        }
        if let Some(message) = &self.connect_error {
            let behavior = match self.connect_failures {
                Some(times) => ConnectBehavior::FailTimes(times, message.clone()),
                None => ConnectBehavior::Fail(message.clone()),
            };
            device = device.with_connect(behavior);
        }
        device
    }
}

impl AcquireConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> AcquireResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and the environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AcquireResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The provider stack, for callers that want to merge more sources
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(AcquireConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AcquireResult<()> {
        logging::parse_log_level(&self.application.log_level)?;
        logging::parse_log_format(&self.application.log_format)?;

        if self.scan.period_ms == 0 {
            return Err(AcquireError::Configuration(
                "scan.period_ms must be greater than zero".into(),
            ));
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if !ids.insert(device.id) {
                return Err(AcquireError::Configuration(format!(
                    "Duplicate device id: {}",
                    device.id
                )));
            }
            if device.connect_failures.is_some() && device.connect_error.is_none() {
                return Err(AcquireError::Configuration(format!(
                    "Device {}: connect_failures requires connect_error",
                    device.id
                )));
            }
        }

        Ok(())
    }

    /// Build the simulated bus described by `devices`
    pub fn simulated_bus(&self) -> (MockEnumerator, MockProvisioner) {
        let enumerator = self
            .devices
            .iter()
            .fold(MockEnumerator::new(), |bus, device| match device.appears_on_scan {
                Some(scan) => bus.with_arrival(scan, device.id, device.to_mock()),
                None => bus.with_device(device.id, device.to_mock()),
            });
        (enumerator, MockProvisioner::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{Enumerator, RawDevice};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AcquireConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.scan.period(), Duration::from_millis(1000));
        assert_eq!(config.scan.timeout(), None);
        assert_eq!(config.status.convenience_delay(), Duration::from_millis(2000));
        assert!(config.devices.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [application]
            name = "Scope bench"
            log_level = "debug"

            [scan]
            period_ms = 250
            timeout_ms = 30000

            [[devices]]
            id = 1
            name = "DSO-2250"
            needs_firmware = true

            [[devices]]
            id = 2
            name = "DSO-6022BE"
            connect_error = "device busy"
            connect_failures = 2
            appears_on_scan = 3
            "#,
        );

        let config = AcquireConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.name, "Scope bench");
        assert_eq!(config.scan.period(), Duration::from_millis(250));
        assert_eq!(config.scan.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.devices.len(), 2);
        assert!(config.devices[0].needs_firmware);
        assert_eq!(config.devices[1].appears_on_scan, Some(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AcquireConfig::default();
        config.application.log_level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(AcquireError::Configuration(_))
        ));
    }

    #[test]
    fn test_log_format() {
        let file = write_config(
            r#"
            [application]
            log_format = "json"
            "#,
        );
        let config = AcquireConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_format, "json");
        assert!(config.validate().is_ok());

        assert_eq!(AcquireConfig::default().application.log_format, "compact");

        let mut config = AcquireConfig::default();
        config.application.log_format = "xml".into();
        assert!(matches!(
            config.validate(),
            Err(AcquireError::Configuration(_))
        ));
    }

    #[test]
    fn test_connect_failures_requires_connect_error() {
        let mut device = SimulatedDevice {
            id: DeviceIdentity(3),
            name: "flaky".into(),
            needs_firmware: false,
            firmware_error: None,
            connect_error: None,
            connect_failures: Some(2),
            appears_on_scan: None,
        };
        let config = AcquireConfig {
            devices: vec![device.clone()],
            ..AcquireConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AcquireError::Configuration(msg)) if msg.contains("connect_failures")
        ));

        device.connect_error = Some("busy".into());
        let config = AcquireConfig {
            devices: vec![device],
            ..AcquireConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_period_rejected() {
        let mut config = AcquireConfig::default();
        config.scan.period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_device_ids() {
        let device = SimulatedDevice {
            id: DeviceIdentity(7),
            name: "a".into(),
            needs_firmware: false,
            firmware_error: None,
            connect_error: None,
            connect_failures: None,
            appears_on_scan: None,
        };
        let config = AcquireConfig {
            devices: vec![device.clone(), device],
            ..AcquireConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulated_bus() {
        let file = write_config(
            r#"
            [[devices]]
            id = 16
            name = "late"
            appears_on_scan = 2

            [[devices]]
            id = 17
            name = "boot"
            needs_firmware = true
            "#,
        );
        let config = AcquireConfig::load_from(file.path()).unwrap();
        let (mut bus, _) = config.simulated_bus();

        assert!(bus.update());
        let first: Vec<_> = bus
            .list()
            .into_iter()
            .map(|(id, d)| (id, d.needs_firmware()))
            .collect();
        assert_eq!(first, vec![(DeviceIdentity(17), true)]);

        assert!(bus.update());
        assert_eq!(bus.len(), 2);
    }
}
