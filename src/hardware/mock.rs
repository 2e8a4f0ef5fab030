//! Mock Hardware Implementations
//!
//! Provides simulated bus collaborators for testing and for running the service
//! without physical hardware. Everything here is synchronous and deterministic;
//! behavior is scripted up front and then driven by the scan worker.
//!
//! # Available Mocks
//!
//! - `MockDevice` - Raw handle with scripted firmware state and connect behavior
//! - `MockEnumerator` - Ordered device pool with tick-scheduled arrivals
//! - `MockProvisioner` - Firmware uploader that follows each device's script
//!
//! # Re-enumeration
//!
//! A successful upload marks the device as re-enumerating, like real hardware that
//! drops off the bus and comes back with its new firmware. The next `update()` then
//! reports a change, and the device connects on that later cycle.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tracing::debug;

use super::{DeviceIdentity, Enumerator, Provisioner, RawDevice};

// =============================================================================
// MockDevice - Simulated Raw Handle
// =============================================================================

/// How a mock device answers the connect handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Handshake always succeeds (once firmware is loaded)
    Succeed,
    /// Handshake always fails with this message
    Fail(String),
    /// Handshake fails this many times with the message, then succeeds
    FailTimes(u32, String),
}

/// Mock raw device handle
///
/// # Example
///
/// ```rust,ignore
/// let mut scope = MockDevice::new("DSO-6022BE").without_firmware();
/// assert!(scope.needs_firmware());
/// assert!(scope.connect().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    firmware_loaded: bool,
    firmware_error: Option<String>,
    connect: ConnectBehavior,
    connected: bool,
    connect_attempts: u32,
    uploads: u32,
    reenumerating: bool,
}

impl MockDevice {
    /// Create a device with firmware loaded that connects successfully
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            firmware_loaded: true,
            firmware_error: None,
            connect: ConnectBehavior::Succeed,
            connected: false,
            connect_attempts: 0,
            uploads: 0,
            reenumerating: false,
        }
    }

    /// Device enumerates in its bootloader and needs an upload first
    pub fn without_firmware(mut self) -> Self {
        self.firmware_loaded = false;
        self
    }

    /// Uploads to this device fail with `message`
    pub fn with_firmware_error(mut self, message: impl Into<String>) -> Self {
        self.firmware_error = Some(message.into());
        self
    }

    /// Script the connect handshake
    pub fn with_connect(mut self, behavior: ConnectBehavior) -> Self {
        self.connect = behavior;
        self
    }

    /// True between a successful `connect` and the next `disconnect`
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Number of handshakes attempted on this handle
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    /// Number of firmware uploads performed on this handle
    pub fn uploads(&self) -> u32 {
        self.uploads
    }

    fn take_reenumeration(&mut self) -> bool {
        std::mem::take(&mut self.reenumerating)
    }
}

impl RawDevice for MockDevice {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn needs_firmware(&self) -> bool {
        !self.firmware_loaded
    }

    fn connect(&mut self) -> Result<()> {
        self.connect_attempts += 1;

        if !self.firmware_loaded {
            return Err(anyhow!("{} is running its bootloader", self.name));
        }

        match &mut self.connect {
            ConnectBehavior::Succeed => {}
            ConnectBehavior::Fail(message) => return Err(anyhow!(message.clone())),
            ConnectBehavior::FailTimes(remaining, message) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow!(message.clone()));
                }
            }
        }

        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

// =============================================================================
// MockEnumerator - Simulated Bus
// =============================================================================

/// Mock bus scanner with an ordered pool
///
/// Devices added with [`with_device`](Self::with_device) are present from the first
/// scan. Devices added with [`with_arrival`](Self::with_arrival) show up on the given
/// `update()` call (1-based), which lets tests model hot-plugging.
#[derive(Debug, Default)]
pub struct MockEnumerator {
    pool: Vec<(DeviceIdentity, MockDevice)>,
    arrivals: Vec<(u64, DeviceIdentity, MockDevice)>,
    updates: u64,
    dirty: bool,
    always_changed: bool,
}

impl MockEnumerator {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device that is present from the first scan
    pub fn with_device(mut self, id: impl Into<DeviceIdentity>, device: MockDevice) -> Self {
        self.pool.push((id.into(), device));
        self.dirty = true;
        self
    }

    /// Add a device that appears on the `update`-th scan (1-based)
    pub fn with_arrival(
        mut self,
        update: u64,
        id: impl Into<DeviceIdentity>,
        device: MockDevice,
    ) -> Self {
        self.arrivals.push((update.max(1), id.into(), device));
        self
    }

    /// Report a change on every scan, like a bus that keeps resetting
    pub fn always_changed(mut self) -> Self {
        self.always_changed = true;
        self
    }

    /// Number of `update()` calls so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Number of handles still in the pool
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// True when the pool holds no handles
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

impl Enumerator for MockEnumerator {
    type Device = MockDevice;

    fn update(&mut self) -> bool {
        self.updates += 1;
        let now = self.updates;

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.arrivals)
            .into_iter()
            .partition(|(at, _, _)| *at <= now);
        self.arrivals = pending;
        for (_, id, device) in due {
            debug!(%id, name = %device.name, "Mock device arrived");
            self.pool.push((id, device));
            self.dirty = true;
        }

        for (_, device) in &mut self.pool {
            if device.take_reenumeration() {
                self.dirty = true;
            }
        }

        std::mem::take(&mut self.dirty) || self.always_changed
    }

    fn list(&mut self) -> Vec<(DeviceIdentity, &mut MockDevice)> {
        self.pool
            .iter_mut()
            .map(|(id, device)| (*id, device))
            .collect()
    }

    fn take(&mut self, id: DeviceIdentity) -> Option<MockDevice> {
        let index = self.pool.iter().position(|(pooled, _)| *pooled == id)?;
        self.dirty = true;
        Some(self.pool.remove(index).1)
    }
}

// =============================================================================
// MockProvisioner - Simulated Firmware Upload
// =============================================================================

/// Mock firmware uploader
///
/// By default an upload fails only if the device was built with
/// [`MockDevice::with_firmware_error`]. [`MockProvisioner::failing`] overrides that
/// and fails every upload.
#[derive(Debug, Clone, Default)]
pub struct MockProvisioner {
    forced_error: Option<String>,
    upload_time: Duration,
}

impl MockProvisioner {
    /// Uploader that follows each device's script
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploader that fails every upload with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            forced_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Block for `upload_time` on every upload
    pub fn with_upload_time(mut self, upload_time: Duration) -> Self {
        self.upload_time = upload_time;
        self
    }
}

impl Provisioner<MockDevice> for MockProvisioner {
    fn upload(&mut self, device: &mut MockDevice) -> Result<()> {
        // Runs on the scan worker, which owns its thread; blocking is the point.
        if !self.upload_time.is_zero() {
            std::thread::sleep(self.upload_time);
        }

        device.uploads += 1;

        if let Some(message) = self.forced_error.as_ref().or(device.firmware_error.as_ref()) {
            return Err(anyhow!(message.clone()));
        }

        device.firmware_loaded = true;
        device.reenumerating = true;
        Ok(())
    }
}
