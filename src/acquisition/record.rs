//! Per-scan device records and snapshots.

use std::fmt;
use std::ops::Deref;

use crate::hardware::DeviceIdentity;

/// Classification of one raw device during one scan cycle.
///
/// Records are built once per changed scan and never mutated afterwards. Readiness
/// is derived from the stored flags so a device that still needs firmware can never
/// report itself ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    identity: DeviceIdentity,
    display_name: String,
    last_error: Option<String>,
    needs_firmware: bool,
    can_connect: bool,
}

impl DeviceRecord {
    /// Device that needs firmware. `upload_error` is set when the upload failed.
    pub fn needing_firmware(
        identity: DeviceIdentity,
        display_name: impl Into<String>,
        upload_error: Option<String>,
    ) -> Self {
        Self {
            identity,
            display_name: display_name.into(),
            last_error: upload_error,
            needs_firmware: true,
            can_connect: false,
        }
    }

    /// Device that answered the connect handshake.
    pub fn connectable(identity: DeviceIdentity, display_name: impl Into<String>) -> Self {
        Self {
            identity,
            display_name: display_name.into(),
            last_error: None,
            needs_firmware: false,
            can_connect: true,
        }
    }

    /// Device that refused the connect handshake.
    pub fn unreachable(
        identity: DeviceIdentity,
        display_name: impl Into<String>,
        connect_error: Option<String>,
    ) -> Self {
        Self {
            identity,
            display_name: display_name.into(),
            last_error: connect_error,
            needs_firmware: false,
            can_connect: false,
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn needs_firmware(&self) -> bool {
        self.needs_firmware
    }

    pub fn can_connect(&self) -> bool {
        self.can_connect
    }

    /// Connectable and running operating firmware.
    pub fn is_ready(&self) -> bool {
        self.can_connect && !self.needs_firmware
    }

    /// One line for a device list: `"name [ready]"`, plus the last error if any.
    pub fn status_line(&self) -> String {
        let state = if self.is_ready() { "ready" } else { "not ready" };
        match &self.last_error {
            Some(error) if !error.is_empty() => {
                format!("{} [{}] Error: {}", self.display_name, state, error)
            }
            _ => format!("{} [{}]", self.display_name, state),
        }
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): canConnect={}, needsFirmware={}",
            self.display_name, self.identity, self.can_connect, self.needs_firmware
        )
    }
}

/// Immutable device list published once per changed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot(Vec<DeviceRecord>);

impl DeviceSnapshot {
    /// First ready record, in scan order.
    pub fn first_ready(&self) -> Option<&DeviceRecord> {
        self.0.iter().find(|record| record.is_ready())
    }

    pub fn get(&self, identity: DeviceIdentity) -> Option<&DeviceRecord> {
        self.0.iter().find(|record| record.identity == identity)
    }
}

impl From<Vec<DeviceRecord>> for DeviceSnapshot {
    fn from(records: Vec<DeviceRecord>) -> Self {
        Self(records)
    }
}

impl Deref for DeviceSnapshot {
    type Target = [DeviceRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for DeviceSnapshot {
    type Item = DeviceRecord;
    type IntoIter = std::vec::IntoIter<DeviceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
