//! Hardware abstractions consumed by the acquisition service.
//!
//! Collaborator traits live in [`capabilities`]; scriptable stand-ins for tests and
//! for running without a bus live in [`mock`].

pub mod capabilities;
pub mod mock;

pub use capabilities::{Enumerator, Provisioner, RawDevice};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of one physical device across scan cycles.
///
/// Assigned by the enumerator (typically derived from bus and port numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(pub u64);

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for DeviceIdentity {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
