//! Hardware Collaborator Contracts
//!
//! The acquisition service never talks to a bus directly. It consumes three small
//! contracts that a hardware backend implements:
//!
//! - [`Enumerator`] - scans the bus and owns the pool of raw device handles
//! - [`RawDevice`] - the capability surface of one raw handle
//! - [`Provisioner`] - installs firmware onto a handle that lacks it
//!
//! # Design Philosophy
//!
//! Each contract:
//! - Is synchronous (it runs on the dedicated scan worker, one call at a time)
//! - Is `Send + 'static` (the enumerator and provisioner move onto the worker thread)
//! - Uses `anyhow::Result` for errors; the message is what ends up in front of users
//!
//! # Ownership
//!
//! Raw handles live in the enumerator's pool until [`Enumerator::take`] moves one out.
//! The service only borrows a handle for a single classification step.
//!
//! # Example
//!
//! ```rust,ignore
//! struct UsbScope { name: String, loaded: bool, open: bool }
//!
//! impl RawDevice for UsbScope {
//!     fn display_name(&self) -> String { self.name.clone() }
//!     fn needs_firmware(&self) -> bool { !self.loaded }
//!     fn connect(&mut self) -> Result<()> {
//!         if !self.loaded {
//!             anyhow::bail!("firmware not running");
//!         }
//!         self.open = true;
//!         Ok(())
//!     }
//!     fn disconnect(&mut self) { self.open = false; }
//! }
//! ```

use anyhow::Result;

use super::DeviceIdentity;

/// Capability surface of one raw device handle.
///
/// # Contract
/// - `display_name` and `needs_firmware` are cheap and side-effect free
/// - `connect` performs the handshake; on failure the error message is kept for display
/// - `disconnect` releases whatever `connect` acquired and never fails
pub trait RawDevice: Send + 'static {
    /// Human-readable model name (e.g. "DSO-6022BE")
    fn display_name(&self) -> String;

    /// True when the device enumerates without operating firmware
    fn needs_firmware(&self) -> bool;

    /// Attempt the connect handshake
    ///
    /// # Returns
    /// - Ok(()) if the device answered and is usable
    /// - Err with a human-readable reason otherwise
    fn connect(&mut self) -> Result<()>;

    /// Release the connection opened by `connect`
    fn disconnect(&mut self);
}

/// Bus scanner owning the pool of raw handles.
///
/// # Contract
/// - `update` rescans and reports whether the set of devices changed since the last call
/// - `list` yields the current pool in a stable, enumerator-defined order
/// - `take` removes a handle from the pool; a second `take` of the same id yields `None`
pub trait Enumerator: Send + 'static {
    /// Raw handle type produced by this enumerator
    type Device: RawDevice;

    /// Rescan the bus
    ///
    /// # Returns
    /// - true if devices appeared, disappeared or changed state
    /// - false if the pool is unchanged
    fn update(&mut self) -> bool;

    /// Current pool, in iteration order
    fn list(&mut self) -> Vec<(DeviceIdentity, &mut Self::Device)>;

    /// Transfer ownership of one handle out of the pool
    fn take(&mut self, id: DeviceIdentity) -> Option<Self::Device>;
}

/// Firmware installer.
///
/// Uploads are never retried by the service and cannot be interrupted once started.
pub trait Provisioner<D: RawDevice>: Send + 'static {
    /// Install firmware onto `device`
    ///
    /// # Returns
    /// - Ok(()) if the upload completed (the device usually re-enumerates afterwards)
    /// - Err with a human-readable reason otherwise
    fn upload(&mut self, device: &mut D) -> Result<()>;
}
