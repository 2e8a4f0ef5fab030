//! # daq_acquire
//!
//! Background device acquisition: scan the bus on a fixed cadence, install firmware
//! on devices that need it, try to connect, and hand over the first device that
//! becomes usable. Scanning runs on its own thread, so it can finish before any
//! user interface exists.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: The `AcquisitionService`, its scan worker, the per-scan
//!   `DeviceRecord`/`DeviceSnapshot` data model and the `AcquisitionEvent` stream.
//! - **`hardware`**: Collaborator traits (`Enumerator`, `RawDevice`, `Provisioner`),
//!   the `DeviceIdentity` key and simulated hardware for tests and dry runs.
//! - **`status`**: A headless status consumer that turns the event stream into
//!   dialog state and an accept/reject decision.
//! - **`config`**: Figment-based configuration (file + environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: The `AcquireError` type.
//!
//! ## Example
//!
//! ```no_run
//! use daq_acquire::acquisition::AcquisitionService;
//! use daq_acquire::hardware::mock::{MockDevice, MockEnumerator, MockProvisioner};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = MockEnumerator::new().with_device(1, MockDevice::new("DSO-6022BE"));
//! let mut service = AcquisitionService::new(bus, MockProvisioner::new());
//!
//! if let Some(device) = service.start_and_block(Some(Duration::from_secs(30)))? {
//!     println!("acquired {:?}", device);
//! }
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod status;

pub use acquisition::{AcquisitionEvent, AcquisitionService, DeviceRecord, DeviceSnapshot, ScanOutcome};
pub use error::{AcquireError, AcquireResult};
pub use hardware::DeviceIdentity;
