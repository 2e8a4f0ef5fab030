//! Background device acquisition.
//!
//! - [`service`] - `AcquisitionService`: start, blocking wait, accept
//! - [`worker`] - the dedicated scan thread and its timer loop
//! - [`scan`] - one scan cycle and the `ScanOutcome` of a run
//! - [`event`] - `AcquisitionEvent` and the broadcast channel carrying it
//! - [`record`] - `DeviceRecord` / `DeviceSnapshot` published per scan

pub mod event;
pub mod record;
pub mod scan;
pub mod service;
pub mod worker;

pub use event::{AcquisitionEvent, EventBus, EVENT_CHANNEL_CAPACITY};
pub use record::{DeviceRecord, DeviceSnapshot};
pub use scan::ScanOutcome;
pub use service::{AcquisitionService, SCAN_PERIOD};
pub use worker::WORKER_THREAD_NAME;
