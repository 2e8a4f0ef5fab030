//! Lifecycle events and the channel that carries them.
//!
//! Architecture:
//! - One tagged enum for everything the scan worker reports
//! - `broadcast` so the blocking wait and any number of status consumers each see
//!   every event, by value
//! - Publishing never blocks the worker; a consumer that falls behind loses the
//!   oldest events and is told how many via `Lagged`

use futures::{future, Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{trace, warn};

use super::record::DeviceSnapshot;
use crate::hardware::DeviceIdentity;

/// Channel capacity. A run produces a handful of events per changed scan.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Everything the scan worker reports.
///
/// Within one run: zero or more `FirmwareUploadStarted`/`DeviceListChanged`, then
/// exactly one terminal event (`Ready`, `FirmwareUploadFailed` or `Timeout`). The
/// terminal event's own scan still publishes its `DeviceListChanged` afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionEvent {
    /// Complete device list of a scan that detected a change
    DeviceListChanged(DeviceSnapshot),
    /// Firmware upload to `name` is about to start
    FirmwareUploadStarted { name: String },
    /// Firmware upload to `name` failed; the run ends
    FirmwareUploadFailed { name: String, message: String },
    /// `name` answered the handshake; the run ends and the device can be accepted
    Ready {
        name: String,
        identity: DeviceIdentity,
    },
    /// The scan timeout elapsed before any device became ready
    Timeout,
}

impl AcquisitionEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionEvent::Ready { .. }
                | AcquisitionEvent::FirmwareUploadFailed { .. }
                | AcquisitionEvent::Timeout
        )
    }

    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AcquisitionEvent::DeviceListChanged(_) => "device_list_changed",
            AcquisitionEvent::FirmwareUploadStarted { .. } => "firmware_upload_started",
            AcquisitionEvent::FirmwareUploadFailed { .. } => "firmware_upload_failed",
            AcquisitionEvent::Ready { .. } => "ready",
            AcquisitionEvent::Timeout => "timeout",
        }
    }
}

/// Sending half held by the scan worker.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AcquisitionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// New receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to every current subscriber. Returns the number reached.
    pub fn publish(&self, event: AcquisitionEvent) -> usize {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                // broadcast::send only fails when nobody is listening
                trace!(event = kind, "No subscribers for acquisition event");
                0
            }
        }
    }

    /// Async stream over the events published from now on.
    ///
    /// Lag is logged and skipped; the stream ends when the worker drops the bus.
    pub fn stream(&self) -> impl Stream<Item = AcquisitionEvent> + Send + Unpin + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| {
            future::ready(match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Acquisition event consumer lagged");
                    None
                }
            })
        })
    }
}
