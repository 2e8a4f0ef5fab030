//! One scan cycle: rescan the bus, classify every device, publish the result.
//!
//! Classification walks the enumerator's pool in order:
//!
//! 1. A device without operating firmware gets an upload. A failed upload ends the
//!    run. A successful one still leaves the device marked as needing firmware for
//!    this cycle; it becomes connectable after it re-enumerates.
//! 2. Otherwise the connect handshake is tried. The first device that answers wins:
//!    it is disconnected again right away so the handle stays in the pool for the
//!    caller to take, and the rest of the pool is not looked at.
//! 3. A refused handshake only marks the device not ready.
//!
//! The cycle's full device list is published after classification stops, so
//! observers get every record built, including the one that ended the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use super::event::{AcquisitionEvent, EventBus};
use super::record::{DeviceRecord, DeviceSnapshot};
use crate::hardware::{DeviceIdentity, Enumerator, Provisioner, RawDevice};

/// How a scan run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A device answered the handshake and waits in the pool to be taken
    Ready {
        name: String,
        identity: DeviceIdentity,
    },
    /// Installing firmware failed; retrying needs a new service instance
    FirmwareUploadFailed { name: String, message: String },
    /// The timeout elapsed with no ready device
    TimedOut,
}

impl ScanOutcome {
    /// Identity of the winning device, if any.
    pub fn ready_identity(&self) -> Option<DeviceIdentity> {
        match self {
            ScanOutcome::Ready { identity, .. } => Some(*identity),
            _ => None,
        }
    }

    /// The terminal event announcing this outcome.
    pub fn to_event(&self) -> AcquisitionEvent {
        match self {
            ScanOutcome::Ready { name, identity } => AcquisitionEvent::Ready {
                name: name.clone(),
                identity: *identity,
            },
            ScanOutcome::FirmwareUploadFailed { name, message } => {
                AcquisitionEvent::FirmwareUploadFailed {
                    name: name.clone(),
                    message: message.clone(),
                }
            }
            ScanOutcome::TimedOut => AcquisitionEvent::Timeout,
        }
    }
}

/// Where a scan cycle reports to.
#[derive(Debug, Clone)]
pub(crate) struct ScanContext {
    bus: EventBus,
    terminated: Arc<AtomicBool>,
}

impl ScanContext {
    pub(crate) fn new(bus: EventBus, terminated: Arc<AtomicBool>) -> Self {
        Self { bus, terminated }
    }

    pub(crate) fn publish(&self, event: AcquisitionEvent) {
        self.bus.publish(event);
    }

    /// Mark the run finished, then announce it.
    ///
    /// The flag is raised first so anyone reacting to the terminal event already
    /// sees the run as over.
    pub(crate) fn finish(&self, outcome: &ScanOutcome) {
        self.terminated.store(true, Ordering::Release);
        self.bus.publish(outcome.to_event());
    }
}

/// Run one scan cycle. Returns the outcome if this cycle ended the run.
pub(crate) fn scan_devices<E, P>(
    enumerator: &mut E,
    provisioner: &mut P,
    ctx: &ScanContext,
) -> Option<ScanOutcome>
where
    E: Enumerator,
    P: Provisioner<E::Device>,
{
    if !enumerator.update() {
        trace!("Device list unchanged");
        return None;
    }

    info!("Device list changed");

    let mut records = Vec::new();
    let mut outcome = None;

    for (identity, device) in enumerator.list() {
        let name = device.display_name();

        if device.needs_firmware() {
            info!(%identity, device = %name, "Installing firmware");
            ctx.publish(AcquisitionEvent::FirmwareUploadStarted { name: name.clone() });

            match provisioner.upload(device) {
                Ok(()) => {
                    records.push(DeviceRecord::needing_firmware(identity, name, None));
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(%identity, device = %name, error = %message, "Firmware installation failed");
                    records.push(DeviceRecord::needing_firmware(
                        identity,
                        name.clone(),
                        Some(message.clone()),
                    ));
                    outcome = Some(ScanOutcome::FirmwareUploadFailed { name, message });
                    break;
                }
            }
            continue;
        }

        match device.connect() {
            Ok(()) => {
                info!(%identity, device = %name, "Connection attempt succeeded");
                device.disconnect();
                records.push(DeviceRecord::connectable(identity, name.clone()));
                outcome = Some(ScanOutcome::Ready { name, identity });
                break;
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(%identity, device = %name, error = %message, "Connection attempt failed");
                records.push(DeviceRecord::unreachable(identity, name, Some(message)));
            }
        }
    }

    if let Some(outcome) = &outcome {
        ctx.finish(outcome);
    }

    for record in &records {
        debug!(%record, "Scanned device");
    }
    ctx.publish(AcquisitionEvent::DeviceListChanged(DeviceSnapshot::from(records)));

    outcome
}
