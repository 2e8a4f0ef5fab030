//! The acquisition service: lifecycle, blocking wait and ownership transfer.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start()--> Scanning --terminal event--> Finished
//! ```
//!
//! `Idle` holds the collaborators; `Scanning` lends them to the worker thread;
//! `Finished` holds the enumerator's pool again together with the run's outcome.
//! One instance runs once. Build a new one per acquisition session.
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_acquire::acquisition::AcquisitionService;
//! use std::time::Duration;
//!
//! let mut service = AcquisitionService::new(enumerator, provisioner);
//! match service.start_and_block(Some(Duration::from_secs(30)))? {
//!     Some(device) => println!("using {}", device.display_name()),
//!     None => println!("no device, falling back to manual selection"),
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use super::event::{AcquisitionEvent, EventBus};
use super::scan::{ScanContext, ScanOutcome};
use super::worker::{ScanTiming, ScanWorker};
use crate::error::{AcquireError, AcquireResult};
use crate::hardware::{DeviceIdentity, Enumerator, Provisioner};

/// Default interval between bus scans.
pub const SCAN_PERIOD: Duration = Duration::from_millis(1000);

enum ServiceState<E, P> {
    Idle {
        enumerator: E,
        provisioner: P,
    },
    Scanning(ScanWorker<E>),
    Finished {
        enumerator: E,
        outcome: ScanOutcome,
    },
    /// The worker was lost (spawn failure or panic) and took the collaborators with it.
    Broken,
}

/// Background device acquisition.
///
/// Polls an [`Enumerator`] on its own thread until one device becomes ready, a
/// firmware upload fails, or the timeout elapses. Progress is published as
/// [`AcquisitionEvent`]s to every subscriber.
pub struct AcquisitionService<E, P>
where
    E: Enumerator,
    P: Provisioner<E::Device>,
{
    bus: EventBus,
    terminated: Arc<AtomicBool>,
    period: Duration,
    timeout: Option<Duration>,
    state: ServiceState<E, P>,
}

impl<E, P> AcquisitionService<E, P>
where
    E: Enumerator,
    P: Provisioner<E::Device>,
{
    /// Create an idle service that scans every [`SCAN_PERIOD`] with no timeout.
    pub fn new(enumerator: E, provisioner: P) -> Self {
        Self {
            bus: EventBus::new(),
            terminated: Arc::new(AtomicBool::new(false)),
            period: SCAN_PERIOD,
            timeout: None,
            state: ServiceState::Idle {
                enumerator,
                provisioner,
            },
        }
    }

    /// Scan every `period` instead of [`SCAN_PERIOD`].
    pub fn with_scan_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn scan_period(&self) -> Duration {
        self.period
    }

    /// Set the scan timeout. Only allowed before the service starts.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> AcquireResult<()> {
        match self.state {
            ServiceState::Idle { .. } => {
                self.timeout = timeout;
                Ok(())
            }
            ServiceState::Scanning(_) => Err(AcquireError::Busy),
            ServiceState::Finished { .. } | ServiceState::Broken => Err(AcquireError::AlreadyRan),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Receiver for the events of this service. Subscribe before `start` to see them all.
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.bus.subscribe()
    }

    /// Async stream of the events of this service; ends when the service is dropped.
    pub fn events(&self) -> impl Stream<Item = AcquisitionEvent> + Send + Unpin + 'static {
        self.bus.stream()
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ServiceState::Scanning(_))
    }

    /// Outcome of the finished run, if it has been collected.
    pub fn outcome(&self) -> Option<&ScanOutcome> {
        match &self.state {
            ServiceState::Finished { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    /// Start scanning in the background. Does nothing if already scanning.
    pub fn start(&mut self) -> AcquireResult<()> {
        if self.period.is_zero() {
            return Err(AcquireError::Configuration(
                "scan period must be greater than zero".into(),
            ));
        }

        match std::mem::replace(&mut self.state, ServiceState::Broken) {
            ServiceState::Idle {
                enumerator,
                provisioner,
            } => {
                let timing = ScanTiming {
                    period: self.period,
                    timeout: self.timeout,
                };
                let ctx = ScanContext::new(self.bus.clone(), self.terminated.clone());
                let worker = ScanWorker::spawn(enumerator, provisioner, timing, ctx)?;
                info!(period = ?self.period, timeout = ?self.timeout, "Acquisition started");
                self.state = ServiceState::Scanning(worker);
                Ok(())
            }
            state @ ServiceState::Scanning(_) => {
                self.state = state;
                Ok(())
            }
            state => {
                self.state = state;
                Err(AcquireError::AlreadyRan)
            }
        }
    }

    /// Block until the run ends and return how it ended.
    pub fn wait(&mut self) -> AcquireResult<ScanOutcome> {
        if let ServiceState::Finished { outcome, .. } = &self.state {
            return Ok(outcome.clone());
        }

        match std::mem::replace(&mut self.state, ServiceState::Broken) {
            ServiceState::Scanning(worker) => {
                let report = worker.join()?;
                let outcome = report.outcome.clone();
                self.state = ServiceState::Finished {
                    enumerator: report.enumerator,
                    outcome: report.outcome,
                };
                Ok(outcome)
            }
            state @ (ServiceState::Idle { .. } | ServiceState::Finished { .. }) => {
                self.state = state;
                Err(AcquireError::NotStarted)
            }
            ServiceState::Broken => Err(AcquireError::WorkerPanicked),
        }
    }

    /// Scan until a device is ready and take it.
    ///
    /// `timeout` replaces the configured timeout when given. Returns `None` when the
    /// run ended with a failed upload or a timeout; which one is available from
    /// [`outcome`](Self::outcome) and the event stream.
    pub fn start_and_block(&mut self, timeout: Option<Duration>) -> AcquireResult<Option<E::Device>> {
        if timeout.is_some() {
            self.set_timeout(timeout)?;
        }

        let mut rx = self.bus.subscribe();
        self.start()?;
        let outcome = self.wait()?;

        let identity = ready_identity(&mut rx).or_else(|| outcome.ready_identity());
        match identity {
            Some(identity) => Ok(self.accept(identity)),
            None => {
                debug!(?outcome, "Acquisition ended without a ready device");
                Ok(None)
            }
        }
    }

    /// Take a device out of the enumerator's pool after the run has ended.
    ///
    /// Returns `None` while no terminal event has fired, or when `identity` is not in
    /// the pool (unknown or already taken).
    pub fn accept(&mut self, identity: DeviceIdentity) -> Option<E::Device> {
        if self.is_scanning() {
            if !self.terminated.load(Ordering::Acquire) {
                warn!(%identity, "Device accepted before the scan ended");
                return None;
            }
            // Terminal event already out; the worker only has the final list to publish.
            if let Err(err) = self.wait() {
                warn!(%identity, error = %err, "Scan worker failed");
                return None;
            }
        }

        match &mut self.state {
            ServiceState::Finished { enumerator, .. } => {
                let device = enumerator.take(identity);
                match &device {
                    Some(_) => info!(%identity, "Device accepted"),
                    None => debug!(%identity, "Device not available to accept"),
                }
                device
            }
            _ => None,
        }
    }
}

impl<E, P> Drop for AcquisitionService<E, P>
where
    E: Enumerator,
    P: Provisioner<E::Device>,
{
    fn drop(&mut self) {
        if let ServiceState::Scanning(worker) = &self.state {
            if !worker.is_finished() {
                // No way to stop the worker; it ends at its next terminal condition.
                warn!("Acquisition service dropped while scanning; worker left detached");
            }
        }
    }
}

/// Identity from the `Ready` event among the pending events, if any.
fn ready_identity(rx: &mut broadcast::Receiver<AcquisitionEvent>) -> Option<DeviceIdentity> {
    loop {
        match rx.try_recv() {
            Ok(AcquisitionEvent::Ready { identity, .. }) => return Some(identity),
            Ok(_) => continue,
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Blocking wait lagged behind the event stream");
                continue;
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
        }
    }
}
