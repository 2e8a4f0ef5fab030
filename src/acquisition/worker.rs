//! Dedicated scan thread with its own tokio runtime.
//!
//! The worker owns the enumerator and provisioner for the duration of a run and
//! hands them back when it ends, so device state is only ever touched from one
//! thread. Its loop multiplexes two timers on a current-thread runtime:
//!
//! - the repeating scan interval, which runs one [`scan_devices`] cycle per tick
//! - the optional one-shot deadline, which publishes `Timeout`
//!
//! Each cycle runs to completion before the next timer is looked at. A firmware
//! upload in progress is therefore never cut short; the deadline is honored as
//! soon as the cycle returns.

use std::future;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{info, info_span, warn};

use super::scan::{scan_devices, ScanContext, ScanOutcome};
use crate::error::{AcquireError, AcquireResult};
use crate::hardware::{Enumerator, Provisioner};

/// Thread name of the scan worker.
pub const WORKER_THREAD_NAME: &str = "acquisition-scan";

/// Timing of one run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanTiming {
    pub period: Duration,
    pub timeout: Option<Duration>,
}

/// What the worker hands back when its thread ends.
///
/// The provisioner is dropped on the worker; only the pool outlives the run.
pub(crate) struct WorkerReport<E> {
    pub enumerator: E,
    pub outcome: ScanOutcome,
}

/// Handle to a running scan thread.
pub(crate) struct ScanWorker<E> {
    handle: JoinHandle<WorkerReport<E>>,
}

impl<E> ScanWorker<E>
where
    E: Enumerator,
{
    /// Spawn the scan thread. The runtime is built up front so a failure surfaces here.
    pub(crate) fn spawn<P>(
        enumerator: E,
        provisioner: P,
        timing: ScanTiming,
        ctx: ScanContext,
    ) -> AcquireResult<Self>
    where
        P: Provisioner<E::Device>,
    {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(AcquireError::Runtime)?;

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_on(rt, enumerator, provisioner, timing, ctx))
            .map_err(AcquireError::WorkerSpawn)?;

        Ok(Self { handle })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the thread ends.
    pub(crate) fn join(self) -> AcquireResult<WorkerReport<E>> {
        self.handle.join().map_err(|_| AcquireError::WorkerPanicked)
    }
}

fn run_on<E, P>(
    rt: Runtime,
    mut enumerator: E,
    mut provisioner: P,
    timing: ScanTiming,
    ctx: ScanContext,
) -> WorkerReport<E>
where
    E: Enumerator,
    P: Provisioner<E::Device>,
{
    let span = info_span!("acquisition", period_ms = timing.period.as_millis() as u64);
    let _guard = span.enter();

    info!(timeout = ?timing.timeout, "Scan worker started");
    let outcome = rt.block_on(scan_loop(&mut enumerator, &mut provisioner, timing, &ctx));
    info!(?outcome, "Scan worker ended");

    WorkerReport { enumerator, outcome }
}

async fn scan_loop<E, P>(
    enumerator: &mut E,
    provisioner: &mut P,
    timing: ScanTiming,
    ctx: &ScanContext,
) -> ScanOutcome
where
    E: Enumerator,
    P: Provisioner<E::Device>,
{
    let start = Instant::now();

    // First scan one period after start, then every period; skip ticks missed
    // while a slow upload held the thread. A period too large to represent never
    // scans.
    let mut scan_timer = start.checked_add(timing.period).map(|first| {
        let mut timer = time::interval_at(first, timing.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    });
    if scan_timer.is_none() {
        warn!(period = ?timing.period, "Scan period out of range, no scans will run");
    }

    // Same for the timeout.
    let deadline = timing.timeout.and_then(|timeout| start.checked_add(timeout));
    let timeout = async move {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => future::pending().await,
        }
    };
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            biased;

            _ = &mut timeout => {
                info!("Scan timed out");
                let outcome = ScanOutcome::TimedOut;
                ctx.finish(&outcome);
                return outcome;
            }
            _ = next_tick(&mut scan_timer) => {
                if let Some(outcome) = scan_devices(enumerator, provisioner, ctx) {
                    return outcome;
                }
            }
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => future::pending().await,
    }
}
