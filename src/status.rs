//! Headless status consumer.
//!
//! Turns the acquisition event stream into what a "waiting for device" dialog shows:
//! a title, a status line, an optional error and the device list. After a terminal
//! event it holds the result on screen for a short convenience delay, then settles
//! on a [`Decision`]. No UI toolkit is involved; rendering is left to a callback.

use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::{self, Instant};

use crate::acquisition::{AcquisitionEvent, DeviceSnapshot};
use crate::hardware::DeviceIdentity;

/// How long a terminal result stays visible before the consumer acts on it.
pub const CONVENIENCE_DELAY: Duration = Duration::from_millis(2000);

/// Status shown while nothing has been found.
pub const WAITING_TEXT: &str = "Waiting for device";

/// What the consumer settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Take this device
    Accept(DeviceIdentity),
    /// Give up (upload failed or timed out)
    Reject,
}

/// Dialog state driven by acquisition events.
#[derive(Debug, Clone)]
pub struct StatusModel {
    title: String,
    status: String,
    error: Option<String>,
    devices: Vec<String>,
    interactive: bool,
    delay: Duration,
    pending: Option<(Instant, Decision)>,
    decision: Option<Decision>,
}

impl Default for StatusModel {
    fn default() -> Self {
        Self::new(CONVENIENCE_DELAY)
    }
}

impl StatusModel {
    pub fn new(delay: Duration) -> Self {
        Self {
            title: WAITING_TEXT.to_string(),
            status: WAITING_TEXT.to_string(),
            error: None,
            devices: Vec::new(),
            interactive: true,
            delay,
            pending: None,
            decision: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// One rendered line per device of the latest list.
    pub fn device_lines(&self) -> &[String] {
        &self.devices
    }

    /// Whether the manual controls are enabled. Once turned off they stay off.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    /// When the pending decision takes effect, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(deadline, _)| deadline)
    }

    fn set_status(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.title.clone_from(&text);
        self.status = text;
    }

    fn show_devices(&mut self, snapshot: &DeviceSnapshot) {
        if snapshot.is_empty() {
            self.set_status(WAITING_TEXT);
            self.interactive = false;
        }
        self.devices = snapshot.iter().map(|record| record.status_line()).collect();
    }

    /// Apply one event received at `now`.
    pub fn apply(&mut self, event: &AcquisitionEvent, now: Instant) {
        match event {
            AcquisitionEvent::DeviceListChanged(snapshot) => self.show_devices(snapshot),
            AcquisitionEvent::FirmwareUploadStarted { name } => {
                self.title.clone_from(name);
                self.status = format!("Uploading firmware to {name}");
                self.interactive = false;
            }
            AcquisitionEvent::FirmwareUploadFailed { name, message } => {
                self.set_status(name.clone());
                self.error = Some(message.clone());
                self.interactive = false;
                self.pending = Some((now + self.delay, Decision::Reject));
            }
            AcquisitionEvent::Ready { name, identity } => {
                self.title.clone_from(name);
                self.status = format!("{name} is ready");
                self.error = None;
                self.interactive = false;
                self.pending = Some((now + self.delay, Decision::Accept(*identity)));
            }
            AcquisitionEvent::Timeout => {
                self.set_status("Timed out waiting for device");
                self.interactive = false;
                self.pending = Some((now, Decision::Reject));
            }
        }
    }

    /// Settle the pending decision if its delay has passed.
    pub fn poll(&mut self, now: Instant) -> Option<Decision> {
        if let Some((deadline, decision)) = self.pending {
            if now >= deadline {
                self.pending = None;
                self.decision = Some(decision);
            }
        }
        self.decision
    }
}

/// Drive a [`StatusModel`] from an event stream until it decides.
///
/// `render` is called after every change. Returns `None` if the stream ends
/// before a terminal event arrives.
pub async fn follow<S, F>(mut events: S, mut model: StatusModel, mut render: F) -> Option<Decision>
where
    S: Stream<Item = AcquisitionEvent> + Unpin,
    F: FnMut(&StatusModel),
{
    render(&model);
    let mut stream_done = false;

    loop {
        let deadline = model.deadline();
        let settle = async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = settle => {
                if let Some(decision) = model.poll(Instant::now()) {
                    render(&model);
                    return Some(decision);
                }
            }
            event = events.next(), if !stream_done => {
                match event {
                    Some(event) => {
                        model.apply(&event, Instant::now());
                        render(&model);
                    }
                    // Run over; a pending decision still plays out its delay.
                    None if model.deadline().is_some() => stream_done = true,
                    None => return None,
                }
            }
        }
    }
}
