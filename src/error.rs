//! Custom error types for the acquisition service.
//!
//! This module defines `AcquireError`, the error type returned by the public API of
//! this crate. It covers misuse of the service (reconfiguring it mid-scan, restarting a
//! finished instance), failures to bring up the background worker, and configuration
//! problems.
//!
//! ## What is *not* an error here
//!
//! The outcomes of a scan run (a device became ready, a firmware upload failed, the
//! timeout elapsed) are reported through [`ScanOutcome`](crate::acquisition::ScanOutcome)
//! and the event stream, not through `AcquireError`. A failed upload is a perfectly
//! well-defined end of a run, and callers usually want to branch on it rather than
//! propagate it with `?`.
//!
//! Hardware collaborators (`Enumerator`, `RawDevice`, `Provisioner`) report their own
//! failures with `anyhow::Error` so backends can attach whatever context they have.
//! Those messages end up as strings on device records and events.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AcquireResult<T> = std::result::Result<T, AcquireError>;

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Acquisition service is scanning; stop or wait for it before reconfiguring")]
    Busy,

    #[error("Acquisition service already ran; construct a new instance per session")]
    AlreadyRan,

    #[error("Acquisition service was not started")]
    NotStarted,

    #[error("Failed to spawn scan worker thread: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("Failed to build scan worker runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Scan worker thread panicked")]
    WorkerPanicked,

    #[error("Tracing initialization failed: {0}")]
    Tracing(String),
}
