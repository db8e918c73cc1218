//! Error types for device and context operations.

use crate::backend::BackendKind;
use oido_core::DspError;
use thiserror::Error;

/// Errors surfaced by context and device operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The device configuration failed validation.
    #[error("invalid device config: {0}")]
    InvalidConfig(String),

    /// The device has been torn down (or never finished initializing).
    #[error("device is not initialized")]
    NotInitialized,

    /// The device is mid-transition and cannot accept this operation.
    #[error("device is busy ({0})")]
    Busy(&'static str),

    /// `start` was called on a device that is already started.
    #[error("device is already started")]
    AlreadyStarted,

    /// `start` was called while another start is in flight.
    #[error("device is already starting")]
    AlreadyStarting,

    /// `stop` was called on a device that is already stopped.
    #[error("device is already stopped")]
    AlreadyStopped,

    /// `stop` was called while another stop is in flight.
    #[error("device is already stopping")]
    AlreadyStopping,

    /// The worker thread could not be spawned.
    #[error("failed to spawn device worker thread")]
    ThreadSpawn(#[source] std::io::Error),

    /// No stream format acceptable to both sides could be negotiated.
    #[error("format not supported by the endpoint")]
    FormatNotSupported,

    /// No backend in the priority list could be initialized.
    #[error("no usable audio backend")]
    NoBackend,

    /// The backend has no device of the requested direction.
    #[error("no audio device available")]
    NoDevice,

    /// The requested device id does not exist on this backend.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A backend operation failed; the message carries the native error.
    #[error("[{backend}] {message}")]
    Backend {
        /// The backend that produced the failure.
        backend: BackendKind,
        /// Native error description.
        message: String,
    },

    /// The endpoint vanished out from under a running stream (device
    /// unplugged or claimed elsewhere). The loop returns this, the device
    /// stops, and the `stopped` callback fires.
    #[error("[{0}] device disconnected")]
    BackendDisconnected(BackendKind),

    /// A DSP stage rejected the negotiated stream parameters.
    #[error(transparent)]
    Dsp(#[from] DspError),
}

/// Convenience result type for device and context operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a backend-qualified failure.
    pub(crate) fn backend(backend: BackendKind, message: impl Into<String>) -> Self {
        Error::Backend {
            backend,
            message: message.into(),
        }
    }
}
