//! The backend contract and its implementations.
//!
//! A backend is realized as three layers, each owning its resources
//! exclusively:
//!
//! - [`Backend`] - context-level: device enumeration and endpoint
//!   acquisition. Construction may fail, in which case the context falls
//!   through to the next backend in its priority list.
//! - [`EndpointDevice`] - one negotiated endpoint, owned by the device
//!   worker thread. Opening a session acquires and starts the endpoint
//!   (pre-rolling a full buffer for playback first).
//! - [`EndpointSession`] - a started endpoint. Runs the I/O loop until a
//!   break is requested; may hold handles that must stay on the worker
//!   thread. Dropping it releases whatever the session acquired.

use crate::config::{Direction, ResolvedConfig};
use crate::engine::Engine;
use crate::error::Result;
use crate::sync::WorkerControl;
use core::fmt;

#[cfg(target_os = "linux")]
pub(crate) mod alsa;
pub(crate) mod cpal;
pub(crate) mod null;

/// The platform backends a context can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Direct ALSA (Linux only).
    Alsa,
    /// The cpal bridge: WASAPI/DirectSound on Windows, CoreAudio on macOS,
    /// AAudio on Android, ALSA elsewhere.
    Cpal,
    /// The silent reference backend; always available.
    Null,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Alsa => "alsa",
            BackendKind::Cpal => "cpal",
            BackendKind::Null => "null",
        })
    }
}

/// Backend-specific device identifier, as returned by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceId {
    /// An ALSA PCM name, `"hw:0,0"`-style.
    Alsa(String),
    /// A cpal device name.
    Cpal(String),
    /// The null backend's single device.
    Null,
}

/// One enumerated device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Opaque id to pass back when opening a device.
    pub id: DeviceId,
    /// Human-readable name, UTF-8.
    pub name: String,
    /// Whether this entry is a playback or capture endpoint.
    pub direction: Direction,
}

/// Context-level backend operations.
pub(crate) trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// List devices of one direction. Pure read.
    fn enumerate(&self, direction: Direction) -> Result<Vec<DeviceInfo>>;

    /// Acquire an endpoint and negotiate stream parameters against the
    /// request. Must not start the endpoint.
    fn open(
        &self,
        direction: Direction,
        id: Option<&DeviceId>,
        config: &ResolvedConfig,
    ) -> Result<Box<dyn EndpointDevice>>;
}

/// A negotiated endpoint, owned by the worker thread between runs.
pub(crate) trait EndpointDevice: Send {
    /// The parameters the endpoint actually accepted.
    fn negotiated(&self) -> ResolvedConfig;

    /// Start the endpoint and hand back the running session. Playback
    /// endpoints pre-roll the entire buffer with a single engine pull
    /// before starting.
    fn open_session<'a>(&'a mut self, engine: &mut Engine)
    -> Result<Box<dyn EndpointSession + 'a>>;
}

/// A started endpoint. `run` is the I/O loop skeleton of every backend:
/// wait for a period's worth of frames (waking at least once per period so
/// a break is honored promptly), move them through the engine, repeat.
pub(crate) trait EndpointSession {
    fn run(&mut self, engine: &mut Engine, control: &WorkerControl) -> Result<()>;

    /// Stop the endpoint and reset its cursor.
    fn stop(&mut self) -> Result<()>;
}

/// Backend preference order used by `Context::new`.
pub(crate) fn default_priority() -> &'static [BackendKind] {
    #[cfg(target_os = "linux")]
    {
        &[BackendKind::Alsa, BackendKind::Cpal, BackendKind::Null]
    }
    #[cfg(not(target_os = "linux"))]
    {
        &[BackendKind::Cpal, BackendKind::Null]
    }
}

/// Instantiate one backend, failing if it is unavailable on this platform.
pub(crate) fn create(kind: BackendKind) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::Alsa => create_alsa(),
        BackendKind::Cpal => Ok(Box::new(cpal::CpalBackend::new())),
        BackendKind::Null => Ok(Box::new(null::NullBackend)),
    }
}

#[cfg(target_os = "linux")]
fn create_alsa() -> Result<Box<dyn Backend>> {
    Ok(Box::new(alsa::AlsaBackend::new()?))
}

#[cfg(not(target_os = "linux"))]
fn create_alsa() -> Result<Box<dyn Backend>> {
    Err(crate::error::Error::NoBackend)
}
