//! Process-level backend selection and device enumeration.

use crate::backend::{self, Backend, BackendKind, DeviceId, DeviceInfo};
use crate::buffer::{CaptureCallback, DataCallback};
use crate::config::{DeviceConfig, Direction};
use crate::device::Device;
use crate::error::{Error, Result};
use std::sync::Arc;

/// A connection to one platform audio backend.
///
/// Construction walks a backend priority list and keeps the first backend
/// that initializes. Devices opened from a context share its inner state
/// via reference counting, so the backend is torn down exactly when the
/// context and every device created from it are gone.
pub struct Context {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    pub(crate) backend: Box<dyn Backend>,
}

impl Context {
    /// Connect to the best available backend.
    ///
    /// Priority on Linux is alsa, cpal, null; elsewhere cpal, null. The
    /// null backend always initializes, so this only fails if a custom
    /// build strips it out.
    pub fn new() -> Result<Self> {
        Self::with_backends(backend::default_priority())
    }

    /// Connect to the first backend in `kinds` that initializes.
    pub fn with_backends(kinds: &[BackendKind]) -> Result<Self> {
        for kind in kinds {
            match backend::create(*kind) {
                Ok(backend) => {
                    tracing::info!(backend = %kind, "context initialized");
                    return Ok(Context {
                        inner: Arc::new(ContextInner { backend }),
                    });
                }
                Err(error) => {
                    tracing::debug!(backend = %kind, %error, "backend unavailable");
                }
            }
        }
        Err(Error::NoBackend)
    }

    /// The backend this context selected.
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// Enumerate devices of one direction.
    pub fn devices(&self, direction: Direction) -> Result<Vec<DeviceInfo>> {
        self.inner.backend.enumerate(direction)
    }

    /// Open a playback device. The data callback is invoked from the
    /// device's worker thread once the device is started.
    ///
    /// The device lands in the `Stopped` state; nothing plays until
    /// [`Device::start`] is called.
    pub fn open_playback(
        &self,
        id: Option<&DeviceId>,
        config: &DeviceConfig,
        data: DataCallback,
    ) -> Result<Device> {
        Device::new(
            Arc::clone(&self.inner),
            Direction::Playback,
            id,
            config,
            Some(data),
            None,
        )
    }

    /// Open a capture device. The capture callback receives frames from
    /// the device's worker thread once the device is started.
    pub fn open_capture(
        &self,
        id: Option<&DeviceId>,
        config: &DeviceConfig,
        capture: CaptureCallback,
    ) -> Result<Device> {
        Device::new(
            Arc::clone(&self.inner),
            Direction::Capture,
            id,
            config,
            None,
            Some(capture),
        )
    }
}
