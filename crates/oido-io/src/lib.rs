//! Audio device I/O for the oido library.
//!
//! This crate opens playback and capture endpoints on whichever platform
//! audio subsystem is available, runs a dedicated worker thread per device,
//! and moves PCM frames between the endpoint and an application callback
//! through the `oido-core` DSP pipeline - converting sample format,
//! channel count, channel layout, and sample rate wherever the endpoint's
//! taste differs from the application's.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use oido_io::{Context, DeviceConfig, SampleFormat};
//!
//! let context = Context::new()?;
//! let config = DeviceConfig {
//!     format: SampleFormat::F32,
//!     channels: 2,
//!     sample_rate: 48000,
//!     ..DeviceConfig::default()
//! };
//!
//! let mut phase = 0.0f32;
//! let device = context.open_playback(
//!     None,
//!     &config,
//!     Box::new(move |frames| {
//!         let count = frames.frame_count();
//!         let mut samples = vec![0.0f32; count * 2];
//!         for frame in samples.chunks_exact_mut(2) {
//!             let s = (phase * std::f32::consts::TAU).sin() * 0.2;
//!             phase = (phase + 440.0 / 48000.0).fract();
//!             frame.fill(s);
//!         }
//!         frames.write_f32(&samples)
//!     }),
//! )?;
//!
//! device.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! device.stop()?;
//! # Ok::<(), oido_io::Error>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! application callback
//!        ▲ │
//!        │ ▼  (client format/channels/rate/map)
//! ┌─────────────────┐
//! │  DSP pipeline   │  convert + remix + remap + resample
//! └─────────────────┘
//!        ▲ │  (negotiated endpoint parameters)
//!        │ ▼
//! ┌─────────────────┐      ┌──────────────────────────────┐
//! │  device worker  │◄────►│ backend (alsa / cpal / null) │
//! └─────────────────┘      └──────────────────────────────┘
//! ```
//!
//! The worker pulls: each I/O loop iteration waits for a period's worth of
//! endpoint space (or data), then drives the pipeline over exactly that
//! region. See [`Device`] for the lifecycle state machine.

mod backend;
mod buffer;
mod config;
mod context;
mod device;
mod engine;
mod error;
mod state;
mod sync;

pub use backend::{BackendKind, DeviceId, DeviceInfo};
pub use buffer::{CaptureCallback, DataCallback, Frames, FramesMut, StoppedCallback};
pub use config::{DeviceConfig, Direction, StreamParams};
pub use context::Context;
pub use device::Device;
pub use error::{Error, Result};
pub use state::DeviceState;

// Core types that appear in this crate's public API.
pub use oido_core::{ChannelMap, Position, SampleFormat};
