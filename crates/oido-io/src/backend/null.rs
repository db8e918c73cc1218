//! The null backend: a silent, timer-paced endpoint.
//!
//! Playback frames are pulled through the engine at the configured sample
//! rate and discarded; capture delivers silence at the same pace. The
//! backend honors the requested parameters exactly, which makes it the
//! reference implementation of the I/O loop and the workhorse of the test
//! suites.

use crate::backend::{Backend, BackendKind, DeviceId, DeviceInfo, EndpointDevice, EndpointSession};
use crate::config::{Direction, ResolvedConfig};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::sync::WorkerControl;
use std::time::{Duration, Instant};

pub(crate) struct NullBackend;

impl Backend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn enumerate(&self, direction: Direction) -> Result<Vec<DeviceInfo>> {
        let name = match direction {
            Direction::Playback => "Null Playback Device",
            Direction::Capture => "Null Capture Device",
        };
        Ok(vec![DeviceInfo {
            id: DeviceId::Null,
            name: name.to_string(),
            direction,
        }])
    }

    fn open(
        &self,
        direction: Direction,
        id: Option<&DeviceId>,
        config: &ResolvedConfig,
    ) -> Result<Box<dyn EndpointDevice>> {
        match id {
            None | Some(DeviceId::Null) => {}
            Some(other) => {
                return Err(Error::DeviceNotFound(format!("{other:?}")));
            }
        }
        Ok(Box::new(NullDevice {
            direction,
            negotiated: *config,
        }))
    }
}

struct NullDevice {
    direction: Direction,
    negotiated: ResolvedConfig,
}

impl EndpointDevice for NullDevice {
    fn negotiated(&self) -> ResolvedConfig {
        self.negotiated
    }

    fn open_session<'a>(
        &'a mut self,
        engine: &mut Engine,
    ) -> Result<Box<dyn EndpointSession + 'a>> {
        let params = self.negotiated.params;
        let bpf = params.format.bytes_per_frame(params.channels);
        let buffer_frames = self.negotiated.buffer_size_in_frames as usize;
        let period_frames = self.negotiated.period_size_in_frames() as usize;

        let mut scratch = vec![0u8; buffer_frames * bpf];
        let mut frames_processed = 0u64;
        if self.direction == Direction::Playback {
            // Pre-roll: one pull for the whole endpoint buffer before the
            // clock starts running.
            engine.read_endpoint(buffer_frames, &mut scratch);
            frames_processed = buffer_frames as u64;
        }

        let period = Duration::from_micros(
            (u64::from(self.negotiated.period_size_in_frames()) * 1_000_000
                / u64::from(params.sample_rate))
            .max(1_000),
        );

        Ok(Box::new(NullSession {
            direction: self.direction,
            sample_rate: params.sample_rate,
            buffer_frames,
            period_frames,
            bpf,
            period,
            started_at: Instant::now(),
            frames_processed,
            scratch,
        }))
    }
}

struct NullSession {
    direction: Direction,
    sample_rate: u32,
    buffer_frames: usize,
    period_frames: usize,
    bpf: usize,
    period: Duration,
    started_at: Instant,
    frames_processed: u64,
    scratch: Vec<u8>,
}

impl NullSession {
    /// Frames the timer has consumed (playback) or produced (capture).
    fn elapsed_frames(&self) -> u64 {
        (self.started_at.elapsed().as_secs_f64() * f64::from(self.sample_rate)) as u64
    }

    /// Frames ready to be filled (playback) or drained (capture).
    fn available_frames(&self) -> usize {
        match self.direction {
            Direction::Playback => {
                let played = self.elapsed_frames().min(self.frames_processed);
                let committed = self.frames_processed - played;
                self.buffer_frames - (committed as usize).min(self.buffer_frames)
            }
            Direction::Capture => {
                let produced = self.elapsed_frames().saturating_sub(self.frames_processed);
                (produced as usize).min(self.buffer_frames)
            }
        }
    }
}

impl EndpointSession for NullSession {
    fn run(&mut self, engine: &mut Engine, control: &WorkerControl) -> Result<()> {
        loop {
            if control.should_break() {
                return Ok(());
            }
            let available = self.available_frames();
            if available < self.period_frames {
                control.wait_timeout(self.period);
                continue;
            }
            let n = available.min(self.period_frames);
            match self.direction {
                Direction::Playback => {
                    engine.read_endpoint(n, &mut self.scratch[..n * self.bpf]);
                }
                Direction::Capture => {
                    // The silent device produces zeros; the scratch is
                    // never written to, so it stays silent.
                    engine.deliver_endpoint(n, &self.scratch[..n * self.bpf]);
                }
            }
            self.frames_processed += n as u64;
        }
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
