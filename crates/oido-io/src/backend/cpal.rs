//! The cpal bridge backend.
//!
//! cpal pushes callbacks at us from its own audio thread; the device model
//! here is a worker that pulls. The bridge is a mutex-and-condvar byte ring
//! of `buffer_size_in_frames` frames: for playback the worker fills it a
//! period at a time from the engine and the cpal callback drains it (zero
//! filling on underrun); capture is the mirror image. Pre-roll fills the
//! ring completely before the stream starts.

use crate::backend::{Backend, BackendKind, DeviceId, DeviceInfo, EndpointDevice, EndpointSession};
use crate::config::{Direction, ResolvedConfig, StreamParams};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::sync::{WorkerControl, lock};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use oido_core::{ChannelMap, SampleFormat};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// The default host is re-acquired per operation rather than stored, so
/// the backend stays trivially shareable across device threads.
pub(crate) struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        tracing::debug!(host = cpal::default_host().id().name(), "cpal backend initialized");
        CpalBackend
    }

    fn find_device(&self, direction: Direction, id: Option<&DeviceId>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        let search = match id {
            None => {
                return match direction {
                    Direction::Playback => host.default_output_device(),
                    Direction::Capture => host.default_input_device(),
                }
                .ok_or(Error::NoDevice);
            }
            Some(DeviceId::Cpal(name)) => name,
            Some(other) => return Err(Error::DeviceNotFound(format!("{other:?}"))),
        };

        let devices: Vec<cpal::Device> = match direction {
            Direction::Playback => host
                .output_devices()
                .map_err(|e| Error::backend(BackendKind::Cpal, e.to_string()))?
                .collect(),
            Direction::Capture => host
                .input_devices()
                .map_err(|e| Error::backend(BackendKind::Cpal, e.to_string()))?
                .collect(),
        };

        // Exact name first, then a case-insensitive substring match.
        for device in &devices {
            if device.name().is_ok_and(|n| n == *search) {
                return Ok(device.clone());
            }
        }
        let lowered = search.to_lowercase();
        for device in &devices {
            if device
                .name()
                .is_ok_and(|n| n.to_lowercase().contains(&lowered))
            {
                return Ok(device.clone());
            }
        }
        Err(Error::DeviceNotFound(search.clone()))
    }
}

impl Backend for CpalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpal
    }

    fn enumerate(&self, direction: Direction) -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let devices = match direction {
            Direction::Playback => host.output_devices(),
            Direction::Capture => host.input_devices(),
        }
        .map_err(|e| Error::backend(BackendKind::Cpal, e.to_string()))?;

        let mut infos = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                infos.push(DeviceInfo {
                    id: DeviceId::Cpal(name.clone()),
                    name,
                    direction,
                });
            }
        }
        Ok(infos)
    }

    fn open(
        &self,
        direction: Direction,
        id: Option<&DeviceId>,
        config: &ResolvedConfig,
    ) -> Result<Box<dyn EndpointDevice>> {
        let device = self.find_device(direction, id)?;
        let (stream_config, sample_format, negotiated) = negotiate(&device, direction, config)?;
        tracing::debug!(
            format = %negotiated.params.format,
            channels = negotiated.params.channels,
            sample_rate = negotiated.params.sample_rate,
            "cpal endpoint negotiated"
        );
        Ok(Box::new(CpalDevice {
            device,
            direction,
            stream_config,
            sample_format,
            negotiated,
        }))
    }
}

fn to_cpal_format(format: SampleFormat) -> Option<cpal::SampleFormat> {
    match format {
        SampleFormat::U8 => Some(cpal::SampleFormat::U8),
        SampleFormat::S16 => Some(cpal::SampleFormat::I16),
        SampleFormat::S24 => None,
        SampleFormat::S32 => Some(cpal::SampleFormat::I32),
        SampleFormat::F32 => Some(cpal::SampleFormat::F32),
    }
}

fn from_cpal_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormat::U8),
        cpal::SampleFormat::I16 => Some(SampleFormat::S16),
        cpal::SampleFormat::I32 => Some(SampleFormat::S32),
        cpal::SampleFormat::F32 => Some(SampleFormat::F32),
        _ => None,
    }
}

/// Pick the closest supported (format, channels, rate) triple to the
/// request; anything the endpoint cannot do is bridged by the pipeline.
fn negotiate(
    device: &cpal::Device,
    direction: Direction,
    request: &ResolvedConfig,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat, ResolvedConfig)> {
    let requested = request.params;
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Playback => device
            .supported_output_configs()
            .map(Iterator::collect)
            .unwrap_or_default(),
        Direction::Capture => device
            .supported_input_configs()
            .map(Iterator::collect)
            .unwrap_or_default(),
    };

    let (sample_format, channels, sample_rate) = if ranges.is_empty() {
        let default = match direction {
            Direction::Playback => device.default_output_config(),
            Direction::Capture => device.default_input_config(),
        }
        .map_err(|e| Error::backend(BackendKind::Cpal, e.to_string()))?;
        (
            default.sample_format(),
            default.channels(),
            default.sample_rate(),
        )
    } else {
        let mut candidates = Vec::with_capacity(5);
        if let Some(f) = to_cpal_format(requested.format) {
            candidates.push(f);
        }
        for f in [
            cpal::SampleFormat::F32,
            cpal::SampleFormat::I16,
            cpal::SampleFormat::I32,
            cpal::SampleFormat::U8,
        ] {
            if !candidates.contains(&f) {
                candidates.push(f);
            }
        }

        let mut choice = None;
        for candidate in candidates {
            let best = ranges
                .iter()
                .filter(|r| r.sample_format() == candidate)
                .min_by_key(|r| (i32::from(r.channels()) - i32::from(requested.channels)).abs());
            if let Some(range) = best {
                choice = Some((candidate, range));
                break;
            }
        }
        let Some((format, range)) = choice else {
            return Err(Error::FormatNotSupported);
        };
        let rate = requested
            .sample_rate
            .clamp(range.min_sample_rate(), range.max_sample_rate());
        (format, range.channels(), rate)
    };

    let format = from_cpal_format(sample_format).ok_or(Error::FormatNotSupported)?;
    let buffer_size_in_frames = if request.buffer_size_defaulted && sample_rate != requested.sample_rate
    {
        ResolvedConfig::default_buffer_size(sample_rate)
    } else {
        request.buffer_size_in_frames
    };

    let negotiated = ResolvedConfig {
        params: StreamParams {
            format,
            channels,
            sample_rate,
            channel_map: ChannelMap::default_for(channels),
        },
        buffer_size_in_frames,
        ..*request
    };
    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };
    Ok((stream_config, sample_format, negotiated))
}

/// Failure reported by cpal's error callback, ferried to the worker loop.
/// Device disappearance is kept distinct so it surfaces as
/// [`Error::BackendDisconnected`] rather than a generic backend failure.
enum StreamFailure {
    Disconnected,
    Other(String),
}

struct CpalDevice {
    device: cpal::Device,
    direction: Direction,
    stream_config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    negotiated: ResolvedConfig,
}

impl EndpointDevice for CpalDevice {
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
        let period = Duration::from_micros(
            (period_frames as u64 * 1_000_000 / u64::from(params.sample_rate)).max(1_000),
        );

        let ring = Arc::new(ByteRing::new(buffer_frames * bpf));
        let failure: Arc<Mutex<Option<StreamFailure>>> = Arc::new(Mutex::new(None));
        let xruns = Arc::new(AtomicU64::new(0));
        let mut scratch = vec![0u8; buffer_frames * bpf];

        if self.direction == Direction::Playback {
            engine.read_endpoint(buffer_frames, &mut scratch);
            ring.write(&scratch);
        }

        // Ask for period-sized callbacks; not every host honors a fixed
        // size, so fall back to the host's own choice.
        let mut config = self.stream_config.clone();
        config.buffer_size = cpal::BufferSize::Fixed(period_frames as u32);
        let stream = self
            .build_stream(&config, &ring, &failure, &xruns)
            .or_else(|first_err| {
                tracing::debug!(error = %first_err, "fixed buffer size rejected, retrying with default");
                config.buffer_size = cpal::BufferSize::Default;
                self.build_stream(&config, &ring, &failure, &xruns)
            })
            .map_err(|e| Error::backend(BackendKind::Cpal, e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::backend(BackendKind::Cpal, e.to_string()))?;

        Ok(Box::new(CpalSession {
            stream,
            ring,
            failure,
            xruns,
            direction: self.direction,
            period_frames,
            period,
            bpf,
            scratch,
        }))
    }
}

impl CpalDevice {
    fn build_stream(
        &self,
        config: &cpal::StreamConfig,
        ring: &Arc<ByteRing>,
        failure: &Arc<Mutex<Option<StreamFailure>>>,
        xruns: &Arc<AtomicU64>,
    ) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
        let failure_cb = Arc::clone(failure);
        let error_callback = move |err: cpal::StreamError| {
            let report = match err {
                cpal::StreamError::DeviceNotAvailable => StreamFailure::Disconnected,
                other => StreamFailure::Other(other.to_string()),
            };
            let mut slot = lock(&failure_cb);
            if slot.is_none() {
                *slot = Some(report);
            }
        };

        match self.direction {
            Direction::Playback => {
                let ring_cb = Arc::clone(ring);
                let xruns_cb = Arc::clone(xruns);
                self.device.build_output_stream_raw(
                    config,
                    self.sample_format,
                    move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                        let bytes = data.bytes_mut();
                        let got = ring_cb.read(bytes);
                        if got < bytes.len() {
                            bytes[got..].fill(0);
                            xruns_cb.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    error_callback,
                    None,
                )
            }
            Direction::Capture => {
                let ring_cb = Arc::clone(ring);
                let xruns_cb = Arc::clone(xruns);
                self.device.build_input_stream_raw(
                    config,
                    self.sample_format,
                    move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                        let bytes = data.bytes();
                        if ring_cb.write(bytes) < bytes.len() {
                            xruns_cb.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    error_callback,
                    None,
                )
            }
        }
    }
}

struct CpalSession {
    stream: cpal::Stream,
    ring: Arc<ByteRing>,
    failure: Arc<Mutex<Option<StreamFailure>>>,
    xruns: Arc<AtomicU64>,
    direction: Direction,
    period_frames: usize,
    period: Duration,
    bpf: usize,
    scratch: Vec<u8>,
}

impl EndpointSession for CpalSession {
    fn run(&mut self, engine: &mut Engine, control: &WorkerControl) -> Result<()> {
        let period_bytes = self.period_frames * self.bpf;
        loop {
            if control.should_break() {
                return Ok(());
            }
            if let Some(failure) = lock(&self.failure).take() {
                return Err(match failure {
                    StreamFailure::Disconnected => Error::BackendDisconnected(BackendKind::Cpal),
                    StreamFailure::Other(message) => Error::backend(BackendKind::Cpal, message),
                });
            }

            match self.direction {
                Direction::Playback => {
                    if self.ring.space() < period_bytes {
                        self.ring.wait_space(period_bytes, self.period);
                        continue;
                    }
                    let frames = (self.ring.space() / self.bpf).min(self.period_frames);
                    engine.read_endpoint(frames, &mut self.scratch[..frames * self.bpf]);
                    self.ring.write(&self.scratch[..frames * self.bpf]);
                }
                Direction::Capture => {
                    if self.ring.len() < period_bytes {
                        self.ring.wait_data(period_bytes, self.period);
                        continue;
                    }
                    let got = self.ring.read(&mut self.scratch[..period_bytes]);
                    let frames = got / self.bpf;
                    if frames > 0 {
                        engine.deliver_endpoint(frames, &self.scratch[..frames * self.bpf]);
                    }
                }
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        let xruns = self.xruns.load(Ordering::Relaxed);
        if xruns > 0 {
            tracing::debug!(xruns, "stream stopped after under/overruns");
        }
        self.stream
            .pause()
            .map_err(|e| Error::backend(BackendKind::Cpal, e.to_string()))?;
        self.ring.clear();
        Ok(())
    }
}

/// Bounded byte FIFO bridging the worker and the cpal audio callback.
struct ByteRing {
    state: Mutex<RingState>,
    cv: Condvar,
}

struct RingState {
    buf: Vec<u8>,
    head: usize,
    len: usize,
}

impl ByteRing {
    fn new(capacity: usize) -> Self {
        ByteRing {
            state: Mutex::new(RingState {
                buf: vec![0; capacity],
                head: 0,
                len: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Append up to `src.len()` bytes; returns how many fit.
    fn write(&self, src: &[u8]) -> usize {
        let mut st = lock(&self.state);
        let cap = st.buf.len();
        let n = src.len().min(cap - st.len);
        let mut pos = (st.head + st.len) % cap;
        for &byte in &src[..n] {
            st.buf[pos] = byte;
            pos = (pos + 1) % cap;
        }
        st.len += n;
        drop(st);
        self.cv.notify_all();
        n
    }

    /// Pop up to `dst.len()` bytes; returns how many were available.
    fn read(&self, dst: &mut [u8]) -> usize {
        let mut st = lock(&self.state);
        let cap = st.buf.len();
        let n = dst.len().min(st.len);
        for slot in dst[..n].iter_mut() {
            *slot = st.buf[st.head];
            st.head = (st.head + 1) % cap;
        }
        st.len -= n;
        drop(st);
        self.cv.notify_all();
        n
    }

    fn len(&self) -> usize {
        lock(&self.state).len
    }

    fn space(&self) -> usize {
        let st = lock(&self.state);
        st.buf.len() - st.len
    }

    fn clear(&self) {
        let mut st = lock(&self.state);
        st.head = 0;
        st.len = 0;
    }

    /// Wait until at least `bytes` of free space or the timeout expires.
    fn wait_space(&self, bytes: usize, timeout: Duration) {
        let st = lock(&self.state);
        if st.buf.len() - st.len < bytes {
            let _ = self
                .cv
                .wait_timeout(st, timeout)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Wait until at least `bytes` are buffered or the timeout expires.
    fn wait_data(&self, bytes: usize, timeout: Duration) {
        let st = lock(&self.state);
        if st.len < bytes {
            let _ = self
                .cv
                .wait_timeout(st, timeout)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}
