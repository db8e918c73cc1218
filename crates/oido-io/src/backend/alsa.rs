//! Direct ALSA backend (Linux).
//!
//! Negotiates hw/sw params against the requested configuration, then runs
//! the blocking I/O loop: `snd_pcm_wait` bounded by one period so breaks
//! are honored promptly, `avail_update` for the transferable frame count,
//! and interleaved read/write of at most one period per iteration. EPIPE
//! (underrun/overrun) gets one recovery attempt before the failure
//! propagates and stops the device.

use crate::backend::{Backend, BackendKind, DeviceId, DeviceInfo, EndpointDevice, EndpointSession};
use crate::config::{Direction, ResolvedConfig, StreamParams};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::sync::WorkerControl;
use alsa::Direction as AlsaDir;
use alsa::ValueOr;
use alsa::device_name::HintIter;
use alsa::pcm::{Access, Format, Frames, HwParams, IoFormat, PCM, State};
use oido_core::{ChannelMap, SampleFormat};

fn backend_err(e: alsa::Error) -> Error {
    Error::backend(BackendKind::Alsa, e.to_string())
}

fn to_alsa_dir(direction: Direction) -> AlsaDir {
    match direction {
        Direction::Playback => AlsaDir::Playback,
        Direction::Capture => AlsaDir::Capture,
    }
}

/// Formats ALSA can transfer through typed interleaved I/O, best first.
/// Packed 24-bit is deliberately absent; a client asking for s24 gets a
/// wider endpoint format and the pipeline bridges the difference.
fn format_candidates(requested: SampleFormat) -> Vec<(Format, SampleFormat)> {
    let preferred = match requested {
        SampleFormat::U8 => Some((Format::U8, SampleFormat::U8)),
        SampleFormat::S16 => Some((Format::S16LE, SampleFormat::S16)),
        SampleFormat::S24 => None,
        SampleFormat::S32 => Some((Format::S32LE, SampleFormat::S32)),
        SampleFormat::F32 => Some((Format::FloatLE, SampleFormat::F32)),
    };
    let mut list = Vec::with_capacity(5);
    if let Some(entry) = preferred {
        list.push(entry);
    }
    for entry in [
        (Format::FloatLE, SampleFormat::F32),
        (Format::S32LE, SampleFormat::S32),
        (Format::S16LE, SampleFormat::S16),
        (Format::U8, SampleFormat::U8),
    ] {
        if !list.iter().any(|(_, f)| *f == entry.1) {
            list.push(entry);
        }
    }
    list
}

pub(crate) struct AlsaBackend;

impl AlsaBackend {
    pub fn new() -> Result<Self> {
        Ok(AlsaBackend)
    }
}

impl Backend for AlsaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Alsa
    }

    fn enumerate(&self, direction: Direction) -> Result<Vec<DeviceInfo>> {
        let hints = HintIter::new(None, c"pcm").map_err(backend_err)?;
        let mut infos = Vec::new();
        for hint in hints {
            let Some(name) = hint.name else { continue };
            let direction_matches = match (hint.direction, direction) {
                (None, _) => true,
                (Some(AlsaDir::Playback), Direction::Playback) => true,
                (Some(AlsaDir::Capture), Direction::Capture) => true,
                _ => false,
            };
            if !direction_matches {
                continue;
            }
            let display = hint
                .desc
                .as_deref()
                .and_then(|d| d.lines().next())
                .unwrap_or(&name)
                .to_string();
            infos.push(DeviceInfo {
                id: DeviceId::Alsa(name),
                name: display,
                direction,
            });
        }
        Ok(infos)
    }

    fn open(
        &self,
        direction: Direction,
        id: Option<&DeviceId>,
        config: &ResolvedConfig,
    ) -> Result<Box<dyn EndpointDevice>> {
        let name = match id {
            None => "default",
            Some(DeviceId::Alsa(name)) => name.as_str(),
            Some(other) => return Err(Error::DeviceNotFound(format!("{other:?}"))),
        };
        let pcm = PCM::new(name, to_alsa_dir(direction), false).map_err(backend_err)?;
        let negotiated = negotiate(&pcm, config)?;
        tracing::debug!(
            device = name,
            format = %negotiated.params.format,
            channels = negotiated.params.channels,
            sample_rate = negotiated.params.sample_rate,
            buffer = negotiated.buffer_size_in_frames,
            periods = negotiated.periods,
            "alsa endpoint negotiated"
        );
        Ok(Box::new(AlsaDevice {
            pcm,
            direction,
            negotiated,
        }))
    }
}

fn negotiate(pcm: &PCM, request: &ResolvedConfig) -> Result<ResolvedConfig> {
    let requested = request.params;
    let format;
    let channels;
    let rate;
    let buffer;
    let period;
    {
        let hwp = HwParams::any(pcm).map_err(backend_err)?;
        hwp.set_access(Access::RWInterleaved).map_err(backend_err)?;

        let mut chosen = None;
        for (alsa_format, candidate) in format_candidates(requested.format) {
            if hwp.set_format(alsa_format).is_ok() {
                chosen = Some(candidate);
                break;
            }
        }
        format = chosen.ok_or(Error::FormatNotSupported)?;

        let ch = u32::from(requested.channels).clamp(
            hwp.get_channels_min().map_err(backend_err)?,
            hwp.get_channels_max().map_err(backend_err)?,
        );
        hwp.set_channels(ch).map_err(backend_err)?;
        channels = ch as u16;

        rate = hwp
            .set_rate_near(requested.sample_rate, ValueOr::Nearest)
            .map_err(backend_err)?;

        let want_buffer = if request.buffer_size_defaulted && rate != requested.sample_rate {
            ResolvedConfig::default_buffer_size(rate)
        } else {
            request.buffer_size_in_frames
        };
        let want_period = (want_buffer / request.periods).max(1);
        period = hwp
            .set_period_size_near(Frames::from(want_period), ValueOr::Nearest)
            .map_err(backend_err)?;
        buffer = hwp
            .set_buffer_size_near(Frames::from(want_buffer))
            .map_err(backend_err)?;

        pcm.hw_params(&hwp).map_err(backend_err)?;
    }
    {
        let swp = pcm.sw_params_current().map_err(backend_err)?;
        swp.set_start_threshold(buffer).map_err(backend_err)?;
        swp.set_avail_min(period).map_err(backend_err)?;
        pcm.sw_params(&swp).map_err(backend_err)?;
    }

    Ok(ResolvedConfig {
        params: StreamParams {
            format,
            channels,
            sample_rate: rate,
            channel_map: ChannelMap::default_for(channels),
        },
        buffer_size_in_frames: buffer as u32,
        periods: ((buffer / period.max(1)) as u32).max(1),
        buffer_size_defaulted: request.buffer_size_defaulted,
        periods_defaulted: request.periods_defaulted,
    })
}

struct AlsaDevice {
    pcm: PCM,
    direction: Direction,
    negotiated: ResolvedConfig,
}

impl EndpointDevice for AlsaDevice {
    fn negotiated(&self) -> ResolvedConfig {
        self.negotiated
    }

    fn open_session<'a>(
        &'a mut self,
        engine: &mut Engine,
    ) -> Result<Box<dyn EndpointSession + 'a>> {
        let params = self.negotiated.params;
        let channels = params.channels as usize;
        let bpf = params.format.bytes_per_frame(params.channels);
        let buffer_frames = self.negotiated.buffer_size_in_frames as usize;
        let period_frames = self.negotiated.period_size_in_frames() as usize;

        self.pcm.prepare().map_err(backend_err)?;

        let mut session = AlsaSession {
            pcm: &self.pcm,
            direction: self.direction,
            channels,
            bpf,
            period_frames,
            wait_ms: ((period_frames as u64 * 1000 / u64::from(params.sample_rate)).max(1)) as u32,
            bytes: vec![0u8; buffer_frames * bpf],
            typed: TypedBuf::new(params.format, buffer_frames * channels)?,
            recovered: false,
        };

        if self.direction == Direction::Playback {
            engine.read_endpoint(buffer_frames, &mut session.bytes[..buffer_frames * bpf]);
            session.submit(buffer_frames)?;
        }
        if self.pcm.state() != State::Running {
            self.pcm
                .start()
                .map_err(|e| Error::backend(BackendKind::Alsa, format!("failed to start endpoint: {e}")))?;
        }
        Ok(Box::new(session))
    }
}

/// Interleaved transfer buffer in the endpoint's native sample type.
enum TypedBuf {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl TypedBuf {
    fn new(format: SampleFormat, samples: usize) -> Result<Self> {
        Ok(match format {
            SampleFormat::U8 => TypedBuf::U8(vec![0; samples]),
            SampleFormat::S16 => TypedBuf::I16(vec![0; samples]),
            SampleFormat::S32 => TypedBuf::I32(vec![0; samples]),
            SampleFormat::F32 => TypedBuf::F32(vec![0.0; samples]),
            SampleFormat::S24 => return Err(Error::FormatNotSupported),
        })
    }
}

fn marshal_bytes_to_typed(bytes: &[u8], typed: &mut TypedBuf, samples: usize) {
    match typed {
        TypedBuf::U8(buf) => buf[..samples].copy_from_slice(&bytes[..samples]),
        TypedBuf::I16(buf) => {
            for (i, c) in bytes[..samples * 2].chunks_exact(2).enumerate() {
                buf[i] = i16::from_le_bytes([c[0], c[1]]);
            }
        }
        TypedBuf::I32(buf) => {
            for (i, c) in bytes[..samples * 4].chunks_exact(4).enumerate() {
                buf[i] = i32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            }
        }
        TypedBuf::F32(buf) => {
            for (i, c) in bytes[..samples * 4].chunks_exact(4).enumerate() {
                buf[i] = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            }
        }
    }
}

fn marshal_typed_to_bytes(typed: &TypedBuf, bytes: &mut [u8], samples: usize) {
    match typed {
        TypedBuf::U8(buf) => bytes[..samples].copy_from_slice(&buf[..samples]),
        TypedBuf::I16(buf) => {
            for (i, v) in buf[..samples].iter().enumerate() {
                bytes[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
            }
        }
        TypedBuf::I32(buf) => {
            for (i, v) in buf[..samples].iter().enumerate() {
                bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
        TypedBuf::F32(buf) => {
            for (i, v) in buf[..samples].iter().enumerate() {
                bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
    }
}

/// Write every frame in `buf`, recovering once from an xrun.
fn write_all<S: IoFormat + Copy>(
    pcm: &PCM,
    mut buf: &[S],
    channels: usize,
    recovered: &mut bool,
) -> Result<()> {
    let io = pcm.io_checked::<S>().map_err(backend_err)?;
    while !buf.is_empty() {
        match io.writei(buf) {
            Ok(frames) => {
                *recovered = false;
                buf = &buf[frames * channels..];
            }
            Err(e) => {
                if *recovered {
                    return Err(backend_err(e));
                }
                *recovered = true;
                tracing::debug!(error = %e, "xrun during write, recovering");
                pcm.try_recover(e, true).map_err(backend_err)?;
            }
        }
    }
    Ok(())
}

/// One interleaved read, recovering once from an xrun. Returns frames read.
fn read_once<S: IoFormat + Copy>(
    pcm: &PCM,
    buf: &mut [S],
    recovered: &mut bool,
) -> Result<usize> {
    let io = pcm.io_checked::<S>().map_err(backend_err)?;
    match io.readi(buf) {
        Ok(frames) => {
            *recovered = false;
            Ok(frames)
        }
        Err(e) => {
            if *recovered {
                return Err(backend_err(e));
            }
            *recovered = true;
            tracing::debug!(error = %e, "xrun during read, recovering");
            pcm.try_recover(e, true).map_err(backend_err)?;
            Ok(0)
        }
    }
}

struct AlsaSession<'a> {
    pcm: &'a PCM,
    direction: Direction,
    channels: usize,
    bpf: usize,
    period_frames: usize,
    wait_ms: u32,
    bytes: Vec<u8>,
    typed: TypedBuf,
    recovered: bool,
}

impl AlsaSession<'_> {
    fn handle_xrun(&mut self, err: alsa::Error) -> Result<()> {
        if self.recovered {
            return Err(backend_err(err));
        }
        self.recovered = true;
        tracing::debug!(error = %err, "xrun, recovering");
        self.pcm.try_recover(err, true).map_err(backend_err)
    }

    /// Marshal `frames` from the byte staging into the typed buffer and
    /// write them to the endpoint.
    fn submit(&mut self, frames: usize) -> Result<()> {
        let samples = frames * self.channels;
        marshal_bytes_to_typed(&self.bytes, &mut self.typed, samples);
        match &self.typed {
            TypedBuf::U8(buf) => write_all(self.pcm, &buf[..samples], self.channels, &mut self.recovered),
            TypedBuf::I16(buf) => write_all(self.pcm, &buf[..samples], self.channels, &mut self.recovered),
            TypedBuf::I32(buf) => write_all(self.pcm, &buf[..samples], self.channels, &mut self.recovered),
            TypedBuf::F32(buf) => write_all(self.pcm, &buf[..samples], self.channels, &mut self.recovered),
        }
    }

    /// Read up to `frames` from the endpoint and hand them to the engine.
    fn collect(&mut self, frames: usize, engine: &mut Engine) -> Result<()> {
        let samples = frames * self.channels;
        let read = match &mut self.typed {
            TypedBuf::U8(buf) => read_once(self.pcm, &mut buf[..samples], &mut self.recovered)?,
            TypedBuf::I16(buf) => read_once(self.pcm, &mut buf[..samples], &mut self.recovered)?,
            TypedBuf::I32(buf) => read_once(self.pcm, &mut buf[..samples], &mut self.recovered)?,
            TypedBuf::F32(buf) => read_once(self.pcm, &mut buf[..samples], &mut self.recovered)?,
        };
        if read > 0 {
            marshal_typed_to_bytes(&self.typed, &mut self.bytes, read * self.channels);
            engine.deliver_endpoint(read, &self.bytes[..read * self.bpf]);
        }
        Ok(())
    }
}

impl EndpointSession for AlsaSession<'_> {
    fn run(&mut self, engine: &mut Engine, control: &WorkerControl) -> Result<()> {
        loop {
            if control.should_break() {
                return Ok(());
            }
            if let Err(e) = self.pcm.wait(Some(self.wait_ms)) {
                self.handle_xrun(e)?;
                continue;
            }
            if control.should_break() {
                return Ok(());
            }
            let avail = match self.pcm.avail_update() {
                Ok(avail) => avail,
                Err(e) => {
                    self.handle_xrun(e)?;
                    continue;
                }
            };
            if avail <= 0 {
                continue;
            }
            let frames = (avail as usize).min(self.period_frames);
            match self.direction {
                Direction::Playback => {
                    engine.read_endpoint(frames, &mut self.bytes[..frames * self.bpf]);
                    self.submit(frames)?;
                }
                Direction::Capture => self.collect(frames, engine)?,
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.pcm.drop().map_err(backend_err)?;
        self.pcm.prepare().map_err(backend_err)?;
        Ok(())
    }
}
