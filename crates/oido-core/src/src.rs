//! Pull-based sample-rate conversion.
//!
//! The [`Resampler`] sits between an upstream pull callback (producing
//! frames in `format_in`) and a caller asking for frames at a different
//! rate. Frames are staged through a bounded f32 [`Cache`] so the upstream
//! is asked for batches rather than single frames, and interpolated with a
//! linear kernel:
//!
//! ```text
//! out = prev * (1 - alpha) + next * alpha,   alpha += rate_in / rate_out
//! ```
//!
//! Identical in/out rates degrade the algorithm to [`SrcAlgorithm::None`],
//! a format-converting passthrough that preserves the exact integer
//! conversion semantics of [`crate::convert`].

use crate::error::DspError;
use crate::format::SampleFormat;
use crate::{MAX_CHANNELS, convert};

/// Upper bound on the frame capacity of the resampler cache.
pub const MAX_CACHE_FRAMES: usize = 512;

const SCRATCH_BYTES: usize = 4096;

/// Interpolation kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcAlgorithm {
    /// No rate conversion; format conversion only.
    None,
    /// Two-point linear interpolation.
    Linear,
}

/// Resampler configuration.
#[derive(Debug, Clone, Copy)]
pub struct SrcConfig {
    /// Upstream sample rate in Hz.
    pub rate_in: u32,
    /// Produced sample rate in Hz.
    pub rate_out: u32,
    /// Format delivered by the upstream callback.
    pub format_in: SampleFormat,
    /// Format written to the caller by [`Resampler::read`].
    pub format_out: SampleFormat,
    /// Interleaved channel count, `1..=18`.
    pub channels: u16,
    /// Cache capacity in frames; 0 picks the maximum (512).
    pub cache_size_in_frames: usize,
    /// Requested kernel. Forced to [`SrcAlgorithm::None`] when the rates
    /// are identical.
    pub algorithm: SrcAlgorithm,
}

/// Bounded f32 frame cache between the upstream callback and the kernel.
struct Cache {
    frames: [f32; MAX_CACHE_FRAMES * MAX_CHANNELS],
    scratch: [u8; SCRATCH_BYTES],
    capacity: usize,
    channels: usize,
    format_in: SampleFormat,
    len: usize,
    cursor: usize,
}

impl Cache {
    fn new(capacity: usize, channels: usize, format_in: SampleFormat) -> Self {
        Cache {
            frames: [0.0; MAX_CACHE_FRAMES * MAX_CHANNELS],
            scratch: [0; SCRATCH_BYTES],
            capacity,
            channels,
            format_in,
            len: 0,
            cursor: 0,
        }
    }

    /// Copy up to `frames` frames into `out`, refilling from the upstream
    /// when the cache runs dry. Returns the frames delivered; short counts
    /// mean the upstream is exhausted.
    fn read_frames(
        &mut self,
        frames: usize,
        out: &mut [f32],
        upstream: &mut dyn FnMut(usize, &mut [u8]) -> usize,
    ) -> usize {
        let ch = self.channels;
        let mut read = 0;
        while read < frames {
            let avail = self.len - self.cursor;
            if avail > 0 {
                let take = avail.min(frames - read);
                let s = self.cursor * ch;
                out[read * ch..(read + take) * ch].copy_from_slice(&self.frames[s..s + take * ch]);
                self.cursor += take;
                read += take;
                continue;
            }
            if self.refill(upstream) == 0 {
                break;
            }
        }
        read
    }

    /// Ask the upstream for up to a cache-full of frames, converting them
    /// to f32 through the byte scratch.
    fn refill(&mut self, upstream: &mut dyn FnMut(usize, &mut [u8]) -> usize) -> usize {
        let ch = self.channels;
        let bpf = self.format_in.bytes_per_frame(ch as u16);
        let chunk = (SCRATCH_BYTES / bpf).max(1);

        let mut loaded = 0;
        while loaded < self.capacity {
            let want = chunk.min(self.capacity - loaded);
            let got = upstream(want, &mut self.scratch[..want * bpf]);
            if got == 0 {
                break;
            }
            convert::decode_f32(
                &mut self.frames[loaded * ch..(loaded + got) * ch],
                &self.scratch,
                self.format_in,
                got * ch,
            );
            loaded += got;
            if got < want {
                break;
            }
        }
        self.len = loaded;
        self.cursor = 0;
        loaded
    }
}

/// Pull-based sample-rate converter.
pub struct Resampler {
    config: SrcConfig,
    ratio: f32,
    alpha: f32,
    prev: [f32; MAX_CHANNELS],
    next: [f32; MAX_CHANNELS],
    bin_loaded: bool,
    next_loaded: bool,
    cache: Cache,
}

impl Resampler {
    /// Validate a configuration and build the converter.
    pub fn new(mut config: SrcConfig) -> Result<Self, DspError> {
        if config.rate_in == 0 || config.rate_out == 0 {
            return Err(DspError::InvalidSampleRate);
        }
        if config.channels == 0 || config.channels as usize > MAX_CHANNELS {
            return Err(DspError::InvalidChannelCount(config.channels));
        }
        if config.cache_size_in_frames == 0 || config.cache_size_in_frames > MAX_CACHE_FRAMES {
            config.cache_size_in_frames = MAX_CACHE_FRAMES;
        }
        if config.rate_in == config.rate_out {
            config.algorithm = SrcAlgorithm::None;
        }

        Ok(Resampler {
            ratio: config.rate_in as f32 / config.rate_out as f32,
            alpha: 0.0,
            prev: [0.0; MAX_CHANNELS],
            next: [0.0; MAX_CHANNELS],
            bin_loaded: false,
            next_loaded: false,
            cache: Cache::new(
                config.cache_size_in_frames,
                config.channels as usize,
                config.format_in,
            ),
            config,
        })
    }

    /// The resolved configuration (cache size clamped, algorithm possibly
    /// downgraded).
    pub fn config(&self) -> &SrcConfig {
        &self.config
    }

    /// The kernel in effect.
    pub fn algorithm(&self) -> SrcAlgorithm {
        self.config.algorithm
    }

    /// Read up to `frames` frames as f32, skipping the output format
    /// conversion of [`Resampler::read`].
    ///
    /// Returns the frames produced; a short count means the upstream is
    /// exhausted.
    pub fn read_f32(
        &mut self,
        frames: usize,
        out: &mut [f32],
        upstream: &mut dyn FnMut(usize, &mut [u8]) -> usize,
    ) -> usize {
        match self.config.algorithm {
            SrcAlgorithm::None => self.read_f32_passthrough(frames, out, upstream),
            SrcAlgorithm::Linear => self.read_f32_linear(frames, out, upstream),
        }
    }

    /// Read up to `frames` frames in `format_out`.
    pub fn read(
        &mut self,
        frames: usize,
        out: &mut [u8],
        upstream: &mut dyn FnMut(usize, &mut [u8]) -> usize,
    ) -> usize {
        let ch = self.config.channels as usize;
        let bpf_out = self.config.format_out.bytes_per_frame(self.config.channels);

        if self.config.algorithm == SrcAlgorithm::None {
            // Direct per-pair conversion keeps integer chains bit-exact.
            let bpf_in = self.config.format_in.bytes_per_frame(self.config.channels);
            let chunk = (SCRATCH_BYTES / bpf_in).max(1);
            let mut total = 0;
            while total < frames {
                let want = chunk.min(frames - total);
                let got = upstream(want, &mut self.cache.scratch[..want * bpf_in]);
                if got == 0 {
                    break;
                }
                convert::convert(
                    &mut out[total * bpf_out..(total + got) * bpf_out],
                    &self.cache.scratch,
                    got * ch,
                    self.config.format_in,
                    self.config.format_out,
                );
                total += got;
                if got < want {
                    break;
                }
            }
            return total;
        }

        let mut stage = [0.0f32; SCRATCH_BYTES / 8];
        let chunk = (stage.len() / ch).max(1);
        let mut total = 0;
        while total < frames {
            let want = chunk.min(frames - total);
            let got = self.read_f32_linear(want, &mut stage, upstream);
            if got == 0 {
                break;
            }
            convert::encode_f32(
                &mut out[total * bpf_out..(total + got) * bpf_out],
                &stage,
                self.config.format_out,
                got * ch,
            );
            total += got;
            if got < want {
                break;
            }
        }
        total
    }

    fn read_f32_passthrough(
        &mut self,
        frames: usize,
        out: &mut [f32],
        upstream: &mut dyn FnMut(usize, &mut [u8]) -> usize,
    ) -> usize {
        let ch = self.config.channels as usize;
        let bpf = self.config.format_in.bytes_per_frame(self.config.channels);
        let chunk = (SCRATCH_BYTES / bpf).max(1);
        let mut total = 0;
        while total < frames {
            let want = chunk.min(frames - total);
            let got = upstream(want, &mut self.cache.scratch[..want * bpf]);
            if got == 0 {
                break;
            }
            convert::decode_f32(
                &mut out[total * ch..(total + got) * ch],
                &self.cache.scratch,
                self.config.format_in,
                got * ch,
            );
            total += got;
            if got < want {
                break;
            }
        }
        total
    }

    fn read_f32_linear(
        &mut self,
        frames: usize,
        out: &mut [f32],
        upstream: &mut dyn FnMut(usize, &mut [u8]) -> usize,
    ) -> usize {
        let ch = self.config.channels as usize;

        if !self.bin_loaded {
            let mut frame = [0.0f32; MAX_CHANNELS];
            if self.cache.read_frames(1, &mut frame[..ch], upstream) == 0 {
                return 0;
            }
            self.prev[..ch].copy_from_slice(&frame[..ch]);
            if self.cache.read_frames(1, &mut frame[..ch], upstream) == 1 {
                self.next[..ch].copy_from_slice(&frame[..ch]);
                self.next_loaded = true;
            } else {
                self.next[..ch].fill(0.0);
                self.next_loaded = false;
            }
            self.alpha = 0.0;
            self.bin_loaded = true;
        }

        let mut produced = 0;
        while produced < frames {
            // Consume whole input steps accumulated in alpha.
            while self.alpha >= 1.0 {
                self.alpha -= 1.0;
                self.prev = self.next;
                if !self.next_loaded {
                    break;
                }
                let mut frame = [0.0f32; MAX_CHANNELS];
                if self.cache.read_frames(1, &mut frame[..ch], upstream) == 0 {
                    self.next[..ch].fill(0.0);
                    self.next_loaded = false;
                    break;
                }
                self.next[..ch].copy_from_slice(&frame[..ch]);
            }

            let a = self.alpha;
            for c in 0..ch {
                out[produced * ch + c] = self.prev[c] + a * (self.next[c] - self.prev[c]);
            }
            produced += 1;
            self.alpha += self.ratio;

            if !self.next_loaded {
                // Upstream ran dry mid-shift; the bin must reload (and will
                // observe the exhaustion) before anything more is produced.
                self.bin_loaded = false;
                break;
            }
        }
        produced
    }
}
