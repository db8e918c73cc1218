//! The pull-based DSP pipeline between a client stream and an endpoint.
//!
//! A [`Pipeline`] is configured with both sides of a stream - what the
//! client produces or consumes, and what the endpoint negotiated - and
//! bridges them on the fly: sample-rate conversion first (through the
//! [`Resampler`]), then channel-count remixing, then shuffle-table
//! remapping, then output format encoding. Stages that are not needed cost
//! nothing; a stream with identical descriptions on both sides is detected
//! as passthrough and delegates straight to the upstream callback.
//!
//! Everything is staged through fixed scratch buffers sized so that one
//! chunk never exceeds 4 KiB per stage, whatever the channel count.

use crate::channel::{self, ChannelMap};
use crate::convert;
use crate::error::DspError;
use crate::format::SampleFormat;
use crate::mix::{MixMode, remix};
use crate::src::{Resampler, SrcAlgorithm, SrcConfig};
use crate::{MAX_CHANNELS, MAX_SAMPLE_SIZE};

const STAGE_BYTES: usize = 4096;
const STAGE_SAMPLES: usize = STAGE_BYTES / MAX_SAMPLE_SIZE;

/// Both sides of a stream bridged by a [`Pipeline`].
///
/// "in" is the side the pipeline pulls from (the upstream callback), "out"
/// the side it produces. For playback devices the client is the in side and
/// the endpoint the out side; capture is the reverse.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Sample format delivered by the upstream callback.
    pub format_in: SampleFormat,
    /// Channels delivered by the upstream callback.
    pub channels_in: u16,
    /// Sample rate of the upstream side, Hz.
    pub rate_in: u32,
    /// Channel layout of the upstream side.
    pub channel_map_in: ChannelMap,
    /// Sample format produced by [`Pipeline::read`].
    pub format_out: SampleFormat,
    /// Channels produced by [`Pipeline::read`].
    pub channels_out: u16,
    /// Sample rate of the produced side, Hz.
    pub rate_out: u32,
    /// Channel layout of the produced side.
    pub channel_map_out: ChannelMap,
}

/// Which scratch currently holds the working chunk.
#[derive(Clone, Copy, PartialEq)]
enum Stage {
    Bytes,
    F32A,
    F32B,
}

/// Pull-based reader that transforms between two stream descriptions.
pub struct Pipeline {
    config: PipelineConfig,
    resampler: Option<Resampler>,
    shuffle: [u8; MAX_CHANNELS],
    is_channel_mapping_required: bool,
    is_passthrough: bool,
    chunk_frames: usize,
    stage_a: [f32; STAGE_SAMPLES],
    stage_b: [f32; STAGE_SAMPLES],
    stage_bytes: [u8; STAGE_BYTES],
}

impl Pipeline {
    /// Validate the configuration and precompute the conversion plan.
    pub fn new(config: PipelineConfig) -> Result<Self, DspError> {
        if config.rate_in == 0 || config.rate_out == 0 {
            return Err(DspError::InvalidSampleRate);
        }
        for channels in [config.channels_in, config.channels_out] {
            if channels == 0 || channels as usize > MAX_CHANNELS {
                return Err(DspError::InvalidChannelCount(channels));
            }
        }
        for (map, channels) in [
            (&config.channel_map_in, config.channels_in),
            (&config.channel_map_out, config.channels_out),
        ] {
            if !map.is_empty() && map.len() != channels as usize {
                return Err(DspError::InvalidChannelMap(
                    "length does not match channel count",
                ));
            }
        }

        let resampler = if config.rate_in != config.rate_out {
            Some(Resampler::new(SrcConfig {
                rate_in: config.rate_in,
                rate_out: config.rate_out,
                format_in: config.format_in,
                format_out: SampleFormat::F32,
                channels: config.channels_in,
                cache_size_in_frames: 0,
                algorithm: SrcAlgorithm::Linear,
            })?)
        } else {
            None
        };

        let mut shuffle = [0u8; MAX_CHANNELS];
        let mut is_channel_mapping_required = false;
        if config.channel_map_in.is_positioned() && config.channel_map_out.is_positioned() {
            let post = channel::post_mix_map(&config.channel_map_in, &config.channel_map_out);
            if post != config.channel_map_out {
                shuffle = channel::shuffle_table(&post, &config.channel_map_out);
                is_channel_mapping_required = true;
            }
        }

        let is_passthrough = resampler.is_none()
            && config.format_in == config.format_out
            && config.channels_in == config.channels_out
            && !is_channel_mapping_required;

        let widest = config.channels_in.max(config.channels_out) as usize;
        let chunk_frames = (STAGE_BYTES / (widest * MAX_SAMPLE_SIZE)).max(1);

        Ok(Pipeline {
            config,
            resampler,
            shuffle,
            is_channel_mapping_required,
            is_passthrough,
            chunk_frames,
            stage_a: [0.0; STAGE_SAMPLES],
            stage_b: [0.0; STAGE_SAMPLES],
            stage_bytes: [0; STAGE_BYTES],
        })
    }

    /// The configuration the pipeline was built from.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether reads delegate directly to the upstream callback.
    pub fn is_passthrough(&self) -> bool {
        self.is_passthrough
    }

    /// Whether a sample-rate converter is attached.
    pub fn is_src_required(&self) -> bool {
        self.resampler.is_some()
    }

    /// Whether a shuffle-table remap runs on every frame.
    pub fn is_channel_mapping_required(&self) -> bool {
        self.is_channel_mapping_required
    }

    /// Pull up to `frames` frames from `upstream`, producing them in the
    /// out-side description at the start of `dst`.
    ///
    /// Returns the frames produced; a short count means the upstream is
    /// exhausted. `dst` must hold `frames` out-side frames.
    pub fn read(
        &mut self,
        frames: usize,
        dst: &mut [u8],
        upstream: &mut dyn FnMut(usize, &mut [u8]) -> usize,
    ) -> usize {
        let ci = self.config.channels_in as usize;
        let co = self.config.channels_out as usize;
        let bpf_out = self.config.format_out.bytes_per_frame(self.config.channels_out);
        debug_assert!(dst.len() >= frames * bpf_out);

        if self.is_passthrough {
            return upstream(frames, &mut dst[..frames * bpf_out]);
        }

        let bpf_in = self.config.format_in.bytes_per_frame(self.config.channels_in);
        let mut total = 0;
        while total < frames {
            let want = self.chunk_frames.min(frames - total);

            let (got, mut cur) = match self.resampler.as_mut() {
                Some(resampler) => {
                    let n = resampler.read_f32(want, &mut self.stage_a[..want * ci], upstream);
                    (n, Stage::F32A)
                }
                None => {
                    let n = upstream(want, &mut self.stage_bytes[..want * bpf_in]);
                    (n, Stage::Bytes)
                }
            };
            if got == 0 {
                break;
            }

            if ci != co {
                if cur == Stage::Bytes {
                    convert::decode_f32(
                        &mut self.stage_a[..got * ci],
                        &self.stage_bytes,
                        self.config.format_in,
                        got * ci,
                    );
                    cur = Stage::F32A;
                }
                remix(
                    &mut self.stage_b[..got * co],
                    &self.stage_a[..got * ci],
                    got,
                    self.config.channels_in,
                    self.config.channels_out,
                    MixMode::Blend,
                );
                cur = Stage::F32B;
            }

            if self.is_channel_mapping_required {
                if cur == Stage::Bytes {
                    convert::decode_f32(
                        &mut self.stage_a[..got * ci],
                        &self.stage_bytes,
                        self.config.format_in,
                        got * ci,
                    );
                    cur = Stage::F32A;
                }
                let buf = match cur {
                    Stage::F32A => &mut self.stage_a,
                    _ => &mut self.stage_b,
                };
                channel::apply_shuffle(
                    &mut buf[..got * co],
                    self.config.channels_out,
                    &self.shuffle,
                );
            }

            let dst_chunk = &mut dst[total * bpf_out..(total + got) * bpf_out];
            match cur {
                Stage::Bytes => convert::convert(
                    dst_chunk,
                    &self.stage_bytes,
                    got * co,
                    self.config.format_in,
                    self.config.format_out,
                ),
                Stage::F32A => {
                    convert::encode_f32(dst_chunk, &self.stage_a, self.config.format_out, got * co);
                }
                Stage::F32B => {
                    convert::encode_f32(dst_chunk, &self.stage_b, self.config.format_out, got * co);
                }
            }

            total += got;
            if got < want {
                break;
            }
        }
        total
    }
}
