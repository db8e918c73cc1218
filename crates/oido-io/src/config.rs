//! Device configuration and stream parameter sets.

use crate::error::{Error, Result};
use core::fmt;
use oido_core::{ChannelMap, MAX_CHANNELS, SampleFormat};

/// Whether a device plays frames to an endpoint or captures frames from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frames flow application -> endpoint.
    Playback,
    /// Frames flow endpoint -> application.
    Capture,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Playback => "playback",
            Direction::Capture => "capture",
        })
    }
}

/// One side of a stream: what flows across an interface boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Sample format of the interleaved frames.
    pub format: SampleFormat,
    /// Channels per frame.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout.
    pub channel_map: ChannelMap,
}

/// Requested device configuration.
///
/// Zero values for `buffer_size_in_frames` and `periods` pick the defaults
/// (25 ms of frames, 2 periods); backends may adjust defaulted values
/// during negotiation. An empty `channel_map` picks the standard layout
/// for the channel count.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Stream format the application reads or writes.
    pub format: SampleFormat,
    /// Channel count, `1..=18`.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout; empty picks the default for `channels`.
    pub channel_map: ChannelMap,
    /// Endpoint buffer size in frames; 0 picks the default.
    pub buffer_size_in_frames: u32,
    /// Number of periods the endpoint buffer is divided into; 0 picks 2.
    pub periods: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            format: SampleFormat::S16,
            channels: 2,
            sample_rate: 48000,
            channel_map: ChannelMap::EMPTY,
            buffer_size_in_frames: 0,
            periods: 0,
        }
    }
}

/// Default endpoint buffer length in milliseconds.
const DEFAULT_BUFFER_MS: u32 = 25;
const DEFAULT_PERIODS: u32 = 2;

/// A validated configuration with defaults applied.
///
/// Backends receive this shape as the request and return the same shape as
/// the negotiated result; the `*_defaulted` flags tell them which values
/// they are free to adjust.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedConfig {
    /// The stream parameter set.
    pub params: StreamParams,
    /// Endpoint buffer size in frames.
    pub buffer_size_in_frames: u32,
    /// Periods in the endpoint buffer.
    pub periods: u32,
    /// Whether the buffer size came from the default rather than the caller.
    pub buffer_size_defaulted: bool,
    /// Whether the period count came from the default.
    pub periods_defaulted: bool,
}

impl ResolvedConfig {
    /// Frames per period.
    pub fn period_size_in_frames(&self) -> u32 {
        (self.buffer_size_in_frames / self.periods).max(1)
    }

    /// Default buffer size for a sample rate: 25 ms worth of frames.
    pub(crate) fn default_buffer_size(sample_rate: u32) -> u32 {
        (sample_rate / 1000 * DEFAULT_BUFFER_MS).max(1)
    }
}

impl DeviceConfig {
    /// Validate the request and apply defaults.
    pub(crate) fn resolve(&self) -> Result<ResolvedConfig> {
        if self.channels == 0 || self.channels as usize > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "channel count {} out of range 1..=18",
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample rate must be non-zero".into()));
        }
        let channel_map = if self.channel_map.is_empty() {
            ChannelMap::default_for(self.channels)
        } else if self.channel_map.len() != self.channels as usize {
            return Err(Error::InvalidConfig(format!(
                "channel map has {} entries for {} channels",
                self.channel_map.len(),
                self.channels
            )));
        } else {
            self.channel_map
        };

        let buffer_size_defaulted = self.buffer_size_in_frames == 0;
        let buffer_size_in_frames = if buffer_size_defaulted {
            ResolvedConfig::default_buffer_size(self.sample_rate)
        } else {
            self.buffer_size_in_frames
        };
        let periods_defaulted = self.periods == 0;
        let periods = if periods_defaulted { DEFAULT_PERIODS } else { self.periods };

        if buffer_size_in_frames < periods {
            return Err(Error::InvalidConfig(format!(
                "buffer of {buffer_size_in_frames} frames cannot hold {periods} periods"
            )));
        }

        Ok(ResolvedConfig {
            params: StreamParams {
                format: self.format,
                channels: self.channels,
                sample_rate: self.sample_rate,
                channel_map,
            },
            buffer_size_in_frames,
            periods,
            buffer_size_defaulted,
            periods_defaulted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let resolved = DeviceConfig::default().resolve().unwrap();
        assert_eq!(resolved.buffer_size_in_frames, 1200);
        assert_eq!(resolved.periods, 2);
        assert!(resolved.buffer_size_defaulted);
        assert!(resolved.periods_defaulted);
        assert_eq!(resolved.params.channel_map, ChannelMap::default_for(2));
        assert_eq!(resolved.period_size_in_frames(), 600);
    }

    #[test]
    fn explicit_values_kept() {
        let config = DeviceConfig {
            sample_rate: 44100,
            buffer_size_in_frames: 4410,
            periods: 3,
            ..DeviceConfig::default()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.buffer_size_in_frames, 4410);
        assert_eq!(resolved.periods, 3);
        assert!(!resolved.buffer_size_defaulted);
        assert!(!resolved.periods_defaulted);
    }

    #[test]
    fn zero_channels_rejected() {
        let config = DeviceConfig {
            channels: 0,
            ..DeviceConfig::default()
        };
        assert!(matches!(config.resolve(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_rate_rejected() {
        let config = DeviceConfig {
            sample_rate: 0,
            ..DeviceConfig::default()
        };
        assert!(matches!(config.resolve(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn mismatched_map_rejected() {
        let config = DeviceConfig {
            channels: 2,
            channel_map: ChannelMap::default_for(6),
            ..DeviceConfig::default()
        };
        assert!(matches!(config.resolve(), Err(Error::InvalidConfig(_))));
    }
}
