//! Frame buffer views handed to application callbacks.
//!
//! Devices speak raw interleaved PCM in whatever format the application
//! configured; these views carry the format and channel count alongside the
//! bytes and offer f32 helpers backed by the core converters.

use oido_core::{SampleFormat, convert};

/// A writable block of interleaved frames (playback callback argument).
pub struct FramesMut<'a> {
    bytes: &'a mut [u8],
    format: SampleFormat,
    channels: u16,
}

impl<'a> FramesMut<'a> {
    pub(crate) fn new(bytes: &'a mut [u8], format: SampleFormat, channels: u16) -> Self {
        debug_assert_eq!(bytes.len() % format.bytes_per_frame(channels), 0);
        FramesMut {
            bytes,
            format,
            channels,
        }
    }

    /// Sample format of the frames.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Channels per frame.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames the buffer holds.
    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.format.bytes_per_frame(self.channels)
    }

    /// The raw interleaved little-endian PCM bytes.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    /// Encode interleaved f32 samples into the buffer, converting to the
    /// device format. Returns the number of frames written.
    pub fn write_f32(&mut self, samples: &[f32]) -> usize {
        let ch = self.channels as usize;
        let frames = (samples.len() / ch).min(self.frame_count());
        convert::encode_f32(self.bytes, samples, self.format, frames * ch);
        frames
    }
}

/// A readable block of interleaved frames (capture callback argument).
pub struct Frames<'a> {
    bytes: &'a [u8],
    format: SampleFormat,
    channels: u16,
}

impl<'a> Frames<'a> {
    pub(crate) fn new(bytes: &'a [u8], format: SampleFormat, channels: u16) -> Self {
        debug_assert_eq!(bytes.len() % format.bytes_per_frame(channels), 0);
        Frames {
            bytes,
            format,
            channels,
        }
    }

    /// Sample format of the frames.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Channels per frame.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames the buffer holds.
    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.format.bytes_per_frame(self.channels)
    }

    /// The raw interleaved little-endian PCM bytes.
    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Decode into f32, up to `out`'s capacity. Returns frames decoded.
    pub fn read_f32(&self, out: &mut [f32]) -> usize {
        let ch = self.channels as usize;
        let frames = self.frame_count().min(out.len() / ch);
        convert::decode_f32(out, self.bytes, self.format, frames * ch);
        frames
    }
}

/// Playback callback: fill up to `frame_count` frames, return the count
/// actually written. Shortfalls are zero-filled by the library.
pub type DataCallback = Box<dyn FnMut(&mut FramesMut<'_>) -> usize + Send + 'static>;

/// Capture callback: consume the delivered frames.
pub type CaptureCallback = Box<dyn FnMut(&Frames<'_>) + Send + 'static>;

/// Invoked from the worker thread after every Started -> Stopped
/// transition.
pub type StoppedCallback = Box<dyn FnMut() + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_f32_converts_to_device_format() {
        let mut raw = [0u8; 8];
        let mut frames = FramesMut::new(&mut raw, SampleFormat::S16, 2);
        assert_eq!(frames.frame_count(), 2);
        assert_eq!(frames.write_f32(&[1.0, -1.0, 0.0, 0.5]), 2);
        assert_eq!(i16::from_le_bytes([raw[0], raw[1]]), 32767);
        assert_eq!(i16::from_le_bytes([raw[2], raw[3]]), -32768);
    }

    #[test]
    fn read_f32_decodes() {
        let mut raw = [0u8; 4];
        raw[..2].copy_from_slice(&i16::MAX.to_le_bytes());
        raw[2..].copy_from_slice(&i16::MIN.to_le_bytes());
        let frames = Frames::new(&raw, SampleFormat::S16, 2);
        let mut out = [0.0f32; 2];
        assert_eq!(frames.read_f32(&mut out), 1);
        assert!(out[0] > 0.99 && out[1] == -1.0);
    }

    #[test]
    fn partial_write_reports_frames() {
        let mut raw = [0u8; 16];
        let mut frames = FramesMut::new(&mut raw, SampleFormat::F32, 1);
        assert_eq!(frames.write_f32(&[0.25, 0.5]), 2);
    }
}
