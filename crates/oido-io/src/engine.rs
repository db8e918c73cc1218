//! The per-device stream engine.
//!
//! An [`Engine`] owns the DSP pipeline bridging the client-side stream
//! parameters and whatever the endpoint negotiated, and drives the
//! application callbacks. Backends see two operations only:
//! [`Engine::read_endpoint`] pulls endpoint-format frames for playback
//! (zero-filling anything the application did not produce), and
//! [`Engine::deliver_endpoint`] pushes captured endpoint-format frames
//! through the pipeline to the application in bounded chunks.

use crate::buffer::{CaptureCallback, DataCallback, Frames, FramesMut, StoppedCallback};
use crate::config::{Direction, StreamParams};
use crate::error::Result;
use crate::sync::lock;
use oido_core::{Pipeline, PipelineConfig};
use std::sync::{Arc, Mutex};

/// Size cap for one capture delivery to the application.
const CAPTURE_CHUNK_BYTES: usize = 4096;

/// Replaceable application callbacks.
///
/// Slots are mutex-guarded; the worker holds a slot's lock only while
/// invoking it, and installers swap the boxed callback under the same lock,
/// so an invocation always sees a callback that was fully installed.
pub(crate) struct CallbackSlots {
    data: Mutex<Option<DataCallback>>,
    capture: Mutex<Option<CaptureCallback>>,
    stopped: Mutex<Option<StoppedCallback>>,
}

impl CallbackSlots {
    pub fn new() -> Self {
        CallbackSlots {
            data: Mutex::new(None),
            capture: Mutex::new(None),
            stopped: Mutex::new(None),
        }
    }

    pub fn set_data(&self, callback: Option<DataCallback>) {
        *lock(&self.data) = callback;
    }

    pub fn set_capture(&self, callback: Option<CaptureCallback>) {
        *lock(&self.capture) = callback;
    }

    pub fn set_stopped(&self, callback: Option<StoppedCallback>) {
        *lock(&self.stopped) = callback;
    }
}

/// Moves frames between the endpoint and the application callback through
/// the DSP pipeline. Owned by the worker thread.
pub(crate) struct Engine {
    direction: Direction,
    client: StreamParams,
    endpoint: StreamParams,
    pipeline: Pipeline,
    callbacks: Arc<CallbackSlots>,
    stage: [u8; CAPTURE_CHUNK_BYTES],
}

impl Engine {
    /// Build the pipeline between the client and endpoint parameter sets.
    ///
    /// For playback the pipeline pulls from the client; for capture it
    /// pulls from the endpoint frames being delivered.
    pub fn new(
        direction: Direction,
        client: StreamParams,
        endpoint: StreamParams,
        callbacks: Arc<CallbackSlots>,
    ) -> Result<Self> {
        let (from, to) = match direction {
            Direction::Playback => (client, endpoint),
            Direction::Capture => (endpoint, client),
        };
        let pipeline = Pipeline::new(PipelineConfig {
            format_in: from.format,
            channels_in: from.channels,
            rate_in: from.sample_rate,
            channel_map_in: from.channel_map,
            format_out: to.format,
            channels_out: to.channels,
            rate_out: to.sample_rate,
            channel_map_out: to.channel_map,
        })?;
        if pipeline.is_passthrough() {
            tracing::debug!(%direction, "stream is passthrough");
        } else {
            tracing::debug!(
                %direction,
                src = pipeline.is_src_required(),
                remap = pipeline.is_channel_mapping_required(),
                "stream requires conversion"
            );
        }

        Ok(Engine {
            direction,
            client,
            endpoint,
            pipeline,
            callbacks,
            stage: [0; CAPTURE_CHUNK_BYTES],
        })
    }

    /// Pull `frames` endpoint-format frames into `dst` for playback.
    ///
    /// The application callback sees a pre-zeroed client-format buffer and
    /// reports how many frames it filled; everything past what the pipeline
    /// produced is zeroed so the endpoint always receives a full region.
    /// Returns the frames the application actually produced.
    pub fn read_endpoint(&mut self, frames: usize, dst: &mut [u8]) -> usize {
        debug_assert_eq!(self.direction, Direction::Playback);
        let bpf = self.endpoint.format.bytes_per_frame(self.endpoint.channels);
        debug_assert!(dst.len() >= frames * bpf);

        let client = self.client;
        let callbacks = Arc::clone(&self.callbacks);
        let mut upstream = move |want: usize, buf: &mut [u8]| -> usize {
            buf.fill(0);
            let mut slot = lock(&callbacks.data);
            match slot.as_mut() {
                Some(callback) => {
                    let mut view = FramesMut::new(buf, client.format, client.channels);
                    callback(&mut view).min(want)
                }
                None => 0,
            }
        };

        let produced = self.pipeline.read(frames, &mut dst[..frames * bpf], &mut upstream);
        if produced < frames {
            dst[produced * bpf..frames * bpf].fill(0);
            tracing::trace!(
                produced,
                requested = frames,
                "client underrun, zero-filling remainder"
            );
        }
        produced
    }

    /// Push `frames` captured endpoint-format frames from `src` to the
    /// application, in chunks of at most 4 KiB of client samples.
    pub fn deliver_endpoint(&mut self, frames: usize, src: &[u8]) {
        debug_assert_eq!(self.direction, Direction::Capture);
        let bpf_in = self.endpoint.format.bytes_per_frame(self.endpoint.channels);
        debug_assert!(src.len() >= frames * bpf_in);

        let client = self.client;
        let client_bpf = client.format.bytes_per_frame(client.channels);
        let chunk = (CAPTURE_CHUNK_BYTES / client_bpf).max(1);

        let mut consumed = 0usize;
        let mut upstream = |want: usize, buf: &mut [u8]| -> usize {
            let give = want.min(frames - consumed);
            buf[..give * bpf_in].copy_from_slice(&src[consumed * bpf_in..(consumed + give) * bpf_in]);
            consumed += give;
            give
        };

        loop {
            let got = self
                .pipeline
                .read(chunk, &mut self.stage[..chunk * client_bpf], &mut upstream);
            if got == 0 {
                break;
            }
            let view = Frames::new(&self.stage[..got * client_bpf], client.format, client.channels);
            let mut slot = lock(&self.callbacks.capture);
            if let Some(callback) = slot.as_mut() {
                callback(&view);
            }
            drop(slot);
            if got < chunk {
                break;
            }
        }
    }

    /// Fire the stopped callback, if installed.
    pub fn fire_stopped(&self) {
        let mut slot = lock(&self.callbacks.stopped);
        if let Some(callback) = slot.as_mut() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oido_core::{ChannelMap, SampleFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn params(format: SampleFormat, channels: u16, rate: u32) -> StreamParams {
        StreamParams {
            format,
            channels,
            sample_rate: rate,
            channel_map: ChannelMap::default_for(channels),
        }
    }

    fn playback_engine(
        client: StreamParams,
        endpoint: StreamParams,
        callback: DataCallback,
    ) -> Engine {
        let slots = Arc::new(CallbackSlots::new());
        slots.set_data(Some(callback));
        Engine::new(Direction::Playback, client, endpoint, slots).unwrap()
    }

    #[test]
    fn short_callback_zero_fills_remainder() {
        let side = params(SampleFormat::F32, 1, 44100);
        let mut engine = playback_engine(
            side,
            side,
            Box::new(|frames: &mut FramesMut<'_>| {
                let want = frames.frame_count();
                let written = want / 2;
                for i in 0..written {
                    frames.bytes_mut()[i * 4..i * 4 + 4].copy_from_slice(&1.0f32.to_le_bytes());
                }
                written
            }),
        );

        let mut dst = vec![0xAAu8; 100 * 4];
        assert_eq!(engine.read_endpoint(100, &mut dst), 50);
        for i in 0..50 {
            let v = f32::from_le_bytes(dst[i * 4..i * 4 + 4].try_into().unwrap());
            assert_eq!(v, 1.0);
        }
        for i in 50..100 {
            let v = f32::from_le_bytes(dst[i * 4..i * 4 + 4].try_into().unwrap());
            assert_eq!(v, 0.0, "frame {i} must be zero-filled");
        }
    }

    #[test]
    fn missing_data_callback_produces_silence() {
        let side = params(SampleFormat::S16, 2, 48000);
        let slots = Arc::new(CallbackSlots::new());
        let mut engine = Engine::new(Direction::Playback, side, side, slots).unwrap();

        let mut dst = vec![0xFFu8; 32 * 4];
        assert_eq!(engine.read_endpoint(32, &mut dst), 0);
        assert!(dst.iter().all(|b| *b == 0));
    }

    #[test]
    fn capture_is_chunked_and_complete() {
        let side = params(SampleFormat::S16, 2, 48000);
        let total = Arc::new(AtomicUsize::new(0));
        let largest = Arc::new(AtomicUsize::new(0));

        let slots = Arc::new(CallbackSlots::new());
        let (t, l) = (Arc::clone(&total), Arc::clone(&largest));
        slots.set_capture(Some(Box::new(move |frames: &Frames<'_>| {
            t.fetch_add(frames.frame_count(), Ordering::SeqCst);
            l.fetch_max(frames.bytes().len(), Ordering::SeqCst);
        })));
        let mut engine = Engine::new(Direction::Capture, side, side, slots).unwrap();

        let src = vec![0u8; 3000 * 4];
        engine.deliver_endpoint(3000, &src);
        assert_eq!(total.load(Ordering::SeqCst), 3000);
        assert!(largest.load(Ordering::SeqCst) <= 4096);
    }

    #[test]
    fn capture_converts_to_client_format() {
        let endpoint = params(SampleFormat::S16, 1, 48000);
        let client = params(SampleFormat::F32, 1, 48000);

        let seen = Arc::new(AtomicUsize::new(0));
        let slots = Arc::new(CallbackSlots::new());
        let s = Arc::clone(&seen);
        slots.set_capture(Some(Box::new(move |frames: &Frames<'_>| {
            assert_eq!(frames.format(), SampleFormat::F32);
            let mut out = vec![0.0f32; frames.frame_count()];
            frames.read_f32(&mut out);
            for v in out {
                assert!((v - 0.5).abs() < 1e-3);
            }
            s.fetch_add(frames.frame_count(), Ordering::SeqCst);
        })));
        let mut engine = Engine::new(Direction::Capture, client, endpoint, slots).unwrap();

        let sample = (0.5f32 * 32767.0) as i16;
        let src: Vec<u8> = std::iter::repeat_n(sample.to_le_bytes(), 64)
            .flatten()
            .collect();
        engine.deliver_endpoint(64, &src);
        assert_eq!(seen.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn stopped_callback_fires() {
        let side = params(SampleFormat::S16, 2, 48000);
        let slots = Arc::new(CallbackSlots::new());
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        slots.set_stopped(Some(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })));
        let engine = Engine::new(Direction::Playback, side, side, slots).unwrap();
        engine.fire_stopped();
        engine.fire_stopped();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
