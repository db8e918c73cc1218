//! End-to-end tests of the device lifecycle on the null backend.
//!
//! The null backend honors requested parameters exactly and paces itself
//! off the monotonic clock, which makes the full start/stop/teardown
//! machinery testable without hardware.

use oido_io::{
    BackendKind, Context, DeviceConfig, DeviceState, Direction, Error, SampleFormat,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn null_context() -> Context {
    Context::with_backends(&[BackendKind::Null]).unwrap()
}

fn silent_playback(context: &Context, config: &DeviceConfig) -> oido_io::Device {
    context
        .open_playback(
            None,
            config,
            Box::new(|frames| frames.frame_count()),
        )
        .unwrap()
}

#[test]
fn init_applies_defaults_and_tears_down() {
    let context = null_context();
    assert_eq!(context.backend_kind(), BackendKind::Null);

    let config = DeviceConfig {
        format: SampleFormat::S16,
        channels: 2,
        sample_rate: 48000,
        ..DeviceConfig::default()
    };
    let device = silent_playback(&context, &config);

    assert_eq!(device.state(), DeviceState::Stopped);
    assert_eq!(device.buffer_size_in_frames(), 1200);
    assert_eq!(device.periods(), 2);
    assert_eq!(device.format(), SampleFormat::S16);
    assert_eq!(device.negotiated_params().format, SampleFormat::S16);
    drop(device);
}

#[test]
fn start_prerolls_a_full_buffer() {
    let context = null_context();
    let config = DeviceConfig {
        format: SampleFormat::F32,
        channels: 1,
        sample_rate: 44100,
        buffer_size_in_frames: 4410,
        periods: 2,
        ..DeviceConfig::default()
    };

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let device = context
        .open_playback(
            None,
            &config,
            Box::new(move |frames| {
                let count = frames.frame_count();
                let ramp: Vec<f32> = (0..count).map(|i| i as f32 / 4410.0).collect();
                frames.write_f32(&ramp);
                counter.fetch_add(count, Ordering::SeqCst);
                count
            }),
        )
        .unwrap();

    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    device.start().unwrap();

    // The entire endpoint buffer is pulled before start() returns.
    assert!(delivered.load(Ordering::SeqCst) >= 4410);
    assert_eq!(device.state(), DeviceState::Started);

    device.stop().unwrap();
    assert_eq!(device.state(), DeviceState::Stopped);
}

#[test]
fn illegal_transitions_are_rejected_without_state_change() {
    let context = null_context();
    let device = silent_playback(&context, &DeviceConfig::default());

    assert!(matches!(device.stop(), Err(Error::AlreadyStopped)));
    assert_eq!(device.state(), DeviceState::Stopped);

    device.start().unwrap();
    assert!(matches!(device.start(), Err(Error::AlreadyStarted)));
    assert_eq!(device.state(), DeviceState::Started);

    device.stop().unwrap();
    assert!(matches!(device.stop(), Err(Error::AlreadyStopped)));
    assert_eq!(device.state(), DeviceState::Stopped);
}

#[test]
fn device_restarts_after_stop() {
    let context = null_context();
    let stops = Arc::new(AtomicUsize::new(0));

    let device = silent_playback(&context, &DeviceConfig::default());
    let counter = Arc::clone(&stops);
    device.set_stopped_callback(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    for _ in 0..2 {
        device.start().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        device.stop().unwrap();
    }
    assert_eq!(stops.load(Ordering::SeqCst), 2);
}

#[test]
fn stop_latency_is_bounded_by_one_period() {
    let context = null_context();
    // One-second buffer in four periods: a stop must not wait for the
    // buffer to drain, only for the current period wait to be interrupted.
    let config = DeviceConfig {
        sample_rate: 48000,
        buffer_size_in_frames: 48000,
        periods: 4,
        ..DeviceConfig::default()
    };
    let device = silent_playback(&context, &config);

    let stopped_at = Arc::new(std::sync::Mutex::new(None::<Instant>));
    let slot = Arc::clone(&stopped_at);
    device.set_stopped_callback(Box::new(move || {
        *slot.lock().unwrap() = Some(Instant::now());
    }));

    device.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let requested = Instant::now();
    device.stop().unwrap();
    let fired = stopped_at.lock().unwrap().expect("stopped callback must fire");

    // Period is 250 ms; allow generous scheduling slack on top.
    assert!(
        fired.duration_since(requested) < Duration::from_millis(750),
        "stop took {:?}",
        fired.duration_since(requested)
    );
}

#[test]
fn capture_delivers_silent_chunks() {
    let context = null_context();
    let config = DeviceConfig {
        format: SampleFormat::S16,
        channels: 2,
        sample_rate: 48000,
        ..DeviceConfig::default()
    };

    let frames_seen = Arc::new(AtomicUsize::new(0));
    let largest_chunk = Arc::new(AtomicUsize::new(0));
    let (f, l) = (Arc::clone(&frames_seen), Arc::clone(&largest_chunk));

    let device = context
        .open_capture(
            None,
            &config,
            Box::new(move |frames| {
                assert_eq!(frames.format(), SampleFormat::S16);
                assert_eq!(frames.channels(), 2);
                assert!(frames.bytes().iter().all(|b| *b == 0), "capture must be silent");
                f.fetch_add(frames.frame_count(), Ordering::SeqCst);
                l.fetch_max(frames.bytes().len(), Ordering::SeqCst);
            }),
        )
        .unwrap();

    device.start().unwrap();
    std::thread::sleep(Duration::from_millis(120));
    device.stop().unwrap();

    // ~120 ms at 48 kHz is ~5760 frames; require a sane fraction arrived.
    assert!(frames_seen.load(Ordering::SeqCst) > 1000);
    assert!(largest_chunk.load(Ordering::SeqCst) <= 4096);
}

#[test]
fn dropping_a_started_device_stops_it() {
    let context = null_context();
    let stops = Arc::new(AtomicUsize::new(0));

    let device = silent_playback(&context, &DeviceConfig::default());
    let counter = Arc::clone(&stops);
    device.set_stopped_callback(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    device.start().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    drop(device);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[test]
fn callbacks_run_on_the_worker_thread() {
    let context = null_context();
    let worker_named = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&worker_named);

    let device = context
        .open_playback(
            None,
            &DeviceConfig::default(),
            Box::new(move |frames| {
                if std::thread::current().name() == Some("oido-playback") {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                frames.frame_count()
            }),
        )
        .unwrap();

    device.start().unwrap();
    device.stop().unwrap();
    assert!(worker_named.load(Ordering::SeqCst) > 0);
}

#[test]
fn data_callback_is_replaceable_between_runs() {
    let context = null_context();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    let device = context
        .open_playback(
            None,
            &DeviceConfig::default(),
            Box::new(move |frames| {
                counter.fetch_add(frames.frame_count(), Ordering::SeqCst);
                frames.frame_count()
            }),
        )
        .unwrap();

    device.start().unwrap();
    device.stop().unwrap();
    let after_first_run = first.load(Ordering::SeqCst);
    assert!(after_first_run > 0);

    let counter = Arc::clone(&second);
    device.set_data_callback(Box::new(move |frames| {
        counter.fetch_add(frames.frame_count(), Ordering::SeqCst);
        frames.frame_count()
    }));

    device.start().unwrap();
    device.stop().unwrap();
    assert_eq!(first.load(Ordering::SeqCst), after_first_run);
    assert!(second.load(Ordering::SeqCst) > 0);
}

#[test]
fn enumeration_lists_the_null_device() {
    let context = null_context();
    let playback = context.devices(Direction::Playback).unwrap();
    assert_eq!(playback.len(), 1);
    assert_eq!(playback[0].id, oido_io::DeviceId::Null);
    assert_eq!(playback[0].direction, Direction::Playback);

    let capture = context.devices(Direction::Capture).unwrap();
    assert_eq!(capture.len(), 1);
    assert_eq!(capture[0].direction, Direction::Capture);
}

#[test]
fn invalid_configs_are_rejected() {
    let context = null_context();

    let config = DeviceConfig {
        channels: 0,
        ..DeviceConfig::default()
    };
    assert!(matches!(
        context.open_playback(None, &config, Box::new(|f| f.frame_count())),
        Err(Error::InvalidConfig(_))
    ));

    let config = DeviceConfig {
        sample_rate: 0,
        ..DeviceConfig::default()
    };
    assert!(matches!(
        context.open_playback(None, &config, Box::new(|f| f.frame_count())),
        Err(Error::InvalidConfig(_))
    ));

    let config = DeviceConfig {
        channels: 19,
        ..DeviceConfig::default()
    };
    assert!(matches!(
        context.open_playback(None, &config, Box::new(|f| f.frame_count())),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn client_format_is_converted_for_the_endpoint() {
    // The null backend accepts anything, so force a conversion by asking
    // the pipeline to bridge differing client/endpoint descriptions is not
    // possible there; instead verify the client surface reports what was
    // requested and playback runs with a s24 stream end to end.
    let context = null_context();
    let config = DeviceConfig {
        format: SampleFormat::S24,
        channels: 2,
        sample_rate: 44100,
        ..DeviceConfig::default()
    };
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pulled);
    let device = context
        .open_playback(
            None,
            &config,
            Box::new(move |frames| {
                assert_eq!(frames.format(), SampleFormat::S24);
                counter.fetch_add(frames.frame_count(), Ordering::SeqCst);
                frames.frame_count()
            }),
        )
        .unwrap();

    device.start().unwrap();
    std::thread::sleep(Duration::from_millis(40));
    device.stop().unwrap();
    assert!(pulled.load(Ordering::SeqCst) >= device.buffer_size_in_frames() as usize);
}
