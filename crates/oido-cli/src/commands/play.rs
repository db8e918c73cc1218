//! Test tone playback command.

use super::BackendArg;
use clap::Args;
use oido_io::{DeviceConfig, SampleFormat};
use std::time::Duration;

#[derive(Args)]
pub struct PlayArgs {
    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    frequency: f32,

    /// Seconds to play
    #[arg(long, default_value_t = 2.0)]
    seconds: f32,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    rate: u32,

    /// Channel count
    #[arg(long, default_value_t = 2)]
    channels: u16,

    /// Backend to use (default: best available)
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let context = super::context(args.backend)?;
    let config = DeviceConfig {
        format: SampleFormat::F32,
        channels: args.channels,
        sample_rate: args.rate,
        ..DeviceConfig::default()
    };

    let channels = args.channels as usize;
    let step = args.frequency / args.rate as f32;
    let mut phase = 0.0f32;

    let device = context.open_playback(
        None,
        &config,
        Box::new(move |frames| {
            let count = frames.frame_count();
            let mut samples = vec![0.0f32; count * channels];
            for frame in samples.chunks_exact_mut(channels) {
                let s = (phase * std::f32::consts::TAU).sin() * 0.2;
                phase = (phase + step).fract();
                frame.fill(s);
            }
            frames.write_f32(&samples)
        }),
    )?;

    println!(
        "Playing {} Hz for {}s on {} ({} ch @ {} Hz, endpoint {} @ {} Hz)",
        args.frequency,
        args.seconds,
        context.backend_kind(),
        args.channels,
        args.rate,
        device.negotiated_params().format,
        device.negotiated_params().sample_rate,
    );

    device.start()?;
    std::thread::sleep(Duration::from_secs_f32(args.seconds.max(0.0)));
    device.stop()?;
    Ok(())
}
