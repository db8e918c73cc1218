//! Capture level meter command.

use super::BackendArg;
use clap::Args;
use oido_io::{DeviceConfig, SampleFormat};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Args)]
pub struct CaptureArgs {
    /// Sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    rate: u32,

    /// Channel count
    #[arg(long, default_value_t = 1)]
    channels: u16,

    /// Backend to use (default: best available)
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
}

pub fn run(args: CaptureArgs) -> anyhow::Result<()> {
    let context = super::context(args.backend)?;
    let config = DeviceConfig {
        format: SampleFormat::F32,
        channels: args.channels,
        sample_rate: args.rate,
        ..DeviceConfig::default()
    };

    // (sum of squared samples, sample count) since the last meter print.
    let energy = Arc::new(Mutex::new((0.0f64, 0usize)));
    let slot = Arc::clone(&energy);
    let channels = args.channels as usize;

    let device = context.open_capture(
        None,
        &config,
        Box::new(move |frames| {
            let mut samples = vec![0.0f32; frames.frame_count() * channels];
            let got = frames.read_f32(&mut samples);
            let mut acc = slot.lock().unwrap();
            for s in &samples[..got * channels] {
                acc.0 += f64::from(s * s);
            }
            acc.1 += got * channels;
        }),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    device.start()?;
    println!(
        "Capturing on {} ({} ch @ {} Hz); press Ctrl-C to stop.",
        context.backend_kind(),
        args.channels,
        args.rate
    );

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(500));
        let (sum, count) = {
            let mut acc = energy.lock().unwrap();
            let snapshot = *acc;
            *acc = (0.0, 0);
            snapshot
        };
        if count > 0 {
            let rms = (sum / count as f64).sqrt();
            let db = 20.0 * rms.max(1e-9).log10();
            println!("level: {db:7.1} dBFS");
        }
    }

    device.stop()?;
    Ok(())
}
