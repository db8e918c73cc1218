//! Benchmarks for the PCM converters and the pipeline fast paths.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use oido_core::channel::ChannelMap;
use oido_core::convert::{convert, decode_f32, encode_f32};
use oido_core::format::SampleFormat;
use oido_core::pipeline::{Pipeline, PipelineConfig};

const SAMPLES: usize = 4096;

fn bench_convert(c: &mut Criterion) {
    let f32_bytes: Vec<u8> = (0..SAMPLES)
        .flat_map(|i| ((i as f32 / SAMPLES as f32) * 2.0 - 1.0).to_le_bytes())
        .collect();
    let s16_bytes: Vec<u8> = (0..SAMPLES).flat_map(|i| (i as i16).to_le_bytes()).collect();

    let mut out = vec![0u8; SAMPLES * 4];

    c.bench_function("convert_f32_to_s16", |b| {
        b.iter(|| {
            convert(
                black_box(&mut out),
                black_box(&f32_bytes),
                SAMPLES,
                SampleFormat::F32,
                SampleFormat::S16,
            );
        });
    });

    c.bench_function("convert_s16_to_s24", |b| {
        b.iter(|| {
            convert(
                black_box(&mut out),
                black_box(&s16_bytes),
                SAMPLES,
                SampleFormat::S16,
                SampleFormat::S24,
            );
        });
    });

    let mut floats = vec![0.0f32; SAMPLES];
    c.bench_function("decode_s16_to_f32", |b| {
        b.iter(|| {
            decode_f32(
                black_box(&mut floats),
                black_box(&s16_bytes),
                SampleFormat::S16,
                SAMPLES,
            );
        });
    });

    c.bench_function("encode_f32_to_s24", |b| {
        b.iter(|| {
            encode_f32(
                black_box(&mut out),
                black_box(&floats),
                SampleFormat::S24,
                SAMPLES,
            );
        });
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let frames = SAMPLES / 2;
    let mut pipeline = Pipeline::new(PipelineConfig {
        format_in: SampleFormat::F32,
        channels_in: 2,
        rate_in: 48000,
        channel_map_in: ChannelMap::default_for(2),
        format_out: SampleFormat::S16,
        channels_out: 2,
        rate_out: 48000,
        channel_map_out: ChannelMap::default_for(2),
    })
    .unwrap();

    let mut out = vec![0u8; frames * 4];
    c.bench_function("pipeline_f32_stereo_to_s16", |b| {
        b.iter(|| {
            let mut upstream = |want: usize, dst: &mut [u8]| {
                dst[..want * 8].fill(0);
                want
            };
            pipeline.read(black_box(frames), black_box(&mut out), &mut upstream);
        });
    });
}

criterion_group!(benches, bench_convert, bench_pipeline);
criterion_main!(benches);
