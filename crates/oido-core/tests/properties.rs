//! Property-based tests for the oido-core conversion and resampling paths.
//!
//! Quantified invariants: format round-trip error bounds, remap inverse
//! identity, resampler constancy, and pipeline passthrough byte-identity,
//! all over randomized inputs.

use oido_core::channel::{self, ChannelMap, Position};
use oido_core::convert::{decode_f32, encode_f32};
use oido_core::format::SampleFormat;
use oido_core::pipeline::{Pipeline, PipelineConfig};
use oido_core::src::{Resampler, SrcAlgorithm, SrcConfig};
use proptest::prelude::*;

/// Positive full scale of an integer format.
fn full_scale(format: SampleFormat) -> f32 {
    match format {
        SampleFormat::U8 => 127.0,
        SampleFormat::S16 => 32767.0,
        SampleFormat::S24 => 8388607.0,
        SampleFormat::S32 => 2147483647.0,
        SampleFormat::F32 => unreachable!("f32 has no integer full scale"),
    }
}

fn int_formats() -> impl Strategy<Value = SampleFormat> {
    prop::sample::select(vec![
        SampleFormat::U8,
        SampleFormat::S16,
        SampleFormat::S24,
        SampleFormat::S32,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// f32 -> F -> f32 stays within twice the quantization step of F
    /// (or a few f32 ULPs for formats finer than f32 itself).
    #[test]
    fn roundtrip_error_bounded(x in -1.0f32..=1.0f32, format in int_formats()) {
        let mut encoded = [0u8; 4];
        encode_f32(&mut encoded, &[x], format, 1);
        let mut decoded = [0.0f32; 1];
        decode_f32(&mut decoded, &encoded, format, 1);

        let tolerance = (2.0 / full_scale(format)).max(4.0 * f32::EPSILON);
        prop_assert!(
            (decoded[0] - x).abs() <= tolerance,
            "format {}: {} -> {} (tolerance {})",
            format, x, decoded[0], tolerance
        );
    }

    /// Applying a permutation and then its inverse restores every frame.
    #[test]
    fn remap_inverse_is_identity(
        perm in Just(vec![0usize, 1, 2, 3, 4, 5]).prop_shuffle(),
        samples in prop::array::uniform6(-1.0f32..=1.0f32),
    ) {
        use Position::*;
        let base = [FrontLeft, FrontRight, FrontCenter, Lfe, BackLeft, BackRight];
        let permuted: Vec<Position> = perm.iter().map(|&i| base[i]).collect();

        let map_a = ChannelMap::from_positions(&base).unwrap();
        let map_b = ChannelMap::from_positions(&permuted).unwrap();

        let forward = channel::shuffle_table(&channel::post_mix_map(&map_a, &map_b), &map_b);
        let backward = channel::shuffle_table(&channel::post_mix_map(&map_b, &map_a), &map_a);

        let mut frame = samples;
        channel::apply_shuffle(&mut frame, 6, &forward);
        channel::apply_shuffle(&mut frame, 6, &backward);
        prop_assert_eq!(frame, samples);
    }

    /// A constant-valued stream resampled to any rate stays constant.
    #[test]
    fn resampler_preserves_constants(
        rate_in in 1u32..96000,
        rate_out in 1u32..96000,
        value in -1.0f32..=1.0f32,
    ) {
        let mut src = Resampler::new(SrcConfig {
            rate_in,
            rate_out,
            format_in: SampleFormat::F32,
            format_out: SampleFormat::F32,
            channels: 1,
            cache_size_in_frames: 0,
            algorithm: SrcAlgorithm::Linear,
        }).unwrap();

        let mut upstream = |frames: usize, dst: &mut [u8]| {
            for i in 0..frames {
                dst[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
            }
            frames
        };
        let mut out = [0.0f32; 256];
        let n = src.read_f32(256, &mut out, &mut upstream);
        prop_assert_eq!(n, 256);
        for s in &out {
            prop_assert!((s - value).abs() <= f32::EPSILON, "{} != {}", s, value);
        }
    }

    /// A pipeline with matching sides reports passthrough and is
    /// byte-identical to the upstream.
    #[test]
    fn passthrough_is_byte_identical(
        format in prop::sample::select(SampleFormat::ALL.to_vec()),
        channels in 1u16..=8,
        frames in 1usize..400,
        seed in any::<u64>(),
    ) {
        let map = ChannelMap::default_for(channels);
        let mut pipeline = Pipeline::new(PipelineConfig {
            format_in: format,
            channels_in: channels,
            rate_in: 48000,
            channel_map_in: map,
            format_out: format,
            channels_out: channels,
            rate_out: 48000,
            channel_map_out: map,
        }).unwrap();
        prop_assert!(pipeline.is_passthrough());

        let bpf = format.bytes_per_frame(channels);
        let bytes: Vec<u8> = (0..frames * bpf)
            .map(|i| (seed.wrapping_mul(i as u64 + 1) >> 17) as u8)
            .collect();

        let mut cursor = 0usize;
        let source = bytes.clone();
        let mut upstream = move |want: usize, dst: &mut [u8]| {
            let give = want.min(frames - cursor);
            dst[..give * bpf].copy_from_slice(&source[cursor * bpf..(cursor + give) * bpf]);
            cursor += give;
            give
        };

        let mut out = vec![0u8; frames * bpf];
        prop_assert_eq!(pipeline.read(frames, &mut out, &mut upstream), frames);
        prop_assert_eq!(out, bytes);
    }
}
