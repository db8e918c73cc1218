//! Channel-count remixing over interleaved f32 frames.

/// How channels are synthesized or discarded when counts differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    /// Copy what fits; drop excess input channels, zero-fill extra output
    /// channels.
    Basic,
    /// Down-mix to mono as the arithmetic mean of all input channels;
    /// up-mix from mono by broadcasting it to every output channel.
    /// Falls back to [`MixMode::Basic`] for any other width.
    #[default]
    Blend,
}

/// Reduce `channels_in` interleaved frames to `channels_out < channels_in`.
pub fn downmix(dst: &mut [f32], src: &[f32], frames: usize, channels_in: u16, channels_out: u16, mode: MixMode) {
    let (ci, co) = (channels_in as usize, channels_out as usize);
    debug_assert!(co < ci);
    debug_assert!(src.len() >= frames * ci);
    debug_assert!(dst.len() >= frames * co);

    if mode == MixMode::Blend && co == 1 {
        for f in 0..frames {
            let frame = &src[f * ci..f * ci + ci];
            dst[f] = frame.iter().sum::<f32>() / ci as f32;
        }
        return;
    }

    for f in 0..frames {
        dst[f * co..f * co + co].copy_from_slice(&src[f * ci..f * ci + co]);
    }
}

/// Expand `channels_in` interleaved frames to `channels_out > channels_in`.
pub fn upmix(dst: &mut [f32], src: &[f32], frames: usize, channels_in: u16, channels_out: u16, mode: MixMode) {
    let (ci, co) = (channels_in as usize, channels_out as usize);
    debug_assert!(co > ci);
    debug_assert!(src.len() >= frames * ci);
    debug_assert!(dst.len() >= frames * co);

    if mode == MixMode::Blend && ci == 1 {
        for f in 0..frames {
            dst[f * co..f * co + co].fill(src[f]);
        }
        return;
    }

    for f in 0..frames {
        let out = &mut dst[f * co..f * co + co];
        out[..ci].copy_from_slice(&src[f * ci..f * ci + ci]);
        out[ci..].fill(0.0);
    }
}

/// Remix between arbitrary channel counts. Equal counts are a copy.
pub fn remix(dst: &mut [f32], src: &[f32], frames: usize, channels_in: u16, channels_out: u16, mode: MixMode) {
    use core::cmp::Ordering;
    match channels_out.cmp(&channels_in) {
        Ordering::Less => downmix(dst, src, frames, channels_in, channels_out, mode),
        Ordering::Greater => upmix(dst, src, frames, channels_in, channels_out, mode),
        Ordering::Equal => {
            let n = frames * channels_in as usize;
            dst[..n].copy_from_slice(&src[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_downmix_to_mono_averages() {
        let src = [1.0, 3.0, -2.0, 2.0];
        let mut dst = [0.0; 2];
        downmix(&mut dst, &src, 2, 2, 1, MixMode::Blend);
        assert_eq!(dst, [2.0, 0.0]);
    }

    #[test]
    fn basic_downmix_drops_excess() {
        let src = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut dst = [0.0; 4];
        downmix(&mut dst, &src, 2, 3, 2, MixMode::Basic);
        assert_eq!(dst, [1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn blend_downmix_to_stereo_falls_back_to_basic() {
        let src = [1.0, 2.0, 3.0, 4.0];
        let mut dst = [0.0; 2];
        downmix(&mut dst, &src, 1, 4, 2, MixMode::Blend);
        assert_eq!(dst, [1.0, 2.0]);
    }

    #[test]
    fn blend_upmix_broadcasts_mono() {
        let src = [0.5, -0.5];
        let mut dst = [0.0; 6];
        upmix(&mut dst, &src, 2, 1, 3, MixMode::Blend);
        assert_eq!(dst, [0.5, 0.5, 0.5, -0.5, -0.5, -0.5]);
    }

    #[test]
    fn basic_upmix_zero_fills() {
        let src = [1.0, 2.0];
        let mut dst = [9.0; 4];
        upmix(&mut dst, &src, 1, 2, 4, MixMode::Basic);
        assert_eq!(dst, [1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn blend_upmix_from_stereo_falls_back_to_basic() {
        let src = [1.0, 2.0];
        let mut dst = [9.0; 4];
        upmix(&mut dst, &src, 1, 2, 4, MixMode::Blend);
        assert_eq!(dst, [1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn remix_equal_counts_copies() {
        let src = [1.0, 2.0, 3.0, 4.0];
        let mut dst = [0.0; 4];
        remix(&mut dst, &src, 2, 2, 2, MixMode::Blend);
        assert_eq!(dst, src);
    }
}
