//! Error types for the DSP layer.

use thiserror::Error;

/// Errors produced while validating a DSP stage configuration.
///
/// All variants are detected at construction time; the processing paths
/// themselves are infallible.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DspError {
    /// A sample rate of zero was requested.
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,

    /// Channel count outside `1..=MAX_CHANNELS`.
    #[error("channel count {0} out of range 1..=18")]
    InvalidChannelCount(u16),

    /// A channel map failed validation.
    #[error("invalid channel map: {0}")]
    InvalidChannelMap(&'static str),
}
