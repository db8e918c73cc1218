//! Oido Core - the DSP layer of the oido audio device library.
//!
//! This crate holds everything that sits between an application callback and
//! an audio endpoint, independent of any platform audio API:
//!
//! - [`SampleFormat`] and the exact per-pair PCM [`convert`]ers
//! - [`ChannelMap`] / [`Position`] layouts, down/up-mixing and
//!   shuffle-table remapping
//! - [`Resampler`] - a pull-based linear sample-rate converter with a
//!   bounded frame cache
//! - [`Pipeline`] - the composition of all of the above into a single
//!   pull-based reader that bridges a client stream description and an
//!   endpoint stream description
//!
//! # Design Principles
//!
//! - **Pull-based**: the endpoint side asks for N frames; every stage pulls
//!   from the stage above it. There is no queue between stages.
//! - **No allocation**: all scratch space lives in fixed-capacity arrays
//!   bounded by [`MAX_CHANNELS`]; the crate never touches the heap.
//! - **Exact conversions**: integer-to-integer format conversions are pure
//!   shifts and biases, reproducible bit-for-bit.
//!
//! # no_std Support
//!
//! Like the rest of the DSP layer this crate is `no_std` compatible.
//! Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! oido-core = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod channel;
pub mod convert;
pub mod error;
pub mod format;
pub mod mix;
pub mod pipeline;
pub mod src;

pub use channel::{ChannelMap, Position, apply_shuffle, post_mix_map, shuffle_table};
pub use convert::{convert, decode_f32, encode_f32};
pub use error::DspError;
pub use format::SampleFormat;
pub use mix::{MixMode, remix};
pub use pipeline::{Pipeline, PipelineConfig};
pub use src::{Resampler, SrcAlgorithm, SrcConfig};

/// Hard upper bound on the channel count of any stream.
///
/// Every fixed scratch buffer in this crate is sized against this constant;
/// widening it requires widening all of them.
pub const MAX_CHANNELS: usize = 18;

/// Largest on-the-wire size of a single sample, in bytes.
pub const MAX_SAMPLE_SIZE: usize = 8;
