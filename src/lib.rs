#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![doc = include_str!("../README.md")]

pub mod adapter;
pub mod align;
pub mod binaural;
pub mod calibrate;
pub mod ir;
pub mod matrix;
pub mod partitioned;
pub mod resample;
pub mod spectrum;
pub mod utils;

pub use adapter::*;
pub use align::*;
pub use binaural::*;
pub use calibrate::*;
pub use ir::*;
pub use matrix::*;
pub use partitioned::*;
pub use resample::*;
pub use spectrum::*;
pub use utils::*;

use thiserror::Error;

/// Audio sample type (32-bit float).
pub type Sample = f32;

/// Buffer of audio samples.
pub type AudioBuffer = Vec<Sample>;

/// Which side of a routing triple an out-of-range index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Engine input channel.
    Input,
    /// Engine output channel.
    Output,
}

impl core::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ChannelKind::Input => write!(f, "input"),
            ChannelKind::Output => write!(f, "output"),
        }
    }
}

/// Errors raised while preparing impulse responses or running the convolution engine.
///
/// Everything except [`BinauralError::Fft`] and [`BinauralError::BufferSizeMismatch`]
/// is a configuration error and is reported before any audio is processed.
#[derive(Debug, Error)]
pub enum BinauralError {
    /// Block size must be at least one sample.
    #[error("block size must be greater than zero")]
    InvalidBlockSize,
    /// A routing triple refers to a channel the engine does not have.
    #[error("{kind} channel {index} out of range (engine has {count})")]
    ChannelOutOfRange {
        /// Input or output side.
        kind: ChannelKind,
        /// Offending index.
        index: usize,
        /// Number of channels on that side.
        count: usize,
    },
    /// No impulse responses were supplied.
    #[error("impulse response set is empty")]
    EmptyImpulseResponseSet,
    /// Left and right channels of a single response differ in length.
    #[error("left channel has {left} samples, right has {right}")]
    UnequalChannels {
        /// Left channel length.
        left: usize,
        /// Right channel length.
        right: usize,
    },
    /// Left and right channels of one position in a set differ in length.
    #[error("position {position}: left channel has {left} samples, right has {right}")]
    ChannelLengthMismatch {
        /// Position index within the set.
        position: usize,
        /// Left channel length.
        left: usize,
        /// Right channel length.
        right: usize,
    },
    /// Alignment needs an oversampling factor of at least one.
    #[error("oversampling factor must be greater than zero")]
    InvalidOversampleFactor,
    /// The polarity-corrected maximum of the whole set is zero, so no onset exists.
    #[error("impulse response set has no non-zero peak")]
    ZeroPeak,
    /// A channel has zero mean amplitude and cannot be gain-normalised.
    #[error("position {position} has a silent channel, cannot compute gain")]
    ZeroPower {
        /// Position index within the set.
        position: usize,
    },
    /// A renderer drives a different number of loudspeakers than there are responses for its path.
    #[error("{path} path: renderer has {channels} channels but {responses} impulse responses were supplied")]
    LayoutMismatch {
        /// Rendering path being prepared.
        path: RenderPath,
        /// Loudspeaker channels produced by the renderer.
        channels: usize,
        /// Impulse responses supplied for the path.
        responses: usize,
    },
    /// Sample rate must be positive.
    #[error("invalid sample rate")]
    InvalidSampleRate,
    /// Runtime buffer does not have the shape the engine was built for.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        /// Expected size.
        expected: usize,
        /// Size that was supplied.
        actual: usize,
    },
    /// Transform failure inside realfft.
    #[error("FFT processing error: {0}")]
    Fft(#[from] realfft::FftError),
}

/// Result type for preparation and convolution operations
pub type BinauralResult<T> = Result<T, BinauralError>;
