//! Stereo impulse responses and routing-matrix construction

use crate::{matrix::RoutingTriple, AudioBuffer, BinauralError, BinauralResult, Sample};

/// Measured left/right impulse response for one source position.
///
/// Both channels always have the same length.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImpulseResponse {
    left: AudioBuffer,
    right: AudioBuffer,
}

impl ImpulseResponse {
    /// Pair up left and right channels. Fails if their lengths differ.
    pub fn new(left: AudioBuffer, right: AudioBuffer) -> BinauralResult<Self> {
        if left.len() != right.len() {
            return Err(BinauralError::UnequalChannels {
                left: left.len(),
                right: right.len(),
            });
        }
        Ok(Self { left, right })
    }

    /// Build a whole set from `(left, right)` pairs, reporting the offending
    /// position on a length mismatch.
    pub fn set_from_pairs(
        pairs: impl IntoIterator<Item = (AudioBuffer, AudioBuffer)>,
    ) -> BinauralResult<Vec<Self>> {
        pairs
            .into_iter()
            .enumerate()
            .map(|(position, (left, right))| {
                Self::new(left, right).map_err(|err| match err {
                    BinauralError::UnequalChannels { left, right } => {
                        BinauralError::ChannelLengthMismatch {
                            position,
                            left,
                            right,
                        }
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Left-ear channel
    pub fn left(&self) -> &[Sample] {
        &self.left
    }

    /// Right-ear channel
    pub fn right(&self) -> &[Sample] {
        &self.right
    }

    /// Both channels, left first.
    pub fn channels(&self) -> [&[Sample]; 2] {
        [&self.left, &self.right]
    }

    /// Consume into `(left, right)`.
    pub fn into_channels(self) -> (AudioBuffer, AudioBuffer) {
        (self.left, self.right)
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// True if both channels are empty
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Copy with every sample multiplied by `gain`.
    pub fn scaled(&self, gain: Sample) -> Self {
        Self {
            left: self.left.iter().map(|&x| x * gain).collect(),
            right: self.right.iter().map(|&x| x * gain).collect(),
        }
    }

    /// Copy with `samples` zeros prepended to both channels.
    pub fn delayed(&self, samples: usize) -> Self {
        let pad = |ch: &[Sample]| {
            let mut out = vec![0.0; samples + ch.len()];
            out[samples..].copy_from_slice(ch);
            out
        };
        Self {
            left: pad(&self.left),
            right: pad(&self.right),
        }
    }

    /// Zero-extend both channels to `len` samples. Never truncates.
    pub fn pad_to(&mut self, len: usize) {
        if len > self.left.len() {
            self.left.resize(len, 0.0);
            self.right.resize(len, 0.0);
        }
    }
}

/// Length of the longest response in a set, zero for an empty set.
pub fn max_len(set: &[ImpulseResponse]) -> usize {
    set.iter().map(ImpulseResponse::len).max().unwrap_or(0)
}

/// Routing for a set of stereo responses: input channel `i` feeds output 0
/// (left ear) through `set[i].left` and output 1 (right ear) through `set[i].right`.
pub fn routing_triples(set: &[ImpulseResponse]) -> Vec<RoutingTriple> {
    set.iter()
        .enumerate()
        .flat_map(|(input, ir)| {
            [
                RoutingTriple::new(input, 0, ir.left.clone()),
                RoutingTriple::new(input, 1, ir.right.clone()),
            ]
        })
        .collect()
}
