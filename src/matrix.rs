//! Matrix convolution engine
//!
//! Applies an arbitrary sparse matrix of FIR filters between `n_in` input and
//! `n_out` output channels. Each input channel is forward-transformed once per
//! block and each output channel inverse-transformed once per block, however
//! many routing triples read or write it.

use crate::{
    partitioned::ConvolutionChannel,
    spectrum::{BlockFft, FrequencyBlock, TransformScratch},
    AudioBuffer, BinauralError, BinauralResult, ChannelKind, Sample,
};
use log::debug;

/// One signal path: `input` channel filtered by `filter` into `output` channel.
///
/// Several triples may share the same `(input, output)` pair; their
/// contributions add.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoutingTriple {
    /// Engine input channel index
    pub input: usize,
    /// Engine output channel index
    pub output: usize,
    /// Time-domain FIR filter
    pub filter: AudioBuffer,
}

impl RoutingTriple {
    /// Create a routing triple
    pub fn new(input: usize, output: usize, filter: impl Into<AudioBuffer>) -> Self {
        Self {
            input,
            output,
            filter: filter.into(),
        }
    }
}

impl From<(usize, usize, AudioBuffer)> for RoutingTriple {
    fn from((input, output, filter): (usize, usize, AudioBuffer)) -> Self {
        Self::new(input, output, filter)
    }
}

#[derive(Debug, Clone)]
struct Route {
    input: usize,
    output: usize,
    channel: ConvolutionChannel,
}

/// Block-based frequency-domain convolution of a routing matrix.
///
/// Every call to [`process`](Self::process) consumes exactly `block_size`
/// samples per input channel and produces `block_size` samples per output
/// channel. The output lags the input by exactly one block, reported by
/// [`inherent_delay`](Self::inherent_delay).
///
/// # Example
///
/// ```rust
/// use binconv::{MatrixConvolver, RoutingTriple};
///
/// let triples = vec![RoutingTriple::new(0, 0, vec![1.0, 0.0, 0.0, 0.0])];
/// let mut engine = MatrixConvolver::new(4, 1, 1, triples).unwrap();
///
/// let first = engine.process(&[vec![1.0, 2.0, 3.0, 4.0]]).unwrap();
/// let second = engine.process(&[vec![5.0, 6.0, 7.0, 8.0]]).unwrap();
/// assert!(first[0].iter().all(|&x| x.abs() < 1e-6));
/// assert!((second[0][3] - 4.0).abs() < 1e-5);
/// assert_eq!(engine.inherent_delay(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct MatrixConvolver {
    fft: BlockFft,
    num_inputs: usize,
    num_outputs: usize,
    routes: Vec<Route>,
    /// Per input: `[current block | previous block]`
    input_windows: Vec<AudioBuffer>,
    input_spectra: Vec<FrequencyBlock>,
    /// Per output: sums for the block being accumulated this call
    accumulators: Vec<FrequencyBlock>,
    /// Per output: sums from the previous call, emitted this call
    pending: Vec<FrequencyBlock>,
    scratch: TransformScratch,
}

impl MatrixConvolver {
    /// Build an engine for `num_inputs` × `num_outputs` channels.
    ///
    /// Fails if the block size is zero or any triple names a channel outside
    /// `[0, num_inputs)` / `[0, num_outputs)`.
    pub fn new(
        block_size: usize,
        num_inputs: usize,
        num_outputs: usize,
        triples: impl IntoIterator<Item = RoutingTriple>,
    ) -> BinauralResult<Self> {
        let fft = BlockFft::new(block_size)?;

        let mut routes = Vec::new();
        for triple in triples {
            if triple.input >= num_inputs {
                return Err(BinauralError::ChannelOutOfRange {
                    kind: ChannelKind::Input,
                    index: triple.input,
                    count: num_inputs,
                });
            }
            if triple.output >= num_outputs {
                return Err(BinauralError::ChannelOutOfRange {
                    kind: ChannelKind::Output,
                    index: triple.output,
                    count: num_outputs,
                });
            }

            routes.push(Route {
                input: triple.input,
                output: triple.output,
                channel: ConvolutionChannel::new(&triple.filter, &fft)?,
            });
        }

        debug!(
            "matrix convolver: block size {}, {} in, {} out, {} triples, {} partitions",
            block_size,
            num_inputs,
            num_outputs,
            routes.len(),
            routes
                .iter()
                .map(|r| r.channel.num_partitions())
                .sum::<usize>()
        );

        Ok(Self {
            input_windows: vec![vec![0.0; fft.fft_size()]; num_inputs],
            input_spectra: vec![FrequencyBlock::zero(); num_inputs],
            accumulators: vec![FrequencyBlock::zero(); num_outputs],
            pending: vec![FrequencyBlock::zero(); num_outputs],
            scratch: fft.make_scratch(),
            fft,
            num_inputs,
            num_outputs,
            routes,
        })
    }

    /// Independent per-channel filtering: channel `i` is filtered by `filters[i]`.
    pub fn diagonal(block_size: usize, filters: Vec<AudioBuffer>) -> BinauralResult<Self> {
        let num_channels = filters.len();
        let triples = filters
            .into_iter()
            .enumerate()
            .map(|(i, filter)| RoutingTriple::new(i, i, filter));
        Self::new(block_size, num_channels, num_channels, triples)
    }

    /// Samples per channel consumed and produced by each call.
    pub fn block_size(&self) -> usize {
        self.fft.block_size()
    }

    /// Number of input channels
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Number of output channels
    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Number of routing triples
    pub fn num_triples(&self) -> usize {
        self.routes.len()
    }

    /// Delay in samples between an input sample and its filtered output.
    ///
    /// Always exactly one block.
    pub fn inherent_delay(&self) -> usize {
        self.block_size()
    }

    /// Process one block, allocating the output buffers.
    pub fn process<I: AsRef<[Sample]>>(&mut self, input: &[I]) -> BinauralResult<Vec<AudioBuffer>> {
        let mut output = vec![vec![0.0; self.block_size()]; self.num_outputs];
        self.process_into(input, &mut output)?;
        Ok(output)
    }

    /// Process one block into caller-owned output buffers.
    ///
    /// `input` must hold `num_inputs` slices and `output` `num_outputs`
    /// buffers, each exactly `block_size` long. Any error is fatal to the
    /// stream; the engine state is not rolled back.
    pub fn process_into<I: AsRef<[Sample]>>(
        &mut self,
        input: &[I],
        output: &mut [AudioBuffer],
    ) -> BinauralResult<()> {
        let block_size = self.block_size();
        self.check_shape(input, output)?;

        for ((window, spectrum), block) in self
            .input_windows
            .iter_mut()
            .zip(self.input_spectra.iter_mut())
            .zip(input)
        {
            // the previous block moves to the back half, the circular wrap of
            // the transform then lines it up behind the current block
            window.copy_within(0..block_size, block_size);
            window[..block_size].copy_from_slice(block.as_ref());
            spectrum.set_from_time_domain(window, &self.fft, &mut self.scratch)?;
        }

        // last call's sums are emitted now, fresh sums are collected for the next call
        core::mem::swap(&mut self.accumulators, &mut self.pending);
        for acc in self.accumulators.iter_mut() {
            acc.clear();
        }

        for route in self.routes.iter_mut() {
            let contribution = route.channel.step(&self.input_spectra[route.input]);
            self.accumulators[route.output] += contribution;
        }

        for (spectrum, out) in self.pending.iter().zip(output.iter_mut()) {
            out.fill(0.0);
            spectrum.to_time_domain(&self.fft, &mut self.scratch, out)?;
        }

        Ok(())
    }

    /// Clear all signal history, keeping the transformed filters.
    pub fn reset(&mut self) {
        for window in self.input_windows.iter_mut() {
            window.fill(0.0);
        }
        for block in self
            .input_spectra
            .iter_mut()
            .chain(self.accumulators.iter_mut())
            .chain(self.pending.iter_mut())
        {
            block.clear();
        }
        for route in self.routes.iter_mut() {
            route.channel.reset();
        }
    }

    fn check_shape<I: AsRef<[Sample]>>(
        &self,
        input: &[I],
        output: &[AudioBuffer],
    ) -> BinauralResult<()> {
        let block_size = self.block_size();
        if input.len() != self.num_inputs {
            return Err(BinauralError::BufferSizeMismatch {
                expected: self.num_inputs,
                actual: input.len(),
            });
        }
        if output.len() != self.num_outputs {
            return Err(BinauralError::BufferSizeMismatch {
                expected: self.num_outputs,
                actual: output.len(),
            });
        }
        if let Some(bad) = input
            .iter()
            .map(|ch| ch.as_ref().len())
            .chain(output.iter().map(Vec::len))
            .find(|&len| len != block_size)
        {
            return Err(BinauralError::BufferSizeMismatch {
                expected: block_size,
                actual: bad,
            });
        }
        Ok(())
    }
}
