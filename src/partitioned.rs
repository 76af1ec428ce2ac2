//! Uniform partitioned convolution for a single routing path
//!
//! The filter is split into `block_size` partitions, each transformed once at
//! construction. Instead of keeping a delay line of past input spectra and
//! re-summing every partition against it on each call, every incoming spectrum
//! is multiplied into a ring of output accumulators: slot `k` ahead of the read
//! cursor collects the contribution that becomes due `k` blocks from now. Each
//! call therefore costs one multiply-accumulate per partition and the sum for
//! the current block is already complete when it is returned.

use crate::{
    spectrum::{multiply_accumulate, BlockFft, FrequencyBlock},
    BinauralResult, Sample,
};

/// One FIR filter applied in the frequency domain, one block per call.
///
/// # Example
///
/// ```rust
/// use binconv::{BlockFft, ConvolutionChannel, FrequencyBlock};
///
/// let fft = BlockFft::new(4).unwrap();
/// let mut channel = ConvolutionChannel::new(&[1.0, 0.5, 0.25, 0.125, 0.0625], &fft).unwrap();
/// assert_eq!(channel.num_partitions(), 2);
///
/// let input = FrequencyBlock::from_time_domain(&[1.0, 0.0, 0.0, 0.0], &fft).unwrap();
/// let output = channel.step(&input);
/// assert!(!output.is_zero());
/// ```
#[derive(Debug, Clone)]
pub struct ConvolutionChannel {
    /// Transformed filter partitions, earliest taps first
    partitions: Vec<FrequencyBlock>,
    /// Output accumulators; `slots[(cursor + k) % len]` is due in `k` blocks
    slots: Vec<FrequencyBlock>,
    cursor: usize,
}

impl ConvolutionChannel {
    /// Partition and transform `filter` for the block size planned by `fft`.
    ///
    /// An empty filter yields a single silent partition, so the channel always
    /// outputs silence.
    pub fn new(filter: &[Sample], fft: &BlockFft) -> BinauralResult<Self> {
        let block_size = fft.block_size();
        let num_partitions = filter.len().div_ceil(block_size).max(1);

        let mut scratch = fft.make_scratch();
        let mut partitions = Vec::with_capacity(num_partitions);
        for i in 0..num_partitions {
            let start = (i * block_size).min(filter.len());
            let end = (start + block_size).min(filter.len());

            let mut partition = FrequencyBlock::zero();
            partition.set_from_time_domain(&filter[start..end], fft, &mut scratch)?;
            partitions.push(partition);
        }

        let slots = vec![FrequencyBlock::zero(); num_partitions];

        Ok(Self {
            partitions,
            slots,
            cursor: 0,
        })
    }

    /// Number of filter partitions (and history slots).
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Feed one transformed input block and return this block's output spectrum.
    ///
    /// The returned block stays valid until the next call.
    pub fn step(&mut self, input: &FrequencyBlock) -> &FrequencyBlock {
        let len = self.slots.len();

        // the slot returned by the previous call becomes the furthest-ahead one
        self.slots[(self.cursor + len - 1) % len].clear();

        for (k, partition) in self.partitions.iter().enumerate() {
            let slot = &mut self.slots[(self.cursor + k) % len];
            multiply_accumulate(slot, partition, input);
        }

        let current = self.cursor;
        self.cursor = (self.cursor + 1) % len;
        &self.slots[current]
    }

    /// Forget all past input. Filter partitions are kept.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.cursor = 0;
    }
}
