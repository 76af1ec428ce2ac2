//! Variable-size chunk adapter for fixed-block processors
//!
//! Audio arrives from callers in chunks of any length, while the convolution
//! engine only accepts whole blocks. [`BlockAdapter`] buffers one block of
//! input, hands full blocks to a processor and plays back the previous
//! processor output, adding exactly one block of delay.

use crate::{AudioBuffer, BinauralError, BinauralResult, Sample};

/// Re-blocks arbitrary chunks into fixed blocks of `block_size` samples.
#[derive(Debug, Clone)]
pub struct BlockAdapter {
    block_size: usize,
    input_block: Vec<AudioBuffer>,
    output_block: Vec<AudioBuffer>,
    position: usize,
}

impl BlockAdapter {
    /// Create an adapter for a processor with `num_inputs` input and
    /// `num_outputs` output channels.
    pub fn new(block_size: usize, num_inputs: usize, num_outputs: usize) -> BinauralResult<Self> {
        if block_size == 0 {
            return Err(BinauralError::InvalidBlockSize);
        }

        Ok(Self {
            block_size,
            input_block: vec![vec![0.0; block_size]; num_inputs],
            output_block: vec![vec![0.0; block_size]; num_outputs],
            position: 0,
        })
    }

    /// Block size handed to the processor
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Input channel count
    pub fn num_inputs(&self) -> usize {
        self.input_block.len()
    }

    /// Output channel count
    pub fn num_outputs(&self) -> usize {
        self.output_block.len()
    }

    /// Total delay given the processor's own delay `processor_delay`.
    pub fn delay(&self, processor_delay: usize) -> usize {
        processor_delay + self.block_size
    }

    /// Push one chunk through the adapter.
    ///
    /// Every input channel must have the same length; the result has that
    /// length on each output channel. `process_block` is called once per
    /// completed block with a full input block and the output block to fill.
    pub fn process<I, F>(&mut self, input: &[I], mut process_block: F) -> BinauralResult<Vec<AudioBuffer>>
    where
        I: AsRef<[Sample]>,
        F: FnMut(&[AudioBuffer], &mut [AudioBuffer]) -> BinauralResult<()>,
    {
        if input.len() != self.num_inputs() {
            return Err(BinauralError::BufferSizeMismatch {
                expected: self.num_inputs(),
                actual: input.len(),
            });
        }

        let len = input.first().map_or(0, |ch| ch.as_ref().len());
        if let Some(ch) = input.iter().find(|ch| ch.as_ref().len() != len) {
            return Err(BinauralError::BufferSizeMismatch {
                expected: len,
                actual: ch.as_ref().len(),
            });
        }

        let mut output = vec![vec![0.0; len]; self.num_outputs()];
        let mut offset = 0;

        while offset < len {
            let n = (self.block_size - self.position).min(len - offset);
            let block_range = self.position..self.position + n;
            let chunk_range = offset..offset + n;

            for (block, chunk) in self.input_block.iter_mut().zip(input) {
                block[block_range.clone()].copy_from_slice(&chunk.as_ref()[chunk_range.clone()]);
            }
            for (chunk, block) in output.iter_mut().zip(&self.output_block) {
                chunk[chunk_range.clone()].copy_from_slice(&block[block_range.clone()]);
            }

            self.position += n;
            offset += n;

            if self.position == self.block_size {
                process_block(&self.input_block, &mut self.output_block)?;
                self.position = 0;
            }
        }

        Ok(output)
    }

    /// Feed `num_samples` of silence and return what comes out.
    ///
    /// Used to drain buffered output once the input has ended.
    pub fn flush<F>(&mut self, num_samples: usize, process_block: F) -> BinauralResult<Vec<AudioBuffer>>
    where
        F: FnMut(&[AudioBuffer], &mut [AudioBuffer]) -> BinauralResult<()>,
    {
        let silence = vec![vec![0.0; num_samples]; self.num_inputs()];
        self.process(&silence, process_block)
    }

    /// Drop buffered samples and start from silence.
    pub fn reset(&mut self) {
        for block in self.input_block.iter_mut().chain(self.output_block.iter_mut()) {
            block.fill(0.0);
        }
        self.position = 0;
    }
}
