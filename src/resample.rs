//! Band-limited resampling in the frequency domain
//!
//! A signal is treated as one period of a periodic band-limited waveform:
//! its spectrum is truncated or zero-extended to the new length and
//! transformed back. Used to oversample impulse responses for sub-sample onset
//! detection and to convert measured sets to the rendering sample rate.

use crate::{ir::ImpulseResponse, AudioBuffer, BinauralError, BinauralResult, Sample};
use log::debug;
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;

/// FFT resampler that caches plans across calls.
pub struct Resampler {
    planner: RealFftPlanner<Sample>,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Resampler").finish()
    }
}

impl Resampler {
    /// Create a resampler with an empty plan cache
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
        }
    }

    /// Resample `signal` to exactly `new_len` samples.
    ///
    /// Empty input or a zero target length yields `new_len` zeros.
    pub fn resample(&mut self, signal: &[Sample], new_len: usize) -> BinauralResult<AudioBuffer> {
        let old_len = signal.len();
        if old_len == 0 || new_len == 0 {
            return Ok(vec![0.0; new_len]);
        }
        if old_len == new_len {
            return Ok(signal.to_vec());
        }

        let r2c = self.planner.plan_fft_forward(old_len);
        let mut input = signal.to_vec();
        let mut spectrum = r2c.make_output_vec();
        r2c.process(&mut input, &mut spectrum)?;

        let c2r = self.planner.plan_fft_inverse(new_len);
        let mut resized = c2r.make_input_vec();

        let shared = old_len.min(new_len);
        let nyquist = shared / 2;
        resized[..=nyquist].copy_from_slice(&spectrum[..=nyquist]);

        // an even-length Nyquist bin stands for both the +N/2 and -N/2 components
        if shared % 2 == 0 {
            if new_len < old_len {
                resized[nyquist] = Complex::new(2.0 * resized[nyquist].re, 0.0);
            } else {
                resized[nyquist] *= 0.5;
            }
        }

        resized[0].im = 0.0;
        if new_len % 2 == 0 {
            resized[new_len / 2].im = 0.0;
        }

        let mut output = c2r.make_output_vec();
        c2r.process(&mut resized, &mut output)?;

        let scale = 1.0 / old_len as Sample;
        for sample in output.iter_mut() {
            *sample *= scale;
        }
        Ok(output)
    }

    /// Resample both channels of an impulse response to `new_len` samples.
    pub fn resample_ir(
        &mut self,
        ir: &ImpulseResponse,
        new_len: usize,
    ) -> BinauralResult<ImpulseResponse> {
        let left = self.resample(ir.left(), new_len)?;
        let right = self.resample(ir.right(), new_len)?;
        ImpulseResponse::new(left, right)
    }
}

/// Resample `signal` to `new_len` samples with a one-off plan.
pub fn resample(signal: &[Sample], new_len: usize) -> BinauralResult<AudioBuffer> {
    Resampler::new().resample(signal, new_len)
}

/// Convert every response of a set from `from_rate` to `to_rate` Hz.
///
/// Each response of `n` samples becomes `floor(n * to_rate / from_rate)` samples.
pub fn resample_set(
    set: &[ImpulseResponse],
    from_rate: u32,
    to_rate: u32,
) -> BinauralResult<Vec<ImpulseResponse>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(BinauralError::InvalidSampleRate);
    }
    if from_rate == to_rate {
        return Ok(set.to_vec());
    }

    debug!(
        "resampling {} impulse responses from {} Hz to {} Hz",
        set.len(),
        from_rate,
        to_rate
    );

    let mut resampler = Resampler::new();
    set.iter()
        .map(|ir| {
            let new_len = (ir.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
            resampler.resample_ir(ir, new_len)
        })
        .collect()
}
