//! Frequency-domain blocks for overlap-save convolution
//!
//! A [`FrequencyBlock`] holds the real-FFT spectrum of a `2 * block_size` sample
//! buffer, or nothing at all when the block is known to be silent. Keeping the
//! silence explicit lets the convolution code skip multiplies and allocations for
//! inputs, filter partitions and outputs that carry no signal.

use crate::{utils::is_silent, BinauralError, BinauralResult, Sample};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::ops::AddAssign;
use std::sync::Arc;

/// Real FFT plans shared by every block of one engine.
///
/// The transform length is always `2 * block_size`; spectra have
/// `block_size + 1` bins.
#[derive(Clone)]
pub struct BlockFft {
    block_size: usize,
    r2c: Arc<dyn RealToComplex<Sample>>,
    c2r: Arc<dyn ComplexToReal<Sample>>,
}

impl core::fmt::Debug for BlockFft {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockFft")
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl BlockFft {
    /// Plan forward and inverse transforms for blocks of `block_size` samples.
    pub fn new(block_size: usize) -> BinauralResult<Self> {
        if block_size == 0 {
            return Err(BinauralError::InvalidBlockSize);
        }

        let mut planner = RealFftPlanner::<Sample>::new();
        Ok(Self {
            block_size,
            r2c: planner.plan_fft_forward(2 * block_size),
            c2r: planner.plan_fft_inverse(2 * block_size),
        })
    }

    /// Time-domain block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Transform length (`2 * block_size`).
    pub fn fft_size(&self) -> usize {
        2 * self.block_size
    }

    /// Number of complex bins in a spectrum (`block_size + 1`).
    pub fn spectrum_size(&self) -> usize {
        self.block_size + 1
    }

    /// Allocate the scratch buffers needed by [`FrequencyBlock`] transforms.
    pub fn make_scratch(&self) -> TransformScratch {
        TransformScratch {
            time: vec![0.0; self.fft_size()],
            spectrum: vec![Complex::new(0.0, 0.0); self.spectrum_size()],
        }
    }

    /// Forward real FFT. `time` is used as scratch and is clobbered.
    pub fn forward(&self, time: &mut [Sample], spectrum: &mut [Complex<Sample>]) -> BinauralResult<()> {
        self.r2c.process(time, spectrum)?;
        Ok(())
    }

    /// Normalised inverse real FFT. `spectrum` is used as scratch and is clobbered.
    pub fn inverse(&self, spectrum: &mut [Complex<Sample>], time: &mut [Sample]) -> BinauralResult<()> {
        // DC and Nyquist bins of a real signal carry no imaginary part
        spectrum[0].im = 0.0;
        if let Some(last) = spectrum.last_mut() {
            last.im = 0.0;
        }

        self.c2r.process(spectrum, time)?;

        let scale = 1.0 / self.fft_size() as Sample;
        for sample in time.iter_mut() {
            *sample *= scale;
        }
        Ok(())
    }
}

/// Reusable buffers for forward and inverse transforms of one block.
#[derive(Debug, Clone)]
pub struct TransformScratch {
    time: Vec<Sample>,
    spectrum: Vec<Complex<Sample>>,
}

/// A block of frequency-domain samples that may be tagged as all-zero.
///
/// When [`is_zero`](Self::is_zero) is true the spectrum contents are
/// meaningless (and possibly never allocated); arithmetic treats the block as
/// exact silence.
#[derive(Debug, Clone)]
pub struct FrequencyBlock {
    spectrum: Option<Vec<Complex<Sample>>>,
    is_zero: bool,
}

impl Default for FrequencyBlock {
    fn default() -> Self {
        Self::zero()
    }
}

impl FrequencyBlock {
    /// A silent block with no storage.
    pub fn zero() -> Self {
        Self {
            spectrum: None,
            is_zero: true,
        }
    }

    /// Transform up to `2 * block_size` time-domain samples, zero-padded.
    ///
    /// Returns a silent block without running the FFT when every sample is
    /// exactly zero.
    pub fn from_time_domain(samples: &[Sample], fft: &BlockFft) -> BinauralResult<Self> {
        let mut scratch = fft.make_scratch();
        let mut block = Self::zero();
        block.set_from_time_domain(samples, fft, &mut scratch)?;
        Ok(block)
    }

    /// In-place variant of [`from_time_domain`](Self::from_time_domain) that
    /// reuses this block's storage.
    pub fn set_from_time_domain(
        &mut self,
        samples: &[Sample],
        fft: &BlockFft,
        scratch: &mut TransformScratch,
    ) -> BinauralResult<()> {
        if samples.len() > fft.fft_size() {
            return Err(BinauralError::BufferSizeMismatch {
                expected: fft.fft_size(),
                actual: samples.len(),
            });
        }

        if is_silent(samples) {
            self.is_zero = true;
            return Ok(());
        }

        scratch.time[..samples.len()].copy_from_slice(samples);
        scratch.time[samples.len()..].fill(0.0);

        let spectrum = self
            .spectrum
            .get_or_insert_with(|| vec![Complex::new(0.0, 0.0); fft.spectrum_size()]);
        fft.forward(&mut scratch.time, spectrum)?;
        self.is_zero = false;
        Ok(())
    }

    /// Write the first `block_size` samples of the inverse transform into `output`.
    ///
    /// A silent block writes nothing; the caller is expected to have zeroed
    /// `output` beforehand.
    pub fn to_time_domain(
        &self,
        fft: &BlockFft,
        scratch: &mut TransformScratch,
        output: &mut [Sample],
    ) -> BinauralResult<()> {
        let Some(spectrum) = self.spectrum() else {
            return Ok(());
        };

        scratch.spectrum.copy_from_slice(spectrum);
        fft.inverse(&mut scratch.spectrum, &mut scratch.time)?;

        let len = output.len().min(fft.block_size());
        output[..len].copy_from_slice(&scratch.time[..len]);
        Ok(())
    }

    /// True if this block is known to be silent.
    pub fn is_zero(&self) -> bool {
        self.is_zero
    }

    /// Spectrum bins, or `None` for a silent block.
    pub fn spectrum(&self) -> Option<&[Complex<Sample>]> {
        if self.is_zero {
            None
        } else {
            self.spectrum.as_deref()
        }
    }

    /// Mark the block silent. Storage is kept for reuse.
    pub fn clear(&mut self) {
        self.is_zero = true;
    }

    /// Make the block non-silent, zero-filling storage that held stale data.
    fn materialize(&mut self, size: usize) -> &mut [Complex<Sample>] {
        let was_zero = self.is_zero;
        self.is_zero = false;

        let spectrum = self
            .spectrum
            .get_or_insert_with(|| vec![Complex::new(0.0, 0.0); size]);
        if was_zero {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        spectrum
    }

    /// `self += other`. A silent operand is the identity and allocates nothing.
    pub fn accumulate(&mut self, other: &FrequencyBlock) {
        let Some(src) = other.spectrum() else {
            return;
        };

        let dst = self.materialize(src.len());
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s;
        }
    }
}

impl AddAssign<&FrequencyBlock> for FrequencyBlock {
    fn add_assign(&mut self, other: &FrequencyBlock) {
        self.accumulate(other);
    }
}

/// `dst += a * b`, bin by bin. Does nothing unless both `a` and `b` carry signal.
pub fn multiply_accumulate(dst: &mut FrequencyBlock, a: &FrequencyBlock, b: &FrequencyBlock) {
    let (Some(a), Some(b)) = (a.spectrum(), b.spectrum()) else {
        return;
    };

    let dst = dst.materialize(a.len());
    for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
        *d += x * y;
    }
}
