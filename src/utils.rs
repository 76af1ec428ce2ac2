//! Small signal helpers shared by alignment and calibration

use crate::{AudioBuffer, Sample};

/// Calculate peak amplitude of a buffer
pub fn calculate_peak(buffer: &[Sample]) -> Sample {
    buffer.iter().map(|&x| x.abs()).fold(0.0, f32::max)
}

/// Index of the largest sample, first occurrence on ties. `None` for an empty buffer.
pub fn argmax(buffer: &[Sample]) -> Option<usize> {
    let mut best: Option<(usize, Sample)> = None;
    for (i, &x) in buffer.iter().enumerate() {
        match best {
            Some((_, value)) if x <= value => {}
            _ => best = Some((i, x)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the largest sample after multiplying by `polarity` (±1).
pub fn argmax_with_polarity(buffer: &[Sample], polarity: Sample) -> Option<usize> {
    let mut best: Option<(usize, Sample)> = None;
    for (i, &x) in buffer.iter().enumerate() {
        let x = x * polarity;
        match best {
            Some((_, value)) if x <= value => {}
            _ => best = Some((i, x)),
        }
    }
    best.map(|(i, _)| i)
}

/// Mean absolute amplitude, zero for an empty buffer
pub fn mean_abs(buffer: &[Sample]) -> Sample {
    if buffer.is_empty() {
        return 0.0;
    }
    buffer.iter().map(|&x| x.abs()).sum::<Sample>() / buffer.len() as Sample
}

/// True if every sample is exactly zero.
pub fn is_silent(buffer: &[Sample]) -> bool {
    buffer.iter().all(|&x| x == 0.0)
}

/// Direct time-domain convolution, used to validate the block convolvers.
///
/// Output length is `signal.len() + kernel.len() - 1`; empty when either input is empty.
pub fn time_convolve(signal: &[Sample], kernel: &[Sample]) -> AudioBuffer {
    if signal.is_empty() || kernel.is_empty() {
        return AudioBuffer::new();
    }

    let mut output = vec![0.0; signal.len() + kernel.len() - 1];
    for (i, &sig_sample) in signal.iter().enumerate() {
        for (j, &kernel_sample) in kernel.iter().enumerate() {
            output[i + j] += sig_sample * kernel_sample;
        }
    }
    output
}
