//! Onset alignment of measured impulse-response sets
//!
//! Measured HRIR/BRIR sets rarely share a common onset: each source position
//! arrives at the ears with its own propagation delay plus whatever latency the
//! measurement chain added. Before a set can be summed through one convolution
//! engine, every position is shifted so that its earlier ear starts at the same
//! instant, while the interaural time difference within each position is kept.
//!
//! Onsets are located on an oversampled copy of the set so that the shifts have
//! sub-sample resolution at the original rate.

use crate::{
    ir::{max_len, ImpulseResponse},
    resample::Resampler,
    utils::argmax_with_polarity,
    BinauralError, BinauralResult, Sample,
};
use log::debug;

/// Tunable constants of the alignment algorithm
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AlignConfig {
    /// Oversampling factor used for onset detection
    pub oversample_factor: usize,
    /// Minimum height of a candidate early peak, as a fraction of the
    /// polarity-corrected maximum of the whole set
    pub peak_threshold: Sample,
    /// Largest distance between the two ears' main peaks, in original-rate
    /// samples, for which an earlier peak may replace the main one
    pub early_peak_gap: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            oversample_factor: 2,
            peak_threshold: 0.2,
            early_peak_gap: 20,
        }
    }
}

impl AlignConfig {
    /// Early-peak guard in oversampled samples.
    pub fn max_early_peak_distance(&self) -> usize {
        self.oversample_factor * self.early_peak_gap
    }
}

/// Result of [`align_irs`]: equal-length responses sharing one onset.
///
/// Index vectors are per position and measured in oversampled samples.
#[derive(Debug, Clone)]
pub struct AlignedImpulseResponseSet {
    /// Aligned responses, all of identical length
    pub responses: Vec<ImpulseResponse>,
    /// Detected onset of the earlier ear
    pub onsets: Vec<usize>,
    /// Zeros prepended to each position
    pub padding: Vec<usize>,
    /// Mean of the left and right peak indices; diagnostic only
    pub mean_peaks: Vec<f32>,
    /// Oversampling factor the indices refer to
    pub oversample_factor: usize,
}

impl AlignedImpulseResponseSet {
    /// Common onset all positions were shifted to (oversampled samples).
    pub fn reference_onset(&self) -> usize {
        self.onsets.iter().copied().max().unwrap_or(0)
    }

    /// Samples per channel of every aligned response
    pub fn sample_len(&self) -> usize {
        self.responses.first().map_or(0, ImpulseResponse::len)
    }

    /// Number of positions
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// True if the set holds no positions
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Drop the diagnostics and keep the responses
    pub fn into_responses(self) -> Vec<ImpulseResponse> {
        self.responses
    }
}

/// Align a set of impulse responses with the default [`AlignConfig`].
///
/// # Example
///
/// ```rust
/// use binconv::{align_irs, ImpulseResponse};
///
/// let mut near = vec![0.0; 32];
/// near[4] = 1.0;
/// let mut far = vec![0.0; 32];
/// far[9] = 1.0;
///
/// let set = vec![
///     ImpulseResponse::new(near.clone(), near).unwrap(),
///     ImpulseResponse::new(far.clone(), far).unwrap(),
/// ];
/// let aligned = align_irs(&set).unwrap();
/// assert_eq!(aligned.padding, vec![10, 0]);
/// assert_eq!(aligned.responses[0].len(), aligned.responses[1].len());
/// ```
pub fn align_irs(set: &[ImpulseResponse]) -> BinauralResult<AlignedImpulseResponseSet> {
    align_irs_with_config(set, &AlignConfig::default())
}

/// Align a set of impulse responses.
///
/// Polarity is inverted only when the largest sample of the oversampled set
/// is negative. Fails on an empty set, a zero oversampling factor, or a set
/// whose polarity-corrected maximum is zero.
pub fn align_irs_with_config(
    set: &[ImpulseResponse],
    config: &AlignConfig,
) -> BinauralResult<AlignedImpulseResponseSet> {
    if set.is_empty() {
        return Err(BinauralError::EmptyImpulseResponseSet);
    }
    if config.oversample_factor == 0 {
        return Err(BinauralError::InvalidOversampleFactor);
    }

    let factor = config.oversample_factor;
    let mut resampler = Resampler::new();

    let oversampled = set
        .iter()
        .map(|ir| resampler.resample_ir(ir, ir.len() * factor))
        .collect::<BinauralResult<Vec<_>>>()?;

    let samples = || {
        oversampled
            .iter()
            .flat_map(|ir| ir.channels())
            .flat_map(|ch| ch.iter().copied())
    };
    let set_max = samples().fold(Sample::NEG_INFINITY, Sample::max);
    let polarity: Sample = if set_max < 0.0 { -1.0 } else { 1.0 };
    let corrected_max = samples()
        .map(|x| x * polarity)
        .fold(Sample::NEG_INFINITY, Sample::max);
    if corrected_max <= 0.0 {
        return Err(BinauralError::ZeroPeak);
    }
    let min_height = config.peak_threshold * corrected_max;
    let max_gap = config.max_early_peak_distance();

    let mut onsets = Vec::with_capacity(set.len());
    let mut mean_peaks = Vec::with_capacity(set.len());
    for ir in &oversampled {
        let left = argmax_with_polarity(ir.left(), polarity).unwrap_or(0);
        let right = argmax_with_polarity(ir.right(), polarity).unwrap_or(0);

        let (left, right) = if left <= right {
            let refined = refine_onset(ir.left(), polarity, min_height, left, right - left, max_gap);
            (refined, right)
        } else {
            let refined = refine_onset(ir.right(), polarity, min_height, right, left - right, max_gap);
            (left, refined)
        };

        onsets.push(left.min(right));
        mean_peaks.push((left + right) as f32 / 2.0);
    }

    let reference = onsets.iter().copied().max().unwrap_or(0);
    let padding: Vec<usize> = onsets.iter().map(|&onset| reference - onset).collect();

    let mut shifted: Vec<ImpulseResponse> = oversampled
        .iter()
        .zip(&padding)
        .map(|(ir, &pad)| ir.delayed(pad))
        .collect();
    let padded_len = max_len(&shifted);
    for ir in shifted.iter_mut() {
        ir.pad_to(padded_len);
    }

    let output_len = padded_len / factor;
    let responses = shifted
        .iter()
        .map(|ir| resampler.resample_ir(ir, output_len))
        .collect::<BinauralResult<Vec<_>>>()?;

    debug!(
        "aligned {} impulse responses: reference onset {} (x{}), {} samples each",
        responses.len(),
        reference,
        factor,
        output_len
    );

    Ok(AlignedImpulseResponseSet {
        responses,
        onsets,
        padding,
        mean_peaks,
        oversample_factor: factor,
    })
}

/// Replace the main peak of the earlier ear by an earlier, smaller peak when
/// the two ears are close enough in time.
fn refine_onset(
    channel: &[Sample],
    polarity: Sample,
    min_height: Sample,
    main_peak: usize,
    ear_gap: usize,
    max_gap: usize,
) -> usize {
    let corrected: Vec<Sample> = channel.iter().map(|&x| x * polarity).collect();
    let peaks = find_peaks(&corrected, min_height);

    match peaks.as_slice() {
        [first, second, ..] if first <= second && ear_gap <= max_gap => *first,
        _ => main_peak,
    }
}

/// Indices of local maxima with height of at least `min_height`.
///
/// A flat-topped peak is reported at the middle of its plateau. The first and
/// last samples are never peaks.
pub fn find_peaks(signal: &[Sample], min_height: Sample) -> Vec<usize> {
    let mut peaks = Vec::new();
    if signal.len() < 3 {
        return peaks;
    }

    let last = signal.len() - 1;
    let mut i = 1;
    while i < last {
        if signal[i - 1] < signal[i] {
            let mut ahead = i + 1;
            while ahead < last && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                if signal[i] >= min_height {
                    peaks.push((i + ahead - 1) / 2);
                }
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize, at: usize, value: Sample) -> Vec<Sample> {
        let mut buffer = vec![0.0; len];
        buffer[at] = value;
        buffer
    }

    fn peak_index(buffer: &[Sample], polarity: Sample) -> usize {
        argmax_with_polarity(buffer, polarity).unwrap()
    }

    #[test]
    fn test_find_peaks_simple() {
        let signal = [0.0, 1.0, 0.0, 0.5, 0.0, 0.1, 0.0];
        assert_eq!(find_peaks(&signal, 0.0), vec![1, 3, 5]);
        assert_eq!(find_peaks(&signal, 0.2), vec![1, 3]);
    }

    #[test]
    fn test_find_peaks_plateau_and_edges() {
        let signal = [2.0, 0.0, 1.0, 1.0, 1.0, 0.0, 3.0];
        assert_eq!(find_peaks(&signal, 0.0), vec![3]);

        // a plateau that runs into the last sample is not a peak
        assert!(find_peaks(&[0.0, 1.0, 1.0], 0.0).is_empty());
        assert!(find_peaks(&[1.0, 0.0], 0.0).is_empty());
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(matches!(
            align_irs(&[]),
            Err(BinauralError::EmptyImpulseResponseSet)
        ));
    }

    #[test]
    fn test_silent_set_rejected() {
        let set = vec![ImpulseResponse::new(vec![0.0; 16], vec![0.0; 16]).unwrap()];
        assert!(matches!(align_irs(&set), Err(BinauralError::ZeroPeak)));
    }

    #[test]
    fn test_latest_position_unpadded() {
        let delays = [6, 14, 3, 10];
        let set: Vec<ImpulseResponse> = delays
            .iter()
            .map(|&d| ImpulseResponse::new(impulse(64, d, 1.0), impulse(64, d + 2, 0.8)).unwrap())
            .collect();

        let aligned = align_irs(&set).unwrap();
        assert_eq!(aligned.onsets, vec![12, 28, 6, 20]);
        assert_eq!(aligned.reference_onset(), 28);
        assert_eq!(aligned.padding, vec![16, 0, 22, 8]);
        assert_eq!(aligned.sample_len(), (64 * 2 + 22) / 2);

        for ir in &aligned.responses {
            assert_eq!(ir.len(), aligned.sample_len());
            assert_eq!(peak_index(ir.left(), 1.0), 14);
            assert_eq!(peak_index(ir.right(), 1.0), 16);
        }
    }

    #[test]
    fn test_interaural_difference_preserved() {
        let set = vec![
            ImpulseResponse::new(impulse(48, 5, 1.0), impulse(48, 9, 0.6)).unwrap(),
            ImpulseResponse::new(impulse(48, 12, 0.7), impulse(48, 8, 1.0)).unwrap(),
        ];
        let aligned = align_irs(&set).unwrap();

        // position 0: left leads by 4, position 1: right leads by 4
        let p0 = &aligned.responses[0];
        let p1 = &aligned.responses[1];
        let itd0 = peak_index(p0.right(), 1.0) as i64 - peak_index(p0.left(), 1.0) as i64;
        let itd1 = peak_index(p1.left(), 1.0) as i64 - peak_index(p1.right(), 1.0) as i64;
        assert_eq!(itd0, 4);
        assert_eq!(itd1, 4);

        // both earlier ears land on the same onset
        assert_eq!(peak_index(p0.left(), 1.0), peak_index(p1.right(), 1.0));
    }

    #[test]
    fn test_tie_resolves_to_left() {
        let set = vec![ImpulseResponse::new(impulse(32, 7, 1.0), impulse(32, 7, 0.5)).unwrap()];
        let aligned = align_irs(&set).unwrap();
        assert_eq!(aligned.onsets, vec![14]);
        assert_eq!(aligned.mean_peaks, vec![14.0]);
    }

    /// Raised-cosine pulse of `height` starting at `start`, peaking at `start + 4`.
    fn pulse(buffer: &mut [Sample], start: usize, height: Sample) {
        for k in 0..=8 {
            let phase = core::f32::consts::PI * k as Sample / 8.0;
            buffer[start + k] += height * phase.sin().powi(2);
        }
    }

    #[test]
    fn test_inverted_polarity() {
        // negative offset keeps every oversampled sample below zero
        let position = |l: usize, r: usize| {
            let mut left = vec![-0.2; 64];
            let mut right = vec![-0.2; 64];
            pulse(&mut left, l, -1.0);
            pulse(&mut right, r, -0.9);
            ImpulseResponse::new(left, right).unwrap()
        };
        let set = vec![position(2, 4), position(9, 11)];

        let aligned = align_irs(&set).unwrap();
        assert_eq!(aligned.onsets, vec![12, 26]);
        assert_eq!(aligned.padding, vec![14, 0]);
        for ir in &aligned.responses {
            assert_eq!(peak_index(ir.left(), -1.0), 13);
        }
    }

    #[test]
    fn test_larger_undershoot_keeps_positive_polarity() {
        let mut left = vec![0.0; 32];
        left[10] = 0.8;
        left[14] = -0.9;
        let mut right = vec![0.0; 32];
        right[12] = 0.8;
        right[16] = -0.9;
        let set = vec![ImpulseResponse::new(left, right).unwrap()];

        let aligned = align_irs(&set).unwrap();
        assert_eq!(aligned.onsets, vec![20]);
        assert_eq!(aligned.mean_peaks, vec![22.0]);
    }

    #[test]
    fn test_zero_oversample_factor_rejected() {
        let set = vec![ImpulseResponse::new(impulse(16, 3, 1.0), impulse(16, 4, 1.0)).unwrap()];
        let config = AlignConfig {
            oversample_factor: 0,
            ..Default::default()
        };
        assert!(matches!(
            align_irs_with_config(&set, &config),
            Err(BinauralError::InvalidOversampleFactor)
        ));
    }

    #[test]
    fn test_early_peak_replaces_main_peak() {
        // smaller lobe at 10 precedes the taller one at 14, right ear close behind
        let mut left = vec![0.0; 64];
        left[10] = 0.5;
        left[14] = 1.0;
        let right = impulse(64, 16, 0.9);
        let set = vec![ImpulseResponse::new(left, right).unwrap()];

        let aligned = align_irs(&set).unwrap();
        assert_eq!(aligned.onsets, vec![20]);
    }

    #[test]
    fn test_early_peak_ignored_when_ears_far_apart() {
        let mut left = vec![0.0; 128];
        left[10] = 0.5;
        left[14] = 1.0;
        let right = impulse(128, 40, 0.9);
        let set = vec![ImpulseResponse::new(left, right).unwrap()];

        let aligned = align_irs(&set).unwrap();
        assert_eq!(aligned.onsets, vec![28]);
    }

    #[test]
    fn test_early_peak_below_threshold_ignored() {
        let mut left = vec![0.0; 64];
        left[10] = 0.1;
        left[14] = 1.0;
        let right = impulse(64, 16, 0.9);
        let set = vec![ImpulseResponse::new(left, right).unwrap()];

        let aligned = align_irs(&set).unwrap();
        assert_eq!(aligned.onsets, vec![28]);
    }

    #[test]
    fn test_config_guard() {
        let config = AlignConfig {
            oversample_factor: 4,
            ..Default::default()
        };
        assert_eq!(config.max_early_peak_distance(), 80);
        assert_eq!(AlignConfig::default().max_early_peak_distance(), 40);
    }
}
