//! Level and delay calibration across impulse-response sets
//!
//! The binaural mix sums several convolution paths (anechoic HRIRs, room
//! BRIRs, an unfiltered direct path). Each set is first brought to a common
//! average level, then scaled by its own mix level, and the paths are delayed
//! so that their onsets coincide.

use crate::{
    ir::ImpulseResponse,
    utils::{argmax, mean_abs},
    BinauralError, BinauralResult, Sample,
};
use log::debug;

/// Mix levels and normalisation target for the three rendering paths.
///
/// The levels are empirically tuned so that the anechoic, room and direct
/// renderings blend at comparable loudness.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalibrationConfig {
    /// Total target power per response, spread evenly over its samples
    pub target_power: Sample,
    /// Level of the HRIR path after normalisation
    pub hrir_level: Sample,
    /// Level of the BRIR path after normalisation
    pub brir_level: Sample,
    /// Gain of the unfiltered direct path
    pub direct_level: Sample,
    /// Gain applied to the sum of all paths
    pub mix_scale: Sample,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target_power: 0.5,
            hrir_level: 0.208_856_43 / 2.0,
            brir_level: 0.055_428_31 / 2.0,
            direct_level: 0.37,
            mix_scale: 0.5,
        }
    }
}

/// Average ratio of target power to measured power across a set.
///
/// Mean absolute amplitude stands in for power. Each channel contributes half
/// of its position's ratio; positions are then averaged. Sets are divided by
/// this factor before being scaled to their mix level, which is the scaling
/// the tuned levels in [`CalibrationConfig`] assume.
///
/// Fails on an empty set or when any channel is silent.
pub fn gain_factor(set: &[ImpulseResponse], target_power: Sample) -> BinauralResult<Sample> {
    if set.is_empty() {
        return Err(BinauralError::EmptyImpulseResponseSet);
    }

    let mut total = 0.0;
    for (position, ir) in set.iter().enumerate() {
        let len = ir.len() as Sample;
        let target = target_power / len;

        let mut ratio = 0.0;
        for channel in ir.channels() {
            let power = mean_abs(channel);
            if power == 0.0 || !power.is_finite() {
                return Err(BinauralError::ZeroPower { position });
            }
            ratio += target / power / 2.0;
        }
        total += ratio;
    }

    Ok(total / set.len() as Sample)
}

/// Average onset of a set: per position the earlier of the two ears' raw
/// peak indices, averaged over positions.
pub fn representative_delay(set: &[ImpulseResponse]) -> BinauralResult<f64> {
    if set.is_empty() {
        return Err(BinauralError::EmptyImpulseResponseSet);
    }

    let sum: usize = set
        .iter()
        .map(|ir| {
            let left = argmax(ir.left()).unwrap_or(0);
            let right = argmax(ir.right()).unwrap_or(0);
            left.min(right)
        })
        .sum();

    Ok(sum as f64 / set.len() as f64)
}

/// Normalise a set with [`gain_factor`] and scale it to `level`.
pub fn calibrate_level(
    set: &[ImpulseResponse],
    target_power: Sample,
    level: Sample,
) -> BinauralResult<Vec<ImpulseResponse>> {
    let gain = gain_factor(set, target_power)?;
    debug!("calibrating {} responses: gain factor {}, level {}", set.len(), gain, level);

    let scale = level / gain;
    Ok(set.iter().map(|ir| ir.scaled(scale)).collect())
}

/// Zeros to prepend to a path so it lines up with a set whose
/// [`representative_delay`] is `delay`.
///
/// One sample less than the truncated delay, never negative.
pub fn alignment_padding(delay: f64) -> usize {
    (delay as usize).saturating_sub(1)
}
