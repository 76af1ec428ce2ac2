//! Three-path binaural renderer
//!
//! Object audio is rendered three times by an external loudspeaker renderer,
//! once per [`RenderPath`], and each loudspeaker feed is convolved with the
//! matching set of ear responses:
//!
//! - **HRIR**: anechoic head-related responses, aligned to a common onset
//! - **BRIR**: room responses, delayed to start with the HRIR onset
//! - **Direct**: an unfiltered feed to both ears for sources inside the head
//!
//! The three binaural signals are summed into one stereo output. Distance
//! decides how much of a source goes down each path, see
//! [`RenderPath::distance_gain`].

use crate::{
    adapter::BlockAdapter,
    align::{align_irs_with_config, AlignConfig},
    calibrate::{alignment_padding, calibrate_level, representative_delay, CalibrationConfig},
    ir::{max_len, routing_triples, ImpulseResponse},
    matrix::MatrixConvolver,
    resample::resample_set,
    AudioBuffer, BinauralError, BinauralResult, Sample,
};
use log::debug;

/// Number of ears, i.e. output channels of every path
const EARS: usize = 2;

/// External spatial renderer producing loudspeaker feeds.
///
/// Implementations own their loudspeaker layout; one instance is created per
/// rendering path, each with the layout its impulse responses were measured for.
pub trait LoudspeakerRenderer {
    /// Description of the objects to render
    type Items;

    /// Replace the items to render. Items are already weighted for the
    /// renderer's path.
    fn set_rendering_items(&mut self, items: &Self::Items);

    /// Render `input` (one buffer per object channel) starting at
    /// `start_sample`, returning one buffer per loudspeaker of the same length.
    fn render(
        &mut self,
        sample_rate: u32,
        start_sample: u64,
        input: &[AudioBuffer],
    ) -> BinauralResult<Vec<AudioBuffer>>;

    /// Delay in samples between input and loudspeaker output
    fn overall_delay(&self) -> usize;

    /// Number of loudspeaker channels produced by [`render`](Self::render)
    fn num_channels(&self) -> usize;
}

/// Rendering items that can be re-weighted for one rendering path.
pub trait PathWeighting {
    /// Copy of the items with gains adjusted for `path`.
    fn weighted_for(&self, path: RenderPath) -> Self;
}

/// One of the three convolution paths of the binaural mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RenderPath {
    /// Anechoic head-related impulse responses
    Hrir,
    /// Binaural room impulse responses
    Brir,
    /// Unfiltered feed to both ears
    Direct,
}

impl RenderPath {
    /// All paths in mixing order
    pub const ALL: [RenderPath; 3] = [RenderPath::Hrir, RenderPath::Brir, RenderPath::Direct];

    /// Gain applied to a source `distance` away from the listener on this path.
    ///
    /// Sources closer than 0.3 fade from the HRIR path into the direct path.
    /// The room path fades in between 0.2 and 1.
    pub fn distance_gain(self, distance: Sample) -> Sample {
        match self {
            RenderPath::Hrir if distance <= 0.3 => distance / 0.3,
            RenderPath::Hrir => 1.0,
            RenderPath::Brir if distance <= 0.2 => 0.0,
            RenderPath::Brir if distance <= 1.0 => (distance - 0.2) / 0.8,
            RenderPath::Brir => 1.0,
            RenderPath::Direct if distance <= 0.3 => 1.0 - distance / 0.3,
            RenderPath::Direct => 0.0,
        }
    }
}

impl core::fmt::Display for RenderPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RenderPath::Hrir => write!(f, "HRIR"),
            RenderPath::Brir => write!(f, "BRIR"),
            RenderPath::Direct => write!(f, "direct"),
        }
    }
}

/// Settings for [`BinauralRenderer`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BinauralConfig {
    /// Convolution block size in samples
    pub block_size: usize,
    /// Rendering sample rate; measured sets are resampled to it
    pub sample_rate: u32,
    /// HRIR onset alignment
    pub align: AlignConfig,
    /// Path levels
    pub calibration: CalibrationConfig,
}

impl Default for BinauralConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            sample_rate: 48000,
            align: AlignConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

/// A renderer together with the responses measured for its layout.
///
/// `responses[i]` belongs to loudspeaker channel `i` of the renderer.
#[derive(Debug, Clone)]
pub struct MeasuredPath<R> {
    /// Loudspeaker renderer for the path
    pub renderer: R,
    /// One stereo response per loudspeaker
    pub responses: Vec<ImpulseResponse>,
    /// Sample rate the responses were measured at
    pub sample_rate: u32,
}

/// Renderer, engine and adapter of one path
#[derive(Debug)]
struct ConvolutionPath<R> {
    path: RenderPath,
    renderer: R,
    engine: MatrixConvolver,
    adapter: BlockAdapter,
    filter_len: usize,
}

impl<R: LoudspeakerRenderer> ConvolutionPath<R> {
    fn new(
        path: RenderPath,
        renderer: R,
        responses: &[ImpulseResponse],
        block_size: usize,
    ) -> BinauralResult<Self> {
        let channels = renderer.num_channels();
        if channels != responses.len() {
            return Err(BinauralError::LayoutMismatch {
                path,
                channels,
                responses: responses.len(),
            });
        }

        let engine = MatrixConvolver::new(block_size, channels, EARS, routing_triples(responses))?;
        let adapter = BlockAdapter::new(block_size, channels, EARS)?;
        debug!(
            "{} path: {} loudspeakers, filters of {} samples",
            path,
            channels,
            max_len(responses)
        );

        Ok(Self {
            path,
            renderer,
            engine,
            adapter,
            filter_len: max_len(responses),
        })
    }

    fn render(
        &mut self,
        sample_rate: u32,
        start_sample: u64,
        input: &[AudioBuffer],
    ) -> BinauralResult<Vec<AudioBuffer>> {
        let feeds = self.renderer.render(sample_rate, start_sample, input)?;
        let engine = &mut self.engine;
        self.adapter
            .process(&feeds, |block, output| engine.process_into(block, output))
    }

    fn delay(&self) -> usize {
        self.adapter
            .delay(self.renderer.overall_delay() + self.engine.inherent_delay())
    }
}

/// Binaural renderer mixing the HRIR, BRIR and direct paths.
#[derive(Debug)]
pub struct BinauralRenderer<R> {
    hrir: ConvolutionPath<R>,
    brir: ConvolutionPath<R>,
    direct: ConvolutionPath<R>,
    mix_scale: Sample,
}

impl<R: LoudspeakerRenderer> BinauralRenderer<R> {
    /// Prepare all three paths.
    ///
    /// The HRIR set is aligned, resampled and level-calibrated. The BRIR set is
    /// resampled, calibrated and delayed so that it starts together with the
    /// HRIRs. The direct path gets a delayed impulse per loudspeaker of
    /// `direct`, feeding both ears.
    pub fn new(
        config: BinauralConfig,
        hrir: MeasuredPath<R>,
        brir: MeasuredPath<R>,
        direct: R,
    ) -> BinauralResult<Self> {
        if config.sample_rate == 0 {
            return Err(BinauralError::InvalidSampleRate);
        }
        let levels = &config.calibration;

        let aligned = align_irs_with_config(&hrir.responses, &config.align)?.into_responses();
        let hrirs = resample_set(&aligned, hrir.sample_rate, config.sample_rate)?;
        let hrirs = calibrate_level(&hrirs, levels.target_power, levels.hrir_level)?;

        let onset = representative_delay(&hrirs)?;
        let padding = alignment_padding(onset);
        debug!("HRIR onset {:.1} samples, delaying other paths by {}", onset, padding);

        let brirs = resample_set(&brir.responses, brir.sample_rate, config.sample_rate)?;
        let brirs: Vec<_> = calibrate_level(&brirs, levels.target_power, levels.brir_level)?
            .iter()
            .map(|ir| ir.delayed(padding))
            .collect();

        let direct_irs = (0..direct.num_channels())
            .map(|_| {
                let mut impulse = vec![0.0; padding + 1];
                impulse[padding] = levels.direct_level;
                ImpulseResponse::new(impulse.clone(), impulse)
            })
            .collect::<BinauralResult<Vec<_>>>()?;

        Ok(Self {
            hrir: ConvolutionPath::new(RenderPath::Hrir, hrir.renderer, &hrirs, config.block_size)?,
            brir: ConvolutionPath::new(RenderPath::Brir, brir.renderer, &brirs, config.block_size)?,
            direct: ConvolutionPath::new(RenderPath::Direct, direct, &direct_irs, config.block_size)?,
            mix_scale: levels.mix_scale,
        })
    }

    /// Hand the items to every path, weighted for that path.
    pub fn set_rendering_items(&mut self, items: &R::Items)
    where
        R::Items: PathWeighting,
    {
        for path in self.paths_mut() {
            let weighted = items.weighted_for(path.path);
            path.renderer.set_rendering_items(&weighted);
        }
    }

    /// Render one chunk of object audio to a stereo pair.
    ///
    /// `input` holds one buffer per object channel, all of the same length;
    /// the output has that length per ear.
    pub fn render(
        &mut self,
        sample_rate: u32,
        start_sample: u64,
        input: &[AudioBuffer],
    ) -> BinauralResult<Vec<AudioBuffer>> {
        let mut mix = self.hrir.render(sample_rate, start_sample, input)?;
        for path in [&mut self.brir, &mut self.direct] {
            let rendered = path.render(sample_rate, start_sample, input)?;
            for (sum, ear) in mix.iter_mut().zip(&rendered) {
                for (s, &x) in sum.iter_mut().zip(ear) {
                    *s += x;
                }
            }
        }

        for ear in mix.iter_mut() {
            for s in ear.iter_mut() {
                *s *= self.mix_scale;
            }
        }
        Ok(mix)
    }

    /// Delay in samples from object input to binaural output.
    pub fn overall_delay(&self) -> usize {
        self.hrir.delay()
    }

    /// Length of the longest filter across all paths.
    pub fn tail_len(&self) -> usize {
        self.hrir
            .filter_len
            .max(self.brir.filter_len)
            .max(self.direct.filter_len)
    }

    /// Render silence on `num_inputs` object channels until every path has
    /// played out, returning the remaining output.
    pub fn flush(
        &mut self,
        sample_rate: u32,
        start_sample: u64,
        num_inputs: usize,
    ) -> BinauralResult<Vec<AudioBuffer>> {
        let len = self.overall_delay() + self.tail_len();
        let silence = vec![vec![0.0; len]; num_inputs];
        self.render(sample_rate, start_sample, &silence)
    }

    /// Renderer of one path
    pub fn renderer(&self, path: RenderPath) -> &R {
        match path {
            RenderPath::Hrir => &self.hrir.renderer,
            RenderPath::Brir => &self.brir.renderer,
            RenderPath::Direct => &self.direct.renderer,
        }
    }

    fn paths_mut(&mut self) -> [&mut ConvolutionPath<R>; 3] {
        [&mut self.hrir, &mut self.brir, &mut self.direct]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[derive(Debug, Clone)]
    struct Source {
        distance: Sample,
        gain: Sample,
    }

    impl PathWeighting for Source {
        fn weighted_for(&self, path: RenderPath) -> Self {
            Source {
                distance: self.distance,
                gain: self.gain * path.distance_gain(self.distance),
            }
        }
    }

    /// Sends input channel 0 to loudspeaker 0 with the item gain.
    #[derive(Debug, Clone)]
    struct FirstSpeaker {
        channels: usize,
        gain: Sample,
    }

    impl FirstSpeaker {
        fn new(channels: usize) -> Self {
            Self { channels, gain: 0.0 }
        }
    }

    impl LoudspeakerRenderer for FirstSpeaker {
        type Items = Source;

        fn set_rendering_items(&mut self, items: &Source) {
            self.gain = items.gain;
        }

        fn render(
            &mut self,
            _sample_rate: u32,
            _start_sample: u64,
            input: &[AudioBuffer],
        ) -> BinauralResult<Vec<AudioBuffer>> {
            let len = input.first().map_or(0, Vec::len);
            let mut output = vec![vec![0.0; len]; self.channels];
            if let Some(first) = input.first() {
                for (o, &x) in output[0].iter_mut().zip(first) {
                    *o = x * self.gain;
                }
            }
            Ok(output)
        }

        fn overall_delay(&self) -> usize {
            0
        }

        fn num_channels(&self) -> usize {
            self.channels
        }
    }

    fn impulse_ir(len: usize, left: (usize, Sample), right: (usize, Sample)) -> ImpulseResponse {
        let mut l = vec![0.0; len];
        let mut r = vec![0.0; len];
        l[left.0] = left.1;
        r[right.0] = right.1;
        ImpulseResponse::new(l, r).unwrap()
    }

    /// HRIR and BRIR sets whose calibration scale is exactly one.
    fn renderer(block_size: usize) -> BinauralRenderer<FirstSpeaker> {
        let config = BinauralConfig {
            block_size,
            sample_rate: 48000,
            align: AlignConfig::default(),
            calibration: CalibrationConfig {
                target_power: 0.5,
                hrir_level: 0.75,
                brir_level: 0.5,
                direct_level: 0.37,
                mix_scale: 0.5,
            },
        };
        let hrir = MeasuredPath {
            renderer: FirstSpeaker::new(2),
            responses: vec![impulse_ir(16, (4, 1.0), (6, 0.5)); 2],
            sample_rate: 48000,
        };
        let brir = MeasuredPath {
            renderer: FirstSpeaker::new(2),
            responses: vec![impulse_ir(8, (0, 1.0), (0, 1.0)); 2],
            sample_rate: 48000,
        };
        BinauralRenderer::new(config, hrir, brir, FirstSpeaker::new(2)).unwrap()
    }

    fn render_impulse(renderer: &mut BinauralRenderer<FirstSpeaker>, len: usize) -> Vec<AudioBuffer> {
        let mut input = vec![0.0; len];
        input[0] = 1.0;
        renderer.render(48000, 0, &[input]).unwrap()
    }

    fn assert_only(signal: &[Sample], expected: &[(usize, Sample)]) {
        for (n, &y) in signal.iter().enumerate() {
            let want = expected
                .iter()
                .find(|(at, _)| *at == n)
                .map_or(0.0, |&(_, v)| v);
            assert_abs_diff_eq!(y, want, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_distance_gains() {
        assert_abs_diff_eq!(RenderPath::Hrir.distance_gain(0.15), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(RenderPath::Hrir.distance_gain(2.0), 1.0);
        assert_abs_diff_eq!(RenderPath::Brir.distance_gain(0.1), 0.0);
        assert_abs_diff_eq!(RenderPath::Brir.distance_gain(0.6), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(RenderPath::Brir.distance_gain(3.0), 1.0);
        assert_abs_diff_eq!(RenderPath::Direct.distance_gain(0.0), 1.0);
        assert_abs_diff_eq!(RenderPath::Direct.distance_gain(0.15), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(RenderPath::Direct.distance_gain(0.5), 0.0);

        // HRIR and direct crossfade to constant sum inside the head
        for d in [0.0, 0.1, 0.2, 0.3] {
            let sum = RenderPath::Hrir.distance_gain(d) + RenderPath::Direct.distance_gain(d);
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_overall_delay() {
        let renderer = renderer(8);
        assert_eq!(renderer.overall_delay(), 16);
        // HRIR filters are the longest
        assert_eq!(renderer.tail_len(), 16);
    }

    #[test]
    fn test_far_source_mixes_hrir_and_brir() {
        let mut renderer = renderer(8);
        renderer.set_rendering_items(&Source {
            distance: 1.0,
            gain: 1.0,
        });

        let output = render_impulse(&mut renderer, 48);
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].len(), 48);

        // HRIR onset 4, BRIR delayed by 3, both scaled by mix 0.5
        let delay = renderer.overall_delay();
        assert_only(&output[0], &[(delay + 3, 0.5), (delay + 4, 0.5)]);
        assert_only(&output[1], &[(delay + 3, 0.5), (delay + 6, 0.25)]);
    }

    #[test]
    fn test_near_source_uses_direct_path() {
        let mut renderer = renderer(8);
        renderer.set_rendering_items(&Source {
            distance: 0.15,
            gain: 1.0,
        });

        let output = render_impulse(&mut renderer, 48);
        let delay = renderer.overall_delay();
        let direct = 0.5 * 0.37 * 0.5;
        assert_only(&output[0], &[(delay + 3, direct), (delay + 4, 0.25)]);
        assert_only(&output[1], &[(delay + 3, direct), (delay + 6, 0.125)]);
    }

    #[test]
    fn test_flush_returns_tail() {
        let mut renderer = renderer(8);
        renderer.set_rendering_items(&Source {
            distance: 1.0,
            gain: 1.0,
        });

        let head = render_impulse(&mut renderer, 8);
        assert!(head.iter().flatten().all(|&x| x == 0.0));

        let tail = renderer.flush(48000, 8, 1).unwrap();
        assert_eq!(tail[0].len(), renderer.overall_delay() + renderer.tail_len());
        let delay = renderer.overall_delay() - 8;
        assert_only(&tail[0], &[(delay + 3, 0.5), (delay + 4, 0.5)]);
    }

    #[test]
    fn test_layout_mismatch() {
        let hrir = MeasuredPath {
            renderer: FirstSpeaker::new(3),
            responses: vec![impulse_ir(16, (4, 1.0), (6, 0.5)); 2],
            sample_rate: 48000,
        };
        let brir = MeasuredPath {
            renderer: FirstSpeaker::new(2),
            responses: vec![impulse_ir(8, (0, 1.0), (0, 1.0)); 2],
            sample_rate: 48000,
        };
        let result = BinauralRenderer::new(BinauralConfig::default(), hrir, brir, FirstSpeaker::new(2));
        assert!(matches!(
            result,
            Err(BinauralError::LayoutMismatch {
                path: RenderPath::Hrir,
                channels: 3,
                responses: 2
            })
        ));
    }

    #[test]
    fn test_invalid_setup_is_rejected() {
        let silent = MeasuredPath {
            renderer: FirstSpeaker::new(1),
            responses: vec![ImpulseResponse::new(vec![0.0; 8], vec![0.0; 8]).unwrap()],
            sample_rate: 48000,
        };
        let result =
            BinauralRenderer::new(BinauralConfig::default(), silent.clone(), silent, FirstSpeaker::new(1));
        assert!(matches!(result, Err(BinauralError::ZeroPeak)));
    }
}
