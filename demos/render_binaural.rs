//! # Render Binaural
//!
//! Places a mono source in front of the listener and renders it to headphones
//! through the HRIR, BRIR and direct paths.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example render_binaural -- <input.wav> <hrir.wav> <brir.wav> [distance] [output.wav]
//! ```
//!
//! `hrir.wav` and `brir.wav` are stereo impulse responses measured for a
//! loudspeaker straight ahead. `distance` is in metres (default 1.0); sources
//! closer than 0.3 m move into the direct path.
//!
//! ## Example
//!
//! ```bash
//! RUST_LOG=debug cargo run --example render_binaural -- speech.wav front_hrir.wav front_brir.wav 0.2
//! ```

use anyhow::{Context, Result};
use binconv::{
    calculate_peak, AudioBuffer, BinauralConfig, BinauralRenderer, BinauralResult, ImpulseResponse,
    LoudspeakerRenderer, MeasuredPath, PathWeighting, RenderPath, Sample,
};
use hound::{WavReader, WavSpec, WavWriter};
use std::env;

/// Chunk size fed to the renderer, deliberately unrelated to the block size
const CHUNK_SIZE: usize = 1000;

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

/// Single-loudspeaker renderer: the mono input goes to the speaker ahead.
#[derive(Debug, Default)]
struct FrontSpeaker {
    gain: Sample,
}

impl LoudspeakerRenderer for FrontSpeaker {
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
        let feed: AudioBuffer = input
            .first()
            .map(|ch| ch.iter().map(|&x| x * self.gain).collect())
            .unwrap_or_default();
        Ok(vec![feed])
    }

    fn overall_delay(&self) -> usize {
        0
    }

    fn num_channels(&self) -> usize {
        1
    }
}

/// Read WAV samples as f32 channels, supporting 16/24/32-bit integer and float audio
fn read_wav_channels(path: &str) -> Result<(Vec<AudioBuffer>, u32)> {
    let mut reader = WavReader::open(path).with_context(|| format!("Failed to open {}", path))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits @ (16 | 24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("Failed to read {}-bit samples", bits))?
        }
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("Failed to read 32-bit float samples")?,
        _ => anyhow::bail!(
            "Unsupported audio format: {} bits, {:?}",
            spec.bits_per_sample,
            spec.sample_format
        ),
    };

    let channels = spec.channels as usize;
    let deinterleaved = (0..channels)
        .map(|ch| interleaved.iter().skip(ch).step_by(channels).copied().collect())
        .collect();
    Ok((deinterleaved, spec.sample_rate))
}

fn read_ir(path: &str) -> Result<(ImpulseResponse, u32)> {
    let (mut channels, sample_rate) = read_wav_channels(path)?;
    if channels.len() != 2 {
        anyhow::bail!("{} must be stereo, found {} channels", path, channels.len());
    }
    let right = channels.remove(1);
    let left = channels.remove(0);
    Ok((ImpulseResponse::new(left, right)?, sample_rate))
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <input.wav> <hrir.wav> <brir.wav> [distance] [output.wav]",
            args[0]
        );
        eprintln!("Renders a mono source to binaural stereo");
        std::process::exit(1);
    }

    let distance: Sample = match args.get(4) {
        Some(d) => d.parse().with_context(|| format!("Invalid distance {}", d))?,
        None => 1.0,
    };
    let output_path = args.get(5).map_or("output_binaural.wav", String::as_str);

    let (input, sample_rate) = read_wav_channels(&args[1])?;
    let num_frames = input.first().map_or(0, Vec::len);
    // downmix to mono
    let mono: AudioBuffer = (0..num_frames)
        .map(|n| input.iter().map(|ch| ch[n]).sum::<Sample>() / input.len() as Sample)
        .collect();

    let (hrir, hrir_rate) = read_ir(&args[2])?;
    let (brir, brir_rate) = read_ir(&args[3])?;

    println!("Binaural Renderer");
    println!("Input: {} ({} Hz, {} samples)", args[1], sample_rate, mono.len());
    println!("HRIR: {} ({} Hz, {} samples)", args[2], hrir_rate, hrir.len());
    println!("BRIR: {} ({} Hz, {} samples)", args[3], brir_rate, brir.len());
    println!("Distance: {:.2} m", distance);

    let config = BinauralConfig {
        sample_rate,
        ..BinauralConfig::default()
    };
    let mut renderer = BinauralRenderer::new(
        config,
        MeasuredPath {
            renderer: FrontSpeaker::default(),
            responses: vec![hrir],
            sample_rate: hrir_rate,
        },
        MeasuredPath {
            renderer: FrontSpeaker::default(),
            responses: vec![brir],
            sample_rate: brir_rate,
        },
        FrontSpeaker::default(),
    )?;
    renderer.set_rendering_items(&Source { distance, gain: 1.0 });

    for path in RenderPath::ALL {
        println!("{} gain: {:.2}", path, renderer.renderer(path).gain);
    }

    println!("\nProcessing...");

    let mut output: Vec<AudioBuffer> = vec![AudioBuffer::new(); 2];
    let mut start_sample = 0u64;
    for chunk in mono.chunks(CHUNK_SIZE) {
        let rendered = renderer.render(sample_rate, start_sample, &[chunk.to_vec()])?;
        for (out, ear) in output.iter_mut().zip(rendered) {
            out.extend(ear);
        }
        start_sample += chunk.len() as u64;
    }
    let tail = renderer.flush(sample_rate, start_sample, 1)?;
    for (out, ear) in output.iter_mut().zip(tail) {
        out.extend(ear);
    }

    // drop the processing latency so the output starts with the input
    let delay = renderer.overall_delay();
    println!("Latency: {} samples", delay);
    for ear in output.iter_mut() {
        ear.drain(..delay.min(ear.len()));
    }

    let max_amplitude = output.iter().map(|ear| calculate_peak(ear)).fold(0.0, f32::max);
    if max_amplitude > 1.0 {
        println!("Normalizing output (peak was {:.2})", max_amplitude);
        for s in output.iter_mut().flatten() {
            *s /= max_amplitude;
        }
    }

    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path, spec)
        .with_context(|| format!("Failed to create {}", output_path))?;
    for (&l, &r) in output[0].iter().zip(&output[1]) {
        writer.write_sample((l.clamp(-1.0, 1.0) * 32767.0) as i16)?;
        writer.write_sample((r.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;

    println!("\nSaved: {} ({} samples)", output_path, output[0].len());
    Ok(())
}
