//! Musical key detection from a Hann-windowed FFT chromagram.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::config::AnalysisConfig;
use crate::dsp;
use crate::library::{KeyMode, MusicalKey};

/// Scale membership for a major key rooted at C.
const MAJOR_TEMPLATE: [f32; 12] = [1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
/// Scale membership for a natural minor key rooted at C.
const MINOR_TEMPLATE: [f32; 12] = [1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0];

/// Extra weight on the tonic's chroma. Binary templates score every key
/// sharing a note equally; the tonic term separates them.
const TONIC_WEIGHT: f32 = 2.0;
/// Lowest harmonic weight applied to upper octaves.
const HARMONIC_FLOOR: f32 = 0.1;

const MIN_CONFIDENCE: f32 = 0.5;
const MAX_CONFIDENCE: f32 = 0.95;

/// Detected key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    pub key: MusicalKey,
    /// 0.5-0.95.
    pub confidence: f32,
}

/// Estimate the key of a mono buffer.
pub fn detect_key(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> KeyEstimate {
    let chroma = chromagram(samples, sample_rate, config);
    let estimate = score_keys(&chroma);
    log::debug!(
        "Key: chroma {:?}, {} ({:.2})",
        chroma,
        estimate.key,
        estimate.confidence
    );
    estimate
}

/// Pitch class of a frequency (0 = C).
pub fn pitch_class(freq: f32) -> usize {
    let midi = (12.0 * (freq / 440.0).log2() + 69.0).round() as i32;
    midi.rem_euclid(12) as usize
}

/// 12-bin chromagram normalized to a maximum of 1.
pub fn chromagram(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> [f32; 12] {
    let frame_size = config.key_frame_size;
    let hop = config.key_hop_size.max(1);
    let mut chroma = [0.0f32; 12];

    if samples.len() < frame_size || frame_size == 0 {
        return chroma;
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);
    let window = dsp::hann_window(frame_size);

    // Precompute the pitch class and weight of every bin in range
    let bin_hz = sample_rate as f32 / frame_size as f32;
    let first_bin = (config.key_min_hz / bin_hz).ceil().max(1.0) as usize;
    let last_bin = ((config.key_max_hz / bin_hz).floor() as usize).min(frame_size / 2);
    let bins: Vec<(usize, usize, f32)> = (first_bin..=last_bin)
        .map(|bin| {
            let freq = bin as f32 * bin_hz;
            (bin, pitch_class(freq), harmonic_weight(freq, config.key_min_hz))
        })
        .collect();

    let mut buffer = vec![Complex::new(0.0f32, 0.0); frame_size];
    for start in (0..=samples.len() - frame_size).step_by(hop) {
        for (slot, (&s, &w)) in buffer
            .iter_mut()
            .zip(samples[start..start + frame_size].iter().zip(window.iter()))
        {
            *slot = Complex::new(s * w, 0.0);
        }

        fft.process(&mut buffer);

        for &(bin, class, weight) in &bins {
            chroma[class] += buffer[bin].norm() * weight;
        }
    }

    let max = chroma.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for value in &mut chroma {
            *value /= max;
        }
    }
    chroma
}

/// Full weight in the lowest octave of the range, halving per octave above it.
fn harmonic_weight(freq: f32, min_hz: f32) -> f32 {
    let octave = (freq / min_hz).log2().floor().max(0.0);
    0.5f32.powf(octave).max(HARMONIC_FLOOR)
}

/// Score all 24 keys against a chromagram.
///
/// Confidence compares the winner with the best key on a different tonic;
/// the parallel mode is decided by the scale notes alone.
pub fn score_keys(chroma: &[f32; 12]) -> KeyEstimate {
    let mut scores: Vec<(MusicalKey, f32)> = Vec::with_capacity(24);
    for mode in [KeyMode::Major, KeyMode::Minor] {
        let template = match mode {
            KeyMode::Major => &MAJOR_TEMPLATE,
            KeyMode::Minor => &MINOR_TEMPLATE,
        };
        for root in 0..12 {
            let fit: f32 = (0..12)
                .map(|i| chroma[(root + i) % 12] * template[i])
                .sum();
            let score = fit + TONIC_WEIGHT * chroma[root];
            scores.push((MusicalKey::new(root as u8, mode), score));
        }
    }

    // Majors come first, so an exact tie keeps the major key
    let (best_key, best) = scores
        .iter()
        .copied()
        .fold((MusicalKey::new(0, KeyMode::Major), f32::MIN), |acc, item| {
            if item.1 > acc.1 {
                item
            } else {
                acc
            }
        });

    let runner_up = scores
        .iter()
        .filter(|(key, _)| key.root != best_key.root)
        .map(|(_, score)| *score)
        .fold(0.0f32, f32::max);

    let confidence = if best > 0.0 {
        ((best - runner_up) / best).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    } else {
        MIN_CONFIDENCE
    };

    KeyEstimate {
        key: best_key,
        confidence,
    }
}
