//! Loudness-density energy score.

use crate::config::AnalysisConfig;
use crate::dsp;

/// Mean-RMS upper bounds and the energy score of each band; anything at or
/// above the last bound scores 0.9.
const ENERGY_BANDS: [(f32, f32); 4] = [(0.01, 0.1), (0.03, 0.3), (0.07, 0.5), (0.15, 0.7)];
const LOUDEST_BAND_SCORE: f32 = 0.9;

/// Energy score in 0.1..=1.0.
pub fn detect_energy(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> f32 {
    let window = ((config.energy_window_ms / 1000.0) * sample_rate as f64).round() as usize;
    let levels: Vec<f64> = dsp::windowed(samples, window, window, dsp::rms)
        .into_iter()
        .map(f64::from)
        .collect();
    if levels.is_empty() {
        return 0.1;
    }

    let mean = (levels.iter().sum::<f64>() / levels.len() as f64) as f32;
    let base = ENERGY_BANDS
        .iter()
        .find(|(bound, _)| mean < *bound)
        .map_or(LOUDEST_BAND_SCORE, |(_, score)| *score);

    let p10 = dsp::percentile(&levels, 0.1);
    let p90 = dsp::percentile(&levels, 0.9);
    let adjustment = if p10 <= f64::EPSILON {
        // A silent tenth of the track is as dynamic as it gets
        -0.1
    } else {
        match p90 / p10 {
            ratio if ratio > 10.0 => -0.1,
            ratio if ratio < 3.0 => 0.1,
            _ => 0.0,
        }
    };

    let energy = (base + adjustment).clamp(0.1, 1.0);
    log::debug!(
        "Energy: mean rms {:.4}, p90/p10 {:.4}/{:.4}, score {:.2}",
        mean,
        p90,
        p10,
        energy
    );
    energy
}
