//! Integrated loudness and loudness range, EBU R128 style.

use crate::config::AnalysisConfig;
use crate::dsp::{self, BiquadCoeffs, BiquadState};

/// Pre-filter stage 1: high-pass removing sub-bass.
const HIGH_PASS_HZ: f32 = 38.0;
const HIGH_PASS_Q: f32 = 0.5;
/// Pre-filter stage 2: high-shelf boost modelling head response.
const SHELF_HZ: f32 = 4000.0;
const SHELF_GAIN_DB: f32 = 4.0;

/// Loudness reported when no block survives the gate.
pub const SILENT_LUFS: f64 = -50.0;

/// Integrated loudness and range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loudness {
    pub lufs: f64,
    pub range_lu: f64,
}

/// Measure integrated loudness and loudness range of a mono buffer.
pub fn measure_loudness(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> Loudness {
    let weighted = k_weight(samples, sample_rate);

    let block = ((config.loudness_block_ms / 1000.0) * sample_rate as f64).round() as usize;
    let hop = ((block as f64) * (1.0 - config.loudness_overlap)).round().max(1.0) as usize;
    let gate = lufs_to_mean_square(config.loudness_gate_lufs);

    let gated: Vec<f64> = dsp::windowed(&weighted, block, hop, dsp::mean_square)
        .into_iter()
        .filter(|ms| *ms > gate)
        .collect();

    if gated.is_empty() {
        return Loudness {
            lufs: SILENT_LUFS,
            range_lu: 0.0,
        };
    }

    let mean = gated.iter().sum::<f64>() / gated.len() as f64;
    let lufs = mean_square_to_lufs(mean);

    let block_loudness: Vec<f64> = gated.iter().map(|ms| mean_square_to_lufs(*ms)).collect();
    let range_lu =
        (dsp::percentile(&block_loudness, 0.95) - dsp::percentile(&block_loudness, 0.10)).max(0.0);

    log::debug!(
        "Loudness: {} blocks gated in, {:.2} LUFS, {:.2} LU",
        gated.len(),
        lufs,
        range_lu
    );

    Loudness { lufs, range_lu }
}

/// Simplified K-weighting: high-pass then high-shelf.
fn k_weight(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f32;
    let high_pass = BiquadCoeffs::high_pass(HIGH_PASS_HZ, HIGH_PASS_Q, sr);
    let shelf = BiquadCoeffs::high_shelf(SHELF_HZ.min(sr * 0.45), SHELF_GAIN_DB, sr);

    let mut hp_state = BiquadState::default();
    let mut shelf_state = BiquadState::default();
    samples
        .iter()
        .map(|&s| shelf_state.process(&shelf, hp_state.process(&high_pass, s)))
        .collect()
}

pub fn mean_square_to_lufs(mean_square: f64) -> f64 {
    -0.691 + 10.0 * mean_square.log10()
}

pub fn lufs_to_mean_square(lufs: f64) -> f64 {
    10f64.powf((lufs + 0.691) / 10.0)
}

/// Gain that brings `loudness_lufs` to `target_lufs`, limited to ±`max_db`.
pub fn suggested_pregain_db(loudness_lufs: f64, target_lufs: f64, max_db: f64) -> f64 {
    (target_lufs - loudness_lufs).clamp(-max_db, max_db)
}
