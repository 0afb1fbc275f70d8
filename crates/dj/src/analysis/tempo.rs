//! Tempo detection from low-frequency energy peaks.

use crate::config::AnalysisConfig;
use crate::dsp;

/// Detected tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f64,
    /// 0.0-0.95.
    pub confidence: f32,
}

/// Detected intervals within this fraction of the median count as agreeing.
const AGREEMENT_TOLERANCE: f64 = 0.15;
const MAX_CONFIDENCE: f32 = 0.95;
/// Share of intervals at twice the beat needed before a 120-140 BPM
/// estimate is treated as double time.
const HALF_TIME_EVIDENCE: f64 = 0.25;

/// Estimate the tempo of a mono buffer.
///
/// Falls back to `config.fallback_bpm` at low confidence when fewer than
/// three energy peaks are found.
pub fn detect_tempo(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> TempoEstimate {
    let fallback = TempoEstimate {
        bpm: config.fallback_bpm,
        confidence: config.fallback_bpm_confidence,
    };

    let peaks = peak_times(samples, sample_rate, config);
    if peaks.len() < 3 {
        log::debug!("Tempo: {} peaks, using fallback", peaks.len());
        return fallback;
    }

    let raw: Vec<f64> = peaks.windows(2).map(|w| w[1] - w[0]).collect();
    let intervals = filter_intervals(&raw, config);
    if intervals.is_empty() {
        return fallback;
    }

    let median = dsp::median(&intervals);
    let agreeing: Vec<f64> = intervals
        .iter()
        .copied()
        .filter(|i| (i - median).abs() <= median * AGREEMENT_TOLERANCE)
        .collect();

    // Peaks are quantized to the window hop; the mean of the agreeing
    // intervals recovers the beat period between hop positions.
    let beat_interval = if agreeing.is_empty() {
        median
    } else {
        agreeing.iter().sum::<f64>() / agreeing.len() as f64
    };

    let confidence =
        ((agreeing.len() as f64 / intervals.len() as f64) as f32).min(MAX_CONFIDENCE);

    let half_time_share = raw
        .iter()
        .filter(|i| (*i - 2.0 * beat_interval).abs() <= 2.0 * beat_interval * AGREEMENT_TOLERANCE)
        .count() as f64
        / raw.len() as f64;

    let bpm = octave_correct(60.0 / beat_interval, half_time_share)
        .clamp(config.min_bpm, config.max_bpm);

    log::debug!(
        "Tempo: {} peaks, {} intervals, median {:.3}s, bpm {:.2}, confidence {:.2}",
        peaks.len(),
        intervals.len(),
        median,
        bpm,
        confidence
    );

    TempoEstimate { bpm, confidence }
}

/// Fold double-time detections back into the plausible range.
fn octave_correct(bpm: f64, half_time_share: f64) -> f64 {
    if bpm > 160.0 {
        return bpm / 2.0;
    }
    if bpm > 120.0 && bpm < 140.0 {
        let half = bpm / 2.0;
        if (60.0..=80.0).contains(&half) && half_time_share >= HALF_TIME_EVIDENCE {
            return half;
        }
    }
    bpm
}

/// Timestamps (seconds) of accepted energy peaks in the low band.
fn peak_times(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> Vec<f64> {
    let filtered = dsp::one_pole_lowpass(samples, config.tempo_lowpass_hz, sample_rate);

    let window = ((config.tempo_window_ms / 1000.0) * sample_rate as f64).round() as usize;
    let hop = (window / 2).max(1);
    let energies = dsp::windowed(&filtered, window, hop, dsp::rms);
    if energies.is_empty() {
        return Vec::new();
    }

    let hop_seconds = hop as f64 / sample_rate as f64;
    let window_seconds = window as f64 / sample_rate as f64;
    let min_spacing = config.peak_neighborhood_ms / 1000.0;
    let reach = (min_spacing / hop_seconds).round() as usize;

    let mean = energies.iter().sum::<f32>() / energies.len() as f32;
    let threshold = mean * config.peak_threshold_ratio;

    let mut peaks: Vec<f64> = Vec::new();
    for (i, &energy) in energies.iter().enumerate() {
        if energy <= threshold {
            continue;
        }

        let lo = i.saturating_sub(reach);
        let hi = (i + reach).min(energies.len() - 1);
        if energies[lo..=hi].iter().any(|&e| e > energy) {
            continue;
        }

        let time = i as f64 * hop_seconds + window_seconds / 2.0;
        if let Some(&last) = peaks.last() {
            if time - last < min_spacing {
                continue;
            }
        }
        peaks.push(time);
    }

    peaks
}

/// Drop IQR outliers and intervals outside the plausible beat range.
fn filter_intervals(intervals: &[f64], config: &AnalysisConfig) -> Vec<f64> {
    let mut sorted = intervals.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = dsp::percentile_sorted(&sorted, 0.25);
    let q3 = dsp::percentile_sorted(&sorted, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    intervals
        .iter()
        .copied()
        .filter(|i| *i >= lower && *i <= upper)
        .filter(|i| *i >= config.min_interval_seconds && *i <= config.max_interval_seconds)
        .collect()
}
