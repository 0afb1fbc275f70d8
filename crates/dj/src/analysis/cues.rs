//! Cue-in/out and hot cue detection.

use crate::config::AnalysisConfig;
use crate::dsp;
use crate::library::{CueLabel, HotCue};

/// Detected cue points.
#[derive(Debug, Clone, PartialEq)]
pub struct CuePoints {
    pub cue_in_seconds: f64,
    pub cue_out_seconds: f64,
    pub hot_cues: Vec<HotCue>,
}

/// Find cue-in, cue-out and up to `max_hot_cues` hot cues snapped to the beat.
pub fn detect_cues(
    samples: &[f32],
    sample_rate: u32,
    beat_interval_seconds: f64,
    config: &AnalysisConfig,
) -> CuePoints {
    let duration = samples.len() as f64 / sample_rate as f64;
    let window = ((config.cue_window_ms / 1000.0) * sample_rate as f64).round() as usize;
    let window_seconds = window as f64 / sample_rate as f64;

    let levels = dsp::windowed(samples, window, window, |w| {
        w.iter().map(|s| s.abs()).sum::<f32>() / w.len() as f32
    });
    if levels.is_empty() {
        return CuePoints {
            cue_in_seconds: 0.0,
            cue_out_seconds: duration,
            hot_cues: Vec::new(),
        };
    }

    let average = levels.iter().sum::<f32>() / levels.len() as f32;
    let threshold = average * config.cue_threshold_ratio;

    let first = levels.iter().position(|&l| l > threshold);
    let last = levels.iter().rposition(|&l| l > threshold);
    let (cue_in, cue_out) = match (first, last) {
        (Some(first), Some(last)) => (
            first as f64 * window_seconds,
            ((last + 1) as f64 * window_seconds).min(duration),
        ),
        _ => (0.0, duration),
    };

    let mut hot_cues: Vec<HotCue> = Vec::new();
    for i in 1..levels.len() {
        if hot_cues.len() >= config.max_hot_cues {
            break;
        }

        let level = levels[i];
        if level < levels[i - 1] * config.hot_cue_jump_ratio
            || level < average * config.hot_cue_level_ratio
        {
            continue;
        }

        let time = snap_to_beat(i as f64 * window_seconds, cue_in, beat_interval_seconds);
        if time - cue_in < config.hot_cue_edge_guard_seconds
            || cue_out - time < config.hot_cue_edge_guard_seconds
        {
            continue;
        }
        if hot_cues.iter().any(|c| (c.time_seconds - time).abs() < 1e-6) {
            continue;
        }

        hot_cues.push(HotCue::new(time, CueLabel::for_fraction(time / duration)));
    }

    log::debug!(
        "Cues: in {:.2}s, out {:.2}s, {} hot cues",
        cue_in,
        cue_out,
        hot_cues.len()
    );

    CuePoints {
        cue_in_seconds: cue_in,
        cue_out_seconds: cue_out,
        hot_cues,
    }
}

/// Snap to the nearest beat of a grid anchored at `anchor`.
fn snap_to_beat(time: f64, anchor: f64, beat_interval: f64) -> f64 {
    if beat_interval <= 0.0 || !beat_interval.is_finite() {
        return time;
    }
    anchor + ((time - anchor) / beat_interval).round() * beat_interval
}
