//! Offline audio feature analysis.
//!
//! Every detector is a pure function over a mono buffer and its sample rate.
//! [`analyze`] validates the buffer once and runs all of them; the
//! file-based helpers decode first, and [`spawn_analysis`] moves the whole
//! job onto the blocking pool so playback is never stalled.

mod cues;
mod energy;
mod key;
mod loudness;
mod tempo;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

pub use cues::{detect_cues, CuePoints};
pub use energy::detect_energy;
pub use key::{chromagram, detect_key, pitch_class, KeyEstimate};
pub use loudness::{measure_loudness, suggested_pregain_db, Loudness, SILENT_LUFS};
pub use tempo::{detect_tempo, TempoEstimate};

use crate::config::AnalysisConfig;
use crate::error::{DjError, Result};
use crate::library::{AnalysisResult, MediaDecoder, Track, TrackStore, ANALYSIS_ALGORITHM_VERSION};

/// Reject buffers too short or too quiet to analyze.
pub fn validate_buffer(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> Result<()> {
    if sample_rate == 0 {
        return Err(DjError::invalid("sample rate must be positive"));
    }

    let duration = samples.len() as f64 / sample_rate as f64;
    if duration < config.min_duration_seconds {
        return Err(DjError::insufficient(format!(
            "{:.2}s of audio, need at least {:.0}s",
            duration, config.min_duration_seconds
        )));
    }

    let silent = samples
        .iter()
        .filter(|s| s.abs() <= config.silence_threshold)
        .count();
    let silent_ratio = silent as f64 / samples.len() as f64;
    if silent_ratio > config.max_silence_ratio {
        return Err(DjError::insufficient(format!(
            "{:.1}% of the buffer is silent",
            silent_ratio * 100.0
        )));
    }

    Ok(())
}

/// Run every detector over a validated mono buffer.
pub fn analyze(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> Result<AnalysisResult> {
    validate_buffer(samples, sample_rate, config)?;

    let tempo = detect_tempo(samples, sample_rate, config);
    let key = detect_key(samples, sample_rate, config);
    let energy = detect_energy(samples, sample_rate, config);
    let loudness = measure_loudness(samples, sample_rate, config);
    let cues = detect_cues(samples, sample_rate, 60.0 / tempo.bpm, config);

    Ok(AnalysisResult {
        bpm: tempo.bpm,
        bpm_confidence: tempo.confidence,
        key: key.key,
        key_confidence: key.confidence,
        energy,
        loudness_lufs: loudness.lufs,
        loudness_range_lu: loudness.range_lu,
        cue_in_seconds: cues.cue_in_seconds,
        cue_out_seconds: cues.cue_out_seconds,
        hot_cues: cues.hot_cues,
        analyzed_at: Utc::now(),
        algorithm_version: ANALYSIS_ALGORITHM_VERSION.to_string(),
    })
}

/// Decode a file to mono and analyze it.
pub fn analyze_file(
    path: &Path,
    decoder: &dyn MediaDecoder,
    config: &AnalysisConfig,
) -> Result<AnalysisResult> {
    log::info!("Analyzing {:?}", path);
    let (samples, sample_rate) = decoder.decode_mono(path)?;
    let result = analyze(&samples, sample_rate, config)?;
    log::info!(
        "Analyzed {:?}: {:.1} BPM ({:.2}), {} ({:.2}), {:.1} LUFS",
        path,
        result.bpm,
        result.bpm_confidence,
        result.key,
        result.key_confidence,
        result.loudness_lufs
    );
    Ok(result)
}

/// Options for a background analysis job.
#[derive(Debug, Clone, Default)]
pub struct AnalysisJob {
    pub config: AnalysisConfig,
    /// Also store the suggested loudness compensation as the track's pregain.
    pub apply_pregain: bool,
}

/// Analyze a track on the blocking pool and publish the result to the store.
///
/// The store record is replaced only on success; a failed run leaves any
/// previous analysis in place.
pub fn spawn_analysis(
    path: PathBuf,
    decoder: Arc<dyn MediaDecoder>,
    store: Arc<TrackStore>,
    job: AnalysisJob,
) -> JoinHandle<Result<Arc<Track>>> {
    tokio::task::spawn_blocking(move || {
        let result = analyze_file(&path, decoder.as_ref(), &job.config).map_err(|e| {
            log::warn!("Analysis of {:?} failed: {}", path, e);
            e
        })?;

        let pregain = suggested_pregain_db(
            result.loudness_lufs,
            job.config.target_lufs,
            job.config.max_pregain_db,
        );

        if job.apply_pregain {
            log::debug!("Pregain for {:?} set to {:+.1} dB", path, pregain);
            return store.replace_analysis_with_pregain(&path, result, pregain);
        }
        store.replace_analysis(&path, result)
    })
}
