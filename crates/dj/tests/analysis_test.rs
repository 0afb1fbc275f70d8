//! End-to-end analysis of synthesized WAV files.
//!
//! Each test renders a signal with a known tempo, pitch or level to a
//! temporary WAV file, decodes it through symphonia and checks the detectors
//! recover it.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use twindeck_dj::analysis::{detect_key, measure_loudness, suggested_pregain_db};
use twindeck_dj::library::KeyMode;
use twindeck_dj::{
    analyze_file, spawn_analysis, AnalysisConfig, AnalysisJob, MediaDecoder, MusicalKey,
    SymphoniaDecoder, Track, TrackStore,
};

const SAMPLE_RATE: u32 = 22050;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_wav(dir: &TempDir, name: &str, channels: u16, samples: &[f32]) -> PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Decaying 60 Hz bursts on every beat.
fn click_track(bpm: f64, seconds: f64) -> Vec<f32> {
    let len = (seconds * SAMPLE_RATE as f64) as usize;
    let beat = (60.0 / bpm * SAMPLE_RATE as f64) as usize;
    let burst = SAMPLE_RATE as usize / 20;
    (0..len)
        .map(|i| {
            let offset = i % beat;
            if offset < burst {
                let t = offset as f32 / SAMPLE_RATE as f32;
                (2.0 * PI * 60.0 * t).sin() * (-t * 30.0).exp() * 0.8
            } else {
                0.0
            }
        })
        .collect()
}

fn sine(freq: f32, amplitude: f32, seconds: f32) -> Vec<f32> {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    (0..len)
        .map(|i| (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin() * amplitude)
        .collect()
}

fn decode_mono(path: &Path) -> Vec<f32> {
    let (samples, sample_rate) = SymphoniaDecoder.decode_mono(path).unwrap();
    assert_eq!(sample_rate, SAMPLE_RATE);
    samples
}

#[test]
fn test_decode_stereo_wav() {
    let dir = TempDir::new().unwrap();
    let interleaved: Vec<f32> = sine(440.0, 0.5, 2.0)
        .into_iter()
        .flat_map(|s| [s, -s])
        .collect();
    let path = write_wav(&dir, "stereo.wav", 2, &interleaved);

    let audio = SymphoniaDecoder.decode(&path).unwrap();
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.sample_rate, SAMPLE_RATE);
    assert!((audio.duration_seconds() - 2.0).abs() < 0.01);

    // Opposite channels cancel in the mono downmix
    let mono = audio.to_mono();
    assert!(mono.iter().all(|s| s.abs() < 1e-3));
}

#[test]
fn test_click_track_tempo() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "click.wav", 1, &click_track(128.0, 20.0));

    let result = analyze_file(&path, &SymphoniaDecoder, &AnalysisConfig::default()).unwrap();
    assert!((result.bpm - 128.0).abs() < 2.0, "bpm {}", result.bpm);
    assert!(result.bpm_confidence > 0.5);
    assert!(result.cue_in_seconds <= result.cue_out_seconds);
    assert!(result.cue_out_seconds <= 20.0 + 1e-6);
    assert!(result.loudness_lufs < 0.0);
}

#[test]
fn test_pure_tone_key_root() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "a3.wav", 1, &sine(220.0, 0.5, 12.0));

    let samples = decode_mono(&path);
    let estimate = detect_key(&samples, SAMPLE_RATE, &AnalysisConfig::default());
    // A lone tonic fits both modes equally; ties go to major
    assert_eq!(estimate.key, MusicalKey::new(9, KeyMode::Major));
    assert!(estimate.confidence > 0.5, "confidence {}", estimate.confidence);
}

#[test]
fn test_sine_loudness_from_file() {
    let dir = TempDir::new().unwrap();
    let amplitude = 0.5f32;
    let path = write_wav(&dir, "tone.wav", 1, &sine(500.0, amplitude, 12.0));

    let samples = decode_mono(&path);
    let loudness = measure_loudness(&samples, SAMPLE_RATE, &AnalysisConfig::default());
    let rms = amplitude as f64 / 2f64.sqrt();
    let expected = -0.691 + 10.0 * (rms * rms).log10();
    assert!((loudness.lufs - expected).abs() < 1.0, "lufs {}", loudness.lufs);
}

#[test]
fn test_short_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "short.wav", 1, &sine(440.0, 0.5, 5.0));

    let err = analyze_file(&path, &SymphoniaDecoder, &AnalysisConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "insufficient_audio");
    assert!(err.is_recoverable());
}

#[test]
fn test_silent_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "silence.wav", 1, &vec![0.0; SAMPLE_RATE as usize * 20]);

    let err = analyze_file(&path, &SymphoniaDecoder, &AnalysisConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "insufficient_audio");
}

#[test]
fn test_unreadable_file_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not audio").unwrap();

    let err = analyze_file(&path, &SymphoniaDecoder, &AnalysisConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn test_background_analysis_sets_pregain_with_result() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "set.wav", 1, &click_track(124.0, 20.0));
    let store = Arc::new(TrackStore::new());
    store.insert(Track::new(&path, 20.0));

    let job = AnalysisJob {
        config: AnalysisConfig::default(),
        apply_pregain: true,
    };
    let track = spawn_analysis(path.clone(), Arc::new(SymphoniaDecoder), Arc::clone(&store), job)
        .await
        .unwrap()
        .unwrap();

    let analysis = track.analysis.as_ref().unwrap();
    let config = AnalysisConfig::default();
    let expected = suggested_pregain_db(
        analysis.loudness_lufs,
        config.target_lufs,
        config.max_pregain_db,
    );
    assert_eq!(track.pregain_db, expected);
    assert!(Arc::ptr_eq(&track, &store.get(&path).unwrap()));
}
