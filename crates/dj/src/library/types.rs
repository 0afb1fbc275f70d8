//! Core library types for the DJ engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version tag stored with every analysis result.
pub const ANALYSIS_ALGORITHM_VERSION: &str = "2.0";

/// Pitch class names, C = 0.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Major or minor tonality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    Major,
    Minor,
}

/// One of the 24 tonal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MusicalKey {
    /// Pitch class of the tonic (0 = C, 9 = A).
    pub root: u8,
    pub mode: KeyMode,
}

impl MusicalKey {
    pub fn new(root: u8, mode: KeyMode) -> Self {
        Self {
            root: root % 12,
            mode,
        }
    }

    /// Label such as "A minor".
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Short label such as "Am" or "F#".
    pub fn short_label(&self) -> String {
        match self.mode {
            KeyMode::Major => NOTE_NAMES[self.root as usize].to_string(),
            KeyMode::Minor => format!("{}m", NOTE_NAMES[self.root as usize]),
        }
    }

    /// Camelot wheel code ("8A" for A minor, "8B" for C major).
    pub fn camelot(&self) -> String {
        let major_number = |root: u8| (root as u32 * 7 + 7) % 12 + 1;
        match self.mode {
            KeyMode::Major => format!("{}B", major_number(self.root)),
            // The relative major sits three semitones above the minor tonic
            KeyMode::Minor => format!("{}A", major_number((self.root + 3) % 12)),
        }
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            KeyMode::Major => "major",
            KeyMode::Minor => "minor",
        };
        write!(f, "{} {}", NOTE_NAMES[self.root as usize], mode)
    }
}

/// Section label assigned to a hot cue by its position in the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CueLabel {
    Intro,
    Verse,
    Chorus,
    Outro,
}

impl CueLabel {
    /// Label for a position expressed as a fraction of the track (0.0-1.0).
    pub fn for_fraction(fraction: f64) -> Self {
        match fraction {
            f if f < 0.25 => Self::Intro,
            f if f < 0.5 => Self::Verse,
            f if f < 0.75 => Self::Chorus,
            _ => Self::Outro,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "Intro",
            Self::Verse => "Verse",
            Self::Chorus => "Chorus",
            Self::Outro => "Outro",
        }
    }
}

impl fmt::Display for CueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hot cue point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HotCue {
    /// Position in seconds.
    pub time_seconds: f64,
    pub label: CueLabel,
}

impl HotCue {
    pub fn new(time_seconds: f64, label: CueLabel) -> Self {
        Self {
            time_seconds,
            label,
        }
    }
}

/// Output of the feature analyzer for one track.
///
/// Written once per analysis run and never edited in place; a new run
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub bpm: f64,
    /// Tempo confidence (0.0-1.0).
    pub bpm_confidence: f32,
    pub key: MusicalKey,
    /// Key confidence (0.0-1.0).
    pub key_confidence: f32,
    /// Loudness-density score (0.1-1.0).
    pub energy: f32,
    /// Integrated loudness in LUFS.
    pub loudness_lufs: f64,
    /// Loudness range in LU.
    pub loudness_range_lu: f64,
    pub cue_in_seconds: f64,
    pub cue_out_seconds: f64,
    /// Up to eight cues, in the order they were found.
    pub hot_cues: Vec<HotCue>,
    /// When the analysis was performed.
    pub analyzed_at: DateTime<Utc>,
    /// Version of the analysis algorithm.
    pub algorithm_version: String,
}

impl AnalysisResult {
    /// Beat interval in seconds.
    pub fn beat_interval_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Hot cue at the given slot.
    pub fn hot_cue(&self, slot: usize) -> Option<&HotCue> {
        self.hot_cues.get(slot)
    }
}

/// Audio track record handed to the engine by the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Absolute path to the audio file; identifies the track.
    pub path: PathBuf,
    /// Track duration in seconds.
    pub duration_seconds: f64,
    /// Leading silence trimmed from playback, in seconds.
    pub start_cut_seconds: f64,
    /// Trailing silence trimmed from playback, in seconds.
    pub end_cut_seconds: f64,
    /// Loudness compensation applied at load time, in dB.
    pub pregain_db: f64,
    /// Latest analysis, if any.
    pub analysis: Option<Arc<AnalysisResult>>,
}

impl Track {
    /// Create an untrimmed, unanalyzed track.
    pub fn new(path: impl Into<PathBuf>, duration_seconds: f64) -> Self {
        Self {
            path: path.into(),
            duration_seconds,
            start_cut_seconds: 0.0,
            end_cut_seconds: 0.0,
            pregain_db: 0.0,
            analysis: None,
        }
    }

    pub fn with_cuts(mut self, start_cut_seconds: f64, end_cut_seconds: f64) -> Self {
        self.start_cut_seconds = start_cut_seconds.max(0.0);
        self.end_cut_seconds = end_cut_seconds.max(0.0);
        self
    }

    pub fn with_pregain(mut self, pregain_db: f64) -> Self {
        self.pregain_db = pregain_db;
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisResult) -> Self {
        self.analysis = Some(Arc::new(analysis));
        self
    }

    /// Position where trimmed playback ends.
    pub fn playable_end_seconds(&self) -> f64 {
        (self.duration_seconds - self.end_cut_seconds).max(self.start_cut_seconds)
    }

    /// Linear pregain factor.
    pub fn pregain_linear(&self) -> f32 {
        db_to_linear(self.pregain_db as f32)
    }

    /// File name without extension, for display.
    pub fn display_name(&self) -> String {
        file_stem(&self.path)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

/// Convert decibels to a linear gain factor.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_labels() {
        let a_minor = MusicalKey::new(9, KeyMode::Minor);
        assert_eq!(a_minor.label(), "A minor");
        assert_eq!(a_minor.short_label(), "Am");
        assert_eq!(a_minor.camelot(), "8A");

        let c_major = MusicalKey::new(0, KeyMode::Major);
        assert_eq!(c_major.label(), "C major");
        assert_eq!(c_major.camelot(), "8B");

        assert_eq!(MusicalKey::new(7, KeyMode::Major).camelot(), "9B");
        assert_eq!(MusicalKey::new(5, KeyMode::Major).camelot(), "7B");
        assert_eq!(MusicalKey::new(4, KeyMode::Minor).camelot(), "9A");
        assert_eq!(MusicalKey::new(1, KeyMode::Minor).camelot(), "12A");
    }

    #[test]
    fn test_cue_label_quartiles() {
        assert_eq!(CueLabel::for_fraction(0.1), CueLabel::Intro);
        assert_eq!(CueLabel::for_fraction(0.3), CueLabel::Verse);
        assert_eq!(CueLabel::for_fraction(0.6), CueLabel::Chorus);
        assert_eq!(CueLabel::for_fraction(0.9), CueLabel::Outro);
    }

    #[test]
    fn test_track_window() {
        let track = Track::new("/music/a.flac", 200.0).with_cuts(1.5, 4.0);
        assert!((track.playable_end_seconds() - 196.0).abs() < 1e-9);
        assert_eq!(track.display_name(), "a");

        let track = track.with_pregain(-6.0);
        assert!((track.pregain_linear() - 0.501).abs() < 0.001);
    }
}
