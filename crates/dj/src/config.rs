//! Engine and analyzer settings with a JSON-backed configuration manager.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DjError, Result};
use crate::queue::PlayMode;

/// Shortest crossfade the engine will run, in seconds.
pub const MIN_CROSSFADE_SECONDS: f64 = 0.05;
/// Longest crossfade the engine will run, in seconds.
pub const MAX_CROSSFADE_SECONDS: f64 = 60.0;

/// Playback engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Crossfade length in seconds.
    pub crossfade_seconds: f64,
    /// Crossfade ramp tick interval in milliseconds (~20 Hz).
    pub crossfade_tick_ms: u64,
    /// Position polling interval in milliseconds (~5 Hz).
    pub position_tick_ms: u64,
    /// Auto-DJ: advance to the next queue entry before the current one ends.
    pub auto_dj: bool,
    /// Apply each track's pregain at load time.
    pub normalize: bool,
    /// Queue play order.
    pub play_mode: PlayMode,
    /// Channel level a deck rests at when it is the active deck (crossfade base).
    pub channel_level: f32,
    /// Main bus output volume (0.0-1.0).
    pub master_volume: f32,
    /// Level of the main mix in the headphone bus.
    pub cue_mix_main: f32,
    /// Level of the cued deck(s) in the headphone bus.
    pub cue_mix_cue: f32,
    /// Fixed attenuation before the main output, in dB.
    pub master_headroom_db: f32,
    /// Output device name (empty for the system default).
    pub device_name: String,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channels for the main bus (left, right).
    pub main_channels: (u16, u16),
    /// Output channels for the cue bus (left, right).
    pub cue_channels: (u16, u16),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crossfade_seconds: 8.0,
            crossfade_tick_ms: 50,
            position_tick_ms: 200,
            auto_dj: true,
            normalize: true,
            play_mode: PlayMode::InOrder,
            channel_level: 1.0,
            master_volume: 1.0,
            cue_mix_main: 0.5,
            cue_mix_cue: 1.0,
            master_headroom_db: -6.0,
            device_name: String::new(),
            sample_rate: 44100,
            // Main mix on outputs 1-2, headphones on outputs 3-4
            main_channels: (0, 1),
            cue_channels: (2, 3),
        }
    }
}

impl EngineConfig {
    /// Check every field and report all violations at once.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(MIN_CROSSFADE_SECONDS..=MAX_CROSSFADE_SECONDS).contains(&self.crossfade_seconds) {
            errors.push(format!(
                "crossfade_seconds {} outside {}..={}",
                self.crossfade_seconds, MIN_CROSSFADE_SECONDS, MAX_CROSSFADE_SECONDS
            ));
        }
        if self.crossfade_tick_ms == 0 || self.crossfade_tick_ms > 1000 {
            errors.push(format!("crossfade_tick_ms {} outside 1..=1000", self.crossfade_tick_ms));
        }
        if self.position_tick_ms == 0 || self.position_tick_ms > 5000 {
            errors.push(format!("position_tick_ms {} outside 1..=5000", self.position_tick_ms));
        }
        for (name, value) in [
            ("channel_level", self.channel_level),
            ("master_volume", self.master_volume),
            ("cue_mix_main", self.cue_mix_main),
            ("cue_mix_cue", self.cue_mix_cue),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{} {} outside 0.0..=1.0", name, value));
            }
        }
        if !(-24.0..=0.0).contains(&self.master_headroom_db) {
            errors.push(format!(
                "master_headroom_db {} outside -24..=0",
                self.master_headroom_db
            ));
        }
        if !(8000..=192_000).contains(&self.sample_rate) {
            errors.push(format!("sample_rate {} outside 8000..=192000", self.sample_rate));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Analyzer constants. Defaults reproduce the documented detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Shortest buffer accepted for analysis, in seconds.
    pub min_duration_seconds: f64,
    /// Samples with |x| at or below this count as silent.
    pub silence_threshold: f32,
    /// Fraction of silent samples above which analysis is refused.
    pub max_silence_ratio: f64,

    /// Tempo: one-pole low-pass cutoff in Hz.
    pub tempo_lowpass_hz: f32,
    /// Tempo: RMS window length in milliseconds (50% hop).
    pub tempo_window_ms: f64,
    /// Tempo: a peak must exceed this multiple of the mean window energy.
    pub peak_threshold_ratio: f32,
    /// Tempo: local-maximum neighbourhood and minimum peak spacing in ms.
    pub peak_neighborhood_ms: f64,
    /// Tempo: plausible inter-peak interval range in seconds.
    pub min_interval_seconds: f64,
    pub max_interval_seconds: f64,
    /// Tempo: final clamp range.
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Tempo returned when too few peaks are found.
    pub fallback_bpm: f64,
    pub fallback_bpm_confidence: f32,

    /// Key: analysis frame size in samples.
    pub key_frame_size: usize,
    /// Key: hop between frames in samples (75% overlap of the frame).
    pub key_hop_size: usize,
    /// Key: musical range accumulated into the chromagram, in Hz.
    pub key_min_hz: f32,
    pub key_max_hz: f32,

    /// Energy: RMS window length in milliseconds.
    pub energy_window_ms: f64,

    /// Loudness: block length in milliseconds.
    pub loudness_block_ms: f64,
    /// Loudness: block overlap (0.75 = 75%).
    pub loudness_overlap: f64,
    /// Loudness: absolute gate in LUFS.
    pub loudness_gate_lufs: f64,
    /// Target loudness used to suggest a pregain.
    pub target_lufs: f64,
    /// Largest pregain correction suggested, in dB.
    pub max_pregain_db: f64,

    /// Cues: amplitude window length in milliseconds.
    pub cue_window_ms: f64,
    /// Cues: cue-in/out threshold as a fraction of the average amplitude.
    pub cue_threshold_ratio: f32,
    /// Hot cues: minimum jump relative to the previous window.
    pub hot_cue_jump_ratio: f32,
    /// Hot cues: minimum level relative to the track average.
    pub hot_cue_level_ratio: f32,
    /// Hot cues: candidates this close to cue-in/out are dropped, in seconds.
    pub hot_cue_edge_guard_seconds: f64,
    /// Hot cues: maximum number kept.
    pub max_hot_cues: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_duration_seconds: 10.0,
            silence_threshold: 1e-4,
            max_silence_ratio: 0.95,
            tempo_lowpass_hz: 300.0,
            tempo_window_ms: 100.0,
            peak_threshold_ratio: 1.5,
            peak_neighborhood_ms: 300.0,
            min_interval_seconds: 0.3,
            max_interval_seconds: 2.0,
            min_bpm: 50.0,
            max_bpm: 180.0,
            fallback_bpm: 80.0,
            fallback_bpm_confidence: 0.3,
            key_frame_size: 16384,
            key_hop_size: 4096,
            key_min_hz: 80.0,
            key_max_hz: 2000.0,
            energy_window_ms: 250.0,
            loudness_block_ms: 400.0,
            loudness_overlap: 0.75,
            loudness_gate_lufs: -70.0,
            target_lufs: -14.0,
            max_pregain_db: 12.0,
            cue_window_ms: 500.0,
            cue_threshold_ratio: 0.3,
            hot_cue_jump_ratio: 1.5,
            hot_cue_level_ratio: 1.2,
            hot_cue_edge_guard_seconds: 8.0,
            max_hot_cues: 8,
        }
    }
}

impl AnalysisConfig {
    /// Check the settings that would make a detector degenerate.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if !self.key_frame_size.is_power_of_two() {
            errors.push(format!("key_frame_size {} is not a power of two", self.key_frame_size));
        }
        if self.key_hop_size == 0 || self.key_hop_size > self.key_frame_size {
            errors.push(format!("key_hop_size {} outside 1..=frame", self.key_hop_size));
        }
        if !(0.0..1.0).contains(&self.loudness_overlap) {
            errors.push(format!("loudness_overlap {} outside 0..1", self.loudness_overlap));
        }
        if self.min_bpm >= self.max_bpm {
            errors.push(format!("min_bpm {} >= max_bpm {}", self.min_bpm, self.max_bpm));
        }
        for (name, value) in [
            ("tempo_window_ms", self.tempo_window_ms),
            ("energy_window_ms", self.energy_window_ms),
            ("loudness_block_ms", self.loudness_block_ms),
            ("cue_window_ms", self.cue_window_ms),
        ] {
            if value <= 0.0 {
                errors.push(format!("{} must be positive", name));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// All persisted settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
}

/// Persisted configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

/// Loads and saves [`Settings`] as versioned JSON.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
    created_at: Option<String>,
}

impl ConfigManager {
    /// Create a manager for the given path, or the per-user default
    /// (`<config dir>/twindeck/config.json`).
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(default_config_path);
        Self {
            config_path,
            settings: Settings::default(),
            created_at: None,
        }
    }

    /// Load settings, writing defaults when the file does not exist yet.
    pub fn load(&mut self) -> Result<Settings> {
        if !self.config_path.exists() {
            log::info!("No config at {:?}, writing defaults", self.config_path);
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| DjError::Config(format!("failed to read config file: {}", e)))?;
        let config_file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| DjError::Config(format!("failed to parse config file: {}", e)))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match application version {}; missing settings use defaults",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        self.settings = config_file.settings;
        self.created_at = Some(config_file.created_at);
        self.validate()?;
        Ok(self.settings.clone())
    }

    /// Write the current settings.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| {
                    DjError::Config(format!("failed to create config directory: {}", e))
                })?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: self.created_at.clone().unwrap_or_else(|| now.clone()),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| DjError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&self.config_path, content)
            .map_err(|e| DjError::Config(format!("failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Replace the settings and persist them.
    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.validate()?;
        self.save()
    }

    /// Validate both engine and analyzer settings.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(e) = self.settings.engine.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.settings.analysis.validate() {
            errors.extend(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DjError::Config(format!(
                "validation errors: {}",
                errors.join(", ")
            )))
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("twindeck")
        .join("config.json")
}
