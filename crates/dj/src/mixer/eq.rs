//! 16-band channel equalizer.
//!
//! Band 0 is a low shelf, band 15 a high shelf, everything between is a
//! peaking filter. With every band at 0 dB all filters are bypassed and the
//! equalizer is exactly unity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::{BiquadCoeffs, BiquadState};
use crate::error::{DjError, Result};

pub const EQ_BAND_COUNT: usize = 16;

/// Band centre frequencies in Hz.
pub const EQ_CENTER_FREQUENCIES: [f32; EQ_BAND_COUNT] = [
    20.0, 32.0, 50.0, 80.0, 125.0, 200.0, 315.0, 500.0, 800.0, 1250.0, 2000.0, 3150.0, 5000.0,
    8000.0, 12500.0, 16000.0,
];

/// Quality factor of the peaking bands.
pub const EQ_Q: f32 = 1.2;

pub const EQ_MIN_DB: f32 = -12.0;
pub const EQ_MAX_DB: f32 = 12.0;

/// Check a band index and gain before touching any state.
pub fn check_band(band: usize, gain_db: f32) -> Result<()> {
    if band >= EQ_BAND_COUNT {
        return Err(DjError::invalid(format!(
            "EQ band {} out of range 0..{}",
            band, EQ_BAND_COUNT
        )));
    }
    if !gain_db.is_finite() || !(EQ_MIN_DB..=EQ_MAX_DB).contains(&gain_db) {
        return Err(DjError::invalid(format!(
            "EQ gain {} dB outside {}..={} dB",
            gain_db, EQ_MIN_DB, EQ_MAX_DB
        )));
    }
    Ok(())
}

/// Named band-gain curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EqPreset {
    Flat,
    BassBoost,
    TrebleBoost,
    Vocal,
    Loudness,
    Rock,
    Jazz,
    Classical,
}

impl EqPreset {
    pub const ALL: [EqPreset; 8] = [
        EqPreset::Flat,
        EqPreset::BassBoost,
        EqPreset::TrebleBoost,
        EqPreset::Vocal,
        EqPreset::Loudness,
        EqPreset::Rock,
        EqPreset::Jazz,
        EqPreset::Classical,
    ];

    pub fn gains(&self) -> [f32; EQ_BAND_COUNT] {
        match self {
            Self::Flat => [0.0; EQ_BAND_COUNT],
            Self::BassBoost => [
                6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0, 0.0, -1.0, -2.0, -3.0, -4.0, -5.0, -6.0, -6.0,
                -6.0,
            ],
            Self::TrebleBoost => [
                -4.0, -3.0, -2.0, -1.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 6.0, 6.0, 5.0, 4.0,
            ],
            Self::Vocal => [
                -2.0, -2.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 3.0, 1.0, 0.0, -1.0, -2.0,
                -3.0,
            ],
            Self::Loudness => [
                5.0, 4.0, 3.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 4.0,
            ],
            Self::Rock => [
                3.0, 2.0, 1.0, 0.0, -1.0, 0.0, 2.0, 3.0, 3.0, 2.0, 0.0, -1.0, 0.0, 1.0, 2.0, 3.0,
            ],
            Self::Jazz => [
                0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 1.0, 0.0, 0.0, 1.0, 2.0, 2.0, 1.0, 1.0, 0.0, 0.0,
            ],
            Self::Classical => [
                -1.0, -1.0, 0.0, 1.0, 2.0, 2.0, 1.0, 0.0, 0.0, 1.0, 2.0, 2.0, 1.0, 0.0, -1.0, -1.0,
            ],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Flat => "Flat",
            Self::BassBoost => "Bass Boost",
            Self::TrebleBoost => "Treble Boost",
            Self::Vocal => "Vocal",
            Self::Loudness => "Loudness",
            Self::Rock => "Rock",
            Self::Jazz => "Jazz",
            Self::Classical => "Classical",
        }
    }
}

impl fmt::Display for EqPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EqPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|preset| preset.name().replace(' ', "").to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown EQ preset '{}'", s))
    }
}

/// Stereo 16-band equalizer.
#[derive(Debug, Clone)]
pub struct Equalizer {
    sample_rate: f32,
    gains: [f32; EQ_BAND_COUNT],
    coeffs: [BiquadCoeffs; EQ_BAND_COUNT],
    /// Filter state per channel, per band.
    states: [[BiquadState; EQ_BAND_COUNT]; 2],
    flat: bool,
}

impl Equalizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            gains: [0.0; EQ_BAND_COUNT],
            coeffs: [BiquadCoeffs::IDENTITY; EQ_BAND_COUNT],
            states: [[BiquadState::default(); EQ_BAND_COUNT]; 2],
            flat: true,
        }
    }

    pub fn gains(&self) -> [f32; EQ_BAND_COUNT] {
        self.gains
    }

    pub fn is_flat(&self) -> bool {
        self.flat
    }

    /// Set one band. Gains are clamped to the band range.
    pub fn set_band(&mut self, band: usize, gain_db: f32) {
        if band >= EQ_BAND_COUNT {
            return;
        }
        self.gains[band] = gain_db.clamp(EQ_MIN_DB, EQ_MAX_DB);
        self.coeffs[band] = band_coeffs(band, self.gains[band], self.sample_rate);
        self.flat = self.coeffs.iter().all(BiquadCoeffs::is_identity);
    }

    pub fn set_gains(&mut self, gains: [f32; EQ_BAND_COUNT]) {
        for (band, gain) in gains.into_iter().enumerate() {
            self.set_band(band, gain);
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        let gains = self.gains;
        self.set_gains(gains);
        self.reset();
    }

    pub fn reset(&mut self) {
        for channel in &mut self.states {
            for state in channel.iter_mut() {
                state.reset();
            }
        }
    }

    /// Filter one stereo frame.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        if self.flat {
            return (left, right);
        }

        let mut l = left;
        let mut r = right;
        for (band, coeffs) in self.coeffs.iter().enumerate() {
            if coeffs.is_identity() {
                continue;
            }
            l = self.states[0][band].process(coeffs, l);
            r = self.states[1][band].process(coeffs, r);
        }
        (l, r)
    }
}

fn band_coeffs(band: usize, gain_db: f32, sample_rate: f32) -> BiquadCoeffs {
    // Keep every centre below Nyquist at low output rates
    let freq = EQ_CENTER_FREQUENCIES[band].min(sample_rate * 0.45);
    match band {
        0 => BiquadCoeffs::low_shelf(freq, gain_db, sample_rate),
        b if b == EQ_BAND_COUNT - 1 => BiquadCoeffs::high_shelf(freq, gain_db, sample_rate),
        _ => BiquadCoeffs::peaking(freq, gain_db, EQ_Q, sample_rate),
    }
}
