//! Small DSP building blocks shared by the analyzer and the mixer.

use std::f32::consts::PI;

/// Biquad filter coefficients, normalized so `a0 == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BiquadCoeffs {
    /// Pass-through filter.
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Peaking EQ. Gains below 0.01 dB bypass the filter.
    pub fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        if gain_db.abs() < 0.01 {
            return Self::IDENTITY;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_omega,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_omega,
            1.0 - alpha / a,
        )
    }

    /// Low shelf with unit shelf slope.
    pub fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        if gain_db.abs() < 0.01 {
            return Self::IDENTITY;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / 2.0 * 2.0_f32.sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
            a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
            (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha,
        )
    }

    /// High shelf with unit shelf slope.
    pub fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        if gain_db.abs() < 0.01 {
            return Self::IDENTITY;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / 2.0 * 2.0_f32.sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega),
            a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_omega),
            (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha,
        )
    }

    /// Second-order high-pass.
    pub fn high_pass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        Self::normalized(
            (1.0 + cos_omega) / 2.0,
            -(1.0 + cos_omega),
            (1.0 + cos_omega) / 2.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

/// Direct form I state for one channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    pub fn process(&mut self, coeffs: &BiquadCoeffs, input: f32) -> f32 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Run a whole buffer through one biquad.
pub fn filter_buffer(samples: &[f32], coeffs: &BiquadCoeffs) -> Vec<f32> {
    let mut state = BiquadState::default();
    samples.iter().map(|&s| state.process(coeffs, s)).collect()
}

/// One-pole low-pass.
pub fn one_pole_lowpass(samples: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    let dt = 1.0 / sample_rate as f32;
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let alpha = dt / (rc + dt);

    let mut y = 0.0f32;
    samples
        .iter()
        .map(|&x| {
            y += alpha * (x - y);
            y
        })
        .collect()
}

/// Symmetric Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Root mean square of a slice (0 for an empty slice).
pub fn rms(samples: &[f32]) -> f32 {
    mean_square(samples).sqrt() as f32
}

/// Mean of the squared samples, accumulated in f64.
pub fn mean_square(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / samples.len() as f64
}

/// Apply `f` to successive windows of `window` samples stepped by `hop`.
///
/// Only full windows are produced.
pub fn windowed<T>(samples: &[f32], window: usize, hop: usize, f: impl Fn(&[f32]) -> T) -> Vec<T> {
    if window == 0 || hop == 0 || samples.len() < window {
        return Vec::new();
    }
    (0..=samples.len() - window)
        .step_by(hop)
        .map(|start| f(&samples[start..start + window]))
        .collect()
}

/// Linear-interpolated percentile of already sorted values, `p` in 0..=1.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Sort a copy of the values and take a percentile.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

/// Median of the values.
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_bypass() {
        assert!(BiquadCoeffs::peaking(1000.0, 0.0, 1.2, 44100.0).is_identity());
        assert!(BiquadCoeffs::low_shelf(20.0, 0.005, 44100.0).is_identity());

        let mut state = BiquadState::default();
        assert_eq!(state.process(&BiquadCoeffs::IDENTITY, 0.42), 0.42);
    }

    #[test]
    fn test_peaking_gain_at_centre() {
        let sample_rate = 44100.0;
        let coeffs = BiquadCoeffs::peaking(1000.0, 6.0, 1.2, sample_rate);
        let tone: Vec<f32> = (0..44100)
            .map(|i| (2.0 * PI * 1000.0 * i as f32 / sample_rate).sin() * 0.25)
            .collect();
        let out = filter_buffer(&tone, &coeffs);

        // Skip the settling transient
        let gain_db = 20.0 * (rms(&out[4410..]) / rms(&tone[4410..])).log10();
        assert!((gain_db - 6.0).abs() < 0.2, "gain {}", gain_db);
    }

    #[test]
    fn test_high_pass_blocks_dc() {
        let coeffs = BiquadCoeffs::high_pass(38.0, 0.5, 48000.0);
        let out = filter_buffer(&vec![0.5; 48000], &coeffs);
        assert!(out[47999].abs() < 1e-3);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let out = one_pole_lowpass(&vec![1.0; 44100], 300.0, 44100);
        assert!((out[44099] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_percentiles() {
        let values = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(median(&values), 3.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 1.0), 5.0);
        assert_eq!(percentile(&values, 0.25), 2.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_windowed_full_windows_only() {
        let samples = vec![1.0; 10];
        let sums = windowed(&samples, 4, 2, |w| w.len());
        assert_eq!(sums, vec![4, 4, 4, 4]);
    }
}
