//! Linear crossfade between the two decks.

use serde::{Deserialize, Serialize};

use crate::deck::DeckId;

/// An in-flight transition from one deck to the other.
///
/// Gains follow `to = base * t / D` and `from = base * (1 - t / D)`, so
/// their sum is always `base`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeOperation {
    pub from_deck: DeckId,
    pub to_deck: DeckId,
    pub duration_seconds: f64,
    pub elapsed_seconds: f64,
}

impl CrossfadeOperation {
    pub fn new(from_deck: DeckId, duration_seconds: f64) -> Self {
        Self {
            from_deck,
            to_deck: from_deck.other(),
            duration_seconds: duration_seconds.max(0.0),
            elapsed_seconds: 0.0,
        }
    }

    /// Fraction complete, 0.0 to 1.0.
    pub fn progress(&self) -> f64 {
        if self.duration_seconds <= 0.0 {
            return 1.0;
        }
        (self.elapsed_seconds / self.duration_seconds).clamp(0.0, 1.0)
    }

    /// `(from_gain, to_gain)` at the current point of the ramp.
    pub fn gains(&self, base: f32) -> (f32, f32) {
        let t = self.progress() as f32;
        let to = base * t;
        (base - to, to)
    }

    /// Advance the ramp by `dt` seconds. Returns true once complete.
    pub fn advance(&mut self, dt: f64) -> bool {
        self.elapsed_seconds = (self.elapsed_seconds + dt.max(0.0)).min(self.duration_seconds);
        self.is_complete()
    }

    /// Jump to the end of the ramp.
    pub fn finish(&mut self) {
        self.elapsed_seconds = self.duration_seconds;
    }

    pub fn is_complete(&self) -> bool {
        self.progress() >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let mut fade = CrossfadeOperation::new(DeckId::A, 4.0);
        assert_eq!(fade.to_deck, DeckId::B);
        assert_eq!(fade.gains(1.0), (1.0, 0.0));

        assert!(fade.advance(10.0));
        assert_eq!(fade.gains(1.0), (0.0, 1.0));
        assert_eq!(fade.elapsed_seconds, 4.0);
    }

    #[test]
    fn test_gains_sum_to_base() {
        let base = 0.8;
        let mut fade = CrossfadeOperation::new(DeckId::B, 3.0);
        while !fade.advance(0.05) {
            let (from, to) = fade.gains(base);
            assert!((from + to - base).abs() < 1e-6);
            assert!(from >= 0.0 && to >= 0.0);
        }
        let (from, to) = fade.gains(base);
        assert_eq!(from, 0.0);
        assert!((to - base).abs() < 1e-6);
    }

    #[test]
    fn test_finish_and_zero_duration() {
        let mut fade = CrossfadeOperation::new(DeckId::A, 8.0);
        fade.advance(1.0);
        assert!(!fade.is_complete());
        fade.finish();
        assert!(fade.is_complete());

        let instant = CrossfadeOperation::new(DeckId::A, 0.0);
        assert!(instant.is_complete());
        assert_eq!(instant.gains(1.0), (0.0, 1.0));
    }

    #[test]
    fn test_negative_dt_ignored() {
        let mut fade = CrossfadeOperation::new(DeckId::A, 2.0);
        fade.advance(0.5);
        fade.advance(-1.0);
        assert_eq!(fade.elapsed_seconds, 0.5);
    }
}
