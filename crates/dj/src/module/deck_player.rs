//! Deck audio player for sample-by-sample playback.
//!
//! Plays a fully decoded track at the output sample rate. Rate conversion is
//! varispeed with linear interpolation between neighbouring source frames.

use crate::deck::DeckId;
use crate::library::DecodedAudio;

/// State of the deck player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No audio loaded.
    Empty,
    /// Audio loaded, not playing.
    Ready,
    /// Currently playing.
    Playing,
    /// Paused.
    Paused,
}

/// Audio source for one deck, pulled by the audio callback.
pub struct DeckPlayer {
    /// Deck identifier.
    deck_id: DeckId,
    /// Current player state.
    state: PlayerState,
    /// Decoded track.
    audio: Option<DecodedAudio>,
    /// Output sample rate of the device.
    output_rate: u32,
    /// Source frames advanced per output frame.
    step: f64,
    /// Read position in source frames, fractional part used for interpolation.
    position: f64,
    /// Frame where playback stops (trimmed end).
    end_frame: usize,
    /// Set when playback ran into `end_frame`, cleared by `take_ended`.
    ended: bool,
}

impl DeckPlayer {
    /// Create a new deck player.
    pub fn new(deck_id: DeckId, output_rate: u32) -> Self {
        Self {
            deck_id,
            state: PlayerState::Empty,
            audio: None,
            output_rate: output_rate.max(1),
            step: 1.0,
            position: 0.0,
            end_frame: 0,
            ended: false,
        }
    }

    /// Install decoded audio. Playback is limited to `end_seconds`.
    pub fn load(&mut self, audio: DecodedAudio, end_seconds: f64) {
        self.step = audio.sample_rate as f64 / self.output_rate as f64;
        self.end_frame = Self::frame_at(&audio, end_seconds);
        log::debug!(
            "Deck {}: Loaded {} Hz, {} channels, {} frames ({:.2}s), step {:.4}",
            self.deck_id,
            audio.sample_rate,
            audio.channels,
            audio.frames(),
            audio.duration_seconds(),
            self.step
        );
        self.audio = Some(audio);
        self.position = 0.0;
        self.ended = false;
        self.state = PlayerState::Ready;
    }

    /// Drop the loaded audio.
    pub fn eject(&mut self) {
        self.audio = None;
        self.position = 0.0;
        self.end_frame = 0;
        self.ended = false;
        self.state = PlayerState::Empty;
        log::debug!("Deck {}: Ejected", self.deck_id);
    }

    /// Start playback.
    pub fn play(&mut self) {
        if matches!(self.state, PlayerState::Ready | PlayerState::Paused) {
            self.state = PlayerState::Playing;
            self.ended = false;
            log::debug!("Deck {}: Playing", self.deck_id);
        }
    }

    /// Pause playback.
    pub fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.state = PlayerState::Paused;
            log::debug!("Deck {}: Paused", self.deck_id);
        }
    }

    /// Stop playback and rewind to `position_seconds`.
    pub fn stop(&mut self, position_seconds: f64) {
        if self.state != PlayerState::Empty {
            self.state = PlayerState::Ready;
            self.seek(position_seconds);
            log::debug!("Deck {}: Stopped", self.deck_id);
        }
    }

    /// Move the read position, clamped to the loaded audio.
    pub fn seek(&mut self, position_seconds: f64) {
        if let Some(audio) = &self.audio {
            let max = audio.frames() as f64;
            self.position = (position_seconds.max(0.0) * audio.sample_rate as f64).min(max);
            self.ended = false;
        }
    }

    /// Change the device rate, e.g. after the stream was opened.
    pub fn set_output_rate(&mut self, output_rate: u32) {
        self.output_rate = output_rate.max(1);
        if let Some(audio) = &self.audio {
            self.step = audio.sample_rate as f64 / self.output_rate as f64;
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    /// Get the current position in seconds.
    pub fn position_seconds(&self) -> f64 {
        match &self.audio {
            Some(audio) if audio.sample_rate > 0 => self.position / audio.sample_rate as f64,
            _ => 0.0,
        }
    }

    /// Get the total duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, DecodedAudio::duration_seconds)
    }

    /// Returns true once after playback reached the end.
    pub fn take_ended(&mut self) -> bool {
        std::mem::take(&mut self.ended)
    }

    /// Get the next stereo output frame.
    #[inline]
    pub fn next_stereo_sample(&mut self) -> (f32, f32) {
        if self.state != PlayerState::Playing {
            return (0.0, 0.0);
        }
        let Some(audio) = &self.audio else {
            return (0.0, 0.0);
        };

        let index = self.position as usize;
        if index >= self.end_frame {
            self.state = PlayerState::Paused;
            self.ended = true;
            log::debug!("Deck {}: Reached end", self.deck_id);
            return (0.0, 0.0);
        }

        let t = self.position.fract() as f32;
        let curr = audio.frame(index);
        let next = if index + 1 < self.end_frame {
            audio.frame(index + 1)
        } else {
            curr
        };
        self.position += self.step;

        (
            curr.0 * (1.0 - t) + next.0 * t,
            curr.1 * (1.0 - t) + next.1 * t,
        )
    }

    fn frame_at(audio: &DecodedAudio, seconds: f64) -> usize {
        ((seconds.max(0.0) * audio.sample_rate as f64).round() as usize).min(audio.frames())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32) -> DecodedAudio {
        DecodedAudio::new((0..frames).map(|i| i as f32).collect(), 1, sample_rate)
    }

    #[test]
    fn test_silent_until_played() {
        let mut player = DeckPlayer::new(DeckId::A, 100);
        assert_eq!(player.next_stereo_sample(), (0.0, 0.0));
        player.load(ramp(100, 100), 1.0);
        assert_eq!(player.state(), PlayerState::Ready);
        assert_eq!(player.next_stereo_sample(), (0.0, 0.0));
        player.play();
        player.next_stereo_sample();
        assert_eq!(player.next_stereo_sample(), (1.0, 1.0));
    }

    #[test]
    fn test_interpolates_between_frames() {
        // Source at half the output rate: every other output sample is between frames
        let mut player = DeckPlayer::new(DeckId::A, 200);
        player.load(ramp(100, 100), 1.0);
        player.play();
        assert_eq!(player.next_stereo_sample().0, 0.0);
        assert!((player.next_stereo_sample().0 - 0.5).abs() < 1e-6);
        assert_eq!(player.next_stereo_sample().0, 1.0);
    }

    #[test]
    fn test_stops_at_end_cut() {
        let mut player = DeckPlayer::new(DeckId::B, 100);
        player.load(ramp(100, 100), 0.5);
        player.seek(0.45);
        player.play();
        for _ in 0..5 {
            assert!(player.next_stereo_sample().0 > 0.0);
        }
        assert_eq!(player.next_stereo_sample(), (0.0, 0.0));
        assert_eq!(player.state(), PlayerState::Paused);
        assert!(player.take_ended());
        assert!(!player.take_ended());
    }

    #[test]
    fn test_stop_rewinds() {
        let mut player = DeckPlayer::new(DeckId::A, 100);
        player.load(ramp(1000, 100), 10.0);
        player.play();
        for _ in 0..300 {
            player.next_stereo_sample();
        }
        assert!((player.position_seconds() - 3.0).abs() < 1e-9);
        player.stop(1.5);
        assert_eq!(player.state(), PlayerState::Ready);
        assert!((player.position_seconds() - 1.5).abs() < 1e-9);
    }
}
