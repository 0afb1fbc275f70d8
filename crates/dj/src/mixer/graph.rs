//! Two-channel mix graph feeding a main bus and a cue (headphone) bus.

use crate::deck::DeckId;
use crate::library::db_to_linear;

use super::eq::{Equalizer, EQ_BAND_COUNT};

/// Output level where the soft clipper starts bending the signal.
const SOFT_CLIP_KNEE: f32 = 0.8;

/// One deck's signal chain: pregain, EQ, pan, channel gain.
#[derive(Debug, Clone)]
pub struct ChannelStrip {
    pregain: f32,
    eq: Equalizer,
    pan: f32,
    gain: f32,
    cue: bool,
    peak: f32,
}

impl ChannelStrip {
    fn new(sample_rate: u32) -> Self {
        Self {
            pregain: 1.0,
            eq: Equalizer::new(sample_rate),
            pan: 0.0,
            gain: 0.0,
            cue: false,
            peak: 0.0,
        }
    }

    pub fn pregain(&self) -> f32 {
        self.pregain
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn is_cued(&self) -> bool {
        self.cue
    }

    pub fn eq_gains(&self) -> [f32; EQ_BAND_COUNT] {
        self.eq.gains()
    }

    /// Run one frame through pregain, EQ and pan.
    ///
    /// Returns the pre-fader signal; the caller applies the channel gain.
    #[inline]
    fn pre_fader(&mut self, left: f32, right: f32) -> (f32, f32) {
        let (l, r) = self.eq.process(left * self.pregain, right * self.pregain);
        // Balance law: the far side is attenuated, the near side untouched
        let left_gain = (1.0 - self.pan).min(1.0);
        let right_gain = (1.0 + self.pan).min(1.0);
        (l * left_gain, r * right_gain)
    }
}

/// Peak levels since the last read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterReading {
    /// Post-fader peak per deck, indexed by [`DeckId::index`].
    pub decks: [f32; 2],
    pub main: f32,
    pub cue: f32,
}

/// Mix graph for both decks.
///
/// Both decks always feed the main bus. A cued deck also feeds the cue bus,
/// pre-fader, so it can be previewed while its channel gain is still zero.
/// The cue bus adds a scaled copy of the main mix for blending.
#[derive(Debug, Clone)]
pub struct MixGraph {
    channels: [ChannelStrip; 2],
    master_volume: f32,
    muted: bool,
    headroom: f32,
    cue_mix_main: f32,
    cue_mix_cue: f32,
    main_peak: f32,
    cue_peak: f32,
}

impl MixGraph {
    pub fn new(sample_rate: u32, master_headroom_db: f32) -> Self {
        Self {
            channels: [ChannelStrip::new(sample_rate), ChannelStrip::new(sample_rate)],
            master_volume: 1.0,
            muted: false,
            headroom: db_to_linear(master_headroom_db),
            cue_mix_main: 0.5,
            cue_mix_cue: 1.0,
            main_peak: 0.0,
            cue_peak: 0.0,
        }
    }

    pub fn channel(&self, deck: DeckId) -> &ChannelStrip {
        &self.channels[deck.index()]
    }

    fn channel_mut(&mut self, deck: DeckId) -> &mut ChannelStrip {
        &mut self.channels[deck.index()]
    }

    /// Linear pregain for a deck.
    pub fn set_pregain(&mut self, deck: DeckId, pregain: f32) {
        self.channel_mut(deck).pregain = pregain.max(0.0);
    }

    /// Channel gain (crossfade weight) for a deck.
    pub fn set_gain(&mut self, deck: DeckId, gain: f32) {
        self.channel_mut(deck).gain = gain.clamp(0.0, 1.0);
    }

    pub fn set_pan(&mut self, deck: DeckId, pan: f32) {
        self.channel_mut(deck).pan = pan.clamp(-1.0, 1.0);
    }

    pub fn set_cue(&mut self, deck: DeckId, enabled: bool) {
        self.channel_mut(deck).cue = enabled;
    }

    pub fn set_eq_band(&mut self, deck: DeckId, band: usize, gain_db: f32) {
        self.channel_mut(deck).eq.set_band(band, gain_db);
    }

    pub fn set_eq(&mut self, deck: DeckId, gains: [f32; EQ_BAND_COUNT]) {
        self.channel_mut(deck).eq.set_gains(gains);
    }

    /// Reset filter memory, e.g. after a new track is loaded.
    pub fn reset_eq(&mut self, deck: DeckId) {
        self.channel_mut(deck).eq.reset();
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        for channel in &mut self.channels {
            channel.eq.set_sample_rate(sample_rate);
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn cue_mix(&self) -> (f32, f32) {
        (self.cue_mix_main, self.cue_mix_cue)
    }

    pub fn set_cue_mix(&mut self, main_level: f32, cue_level: f32) {
        self.cue_mix_main = main_level.clamp(0.0, 1.0);
        self.cue_mix_cue = cue_level.clamp(0.0, 1.0);
    }

    /// Mix one stereo frame from each deck.
    ///
    /// Returns `(main, cue)` stereo frames.
    #[inline]
    pub fn process_frame(
        &mut self,
        a: (f32, f32),
        b: (f32, f32),
    ) -> ((f32, f32), (f32, f32)) {
        let mut main = (0.0f32, 0.0f32);
        let mut cued = (0.0f32, 0.0f32);

        for (channel, input) in self.channels.iter_mut().zip([a, b]) {
            let (l, r) = channel.pre_fader(input.0, input.1);
            let post = (l * channel.gain, r * channel.gain);
            channel.peak = channel.peak.max(post.0.abs()).max(post.1.abs());

            main.0 += post.0;
            main.1 += post.1;
            if channel.cue {
                cued.0 += l;
                cued.1 += r;
            }
        }

        let mix = (main.0 * self.headroom, main.1 * self.headroom);
        let out_level = if self.muted { 0.0 } else { self.master_volume };
        let main_out = (
            soft_clip(mix.0 * out_level),
            soft_clip(mix.1 * out_level),
        );

        let cue_out = (
            soft_clip(mix.0 * self.cue_mix_main + cued.0 * self.headroom * self.cue_mix_cue),
            soft_clip(mix.1 * self.cue_mix_main + cued.1 * self.headroom * self.cue_mix_cue),
        );

        self.main_peak = self.main_peak.max(main_out.0.abs()).max(main_out.1.abs());
        self.cue_peak = self.cue_peak.max(cue_out.0.abs()).max(cue_out.1.abs());

        (main_out, cue_out)
    }

    /// Read and reset the peak meters.
    pub fn take_meters(&mut self) -> MeterReading {
        let reading = MeterReading {
            decks: [self.channels[0].peak, self.channels[1].peak],
            main: self.main_peak,
            cue: self.cue_peak,
        };
        for channel in &mut self.channels {
            channel.peak = 0.0;
        }
        self.main_peak = 0.0;
        self.cue_peak = 0.0;
        reading
    }
}

/// Linear below the knee, tanh-shaped above it, never exceeding 1.0.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    let magnitude = x.abs();
    if magnitude <= SOFT_CLIP_KNEE {
        return x;
    }
    let range = 1.0 - SOFT_CLIP_KNEE;
    let shaped = SOFT_CLIP_KNEE + range * ((magnitude - SOFT_CLIP_KNEE) / range).tanh();
    shaped.copysign(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> MixGraph {
        // No headroom so levels are easy to follow
        MixGraph::new(44100, 0.0)
    }

    #[test]
    fn test_silent_by_default() {
        let mut g = graph();
        let (main, cue) = g.process_frame((0.5, 0.5), (0.5, 0.5));
        assert_eq!(main, (0.0, 0.0));
        assert_eq!(cue, (0.0, 0.0));
    }

    #[test]
    fn test_main_sums_weighted_decks() {
        let mut g = graph();
        g.set_gain(DeckId::A, 0.25);
        g.set_gain(DeckId::B, 0.5);
        let (main, _) = g.process_frame((0.4, 0.4), (0.2, 0.2));
        assert!((main.0 - 0.2).abs() < 1e-6);
        assert!((main.1 - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_pregain_scales_input() {
        let mut g = graph();
        g.set_gain(DeckId::A, 1.0);
        g.set_pregain(DeckId::A, 0.5);
        let (main, _) = g.process_frame((0.4, -0.4), (0.0, 0.0));
        assert!((main.0 - 0.2).abs() < 1e-6);
        assert!((main.1 + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_cue_is_pre_fader_and_non_exclusive() {
        let mut g = graph();
        g.set_cue_mix(0.0, 1.0);
        g.set_gain(DeckId::A, 1.0);
        g.set_gain(DeckId::B, 0.0);
        g.set_cue(DeckId::B, true);

        let (main, cue) = g.process_frame((0.1, 0.1), (0.3, 0.3));
        // B is silent on main but audible in the headphones
        assert!((main.0 - 0.1).abs() < 1e-6);
        assert!((cue.0 - 0.3).abs() < 1e-6);

        // Cueing A keeps it on main
        g.set_cue(DeckId::A, true);
        let (main, cue) = g.process_frame((0.1, 0.1), (0.3, 0.3));
        assert!((main.0 - 0.1).abs() < 1e-6);
        assert!((cue.0 - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_cue_blends_main() {
        let mut g = graph();
        g.set_gain(DeckId::A, 1.0);
        g.set_cue_mix(0.5, 1.0);
        let (_, cue) = g.process_frame((0.4, 0.4), (0.0, 0.0));
        assert!((cue.0 - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mute_and_volume() {
        let mut g = graph();
        g.set_gain(DeckId::A, 1.0);
        g.set_master_volume(0.5);
        let (main, _) = g.process_frame((0.4, 0.4), (0.0, 0.0));
        assert!((main.0 - 0.2).abs() < 1e-6);

        g.set_muted(true);
        let (main, cue) = g.process_frame((0.4, 0.4), (0.0, 0.0));
        assert_eq!(main, (0.0, 0.0));
        // Headphones still carry the mix
        assert!(cue.0 > 0.0);
    }

    #[test]
    fn test_pan_attenuates_far_side() {
        let mut g = graph();
        g.set_gain(DeckId::A, 1.0);
        g.set_pan(DeckId::A, -1.0);
        let (main, _) = g.process_frame((0.5, 0.5), (0.0, 0.0));
        assert!((main.0 - 0.5).abs() < 1e-6);
        assert_eq!(main.1, 0.0);
    }

    #[test]
    fn test_headroom() {
        let mut g = MixGraph::new(44100, -6.0);
        g.set_gain(DeckId::A, 1.0);
        let (main, _) = g.process_frame((0.5, 0.5), (0.0, 0.0));
        assert!((main.0 - 0.5 * 0.501).abs() < 1e-3);
    }

    #[test]
    fn test_soft_clip() {
        assert_eq!(soft_clip(0.5), 0.5);
        assert_eq!(soft_clip(-0.8), -0.8);
        // Knee region stays strictly inside full scale
        let knee = soft_clip(1.2);
        assert!(knee > soft_clip(1.0) && knee < 1.0, "knee {}", knee);
        assert!((soft_clip(-1.2) + knee).abs() < 1e-6);
        // Far past the knee tanh saturates to exactly full scale
        assert!(soft_clip(3.0) <= 1.0);
        assert!(soft_clip(3.0) > 0.99);
        assert!(soft_clip(-3.0) >= -1.0);
    }

    #[test]
    fn test_meters_reset_on_read() {
        let mut g = graph();
        g.set_gain(DeckId::B, 1.0);
        g.process_frame((0.0, 0.0), (0.6, -0.7));
        let reading = g.take_meters();
        assert!((reading.decks[1] - 0.7).abs() < 1e-6);
        assert_eq!(reading.decks[0], 0.0);
        assert!(reading.main > 0.69);
        assert_eq!(g.take_meters(), MeterReading::default());
    }
}
