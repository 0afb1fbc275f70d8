//! Per-deck transport state as the engine reports it.
//!
//! The audio side lives in `mixer::DeckPlayer`; this is the snapshot view
//! that is serialized to clients.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::library::{HotCue, Track};
use crate::mixer::EQ_BAND_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub const ALL: [DeckId; 2] = [DeckId::A, DeckId::B];

    /// Slot in per-deck arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The opposite deck, used as the crossfade target.
    pub fn other(&self) -> Self {
        if *self == Self::A {
            Self::B
        } else {
            Self::A
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if *self == Self::A { "A" } else { "B" })
    }
}

/// `Empty -> Loading -> Ready -> Playing <-> Paused -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeckState {
    #[default]
    Empty,
    /// Decode in flight.
    Loading,
    /// Loaded and parked at the start cut.
    Ready,
    Playing,
    Paused,
    /// Rewound to the start cut.
    Stopped,
}

impl DeckState {
    pub fn is_playing(&self) -> bool {
        *self == Self::Playing
    }

    /// A playable source is attached.
    pub fn has_track(&self) -> bool {
        !matches!(self, Self::Empty | Self::Loading)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub state: DeckState,
    pub track: Option<Arc<Track>>,
    pub position_seconds: f64,
    /// Routed to the headphone bus.
    pub is_cue_monitored: bool,
    /// Channel fader, moved by crossfades.
    pub gain: f32,
    /// dB per band, clamped to +/-12.
    pub eq_bands: [f32; EQ_BAND_COUNT],
    /// -1 is hard left.
    pub pan: f32,
    /// Linear loudness correction.
    pub pregain: f32,
    pub peak_level: f32,
}

impl Deck {
    pub fn new(id: DeckId) -> Self {
        Self {
            id,
            state: DeckState::Empty,
            track: None,
            position_seconds: 0.0,
            is_cue_monitored: false,
            gain: 0.0,
            eq_bands: [0.0; EQ_BAND_COUNT],
            pan: 0.0,
            pregain: 1.0,
            peak_level: 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Track duration, or 0 when empty.
    pub fn duration_seconds(&self) -> f64 {
        self.track.as_ref().map_or(0.0, |t| t.duration_seconds)
    }

    /// Trimmed start of the loaded track.
    pub fn start_cut_seconds(&self) -> f64 {
        self.track.as_ref().map_or(0.0, |t| t.start_cut_seconds)
    }

    /// Hot cue from the loaded track's analysis.
    pub fn hot_cue(&self, slot: usize) -> Option<HotCue> {
        self.track
            .as_ref()
            .and_then(|t| t.analysis.as_ref())
            .and_then(|a| a.hot_cue(slot).copied())
    }

    /// Clear the source and rewind. EQ, pan and cue routing are kept.
    pub fn eject(&mut self) {
        self.state = DeckState::Empty;
        self.track = None;
        self.position_seconds = 0.0;
        self.pregain = 1.0;
        self.peak_level = 0.0;
    }
}
