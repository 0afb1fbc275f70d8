//! Playback engine: deck players, crossfading, auto-advance and audio output.

mod audio_engine;
mod auto_dj;
mod crossfade;
mod deck_player;
mod engine;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

pub use audio_engine::{default_output_name, output_devices, DjAudioEngine, OutputConfig, OutputDevice};
pub use auto_dj::{seconds_until_advance, AutoAdvance};
pub use crossfade::CrossfadeOperation;
pub use deck_player::{DeckPlayer, PlayerState};
pub use engine::{
    EngineSnapshot, LoadIntent, LoadRequest, LoadTicket, MixerCore, PlaybackEngine, SharedMixer,
};
pub use runner::EngineRunner;

use crate::deck::{DeckId, DeckState};
use crate::error::DjError;
use crate::library::{AnalysisResult, Track};
use crate::mixer::{EqPreset, MeterReading, EQ_BAND_COUNT};
use crate::queue::{PlayMode, QueueSnapshot};

/// Commands for the playback engine.
///
/// Transport commands act on the active deck.
#[derive(Debug, Clone)]
pub enum DjCommand {
    // Deck loading
    /// Load a track onto a deck without starting it.
    Load { deck: DeckId, path: PathBuf },

    // Transport
    /// Start playback, or start the current queue entry on an empty deck.
    Play,
    /// Pause playback.
    Pause,
    /// Stop and rewind to the start cut.
    Stop,
    /// Seek the active deck.
    Seek { position_seconds: f64 },
    /// Seek a specific deck.
    SeekDeck { deck: DeckId, position_seconds: f64 },
    /// Advance to the next queue entry, crossfading when playing.
    Next,
    /// Step back one queue entry.
    Previous,
    /// Start a queue entry on the active deck.
    PlayIndex { index: usize },

    // Mixer
    SetVolume { volume: f32 },
    SetMute { muted: bool },
    SetCrossfadeDuration { seconds: f64 },
    ToggleCue { deck: DeckId },
    SetCueMix { main_level: f32, cue_level: f32 },
    SetPan { deck: DeckId, pan: f32 },
    SetEqBand {
        deck: DeckId,
        band: usize,
        gain_db: f32,
    },
    SetEq {
        deck: DeckId,
        gains: [f32; EQ_BAND_COUNT],
    },
    ApplyEqPreset { deck: DeckId, preset: EqPreset },
    /// Apply track pregain at load time.
    SetNormalize { enabled: bool },

    // Hot cues
    JumpToHotCue { deck: DeckId, slot: usize },
    JumpToCueIn { deck: DeckId },

    // Queue
    SetPlayMode { mode: PlayMode },
    SetAutoDj { enabled: bool },
    Enqueue { path: PathBuf },
    RemoveFromQueue { index: usize },
    MoveInQueue { from: usize, to: usize },
    /// Move a queue entry to play right after the current one.
    PlayNext { index: usize },
    SetQueue { snapshot: QueueSnapshot },

    // Analysis
    /// Analyze a track in the background.
    Analyze { path: PathBuf, apply_pregain: bool },

    /// Stop the runner.
    Shutdown,
}

impl DjCommand {
    /// Deck the command is scoped to, if any.
    pub fn deck(&self) -> Option<DeckId> {
        match self {
            Self::Load { deck, .. }
            | Self::SeekDeck { deck, .. }
            | Self::ToggleCue { deck }
            | Self::SetPan { deck, .. }
            | Self::SetEqBand { deck, .. }
            | Self::SetEq { deck, .. }
            | Self::ApplyEqPreset { deck, .. }
            | Self::JumpToHotCue { deck, .. }
            | Self::JumpToCueIn { deck } => Some(*deck),
            _ => None,
        }
    }
}

/// Events emitted by the playback engine.
#[derive(Debug, Clone)]
pub enum DjEvent {
    // Deck state
    /// Transport state of a deck changed.
    DeckStateChanged { deck: DeckId, state: DeckState },
    /// A track finished loading onto a deck.
    TrackLoaded { deck: DeckId, track: Arc<Track> },
    /// Playback position moved.
    PositionChanged {
        deck: DeckId,
        position_seconds: f64,
        duration_seconds: f64,
    },
    /// A deck reached the end of its track.
    TrackEnded { deck: DeckId },

    // Crossfade
    CrossfadeStarted {
        from: DeckId,
        to: DeckId,
        duration_seconds: f64,
    },
    CrossfadeCompleted { from: DeckId, to: DeckId },

    // Queue
    /// Queue contents changed; persist this.
    QueueChanged { queue: QueueSnapshot },
    /// Current queue entry changed.
    CurrentTrackChanged {
        index: Option<usize>,
        path: Option<PathBuf>,
    },

    // Mixer
    EqChanged {
        deck: DeckId,
        bands: [f32; EQ_BAND_COUNT],
    },
    CueChanged { deck: DeckId, enabled: bool },
    CueMixChanged { main_level: f32, cue_level: f32 },
    VolumeChanged { volume: f32, muted: bool },
    /// Peak levels since the previous position tick.
    Meters(MeterReading),

    // Analysis
    AnalysisCompleted {
        path: PathBuf,
        analysis: Arc<AnalysisResult>,
    },

    // Errors
    /// A recoverable failure, scoped to a deck where one applies.
    Error {
        deck: Option<DeckId>,
        error: DjError,
    },
}
