//! Twindeck DJ engine
//!
//! Dual-deck playback with crossfading and cue monitoring, driven by an
//! offline audio feature analyzer.
//!
//! # Features
//!
//! - Two decks feeding a main bus and a headphone cue bus
//! - Timed linear crossfades and Auto-DJ queue advance
//! - 16-band equalizer, pan and loudness pregain per channel
//! - Tempo, key, energy, loudness and cue point analysis
//! - Queue play modes including a no-repeat shuffle bag
//! - Multi-channel output via cpal (main on 1-2, cue on 3-4)

pub mod analysis;
pub mod config;
pub mod deck;
pub mod dsp;
pub mod error;
pub mod library;
pub mod mixer;
pub mod module;
pub mod queue;

// Re-export main types
pub use analysis::{analyze, analyze_file, spawn_analysis, AnalysisJob};
pub use config::{AnalysisConfig, ConfigManager, EngineConfig, Settings};
pub use deck::{Deck, DeckId, DeckState};
pub use error::{DjError, Result};
pub use library::{
    AnalysisResult, DecodedAudio, HotCue, MediaDecoder, MusicalKey, SymphoniaDecoder, Track,
    TrackLookup, TrackStore,
};
pub use mixer::{EqPreset, MixGraph};
pub use module::{
    CrossfadeOperation, DjAudioEngine, DjCommand, DjEvent, EngineRunner, EngineSnapshot,
    PlaybackEngine,
};
pub use queue::{PlayMode, PlayOrderSelector, Queue, QueueSnapshot};
