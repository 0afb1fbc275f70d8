//! Library module for track records, the track store and audio decoding.

mod types;

pub mod decode;
pub mod store;

pub use decode::{DecodedAudio, MediaDecoder, SymphoniaDecoder};
pub use store::{TrackLookup, TrackStore};
pub use types::{
    db_to_linear, AnalysisResult, CueLabel, HotCue, KeyMode, MusicalKey, Track,
    ANALYSIS_ALGORITHM_VERSION, NOTE_NAMES,
};
