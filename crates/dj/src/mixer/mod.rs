//! Mix graph: per-deck channel strips, equalizer, main and cue buses.

mod eq;
mod graph;

pub use eq::{
    check_band, EqPreset, Equalizer, EQ_BAND_COUNT, EQ_CENTER_FREQUENCIES, EQ_MAX_DB, EQ_MIN_DB,
    EQ_Q,
};
pub use graph::{soft_clip, ChannelStrip, MeterReading, MixGraph};
