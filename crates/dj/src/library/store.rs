//! In-memory track records shared between the analyzer and the engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::types::{AnalysisResult, Track};
use crate::error::{DjError, Result};

/// Metadata lookup used by the engine when loading a deck.
pub trait TrackLookup: Send + Sync {
    /// Get the current record for a path, or `None` when the library has no entry.
    fn track_by_path(&self, path: &Path) -> Option<Arc<Track>>;
}

/// Track records keyed by path.
///
/// Records are immutable `Arc<Track>` snapshots. Updates build a new record
/// and swap it in under the write lock, so a reader holds either the old
/// record or the new one, never a mix.
#[derive(Default)]
pub struct TrackStore {
    tracks: RwLock<HashMap<PathBuf, Arc<Track>>>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a track record.
    pub fn insert(&self, track: Track) -> Arc<Track> {
        let track = Arc::new(track);
        self.tracks
            .write()
            .insert(track.path.clone(), Arc::clone(&track));
        track
    }

    /// Remove a track record.
    pub fn remove(&self, path: &Path) -> Option<Arc<Track>> {
        self.tracks.write().remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Track>> {
        self.tracks.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    /// Attach a fresh analysis, replacing any previous one wholesale.
    pub fn replace_analysis(&self, path: &Path, analysis: AnalysisResult) -> Result<Arc<Track>> {
        self.update(path, |track| track.analysis = Some(Arc::new(analysis)))
    }

    /// Install analysis and its loudness compensation in one write.
    pub fn replace_analysis_with_pregain(
        &self,
        path: &Path,
        analysis: AnalysisResult,
        pregain_db: f64,
    ) -> Result<Arc<Track>> {
        self.update(path, |track| {
            track.analysis = Some(Arc::new(analysis));
            track.pregain_db = pregain_db;
        })
    }

    fn update<F>(&self, path: &Path, apply: F) -> Result<Arc<Track>>
    where
        F: FnOnce(&mut Track),
    {
        let mut tracks = self.tracks.write();
        let current = tracks.get(path).ok_or_else(|| DjError::TrackNotFound {
            path: path.to_path_buf(),
        })?;

        let mut next = Track::clone(current);
        apply(&mut next);
        let next = Arc::new(next);
        tracks.insert(path.to_path_buf(), Arc::clone(&next));
        Ok(next)
    }
}

impl TrackLookup for TrackStore {
    fn track_by_path(&self, path: &Path) -> Option<Arc<Track>> {
        self.get(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::library::{KeyMode, MusicalKey};

    fn analysis(bpm: f64) -> AnalysisResult {
        AnalysisResult {
            bpm,
            bpm_confidence: 0.9,
            key: MusicalKey::new(9, KeyMode::Minor),
            key_confidence: 0.8,
            energy: 0.5,
            loudness_lufs: -12.0,
            loudness_range_lu: 5.0,
            cue_in_seconds: 0.5,
            cue_out_seconds: 180.0,
            hot_cues: vec![],
            analyzed_at: Utc::now(),
            algorithm_version: "test".to_string(),
        }
    }

    #[test]
    fn test_replace_analysis_swaps_record() {
        let store = TrackStore::new();
        let path = PathBuf::from("/music/a.mp3");
        store.insert(Track::new(&path, 200.0).with_analysis(analysis(120.0)));

        let before = store.get(&path).unwrap();
        store.replace_analysis(&path, analysis(128.0)).unwrap();
        let after = store.get(&path).unwrap();

        // The old snapshot is untouched
        assert_eq!(before.analysis.as_ref().unwrap().bpm, 120.0);
        assert_eq!(after.analysis.as_ref().unwrap().bpm, 128.0);
    }

    #[test]
    fn test_analysis_and_pregain_land_together() {
        let store = TrackStore::new();
        let path = PathBuf::from("/music/a.mp3");
        store.insert(Track::new(&path, 200.0));

        let track = store
            .replace_analysis_with_pregain(&path, analysis(124.0), -2.5)
            .unwrap();
        assert_eq!(track.analysis.as_ref().unwrap().bpm, 124.0);
        assert_eq!(track.pregain_db, -2.5);

        let stored = store.get(&path).unwrap();
        assert!(Arc::ptr_eq(&track, &stored));
    }

    #[test]
    fn test_replace_analysis_missing_track() {
        let store = TrackStore::new();
        let err = store
            .replace_analysis(Path::new("/missing.mp3"), analysis(120.0))
            .unwrap_err();
        assert_eq!(err.kind(), "track_not_found");
    }

    #[test]
    fn test_lookup() {
        let store = TrackStore::new();
        store.insert(Track::new("/music/b.wav", 90.0));
        assert!(store.track_by_path(Path::new("/music/b.wav")).is_some());
        assert!(store.track_by_path(Path::new("/music/c.wav")).is_none());
        assert_eq!(store.len(), 1);
    }
}
