//! Play queue and play-order selection.

mod selector;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use selector::{PlayOrderSelector, ShuffleBag};

/// Order in which the queue is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// Front to back, wrapping at the end.
    #[default]
    InOrder,
    /// Keep playing the current entry.
    RepeatOne,
    /// Same order as `InOrder`.
    RepeatAll,
    /// Any other entry, uniformly.
    Shuffle,
    /// Every entry once before any repeats.
    RandomNoRepeat,
}

impl PlayMode {
    pub const ALL: [PlayMode; 5] = [
        PlayMode::InOrder,
        PlayMode::RepeatOne,
        PlayMode::RepeatAll,
        PlayMode::Shuffle,
        PlayMode::RandomNoRepeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InOrder => "in_order",
            Self::RepeatOne => "repeat_one",
            Self::RepeatAll => "repeat_all",
            Self::Shuffle => "shuffle",
            Self::RandomNoRepeat => "random_no_repeat",
        }
    }

    /// Whether `next` draws randomly.
    pub fn is_random(&self) -> bool {
        matches!(self, Self::Shuffle | Self::RandomNoRepeat)
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| format!("unknown play mode '{}'", s))
    }
}

/// Persisted form of the queue: paths plus the current index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub paths: Vec<PathBuf>,
    pub current_index: Option<usize>,
}

/// Ordered list of track paths with a current entry.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    paths: Vec<PathBuf>,
    current: Option<usize>,
}

impl Queue {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            current: None,
        }
    }

    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut queue = Self::new(snapshot.paths);
        if let Some(index) = snapshot.current_index {
            queue.set_current(index);
        }
        queue
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            paths: self.paths.clone(),
            current_index: self.current,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.and_then(|i| self.get(i))
    }

    /// Select an entry; out-of-range indices clamp to the last entry.
    pub fn set_current(&mut self, index: usize) {
        self.current = if self.paths.is_empty() {
            None
        } else {
            Some(index.min(self.paths.len() - 1))
        };
    }

    /// 64-bit signature of the ordered paths.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.paths.hash(&mut hasher);
        hasher.finish()
    }

    /// Append a path.
    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Remove an entry, keeping `current` on the same track when it survives.
    ///
    /// Removing the current entry selects `successor` (an index into the
    /// queue before removal), or clears the selection when there is none.
    pub fn remove(&mut self, index: usize, successor: Option<usize>) -> Option<PathBuf> {
        if index >= self.paths.len() {
            return None;
        }
        let removed = self.paths.remove(index);

        self.current = match self.current {
            _ if self.paths.is_empty() => None,
            Some(c) if c > index => Some(c - 1),
            Some(c) if c == index => successor
                .filter(|&s| s != index)
                .map(|s| if s > index { s - 1 } else { s })
                .map(|s| s.min(self.paths.len() - 1)),
            other => other,
        };
        Some(removed)
    }

    /// Move an entry; the current track stays current.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        let len = self.paths.len();
        if from >= len || to >= len {
            return false;
        }
        if from == to {
            return true;
        }

        let item = self.paths.remove(from);
        self.paths.insert(to, item);

        self.current = self.current.map(|c| {
            if c == from {
                to
            } else if from < c && c <= to {
                c - 1
            } else if to <= c && c < from {
                c + 1
            } else {
                c
            }
        });
        true
    }

    /// Move an entry to play right after the current one.
    pub fn play_next(&mut self, index: usize) -> bool {
        let Some(current) = self.current else {
            return self.move_item(index, 0);
        };
        if index == current {
            return false;
        }
        let target = if index < current { current } else { current + 1 };
        self.move_item(index, target)
    }
}
