//! Next/previous index selection for every play mode.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::PlayMode;

/// Permutation-without-replacement of queue indices.
///
/// The bag belongs to one queue content hash; a different hash empties it.
#[derive(Debug, Clone, Default)]
pub struct ShuffleBag {
    key: Option<u64>,
    remaining: Vec<usize>,
}

impl ShuffleBag {
    /// Indices still to be drawn before the next reshuffle.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn key(&self) -> Option<u64> {
        self.key
    }

    pub fn reset(&mut self) {
        self.key = None;
        self.remaining.clear();
    }

    fn draw(&mut self, rng: &mut StdRng, len: usize, current: Option<usize>, key: u64) -> usize {
        if self.key != Some(key) {
            self.key = Some(key);
            self.remaining.clear();
        }

        if self.remaining.is_empty() {
            let mut indices: Vec<usize> = (0..len).collect();
            indices.shuffle(rng);
            // Draws pop from the back; keep the playing track out of the first draw
            if len > 1 && indices.last().copied() == current {
                indices.swap(0, len - 1);
            }
            log::debug!("Shuffle bag refilled with {} entries", len);
            self.remaining = indices;
        }

        self.remaining.pop().unwrap_or(0)
    }
}

/// Picked-but-not-yet-played entry, valid for one queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpNext {
    key: u64,
    current: Option<usize>,
    mode: PlayMode,
    index: usize,
}

/// Chooses the next and previous queue index for a play mode.
///
/// Random picks are drawn once and cached, so a preview from
/// [`peek_next`](Self::peek_next) is exactly what the following
/// [`next`](Self::next) returns.
#[derive(Debug, Clone)]
pub struct PlayOrderSelector {
    rng: StdRng,
    bag: ShuffleBag,
    up_next: Option<UpNext>,
}

impl Default for PlayOrderSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayOrderSelector {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Deterministic selector for reproducible shuffles.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            bag: ShuffleBag::default(),
            up_next: None,
        }
    }

    pub fn bag(&self) -> &ShuffleBag {
        &self.bag
    }

    /// Forget cached picks and the shuffle bag.
    pub fn reset(&mut self) {
        self.bag.reset();
        self.up_next = None;
    }

    /// Index to play after `current`, consuming any cached pick.
    ///
    /// `key` is the queue's content hash. Returns `None` for an empty queue.
    pub fn next(
        &mut self,
        mode: PlayMode,
        len: usize,
        current: Option<usize>,
        key: u64,
    ) -> Option<usize> {
        let index = self.peek_next(mode, len, current, key)?;
        self.up_next = None;
        Some(index)
    }

    /// Index `next` would return, without advancing.
    pub fn peek_next(
        &mut self,
        mode: PlayMode,
        len: usize,
        current: Option<usize>,
        key: u64,
    ) -> Option<usize> {
        if len == 0 {
            return None;
        }

        if let Some(cached) = self.up_next {
            if cached.key == key && cached.current == current && cached.mode == mode {
                return Some(cached.index);
            }
        }

        let index = match mode {
            PlayMode::InOrder | PlayMode::RepeatAll => current.map_or(0, |c| (c + 1) % len),
            PlayMode::RepeatOne => current.map_or(0, |c| c.min(len - 1)),
            PlayMode::Shuffle => self.random_other(len, current),
            PlayMode::RandomNoRepeat => self.bag.draw(&mut self.rng, len, current, key),
        };

        self.up_next = Some(UpNext {
            key,
            current,
            mode,
            index,
        });
        Some(index)
    }

    /// Index before `current`: one step back with wrap in every mode.
    ///
    /// Random modes do not retrace their walk.
    pub fn prev(&self, len: usize, current: Option<usize>) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(match current {
            Some(c) if c > 0 && c < len => c - 1,
            _ => len - 1,
        })
    }

    fn random_other(&mut self, len: usize, current: Option<usize>) -> usize {
        match current {
            Some(c) if len > 1 && c < len => {
                let pick = self.rng.random_range(0..len - 1);
                if pick >= c {
                    pick + 1
                } else {
                    pick
                }
            }
            _ => self.rng.random_range(0..len),
        }
    }
}
