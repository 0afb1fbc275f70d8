//! Dual-deck playback engine.
//!
//! The engine owns both decks, the queue and the crossfade/auto-advance
//! state. All mutation happens on the caller's thread in response to
//! commands and ticks; the audio callback only reads the shared
//! [`MixerCore`]. Loads are split in two halves so decoding can run off the
//! engine thread: [`PlaybackEngine::begin_load`] queues a [`LoadRequest`],
//! and [`PlaybackEngine::finish_load`] installs the decoded audio.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::auto_dj::{seconds_until_advance, AutoAdvance};
use super::crossfade::CrossfadeOperation;
use super::deck_player::DeckPlayer;
use super::{DjCommand, DjEvent};
use crate::config::{EngineConfig, MAX_CROSSFADE_SECONDS, MIN_CROSSFADE_SECONDS};
use crate::deck::{Deck, DeckId, DeckState};
use crate::error::{DjError, Result};
use crate::library::{DecodedAudio, MediaDecoder, Track, TrackLookup};
use crate::mixer::{check_band, EqPreset, MixGraph, EQ_BAND_COUNT};
use crate::queue::{PlayMode, PlayOrderSelector, Queue, QueueSnapshot};

/// Everything the audio callback touches: both players and the mix graph.
pub struct MixerCore {
    players: [DeckPlayer; 2],
    graph: MixGraph,
}

/// Mixer shared between the engine and the audio output.
pub type SharedMixer = Arc<Mutex<MixerCore>>;

impl MixerCore {
    pub fn new(sample_rate: u32, master_headroom_db: f32) -> Self {
        Self {
            players: [
                DeckPlayer::new(DeckId::A, sample_rate),
                DeckPlayer::new(DeckId::B, sample_rate),
            ],
            graph: MixGraph::new(sample_rate, master_headroom_db),
        }
    }

    pub fn player(&self, deck: DeckId) -> &DeckPlayer {
        &self.players[deck.index()]
    }

    pub fn player_mut(&mut self, deck: DeckId) -> &mut DeckPlayer {
        &mut self.players[deck.index()]
    }

    pub fn graph(&self) -> &MixGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut MixGraph {
        &mut self.graph
    }

    /// Follow the rate the output device actually opened with.
    pub fn set_output_rate(&mut self, sample_rate: u32) {
        for player in &mut self.players {
            player.set_output_rate(sample_rate);
        }
        self.graph.set_sample_rate(sample_rate);
    }

    /// Produce one `(main, cue)` stereo frame.
    #[inline]
    pub fn next_frame(&mut self) -> ((f32, f32), (f32, f32)) {
        let a = self.players[0].next_stereo_sample();
        let b = self.players[1].next_stereo_sample();
        self.graph.process_frame(a, b)
    }

    /// Fill interleaved stereo buffers for both buses.
    pub fn render(&mut self, main: &mut [f32], cue: &mut [f32]) {
        for (m, c) in main.chunks_exact_mut(2).zip(cue.chunks_exact_mut(2)) {
            let ((ml, mr), (cl, cr)) = self.next_frame();
            m[0] = ml;
            m[1] = mr;
            c[0] = cl;
            c[1] = cr;
        }
    }
}

/// What to do with a deck once its track has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadIntent {
    /// Leave it ready.
    Cue,
    /// Make it the active deck and play.
    Start,
    /// Play and crossfade into it from the active deck.
    CrossfadeIn,
}

/// Identifies one load; results for superseded loads are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub deck: DeckId,
    generation: u64,
}

/// A file the engine wants decoded.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub ticket: LoadTicket,
    pub path: PathBuf,
}

#[derive(Debug)]
struct PendingLoad {
    ticket: LoadTicket,
    track: Arc<Track>,
    intent: LoadIntent,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub decks: [Deck; 2],
    pub active_deck: DeckId,
    pub crossfade: Option<CrossfadeOperation>,
    pub queue: QueueSnapshot,
    pub play_mode: PlayMode,
    pub auto_dj: bool,
    pub normalize: bool,
    pub crossfade_seconds: f64,
    pub master_volume: f32,
    pub muted: bool,
}

/// Two decks, one queue, one mixer.
pub struct PlaybackEngine {
    config: EngineConfig,
    decks: [Deck; 2],
    active: DeckId,
    crossfade: Option<CrossfadeOperation>,
    auto_advance: AutoAdvance,
    queue: Queue,
    selector: PlayOrderSelector,
    muted: bool,
    mixer: SharedMixer,
    lookup: Arc<dyn TrackLookup>,
    decoder: Arc<dyn MediaDecoder>,
    events: mpsc::UnboundedSender<DjEvent>,
    pending: [Option<PendingLoad>; 2],
    load_requests: Vec<LoadRequest>,
    generation: u64,
}

impl PlaybackEngine {
    /// Create an engine and the receiving end of its event channel.
    pub fn new(
        config: EngineConfig,
        lookup: Arc<dyn TrackLookup>,
        decoder: Arc<dyn MediaDecoder>,
    ) -> (Self, mpsc::UnboundedReceiver<DjEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        let mut core = MixerCore::new(config.sample_rate, config.master_headroom_db);
        core.graph_mut().set_master_volume(config.master_volume);
        core.graph_mut().set_cue_mix(config.cue_mix_main, config.cue_mix_cue);
        core.graph_mut().set_gain(DeckId::A, config.channel_level);

        let mut deck_a = Deck::new(DeckId::A);
        deck_a.gain = config.channel_level;

        let engine = Self {
            decks: [deck_a, Deck::new(DeckId::B)],
            active: DeckId::A,
            crossfade: None,
            auto_advance: AutoAdvance::new(),
            queue: Queue::default(),
            selector: PlayOrderSelector::new(),
            muted: false,
            mixer: Arc::new(Mutex::new(core)),
            lookup,
            decoder,
            events,
            pending: [None, None],
            load_requests: Vec::new(),
            generation: 0,
            config,
        };
        (engine, rx)
    }

    /// Replace the play-order selector, e.g. with a seeded one.
    pub fn with_selector(mut self, selector: PlayOrderSelector) -> Self {
        self.selector = selector;
        self
    }

    // Accessors

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn deck(&self, id: DeckId) -> &Deck {
        &self.decks[id.index()]
    }

    pub fn active_deck(&self) -> DeckId {
        self.active
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn crossfade(&self) -> Option<&CrossfadeOperation> {
        self.crossfade.as_ref()
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.deck(self.active).is_playing()
    }

    /// Position of the active deck.
    pub fn position_seconds(&self) -> f64 {
        self.deck(self.active).position_seconds
    }

    /// Duration of the active deck's track.
    pub fn duration_seconds(&self) -> f64 {
        self.deck(self.active).duration_seconds()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn mixer(&self) -> SharedMixer {
        Arc::clone(&self.mixer)
    }

    pub fn decoder(&self) -> Arc<dyn MediaDecoder> {
        Arc::clone(&self.decoder)
    }

    pub fn auto_advance_deadline(&self) -> Option<Instant> {
        self.auto_advance.deadline()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            decks: self.decks.clone(),
            active_deck: self.active,
            crossfade: self.crossfade,
            queue: self.queue.snapshot(),
            play_mode: self.config.play_mode,
            auto_dj: self.config.auto_dj,
            normalize: self.config.normalize,
            crossfade_seconds: self.config.crossfade_seconds,
            master_volume: self.config.master_volume,
            muted: self.muted,
        }
    }

    /// Dispatch a command. Errors are also emitted as [`DjEvent::Error`].
    pub fn handle_command(&mut self, command: DjCommand) -> Result<()> {
        match command {
            DjCommand::Load { deck, path } => self.load(deck, &path),
            DjCommand::Play => self.play(),
            DjCommand::Pause => self.pause(),
            DjCommand::Stop => self.stop(),
            DjCommand::Seek { position_seconds } => self.seek(position_seconds),
            DjCommand::SeekDeck {
                deck,
                position_seconds,
            } => self.seek_deck(deck, position_seconds),
            DjCommand::Next => self.next(),
            DjCommand::Previous => self.prev(),
            DjCommand::PlayIndex { index } => self.play_index(index),
            DjCommand::SetVolume { volume } => self.set_volume(volume),
            DjCommand::SetMute { muted } => {
                self.set_mute(muted);
                Ok(())
            }
            DjCommand::SetCrossfadeDuration { seconds } => {
                self.set_crossfade_duration(seconds).map(|_| ())
            }
            DjCommand::ToggleCue { deck } => {
                self.toggle_cue(deck);
                Ok(())
            }
            DjCommand::SetCueMix {
                main_level,
                cue_level,
            } => self.set_cue_mix(main_level, cue_level),
            DjCommand::SetPan { deck, pan } => self.set_pan(deck, pan),
            DjCommand::SetEqBand {
                deck,
                band,
                gain_db,
            } => self.set_eq_band(deck, band, gain_db),
            DjCommand::SetEq { deck, gains } => self.set_eq(deck, gains),
            DjCommand::ApplyEqPreset { deck, preset } => self.apply_eq_preset(deck, preset),
            DjCommand::SetNormalize { enabled } => {
                self.set_normalize(enabled);
                Ok(())
            }
            DjCommand::JumpToHotCue { deck, slot } => self.jump_to_hot_cue(deck, slot),
            DjCommand::JumpToCueIn { deck } => self.jump_to_cue_in(deck),
            DjCommand::SetPlayMode { mode } => {
                self.set_play_mode(mode);
                Ok(())
            }
            DjCommand::SetAutoDj { enabled } => {
                self.set_auto_dj(enabled);
                Ok(())
            }
            DjCommand::Enqueue { path } => {
                self.enqueue(path);
                Ok(())
            }
            DjCommand::RemoveFromQueue { index } => self.remove_from_queue(index).map(|_| ()),
            DjCommand::MoveInQueue { from, to } => self.move_in_queue(from, to),
            DjCommand::PlayNext { index } => self.play_next(index),
            DjCommand::SetQueue { snapshot } => {
                self.set_queue(snapshot);
                Ok(())
            }
            DjCommand::Analyze { .. } | DjCommand::Shutdown => {
                log::warn!("Unhandled engine command: {:?}", command);
                Ok(())
            }
        }
    }

    // Loading

    /// Load a track onto a deck and leave it ready.
    pub fn load(&mut self, deck: DeckId, path: &Path) -> Result<()> {
        self.begin_load(deck, path, LoadIntent::Cue).map(|_| ())
    }

    /// Look up a track and queue it for decoding.
    ///
    /// The deck goes to `Loading` until [`finish_load`](Self::finish_load)
    /// is called with the ticket. A second load onto a loading deck is
    /// rejected with [`DjError::Busy`].
    pub fn begin_load(&mut self, deck: DeckId, path: &Path, intent: LoadIntent) -> Result<LoadTicket> {
        let i = deck.index();
        if self.decks[i].state == DeckState::Loading {
            return self.fail(
                Some(deck),
                DjError::Busy {
                    deck,
                    operation: "load",
                },
            );
        }

        // Both decks take part in a fade, so any load ends it
        self.finish_crossfade();
        if deck == self.active {
            self.auto_advance.cancel();
        }

        let Some(track) = self.lookup.track_by_path(path) else {
            self.clear_deck(deck);
            return self.fail(
                Some(deck),
                DjError::TrackNotFound {
                    path: path.to_path_buf(),
                },
            );
        };

        log::info!("Deck {}: Loading {:?}", deck, path);
        self.mixer.lock().player_mut(deck).eject();

        let d = &mut self.decks[i];
        d.eject();
        d.track = Some(Arc::clone(&track));
        d.state = DeckState::Loading;
        self.emit_state(deck);

        self.generation += 1;
        let ticket = LoadTicket {
            deck,
            generation: self.generation,
        };
        self.pending[i] = Some(PendingLoad {
            ticket,
            track,
            intent,
        });
        self.load_requests.push(LoadRequest {
            ticket,
            path: path.to_path_buf(),
        });
        Ok(ticket)
    }

    /// Files waiting to be decoded.
    pub fn take_load_requests(&mut self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.load_requests)
    }

    /// Install decoded audio for a load started by `begin_load`.
    ///
    /// A decode failure leaves the deck `Empty`. Results for loads that
    /// were superseded are ignored.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<DecodedAudio>) -> Result<()> {
        let deck = ticket.deck;
        let i = deck.index();
        let pending = match self.pending[i].take() {
            Some(pending) if pending.ticket == ticket => pending,
            other => {
                self.pending[i] = other;
                log::debug!("Deck {}: Dropping stale load result", deck);
                return Ok(());
            }
        };

        let audio = match result {
            Ok(audio) if audio.frames() > 0 => audio,
            Ok(_) => {
                self.clear_deck(deck);
                let error = DjError::decode(&pending.track.path, "no audio frames");
                return self.fail(Some(deck), error);
            }
            Err(error) => {
                log::warn!("Deck {}: Load failed: {}", deck, error);
                self.clear_deck(deck);
                return self.fail(Some(deck), error);
            }
        };

        let mut track = pending.track;
        if track.duration_seconds <= 0.0 {
            let mut measured = Track::clone(&track);
            measured.duration_seconds = audio.duration_seconds();
            track = Arc::new(measured);
        }

        let pregain = self.pregain_for(&track);
        let start = track.start_cut_seconds;
        {
            let mut mixer = self.mixer.lock();
            let player = mixer.player_mut(deck);
            player.load(audio, track.playable_end_seconds());
            player.seek(start);
            let graph = mixer.graph_mut();
            graph.set_pregain(deck, pregain);
            graph.reset_eq(deck);
        }

        let d = &mut self.decks[i];
        d.track = Some(Arc::clone(&track));
        d.position_seconds = start;
        d.pregain = pregain;
        d.state = DeckState::Ready;

        log::info!(
            "Deck {}: Loaded {} ({:.1}s, pregain {:.2})",
            deck,
            track.display_name(),
            track.duration_seconds,
            pregain
        );
        self.emit(DjEvent::TrackLoaded { deck, track });
        self.emit_state(deck);
        self.emit_position(deck);

        match pending.intent {
            LoadIntent::Cue => {}
            LoadIntent::CrossfadeIn
                if deck != self.active && self.deck(self.active).is_playing() =>
            {
                self.start_crossfade(deck);
            }
            LoadIntent::Start | LoadIntent::CrossfadeIn => {
                self.make_active(deck);
                self.start_deck(deck);
                self.schedule_auto_advance();
            }
        }
        Ok(())
    }

    /// Decode pending loads on the calling thread.
    pub fn process_loads_blocking(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        for request in self.take_load_requests() {
            let result = self.decoder.decode(&request.path);
            if let Err(e) = self.finish_load(request.ticket, result) {
                outcome = Err(e);
            }
        }
        outcome
    }

    /// Load and decode on the calling thread.
    pub fn load_blocking(&mut self, deck: DeckId, path: &Path) -> Result<()> {
        self.load(deck, path)?;
        self.process_loads_blocking()
    }

    // Transport

    /// Start the active deck.
    ///
    /// An empty deck starts the current queue entry; a deck still loading
    /// starts as soon as the load completes.
    pub fn play(&mut self) -> Result<()> {
        let deck = self.active;
        let state = self.deck(deck).state;
        match state {
            DeckState::Empty => {
                if self.queue.is_empty() {
                    return self.fail(Some(deck), DjError::playback(deck, "no track loaded"));
                }
                let index = self.queue.current_index().unwrap_or(0);
                return self.play_index(index);
            }
            DeckState::Loading => {
                if let Some(pending) = self.pending[deck.index()].as_mut() {
                    pending.intent = LoadIntent::Start;
                }
                return Ok(());
            }
            DeckState::Playing => return Ok(()),
            DeckState::Ready | DeckState::Paused | DeckState::Stopped => {}
        }

        self.start_deck(deck);
        self.schedule_auto_advance();
        Ok(())
    }

    /// Pause the active deck. An in-flight crossfade is completed first.
    pub fn pause(&mut self) -> Result<()> {
        self.finish_crossfade();
        self.auto_advance.cancel();

        let deck = self.active;
        if !self.deck(deck).is_playing() {
            return Ok(());
        }
        let position = {
            let mut mixer = self.mixer.lock();
            let player = mixer.player_mut(deck);
            player.pause();
            player.position_seconds()
        };
        self.decks[deck.index()].position_seconds = position;
        self.set_state(deck, DeckState::Paused);
        log::info!("Deck {} paused", deck);
        Ok(())
    }

    /// Stop the active deck and rewind to its start cut.
    ///
    /// Idempotent: a stopped deck stays stopped at its start cut.
    pub fn stop(&mut self) -> Result<()> {
        self.finish_crossfade();
        self.auto_advance.cancel();
        self.stop_deck(self.active);
        Ok(())
    }

    /// Seek the active deck.
    pub fn seek(&mut self, position_seconds: f64) -> Result<()> {
        self.seek_deck(self.active, position_seconds)
    }

    /// Seek a deck. Out-of-range positions are rejected without moving.
    pub fn seek_deck(&mut self, deck: DeckId, position_seconds: f64) -> Result<()> {
        let d = self.deck(deck);
        if !d.state.has_track() {
            return self.fail(
                Some(deck),
                DjError::invalid(format!("deck {} has no track loaded", deck)),
            );
        }
        let duration = d.duration_seconds();
        if !position_seconds.is_finite() || !(0.0..=duration).contains(&position_seconds) {
            return self.fail(
                Some(deck),
                DjError::invalid(format!(
                    "seek position {}s outside 0..={:.2}s",
                    position_seconds, duration
                )),
            );
        }

        self.mixer.lock().player_mut(deck).seek(position_seconds);
        self.decks[deck.index()].position_seconds = position_seconds;
        log::info!("Deck {} seek to {:.2}s", deck, position_seconds);
        self.emit_position(deck);

        if deck == self.active {
            self.schedule_auto_advance();
        }
        Ok(())
    }

    /// Advance to the next queue entry.
    ///
    /// While playing, the entry is loaded on the other deck and crossfaded
    /// in; otherwise it starts on the active deck. A crossfade already in
    /// flight is completed first.
    pub fn next(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            log::info!("Queue is empty, nothing to play next");
            return Ok(());
        }
        let active = self.active;
        let (deck, intent) = if self.deck(active).is_playing() {
            (active.other(), LoadIntent::CrossfadeIn)
        } else {
            (active, LoadIntent::Start)
        };
        // A rejected next leaves the selector untouched
        self.ensure_not_loading(deck, "next")?;

        self.finish_crossfade();
        self.auto_advance.cancel();

        let Some(index) = self.selector.next(
            self.config.play_mode,
            self.queue.len(),
            self.queue.current_index(),
            self.queue.content_hash(),
        ) else {
            return Ok(());
        };
        self.load_queue_entry(index, deck, intent)
    }

    /// Step back one queue entry and start it on the active deck.
    pub fn prev(&mut self) -> Result<()> {
        self.ensure_not_loading(self.active, "prev")?;
        self.finish_crossfade();
        self.auto_advance.cancel();

        let Some(index) = self
            .selector
            .prev(self.queue.len(), self.queue.current_index())
        else {
            log::info!("Queue is empty, nothing to play");
            return Ok(());
        };
        self.load_queue_entry(index, self.active, LoadIntent::Start)
    }

    /// Start a queue entry on the active deck.
    pub fn play_index(&mut self, index: usize) -> Result<()> {
        if index >= self.queue.len() {
            return self.fail(
                None,
                DjError::invalid(format!(
                    "queue index {} out of range 0..{}",
                    index,
                    self.queue.len()
                )),
            );
        }
        self.ensure_not_loading(self.active, "play_index")?;
        self.finish_crossfade();
        self.auto_advance.cancel();
        self.load_queue_entry(index, self.active, LoadIntent::Start)
    }

    // Ticks

    /// Advance an in-flight crossfade by `dt` seconds.
    ///
    /// Returns true while the fade is still running.
    pub fn crossfade_tick(&mut self, dt: f64) -> bool {
        let Some(fade) = self.crossfade.as_mut() else {
            return false;
        };
        let done = fade.advance(dt);
        self.apply_crossfade_gains();
        if done {
            self.finish_crossfade();
            return false;
        }
        true
    }

    /// Read positions and meters from the mixer and react to tracks ending.
    pub fn poll_position(&mut self) {
        let (positions, ended, meters) = {
            let mut mixer = self.mixer.lock();
            let positions = DeckId::ALL.map(|d| mixer.player(d).position_seconds());
            let ended = DeckId::ALL.map(|d| mixer.player_mut(d).take_ended());
            (positions, ended, mixer.graph_mut().take_meters())
        };

        for deck in DeckId::ALL {
            let i = deck.index();
            self.decks[i].peak_level = meters.decks[i];
            if self.decks[i].state.has_track() && self.decks[i].position_seconds != positions[i] {
                self.decks[i].position_seconds = positions[i];
                self.emit_position(deck);
            }
        }
        self.emit(DjEvent::Meters(meters));

        for deck in DeckId::ALL {
            if ended[deck.index()] {
                self.handle_track_ended(deck);
            }
        }
    }

    /// Fire the auto-advance timer if it is due.
    pub fn fire_auto_advance(&mut self) -> Result<()> {
        if !self.auto_advance.take_due(Instant::now()) {
            return Ok(());
        }
        if !self.config.auto_dj || self.crossfade.is_some() || !self.is_playing() {
            return Ok(());
        }
        log::info!("Auto-DJ advancing from deck {}", self.active);
        self.next()
    }

    // Mixer controls

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
            return self.fail(
                None,
                DjError::invalid(format!("volume {} outside 0.0..=1.0", volume)),
            );
        }
        self.config.master_volume = volume;
        self.mixer.lock().graph_mut().set_master_volume(volume);
        log::info!("Master volume {:.2}", volume);
        self.emit_volume();
        Ok(())
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.muted = muted;
        self.mixer.lock().graph_mut().set_muted(muted);
        log::info!("Master {}", if muted { "muted" } else { "unmuted" });
        self.emit_volume();
    }

    /// Set the crossfade length. Returns the clamped value applied.
    pub fn set_crossfade_duration(&mut self, seconds: f64) -> Result<f64> {
        if !seconds.is_finite() || seconds < 0.0 {
            return self.fail(
                None,
                DjError::invalid(format!("crossfade duration {}s", seconds)),
            );
        }
        let seconds = seconds.clamp(MIN_CROSSFADE_SECONDS, MAX_CROSSFADE_SECONDS);
        self.config.crossfade_seconds = seconds;
        log::info!("Crossfade duration {:.2}s", seconds);
        self.schedule_auto_advance();
        Ok(seconds)
    }

    /// Flip cue monitoring for a deck. Returns the new state.
    pub fn toggle_cue(&mut self, deck: DeckId) -> bool {
        let enabled = !self.deck(deck).is_cue_monitored;
        self.decks[deck.index()].is_cue_monitored = enabled;
        self.mixer.lock().graph_mut().set_cue(deck, enabled);
        log::info!("Deck {} cue {}", deck, if enabled { "on" } else { "off" });
        self.emit(DjEvent::CueChanged { deck, enabled });
        enabled
    }

    pub fn set_cue_mix(&mut self, main_level: f32, cue_level: f32) -> Result<()> {
        for (name, level) in [("main", main_level), ("cue", cue_level)] {
            if !level.is_finite() || !(0.0..=1.0).contains(&level) {
                return self.fail(
                    None,
                    DjError::invalid(format!("cue mix {} level {} outside 0.0..=1.0", name, level)),
                );
            }
        }
        self.config.cue_mix_main = main_level;
        self.config.cue_mix_cue = cue_level;
        self.mixer.lock().graph_mut().set_cue_mix(main_level, cue_level);
        self.emit(DjEvent::CueMixChanged {
            main_level,
            cue_level,
        });
        Ok(())
    }

    pub fn set_pan(&mut self, deck: DeckId, pan: f32) -> Result<()> {
        if !pan.is_finite() || !(-1.0..=1.0).contains(&pan) {
            return self.fail(
                Some(deck),
                DjError::invalid(format!("pan {} outside -1.0..=1.0", pan)),
            );
        }
        self.decks[deck.index()].pan = pan;
        self.mixer.lock().graph_mut().set_pan(deck, pan);
        Ok(())
    }

    pub fn set_eq_band(&mut self, deck: DeckId, band: usize, gain_db: f32) -> Result<()> {
        if let Err(error) = check_band(band, gain_db) {
            return self.fail(Some(deck), error);
        }
        self.decks[deck.index()].eq_bands[band] = gain_db;
        self.mixer.lock().graph_mut().set_eq_band(deck, band, gain_db);
        log::debug!("Deck {} EQ band {} = {:+.1} dB", deck, band, gain_db);
        self.emit_eq(deck);
        Ok(())
    }

    /// Set all 16 bands. Nothing changes if any band is out of range.
    pub fn set_eq(&mut self, deck: DeckId, gains: [f32; EQ_BAND_COUNT]) -> Result<()> {
        for (band, gain_db) in gains.iter().enumerate() {
            if let Err(error) = check_band(band, *gain_db) {
                return self.fail(Some(deck), error);
            }
        }
        self.decks[deck.index()].eq_bands = gains;
        self.mixer.lock().graph_mut().set_eq(deck, gains);
        self.emit_eq(deck);
        Ok(())
    }

    pub fn apply_eq_preset(&mut self, deck: DeckId, preset: EqPreset) -> Result<()> {
        log::info!("Deck {} EQ preset {}", deck, preset);
        self.set_eq(deck, preset.gains())
    }

    /// Toggle loudness compensation; loaded decks update immediately.
    pub fn set_normalize(&mut self, enabled: bool) {
        self.config.normalize = enabled;
        for deck in DeckId::ALL {
            if let Some(track) = self.deck(deck).track.clone() {
                self.apply_pregain(deck, &track);
            }
        }
        log::info!("Normalize {}", if enabled { "on" } else { "off" });
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        self.config.play_mode = mode;
        log::info!("Play mode {}", mode);
    }

    pub fn set_auto_dj(&mut self, enabled: bool) {
        self.config.auto_dj = enabled;
        log::info!("Auto-DJ {}", if enabled { "on" } else { "off" });
        self.schedule_auto_advance();
    }

    // Cue navigation

    /// Seek to a hot cue from the loaded track's analysis.
    pub fn jump_to_hot_cue(&mut self, deck: DeckId, slot: usize) -> Result<()> {
        let Some(cue) = self.deck(deck).hot_cue(slot) else {
            return self.fail(
                Some(deck),
                DjError::invalid(format!("deck {} has no hot cue {}", deck, slot)),
            );
        };
        log::info!("Deck {} jumped to hot cue {} ({})", deck, slot, cue.label);
        self.seek_deck(deck, cue.time_seconds)
    }

    /// Seek to the analyzed cue-in point, or the start cut without analysis.
    pub fn jump_to_cue_in(&mut self, deck: DeckId) -> Result<()> {
        let Some(track) = self.deck(deck).track.as_ref() else {
            return self.fail(
                Some(deck),
                DjError::invalid(format!("deck {} has no track loaded", deck)),
            );
        };
        let target = track
            .analysis
            .as_ref()
            .map_or(track.start_cut_seconds, |a| a.cue_in_seconds);
        self.seek_deck(deck, target)
    }

    // Queue

    pub fn enqueue(&mut self, path: impl Into<PathBuf>) {
        let was_empty = self.queue.is_empty();
        self.queue.push(path);
        self.emit_queue();
        if was_empty {
            self.schedule_auto_advance();
        }
    }

    /// Remove a queue entry. Removing the current entry selects what
    /// `next` would have played.
    pub fn remove_from_queue(&mut self, index: usize) -> Result<PathBuf> {
        if index >= self.queue.len() {
            return self.fail(
                None,
                DjError::invalid(format!(
                    "queue index {} out of range 0..{}",
                    index,
                    self.queue.len()
                )),
            );
        }

        let current = self.queue.current_index();
        let successor = if current == Some(index) {
            self.selector.peek_next(
                self.config.play_mode,
                self.queue.len(),
                current,
                self.queue.content_hash(),
            )
        } else {
            None
        };

        let removed = self.queue.remove(index, successor).ok_or_else(|| {
            DjError::invalid(format!("queue index {} out of range", index))
        })?;
        log::info!("Removed {:?} from queue", removed);

        self.emit_queue();
        if current == Some(index) {
            self.emit_current_track();
        }
        if self.queue.is_empty() {
            self.auto_advance.cancel();
        }
        Ok(removed)
    }

    pub fn move_in_queue(&mut self, from: usize, to: usize) -> Result<()> {
        if !self.queue.move_item(from, to) {
            return self.fail(
                None,
                DjError::invalid(format!(
                    "cannot move queue entry {} to {} (length {})",
                    from,
                    to,
                    self.queue.len()
                )),
            );
        }
        self.emit_queue();
        Ok(())
    }

    /// Move a queue entry to play right after the current one.
    pub fn play_next(&mut self, index: usize) -> Result<()> {
        if index >= self.queue.len() {
            return self.fail(
                None,
                DjError::invalid(format!(
                    "queue index {} out of range 0..{}",
                    index,
                    self.queue.len()
                )),
            );
        }
        if self.queue.play_next(index) {
            self.emit_queue();
        }
        Ok(())
    }

    /// Replace the queue, e.g. with one restored at startup.
    pub fn set_queue(&mut self, snapshot: QueueSnapshot) {
        self.queue = Queue::from_snapshot(snapshot);
        self.selector.reset();
        log::info!("Queue set with {} entries", self.queue.len());
        self.emit_queue();
        self.emit_current_track();
        self.schedule_auto_advance();
    }

    // Analysis

    /// Publish a finished background analysis and refresh loaded decks.
    pub fn apply_analysis(&mut self, path: PathBuf, result: Result<Arc<Track>>) {
        let track = match result {
            Ok(track) => track,
            Err(error) => {
                let _ = self.fail::<()>(None, error);
                return;
            }
        };

        for deck in DeckId::ALL {
            let i = deck.index();
            let loaded = matches!(&self.decks[i].track, Some(t) if t.path == track.path);
            if loaded && self.decks[i].state != DeckState::Loading {
                self.decks[i].track = Some(Arc::clone(&track));
                self.apply_pregain(deck, &track);
            }
        }

        if let Some(analysis) = track.analysis.clone() {
            self.emit(DjEvent::AnalysisCompleted { path, analysis });
        }
    }

    // Internals

    fn ensure_not_loading(&self, deck: DeckId, operation: &'static str) -> Result<()> {
        if self.deck(deck).state == DeckState::Loading {
            return self.fail(Some(deck), DjError::Busy { deck, operation });
        }
        Ok(())
    }

    fn load_queue_entry(&mut self, index: usize, deck: DeckId, intent: LoadIntent) -> Result<()> {
        let Some(path) = self.queue.get(index).map(Path::to_path_buf) else {
            return Ok(());
        };
        self.begin_load(deck, &path, intent)?;
        self.queue.set_current(index);
        self.emit_current_track();
        Ok(())
    }

    fn start_deck(&mut self, deck: DeckId) {
        self.mixer.lock().player_mut(deck).play();
        self.set_state(deck, DeckState::Playing);
        log::info!("Deck {} playing", deck);
    }

    fn stop_deck(&mut self, deck: DeckId) {
        if !self.deck(deck).state.has_track() {
            return;
        }
        let start = self.deck(deck).start_cut_seconds();
        self.mixer.lock().player_mut(deck).stop(start);
        self.decks[deck.index()].position_seconds = start;
        if self.deck(deck).state != DeckState::Stopped {
            self.set_state(deck, DeckState::Stopped);
            self.emit_position(deck);
            log::info!("Deck {} stopped", deck);
        }
    }

    fn clear_deck(&mut self, deck: DeckId) {
        self.pending[deck.index()] = None;
        self.mixer.lock().player_mut(deck).eject();
        self.decks[deck.index()].eject();
        self.emit_state(deck);
    }

    /// Make `deck` the only deck on the main bus, pausing the other.
    fn make_active(&mut self, deck: DeckId) {
        let other = deck.other();
        if self.deck(other).is_playing() {
            self.mixer.lock().player_mut(other).pause();
            self.set_state(other, DeckState::Paused);
        }
        if self.active != deck {
            log::info!("Deck {} is now active", deck);
            self.active = deck;
        }
        self.decks[deck.index()].gain = self.config.channel_level;
        self.decks[other.index()].gain = 0.0;
        self.sync_gains();
    }

    fn start_crossfade(&mut self, to: DeckId) {
        let from = self.active;
        let fade = CrossfadeOperation::new(from, self.config.crossfade_seconds);
        self.crossfade = Some(fade);
        self.auto_advance.cancel();
        self.apply_crossfade_gains();
        self.start_deck(to);

        log::info!(
            "Crossfade {} -> {} over {:.1}s",
            from,
            to,
            fade.duration_seconds
        );
        self.emit(DjEvent::CrossfadeStarted {
            from,
            to,
            duration_seconds: fade.duration_seconds,
        });
    }

    /// Force an in-flight crossfade to its end state.
    ///
    /// Afterwards exactly one deck is active at full level and the other
    /// is paused at zero gain.
    fn finish_crossfade(&mut self) {
        let Some(mut fade) = self.crossfade.take() else {
            return;
        };
        fade.finish();
        let (from, to) = (fade.from_deck, fade.to_deck);

        let position = {
            let mut mixer = self.mixer.lock();
            let player = mixer.player_mut(from);
            player.pause();
            player.position_seconds()
        };
        self.decks[from.index()].position_seconds = position;
        if self.deck(from).is_playing() {
            self.set_state(from, DeckState::Paused);
        }

        self.active = to;
        self.decks[to.index()].gain = self.config.channel_level;
        self.decks[from.index()].gain = 0.0;
        self.sync_gains();

        log::info!("Crossfade complete, deck {} active", to);
        self.emit(DjEvent::CrossfadeCompleted { from, to });
        self.schedule_auto_advance();
    }

    fn apply_crossfade_gains(&mut self) {
        let Some(fade) = self.crossfade else {
            return;
        };
        let (from_gain, to_gain) = fade.gains(self.config.channel_level);
        self.decks[fade.from_deck.index()].gain = from_gain;
        self.decks[fade.to_deck.index()].gain = to_gain;
        self.sync_gains();
        log::debug!(
            "Crossfade {:.0}%: {} {:.3} / {} {:.3}",
            fade.progress() * 100.0,
            fade.from_deck,
            from_gain,
            fade.to_deck,
            to_gain
        );
    }

    fn sync_gains(&self) {
        let mut mixer = self.mixer.lock();
        let graph = mixer.graph_mut();
        for deck in DeckId::ALL {
            graph.set_gain(deck, self.deck(deck).gain);
        }
    }

    fn pregain_for(&self, track: &Track) -> f32 {
        if self.config.normalize {
            track.pregain_linear()
        } else {
            1.0
        }
    }

    fn apply_pregain(&mut self, deck: DeckId, track: &Track) {
        let pregain = self.pregain_for(track);
        self.decks[deck.index()].pregain = pregain;
        self.mixer.lock().graph_mut().set_pregain(deck, pregain);
    }

    /// Re-arm the auto-advance timer from the active deck's position.
    ///
    /// Always cancels first, so a stale deadline never survives.
    fn schedule_auto_advance(&mut self) {
        self.auto_advance.cancel();
        if !self.config.auto_dj || self.crossfade.is_some() || self.queue.is_empty() {
            return;
        }
        let deck = &self.decks[self.active.index()];
        if !deck.is_playing() {
            return;
        }
        let Some(track) = deck.track.as_ref() else {
            return;
        };

        let position = self.mixer.lock().player(self.active).position_seconds();
        let delay = seconds_until_advance(
            track.duration_seconds,
            track.end_cut_seconds,
            self.config.crossfade_seconds,
            position,
        );
        self.auto_advance.schedule(delay);
        log::debug!("Deck {}: Auto-advance in {:.1}s", self.active, delay);
    }

    fn handle_track_ended(&mut self, deck: DeckId) {
        log::info!("Deck {}: Track ended", deck);
        self.emit(DjEvent::TrackEnded { deck });

        if let Some(fade) = self.crossfade {
            self.finish_crossfade();
            if fade.from_deck == deck {
                return;
            }
        }

        self.stop_deck(deck);
        if deck == self.active && self.config.auto_dj && !self.queue.is_empty() {
            // Errors are already surfaced as events
            let _ = self.next();
        }
    }

    fn set_state(&mut self, deck: DeckId, state: DeckState) {
        if self.deck(deck).state != state {
            self.decks[deck.index()].state = state;
            self.emit_state(deck);
        }
    }

    /// Log, emit and return an error.
    fn fail<T>(&self, deck: Option<DeckId>, error: DjError) -> Result<T> {
        match deck {
            Some(deck) => log::error!("Deck {}: {}", deck, error),
            None => log::error!("{}", error),
        }
        self.emit(DjEvent::Error {
            deck,
            error: error.clone(),
        });
        Err(error)
    }

    fn emit(&self, event: DjEvent) {
        // No listener is not an error
        let _ = self.events.send(event);
    }

    fn emit_state(&self, deck: DeckId) {
        self.emit(DjEvent::DeckStateChanged {
            deck,
            state: self.deck(deck).state,
        });
    }

    fn emit_position(&self, deck: DeckId) {
        let d = self.deck(deck);
        self.emit(DjEvent::PositionChanged {
            deck,
            position_seconds: d.position_seconds,
            duration_seconds: d.duration_seconds(),
        });
    }

    fn emit_eq(&self, deck: DeckId) {
        self.emit(DjEvent::EqChanged {
            deck,
            bands: self.deck(deck).eq_bands,
        });
    }

    fn emit_volume(&self) {
        self.emit(DjEvent::VolumeChanged {
            volume: self.config.master_volume,
            muted: self.muted,
        });
    }

    fn emit_queue(&self) {
        self.emit(DjEvent::QueueChanged {
            queue: self.queue.snapshot(),
        });
    }

    fn emit_current_track(&self) {
        self.emit(DjEvent::CurrentTrackChanged {
            index: self.queue.current_index(),
            path: self.queue.current_path().map(Path::to_path_buf),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::library::TrackStore;

    /// Decoder that serves constant-level mono buffers by path.
    struct ScriptedDecoder {
        sample_rate: u32,
        lengths: HashMap<PathBuf, f64>,
    }

    impl MediaDecoder for ScriptedDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedAudio> {
            let seconds = self
                .lengths
                .get(path)
                .ok_or_else(|| DjError::decode(path, "unsupported format"))?;
            let frames = (seconds * self.sample_rate as f64) as usize;
            Ok(DecodedAudio::new(vec![0.25; frames], 1, self.sample_rate))
        }
    }

    const RATE: u32 = 1000;

    fn engine_with(config: EngineConfig) -> (PlaybackEngine, mpsc::UnboundedReceiver<DjEvent>) {
        let store = Arc::new(TrackStore::new());
        store.insert(Track::new("/music/one.wav", 30.0).with_cuts(2.0, 3.0).with_pregain(-6.0));
        store.insert(Track::new("/music/two.wav", 20.0));
        store.insert(Track::new("/music/three.wav", 1.0));
        // In the library but the decoder cannot read it
        store.insert(Track::new("/music/broken.xyz", 10.0));

        let decoder = ScriptedDecoder {
            sample_rate: RATE,
            lengths: [("/music/one.wav", 30.0), ("/music/two.wav", 20.0), ("/music/three.wav", 1.0)]
                .into_iter()
                .map(|(p, s)| (PathBuf::from(p), s))
                .collect(),
        };

        let config = EngineConfig {
            sample_rate: RATE,
            master_headroom_db: 0.0,
            ..config
        };
        let (engine, rx) = PlaybackEngine::new(config, store, Arc::new(decoder));
        (engine.with_selector(PlayOrderSelector::with_seed(7)), rx)
    }

    fn engine() -> (PlaybackEngine, mpsc::UnboundedReceiver<DjEvent>) {
        engine_with(EngineConfig::default())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DjEvent>) -> Vec<DjEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn render(engine: &PlaybackEngine, seconds: f64) {
        let frames = (seconds * RATE as f64) as usize;
        let mut main = vec![0.0; frames * 2];
        let mut cue = vec![0.0; frames * 2];
        engine.mixer().lock().render(&mut main, &mut cue);
    }

    #[test]
    fn test_load_applies_start_cut_and_pregain() {
        let (mut engine, _rx) = engine();
        engine.load_blocking(DeckId::A, Path::new("/music/one.wav")).unwrap();

        let deck = engine.deck(DeckId::A);
        assert_eq!(deck.state, DeckState::Ready);
        assert_eq!(deck.position_seconds, 2.0);
        assert!((deck.pregain - 0.501).abs() < 1e-3);
        let mixer = engine.mixer();
        let mixer = mixer.lock();
        assert!((mixer.player(DeckId::A).position_seconds() - 2.0).abs() < 1e-9);
        assert!((mixer.graph().channel(DeckId::A).pregain() - 0.501).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_off_skips_pregain() {
        let (mut engine, _rx) = engine_with(EngineConfig {
            normalize: false,
            ..EngineConfig::default()
        });
        engine.load_blocking(DeckId::A, Path::new("/music/one.wav")).unwrap();
        assert_eq!(engine.deck(DeckId::A).pregain, 1.0);

        engine.set_normalize(true);
        assert!((engine.deck(DeckId::A).pregain - 0.501).abs() < 1e-3);
    }

    #[test]
    fn test_missing_track_leaves_deck_empty() {
        let (mut engine, mut rx) = engine();
        let err = engine.load(DeckId::B, Path::new("/music/nope.wav")).unwrap_err();
        assert_eq!(err.kind(), "track_not_found");
        assert_eq!(engine.deck(DeckId::B).state, DeckState::Empty);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            DjEvent::Error {
                deck: Some(DeckId::B),
                ..
            }
        )));
    }

    #[test]
    fn test_decode_failure_isolated_to_deck() {
        let (mut engine, mut rx) = engine();
        engine.load_blocking(DeckId::A, Path::new("/music/two.wav")).unwrap();
        engine.play().unwrap();

        let err = engine
            .load_blocking(DeckId::B, Path::new("/music/broken.xyz"))
            .unwrap_err();
        assert_eq!(err.kind(), "decode");
        assert_eq!(engine.deck(DeckId::B).state, DeckState::Empty);
        assert!(engine.deck(DeckId::B).track.is_none());
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Playing);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, DjEvent::Error { error: DjError::Decode { .. }, .. })));
    }

    #[test]
    fn test_second_load_is_rejected() {
        let (mut engine, _rx) = engine();
        engine.load(DeckId::A, Path::new("/music/one.wav")).unwrap();
        let err = engine.load(DeckId::A, Path::new("/music/two.wav")).unwrap_err();
        assert_eq!(err.kind(), "busy");

        // The first load is untouched
        engine.process_loads_blocking().unwrap();
        let track = engine.deck(DeckId::A).track.clone().unwrap();
        assert_eq!(track.path, PathBuf::from("/music/one.wav"));
    }

    #[test]
    fn test_stale_load_result_ignored() {
        let (mut engine, _rx) = engine();
        let ticket = engine
            .begin_load(DeckId::A, Path::new("/music/one.wav"), LoadIntent::Cue)
            .unwrap();
        engine.take_load_requests();
        engine.finish_load(ticket, Err(DjError::decode("/music/one.wav", "bad"))).unwrap_err();

        // Late duplicate for the same ticket does nothing
        let audio = DecodedAudio::new(vec![0.1; 1000], 1, RATE);
        engine.finish_load(ticket, Ok(audio)).unwrap();
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Empty);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut engine, _rx) = engine();
        engine.load_blocking(DeckId::A, Path::new("/music/one.wav")).unwrap();
        engine.play().unwrap();
        render(&engine, 1.5);
        engine.poll_position();
        assert!((engine.position_seconds() - 3.5).abs() < 1e-6);

        for _ in 0..2 {
            engine.stop().unwrap();
            assert_eq!(engine.position_seconds(), 2.0);
            assert!(!engine.is_playing());
            assert_eq!(engine.deck(DeckId::A).state, DeckState::Stopped);
        }
    }

    #[test]
    fn test_play_without_track_fails() {
        let (mut engine, _rx) = engine();
        let err = engine.play().unwrap_err();
        assert_eq!(err.kind(), "playback");
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Empty);
    }

    #[test]
    fn test_seek_validation() {
        let (mut engine, _rx) = engine();
        engine.load_blocking(DeckId::A, Path::new("/music/two.wav")).unwrap();
        assert!(engine.seek(-1.0).is_err());
        assert!(engine.seek(f64::NAN).is_err());
        assert!(engine.seek(25.0).is_err());
        assert_eq!(engine.position_seconds(), 0.0);

        engine.seek(12.5).unwrap();
        assert_eq!(engine.position_seconds(), 12.5);
    }

    #[test]
    fn test_auto_advance_follows_play_state() {
        let (mut engine, _rx) = engine();
        engine.enqueue("/music/one.wav");
        engine.enqueue("/music/two.wav");
        engine.play().unwrap();
        engine.process_loads_blocking().unwrap();
        assert!(engine.is_playing());
        assert!(engine.auto_advance_deadline().is_some());

        engine.pause().unwrap();
        assert!(engine.auto_advance_deadline().is_none());

        engine.play().unwrap();
        assert!(engine.auto_advance_deadline().is_some());
        engine.stop().unwrap();
        assert!(engine.auto_advance_deadline().is_none());

        engine.play().unwrap();
        engine.set_auto_dj(false);
        assert!(engine.auto_advance_deadline().is_none());
    }

    #[test]
    fn test_next_crossfades_into_other_deck() {
        let (mut engine, mut rx) = engine_with(EngineConfig {
            crossfade_seconds: 1.0,
            ..EngineConfig::default()
        });
        engine.set_queue(QueueSnapshot {
            paths: vec!["/music/one.wav".into(), "/music/two.wav".into()],
            current_index: Some(0),
        });
        engine.play().unwrap();
        engine.process_loads_blocking().unwrap();
        assert_eq!(engine.active_deck(), DeckId::A);

        engine.next().unwrap();
        engine.process_loads_blocking().unwrap();
        assert!(engine.is_crossfading());
        assert_eq!(engine.deck(DeckId::B).state, DeckState::Playing);
        assert_eq!(engine.queue().current_index(), Some(1));

        let mut ticks = 0;
        while engine.crossfade_tick(0.25) {
            let sum = engine.deck(DeckId::A).gain + engine.deck(DeckId::B).gain;
            assert!((sum - 1.0).abs() < 1e-5);
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert_eq!(engine.active_deck(), DeckId::B);
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Paused);
        assert_eq!(engine.deck(DeckId::A).gain, 0.0);
        assert_eq!(engine.deck(DeckId::B).gain, 1.0);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            DjEvent::CrossfadeCompleted {
                from: DeckId::A,
                to: DeckId::B
            }
        )));
    }

    #[test]
    fn test_busy_next_keeps_shuffle_bag() {
        let (mut engine, mut rx) = engine_with(EngineConfig {
            play_mode: PlayMode::RandomNoRepeat,
            ..EngineConfig::default()
        });
        engine.set_queue(QueueSnapshot {
            paths: vec![
                "/music/one.wav".into(),
                "/music/two.wav".into(),
                "/music/three.wav".into(),
            ],
            current_index: Some(0),
        });
        engine.play().unwrap();
        engine.process_loads_blocking().unwrap();

        engine.next().unwrap();
        assert_eq!(engine.deck(DeckId::B).state, DeckState::Loading);
        let remaining = engine.selector.bag().remaining();
        let current = engine.queue().current_index();
        drain(&mut rx);

        let err = engine.next().unwrap_err();
        assert_eq!(err.kind(), "busy");
        assert_eq!(engine.selector.bag().remaining(), remaining);
        assert_eq!(engine.queue().current_index(), current);
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Playing);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            DjEvent::Error {
                deck: Some(DeckId::B),
                error: DjError::Busy { .. },
            }
        )));

        // The pending load still completes
        engine.process_loads_blocking().unwrap();
        assert_eq!(engine.deck(DeckId::B).state, DeckState::Playing);
    }

    #[test]
    fn test_next_mid_fade_completes_it() {
        let (mut engine, _rx) = engine();
        engine.set_queue(QueueSnapshot {
            paths: vec!["/music/one.wav".into(), "/music/two.wav".into()],
            current_index: Some(0),
        });
        engine.play().unwrap();
        engine.process_loads_blocking().unwrap();
        engine.next().unwrap();
        engine.process_loads_blocking().unwrap();
        engine.crossfade_tick(1.0);
        assert!(engine.is_crossfading());

        engine.next().unwrap();
        // The previous fade finished with B active; the new entry goes to A
        assert_eq!(engine.deck(DeckId::B).gain, 1.0);
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Loading);
        engine.process_loads_blocking().unwrap();
        assert!(engine.is_crossfading());
        assert_eq!(engine.crossfade().unwrap().to_deck, DeckId::A);
    }

    #[test]
    fn test_track_end_advances_with_auto_dj() {
        let (mut engine, _rx) = engine();
        engine.set_queue(QueueSnapshot {
            paths: vec!["/music/three.wav".into(), "/music/two.wav".into()],
            current_index: Some(0),
        });
        engine.play().unwrap();
        engine.process_loads_blocking().unwrap();

        render(&engine, 1.2);
        engine.poll_position();
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Loading);
        engine.process_loads_blocking().unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.queue().current_index(), Some(1));
    }

    #[test]
    fn test_track_end_stops_without_auto_dj() {
        let (mut engine, _rx) = engine_with(EngineConfig {
            auto_dj: false,
            ..EngineConfig::default()
        });
        engine.load_blocking(DeckId::A, Path::new("/music/three.wav")).unwrap();
        engine.play().unwrap();
        render(&engine, 1.2);
        engine.poll_position();
        assert_eq!(engine.deck(DeckId::A).state, DeckState::Stopped);
        assert_eq!(engine.position_seconds(), 0.0);
    }

    #[test]
    fn test_mixer_controls_validate() {
        let (mut engine, _rx) = engine();
        assert!(engine.set_volume(1.5).is_err());
        engine.set_volume(0.5).unwrap();
        assert_eq!(engine.mixer().lock().graph().master_volume(), 0.5);

        assert!(engine.set_crossfade_duration(-1.0).is_err());
        assert!(engine.set_crossfade_duration(f64::INFINITY).is_err());
        assert_eq!(engine.set_crossfade_duration(120.0).unwrap(), MAX_CROSSFADE_SECONDS);
        assert_eq!(engine.set_crossfade_duration(0.0).unwrap(), MIN_CROSSFADE_SECONDS);

        assert!(engine.set_cue_mix(0.5, 2.0).is_err());
        assert!(engine.set_pan(DeckId::A, -1.5).is_err());
    }

    #[test]
    fn test_eq_rejects_before_mutating() {
        let (mut engine, _rx) = engine();
        assert!(engine.set_eq_band(DeckId::A, 16, 0.0).is_err());
        assert!(engine.set_eq_band(DeckId::A, 3, 13.0).is_err());

        let mut gains = [1.0; EQ_BAND_COUNT];
        gains[15] = -20.0;
        assert!(engine.set_eq(DeckId::A, gains).is_err());
        assert_eq!(engine.deck(DeckId::A).eq_bands, [0.0; EQ_BAND_COUNT]);

        engine.apply_eq_preset(DeckId::B, EqPreset::BassBoost).unwrap();
        assert_eq!(engine.deck(DeckId::B).eq_bands, EqPreset::BassBoost.gains());
        assert_eq!(
            engine.mixer().lock().graph().channel(DeckId::B).eq_gains(),
            EqPreset::BassBoost.gains()
        );
    }

    #[test]
    fn test_toggle_cue() {
        let (mut engine, mut rx) = engine();
        assert!(engine.toggle_cue(DeckId::B));
        assert!(engine.mixer().lock().graph().channel(DeckId::B).is_cued());
        assert!(!engine.toggle_cue(DeckId::B));
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            DjEvent::CueChanged {
                deck: DeckId::B,
                enabled: true
            }
        )));
    }

    #[test]
    fn test_remove_current_selects_next() {
        let (mut engine, _rx) = engine();
        engine.set_queue(QueueSnapshot {
            paths: vec!["/a.wav".into(), "/b.wav".into(), "/c.wav".into()],
            current_index: Some(1),
        });
        engine.remove_from_queue(1).unwrap();
        assert_eq!(engine.queue().current_path(), Some(Path::new("/c.wav")));
        assert!(engine.remove_from_queue(5).is_err());
    }
}
