//! Async driver for the playback engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::engine::{LoadTicket, PlaybackEngine};
use super::DjCommand;
use crate::analysis::{spawn_analysis, AnalysisJob};
use crate::config::AnalysisConfig;
use crate::error::{DjError, Result};
use crate::library::{DecodedAudio, Track, TrackStore};

type LoadResult = (LoadTicket, Result<DecodedAudio>);
type AnalysisOutcome = (PathBuf, Result<Arc<Track>>);

/// Owns a [`PlaybackEngine`] and drives it from a tokio task.
///
/// Services commands, runs the position tick continuously and the crossfade
/// tick only while a fade is in flight, decodes loads on the blocking pool
/// and fires the auto-advance timer.
pub struct EngineRunner {
    engine: PlaybackEngine,
    store: Arc<TrackStore>,
    analysis: AnalysisConfig,
}

impl EngineRunner {
    pub fn new(engine: PlaybackEngine, store: Arc<TrackStore>, analysis: AnalysisConfig) -> Self {
        Self {
            engine,
            store,
            analysis,
        }
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    /// Run until `Shutdown` or until every command sender is dropped.
    ///
    /// Returns the engine so callers can inspect its final state.
    pub async fn run(mut self, mut commands: mpsc::Receiver<DjCommand>) -> PlaybackEngine {
        log::info!("Playback engine running");

        let (load_tx, mut load_rx) = mpsc::unbounded_channel::<LoadResult>();
        let (analysis_tx, mut analysis_rx) = mpsc::unbounded_channel::<AnalysisOutcome>();

        let mut position_interval = tokio::time::interval(Duration::from_millis(
            self.engine.config().position_tick_ms,
        ));
        position_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut crossfade_interval: Option<Interval> = None;
        let mut last_crossfade_tick = Instant::now();

        loop {
            self.dispatch_loads(&load_tx);

            // The ramp timer exists only while a fade is in flight
            match (self.engine.is_crossfading(), crossfade_interval.is_some()) {
                (true, false) => {
                    let period = Duration::from_millis(self.engine.config().crossfade_tick_ms);
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    crossfade_interval = Some(interval);
                    last_crossfade_tick = Instant::now();
                    log::debug!("Crossfade tick started");
                }
                (false, true) => {
                    crossfade_interval = None;
                    log::debug!("Crossfade tick stopped");
                }
                _ => {}
            }

            let auto_deadline = self.engine.auto_advance_deadline();

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        None | Some(DjCommand::Shutdown) => {
                            log::info!("Playback engine received shutdown");
                            break;
                        }
                        Some(DjCommand::Analyze { path, apply_pregain }) => {
                            self.start_analysis(path, apply_pregain, &analysis_tx);
                        }
                        Some(command) => {
                            log::debug!("Playback engine received command: {:?}", command);
                            // Failures are already emitted as events
                            let _ = self.engine.handle_command(command);
                        }
                    }
                }
                Some((ticket, result)) = load_rx.recv() => {
                    let _ = self.engine.finish_load(ticket, result);
                }
                Some((path, result)) = analysis_rx.recv() => {
                    self.engine.apply_analysis(path, result);
                }
                _ = position_interval.tick() => {
                    self.engine.poll_position();
                }
                now = tick(&mut crossfade_interval) => {
                    let dt = now.saturating_duration_since(last_crossfade_tick).as_secs_f64();
                    last_crossfade_tick = now;
                    self.engine.crossfade_tick(dt);
                }
                _ = sleep_until(auto_deadline) => {
                    let _ = self.engine.fire_auto_advance();
                }
            }
        }

        log::info!("Playback engine stopped");
        self.engine
    }

    /// Decode queued loads on the blocking pool.
    fn dispatch_loads(&mut self, results: &mpsc::UnboundedSender<LoadResult>) {
        for request in self.engine.take_load_requests() {
            let decoder = self.engine.decoder();
            let results = results.clone();
            tokio::task::spawn_blocking(move || {
                let result = decoder.decode(&request.path);
                let _ = results.send((request.ticket, result));
            });
        }
    }

    fn start_analysis(
        &self,
        path: PathBuf,
        apply_pregain: bool,
        results: &mpsc::UnboundedSender<AnalysisOutcome>,
    ) {
        log::info!("Queueing analysis of {:?}", path);
        let handle = spawn_analysis(
            path.clone(),
            self.engine.decoder(),
            Arc::clone(&self.store),
            AnalysisJob {
                config: self.analysis.clone(),
                apply_pregain,
            },
        );
        let results = results.clone();
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(DjError::decode(&path, format!("analysis task failed: {}", e))),
            };
            let _ = results.send((path, outcome));
        });
    }
}

async fn tick(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
