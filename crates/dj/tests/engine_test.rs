//! Playback engine scenarios driven through the public API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use twindeck_dj::queue::PlayOrderSelector;
use twindeck_dj::{
    AnalysisConfig, DecodedAudio, DeckId, DeckState, DjCommand, DjError, DjEvent, EngineConfig,
    EngineRunner, MediaDecoder, PlaybackEngine, Result, Track, TrackStore,
};

const RATE: u32 = 1000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serves constant-level mono buffers for known paths.
struct ToneDecoder {
    lengths: HashMap<PathBuf, f64>,
}

impl MediaDecoder for ToneDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let seconds = self
            .lengths
            .get(path)
            .ok_or_else(|| DjError::Decode {
                path: path.to_path_buf(),
                reason: "unsupported format".to_string(),
            })?;
        let frames = (seconds * RATE as f64) as usize;
        Ok(DecodedAudio::new(vec![0.5; frames], 1, RATE))
    }
}

fn library() -> (Arc<TrackStore>, Arc<ToneDecoder>) {
    let store = Arc::new(TrackStore::new());
    let mut lengths = HashMap::new();
    for (name, seconds) in [("intro.wav", 40.0), ("peak.wav", 60.0), ("outro.wav", 30.0)] {
        let path = PathBuf::from("/set").join(name);
        store.insert(Track::new(path.clone(), seconds));
        lengths.insert(path, seconds);
    }
    store.insert(Track::new("/set/corrupt.flac", 10.0));
    (store, Arc::new(ToneDecoder { lengths }))
}

fn engine() -> (PlaybackEngine, mpsc::UnboundedReceiver<DjEvent>) {
    let (store, decoder) = library();
    let config = EngineConfig {
        sample_rate: RATE,
        crossfade_seconds: 1.0,
        ..EngineConfig::default()
    };
    let (engine, rx) = PlaybackEngine::new(config, store, decoder);
    (engine.with_selector(PlayOrderSelector::with_seed(3)), rx)
}

fn set(name: &str) -> PathBuf {
    PathBuf::from("/set").join(name)
}

#[test]
fn test_stop_twice_is_a_no_op() {
    let (mut engine, _rx) = engine();
    engine.load_blocking(DeckId::A, &set("intro.wav")).unwrap();
    engine.play().unwrap();
    engine.seek(12.0).unwrap();

    engine.stop().unwrap();
    let first = (engine.deck(DeckId::A).state, engine.position_seconds());
    engine.stop().unwrap();
    let second = (engine.deck(DeckId::A).state, engine.position_seconds());

    assert_eq!(first, second);
    assert_eq!(first.0, DeckState::Stopped);
    assert_eq!(first.1, 0.0);
    assert!(engine.auto_advance_deadline().is_none());
}

#[test]
fn test_queue_crossfade_keeps_gain_sum() {
    let (mut engine, _rx) = engine();
    for name in ["intro.wav", "peak.wav", "outro.wav"] {
        engine.enqueue(set(name));
    }

    engine.play().unwrap();
    engine.process_loads_blocking().unwrap();
    assert_eq!(engine.queue().current_index(), Some(0));
    assert!(engine.is_playing());

    engine.next().unwrap();
    engine.process_loads_blocking().unwrap();
    assert!(engine.is_crossfading());

    let mixer = engine.mixer();
    let level = engine.config().channel_level;
    while engine.crossfade_tick(0.1) {
        let guard = mixer.lock();
        let sum = guard.graph().channel(DeckId::A).gain() + guard.graph().channel(DeckId::B).gain();
        assert!((sum - level).abs() < 1e-5, "gain sum {}", sum);
    }

    assert!(!engine.is_crossfading());
    assert_eq!(engine.active_deck(), DeckId::B);
    assert_eq!(engine.queue().current_index(), Some(1));
    assert_eq!(engine.deck(DeckId::A).state, DeckState::Paused);
    assert_eq!(engine.deck(DeckId::B).state, DeckState::Playing);
    assert_eq!(mixer.lock().graph().channel(DeckId::A).gain(), 0.0);
}

#[test]
fn test_failed_load_leaves_other_deck_playing() {
    init_logging();
    let (mut engine, mut rx) = engine();
    engine.load_blocking(DeckId::A, &set("peak.wav")).unwrap();
    engine.play().unwrap();

    let err = engine.load_blocking(DeckId::B, &set("corrupt.flac")).unwrap_err();
    assert_eq!(err.kind(), "decode");
    assert_eq!(engine.deck(DeckId::B).state, DeckState::Empty);
    assert_eq!(engine.deck(DeckId::A).state, DeckState::Playing);

    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        if let DjEvent::Error { deck, error } = event {
            assert_eq!(deck, Some(DeckId::B));
            assert_eq!(error.kind(), "decode");
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_runner_loads_and_plays() {
    init_logging();
    let (store, decoder) = library();
    let config = EngineConfig {
        sample_rate: RATE,
        ..EngineConfig::default()
    };
    let (engine, mut events) = PlaybackEngine::new(config, store.clone(), decoder);
    let runner = EngineRunner::new(engine, store, AnalysisConfig::default());

    let (commands, rx) = mpsc::channel(16);
    let handle = tokio::spawn(runner.run(rx));

    commands
        .send(DjCommand::Enqueue {
            path: set("intro.wav"),
        })
        .await
        .unwrap();
    commands.send(DjCommand::Play).await.unwrap();

    let playing = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let DjEvent::DeckStateChanged {
                deck: DeckId::A,
                state: DeckState::Playing,
            } = event
            {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(playing);

    commands.send(DjCommand::Shutdown).await.unwrap();
    let engine = handle.await.unwrap();
    assert_eq!(engine.deck(DeckId::A).state, DeckState::Playing);
    assert_eq!(
        engine.deck(DeckId::A).track.as_ref().map(|t| t.path.clone()),
        Some(set("intro.wav"))
    );
    assert_eq!(engine.queue().current_index(), Some(0));
    // 40s track, 8s crossfade
    assert!(engine.auto_advance_deadline().is_some());
}
