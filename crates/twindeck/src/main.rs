use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use twindeck_dj::module::{output_devices, OutputConfig};
use twindeck_dj::{
    analyze_file, ConfigManager, DjAudioEngine, DjCommand, DjEvent, EngineRunner, PlayMode,
    PlaybackEngine, SymphoniaDecoder, Track, TrackStore,
};

/// Dual-deck DJ player with Auto-DJ crossfading.
#[derive(Parser, Debug)]
#[command(name = "twindeck")]
#[command(about = "Twindeck DJ player")]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze tracks and print the results as JSON
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Play tracks with Auto-DJ until the queue ends or Ctrl-C
    Play {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Queue play order (in_order, repeat_one, repeat_all, shuffle, random_no_repeat)
        #[arg(long, value_parser = parse_mode)]
        mode: Option<PlayMode>,

        /// Crossfade length in seconds
        #[arg(long)]
        crossfade: Option<f64>,

        /// Output device name
        #[arg(long)]
        device: Option<String>,

        /// Analyze each track first and apply its loudness pregain
        #[arg(long, default_value = "false")]
        analyze: bool,
    },
    /// List audio output devices
    Devices,
}

fn parse_mode(s: &str) -> Result<PlayMode, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ConfigManager::new(args.config);
    let mut settings = config.load()?;

    match args.command {
        Command::Analyze { files } => {
            let decoder = SymphoniaDecoder;
            for path in files {
                match analyze_file(&path, &decoder, &settings.analysis) {
                    Ok(result) => {
                        let output = serde_json::json!({ "path": path, "analysis": result });
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                    Err(e) => eprintln!("{}: {}", path.display(), e),
                }
            }
        }
        Command::Play {
            files,
            mode,
            crossfade,
            device,
            analyze,
        } => {
            if let Some(mode) = mode {
                settings.engine.play_mode = mode;
            }
            if let Some(seconds) = crossfade {
                settings.engine.crossfade_seconds = seconds;
            }
            if let Some(device) = device {
                settings.engine.device_name = device;
            }
            settings.engine.auto_dj = true;
            config.update_settings(settings.clone())?;
            play(files, settings, analyze).await?;
        }
        Command::Devices => {
            for device in output_devices() {
                println!(
                    "{}{} ({} channels)",
                    if device.is_default { "* " } else { "  " },
                    device.name,
                    device.channels
                );
            }
        }
    }

    Ok(())
}

async fn play(
    files: Vec<PathBuf>,
    settings: twindeck_dj::Settings,
    analyze: bool,
) -> Result<(), anyhow::Error> {
    let store = Arc::new(TrackStore::new());
    for path in &files {
        // Duration is measured at load
        store.insert(Track::new(path.clone(), 0.0));
    }

    let (engine, mut events) = PlaybackEngine::new(
        settings.engine.clone(),
        store.clone(),
        Arc::new(SymphoniaDecoder),
    );

    let mut output = DjAudioEngine::new(OutputConfig::from(&settings.engine), engine.mixer());
    output.start()?;
    if !output.has_cue_output() {
        log::info!("Stereo device, headphone cue bus not routed");
    }

    let (commands, rx) = mpsc::channel(64);
    let runner = EngineRunner::new(engine, store, settings.analysis.clone());
    let handle = tokio::spawn(runner.run(rx));

    for path in &files {
        if analyze {
            commands
                .send(DjCommand::Analyze {
                    path: path.clone(),
                    apply_pregain: true,
                })
                .await?;
        }
        commands
            .send(DjCommand::Enqueue { path: path.clone() })
            .await?;
    }
    commands.send(DjCommand::Play).await?;

    let total = files.len();
    let mut started = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    DjEvent::CurrentTrackChanged { index, path } => {
                        started += 1;
                        if started > total && settings.engine.play_mode == PlayMode::InOrder {
                            log::info!("Queue finished");
                            break;
                        }
                        if let (Some(index), Some(path)) = (index, path) {
                            println!("[{}/{}] {}", index + 1, total, path.display());
                        }
                    }
                    DjEvent::TrackLoaded { deck, track } => {
                        log::info!("Deck {} loaded {}", deck, track.display_name());
                    }
                    DjEvent::CrossfadeStarted { from, to, duration_seconds } => {
                        log::info!("Crossfading {} -> {} over {:.1}s", from, to, duration_seconds);
                    }
                    DjEvent::TrackEnded { deck } => {
                        log::info!("Deck {} ended", deck);
                        if started >= total && settings.engine.play_mode == PlayMode::InOrder {
                            log::info!("Queue finished");
                            break;
                        }
                    }
                    DjEvent::AnalysisCompleted { path, analysis } => {
                        log::info!(
                            "{}: {:.1} BPM, {}, {:.1} LUFS",
                            path.display(),
                            analysis.bpm,
                            analysis.key,
                            analysis.loudness_lufs
                        );
                    }
                    DjEvent::Error { deck, error } => match deck {
                        Some(deck) => log::warn!("Deck {}: {}", deck, error),
                        None => log::warn!("{}", error),
                    },
                    _ => {}
                }
            }
        }
    }

    commands.send(DjCommand::Shutdown).await?;
    let engine = handle.await?;
    output.stop();

    log::debug!("Final state: {}", serde_json::to_string(&engine.snapshot())?);
    Ok(())
}
