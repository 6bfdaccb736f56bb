use videowall::cli::Args;
use videowall::config::Config;
use videowall::pipeline::{FrameConsumer, StepOutcome, StreamingPipeline};
use videowall::playback::{PlaybackLoop, PlaybackState, TickOutcome};
use videowall::render::{LogRenderer, Renderer};
use videowall::server::{FrameMailbox, MailboxRenderer, PlayerCommand, SharedState, StreamServer};
use videowall::source::MemoryFrameSource;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    args.apply_to(&mut config);
    config.validate().context("validating config")?;

    let source = MemoryFrameSource::from_json(&args.dataset)
        .with_context(|| format!("loading dataset {}", args.dataset.display()))?;

    // one heartbeat line per second of playback
    let heartbeat = config.framerate.round().max(1.0) as u64;
    let interval = Duration::from_secs_f64(1.0 / config.framerate);

    // --serve publishes frames into the HTTP mailbox instead of the log
    let mut commands = None;
    let mut shared = None;
    let mut renderer: Box<dyn Renderer> = if args.serve {
        let mailbox = Arc::new(FrameMailbox::new());
        let state = Arc::new(SharedState::default());
        commands = Some(StreamServer::start(config.port, Arc::clone(&mailbox), Arc::clone(&state)));
        shared = Some(state);
        Box::new(MailboxRenderer::new(mailbox))
    } else {
        Box::new(LogRenderer::new(heartbeat))
    };

    if args.pipeline {
        run_pipeline(source, config, renderer, interval, args.max_ticks)
    } else {
        run_playback(
            source,
            config,
            renderer.as_mut(),
            commands,
            shared,
            interval,
            args.max_ticks,
        )
    }
}

/// Single-threaded driver: one tick per interval, commands polled between
/// ticks.
fn run_playback(
    source: MemoryFrameSource,
    config: Config,
    renderer: &mut dyn Renderer,
    commands: Option<mpsc::Receiver<PlayerCommand>>,
    shared: Option<Arc<SharedState>>,
    interval: Duration,
    max_ticks: Option<u64>,
) -> anyhow::Result<()> {
    let mut playback = PlaybackLoop::new(source, config)?;

    loop {
        let started = Instant::now();

        if let Some(rx) = &commands {
            loop {
                match rx.try_recv() {
                    Ok(PlayerCommand::Pause) => playback.pause(),
                    Ok(PlayerCommand::Resume) => playback.resume(),
                    Ok(PlayerCommand::Stop) => {
                        info!("stopped by request after {} ticks", playback.ticks());
                        return Ok(());
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!("command channel disconnected");
                        break;
                    }
                }
            }
        }

        match playback.tick() {
            TickOutcome::Continue(model) => {
                renderer.render(&model);
                if let Some(state) = &shared {
                    let mut status = state.status.write().unwrap();
                    status.clock = model.clock;
                    status.window = model.window;
                    status.ticks = playback.ticks();
                    status.state = match playback.state() {
                        PlaybackState::Running => "running",
                        PlaybackState::Paused => "paused",
                    }
                    .to_string();
                    status.boxes = model.boxes.len();
                    status.lines = model.lines.len();
                    let (attrs, colors) = playback.cache_sizes();
                    status.attribute_cache = attrs;
                    status.color_cache = colors;
                }
            }
            TickOutcome::EndOfStream => break,
            // already logged at the tick boundary; next tick proceeds
            TickOutcome::Recovered(_) => {}
        }

        if let Some(max) = max_ticks {
            if playback.ticks() >= max {
                info!("tick limit {} reached", max);
                break;
            }
        }

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    info!("playback finished after {} ticks", playback.ticks());
    Ok(())
}

/// Pipeline driver: the interval timer is the consumer's advance signal.
fn run_pipeline(
    source: MemoryFrameSource,
    config: Config,
    renderer: Box<dyn Renderer>,
    interval: Duration,
    max_ticks: Option<u64>,
) -> anyhow::Result<()> {
    let pipeline = StreamingPipeline::start(source, config.channel_capacity);
    let counters = pipeline.counters();
    let mut consumer = FrameConsumer::new(pipeline, renderer, &config);

    let mut steps: u64 = 0;
    loop {
        let started = Instant::now();
        match consumer.step()? {
            StepOutcome::Continue => steps += 1,
            StepOutcome::EndOfStream => break,
        }
        if let Some(max) = max_ticks {
            if steps >= max {
                info!("tick limit {} reached", max);
                break;
            }
        }
        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    info!(
        "pipeline finished: {} produced, {} consumed",
        counters.produced(),
        counters.consumed()
    );
    Ok(())
}
