//! Landmark relay: receives pose landmarks and drives VMT/VMC trackers.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webhtc_tracker::{
    camera::{LandmarkFeed, PacketEstimator},
    config::Config,
    diagnostics,
    engine::{Command, EngineHandle},
    events::{event_channel, CalibrationEvent, EngineEvent, EVENT_QUEUE_CAPACITY},
    tracker::TrackingMode,
    transport::OscTransport,
};

const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const SIGNAL_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "webhtc-tracker", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Landmark feed address (overrides config)
    #[arg(long)]
    feed: Option<String>,

    /// Run without the interactive prompt
    #[arg(long)]
    headless: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", webhtc_tracker::NAME, webhtc_tracker::VERSION);

    let mut config = Config::load_or_default(&args.config);
    if let Some(feed) = args.feed {
        config.camera.feed_addr = feed;
    }
    info!(
        "Mode: {:?}, fingers: {}, smoothing: {}",
        config.tracking.mode, config.tracking.use_fingers, config.tracking.smooth_factor
    );

    diagnostics::probe_outputs(&config.network);

    let feed = LandmarkFeed::from_config(&config.camera)
        .with_context(|| format!("Failed to open landmark feed on {}", config.camera.feed_addr))?;
    let estimator = PacketEstimator::from_config(&config.tracking);
    let transport = OscTransport::new(&config.network).context("Failed to open OSC output")?;

    let (events, event_rx) = event_channel(EVENT_QUEUE_CAPACITY);
    let printer = thread::Builder::new()
        .name("events".to_string())
        .spawn(move || print_events(event_rx))?;

    let handle = EngineHandle::spawn(&config, feed, estimator, transport, events)?;

    if args.headless {
        // Ctrl-C / SIGTERM → 終了, SIGUSR1 → キャリブレーション開始
        let shutdown = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;
        let calibrate = Arc::new(AtomicBool::new(false));
        #[cfg(unix)]
        signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&calibrate))?;
        info!("Headless: Ctrl-C to stop, SIGUSR1 to calibrate");
        handle.supervise(&shutdown, &calibrate, SIGNAL_POLL);
    } else {
        prompt(&handle)?;
    }

    info!("Shutting down...");
    if handle.stop(STOP_TIMEOUT) {
        let _ = printer.join();
    }
    Ok(())
}

fn prompt(handle: &EngineHandle) -> Result<()> {
    println!();
    println!("コマンド:");
    println!("  c             - キャリブレーション開始");
    println!("  x             - キャリブレーション中止");
    println!("  p / r         - 一時停止 / 再開");
    println!("  m full|upper|hands - トラッキングモード切替");
    println!("  f             - フィルタリセット");
    println!("  t             - 現在の変換を表示");
    println!("  q             - 終了");
    println!();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let command = match (parts[0], parts.get(1).copied()) {
            ("c", _) => Command::StartCalibration,
            ("x", _) => Command::CancelCalibration,
            ("p", _) => Command::Pause,
            ("r", _) => Command::Resume,
            ("f", _) => Command::ResetFilters,
            ("m", Some(mode)) => match parse_mode(mode) {
                Some(mode) => Command::SetMode(mode),
                None => {
                    println!("不明なモード: {}", mode);
                    continue;
                }
            },
            ("t", _) => {
                let t = handle.transform().get();
                let [x, y, z] = t.offset();
                println!("scale={:.4} offset=({:.3}, {:.3}, {:.3})", t.scale(), x, y, z);
                continue;
            }
            ("q", _) => break,
            _ => {
                println!("不明なコマンド: {}", parts[0]);
                continue;
            }
        };
        if !handle.send(command) {
            println!("トラッキングスレッドが終了しています");
            break;
        }
    }
    Ok(())
}

fn parse_mode(name: &str) -> Option<TrackingMode> {
    match name {
        "full" => Some(TrackingMode::FullBody),
        "upper" => Some(TrackingMode::UpperBody),
        "hands" => Some(TrackingMode::HandsOnly),
        _ => None,
    }
}

/// Log lines are already mirrored to tracing by the worker.
fn print_events(rx: Receiver<EngineEvent>) {
    for event in rx {
        match event {
            EngineEvent::Status(status) => info!("Status: {}", status),
            EngineEvent::Calibration(CalibrationEvent::Complete { scale, offset_x, offset_y, offset_z }) => {
                info!(
                    "Calibrated: scale={:.4} offset=({:.3}, {:.3}, {:.3})",
                    scale, offset_x, offset_y, offset_z
                );
            }
            EngineEvent::Calibration(CalibrationEvent::Progress { percent }) if percent % 20 == 0 => {
                info!("Calibrating... {}%", percent);
            }
            EngineEvent::Quality(stats) => info!(
                "FPS avg {:.1} min {:.1} | confidence {:.2} | latency {:.1}ms",
                stats.fps_avg, stats.fps_min, stats.confidence_avg, stats.latency_avg
            ),
            _ => {}
        }
    }
}
