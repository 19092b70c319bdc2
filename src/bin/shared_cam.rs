//! shared_cam - open the shared camera and keep reading from it.
//!
//! Launch this in several terminals: one process ends up Owner of the device,
//! the rest follow its frames. Kill the Owner and a Follower takes over.
//!
//! Configuration comes from `SHARED_CAMERA_CONFIG` / `SHARED_CAMERA_*` (see
//! `CameraConfig`); the flags below only control the read loop.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shared_camera::status::DEFAULT_TOPIC_PREFIX;
use shared_camera::{CameraConfig, RoleAnnouncer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Read frames from a camera shared between processes")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SHARED_CAMERA_CONFIG")]
    config: Option<PathBuf>,

    /// Target reads per second (0 = as fast as possible).
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many reads.
    #[arg(long)]
    frames: Option<u64>,

    /// Seconds between stats log lines.
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,

    /// MQTT broker (host:port) to report this process's role to.
    #[arg(long, env = "SHARED_CAMERA_STATUS_BROKER")]
    status_broker: Option<String>,

    /// MQTT topic prefix for role reports.
    #[arg(long, env = "SHARED_CAMERA_STATUS_PREFIX", default_value = DEFAULT_TOPIC_PREFIX)]
    status_prefix: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = CameraConfig::load_from(args.config.as_deref())?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    let mut camera = cfg.build()?;
    let mut announcer = match args.status_broker.as_deref() {
        Some(broker) => Some(RoleAnnouncer::connect(
            broker,
            &args.status_prefix,
            &camera.options().name,
        )?),
        None => None,
    };

    if let Some(announcer) = announcer.as_ref() {
        log::info!("shared_cam: announcing role on {}", announcer.topic());
    }
    log::info!(
        "shared_cam: stream '{}' device {} via {:?} channel ({}:{}), starting as {}",
        camera.options().name,
        camera.options().camera_index,
        cfg.channel.kind,
        cfg.channel.host,
        cfg.channel.port(),
        camera.role()
    );

    let frame_interval = if args.fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(1) / args.fps
    };
    let stats_interval = Duration::from_secs(args.stats_interval.max(1));
    let mut role = camera.role();
    let mut reads = 0u64;
    let mut last_stats = Instant::now();

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let frame = camera.read();
        reads += 1;

        if camera.role() != role {
            log::info!("shared_cam: role changed {} -> {}", role, camera.role());
            role = camera.role();
        }
        if let Some(announcer) = announcer.as_mut() {
            announcer.announce(role);
        }

        if last_stats.elapsed() >= stats_interval {
            let stats = camera.stats();
            log::info!(
                "shared_cam: role={} frame={}x{} captured={} received={} foreign={} missed={} takeovers={}/{} demotions={}",
                role,
                frame.width(),
                frame.height(),
                stats.frames_captured,
                stats.frames_received,
                stats.foreign_frames,
                stats.missed_receives,
                stats.takeovers,
                stats.takeover_attempts,
                stats.demotions
            );
            last_stats = Instant::now();
        }

        if args.frames.is_some_and(|limit| reads >= limit) {
            break;
        }
        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    camera.stop();
    if let Some(announcer) = announcer {
        announcer.shutdown()?;
    }
    log::info!("shared_cam: stopped after {} reads", reads);
    Ok(())
}
