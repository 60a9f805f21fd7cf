// src/main.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, info, warn};

use vigil_node::catalog::SegmentCatalog;
use vigil_node::config::Config;
use vigil_node::events::{
    DetectionClient, EventProcessor, EventScheduler, IngestServer, ProcessorHandles,
    ProcessorSettings,
};
use vigil_node::extract::{Extractor, FfmpegMuxer};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug_mode = args.iter().any(|a| a == "--debug");

    let default_level = if debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "vigil.toml".into());

    let cfg = Config::load_or_create(&cfg_path)?;
    info!(
        "[vigil] {} loaded {} (recordings {}, events {})",
        cfg.node_name,
        cfg_path,
        cfg.recordings_dir.display(),
        cfg.events_dir.display()
    );

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[vigil] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Scheduler / Ingest / Processor
    // ------------------------------------------------------------
    let scheduler = Arc::new(
        EventScheduler::new(cfg.process_delay()).with_capacity_limit(cfg.ingest.max_pending),
    );

    let ingest = start_ingest(&cfg, scheduler.clone(), running.clone())?;
    let processor = start_processor(&cfg, scheduler.clone(), running.clone());

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    info!("[vigil] running – Ctrl+C to stop");

    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed() >= Duration::from_secs(30) {
            match scheduler.next_due() {
                Some(due) => debug!(
                    "[vigil] pending={} next_due={}",
                    scheduler.pending_count(),
                    due.format("%H:%M:%S")
                ),
                None => debug!("[vigil] pending=0"),
            }
            last_stats = Instant::now();
        }
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    info!("[vigil] shutting down…");

    if ingest.join().is_err() {
        warn!("[vigil] ingest thread panicked");
    }
    processor.join();

    let dropped = scheduler.pending_count();
    if dropped > 0 {
        warn!("[vigil] {} scheduled event(s) not processed", dropped);
    }

    info!("[vigil] shutdown complete");
    Ok(())
}

//
// ============================================================
// START_* HELPERS
// ============================================================
//

fn start_ingest(
    cfg: &Config,
    scheduler: Arc<EventScheduler>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<()>> {
    let server = IngestServer::bind(
        &cfg.ingest.bind,
        scheduler,
        cfg.ingest.max_message_bytes,
        cfg.ingest.read_timeout(),
    )
    .with_context(|| format!("binding event listener on {}", cfg.ingest.bind))?;

    info!(
        "[vigil] event listener on {} (max {} pending)",
        cfg.ingest.bind, cfg.ingest.max_pending
    );
    Ok(server.spawn(running))
}

fn start_processor(
    cfg: &Config,
    scheduler: Arc<EventScheduler>,
    running: Arc<AtomicBool>,
) -> ProcessorHandles {
    let catalog = SegmentCatalog::new(cfg.recordings_dir.clone(), cfg.segment_duration());
    let extractor = Extractor::new(
        catalog,
        Box::new(FfmpegMuxer::new(cfg.ffmpeg.binary.clone())),
        cfg.events_dir.clone(),
        cfg.resolver,
        cfg.output_fps,
    );

    let detections = if cfg.detections.enabled {
        info!("[vigil] detections from {}", cfg.detections.addr);
        Some(DetectionClient::new(
            &cfg.detections.addr,
            cfg.detections.timeout(),
        ))
    } else {
        None
    };

    let settings = ProcessorSettings {
        pre_secs: cfg.events.pre_event_secs,
        post_secs: cfg.events.post_event_secs,
        poll_interval: cfg.poll_interval(),
        camera_map: cfg.cameras.clone(),
    };

    info!(
        "[vigil] clips {}s + {}s, processed after {}s",
        settings.pre_secs,
        settings.post_secs,
        cfg.process_delay().as_secs()
    );

    EventProcessor::new(scheduler, extractor, detections, settings).spawn(running)
}
