// src/main.rs

mod analysis;
mod config;
mod error;
mod evidence;
mod pipeline;
mod track_feed;
mod types;
mod video_processor;

use anyhow::{anyhow, Context, Result};
use evidence::{EvidenceManager, EvidenceNotifier, HttpEvidenceSink, OpenCvMp4Writer};
use pico_args::Arguments;
use pipeline::{FrameReport, MetricsSummary, PipelineMetrics, PipelineOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use track_feed::TrackFeed;
use types::Config;

const DEFAULT_CONFIG: &str = "config.yaml";

struct CliArgs {
    config: String,
    source: Option<String>,
    tracks: Option<String>,
    camera_id: Option<String>,
}

fn parse_args() -> Result<Option<CliArgs>> {
    let mut pargs = Arguments::from_env();

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(None);
    }

    let args = CliArgs {
        config: pargs
            .opt_value_from_str("--config")?
            .unwrap_or_else(|| DEFAULT_CONFIG.to_string()),
        source: pargs.opt_value_from_str("--source")?,
        tracks: pargs.opt_value_from_str("--tracks")?,
        camera_id: pargs.opt_value_from_str("--camera-id")?,
    };

    let rest = pargs.finish();
    if !rest.is_empty() {
        return Err(anyhow!("unexpected arguments: {:?}", rest));
    }
    Ok(Some(args))
}

fn print_help() {
    println!(
        r#"wrongway-detection

Flags vehicles driving against the expected flow and records evidence clips.

USAGE:
  wrongway-detection [--config <path>] [--source <dir|video>] [--tracks <jsonl>] [--camera-id <id>]

OPTIONS:
  --config <path>     YAML config (default: config.yaml, defaults if missing)
  --source <path>     Image-sequence directory, video file or stream URL
  --tracks <path>     Tracker output, one JSON object per frame
  --camera-id <id>    Camera identifier written into every record
  -h, --help          Show this help

ENV:
  EVIDENCE_API_URL    Overrides sink.url
  RUST_LOG            Overrides logging.level"#
    );
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wrongway_detection={}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let config_found = Path::new(&args.config).exists();
    let mut config = Config::load_or_default(&args.config)?;
    if let Some(source) = args.source {
        config.camera.source = source;
    }
    if let Some(tracks) = args.tracks {
        config.camera.tracks = tracks;
    }
    if let Some(camera_id) = args.camera_id {
        config.camera.camera_id = camera_id;
    }
    config.apply_env();

    init_logging(&config.logging.level);

    info!("🚦 Wrong-way Detection System Starting");
    if config_found {
        info!("✓ Configuration loaded from {}", args.config);
    } else {
        warn!("Config {} not found, using defaults", args.config);
    }
    info!(
        "Camera {}: source={} tracks={}",
        config.camera.camera_id, config.camera.source, config.camera.tracks
    );

    let metrics = PipelineMetrics::new();

    let (notifier, worker): (Option<Box<dyn EvidenceNotifier>>, _) = if config.sink.enabled {
        let (sink, worker) = HttpEvidenceSink::spawn(
            &config.sink,
            metrics.clone(),
            &tokio::runtime::Handle::current(),
        )?;
        let sink: Box<dyn EvidenceNotifier> = Box::new(sink);
        (Some(sink), Some(worker))
    } else {
        info!("Evidence sink disabled");
        (None, None)
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current frame and draining");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let run_config = config.clone();
    let run_metrics = metrics.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        run_stream(&run_config, notifier, run_metrics, &stop)
    })
    .await
    .context("Frame loop panicked")?;

    // The notifier was dropped with the pipeline, so the queue is closed
    if let Some(worker) = worker {
        worker.shutdown().await;
    }

    let summary = metrics.summary();
    print_summary(&summary);
    if let Err(e) = write_run_summary(&config, &summary) {
        warn!("Failed to write run summary: {:#}", e);
    }

    outcome
}

fn run_stream(
    config: &Config,
    notifier: Option<Box<dyn EvidenceNotifier>>,
    metrics: PipelineMetrics,
    stop: &AtomicBool,
) -> Result<()> {
    let mut source = video_processor::open_source(&config.camera.source, config.camera.fps)?;
    info!(
        "✓ Source ready: {}x{} @ {:.1} FPS",
        source.width(),
        source.height(),
        source.fps()
    );
    let mut feed = TrackFeed::open(&config.camera.tracks)?;

    let evidence = EvidenceManager::new(
        &config.evidence,
        &config.camera.camera_id,
        Box::new(OpenCvMp4Writer),
        notifier,
        metrics.clone(),
    )?;
    info!("✓ Evidence output: {}", evidence.output_dir().display());

    let mut pipeline = PipelineOrchestrator::new(
        &config.violation,
        source.width(),
        evidence,
        metrics.clone(),
    );

    let mut frame_index: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                error!("Frame {}: {:#}, stopping stream", frame_index, e);
                break;
            }
        };
        let detections = match feed.detections_for(frame_index) {
            Ok(d) => d,
            Err(e) => {
                error!("Frame {}: {:#}, stopping stream", frame_index, e);
                break;
            }
        };
        let report = pipeline.process_frame(frame, &detections);
        log_report(&report);

        frame_index += 1;
        if frame_index % 300 == 0 {
            info!(
                "Progress: {} frames, {} active tracks, {} open episode(s), {:.1} FPS",
                pipeline.frames_processed(),
                pipeline.active_tracks(),
                pipeline.evidence().open_count(),
                metrics.fps()
            );
        }
    }

    let drained = pipeline.finish();
    info!(
        "Drain complete: {} persisted, {} empty, {} failed",
        drained.persisted, drained.empty, drained.failed
    );
    Ok(())
}

fn log_report(report: &FrameReport) {
    for v in &report.violations {
        debug!(
            "Frame {} ({:.0}ms): wrong-way track {} at ({:.0}, {:.0}) dy={:.1}",
            report.frame_index,
            report.timestamp_ms,
            v.track_id,
            v.centroid.0,
            v.centroid.1,
            v.vector.1
        );
    }
    for record in &report.finalized {
        info!(
            "🚨 Violation {} (track {}) saved: {}",
            record.event_id, record.track_id, record.evidence_path
        );
    }
    for e in &report.persistence_errors {
        error!("Frame {}: evidence persistence failed: {}", report.frame_index, e);
    }
}

fn print_summary(summary: &MetricsSummary) {
    info!("\n╔════════════════════════════════════════════════╗");
    info!("║              RUN SUMMARY                       ║");
    info!("╚════════════════════════════════════════════════╝");
    info!(
        "Frames: {} in {:.1}s ({:.1} FPS)",
        summary.frames_processed, summary.elapsed_secs, summary.fps
    );
    info!(
        "Confirmed detections: {} | episodes opened: {}",
        summary.confirmed_detections, summary.episodes_opened
    );
    info!(
        "Episodes persisted: {} | empty: {} | abandoned: {}",
        summary.episodes_persisted, summary.episodes_empty, summary.episodes_abandoned
    );
    info!(
        "Sink: {} sent, {} failed, {} dropped",
        summary.sink_sent, summary.sink_failed, summary.sink_dropped
    );
}

fn write_run_summary(config: &Config, summary: &MetricsSummary) -> Result<PathBuf> {
    let path = Path::new(&config.evidence.output_dir).join("run_summary.json");
    std::fs::create_dir_all(&config.evidence.output_dir)?;
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, json)?;
    info!("💾 Run summary written to {}", path.display());
    Ok(path)
}
