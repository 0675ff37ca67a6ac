//! detect_worker - Object detection co-process.
//!
//! Reads length-prefixed encoded frames from stdin and writes one JSON
//! detection record per processed frame to stdout. All diagnostics go to
//! stderr.
//!
//! Exit status is zero only when stdin closes cleanly on a frame boundary.

use anyhow::Result;
use clap::Parser;
use std::io;
use std::path::PathBuf;

use detect_worker::{
    load_backend, BackendKind, ConfigOverrides, DetectionLoop, FrameReader, ImageDecoder,
    ProtocolVariant, ResultWriter, WorkerConfig,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run object detection on length-prefixed frames from stdin"
)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "DETECT_WORKER_CONFIG")]
    config: Option<PathBuf>,

    /// Payload layout: 'untagged' (single source) or 'tagged' (multi-source).
    #[arg(long)]
    protocol: Option<ProtocolVariant>,

    /// Detector backend: 'stub' or 'tract' (requires the backend-tract feature).
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Path to the ONNX detection model (tract backend).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Square model input size in pixels.
    #[arg(long)]
    input_size: Option<u32>,

    /// Frames declaring more payload bytes than this are drained and skipped.
    #[arg(long)]
    max_frame_bytes: Option<usize>,

    /// Seconds between statistics log lines (0 disables).
    #[arg(long)]
    stats_interval_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let overrides = ConfigOverrides {
        protocol: args.protocol,
        backend: args.backend,
        model_path: args.model,
        input_size: args.input_size,
        max_frame_bytes: args.max_frame_bytes,
        stats_interval_secs: args.stats_interval_secs,
    };
    let cfg = WorkerConfig::load_with(args.config.as_deref(), &overrides).inspect_err(|e| {
        log::error!("invalid configuration: {:#}", e);
    })?;

    let detector = load_backend(&cfg.detector).inspect_err(|e| {
        log::error!("failed to load {} detector: {:#}", cfg.detector.backend, e);
    })?;

    log::info!(
        "detection worker started (backend={}, protocol={}, max_frame_bytes={})",
        detector.name(),
        cfg.protocol,
        cfg.max_frame_bytes
    );

    let reader = FrameReader::with_max_frame_bytes(io::stdin().lock(), cfg.max_frame_bytes);
    let writer = ResultWriter::new(io::stdout().lock());
    let mut detection_loop =
        DetectionLoop::new(reader, writer, ImageDecoder, detector, cfg.protocol)
            .with_stats_interval(cfg.stats_interval);

    let stats = detection_loop.run()?;
    log::info!(
        "detection worker stopped after {} frames ({} results emitted)",
        stats.frames_read,
        stats.results_emitted
    );
    Ok(())
}
