// src/main.rs

mod analysis;
mod config;
mod error;
mod frame_buffer;
mod frame_source;
mod inference;
mod layout;
mod model;
mod outputs;
mod pipeline;
mod types;

use anyhow::{Context, Result};
use frame_source::FrameSource;
use inference::{Executor, OnnxExecutor};
use model::{desire_one_hot, ModelSettings, ModelState};
use pipeline::{DrivingPipeline, EventBus, JsonLinesBus, MessageBus};
use std::fs::File;
use std::io::{self, BufWriter};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use types::Config;

const DEFAULT_CONFIG: &str = "config.yaml";

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    // stdout may carry the event stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("🚗 Driving model decoder starting");
    info!("✓ Configuration loaded from {}", config_path);

    let is_rhd = config.is_rhd();
    let settings = ModelSettings::from_config(&config, is_rhd);
    info!(
        "Runtime: temporal={}, desire={}, traffic_convention={} (rhd={}), debug_dump={}",
        settings.temporal,
        settings.desire,
        settings.traffic_convention,
        is_rhd,
        config.runtime.debug_dump
    );

    let executor = OnnxExecutor::new(&config)?;
    info!("✓ Executor ready ({} output floats)", executor.output_len());

    let model = ModelState::new(executor, &settings)?;

    match &config.output.path {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to create {}", path))?;
            info!("Publishing to {}", path);
            run(&config, model, &mut JsonLinesBus::new(BufWriter::new(file)))
        }
        None => run(&config, model, &mut JsonLinesBus::new(io::stdout().lock())),
    }
}

/// Frames publish into the bounded in-process bus, which is drained into
/// `sink` after every frame.
fn run<E: Executor, B: MessageBus>(config: &Config, model: ModelState<E>, sink: &mut B) -> Result<()> {
    let source = FrameSource::open(&config.frames)?;
    if source.is_empty() {
        error!("No frame files found in {}", config.frames.input_dir);
        return Ok(());
    }

    let bus = EventBus::new(config.output.max_pending);
    let mut pipeline = DrivingPipeline::new(model, bus, config.runtime.debug_dump);
    for frame in source {
        let frame = frame?;
        // a frame without a request still feeds the all-zero vector so the
        // next request is seen as a rising edge
        let desire = config
            .runtime
            .desire
            .then(|| desire_one_hot(frame.desire));
        // replayed frames are always the newest one available
        let report = pipeline
            .process_frame(&frame, frame.frame_id, desire.as_ref().map(|d| &d[..]))
            .with_context(|| format!("Frame {} failed", frame.frame_id))?;
        debug!(
            "Frame {}: dropped {}, valid model={} odometry={}",
            frame.frame_id, report.book.vipc_dropped_frames, report.model_valid, report.odometry_valid
        );
        for event in pipeline.bus_mut().drain() {
            sink.send(event)?;
        }
    }

    let summary = pipeline.metrics().summary();
    info!("✓ Processed {} frame(s) at {:.1} FPS", summary.total_frames, summary.fps);
    info!("Metrics: {}", serde_json::to_string(&summary)?);
    Ok(())
}
