//! Match analysis worker binary.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pitch_media::ObjectDetector;
use pitch_models::RunId;
use pitch_worker::{AnalysisJob, WorkerConfig, WorkerResult};

/// Detect, track and render the players and ball of a match video.
#[derive(Debug, Parser)]
#[command(name = "pitch-worker", version)]
struct Args {
    /// Input video (mp4, avi, mov or mkv)
    video: PathBuf,

    /// Directory for the rendered views [env: PITCH_OUTPUT_DIR]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Where to write the result JSON (default: <output-dir>/<stem>_result.json)
    #[arg(long)]
    result: Option<PathBuf>,

    /// YOLOv8 ONNX model [env: PITCH_MODEL_PATH]
    #[arg(long)]
    model: Option<PathBuf>,

    /// Run id used in logs and the result (default: random UUID)
    #[arg(long)]
    run_id: Option<RunId>,

    /// Write a PNG of each view's last frame instead of encoding videos
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    let code = match run(args).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Analysis failed: {}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in ["ort=warn", "onnxruntime=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(args: Args) -> WorkerResult<()> {
    let mut config = WorkerConfig::from_env();
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(model) = args.model {
        config.model_path = model;
    }
    if !(0.0..=1.0).contains(&config.confidence_threshold) {
        return Err(pitch_worker::WorkerError::config_error(format!(
            "PITCH_CONF_THRESHOLD must be within 0..=1, got {}",
            config.confidence_threshold
        )));
    }
    info!("Worker config: {:?}", config);

    let result_path = args.result.unwrap_or_else(|| {
        let stem = args
            .video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        config.output_dir.join(format!("{}_result.json", stem))
    });

    let mut job = AnalysisJob::new(&args.video, result_path).with_dry_run(args.dry_run);
    if let Some(run_id) = args.run_id {
        job = job.with_run_id(run_id);
    }
    let detector = load_detector(&config)?;

    // Ctrl-C cancels at the next frame boundary
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let result = job.execute(config.pipeline_config(), detector, cancel_rx).await?;
    for output in &result.outputs {
        match &output.path {
            Some(path) => info!(view = %output.view, path = %path.display(), "View written"),
            None => warn!(view = %output.view, error = ?output.error, "View failed"),
        }
    }

    Ok(())
}

#[cfg(feature = "onnx")]
fn load_detector(config: &WorkerConfig) -> WorkerResult<Arc<dyn ObjectDetector>> {
    let detector = pitch_media::YoloDetector::load(config.yolo_config())?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_detector(config: &WorkerConfig) -> WorkerResult<Arc<dyn ObjectDetector>> {
    Err(pitch_worker::WorkerError::Media(pitch_media::MediaError::model_unavailable(format!(
        "{}: built without the onnx feature",
        config.model_path.display()
    ))))
}
