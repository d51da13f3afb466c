//! HTTP server entry point.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use weedout_pipeline::{
    CommandEngine, EngineSamplingFormat, ModelObjective, Pipeline, PipelineConfig,
};
use weedout_server::{AppState, router};

/// How often expired session folders are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// CLI-compatible sampling argument format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSamplingFormat {
    /// 0 for no sampling, 1 otherwise
    Flag,
    /// Numeric strategy code (0-3)
    Code,
    /// Strategy label ("none", "smote", ...)
    Label,
}

impl From<CliSamplingFormat> for EngineSamplingFormat {
    fn from(cli: CliSamplingFormat) -> Self {
        match cli {
            CliSamplingFormat::Flag => EngineSamplingFormat::Flag,
            CliSamplingFormat::Code => EngineSamplingFormat::Code,
            CliSamplingFormat::Label => EngineSamplingFormat::Label,
        }
    }
}

/// CLI-compatible model objective
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliObjective {
    Regression,
    Classification,
}

impl From<CliObjective> for ModelObjective {
    fn from(cli: CliObjective) -> Self {
        match cli {
            CliObjective::Regression => ModelObjective::Regression,
            CliObjective::Classification => ModelObjective::Classification,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "WeedOut Team",
    version,
    about = "Upload-to-result server for the WeedOut preprocessing engine",
    long_about = "Accepts dataset uploads over HTTP, runs them through an external \
                  preprocessing engine and serves the results.\n\n\
                  Every flag can also be set through the environment (or a .env file).\n\n\
                  EXAMPLES:\n  \
                  # Default engine bridge on port 5001\n  \
                  weedout-server\n\n  \
                  # Custom engine command with a 10 minute limit\n  \
                  weedout-server --engine-program /opt/venv/bin/python \\\n    \
                  --engine-arg engine/weedout_bridge.py --engine-timeout-secs 600"
)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "WEEDOUT_BIND", default_value = "0.0.0.0:5001")]
    bind: String,

    /// Directory for staged uploads
    #[arg(long, env = "WEEDOUT_INTAKE_DIR", default_value = "temp")]
    intake_dir: PathBuf,

    /// Directory for processed artifacts
    #[arg(long, env = "WEEDOUT_PROCESSED_DIR", default_value = "processed")]
    processed_dir: PathBuf,

    /// Directory for published previews
    #[arg(long, env = "WEEDOUT_PREVIEW_DIR", default_value = "public/files")]
    preview_dir: PathBuf,

    /// Directory for per-session result folders
    #[arg(long, env = "WEEDOUT_SESSION_DIR", default_value = "sessions")]
    session_dir: PathBuf,

    /// Program that runs the preprocessing engine
    #[arg(long, env = "WEEDOUT_ENGINE_PROGRAM", default_value = "python3")]
    engine_program: PathBuf,

    /// Argument passed to the engine program (repeatable)
    #[arg(long = "engine-arg", default_value = "engine/weedout_bridge.py")]
    engine_args: Vec<String>,

    /// Kill the engine after this many seconds (0 disables the limit)
    #[arg(long, env = "WEEDOUT_ENGINE_TIMEOUT_SECS", default_value_t = 0)]
    engine_timeout_secs: u64,

    /// How the sampling argument is encoded for the engine
    #[arg(long, value_enum, default_value = "flag")]
    engine_sampling_format: CliSamplingFormat,

    /// Objective used when a request does not name one
    #[arg(long, value_enum, default_value = "classification")]
    default_objective: CliObjective,

    /// Lifetime of a session result in seconds
    #[arg(long, env = "WEEDOUT_SESSION_TTL_SECS", default_value_t = 3600)]
    session_ttl_secs: u64,

    /// Largest accepted request body in MiB
    #[arg(long, env = "WEEDOUT_MAX_UPLOAD_MB", default_value_t = 200)]
    max_upload_mb: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WEEDOUT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_pipeline(args: &Args) -> Result<Pipeline> {
    let config = PipelineConfig::builder()
        .intake_dir(&args.intake_dir)
        .processed_dir(&args.processed_dir)
        .preview_dir(&args.preview_dir)
        .session_dir(&args.session_dir)
        .engine_sampling_format(args.engine_sampling_format.into())
        .default_objective(args.default_objective.into())
        .session_ttl(Duration::from_secs(args.session_ttl_secs))
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024))
        .build()
        .context("Invalid configuration")?;

    let mut engine = CommandEngine::new(&args.engine_program).args(&args.engine_args);
    if args.engine_timeout_secs > 0 {
        engine = engine.timeout(Duration::from_secs(args.engine_timeout_secs));
    }

    let pipeline = Pipeline::builder()
        .config(config)
        .engine(Arc::new(engine))
        .build()
        .context("Failed to build pipeline")?;

    pipeline
        .layout()
        .ensure_directories()
        .context("Failed to create storage directories")?;
    Ok(pipeline)
}

fn spawn_session_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let pipeline = state.pipeline.clone();
            match tokio::task::spawn_blocking(move || pipeline.purge_expired_sessions()).await {
                Ok(0) => {}
                Ok(count) => info!("Purged {} expired session(s)", count),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so it can supply flag values
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level);

    let pipeline = build_pipeline(&args)?;
    info!(
        engine = %args.engine_program.display(),
        processed = %pipeline.layout().processed_dir.display(),
        "Pipeline ready"
    );

    let state = AppState::new(pipeline);
    spawn_session_sweeper(state.clone());

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Listening on {}", args.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
