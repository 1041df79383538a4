//! Pipeline API Server
//!
//! Stateless operation dispatch in front of the remote compute backend.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Extension, Router,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pipeline_api::handlers;
use pipeline_api::{AppState, ServiceConfig};

/// Pipeline API Server
#[derive(Parser, Debug)]
#[command(name = "pipeline-api")]
#[command(about = "Location resolution, reference caching and display normalization for geospatial pipelines")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8085", env = "PIPELINE_LISTEN_ADDR")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Number of worker threads
    #[arg(long, env = "PIPELINE_WORKER_THREADS")]
    worker_threads: Option<usize>,

    /// Directory with boundaries/, aliases.yaml and profiles.yaml
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Compute backend base URL
    #[arg(long)]
    backend_url: Option<String>,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let mut config = ServiceConfig::from_env();
    if let Some(dir) = args.config_dir {
        config.config_dir = dir;
    }
    if let Some(url) = args.backend_url {
        config.backend_url = url;
    }

    info!(
        backend = %config.backend_url,
        config_dir = ?config.config_dir,
        "Starting pipeline API server"
    );

    let state = Arc::new(AppState::new(config)?);
    let _sweeper = state.pipeline.cache().spawn_sweeper();

    let app = Router::new()
        .route("/invoke", post(handlers::invoke_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(Extension(state))
        .layer(Extension(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
