// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Camera ingestion service.
//!
//! Usage:
//!   camera-ingest serve --config cameras.toml --bind 0.0.0.0:8080

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camera_ingest::api::{self, AppState};
use camera_ingest::camera::session::GstreamerSessionFactory;
use camera_ingest::camera::CameraSpec;
use camera_ingest::config::Config;
use camera_ingest::event_bus::EventBus;
use camera_ingest::metrics::MetricsRegistry;
use camera_ingest::motion::{self, MotionConfig};
use camera_ingest::registry::CameraRegistry;

#[derive(Parser)]
#[command(name = "camera-ingest", about = "Camera ingestion service", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the ingestion service and HTTP API.
    Serve {
        /// Optional TOML file listing cameras to register at startup.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override HTTP_BIND_ADDR.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, bind } => run_serve(config, bind).await,
    }
}

async fn run_serve(config_path: Option<PathBuf>, bind_override: Option<String>) {
    let cfg = match Config::from_env(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind_addr = bind_override.unwrap_or_else(|| cfg.http_bind_addr.clone());

    info!(
        bootstrap_cameras = cfg.bootstrap_cameras.len(),
        default_buffer_size = cfg.default_buffer_size,
        bind_addr,
        "starting camera ingestion service"
    );

    let metrics = Arc::new(MetricsRegistry::new());

    let bus = match EventBus::new(&cfg.redis_url, metrics.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!(error = %e, "failed to configure event bus");
            std::process::exit(1);
        }
    };

    let motion_publisher_cancel = tokio_util::sync::CancellationToken::new();
    let (motion_publisher, _motion_publish_task) =
        bus.spawn_publisher("_internal_motion".to_string(), cfg.publish_queue_size, motion_publisher_cancel);
    let default_motion = MotionConfig {
        threshold: cfg.motion_threshold,
        area_min_fraction: cfg.motion_area_min_fraction,
        cooldown_secs: cfg.motion_cooldown_secs,
    };
    let motion = motion::spawn(default_motion, metrics.clone(), motion_publisher);

    let factory = Arc::new(GstreamerSessionFactory);
    let registry = Arc::new(CameraRegistry::new(
        cfg.default_buffer_size,
        factory,
        metrics.clone(),
        bus.clone(),
        cfg.publish_queue_size,
        motion.clone(),
        default_motion,
    ));

    for bootstrap in &cfg.bootstrap_cameras {
        let spec = CameraSpec {
            id: bootstrap.id.clone(),
            source_type: bootstrap.source_type.clone(),
            source_url: bootstrap.source_url.clone(),
            buffer_size: bootstrap.buffer_size,
            motion_threshold: None,
            motion_area_min: None,
            motion_cooldown_secs: None,
        };
        match registry.register(spec).await {
            Ok(_) => info!(camera_id = %bootstrap.id, "bootstrap camera registered"),
            Err(e) => error!(camera_id = %bootstrap.id, error = %e, "failed to register bootstrap camera"),
        }
    }

    let state = Arc::new(AppState { registry, metrics, motion });

    tokio::select! {
        result = api::start_server(state, &bind_addr) => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server exited with error");
                std::process::exit(1);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("received ctrl-c, shutting down"),
                Err(e) => error!(error = %e, "signal handler error"),
            }
        }
    }
}
