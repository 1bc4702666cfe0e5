//! Video generation worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_firestore::{FirestoreClient, VideoRepository};
use reel_media::FfmpegAssembler;
use reel_providers::GatewayClient;
use reel_queue::JobQueue;
use reel_storage::media_store_from_env;
use reel_worker::{GenerationPipeline, JobExecutor, WorkerConfig};

const LOG_TARGETS: &[&str] = &[
    "reel_worker",
    "reel_media",
    "reel_queue",
    "reel_firestore",
    "reel_providers",
    "reel_storage",
];

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting reel-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => match metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
            {
                Ok(()) => info!("Prometheus metrics listening on {}", addr),
                Err(e) => warn!("Failed to start metrics exporter: {}", e),
            },
            Err(e) => warn!("Invalid METRICS_ADDR '{}': {}", addr, e),
        }
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let firestore = match FirestoreClient::from_env().await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create Firestore client: {}", e);
            std::process::exit(1);
        }
    };

    let gateway = match GatewayClient::from_env() {
        Ok(g) => Arc::new(g),
        Err(e) => {
            error!("Failed to create provider gateway client: {}", e);
            std::process::exit(1);
        }
    };

    let media = match media_store_from_env().await {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to create media store: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = GenerationPipeline::new(
        Arc::new(VideoRepository::new(firestore)),
        gateway.clone(),
        gateway.clone(),
        Arc::new(FfmpegAssembler::new().with_timeout(config.render_timeout_secs)),
        media,
        config.work_dir.clone(),
    )
    .with_http_client(gateway.http().clone());

    let executor = Arc::new(JobExecutor::new(config, queue, pipeline));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        if let Ok(directive) = format!("{target}=info").parse() {
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
