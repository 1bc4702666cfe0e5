//! Scheduler binary: arms automation timers and runs the posting sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_firestore::{AccountRepository, AutomationRepository, FirestoreClient, VideoRepository};
use reel_poster::{GatewayPublisher, Poster, PosterConfig};
use reel_providers::GatewayClient;
use reel_queue::JobQueue;
use reel_scheduler::{Scheduler, SchedulerConfig};

const LOG_TARGETS: &[&str] = &[
    "reel_scheduler",
    "reel_poster",
    "reel_queue",
    "reel_firestore",
    "reel_providers",
];

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting reel-scheduler");

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

    let config = SchedulerConfig::from_env();
    let poster_config = PosterConfig::from_env();
    info!("Scheduler config: {:?}", config);

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.ping().await {
        error!("Redis unreachable: {}", e);
        std::process::exit(1);
    }

    let firestore = match FirestoreClient::from_env().await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create Firestore client: {}", e);
            std::process::exit(1);
        }
    };

    let scripts = match GatewayClient::from_env() {
        Ok(g) => Arc::new(g),
        Err(e) => {
            error!("Failed to create provider gateway client: {}", e);
            std::process::exit(1);
        }
    };

    let videos = Arc::new(VideoRepository::new(firestore.clone()));
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(AutomationRepository::new(firestore.clone())),
        videos.clone(),
        scripts,
        Arc::new(queue),
        config.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Posting is optional so a deployment can schedule without publishing
    let sweep = match GatewayPublisher::from_env() {
        Ok(publisher) => {
            let poster = Poster::new(
                videos,
                Arc::new(AccountRepository::new(firestore)),
                Arc::new(publisher),
                poster_config,
            );
            Some(tokio::spawn(run_sweep(poster, config.sweep_interval, shutdown_rx.clone())))
        }
        Err(e) => {
            warn!("Posting sweep disabled: {}", e);
            None
        }
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(e) = scheduler.run(shutdown_rx).await {
        error!("Scheduler error: {}", e);
        std::process::exit(1);
    }

    if let Some(sweep) = sweep {
        if tokio::time::timeout(Duration::from_secs(30), sweep).await.is_err() {
            warn!("Posting sweep did not stop in time");
        }
    }

    info!("Scheduler shutdown complete");
}

async fn run_sweep(poster: Poster, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Posting sweep every {:?}", every);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                match poster.sweep().await {
                    Ok(report) => debug!(?report, "Sweep done"),
                    Err(e) => warn!("Posting sweep failed: {}", e),
                }
            }
        }
    }
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
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}
