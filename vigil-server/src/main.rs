// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Vigil: access logging, panic recovery and admission guards
//  for a single HTTP handler
//
//  Transport: axum on a multi-thread tokio runtime
//  Config:    YAML file + VIGIL_* environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod echo;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use echo::EchoHandler;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vigil_core::VigilConfig;
use vigil_http::{WrappingHandler, install_panic_hook, into_router};
use vigil_observability::{AccessLogWorker, MetricsCollector, SinkRegistry, TracingLineSink};

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Vigil: observing HTTP handler wrapper")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/vigil/vigil.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Vigil starting");

    // ── Config ──
    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        VigilConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        VigilConfig::default()
    };

    install_panic_hook();

    // ── Metrics + access events ──
    let metrics = Arc::new(MetricsCollector::new(config.metrics.enabled)?);
    let sinks = Arc::new(SinkRegistry::with_metrics(Arc::clone(&metrics)));

    let worker = config.access_log.enabled.then(|| {
        AccessLogWorker::spawn(
            &sinks,
            config.access_log.format,
            config.access_log.capacity,
            TracingLineSink,
        )
    });

    // ── Handler ──
    let handler = WrappingHandler::from_config(Arc::new(EchoHandler), &config.handler, Arc::clone(&sinks))?
        .with_metrics(Arc::clone(&metrics));
    info!(
        allow = ?config.handler.allow,
        accept = ?config.handler.accept,
        content_type = ?config.handler.content_type,
        "Handler configured"
    );

    let mut app = Router::new();
    if metrics.is_enabled() {
        let m = Arc::clone(&metrics);
        app = app.route(
            &config.metrics.path,
            get(move || {
                let m = Arc::clone(&m);
                async move { m.render() }
            }),
        );
        info!(path = %config.metrics.path, "Metrics endpoint mounted");
    }
    let app = app.merge(into_router(Arc::new(handler), config.server.body_limit));

    // ── Serve ──
    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    info!(addr = %config.server.addr, "Vigil is ready, serving traffic");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown signal received, draining access log");
    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    if sinks.dropped() > 0 {
        warn!(dropped = sinks.dropped(), "Access events were dropped during this run");
    }

    info!("Vigil stopped");
    Ok(())
}

// SIGTERM (docker stop) + SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
