//! Demo host: serves a directory plus live process state over loopback HTTP.

use keyhole::{
    FileCache, FileResolverGroup, FolderHandler, PathedServer, Request, RequestLogger,
    StateRegistry, SystemResolver,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing_subscriber::EnvFilter;

const PREFERRED_PORTS: &[u16] = &[17490, 17491, 17492, 17493, 17494, 17495];
const WORKERS: usize = 8;

#[derive(Serialize)]
struct ProcessInfo {
    pid: u32,
    uptime_secs: u64,
}

struct TracingLogger;

impl RequestLogger for TracingLogger {
    fn log(&self, request: &Request) {
        tracing::info!(method = %request.method, target = %request.target, "request");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let root = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    let mut resolvers = FileResolverGroup::new();
    resolvers.add(SystemResolver::new(root.as_str()));
    let cache = Arc::new(FileCache::with_resolver(resolvers));

    let started = Instant::now();
    let registry = Arc::new(StateRegistry::new());
    registry
        .add_stater("process", move |previous| {
            let uptime = started.elapsed().as_secs();
            let info = ProcessInfo {
                pid: std::process::id(),
                uptime_secs: if previous { uptime.saturating_sub(1) } else { uptime },
            };
            serde_json::to_value(info).unwrap_or_else(|_| json!(null))
        })
        .expect("fresh registry cannot hold duplicates");

    let mut server = PathedServer::new();
    server.set_threads(WORKERS);
    server.set_logger(TracingLogger);
    let port = server.set_port(PREFERRED_PORTS);

    registry
        .mount(server.add("/state/").expect("subroutes are registered once"))
        .expect("state routes are registered once");
    FolderHandler::new(Arc::clone(&cache))
        .attach_to(server.add("/").expect("subroutes are registered once"));

    let handle = server.start().await.expect("failed to start server");
    tracing::info!(port, root, "keyhole serving; press Ctrl-C to stop");

    // Snapshot states once a second so history.json has something to say.
    let ticker_registry = Arc::clone(&registry);
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            ticker_registry.update();
        }
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping server");
    ticker.abort();
    handle.shutdown().await;
    tracing::info!("server shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
