//! The dispatcher: port selection, subroute registration, and the accept loop.

use crate::http::{Connection, Request};
use crate::route::{normalize_subroute, PathHandler, RouteError};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("a subserver for `{path}` is already attached")]
    DuplicateSubroute { path: String },
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Observes each parsed request before it is dispatched.
pub trait RequestLogger: Send + Sync {
    fn log(&self, request: &Request);
}

struct Shared {
    // Longest prefix first, so `/gfx/game/` wins over `/gfx/` and `/`.
    handlers: Vec<(String, PathHandler)>,
    logger: Option<Arc<dyn RequestLogger>>,
}

/// An HTTP server that dispatches requests to subroute-owned handler tables.
///
/// Configuration (port, worker count, subroutes) happens before
/// [`PathedServer::start`]; starting consumes the server and freezes the
/// routing table, so nothing can be reconfigured while serving.
pub struct PathedServer {
    port: u16,
    threads: usize,
    handlers: Vec<(String, PathHandler)>,
    logger: Option<Arc<dyn RequestLogger>>,
}

impl Default for PathedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl PathedServer {
    pub fn new() -> Self {
        Self {
            port: 0,
            threads: 1,
            handlers: Vec::new(),
            logger: None,
        }
    }

    /// Sets the port to the first of the candidates that actually binds, or a
    /// random port in [100, 65535] when none of them do.
    ///
    /// Probing opens and immediately drops a real listener per candidate, so
    /// a candidate can fail transiently; the random fallback just keeps
    /// drawing until a bind succeeds. Returns the chosen port.
    pub fn set_port(&mut self, candidates: &[u16]) -> u16 {
        for &port in candidates {
            if probe_port(port) {
                self.port = port;
                return port;
            }
        }
        loop {
            let port = fastrand::u16(100..=u16::MAX);
            if probe_port(port) {
                self.port = port;
                return port;
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sets how many concurrent accept-loop tasks [`PathedServer::start`]
    /// launches. Defaults to 1.
    pub fn set_threads(&mut self, count: usize) {
        self.threads = count.max(1);
    }

    pub fn set_logger(&mut self, logger: impl RequestLogger + 'static) {
        self.logger = Some(Arc::new(logger));
    }

    /// Creates and attaches a subserver for the given path.
    ///
    /// The path is normalized to lower-case `/…/` form; attaching the same
    /// subroute twice is an error.
    pub fn add(&mut self, path: &str) -> Result<&mut PathHandler, ServerError> {
        let path = normalize_subroute(path);
        if self.has(&path) {
            return Err(ServerError::DuplicateSubroute { path });
        }
        // Insert keeping longer prefixes first; ties keep registration order.
        let at = self
            .handlers
            .iter()
            .position(|(existing, _)| existing.len() < path.len())
            .unwrap_or(self.handlers.len());
        let table = PathHandler::new(&path);
        self.handlers.insert(at, (path, table));
        Ok(&mut self.handlers[at].1)
    }

    pub fn has(&self, path: &str) -> bool {
        let path = normalize_subroute(path);
        self.handlers.iter().any(|(existing, _)| *existing == path)
    }

    pub fn get(&self, path: &str) -> Option<&PathHandler> {
        let path = normalize_subroute(path);
        self.handlers
            .iter()
            .find(|(existing, _)| *existing == path)
            .map(|(_, table)| table)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut PathHandler> {
        let path = normalize_subroute(path);
        self.handlers
            .iter_mut()
            .find(|(existing, _)| *existing == path)
            .map(|(_, table)| table)
    }

    /// The registered subroutes in dispatch order (longest prefix first).
    pub fn subroutes(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(path, _)| path.as_str())
    }

    /// Binds the listener and launches the accept loops.
    ///
    /// Picks a port first when none has been set. Each of the configured
    /// worker tasks loops accept → spawn-dispatch, so a slow handler occupies
    /// its own task without throttling connection intake. No server-side
    /// timeouts are imposed; this serves trusted low-volume loopback tooling.
    pub async fn start(mut self) -> Result<ServerHandle, ServerError> {
        if self.port == 0 {
            self.set_port(&[]);
        }
        let port = self.port;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let listener = Arc::new(listener);

        let shared = Arc::new(Shared {
            handlers: self.handlers,
            logger: self.logger,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::with_capacity(self.threads);
        for worker in 0..self.threads {
            let listener = Arc::clone(&listener);
            let shared = Arc::clone(&shared);
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(accept_loop(worker, listener, shared, shutdown)));
        }

        tracing::info!(port, workers = self.threads, "server started");
        Ok(ServerHandle {
            port,
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

/// A handle to a running server: its port and the shutdown switch.
pub struct ServerHandle {
    port: u16,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Signals the accept loops to stop and waits for them to wind down.
    /// In-flight request tasks are left to finish on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

fn probe_port(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

async fn accept_loop(
    worker: usize,
    listener: Arc<TcpListener>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(%peer, worker, "accepted connection");
                    let shared = Arc::clone(&shared);
                    tokio::spawn(dispatch(stream, shared));
                }
                Err(err) => {
                    tracing::warn!(error = %err, worker, "accept failed");
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn dispatch(stream: TcpStream, shared: Arc<Shared>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request = match Request::read_from(&mut reader).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting malformed request");
            let _ = write_half
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            let _ = write_half.shutdown().await;
            return;
        }
    };

    if let Some(logger) = &shared.logger {
        logger.log(&request);
    }
    tracing::debug!(method = %request.method, path = %request.path, "dispatching");

    let path = request.path.clone();
    let conn = Connection::new(request, write_half);
    for (prefix, table) in &shared.handlers {
        if path.starts_with(prefix.as_str()) {
            table.handle(conn).await;
            return;
        }
    }
    conn.ratio("Server").await;
}
