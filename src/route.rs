//! Per-subroute handler tables.

use crate::http::Connection;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A request handler: receives the connection and the matched subpath.
pub type Handler = Arc<dyn Fn(Connection, String) -> HandlerFuture + Send + Sync>;

/// Wraps an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Connection, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |conn, subpath| Box::pin(f(conn, subpath)))
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("a handler for `{subpath}` is already registered")]
    Duplicate { subpath: String },
}

/// Normalizes a subroute to lower-case, slash-bounded `/…/` form.
pub(crate) fn normalize_subroute(path: &str) -> String {
    let mut path = path.to_lowercase();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

// Lower-case, with exactly one leading and one trailing slash stripped.
fn normalize_subpath(subpath: &str) -> String {
    let subpath = subpath.to_lowercase();
    let subpath = subpath.strip_prefix('/').unwrap_or(&subpath);
    let subpath = subpath.strip_suffix('/').unwrap_or(subpath);
    subpath.to_string()
}

/// A table of exact-subpath handlers owned by one subroute, with an optional
/// fallback for everything unmatched.
pub struct PathHandler {
    subroute: String,
    routes: FxHashMap<String, Handler>,
    fallback: Option<Handler>,
}

impl std::fmt::Debug for PathHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathHandler")
            .field("subroute", &self.subroute)
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl PathHandler {
    pub fn new(path: &str) -> Self {
        Self {
            subroute: normalize_subroute(path),
            routes: FxHashMap::default(),
            fallback: None,
        }
    }

    /// The subroute this table serves, in normalized `/…/` form.
    pub fn subroute(&self) -> &str {
        &self.subroute
    }

    /// Registers a handler for an exact subpath relative to the subroute.
    ///
    /// Registering the same subpath twice is an error; silent shadowing of
    /// routes is a latent correctness hazard.
    pub fn route(&mut self, subpath: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        let subpath = normalize_subpath(subpath);
        if self.routes.contains_key(&subpath) {
            return Err(RouteError::Duplicate { subpath });
        }
        self.routes.insert(subpath, handler);
        Ok(self)
    }

    /// Sets the handler for any subpath with no dedicated route.
    pub fn set_fallback(&mut self, handler: Handler) -> &mut Self {
        self.fallback = Some(handler);
        self
    }

    pub fn has(&self, subpath: &str) -> bool {
        self.routes.contains_key(&normalize_subpath(subpath))
    }

    /// Routes one request: exact match first, then the fallback, then a 404
    /// carrying the attempted subpath.
    pub async fn handle(&self, conn: Connection) {
        let relative = conn
            .request
            .path
            .strip_prefix(&self.subroute)
            .unwrap_or(&conn.request.path)
            .to_string();
        let subpath = normalize_subpath(&relative);

        if let Some(handler) = self.routes.get(&subpath) {
            handler(conn, subpath).await;
        } else if let Some(fallback) = &self.fallback {
            fallback(conn, relative).await;
        } else {
            conn.ratio(&subpath).await;
        }
    }
}
