//! keyhole: an HTTP server embedded in a host process, exposing live
//! application state and static or generated assets to external tools over a
//! loopback port.
//!
//! The host wires everything up programmatically before serving begins: pick
//! a port, attach subroute tables, register handlers and caches, then call
//! [`PathedServer::start`]. Plain HTTP/1.1, no TLS, no timeouts; this is for
//! trusted, low-volume local tooling, not the open internet.
//!
//! ```no_run
//! use keyhole::{FileCache, FolderHandler, PathedServer, SystemResolver};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), keyhole::ServerError> {
//! let cache = Arc::new(FileCache::with_resolver(SystemResolver::new("assets")));
//! let mut server = PathedServer::new();
//! server.set_port(&[17490, 17491]);
//! FolderHandler::new(cache).attach_to(server.add("/")?);
//! let handle = server.start().await?;
//! println!("serving on port {}", handle.port());
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cache;
pub mod http;
pub mod mime;
pub mod resolve;
pub mod route;
pub mod server;
pub mod state;

pub use buffer::{Buffer, BufferError, MemoryFile};
pub use cache::{CacheError, FileCache, FolderHandler};
pub use http::{Connection, Request};
pub use mime::{mime_of, web_ext, web_name};
pub use resolve::{FileResolver, FileResolverGroup, ResolveError, SystemResolver, ZipResolver};
pub use route::{handler, Handler, HandlerFuture, PathHandler, RouteError};
pub use server::{PathedServer, RequestLogger, ServerError, ServerHandle};
pub use state::{StateError, StateRegistry, Stater};
