//! ## Async WebDAV gateway over pluggable storage backends
//!
//! This library is an HTTP/Webdav `handler`: it takes a
//! `http::Request`, resolves the request path to one of several mounted
//! storage engines, and generates a `http::Response` — metadata from
//! PROPFIND, bytes from GET (with ranges), and mutations from
//! PUT/DELETE/MKCOL/COPY/MOVE. A process-wide metadata cache sits in
//! front of the engines and is kept consistent by invalidation on every
//! mutation.
//!
//! ## Backend interfaces.
//!
//! - you register engines into a [`BackendRegistry`], keyed by mount
//!   path; the longest matching mount wins, and `/` is a virtual
//!   directory listing every mount.
//! - each engine implements [`StorageBackend`]: a one-level `list`, a
//!   `link` resolving a download location, and optional stat, byte
//!   streaming and mutation calls with sensible defaults (HTTP-linked
//!   engines stream through their links out of the box).
//! - a [`DavLockSystem`] may be plugged in for LOCK/UNLOCK; the
//!   bundled [`FakeLs`] is enough for macOS/Windows clients.
//!
//! The handler works with the standard `http` and `http_body` types and
//! therefore plugs straight into hyper-style servers.
//!
//! ## Example.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dav_gateway::{BackendRegistry, DavHandler, FakeLs};
//! use dav_gateway::storage::localdisk::LocalDisk;
//!
//! let registry = Arc::new(BackendRegistry::new());
//! registry.register_engine(|| Arc::new(LocalDisk::new("/files", "/srv/files")));
//!
//! let handler = DavHandler::builder(registry)
//!     .locksystem(FakeLs::new())
//!     .build();
//! // hand `handler.handle(req)` your hyper requests.
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod errors;
mod util;

pub mod body;
pub mod cache;
pub mod config;
pub mod davpath;
pub mod finfo;
pub mod range;
pub mod registry;
pub mod storage;
pub mod walker;

mod davhandler;
mod ls;

pub use crate::cache::{LinkCache, MetadataCache};
pub use crate::config::GatewayConfig;
pub use crate::davhandler::{DavBuilder, DavHandler};
pub use crate::davpath::DavPath;
pub use crate::errors::{DavError, FsError};
pub use crate::finfo::{Finfo, LinkInfo};
pub use crate::ls::{DavLockSystem, FakeLs, LockGuard};
pub use crate::registry::BackendRegistry;
pub use crate::storage::StorageBackend;
pub use crate::util::{client_ip, DavMethod, DavMethodSet};

pub(crate) type DavResult<T> = Result<T, DavError>;
