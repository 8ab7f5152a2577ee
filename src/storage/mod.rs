//! The storage backend contract.
//!
//! Every mounted engine implements [`StorageBackend`]. The surface is a
//! fixed capability set: engines that have no native single-node stat or
//! no native byte streaming inherit the provided defaults (list the
//! parent and select by name; proxy through the engine's download link).
//! There is no runtime capability probing anywhere in the hot path.

use bytes::{Buf, Bytes};
use futures_util::future::BoxFuture;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::errors::FsError;
use crate::finfo::{Finfo, LinkInfo};

pub mod stream;

#[cfg(feature = "localdisk")]
pub mod localdisk;
#[cfg(feature = "membackend")]
pub mod membackend;

pub type FsResult<T> = Result<T, FsError>;
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;

/// Static description of a backend engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendConfig {
    pub name: &'static str,
    /// Direct backends resolve links to local paths the gateway opens
    /// itself; proxied backends resolve to HTTP urls we relay.
    pub direct: bool,
    /// Forbids caching of this backend's listings and links.
    pub no_cache: bool,
}

/// Options for [`StorageBackend::open`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenOptions {
    /// The PUT open mode: read-write, create, truncate.
    pub fn write_truncate() -> OpenOptions {
        OpenOptions {
            read: true,
            write: true,
            create: true,
            truncate: true,
        }
    }
}

/// A writable file handle, used by PUT.
pub trait DavFile: Send {
    fn metadata(&mut self) -> FsFuture<'_, Finfo>;
    fn write_buf(&mut self, buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()>;
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()>;
    fn flush(&mut self) -> FsFuture<'_, ()>;
}

/// A storage engine mounted into the virtual filesystem.
///
/// All paths passed in are normalized virtual paths that resolved to
/// this backend; implementations strip their own `mount_path` prefix
/// (see [`local_path`]).
///
/// Mutating operations default to `NotImplemented`, which the handler
/// reports as `405`: read-only cloud engines simply leave them out.
pub trait StorageBackend: Send + Sync {
    fn config(&self) -> BackendConfig;

    /// Absolute virtual path this engine is mounted under.
    fn mount_path(&self) -> &str;

    /// One-level listing of `parent`. Implementations may use
    /// `parent.file_id` when a cached listing of the grandparent
    /// populated it.
    fn list<'a>(&'a self, parent: &'a Finfo) -> FsFuture<'a, Vec<Finfo>>;

    /// Resolve a download location for a single file.
    fn link<'a>(&'a self, info: &'a Finfo) -> FsFuture<'a, LinkInfo>;

    /// Single-node stat. The default lists the parent directory and
    /// selects by name, which suits engines without a stat call.
    fn get<'a>(&'a self, path: &'a str) -> FsFuture<'a, Finfo> {
        Box::pin(async move {
            let (dir, name) = match path.trim_end_matches('/').rsplit_once('/') {
                Some(("", name)) => ("/", name),
                Some((dir, name)) => (dir, name),
                None => return Err(FsError::NotFound),
            };
            if name.is_empty() {
                return Err(FsError::NotFound);
            }
            let parent = Finfo::dir(dir);
            let list = self.list(&parent).await?;
            list.into_iter()
                .find(|f| f.name == name)
                .ok_or(FsError::NotFound)
        })
    }

    /// Push the whole file body to `w`, honoring cancellation between
    /// buffers. The default resolves the engine's link and proxies it
    /// over HTTP.
    fn stream_file<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        path: &'a str,
        w: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let info = self.get(path).await?;
            if info.is_dir {
                return Err(FsError::IsDirectory);
            }
            let link = self.link(&info).await?;
            stream::proxy_url(ctx, &link.url, None, w).await
        })
    }

    /// Push `[offset, offset + length)` to `w`. Writes whatever remains
    /// when `length` overshoots; an offset at or past the end of the
    /// file yields `Interrupted` (end of input). The default proxies a
    /// `Range` request against the engine's link.
    fn stream_range<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        path: &'a str,
        offset: u64,
        length: u64,
        w: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let info = self.get(path).await?;
            if info.is_dir {
                return Err(FsError::IsDirectory);
            }
            if offset >= info.size {
                return Err(FsError::Interrupted);
            }
            let link = self.link(&info).await?;
            stream::proxy_url(ctx, &link.url, Some((offset, length)), w).await
        })
    }

    fn open<'a>(&'a self, path: &'a str, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        let _ = (path, options);
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn create_dir<'a>(&'a self, path: &'a str) -> FsFuture<'a, ()> {
        let _ = path;
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    /// Remove a file, or a directory and everything below it. Removing
    /// an absent path succeeds; the handler stats first to produce the
    /// WebDAV `404`.
    fn remove_all<'a>(&'a self, path: &'a str) -> FsFuture<'a, ()> {
        let _ = path;
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> FsFuture<'a, ()> {
        let _ = (from, to);
        Box::pin(async { Err(FsError::NotImplemented) })
    }

    fn copy<'a>(&'a self, from: &'a str, to: &'a str) -> FsFuture<'a, ()> {
        let _ = (from, to);
        Box::pin(async { Err(FsError::NotImplemented) })
    }
}

/// Strip a backend's mount prefix off a resolved virtual path.
pub fn local_path<'a>(mount_path: &str, path: &'a str) -> &'a str {
    match path.strip_prefix(mount_path) {
        Some("") | None => "/",
        Some(rest) => rest,
    }
}
