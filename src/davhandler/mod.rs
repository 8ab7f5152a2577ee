//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use bytes::buf::Buf;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::cache::{LinkCache, MetadataCache};
use crate::config::{GatewayConfig, DEFAULT_CACHE_TTL};
use crate::davpath::DavPath;
use crate::errors::{DavError, FsError};
use crate::finfo::{Finfo, LinkInfo};
use crate::ls::{DavLockSystem, LockGuard};
use crate::registry::BackendRegistry;
use crate::storage::StorageBackend;
use crate::util::{dav_method, DavMethod, DavMethodSet};
use crate::walker::DirectoryWalker;
use crate::DavResult;

pub mod handle_copymove;
pub mod handle_delete;
pub mod handle_gethead;
pub mod handle_lock;
pub mod handle_mkcol;
pub mod handle_options;
pub mod handle_propfind;
pub mod handle_put;

// Pre-read request bodies (PROPFIND etc.) are capped at this.
const MAX_PREREAD_BODY: usize = 65536;

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Mounted storage engines.
    registry: Arc<BackendRegistry>,
    /// Lock provider, if any.
    ls: Option<Arc<dyn DavLockSystem>>,
    /// Set of allowed methods (defaults to "all methods").
    allow: DavMethodSet,
    /// Cache and streaming tunables.
    config: GatewayConfig,
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new(registry: Arc<BackendRegistry>) -> DavBuilder {
        DavBuilder {
            prefix: String::new(),
            registry,
            ls: None,
            allow: DavMethodSet::WEBDAV_RW,
            config: GatewayConfig::default(),
        }
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build(self) -> DavHandler {
        self.into()
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a virtual path.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the lock provider to use.
    pub fn locksystem(mut self, ls: Arc<dyn DavLockSystem>) -> Self {
        self.ls = Some(ls);
        self
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(mut self, allow: DavMethodSet) -> Self {
        self.allow = allow;
        self
    }

    /// Cache TTL/size and streaming buffer configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }
}

/// The webdav handler struct.
///
/// `builder` is used to instantiate a handler; `handle` does the actual
/// work. The handler clones cheaply, one per connection is fine.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) prefix: Arc<String>,
    pub(crate) registry: Arc<BackendRegistry>,
    pub(crate) cache: Arc<MetadataCache>,
    pub(crate) links: Arc<LinkCache>,
    pub(crate) walker: Arc<DirectoryWalker>,
    pub(crate) ls: Option<Arc<dyn DavLockSystem>>,
    pub(crate) allow: DavMethodSet,
    pub(crate) buffer_size: usize,
}

impl From<DavBuilder> for DavHandler {
    fn from(cfg: DavBuilder) -> Self {
        let cache = Arc::new(MetadataCache::from_config(&cfg.config.webdav));
        let walker = Arc::new(DirectoryWalker::new(
            Arc::clone(&cache),
            Arc::clone(&cfg.registry),
        ));
        DavHandler {
            prefix: Arc::new(cfg.prefix),
            registry: cfg.registry,
            cache,
            links: Arc::new(LinkCache::new(DEFAULT_CACHE_TTL)),
            walker,
            ls: cfg.ls,
            allow: cfg.allow,
            buffer_size: cfg.config.webdav.stream_buffer(),
        }
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder(registry: Arc<BackendRegistry>) -> DavBuilder {
        DavBuilder::new(registry)
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        self.handle_inner(req).await
    }

    /// The metadata cache behind this handler. External collaborators
    /// (the admin API) use this for invalidation hooks.
    pub fn metadata_cache(&self) -> Arc<MetadataCache> {
        Arc::clone(&self.cache)
    }

    /// Drop cached metadata and links for one path.
    pub fn invalidate_cache(&self, path: &str) {
        self.cache.invalidate(path);
        self.links.invalidate(path);
    }

    /// Drop cached metadata for every path containing `pattern`.
    pub fn invalidate_cache_pattern(&self, pattern: &str) {
        self.cache.invalidate_pattern(pattern);
    }

    /// Resolve a download link for `path`, consulting the link cache.
    /// Links are cached with their backend-declared expiry.
    pub async fn resolve_link(&self, path: &str) -> DavResult<LinkInfo> {
        let backend = self.registry.resolve(path)?;
        let cacheable = !backend.config().no_cache;
        if cacheable {
            if let Some(link) = self.links.get(path) {
                debug!("link cache hit: {path}");
                return Ok(link);
            }
        }
        let info = self.stat(path).await?;
        if info.is_dir {
            return Err(DavError::Fs(FsError::IsDirectory));
        }
        let link = backend.link(&info).await?;
        if cacheable {
            self.links.set(path, link.clone());
        }
        Ok(link)
    }

    // internal dispatcher.
    async fn handle_inner<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let is_ms = req
            .headers()
            .get("user-agent")
            .and_then(|s| s.to_str().ok())
            .map(|s| s.contains("Microsoft"))
            .unwrap_or(false);

        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                resp
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                let mut resp = Response::builder();
                if is_ms && err.statuscode() == StatusCode::NOT_FOUND {
                    // Windows caches a 404 case-insensitively for up to
                    // a minute, which breaks "dir www" after "dir WWW".
                    // Try to keep it from caching.
                    resp = resp
                        .header("Cache-Control", "no-store, no-cache, must-revalidate")
                        .header("Pragma", "no-cache")
                        .header("Expires", "0")
                        .header("Vary", "*");
                }
                resp = resp.header("Content-Length", "0").status(err.statuscode());
                if err.must_close() {
                    resp = resp.header("connection", "close");
                }
                resp.body(Body::empty())
                    .unwrap_or_else(|_| Response::new(Body::empty()))
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // see if method is allowed.
        if !self.allow.contains(method) {
            debug!(
                "method {} not allowed on request {}",
                req.method(),
                req.uri()
            );
            return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
        }

        // make sure the request path is valid.
        let path = DavPath::from_uri_and_prefix(req.uri(), &self.prefix)?;

        debug!("== START REQUEST {:?} {}", method, path);

        // PUT is the only handler that streams the body itself; all the
        // others work from a bounded pre-read.
        if method == DavMethod::PUT {
            return self.handle_put(&req, &path, body).await;
        }

        let body_data = self.read_request(body, MAX_PREREAD_BODY).await?;
        match method {
            DavMethod::PROPFIND | DavMethod::PROPPATCH | DavMethod::LOCK => {}
            _ => {
                if !body_data.is_empty() {
                    return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
                }
            }
        }

        match method {
            DavMethod::OPTIONS => self.handle_options(&req, &path).await,
            DavMethod::PROPFIND => self.handle_propfind(&req, &path, &body_data).await,
            DavMethod::PROPPATCH => self.handle_proppatch(&req, &path, &body_data).await,
            DavMethod::MKCOL => self.handle_mkcol(&req, &path).await,
            DavMethod::DELETE => self.handle_delete(&req, &path).await,
            DavMethod::LOCK => self.handle_lock(&req, &path, &body_data).await,
            DavMethod::UNLOCK => self.handle_unlock(&req, &path).await,
            DavMethod::HEAD | DavMethod::GET | DavMethod::POST => {
                self.handle_get(&req, &path).await
            }
            DavMethod::COPY | DavMethod::MOVE => self.handle_copymove(&req, &path, method).await,
            _ => Err(DavError::UnknownDavMethod),
        }
    }
}

impl DavHandler {
    /// Cache-first single-node stat.
    pub(crate) async fn stat(&self, path: &str) -> DavResult<Finfo> {
        if path == "/" {
            return Ok(Finfo::dir("/"));
        }
        if let Some(info) = self.cache.get_file(path) {
            return Ok(info);
        }
        let backend = self.registry.resolve(path)?;
        let info = match backend.get(path).await {
            Ok(info) => info,
            // A mount root exists by virtue of being mounted, even when
            // the engine cannot stat it (no node above it to list).
            Err(FsError::NotFound) if path == backend.mount_path() => Finfo::dir(path),
            Err(e) => return Err(e.into()),
        };
        if !backend.config().no_cache {
            self.cache.set_file(path, info.clone());
        }
        Ok(info)
    }

    /// Populate the file cache for a discovered node, honoring the
    /// owning backend's no-cache flag.
    pub(crate) fn cache_file(&self, path: &str, info: &Finfo) {
        if path == "/" {
            return;
        }
        if let Ok(backend) = self.registry.resolve(path) {
            if !backend.config().no_cache {
                self.cache.set_file(path, info.clone());
            }
        }
    }

    /// Verify the request's locks before a mutation. The returned guard
    /// releases on every exit path.
    pub(crate) fn confirm_locks(
        &self,
        req: &Request<()>,
        src: &DavPath,
        dst: Option<&DavPath>,
    ) -> DavResult<LockGuard> {
        match &self.ls {
            Some(ls) => {
                let if_header = req.headers().get("if").and_then(|v| v.to_str().ok());
                ls.confirm(src, dst, if_header).map_err(DavError::Status)
            }
            None => Ok(LockGuard::noop()),
        }
    }

    pub(crate) fn resolve_backend(&self, path: &DavPath) -> DavResult<Arc<dyn StorageBackend>> {
        Ok(self.registry.resolve(path.as_str())?)
    }

    /// Drop the mutated target and its parent's listing from the
    /// caches. Safe to run before knowing whether the mutation stuck; a
    /// subsequent miss reloads.
    pub(crate) fn invalidate_with_parent(&self, path: &DavPath) {
        self.cache.invalidate(path.as_str());
        self.links.invalidate(path.as_str());
        self.cache.invalidate(path.parent().as_str());
    }

    // drain request body and return length.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                DavError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof"))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }
}
