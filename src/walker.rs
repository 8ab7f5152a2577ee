//! Depth-bounded walk over the virtual filesystem, feeding PROPFIND,
//! plus the pagination helper the listing API uses.
//!
//! Listings come cache-first; on a miss the resolved backend is asked
//! and the cache populated (unless the backend forbids it). Children
//! are visited in name order so responses are deterministic across
//! backends.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::cache::MetadataCache;
use crate::davpath::parent_dir;
use crate::errors::DavError;
use crate::finfo::Finfo;
use crate::registry::BackendRegistry;

/// Unbounded recursion depth.
pub const INFINITE_DEPTH: i32 = -1;

pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Walk callback outcome. `SkipDir` returned while visiting a
/// directory stops the descent into it and nothing else.
#[derive(Debug)]
pub enum WalkError {
    SkipDir,
    Other(DavError),
}

impl From<DavError> for WalkError {
    fn from(e: DavError) -> Self {
        WalkError::Other(e)
    }
}

impl From<crate::errors::FsError> for WalkError {
    fn from(e: crate::errors::FsError) -> Self {
        WalkError::Other(e.into())
    }
}

pub type WalkFn<'a> = dyn FnMut(&str, &Finfo) -> Result<(), WalkError> + Send + 'a;

/// One page of a sorted directory listing.
#[derive(Debug, Clone)]
pub struct PagedListing {
    pub items: Vec<Finfo>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

pub struct DirectoryWalker {
    cache: Arc<MetadataCache>,
    registry: Arc<BackendRegistry>,
}

impl DirectoryWalker {
    pub fn new(cache: Arc<MetadataCache>, registry: Arc<BackendRegistry>) -> DirectoryWalker {
        DirectoryWalker { cache, registry }
    }

    /// Sorted one-level listing of `path`, cache-first.
    pub async fn dir_list(&self, path: &str) -> Result<Vec<Finfo>, DavError> {
        let mut list = self.cached_or_fetch(path).await?;
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn cached_or_fetch(&self, path: &str) -> Result<Vec<Finfo>, DavError> {
        if path == "/" {
            return Ok(self.registry.list_root());
        }
        if let Some(list) = self.cache.get_dir_list(path) {
            return Ok(list);
        }

        let backend = self.registry.resolve(path)?;
        let mut parent = Finfo::dir(path);
        // A cached listing of the grandparent may know this directory's
        // backend handle; pass it along so engines can skip a lookup.
        if let Some(plist) = self.cache.get_dir_list(parent_dir(path)) {
            if let Some(item) = plist.iter().find(|f| f.path == path) {
                parent.file_id = item.file_id.clone();
            }
        }

        let list = backend.list(&parent).await?;
        if !backend.config().no_cache {
            self.cache.set_dir_list(path, list.clone());
        }
        Ok(list)
    }

    /// Depth-first walk rooted at `info`, visiting each node before its
    /// children. `depth` 0 visits the root only, 1 one level of
    /// children, [`INFINITE_DEPTH`] everything.
    pub async fn walk(
        &self,
        ctx: &CancellationToken,
        depth: i32,
        path: &str,
        info: &Finfo,
        f: &mut WalkFn<'_>,
    ) -> Result<(), WalkError> {
        self.walk_inner(ctx, depth, path.to_string(), info.clone(), f)
            .await
    }

    fn walk_inner<'a, 'b: 'a>(
        &'a self,
        ctx: &'a CancellationToken,
        mut depth: i32,
        path: String,
        info: Finfo,
        f: &'a mut WalkFn<'b>,
    ) -> BoxFuture<'a, Result<(), WalkError>> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                return Err(WalkError::Other(DavError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "walk canceled",
                ))));
            }

            match f(&path, &info) {
                Ok(()) => {}
                Err(WalkError::SkipDir) if info.is_dir => return Ok(()),
                Err(e) => return Err(e),
            }
            if !info.is_dir || depth == 0 {
                return Ok(());
            }
            if depth == 1 {
                depth = 0;
            }

            let mut children = self.cached_or_fetch(&path).await.map_err(WalkError::Other)?;
            children.sort_by(|a, b| a.name.cmp(&b.name));

            for child in children {
                let child_path = if path == "/" {
                    format!("/{}", child.name)
                } else {
                    format!("{}/{}", path, child.name)
                };
                let child_is_dir = child.is_dir;
                match self.walk_inner(ctx, depth, child_path, child, &mut *f).await {
                    Ok(()) => {}
                    // SkipDir bubbling out of a directory child ends that
                    // subtree only; out of a file it aborts the walk.
                    Err(WalkError::SkipDir) if child_is_dir => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
    }

    /// Page `page` (1-based) of the sorted listing of `path`.
    pub async fn get_page(
        &self,
        path: &str,
        page: usize,
        page_size: usize,
    ) -> Result<PagedListing, DavError> {
        let page = page.max(1);
        let page_size = match page_size {
            0 => DEFAULT_PAGE_SIZE,
            s if s > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
            s => s,
        };

        let list = self.dir_list(path).await?;
        let total = list.len();
        let start = (page - 1) * page_size;
        if start >= total {
            return Ok(PagedListing {
                items: Vec::new(),
                total,
                page,
                page_size,
                has_more: false,
            });
        }
        let end = (start + page_size).min(total);
        Ok(PagedListing {
            items: list[start..end].to_vec(),
            total,
            page,
            page_size,
            has_more: end < total,
        })
    }
}
