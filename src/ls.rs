//! Locking surface.
//!
//! Lock bookkeeping is an external concern; the handler only confirms
//! locks before mutations and forwards LOCK/UNLOCK bodies to whatever
//! provider is configured. The bundled [`FakeLs`] grants every request
//! with opaque tokens, which is all macOS and Windows clients need to
//! mount the share read-write.

use std::sync::Arc;

use http::{Response, StatusCode};
use uuid::Uuid;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::util::xml_escape;
use crate::DavResult;

/// Scoped release of the temporary locks taken by
/// [`DavLockSystem::confirm`]. Runs on every exit path.
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    pub fn noop() -> LockGuard {
        LockGuard { release: None }
    }

    pub fn new(release: impl FnOnce() + Send + 'static) -> LockGuard {
        LockGuard {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

pub trait DavLockSystem: Send + Sync {
    /// Verify the request may touch `src` (and `dst` for COPY/MOVE)
    /// given the submitted `If` header. A failure carries the status to
    /// answer with (usually `423 Locked`).
    fn confirm(
        &self,
        src: &DavPath,
        dst: Option<&DavPath>,
        if_header: Option<&str>,
    ) -> Result<LockGuard, StatusCode>;

    /// Handle a LOCK request body, unchanged.
    fn lock(
        &self,
        path: &DavPath,
        body: &[u8],
        timeout: Option<&str>,
    ) -> DavResult<Response<Body>>;

    /// Handle an UNLOCK for the submitted token.
    fn unlock(&self, path: &DavPath, token: Option<&str>) -> DavResult<Response<Body>>;
}

/// Lock provider that never refuses and never remembers.
pub struct FakeLs;

impl FakeLs {
    pub fn new() -> Arc<FakeLs> {
        Arc::new(FakeLs)
    }
}

impl DavLockSystem for FakeLs {
    fn confirm(
        &self,
        _src: &DavPath,
        _dst: Option<&DavPath>,
        _if_header: Option<&str>,
    ) -> Result<LockGuard, StatusCode> {
        Ok(LockGuard::noop())
    }

    fn lock(
        &self,
        path: &DavPath,
        _body: &[u8],
        timeout: Option<&str>,
    ) -> DavResult<Response<Body>> {
        let timeout = match timeout {
            Some(t) if t.starts_with("Second-") => t.to_string(),
            _ => "Second-3600".to_string(),
        };
        let token = format!("opaquelocktoken:{}", Uuid::new_v4());

        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
             <D:prop xmlns:D=\"DAV:\"><D:lockdiscovery><D:activelock>\n\
             <D:locktype><D:write/></D:locktype>\n\
             <D:lockscope><D:exclusive/></D:lockscope>\n\
             <D:depth>infinity</D:depth>\n\
             <D:timeout>{}</D:timeout>\n\
             <D:locktoken><D:href>{}</D:href></D:locktoken>\n\
             <D:lockroot><D:href>{}</D:href></D:lockroot>\n\
             </D:activelock></D:lockdiscovery></D:prop>\n",
            xml_escape(&timeout),
            token,
            xml_escape(&path.as_url_string()),
        );

        let resp = Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Lock-Token", format!("<{token}>"))
            .body(Body::from(xml))
            .map_err(|_| crate::errors::DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?;
        Ok(resp)
    }

    fn unlock(&self, _path: &DavPath, _token: Option<&str>) -> DavResult<Response<Body>> {
        let resp = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .map_err(|_| crate::errors::DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?;
        Ok(resp)
    }
}
