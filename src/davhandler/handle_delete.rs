use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::{DavError, FsError};
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_delete(
        &self,
        req: &Request<()>,
        path: &DavPath,
    ) -> DavResult<Response<Body>> {
        let _guard = self.confirm_locks(req, path, None)?;

        // remove_all succeeds on an absent path, but WebDAV wants a
        // 404 there, so stat first.
        if let Err(e) = self.stat(path.as_str()).await {
            return match e {
                DavError::Fs(FsError::NotFound) => Err(e),
                _ => Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED)),
            };
        }

        self.invalidate_with_parent(path);

        let backend = self.resolve_backend(path)?;
        backend
            .remove_all(path.as_str())
            .await
            .map_err(|e| match e {
                FsError::NotFound => DavError::Fs(e),
                _ => DavError::Status(StatusCode::METHOD_NOT_ALLOWED),
            })?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::NO_CONTENT;
        Ok(res)
    }
}
