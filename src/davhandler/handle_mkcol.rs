use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::{DavError, FsError};
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_mkcol(
        &self,
        req: &Request<()>,
        path: &DavPath,
    ) -> DavResult<Response<Body>> {
        // A request body is already refused with 415 by the dispatcher.
        let _guard = self.confirm_locks(req, path, None)?;

        // The parent listing changes whether or not the mkdir succeeds.
        self.cache.invalidate(path.parent().as_str());

        let backend = self.resolve_backend(path)?;
        backend.create_dir(path.as_str()).await.map_err(|e| match e {
            // an absent parent is a conflict, not a missing resource
            FsError::NotFound => DavError::Status(StatusCode::CONFLICT),
            _ => DavError::Fs(e),
        })?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::CREATED;
        Ok(res)
    }
}
