//! LOCK/UNLOCK pass straight through to the configured lock provider;
//! without one they are simply not allowed.

use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        path: &DavPath,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        match &self.ls {
            Some(ls) => {
                let timeout = req.headers().get("timeout").and_then(|v| v.to_str().ok());
                ls.lock(path, body, timeout)
            }
            None => Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED)),
        }
    }

    pub(crate) async fn handle_unlock(
        &self,
        req: &Request<()>,
        path: &DavPath,
    ) -> DavResult<Response<Body>> {
        match &self.ls {
            Some(ls) => {
                let token = req
                    .headers()
                    .get("lock-token")
                    .and_then(|v| v.to_str().ok())
                    .map(|t| t.trim_start_matches('<').trim_end_matches('>'));
                ls.unlock(path, token)
            }
            None => Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED)),
        }
    }
}
