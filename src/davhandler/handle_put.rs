use std::error::Error as StdError;

use bytes::buf::Buf;
use http::header::HeaderValue;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::storage::OpenOptions;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_put<ReqBody, ReqData, ReqError>(
        &self,
        req: &Request<()>,
        path: &DavPath,
        body: ReqBody,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let _guard = self.confirm_locks(req, path, None)?;

        let backend = self.resolve_backend(path)?;
        let mut file = backend
            .open(path.as_str(), OpenOptions::write_truncate())
            .await?;

        // Copy the body, then stat and commit. Cache invalidation runs
        // before the error verdict: a failed write may still have
        // touched the target.
        let mut copy_err = None;
        {
            pin_utils::pin_mut!(body);
            while let Some(chunk) = body.data().await {
                let buf = match chunk {
                    Ok(buf) => buf,
                    Err(e) => {
                        debug!("put {path}: request body error: {e}");
                        copy_err = Some(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
                        break;
                    }
                };
                if let Err(e) = file.write_buf(Box::new(buf)).await {
                    copy_err = Some(e.into());
                    break;
                }
            }
        }
        let meta = file.metadata().await;
        let flushed = file.flush().await;
        drop(file);

        self.invalidate_with_parent(path);

        if let Some(e) = copy_err {
            return Err(e);
        }
        flushed.map_err(|_| DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;
        let info = meta.map_err(|_| DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::CREATED;
        let etag = HeaderValue::from_str(&info.etag())
            .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?;
        res.headers_mut().insert("ETag", etag);
        Ok(res)
    }
}
