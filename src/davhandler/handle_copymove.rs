use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::util::{parse_depth, DavMethod, Depth};
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        path: &DavPath,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let dest_hdr = req
            .headers()
            .get("destination")
            .and_then(|v| v.to_str().ok())
            .ok_or(DavError::InvalidDestination)?;
        let dest_uri: http::Uri = dest_hdr
            .parse()
            .map_err(|_| DavError::InvalidDestination)?;

        // Reject destinations on another host.
        if let Some(dest_auth) = dest_uri.authority() {
            let req_host = req
                .headers()
                .get("host")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !req_host.is_empty() && dest_auth.as_str() != req_host {
                debug!("destination host {dest_auth} differs from {req_host}");
                return Err(DavError::CrossHostDestination);
            }
        }

        let dst = DavPath::from_uri_and_prefix(&dest_uri, &self.prefix)?;
        if dst.is_root() {
            return Err(DavError::CrossHostDestination);
        }
        if dst == *path {
            return Err(DavError::DestinationEqualsSource);
        }

        let src_backend = self.resolve_backend(path)?;
        let dst_backend = self.resolve_backend(&dst)?;
        if src_backend.mount_path() != dst_backend.mount_path() {
            // no transactional semantics across backends
            debug!("refusing {method:?} across mounts {path} -> {dst}");
            return Err(DavError::Status(StatusCode::BAD_GATEWAY));
        }

        let depth_hdr = req.headers().get("depth").and_then(|v| v.to_str().ok());
        let overwrite_hdr = req
            .headers()
            .get("overwrite")
            .and_then(|v| v.to_str().ok());
        let dst_exists = self.stat(dst.as_str()).await.is_ok();

        if method == DavMethod::COPY {
            // A collection COPY accepts Depth 0 or infinity only.
            if depth_hdr.is_some() && parse_depth(depth_hdr)? == Depth::One {
                return Err(DavError::InvalidDepth);
            }
            // COPY locks the destination only; a locked-by-another
            // source may still be copied.
            let _guard = self.confirm_locks(req, &dst, None)?;

            let overwrite = overwrite_hdr != Some("F");
            if dst_exists && !overwrite {
                return Err(DavError::Status(StatusCode::PRECONDITION_FAILED));
            }

            self.invalidate_with_parent(&dst);
            src_backend.copy(path.as_str(), dst.as_str()).await?;
        } else {
            // A collection MOVE is always Depth: infinity.
            if depth_hdr.is_some() && parse_depth(depth_hdr)? != Depth::Infinity {
                return Err(DavError::InvalidDepth);
            }
            let _guard = self.confirm_locks(req, path, Some(&dst))?;

            let overwrite = overwrite_hdr == Some("T");
            if dst_exists {
                if !overwrite {
                    return Err(DavError::Status(StatusCode::PRECONDITION_FAILED));
                }
                src_backend.remove_all(dst.as_str()).await?;
            }

            self.invalidate_with_parent(path);
            self.invalidate_with_parent(&dst);
            src_backend.rename(path.as_str(), dst.as_str()).await?;
        }

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if dst_exists {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(res)
    }
}
