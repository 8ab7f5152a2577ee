//! GET/HEAD (and POST, which WebDAV clients use interchangeably):
//! the streaming response path.
//!
//! Headers are written from cached metadata, then the backend pumps
//! bytes through a duplex pipe into the response body on its own task.
//! Dropping the response (client gone) cancels the request token and
//! collapses the pipe, so the pump stops within one buffer.

use bytes::Bytes;
use headers::HeaderMapExt;
use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio::io::{AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::range::ByteRange;
use crate::storage::StorageBackend;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_get(
        &self,
        req: &Request<()>,
        path: &DavPath,
    ) -> DavResult<Response<Body>> {
        let head = req.method() == http::Method::HEAD;

        let info = self.stat(path.as_str()).await?;
        if info.is_dir {
            return Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
        }

        let mut res = Response::new(Body::empty());
        let etag = HeaderValue::from_str(&info.etag())
            .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?;
        res.headers_mut().insert("ETag", etag);
        set_attachment(res.headers_mut(), &info.name);
        res.headers_mut()
            .insert("Accept-Ranges", HeaderValue::from_static("bytes"));

        let size = info.size;
        if head {
            res.headers_mut().typed_insert(headers::ContentLength(size));
            return Ok(res);
        }

        let backend = self.resolve_backend(path)?;
        let range_hdr = req
            .headers()
            .get(http::header::RANGE)
            .and_then(|v| v.to_str().ok());

        if let Some(range_hdr) = range_hdr {
            let range = if size > 0 {
                ByteRange::parse(range_hdr, size)
            } else {
                Err(crate::range::RangeError::Unsatisfiable)
            };
            match range {
                Ok(range) => {
                    let length = range.length();
                    res.headers_mut().typed_insert(headers::ContentLength(length));
                    insert_str(
                        res.headers_mut(),
                        CONTENT_RANGE,
                        &format!("bytes {}-{}/{}", range.start, range.end, size),
                    );
                    *res.status_mut() = StatusCode::PARTIAL_CONTENT;
                    *res.body_mut() = self.spawn_stream(
                        backend,
                        path.as_str().to_string(),
                        Some((range.start, length)),
                    );
                    return Ok(res);
                }
                Err(e) => {
                    debug!("unsatisfiable range {range_hdr:?} on {path}: {e}");
                    res.headers_mut().remove(CONTENT_LENGTH);
                    insert_str(res.headers_mut(), CONTENT_RANGE, &format!("bytes */{size}"));
                    *res.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
                    return Ok(res);
                }
            }
        }

        // Full body; transfer encoding is left to the server (chunked).
        *res.body_mut() = self.spawn_stream(backend, path.as_str().to_string(), None);
        Ok(res)
    }

    /// Spawn the byte pump and return the receiving end as a response
    /// body. `range` is `(offset, length)`.
    fn spawn_stream(
        &self,
        backend: std::sync::Arc<dyn StorageBackend>,
        path: String,
        range: Option<(u64, u64)>,
    ) -> Body {
        let token = CancellationToken::new();
        let pump_token = token.clone();
        let buffer_size = self.buffer_size.max(512);
        let (mut wh, mut rh) = tokio::io::duplex(buffer_size);

        tokio::spawn(async move {
            let w: &mut (dyn AsyncWrite + Send + Unpin) = &mut wh;
            let result = match range {
                Some((offset, length)) => {
                    backend
                        .stream_range(&pump_token, &path, offset, length, w)
                        .await
                }
                None => backend.stream_file(&pump_token, &path, w).await,
            };
            match result {
                Ok(()) => trace!("finished streaming {path}"),
                Err(e) if e.is_disconnect() => {
                    debug!("client disconnected while streaming {path}")
                }
                Err(e) => error!("streaming {path} failed: {e}"),
            }
        });

        // Cancels the pump when the response body is dropped.
        let guard = token.drop_guard();
        Body::stream(async_stream::stream! {
            let _guard = guard;
            let mut buf = vec![0u8; buffer_size];
            loop {
                match AsyncReadExt::read(&mut rh, &mut buf).await {
                    Ok(0) => break,
                    Ok(n) => yield Ok(Bytes::copy_from_slice(&buf[..n])),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }
}

fn insert_str(headers: &mut http::HeaderMap, name: http::header::HeaderName, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(name, v);
    }
}

/// `Content-Disposition` with the raw and percent-encoded filename,
/// plus a `Content-Type` derived from the extension.
fn set_attachment(headers: &mut http::HeaderMap, name: &str) {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    insert_str(headers, CONTENT_TYPE, mime.as_ref());

    let encoded = utf8_percent_encode(name, NON_ALPHANUMERIC).to_string();
    let both = format!("attachment; filename=\"{name}\"; filename*=UTF-8''{encoded}");
    match HeaderValue::from_str(&both) {
        Ok(v) => {
            headers.insert(CONTENT_DISPOSITION, v);
        }
        Err(_) => {
            // non-ascii name: the encoded form alone is always valid
            insert_str(
                headers,
                CONTENT_DISPOSITION,
                &format!("attachment; filename*=UTF-8''{encoded}"),
            );
        }
    }
}
