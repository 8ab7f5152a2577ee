//! Default streaming plumbing shared by the backends.
//!
//! HTTP-linked engines proxy their download urls through
//! [`proxy_url`]; direct engines copy local readers through
//! [`copy_cancellable`]. Both stop within one buffer of the request
//! token firing.

use std::io;

use reqwest::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::FsResult;
use crate::errors::FsError;

lazy_static! {
    static ref HTTP_CLIENT: reqwest::Client = reqwest::Client::new();
}

/// Fetch `url` and pump the body into `w`.
///
/// With `range = (offset, length)` a `Range` header is sent and both
/// `206` and `200` answers are accepted; a server that ignores the
/// range and answers `200` has the offset skipped and the length
/// enforced here, so the caller always sees exactly the requested
/// window.
pub async fn proxy_url(
    ctx: &CancellationToken,
    url: &str,
    range: Option<(u64, u64)>,
    w: &mut (dyn AsyncWrite + Send + Unpin),
) -> FsResult<()> {
    let mut req = HTTP_CLIENT.get(url);
    if let Some((offset, length)) = range {
        req = req.header(
            http::header::RANGE,
            format!("bytes={}-{}", offset, offset + length - 1),
        );
    }

    let mut resp = req.send().await.map_err(|e| {
        debug!("upstream request failed for {url}: {e}");
        FsError::GeneralFailure
    })?;

    let status = resp.status();
    let accepted = match range {
        Some(_) => status == StatusCode::PARTIAL_CONTENT || status == StatusCode::OK,
        None => status == StatusCode::OK,
    };
    if !accepted {
        debug!("upstream answered {status} for {url}");
        return Err(if status == StatusCode::NOT_FOUND {
            FsError::NotFound
        } else {
            FsError::GeneralFailure
        });
    }

    // When the upstream ignored our Range header, enforce the window here.
    let (mut to_skip, mut remaining) = match (range, status) {
        (Some((offset, length)), StatusCode::OK) => (offset, Some(length)),
        (Some((_, length)), _) => (0, Some(length)),
        (None, _) => (0, None),
    };

    loop {
        if ctx.is_cancelled() {
            return Err(FsError::Interrupted);
        }
        let chunk = match resp.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                debug!("upstream body error for {url}: {e}");
                return Err(FsError::GeneralFailure);
            }
        };

        let mut chunk = &chunk[..];
        if to_skip > 0 {
            let skip = (to_skip).min(chunk.len() as u64) as usize;
            chunk = &chunk[skip..];
            to_skip -= skip as u64;
        }
        if chunk.is_empty() {
            continue;
        }
        if let Some(rem) = remaining.as_mut() {
            if *rem == 0 {
                break;
            }
            let take = (*rem).min(chunk.len() as u64) as usize;
            chunk = &chunk[..take];
            *rem -= take as u64;
        }

        w.write_all(chunk).await.map_err(FsError::from)?;
    }
    w.flush().await.map_err(FsError::from)?;
    Ok(())
}

/// Copy at most `limit` bytes (`None` for everything) from `r` into
/// `w` using a `buf_size` buffer, checking the token between reads.
pub async fn copy_cancellable<R>(
    ctx: &CancellationToken,
    r: &mut R,
    w: &mut (dyn AsyncWrite + Send + Unpin),
    buf_size: usize,
    limit: Option<u64>,
) -> FsResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buf_size.max(512)];
    let mut remaining = limit;
    let mut copied: u64 = 0;

    loop {
        if ctx.is_cancelled() {
            return Err(FsError::Interrupted);
        }
        let want = match remaining {
            Some(0) => break,
            Some(rem) => (rem.min(buf.len() as u64)) as usize,
            None => buf.len(),
        };
        let n = r.read(&mut buf[..want]).await.map_err(FsError::from)?;
        if n == 0 {
            break;
        }
        w.write_all(&buf[..n]).await.map_err(FsError::from)?;
        copied += n as u64;
        if let Some(rem) = remaining.as_mut() {
            *rem -= n as u64;
        }
    }
    w.flush().await.map_err(FsError::from)?;
    Ok(copied)
}

/// True when a stream error just means the peer went away.
pub fn is_client_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_respects_limit_and_buffer() {
        let ctx = CancellationToken::new();
        let data = b"0123456789".to_vec();
        let mut src = &data[..];
        let mut out = std::io::Cursor::new(Vec::new());
        let n = copy_cancellable(&ctx, &mut src, &mut out, 4, Some(7))
            .await
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(out.into_inner(), b"0123456");
    }

    #[tokio::test]
    async fn copy_stops_when_cancelled() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let data = vec![0u8; 1024];
        let mut src = &data[..];
        let mut out = std::io::Cursor::new(Vec::new());
        let err = copy_cancellable(&ctx, &mut src, &mut out, 64, None)
            .await
            .unwrap_err();
        assert_eq!(err, FsError::Interrupted);
        assert!(out.into_inner().is_empty());
    }

    #[test]
    fn disconnect_classification() {
        let e = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert!(is_client_disconnect(&e));
        let e = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert!(!is_client_disconnect(&e));
    }
}
