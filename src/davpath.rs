//! Request path handling.
//!
//! Paths are normalized once at the handler boundary; everything below
//! (cache keys, registry resolution, backend calls) assumes canonical
//! input: absolute, no `..` or `.` segments, no duplicate slashes, and
//! no trailing slash except for the root itself.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::DavError;
use crate::DavResult;

/// Characters that need escaping inside an href path segment.
const HREF_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'%')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A normalized absolute path in the virtual filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    path: String,
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl DavPath {
    /// Normalize an already percent-decoded path.
    pub fn new(path: &str) -> DavResult<DavPath> {
        if !path.starts_with('/') {
            return Err(DavError::InvalidPath);
        }
        let mut segments = Vec::new();
        for seg in path.split('/') {
            match seg {
                "" | "." => continue,
                ".." => return Err(DavError::InvalidPath),
                s => segments.push(s),
            }
        }
        let mut p = String::with_capacity(path.len());
        for seg in &segments {
            p.push('/');
            p.push_str(seg);
        }
        if p.is_empty() {
            p.push('/');
        }
        Ok(DavPath { path: p })
    }

    /// Decode the request uri and strip the configured prefix.
    pub fn from_uri_and_prefix(uri: &http::Uri, prefix: &str) -> DavResult<DavPath> {
        let raw = uri.path();
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| DavError::Utf8Error)?;
        let path = if prefix.is_empty() {
            decoded.as_ref()
        } else {
            match decoded.strip_prefix(prefix) {
                Some("") => "/",
                Some(rest) if rest.starts_with('/') => rest,
                _ => return Err(DavError::Status(http::StatusCode::NOT_FOUND)),
            }
        };
        DavPath::new(path)
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            crate::finfo::last_segment(&self.path)
        }
    }

    pub fn parent(&self) -> DavPath {
        DavPath {
            path: parent_dir(&self.path).to_string(),
        }
    }

    pub fn join(&self, name: &str) -> DavPath {
        let mut p = self.path.clone();
        if p != "/" {
            p.push('/');
        }
        p.push_str(name);
        DavPath { path: p }
    }

    /// Percent-encoded path for use in multistatus hrefs.
    pub fn as_url_string(&self) -> String {
        self.path
            .split('/')
            .map(|seg| utf8_percent_encode(seg, HREF_ENCODE).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Parent directory of a normalized path (`/` is its own parent).
pub fn parent_dir(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}
