//! File and directory descriptors as produced by the storage backends.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metadata record for one file or directory in the virtual filesystem.
///
/// `path` is always absolute (root is `/`, directories carry no trailing
/// slash) and `name` is its last segment. Directories have `size == 0`,
/// and only files may carry a pre-resolved `raw_url`.
#[derive(Debug, Clone, PartialEq)]
pub struct Finfo {
    pub path: String,
    pub name: String,
    /// Opaque backend handle; empty when the backend has none.
    pub file_id: String,
    pub size: u64,
    pub mod_time: SystemTime,
    pub is_dir: bool,
    pub raw_url: Option<String>,
}

impl Finfo {
    pub fn file(path: impl Into<String>, size: u64, mod_time: SystemTime) -> Finfo {
        let path = path.into();
        Finfo {
            name: last_segment(&path).to_string(),
            path,
            file_id: String::new(),
            size,
            mod_time,
            is_dir: false,
            raw_url: None,
        }
    }

    pub fn dir(path: impl Into<String>) -> Finfo {
        let path = path.into();
        Finfo {
            name: last_segment(&path).to_string(),
            path,
            file_id: String::new(),
            size: 0,
            mod_time: UNIX_EPOCH,
            is_dir: true,
            raw_url: None,
        }
    }

    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Finfo {
        self.file_id = file_id.into();
        self
    }

    pub fn with_mod_time(mut self, mod_time: SystemTime) -> Finfo {
        self.mod_time = mod_time;
        self
    }

    pub fn with_raw_url(mut self, url: impl Into<String>) -> Finfo {
        self.raw_url = Some(url.into());
        self
    }

    /// Weak validator derived from size and mtime, same shape as the
    /// default apache etag.
    pub fn etag(&self) -> String {
        let t = self
            .mod_time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let t = t.as_secs() * 1_000_000 + t.subsec_nanos() as u64 / 1000;
        if self.is_dir {
            format!("\"{:x}\"", t)
        } else {
            format!("\"{:x}-{:x}\"", self.size, t)
        }
    }
}

/// Short-lived download location produced by a backend. For direct
/// backends the url is a local absolute path.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub url: String,
    /// How long the link stays valid; zero means "backend default".
    pub expire: Duration,
}

impl LinkInfo {
    pub fn new(url: impl Into<String>, expire: Duration) -> LinkInfo {
        LinkInfo {
            url: url.into(),
            expire,
        }
    }
}

pub(crate) fn last_segment(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((_, name)) => name,
        None => path,
    }
}
