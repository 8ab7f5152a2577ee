//! Configuration consumed by the gateway core.
//!
//! Loading and file formats are the embedding application's concern;
//! the core only sees these plain structs. Zero values select the
//! built-in defaults.

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_SIZE: usize = 10_000;
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub webdav: WebdavConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebdavConfig {
    /// TTL of metadata-cache entries, in seconds.
    pub metadata_cache_ttl: u64,
    /// Maximum number of metadata-cache entries.
    pub cache_size: usize,
    /// Streaming copy buffer, in bytes.
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Peers whose forwarding headers are believed by `util::client_ip`.
    pub trusted_proxies: Vec<String>,
}

impl WebdavConfig {
    pub fn cache_ttl(&self) -> Duration {
        if self.metadata_cache_ttl == 0 {
            DEFAULT_CACHE_TTL
        } else {
            Duration::from_secs(self.metadata_cache_ttl)
        }
    }

    pub fn cache_capacity(&self) -> usize {
        if self.cache_size == 0 {
            DEFAULT_CACHE_SIZE
        } else {
            self.cache_size
        }
    }

    pub fn stream_buffer(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        }
    }
}
