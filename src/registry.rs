//! Backend registry: mount-path keyed set of storage engines.
//!
//! Registration happens once at startup through engine factories; after
//! that the registry is effectively read-only and shared across request
//! handlers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::FsError;
use crate::finfo::Finfo;
use crate::storage::{FsResult, StorageBackend};

#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn StorageBackend>>>,
}

impl BackendRegistry {
    pub fn new() -> BackendRegistry {
        BackendRegistry::default()
    }

    /// Startup-time registration hook: the factory is invoked once and
    /// the produced engine is mounted under its own `mount_path`.
    pub fn register_engine<F>(&self, factory: F)
    where
        F: FnOnce() -> Arc<dyn StorageBackend>,
    {
        self.register(factory());
    }

    pub fn register(&self, backend: Arc<dyn StorageBackend>) {
        let mount = backend.mount_path().to_string();
        info!(
            "registering {} engine at {}",
            backend.config().name,
            mount
        );
        let mut backends = self.backends.write().unwrap_or_else(PoisonError::into_inner);
        backends.insert(mount, backend);
    }

    /// Resolve a request path to the engine with the longest matching
    /// mount prefix. The root is a virtual directory, never resolvable
    /// to a single engine.
    pub fn resolve(&self, path: &str) -> FsResult<Arc<dyn StorageBackend>> {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        backends
            .iter()
            .filter(|(mount, _)| mount_matches(mount, path))
            .max_by_key(|(mount, _)| mount.len())
            .map(|(_, b)| Arc::clone(b))
            .ok_or(FsError::NotFound)
    }

    /// Listing of the virtual root: one directory entry per mount.
    pub fn list_root(&self) -> Vec<Finfo> {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        backends.keys().map(Finfo::dir).collect()
    }

    pub fn mounts(&self) -> Vec<String> {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        backends.keys().cloned().collect()
    }
}

/// Prefix match on whole path segments.
fn mount_matches(mount: &str, path: &str) -> bool {
    match path.strip_prefix(mount) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}
