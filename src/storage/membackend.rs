//! Ephemeral in-memory engine.
//!
//! Implements the whole backend surface over a path-keyed map. Used by
//! the test suite and the demo server; handy as a scratch mount. It
//! deliberately relies on the trait's default `get`, keeping the
//! list-parent-and-select path exercised.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use bytes::{Buf, Bytes};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::{BackendConfig, DavFile, FsFuture, OpenOptions, StorageBackend};
use crate::davpath::parent_dir;
use crate::errors::FsError;
use crate::finfo::{Finfo, LinkInfo};

const CONFIG: BackendConfig = BackendConfig {
    name: "mem",
    direct: false,
    no_cache: false,
};

#[derive(Clone)]
struct Node {
    data: Bytes,
    mod_time: SystemTime,
    is_dir: bool,
}

type Nodes = BTreeMap<String, Node>;

pub struct MemBackend {
    mount_path: String,
    nodes: Arc<RwLock<Nodes>>,
}

impl MemBackend {
    pub fn new(mount_path: impl Into<String>) -> MemBackend {
        let mount_path = mount_path.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            mount_path.clone(),
            Node {
                data: Bytes::new(),
                mod_time: SystemTime::now(),
                is_dir: true,
            },
        );
        MemBackend {
            mount_path,
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    /// Seed a file, creating intermediate directories.
    pub fn add_file(&self, path: &str, data: impl Into<Bytes>) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let mut dir = parent_dir(path);
        while dir != "/" && !nodes.contains_key(dir) {
            nodes.insert(
                dir.to_string(),
                Node {
                    data: Bytes::new(),
                    mod_time: SystemTime::now(),
                    is_dir: true,
                },
            );
            dir = parent_dir(dir);
        }
        nodes.insert(
            path.to_string(),
            Node {
                data: data.into(),
                mod_time: SystemTime::now(),
                is_dir: false,
            },
        );
    }

    pub fn add_dir(&self, path: &str) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.insert(
            path.to_string(),
            Node {
                data: Bytes::new(),
                mod_time: SystemTime::now(),
                is_dir: true,
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.contains_key(path)
    }

    fn finfo(path: &str, node: &Node) -> Finfo {
        if node.is_dir {
            Finfo::dir(path).with_mod_time(node.mod_time)
        } else {
            Finfo::file(path, node.data.len() as u64, node.mod_time)
        }
    }

    fn node(&self, path: &str) -> Result<Node, FsError> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.get(path).cloned().ok_or(FsError::NotFound)
    }

    /// Keys equal to `path` or below it.
    fn subtree_keys(nodes: &Nodes, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        nodes
            .keys()
            .filter(|k| *k == path || k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl StorageBackend for MemBackend {
    fn config(&self) -> BackendConfig {
        CONFIG
    }

    fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn list<'a>(&'a self, parent: &'a Finfo) -> FsFuture<'a, Vec<Finfo>> {
        Box::pin(async move {
            let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
            match nodes.get(&parent.path) {
                Some(node) if node.is_dir => {}
                Some(_) => return Err(FsError::IsDirectory),
                None => return Err(FsError::NotFound),
            }
            let mut list = Vec::new();
            for (path, node) in nodes.iter() {
                if path.as_str() != parent.path && parent_dir(path) == parent.path {
                    list.push(Self::finfo(path, node));
                }
            }
            Ok(list)
        })
    }

    fn link<'a>(&'a self, info: &'a Finfo) -> FsFuture<'a, LinkInfo> {
        Box::pin(async move {
            self.node(&info.path)?;
            Ok(LinkInfo::new(
                format!("mem://{}", info.path),
                Duration::from_secs(60),
            ))
        })
    }

    fn stream_file<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        path: &'a str,
        w: &'a mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    ) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let node = self.node(path)?;
            if node.is_dir {
                return Err(FsError::IsDirectory);
            }
            if ctx.is_cancelled() {
                return Err(FsError::Interrupted);
            }
            w.write_all(&node.data).await.map_err(FsError::from)?;
            w.flush().await.map_err(FsError::from)?;
            Ok(())
        })
    }

    fn stream_range<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        path: &'a str,
        offset: u64,
        length: u64,
        w: &'a mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    ) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let node = self.node(path)?;
            if node.is_dir {
                return Err(FsError::IsDirectory);
            }
            let size = node.data.len() as u64;
            if offset >= size {
                return Err(FsError::Interrupted);
            }
            if ctx.is_cancelled() {
                return Err(FsError::Interrupted);
            }
            let end = (offset + length).min(size) as usize;
            w.write_all(&node.data[offset as usize..end])
                .await
                .map_err(FsError::from)?;
            w.flush().await.map_err(FsError::from)?;
            Ok(())
        })
    }

    fn open<'a>(&'a self, path: &'a str, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            if !options.write {
                return Err(FsError::NotImplemented);
            }
            let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
            match nodes.get(parent_dir(path)) {
                Some(node) if node.is_dir => {}
                _ => return Err(FsError::NotFound),
            }
            match nodes.get(path) {
                Some(node) if node.is_dir => return Err(FsError::IsDirectory),
                Some(_) if !options.truncate => return Err(FsError::Exists),
                _ => {}
            }
            Ok(Box::new(MemFile {
                nodes: Arc::clone(&self.nodes),
                path: path.to_string(),
                buf: Vec::new(),
            }) as Box<dyn DavFile>)
        })
    }

    fn create_dir<'a>(&'a self, path: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            if nodes.contains_key(path) {
                return Err(FsError::Exists);
            }
            match nodes.get(parent_dir(path)) {
                Some(node) if node.is_dir => {}
                _ => return Err(FsError::NotFound),
            }
            nodes.insert(
                path.to_string(),
                Node {
                    data: Bytes::new(),
                    mod_time: SystemTime::now(),
                    is_dir: true,
                },
            );
            Ok(())
        })
    }

    fn remove_all<'a>(&'a self, path: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            for key in Self::subtree_keys(&nodes, path) {
                nodes.remove(&key);
            }
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            let keys = Self::subtree_keys(&nodes, from);
            if keys.is_empty() {
                return Err(FsError::NotFound);
            }
            for key in Self::subtree_keys(&nodes, to) {
                nodes.remove(&key);
            }
            for key in keys {
                if let Some(node) = nodes.remove(&key) {
                    let dst = format!("{}{}", to, &key[from.len()..]);
                    nodes.insert(dst, node);
                }
            }
            Ok(())
        })
    }

    fn copy<'a>(&'a self, from: &'a str, to: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            let keys = Self::subtree_keys(&nodes, from);
            if keys.is_empty() {
                return Err(FsError::NotFound);
            }
            for key in keys {
                if let Some(node) = nodes.get(&key).cloned() {
                    let dst = format!("{}{}", to, &key[from.len()..]);
                    nodes.insert(dst, node);
                }
            }
            Ok(())
        })
    }
}

struct MemFile {
    nodes: Arc<RwLock<Nodes>>,
    path: String,
    buf: Vec<u8>,
}

impl DavFile for MemFile {
    fn metadata(&mut self) -> FsFuture<'_, Finfo> {
        Box::pin(async move {
            Ok(Finfo::file(
                self.path.clone(),
                self.buf.len() as u64,
                SystemTime::now(),
            ))
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async move {
            while buf.has_remaining() {
                let chunk = buf.chunk();
                self.buf.extend_from_slice(chunk);
                let n = chunk.len();
                buf.advance(n);
            }
            Ok(())
        })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async move {
            self.buf.extend_from_slice(&buf);
            Ok(())
        })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            nodes.insert(
                self.path.clone(),
                Node {
                    data: Bytes::from(std::mem::take(&mut self.buf)),
                    mod_time: SystemTime::now(),
                    is_dir: false,
                },
            );
            Ok(())
        })
    }
}
