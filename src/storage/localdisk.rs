//! Local filesystem engine.
//!
//! A direct backend: links resolve to absolute paths on the local disk
//! and byte streams come straight from the files. Listings are not
//! cached since the disk is already the cheapest source of truth.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::{local_path, stream, BackendConfig, DavFile, FsFuture, OpenOptions, StorageBackend};
use crate::config::DEFAULT_BUFFER_SIZE;
use crate::errors::FsError;
use crate::finfo::{Finfo, LinkInfo};

const CONFIG: BackendConfig = BackendConfig {
    name: "localdisk",
    direct: true,
    no_cache: true,
};

pub struct LocalDisk {
    mount_path: String,
    root: PathBuf,
    buffer_size: usize,
}

impl LocalDisk {
    pub fn new(mount_path: impl Into<String>, root: impl Into<PathBuf>) -> LocalDisk {
        LocalDisk {
            mount_path: mount_path.into(),
            root: root.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> LocalDisk {
        self.buffer_size = buffer_size;
        self
    }

    fn abs_path(&self, rpath: &str) -> PathBuf {
        let rel = local_path(&self.mount_path, rpath).trim_start_matches('/');
        self.root.join(rel)
    }

    fn finfo(&self, rpath: &str, meta: &std::fs::Metadata) -> Finfo {
        let mod_time = meta.modified().unwrap_or(UNIX_EPOCH);
        if meta.is_dir() {
            Finfo::dir(rpath).with_mod_time(mod_time)
        } else {
            Finfo::file(rpath, meta.len(), mod_time)
        }
    }
}

impl StorageBackend for LocalDisk {
    fn config(&self) -> BackendConfig {
        CONFIG
    }

    fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn list<'a>(&'a self, parent: &'a Finfo) -> FsFuture<'a, Vec<Finfo>> {
        Box::pin(async move {
            trace!("localdisk: list {}", parent.path);
            let apath = self.abs_path(&parent.path);
            let mut rd = tokio::fs::read_dir(apath).await.map_err(FsError::from)?;
            let mut list = Vec::new();
            while let Some(entry) = rd.next_entry().await.map_err(FsError::from)? {
                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(e) => {
                        debug!("localdisk: stat of {name} failed: {e}");
                        continue;
                    }
                };
                let vpath = if parent.path == "/" {
                    format!("/{name}")
                } else {
                    format!("{}/{name}", parent.path)
                };
                list.push(self.finfo(&vpath, &meta));
            }
            Ok(list)
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> FsFuture<'a, Finfo> {
        Box::pin(async move {
            let meta = tokio::fs::metadata(self.abs_path(path))
                .await
                .map_err(FsError::from)?;
            Ok(self.finfo(path, &meta))
        })
    }

    fn link<'a>(&'a self, info: &'a Finfo) -> FsFuture<'a, LinkInfo> {
        Box::pin(async move {
            let apath = self.abs_path(&info.path);
            Ok(LinkInfo::new(
                apath.to_string_lossy().into_owned(),
                std::time::Duration::ZERO,
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
            let apath = self.abs_path(path);
            let meta = tokio::fs::metadata(&apath).await.map_err(FsError::from)?;
            if meta.is_dir() {
                return Err(FsError::IsDirectory);
            }
            let mut file = tokio::fs::File::open(&apath).await.map_err(FsError::from)?;
            stream::copy_cancellable(ctx, &mut file, w, self.buffer_size, None).await?;
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
            let apath = self.abs_path(path);
            let meta = tokio::fs::metadata(&apath).await.map_err(FsError::from)?;
            if meta.is_dir() {
                return Err(FsError::IsDirectory);
            }
            if offset >= meta.len() {
                return Err(FsError::Interrupted);
            }
            let mut file = tokio::fs::File::open(&apath).await.map_err(FsError::from)?;
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(FsError::from)?;
            stream::copy_cancellable(ctx, &mut file, w, self.buffer_size, Some(length)).await?;
            Ok(())
        })
    }

    fn open<'a>(&'a self, path: &'a str, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            trace!("localdisk: open {path}");
            let mut opt = tokio::fs::OpenOptions::new();
            opt.read(options.read)
                .write(options.write)
                .create(options.create)
                .truncate(options.truncate);
            let file = opt.open(self.abs_path(path)).await.map_err(FsError::from)?;
            Ok(Box::new(LocalDiskFile {
                file,
                path: path.to_string(),
            }) as Box<dyn DavFile>)
        })
    }

    fn create_dir<'a>(&'a self, path: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            trace!("localdisk: create_dir {path}");
            tokio::fs::create_dir(self.abs_path(path))
                .await
                .map_err(FsError::from)
        })
    }

    fn remove_all<'a>(&'a self, path: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            trace!("localdisk: remove_all {path}");
            let apath = self.abs_path(path);
            let meta = match tokio::fs::metadata(&apath).await {
                Ok(meta) => meta,
                // removing an absent path succeeds
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(FsError::from(e)),
            };
            if meta.is_dir() {
                tokio::fs::remove_dir_all(apath).await.map_err(FsError::from)
            } else {
                tokio::fs::remove_file(apath).await.map_err(FsError::from)
            }
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            trace!("localdisk: rename {from} {to}");
            tokio::fs::rename(self.abs_path(from), self.abs_path(to))
                .await
                .map_err(FsError::from)
        })
    }

    fn copy<'a>(&'a self, from: &'a str, to: &'a str) -> FsFuture<'a, ()> {
        Box::pin(async move {
            trace!("localdisk: copy {from} {to}");
            copy_tree(self.abs_path(from), self.abs_path(to)).await
        })
    }
}

fn copy_tree(from: PathBuf, to: PathBuf) -> FsFuture<'static, ()> {
    Box::pin(async move {
        let meta = tokio::fs::metadata(&from).await.map_err(FsError::from)?;
        if !meta.is_dir() {
            tokio::fs::copy(&from, &to).await.map_err(FsError::from)?;
            return Ok(());
        }
        match tokio::fs::create_dir(&to).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(FsError::from(e)),
        }
        let mut rd = tokio::fs::read_dir(&from).await.map_err(FsError::from)?;
        while let Some(entry) = rd.next_entry().await.map_err(FsError::from)? {
            let name = entry.file_name();
            copy_tree(from.join(&name), to.join(&name)).await?;
        }
        Ok(())
    })
}

struct LocalDiskFile {
    file: tokio::fs::File,
    path: String,
}

impl DavFile for LocalDiskFile {
    fn metadata(&mut self) -> FsFuture<'_, Finfo> {
        Box::pin(async move {
            let meta = self.file.metadata().await.map_err(FsError::from)?;
            Ok(Finfo::file(
                self.path.clone(),
                meta.len(),
                meta.modified().unwrap_or(UNIX_EPOCH),
            ))
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async move {
            while buf.has_remaining() {
                let n = self.file.write(buf.chunk()).await.map_err(FsError::from)?;
                buf.advance(n);
            }
            Ok(())
        })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async move { self.file.write_all(&buf).await.map_err(FsError::from) })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async move { self.file.sync_all().await.map_err(FsError::from) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(root: &std::path::Path) -> LocalDisk {
        LocalDisk::new("/disk", root).with_buffer_size(512)
    }

    #[tokio::test]
    async fn list_and_get() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let d = disk(dir.path());
        let mut list = d.list(&Finfo::dir("/disk")).await.unwrap();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].path, "/disk/a.txt");
        assert_eq!(list[0].size, 5);
        assert!(list[1].is_dir);

        let info = d.get("/disk/a.txt").await.unwrap();
        assert_eq!(info.name, "a.txt");
        assert!(matches!(d.get("/disk/nope").await, Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn stream_full_and_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        let d = disk(dir.path());
        let ctx = CancellationToken::new();

        let mut out = std::io::Cursor::new(Vec::new());
        d.stream_file(&ctx, "/disk/a.txt", &mut out).await.unwrap();
        assert_eq!(out.into_inner(), b"hello world");

        let mut out = std::io::Cursor::new(Vec::new());
        d.stream_range(&ctx, "/disk/a.txt", 6, 5, &mut out)
            .await
            .unwrap();
        assert_eq!(out.into_inner(), b"world");

        // over-long range writes what remains
        let mut out = std::io::Cursor::new(Vec::new());
        d.stream_range(&ctx, "/disk/a.txt", 6, 500, &mut out)
            .await
            .unwrap();
        assert_eq!(out.into_inner(), b"world");

        // offset past the end signals end of input
        let mut out = std::io::Cursor::new(Vec::new());
        let err = d
            .stream_range(&ctx, "/disk/a.txt", 100, 1, &mut out)
            .await
            .unwrap_err();
        assert_eq!(err, FsError::Interrupted);
    }

    #[tokio::test]
    async fn refuses_to_stream_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let d = disk(dir.path());
        let ctx = CancellationToken::new();
        let mut out = std::io::Cursor::new(Vec::new());
        let err = d.stream_file(&ctx, "/disk/sub", &mut out).await.unwrap_err();
        assert_eq!(err, FsError::IsDirectory);
    }

    #[tokio::test]
    async fn open_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let d = disk(dir.path());

        let mut f = d
            .open("/disk/new.txt", OpenOptions::write_truncate())
            .await
            .unwrap();
        f.write_bytes(Bytes::from_static(b"payload")).await.unwrap();
        f.flush().await.unwrap();
        let info = f.metadata().await.unwrap();
        assert_eq!(info.size, 7);

        d.remove_all("/disk/new.txt").await.unwrap();
        assert!(matches!(
            d.get("/disk/new.txt").await,
            Err(FsError::NotFound)
        ));
        // absent path still succeeds
        d.remove_all("/disk/new.txt").await.unwrap();
    }
}
