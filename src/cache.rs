//! Metadata cache.
//!
//! One TTL + bounded LRU cache over file-info and directory-listing
//! entries, keyed by normalized virtual path, plus a smaller cache for
//! short-lived download links.
//!
//! Eviction is insertion-order: reads never promote an entry, only
//! inserts move a key to the most-recent slot. The dominant PROPFIND/GET
//! workload gains nothing from read promotion, and this keeps every
//! getter on the read lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::config::WebdavConfig;
use crate::finfo::{Finfo, LinkInfo};

enum Item {
    File(Finfo),
    Dir(Vec<Finfo>),
}

struct CachedItem {
    item: Item,
    expire_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CachedItem>,
    // Insertion order for eviction. Every key appears here exactly once.
    order: Vec<String>,
}

impl Inner {
    fn remove_from_order(&mut self, path: &str) {
        if let Some(i) = self.order.iter().position(|p| p == path) {
            self.order.remove(i);
        }
    }

    fn insert(&mut self, path: String, item: CachedItem, max_size: usize) {
        if self.entries.insert(path.clone(), item).is_some() {
            self.remove_from_order(&path);
        }
        self.order.push(path);
        if max_size == 0 {
            return;
        }
        while self.entries.len() > max_size && !self.order.is_empty() {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }

    fn remove(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.remove_from_order(path);
        }
    }
}

/// TTL + bounded LRU cache of `Finfo` and directory listings.
///
/// Getters never surface errors; a miss is a normal outcome. An entry
/// observed expired during a read stays in place and reports a miss —
/// readers never escalate to the write lock. Physical removal happens
/// on the next insert over the key, on eviction, or in the sweeper.
pub struct MetadataCache {
    inner: RwLock<Inner>,
    ttl: Duration,
    // 0 means unbounded.
    max_size: usize,
}

impl MetadataCache {
    pub fn new(ttl: Duration, max_size: usize) -> MetadataCache {
        MetadataCache {
            inner: RwLock::new(Inner::default()),
            ttl,
            max_size,
        }
    }

    pub fn from_config(cfg: &WebdavConfig) -> MetadataCache {
        MetadataCache::new(cfg.cache_ttl(), cfg.cache_capacity())
    }

    /// Cached `Finfo`, if present, unexpired, and actually keyed as a
    /// file. A directory listing under the same key reports a miss.
    pub fn get_file(&self, path: &str) -> Option<Finfo> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.entries.get(path) {
            Some(c) if c.expire_at > Instant::now() => match &c.item {
                Item::File(info) => {
                    trace!("cache hit (file): {path}");
                    Some(info.clone())
                }
                Item::Dir(_) => None,
            },
            _ => None,
        }
    }

    /// Cached directory listing, unsorted as produced by the backend.
    pub fn get_dir_list(&self, path: &str) -> Option<Vec<Finfo>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.entries.get(path) {
            Some(c) if c.expire_at > Instant::now() => match &c.item {
                Item::Dir(list) => {
                    trace!("cache hit (dir): {path}");
                    Some(list.clone())
                }
                Item::File(_) => None,
            },
            _ => None,
        }
    }

    pub fn set_file(&self, path: &str, info: Finfo) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let item = CachedItem {
            item: Item::File(info),
            expire_at: Instant::now() + self.ttl,
        };
        inner.insert(path.to_string(), item, self.max_size);
    }

    pub fn set_dir_list(&self, path: &str, list: Vec<Finfo>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let item = CachedItem {
            item: Item::Dir(list),
            expire_at: Instant::now() + self.ttl,
        };
        inner.insert(path.to_string(), item, self.max_size);
    }

    pub fn invalidate(&self, path: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(path);
    }

    /// Remove every entry whose path contains `pattern`. Atomic with
    /// respect to concurrent readers.
    pub fn invalidate_pattern(&self, pattern: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|p| p.contains(pattern))
            .cloned()
            .collect();
        for path in doomed {
            inner.remove(&path);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Called from the sweeper task.
    pub fn sweep_expired(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, c)| c.expire_at <= now)
            .map(|(p, _)| p.clone())
            .collect();
        if !doomed.is_empty() {
            debug!("cache sweep: dropping {} expired entries", doomed.len());
        }
        for path in doomed {
            inner.remove(&path);
        }
    }

    /// Background task that periodically drops expired entries, so
    /// long-idle keys do not sit in memory until the next insert.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                cache.sweep_expired();
            }
        })
    }

    #[cfg(test)]
    fn order_is_permutation_of_keys(&self) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if inner.order.len() != inner.entries.len() {
            return false;
        }
        inner.order.iter().all(|p| inner.entries.contains_key(p))
    }
}

/// Cache of short-lived download links, honoring each link's own
/// expiry. Kept apart from the metadata cache: link lifetimes are
/// dictated by the backends, not by our TTL.
pub struct LinkCache {
    inner: RwLock<HashMap<String, (LinkInfo, Instant)>>,
    default_ttl: Duration,
}

impl LinkCache {
    pub fn new(default_ttl: Duration) -> LinkCache {
        LinkCache {
            inner: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn get(&self, path: &str) -> Option<LinkInfo> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.get(path) {
            Some((link, expire_at)) if *expire_at > Instant::now() => Some(link.clone()),
            _ => None,
        }
    }

    pub fn set(&self, path: &str, link: LinkInfo) {
        let ttl = if link.expire.is_zero() {
            self.default_ttl
        } else {
            link.expire
        };
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(path.to_string(), (link, Instant::now() + ttl));
    }

    pub fn invalidate(&self, path: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(path);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn finfo(path: &str) -> Finfo {
        Finfo::file(path, 1024, SystemTime::now())
    }

    fn cache() -> MetadataCache {
        MetadataCache::new(Duration::from_secs(300), 1000)
    }

    #[test]
    fn file_roundtrip_and_miss() {
        let c = cache();
        c.set_file("/test/file.txt", finfo("/test/file.txt"));

        let got = c.get_file("/test/file.txt").expect("cached file");
        assert_eq!(got.name, "file.txt");
        assert_eq!(got.size, 1024);

        assert!(c.get_file("/non/existent.txt").is_none());
    }

    #[test]
    fn kind_mismatch_is_a_miss() {
        let c = cache();
        c.set_dir_list("/test/dir", vec![finfo("/test/dir/a.txt")]);
        assert!(c.get_file("/test/dir").is_none());
        assert!(c.get_dir_list("/test/dir").is_some());

        c.set_file("/test/f", finfo("/test/f"));
        assert!(c.get_dir_list("/test/f").is_none());
    }

    #[test]
    fn expiry_is_a_miss() {
        let c = MetadataCache::new(Duration::from_millis(40), 1000);
        c.set_file("/test/expiring.txt", finfo("/test/expiring.txt"));
        assert!(c.get_file("/test/expiring.txt").is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert!(c.get_file("/test/expiring.txt").is_none());
        assert!(c.order_is_permutation_of_keys());
    }

    #[test]
    fn invalidate_removes() {
        let c = cache();
        c.set_file("/test/gone.txt", finfo("/test/gone.txt"));
        assert!(c.get_file("/test/gone.txt").is_some());

        c.invalidate("/test/gone.txt");
        assert!(c.get_file("/test/gone.txt").is_none());
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let c = cache();
        for i in 0..5 {
            let p = format!("/test/clear_{i}.txt");
            c.set_file(&p, finfo(&p));
        }
        assert_eq!(c.len(), 5);
        c.clear();
        assert_eq!(c.len(), 0);
        assert!(c.order_is_permutation_of_keys());
    }

    #[test]
    fn invalidate_pattern_is_exact() {
        let c = cache();
        for p in ["/test/file1.txt", "/test/file2.txt", "/other/file3.txt"] {
            c.set_file(p, finfo(p));
        }
        c.invalidate_pattern("/test/");

        assert!(c.get_file("/test/file1.txt").is_none());
        assert!(c.get_file("/test/file2.txt").is_none());
        assert!(c.get_file("/other/file3.txt").is_some());
        assert!(c.order_is_permutation_of_keys());
    }

    #[test]
    fn insertion_order_eviction() {
        let c = MetadataCache::new(Duration::from_secs(300), 3);
        for i in 0..5 {
            let p = format!("/test/size_limit_{i}.txt");
            c.set_file(&p, finfo(&p));
        }
        // survivors are exactly the last max_size inserted
        for i in 0..2 {
            assert!(c.get_file(&format!("/test/size_limit_{i}.txt")).is_none());
        }
        for i in 2..5 {
            assert!(c.get_file(&format!("/test/size_limit_{i}.txt")).is_some());
        }
        assert_eq!(c.len(), 3);
        assert!(c.order_is_permutation_of_keys());
    }

    #[test]
    fn reads_do_not_promote() {
        let c = MetadataCache::new(Duration::from_secs(300), 3);
        for p in ["/a", "/b", "/c"] {
            c.set_file(p, finfo(p));
        }
        // touching /a must not save it from eviction
        assert!(c.get_file("/a").is_some());
        c.set_file("/d", finfo("/d"));

        assert!(c.get_file("/a").is_none());
        for p in ["/b", "/c", "/d"] {
            assert!(c.get_file(p).is_some());
        }
    }

    #[test]
    fn reinsert_moves_to_most_recent_slot() {
        let c = MetadataCache::new(Duration::from_secs(300), 3);
        for p in ["/a", "/b", "/c"] {
            c.set_file(p, finfo(p));
        }
        // overwriting /a re-appends it, so /b is now the oldest
        c.set_file("/a", finfo("/a"));
        c.set_file("/d", finfo("/d"));

        assert!(c.get_file("/b").is_none());
        for p in ["/a", "/c", "/d"] {
            assert!(c.get_file(p).is_some());
        }
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let c = MetadataCache::new(Duration::from_millis(20), 0);
        c.set_file("/x", finfo("/x"));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(c.len(), 1);
        c.sweep_expired();
        assert_eq!(c.len(), 0);
        assert!(c.order_is_permutation_of_keys());
    }

    #[test]
    fn dir_listing_roundtrip() {
        let c = cache();
        let list = vec![
            finfo("/test/directory/file1.txt"),
            finfo("/test/directory/file2.txt"),
            Finfo::dir("/test/directory/subdir"),
        ];
        c.set_dir_list("/test/directory", list);

        let got = c.get_dir_list("/test/directory").expect("cached listing");
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].name, "file1.txt");
        assert!(got[2].is_dir);
    }

    #[test]
    fn link_cache_honors_per_link_expiry() {
        let lc = LinkCache::new(Duration::from_secs(300));
        lc.set(
            "/m/a.txt",
            LinkInfo::new("https://dl.example/a", Duration::from_millis(30)),
        );
        assert!(lc.get("/m/a.txt").is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(lc.get("/m/a.txt").is_none());
    }
}
