//! Filesystem cache backend
//!
//! Pages are stored as `BASE/aa/bb/<md5-of-url>.pac`, where `aa`/`bb` are
//! the first two byte pairs of the hex digest. The two-level sharding keeps
//! directories small on large crawls.

use crate::page::Page;
use crate::storage::Storage;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of serialized page records
const PAGE_EXTENSION: &str = "pac";

/// Content-addressed page cache on the local filesystem
#[derive(Debug, Clone)]
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    /// Creates a cache rooted at the given directory
    ///
    /// The directory does not need to exist yet; shard directories are
    /// created on demand by [`Storage::put`].
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FileStorage { base: base.into() }
    }

    /// Computes the sharded cache path for a URL
    fn entry_path(&self, url: &str) -> PathBuf {
        let digest = hex::encode(md5::compute(url.as_bytes()).0);
        self.base
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(format!("{digest}.{PAGE_EXTENSION}"))
    }

    fn read_page(path: &Path) -> Option<Page> {
        let bytes = fs::read(path).ok()?;
        match Page::from_bytes(&bytes) {
            Ok(page) => Some(page),
            Err(e) => {
                tracing::warn!("storage: discarding unreadable entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Collects every `.pac` path under the cache root
    fn entry_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        collect_entries(&self.base, &mut paths);
        paths
    }
}

fn collect_entries(dir: &Path, paths: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_entries(&path, paths);
        } else if path.extension().and_then(|e| e.to_str()) == Some(PAGE_EXTENSION) {
            paths.push(path);
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, url: &str) -> Option<Page> {
        Self::read_page(&self.entry_path(url))
    }

    fn put(&self, page: &Page) {
        if page.url.is_empty() {
            return;
        }

        let path = self.entry_path(&page.url);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::error!("storage: cannot create {}: {}", parent.display(), e);
                return;
            }
        }

        let bytes = match page.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("storage: cannot serialize {}: {}", page.url, e);
                return;
            }
        };

        if let Err(e) = fs::write(&path, bytes) {
            tracing::error!("storage: cannot write {}: {}", path.display(), e);
        }
    }

    fn iterate(&self) -> Box<dyn Iterator<Item = Page> + '_> {
        Box::new(
            self.entry_paths()
                .into_iter()
                .filter_map(|path| Self::read_page(&path)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        (dir, storage)
    }

    #[test]
    fn test_put_then_get() {
        let (_dir, storage) = create_test_storage();

        let mut page = Page::new("post", "/posts/1");
        page.body = b"hello".to_vec();
        storage.put(&page);

        let restored = storage.get("/posts/1").unwrap();
        assert_eq!(restored, page);
    }

    #[test]
    fn test_get_absent_url() {
        let (_dir, storage) = create_test_storage();
        assert!(storage.get("http://example.com/missing").is_none());
    }

    #[test]
    fn test_put_overwrites_by_url() {
        let (_dir, storage) = create_test_storage();

        let mut page = Page::new("post", "/posts/1");
        page.body = b"first".to_vec();
        storage.put(&page);

        page.body = b"second".to_vec();
        storage.put(&page);

        assert_eq!(storage.get("/posts/1").unwrap().body, b"second");
    }

    #[test]
    fn test_put_empty_url_is_noop() {
        let (dir, storage) = create_test_storage();
        storage.put(&Page::new("post", ""));

        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_entry_path_is_sharded() {
        let storage = FileStorage::new("/cache");
        let path = storage.entry_path("http://example.com/");
        let digest = hex::encode(md5::compute(b"http://example.com/").0);

        assert_eq!(
            path,
            Path::new("/cache")
                .join(&digest[0..2])
                .join(&digest[2..4])
                .join(format!("{digest}.pac"))
        );
    }

    #[test]
    fn test_iterate_yields_every_page() {
        let (_dir, storage) = create_test_storage();

        for i in 0..5 {
            storage.put(&Page::new("post", format!("/posts/{i}")));
        }

        let mut urls: Vec<String> = storage.iterate().map(|p| p.url).collect();
        urls.sort();
        assert_eq!(urls, vec!["/posts/0", "/posts/1", "/posts/2", "/posts/3", "/posts/4"]);
    }

    #[test]
    fn test_iterate_empty_cache() {
        let (_dir, storage) = create_test_storage();
        assert_eq!(storage.iterate().count(), 0);
    }

    #[test]
    fn test_iterate_skips_corrupt_entries() {
        let (dir, storage) = create_test_storage();
        storage.put(&Page::new("post", "/ok"));

        let bad = dir.path().join("zz").join("zz");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("zzzz.pac"), b"not a page record").unwrap();

        let pages: Vec<Page> = storage.iterate().collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "/ok");
    }
}
