use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::meta::types::ImageMetadata;

/// One memoized record, valid while the file's (size, mtime) stand still.
struct CacheEntry {
    size: u64,
    mtime: SystemTime,
    meta: ImageMetadata,
}

/// Metadata memo keyed by path and validated against (size, mtime).
///
/// Created at run start, shared by reference across scans, dropped at run
/// end. Writers replace stale entries.
#[derive(Default)]
pub struct MetadataCache {
    inner: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached record for `path`, if the file is unchanged on disk.
    pub fn lookup(&self, path: &Path) -> Option<ImageMetadata> {
        let (size, mtime) = stat(path)?;
        let map = self.inner.lock().expect("cache mutex poisoned");
        map.get(path)
            .filter(|e| e.size == size && e.mtime == mtime)
            .map(|e| e.meta.clone())
    }

    pub fn store(&self, path: &Path, meta: ImageMetadata) {
        let Some((size, mtime)) = stat(path) else {
            return;
        };
        let mut map = self.inner.lock().expect("cache mutex poisoned");
        map.insert(path.to_path_buf(), CacheEntry { size, mtime, meta });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn stat(path: &Path) -> Option<(u64, SystemTime)> {
    let md = std::fs::metadata(path).ok()?;
    let mtime = md.modified().ok()?;
    Some((md.len(), mtime))
}
