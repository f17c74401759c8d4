//! Behavioural tests for the item and stats caches against real temp files.
//!
//! Physical reads are counted through `CountingFs`, and mtimes are set
//! explicitly so invalidation never depends on filesystem timestamp
//! granularity.


use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tempfile::TempDir;

use super::{ItemCache, StatsCache};
use crate::data_path::DataPath;
use crate::storage::testing::CountingFs;

// ============================================================================
// Test Helpers
// ============================================================================

/// Temp directory holding an `items.json` seeded with `items`.
pub fn data_file(items: &Value) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("items.json");
    write_items(&path, items);
    (dir, path)
}

pub fn write_items(path: &Path, items: &Value) {
    let body = serde_json::to_string_pretty(items).expect("serialize");
    std::fs::write(path, body).expect("write items");
}

pub fn read_items(path: &Path) -> Vec<Value> {
    let raw = std::fs::read_to_string(path).expect("read items");
    serde_json::from_str(&raw).expect("file holds valid JSON")
}

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .expect("mtime")
}

pub fn set_mtime(path: &Path, when: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(when))
        .expect("set mtime");
}

/// Move the mtime well past anything the filesystem could have recorded.
pub fn bump_mtime(path: &Path) {
    set_mtime(path, mtime(path) + Duration::from_secs(5));
}

pub fn item_cache(path: &Path, fs: &Arc<CountingFs>) -> ItemCache {
    ItemCache::new(DataPath::Fixed(path.to_path_buf()), fs.clone())
}

pub fn stats_cache(path: &Path, fs: &Arc<CountingFs>) -> StatsCache {
    StatsCache::new(DataPath::Fixed(path.to_path_buf()), "price", fs.clone())
}

pub fn names(items: &[crate::types::Item]) -> Vec<String> {
    items
        .iter()
        .filter_map(|i| i.name().map(str::to_string))
        .collect()
}
