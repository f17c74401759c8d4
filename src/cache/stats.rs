use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde_json::Value;

use super::SingleFlight;
use crate::data_path::DataPath;
use crate::debug_log::{self, TimedOp};
use crate::error::{StoreError, StoreResult};
use crate::storage::StoreFs;
use crate::types::{Item, Stats};

pub const DEFAULT_AVERAGE_FIELD: &str = "price";

#[derive(Debug, Clone)]
struct CachedStats {
    stats: Stats,
    path: PathBuf,
    modified: SystemTime,
}

struct Inner {
    fs: Arc<dyn StoreFs>,
    data_path: DataPath,
    average_field: String,
    cached: Mutex<Option<CachedStats>>,
    computations: SingleFlight<PathBuf, StoreResult<Stats>>,
}

/// Aggregate statistics over the backing file, recomputed when its mtime changes.
///
/// Independent of `ItemCache`: it parses the file itself and shares no state.
#[derive(Clone)]
pub struct StatsCache {
    inner: Arc<Inner>,
}

impl StatsCache {
    pub fn new(data_path: DataPath, average_field: &str, fs: Arc<dyn StoreFs>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fs,
                data_path,
                average_field: average_field.to_string(),
                cached: Mutex::new(None),
                computations: SingleFlight::new(),
            }),
        }
    }

    pub async fn get(&self) -> StoreResult<Stats> {
        let path = self.inner.data_path.resolve();
        let modified = self
            .inner
            .fs
            .modified(&path)
            .await
            .map_err(|e| StoreError::storage(&path, e))?;

        let cached = self.inner.cached.lock().clone();
        if let Some(cached) = cached
            && cached.path == path
            && cached.modified == modified
        {
            debug_log::log("STATS", "HIT", &path.display().to_string());
            return Ok(cached.stats);
        }

        let inner = Arc::clone(&self.inner);
        let key = path.clone();
        let (flight, started) = self
            .inner
            .computations
            .run(key, move || inner.compute(path, modified));
        if !started {
            debug_log::log("STATS", "ATTACH", "joining in-flight computation");
        }
        flight.await
    }
}

impl Inner {
    /// `modified` is the mtime seen before the read. Keying on it means a write
    /// racing this computation costs at most one extra recompute later.
    async fn compute(self: Arc<Self>, path: PathBuf, modified: SystemTime) -> StoreResult<Stats> {
        let _timer = TimedOp::start("STATS", "compute", path.display().to_string());
        let mut raw = self
            .fs
            .read(&path)
            .await
            .map_err(|e| StoreError::storage(&path, e))?;
        let records = super::parse_records(&path, &mut raw)?;
        let stats = compute_stats(&records, &self.average_field);

        *self.cached.lock() = Some(CachedStats {
            stats,
            path,
            modified,
        });
        Ok(stats)
    }
}

/// Count records and average `field` across all of them.
///
/// Missing or non-numeric values count as zero; an empty list yields exactly zero.
pub fn compute_stats(records: &[Item], field: &str) -> Stats {
    let total = records.len();
    if total == 0 {
        return Stats::EMPTY;
    }
    let sum: f64 = records
        .iter()
        .map(|record| record.get(field).map(numeric_value).unwrap_or(0.0))
        .sum();
    Stats {
        total,
        average: sum / total as f64,
    }
}

fn numeric_value(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Value) -> Vec<Item> {
        values
            .as_array()
            .expect("array")
            .iter()
            .cloned()
            .map(|v| Item::from_value(v).expect("object"))
            .collect()
    }

    #[test]
    fn empty_collection_is_all_zero() {
        assert_eq!(compute_stats(&[], "price"), Stats::EMPTY);
    }

    #[test]
    fn averages_numeric_field() {
        let items = records(json!([
            {"id": 1, "name": "A", "price": 10},
            {"id": 2, "name": "B", "price": 20}
        ]));
        assert_eq!(
            compute_stats(&items, "price"),
            Stats {
                total: 2,
                average: 15.0
            }
        );
    }

    #[test]
    fn non_numeric_values_count_as_zero() {
        let items = records(json!([
            {"id": 1, "name": "A", "price": 30},
            {"id": 2, "name": "B"},
            {"id": 3, "name": "C", "price": "n/a"},
            {"id": 4, "name": "D", "price": null},
            {"id": 5, "name": "E", "price": true},
            {"id": 6, "name": "F", "price": " 6 "}
        ]));
        let stats = compute_stats(&items, "price");
        assert_eq!(stats.total, 6);
        assert!((stats.average - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn field_is_configurable() {
        let items = records(json!([
            {"id": 1, "name": "A", "weight": 2.5},
            {"id": 2, "name": "B", "weight": 7.5}
        ]));
        assert_eq!(compute_stats(&items, "weight").average, 5.0);
        assert_eq!(compute_stats(&items, "price").average, 0.0);
    }
}
