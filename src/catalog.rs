use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::cache::{ItemCache, StatsCache};
use crate::config::Config;
use crate::data_path::DataPath;
use crate::error::StoreResult;
use crate::query::ListQuery;
use crate::storage::{StoreFs, TokioFs};
use crate::types::{Item, ItemKey, Page, Stats};

/// Everything the outer surfaces (CLI, MCP) need, built once at startup.
#[derive(Clone)]
pub struct Catalog {
    items: ItemCache,
    stats: StatsCache,
}

impl Catalog {
    pub fn new(data_path: DataPath, average_field: &str, fs: Arc<dyn StoreFs>) -> Self {
        Self {
            items: ItemCache::new(data_path.clone(), Arc::clone(&fs)),
            stats: StatsCache::new(data_path, average_field, fs),
        }
    }

    /// `data_file` pins the backing file, bypassing environment and config resolution.
    pub fn from_config(config: &Config, data_file: Option<PathBuf>) -> Self {
        let data_path = match data_file {
            Some(path) => DataPath::Fixed(path),
            None => DataPath::from_config(config.store.data_path.as_deref()),
        };
        Self::new(data_path, &config.stats.average_field, Arc::new(TokioFs))
    }

    pub async fn list(&self, query: &ListQuery) -> StoreResult<Page> {
        self.items.query(query).await
    }

    pub async fn get(&self, key: &ItemKey) -> StoreResult<Item> {
        self.items.find(key).await
    }

    pub async fn create(&self, payload: Map<String, Value>) -> StoreResult<Item> {
        self.items.append(payload).await
    }

    pub async fn stats(&self) -> StoreResult<Stats> {
        self.stats.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use serde_json::json;

    fn catalog_over(items: Value) -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.json");
        std::fs::write(&path, serde_json::to_string_pretty(&items).unwrap()).unwrap();
        let catalog = Catalog::new(DataPath::Fixed(path), "price", Arc::new(TokioFs));
        (dir, catalog)
    }

    #[tokio::test]
    async fn create_then_list_get_and_stats() {
        let (_dir, catalog) = catalog_over(json!([{"id": 1, "name": "A", "price": 10}]));

        let mut payload = Map::new();
        payload.insert("name".into(), json!("B"));
        payload.insert("price".into(), json!(30));
        let created = catalog.create(payload).await.expect("create");

        let page = catalog.list(&ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);

        let id = created.id().and_then(Value::as_str).unwrap().to_string();
        let fetched = catalog.get(&ItemKey::parse(&id)).await.expect("get by uuid");
        assert_eq!(fetched, created);

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.average, 20.0);
    }

    #[tokio::test]
    async fn errors_keep_their_kind() {
        let (_dir, catalog) = catalog_over(json!([]));

        let err = catalog.create(Map::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = catalog.get(&ItemKey::Int(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
