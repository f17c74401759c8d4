use schemars::JsonSchema;
use schemars::transform::RecursiveTransform;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{ItemKey, Page, Stats};

/// Strips non-standard numeric `format` annotations from JSON Schemas.
///
/// The `schemars` crate emits format values like `"uint64"`, `"int64"`, and `"double"` for Rust
/// numeric types. These are not defined by the JSON Schema specification and cause noisy warnings
/// in strict validators such as `ajv`, which several MCP clients use.
fn strip_non_standard_format(schema: &mut schemars::Schema) {
    let dominated = schema
        .get("format")
        .and_then(|v| v.as_str())
        .is_some_and(|f| {
            matches!(
                f,
                "uint8"
                    | "int8"
                    | "uint16"
                    | "int16"
                    | "uint32"
                    | "int32"
                    | "uint64"
                    | "int64"
                    | "uint"
                    | "int"
                    | "float"
                    | "double"
            )
        });
    if dominated {
        schema.remove("format");
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct ListItemsRequest {
    /// Case-insensitive substring matched against item names. If omitted, matches all items.
    #[serde(default)]
    pub q: Option<String>,

    /// Number of matching items to skip. Negative values are ignored.
    #[serde(default)]
    pub offset: Option<i64>,

    /// Maximum number of items to return. Negative values are ignored; omit for all.
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Item identifier as a number (e.g. 7) or a string (e.g. a generated UUID).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub enum ItemIdParam {
    Number(i64),
    Text(String),
}

impl From<ItemIdParam> for ItemKey {
    fn from(param: ItemIdParam) -> Self {
        match param {
            ItemIdParam::Number(n) => ItemKey::Int(n),
            ItemIdParam::Text(s) => ItemKey::parse(&s),
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct GetItemRequest {
    /// Identifier of the item to fetch
    pub id: ItemIdParam,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateItemRequest {
    /// Display name of the new item. Must not be blank.
    pub name: String,

    /// Extra fields stored with the item, e.g. {"price": 12.5}. An "id" here replaces the generated one.
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
}

impl CreateItemRequest {
    pub fn into_payload(self) -> Map<String, Value> {
        let mut payload = self.fields.unwrap_or_default();
        payload.insert("name".to_string(), Value::String(self.name));
        payload
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetStatsRequest {}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct ItemListResponse {
    pub items: Vec<Value>,
    /// Number of matching items before pagination
    pub total: u64,
}

impl From<Page> for ItemListResponse {
    fn from(page: Page) -> Self {
        Self {
            total: page.total as u64,
            items: page.items.into_iter().map(|i| i.into_value()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ItemResponse {
    pub item: Value,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[schemars(transform = RecursiveTransform(strip_non_standard_format))]
pub struct StatsResponse {
    pub total: u64,
    pub average: f64,
}

impl From<Stats> for StatsResponse {
    fn from(stats: Stats) -> Self {
        Self {
            total: stats.total as u64,
            average: stats.average,
        }
    }
}
