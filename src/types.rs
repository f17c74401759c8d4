use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An open-ended catalog record. Only `id` and `name` mean anything to us;
/// every other field is carried through untouched, in its original order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Returns `None` for anything that is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// An item as held by the cache: the record plus its lowercased name.
/// The lowercased copy is only used for search and never leaves the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem {
    item: Item,
    name_lower: String,
}

impl CachedItem {
    pub fn new(item: Item) -> Self {
        let name_lower = item.name().map(str::to_lowercase).unwrap_or_default();
        Self { item, name_lower }
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub fn name_lower(&self) -> &str {
        &self.name_lower
    }

    pub fn to_item(&self) -> Item {
        self.item.clone()
    }
}

/// Identifier used for single-item lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKey {
    Int(i64),
    Text(String),
}

impl ItemKey {
    /// Integers become numeric keys, anything else is matched as a string id.
    ///
    /// The whole (trimmed) input must be an integer: `"7abc"` is the string
    /// id `7abc` and does not find item 7. Generated ids are UUIDs that can
    /// start with digits, so a leading-digits parse would misroute them.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    /// Value equality against an id as stored: numeric for numbers, exact for strings.
    pub fn matches(&self, id: &Value) -> bool {
        match (self, id) {
            (Self::Int(n), Value::Number(num)) => match num.as_i64() {
                Some(v) => v == *n,
                None => num.as_f64() == Some(*n as f64),
            },
            (Self::Text(s), Value::String(v)) => s == v,
            _ => false,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One page of a list query. `total` counts every match, not just this page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Stats {
    /// Number of records in the backing file
    pub total: usize,
    /// Arithmetic mean of the averaged field; exactly 0 for an empty file
    pub average: f64,
}

impl Stats {
    pub const EMPTY: Stats = Stats {
        total: 0,
        average: 0.0,
    };
}
