//! Purpose: JSON envelope for `contactbench info`.
//! Exports: `store_info_json`.
//! Invariants: Stable key names for store info payloads; additive-only.

use contactbench::api::StoreInfo;
use serde_json::{Map, Value, json};

pub(crate) fn store_info_json(store_ref: &str, info: &StoreInfo) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(store_ref));
    map.insert("path".to_string(), json!(info.path.display().to_string()));
    map.insert("schema_version".to_string(), json!(info.schema_version));
    map.insert("table".to_string(), json!(info.table));
    map.insert("indexes".to_string(), json!(info.indexes));
    map.insert("record_count".to_string(), json!(info.record_count));
    map.insert("log_bytes".to_string(), json!(info.log_bytes));
    Value::Object(map)
}
