//! Snapshotting: flattens the store to JSON and back.
//!
//! References serialize as `{"type":"id","id":"<key>","generated":bool,"typename":<string|null>}`;
//! everything else (scalars, nulls, lists, JSON blobs) serializes as plain JSON. `serde_json`
//! already backs the rest of the crate's JSON handling, so no extra dependency is needed for this.

use crate::error::{Error, Result};
use crate::id::StoreKey;
use crate::record::{StoreFieldKey, StoreRecord};
use crate::value::{Reference, StoreValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireReference {
    Id {
        id: String,
        generated: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        typename: Option<String>,
    },
}

fn value_to_wire(value: &StoreValue) -> serde_json::Value {
    match value {
        StoreValue::Null => serde_json::Value::Null,
        StoreValue::Scalar(v) | StoreValue::Json(v) => v.clone(),
        StoreValue::Reference(r) => serde_json::to_value(WireReference::Id {
            id: r.key.as_str().to_string(),
            generated: r.generated,
            typename: r.typename.clone(),
        })
        .expect("WireReference always serializes"),
        StoreValue::List(items) => serde_json::Value::Array(items.iter().map(value_to_wire).collect()),
    }
}

fn wire_to_value(json: &serde_json::Value) -> StoreValue {
    match json {
        serde_json::Value::Null => StoreValue::Null,
        serde_json::Value::Array(items) => StoreValue::List(items.iter().map(wire_to_value).collect()),
        serde_json::Value::Object(map) if map.get("type").and_then(|v| v.as_str()) == Some("id") => {
            match serde_json::from_value::<WireReference>(json.clone()) {
                Ok(WireReference::Id { id, generated, typename }) => StoreValue::Reference(Reference {
                    key: StoreKey::from(id),
                    typename,
                    generated,
                }),
                Err(_) => StoreValue::Json(json.clone()),
            }
        }
        other => StoreValue::Json(other.clone()),
    }
}

const TYPENAME_META: &str = "__typename";
const FIELDS_META: &str = "fields";

/// Flattens the store into the persisted wire shape.
///
/// Each record serializes as `{"__typename": <string|null>, "fields": {...}}` rather than
/// splicing `__typename` directly into the field map: a record's `typename` and a query-selected
/// `__typename` *field* are distinct pieces of data, and collapsing them into one JSON key would
/// make `restore` unable to tell whether an absent explicit field should come back at all,
/// breaking round-trip for records whose typename was never also queried as a field.
pub fn extract(mapping: &IndexMap<StoreKey, StoreRecord>) -> serde_json::Value {
    let mut root = serde_json::Map::new();
    for (key, record) in mapping {
        let mut fields = serde_json::Map::new();
        for (field_key, value) in &record.fields {
            fields.insert(field_key.as_str().to_string(), value_to_wire(value));
        }
        let mut entry = serde_json::Map::new();
        entry.insert(
            TYPENAME_META.to_string(),
            record.typename.clone().map(serde_json::Value::String).unwrap_or(serde_json::Value::Null),
        );
        entry.insert(FIELDS_META.to_string(), serde_json::Value::Object(fields));
        root.insert(key.as_str().to_string(), serde_json::Value::Object(entry));
    }
    serde_json::Value::Object(root)
}

/// Parses a previously-`extract`ed mapping back into store records.
pub fn restore(wire: &serde_json::Value) -> Result<IndexMap<StoreKey, StoreRecord>> {
    let root = wire
        .as_object()
        .ok_or_else(|| Error::write("restore input must be a JSON object".to_string(), wire.to_string()))?;
    let mut mapping = IndexMap::new();
    for (key, record_json) in root {
        let record_obj = record_json
            .as_object()
            .ok_or_else(|| Error::write(format!("record `{key}` must be a JSON object"), record_json.to_string()))?;
        let typename = record_obj.get(TYPENAME_META).and_then(|v| v.as_str()).map(|s| s.to_string());
        let record_fields = record_obj
            .get(FIELDS_META)
            .and_then(|v| v.as_object())
            .ok_or_else(|| Error::write(format!("record `{key}` is missing its `fields` map"), record_json.to_string()))?;
        let mut record = StoreRecord::new(typename);
        for (field_name, value) in record_fields {
            record.set(StoreFieldKey::new(field_name.clone()), wire_to_value(value));
        }
        mapping.insert(StoreKey::from(key.clone()), record);
    }
    Ok(mapping)
}
