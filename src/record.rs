use crate::value::StoreValue;
use indexmap::IndexMap;
use std::fmt;

/// A field name plus the canonical serialization of its arguments.
///
/// Two fields with the same name and argument *values* (regardless of the textual order they
/// were written in, or which variable names supplied them) produce byte-identical keys.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct StoreFieldKey(String);

impl StoreFieldKey {
    pub fn new(s: String) -> Self {
        StoreFieldKey(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreFieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreFieldKey({:?})", self.0)
    }
}

impl fmt::Display for StoreFieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the canonical `name(args)` key for a field slot.
///
/// `args` must already have variables substituted and be in an order-independent form — callers
/// pass a `serde_json::Value::Object` built from the field's arguments; this function sorts keys
/// recursively before serializing so argument order in the source document never affects the
/// resulting key: two calls with equivalent args yield byte-identical keys.
pub fn canonical_field_key(name: &str, args: &serde_json::Value) -> StoreFieldKey {
    if is_empty_args(args) {
        return StoreFieldKey(name.to_string());
    }
    let canonical = canonicalize_json(args);
    StoreFieldKey(format!("{name}({canonical})"))
}

fn is_empty_args(args: &serde_json::Value) -> bool {
    matches!(args, serde_json::Value::Object(map) if map.is_empty())
}

/// Recursively sorts object keys so that structurally-equal values serialize identically
/// regardless of insertion order.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    fn write(value: &serde_json::Value, out: &mut String) {
        match value {
            serde_json::Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(k).unwrap());
                    out.push(':');
                    write(&map[*k], out);
                }
                out.push('}');
            }
            serde_json::Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    let mut out = String::new();
    write(value, &mut out);
    out
}

/// A single entity's normalized fields.
///
/// Field ordering is not semantically meaningful (`IndexMap`'s equality ignores it); it is kept
/// only so [`crate::cache::Cache::extract`] produces deterministic, diff-friendly output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreRecord {
    pub fields: IndexMap<StoreFieldKey, StoreValue>,
    pub typename: Option<String>,
}

impl StoreRecord {
    pub fn new(typename: Option<String>) -> Self {
        StoreRecord {
            fields: IndexMap::new(),
            typename,
        }
    }

    pub fn get(&self, key: &StoreFieldKey) -> Option<&StoreValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: StoreFieldKey, value: StoreValue) {
        self.fields.insert(key, value);
    }

    /// Deep-merges `incoming` into `self`: on key collision, recurse into matching `Json`/nested
    /// structures is not attempted (store values are already normalized scalars/refs/lists); on
    /// typename conflict the incoming value wins; lists never merge element-wise, the incoming
    /// list fully replaces the existing one.
    pub fn merge_from(&mut self, incoming: &StoreRecord) {
        if incoming.typename.is_some() {
            self.typename = incoming.typename.clone();
        }
        for (key, value) in &incoming.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }
}
