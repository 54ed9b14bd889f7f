use crate::id::StoreKey;
use std::fmt;

/// A value pointing at another record by id.
///
/// The referenced record may not exist in the store (a *dangling* reference) — readers treat
/// that as a missing field, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub key: StoreKey,
    pub typename: Option<String>,
    /// Set when this id was synthesized by the writer for an embedded object that had no
    /// identifier of its own.
    pub generated: bool,
}

impl Reference {
    pub fn new(key: StoreKey) -> Self {
        Reference {
            key,
            typename: None,
            generated: false,
        }
    }

    pub fn generated(key: StoreKey, typename: Option<String>) -> Self {
        Reference {
            key,
            typename,
            generated: true,
        }
    }
}

/// The value stored in a single field slot of a [`StoreRecord`](crate::record::StoreRecord).
///
/// This is the *normalized* representation — nested objects never appear here directly, only
/// [`Reference`]s to the record that holds them. Compare with
/// [`crate::reader::ResultValue`], which is the *denormalized* tree handed back to callers.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreValue {
    Null,
    /// A plain scalar (string, number, bool, enum value).
    Scalar(serde_json::Value),
    /// A value tagged as an opaque JSON blob: the writer does not attempt to normalize objects
    /// found inside it even if they carry an id, and the reader passes it through untouched
    /// when the query does not select sub-fields on it.
    Json(serde_json::Value),
    Reference(Reference),
    List(Vec<StoreValue>),
}

impl StoreValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StoreValue::Null)
    }
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Null => f.write_str("null"),
            StoreValue::Scalar(v) | StoreValue::Json(v) => write!(f, "{v}"),
            StoreValue::Reference(r) => write!(f, "-> {}", r.key),
            StoreValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}
