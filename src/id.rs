use std::fmt;
use std::rc::Rc;

/// A globally-unique identifier for a [`StoreRecord`](crate::record::StoreRecord) within a
/// single store instance.
///
/// Cloning is a cheap `Rc` bump; equality and hashing compare the underlying string, not the
/// `Rc` pointer, so two `StoreKey`s built from the same text are always equal regardless of
/// where they were constructed.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct StoreKey(Rc<str>);

impl StoreKey {
    pub fn new(s: impl Into<Rc<str>>) -> Self {
        StoreKey(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({:?})", self.0)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreKey {
    fn from(s: &str) -> Self {
        StoreKey(Rc::from(s))
    }
}

impl From<String> for StoreKey {
    fn from(s: String) -> Self {
        StoreKey(Rc::from(s.into_boxed_str()))
    }
}

/// Reserved root keys.
pub const ROOT_QUERY: &str = "ROOT_QUERY";
pub const ROOT_MUTATION: &str = "ROOT_MUTATION";
pub const ROOT_SUBSCRIPTION: &str = "ROOT_SUBSCRIPTION";

pub fn root_query_key() -> StoreKey {
    StoreKey::from(ROOT_QUERY)
}

pub fn root_mutation_key() -> StoreKey {
    StoreKey::from(ROOT_MUTATION)
}

pub fn root_subscription_key() -> StoreKey {
    StoreKey::from(ROOT_SUBSCRIPTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_text_is_equal_regardless_of_origin() {
        let a = StoreKey::from("A:1");
        let b = StoreKey::new(String::from("A:1"));
        assert_eq!(a, b);
    }

    #[test]
    fn reserved_keys_have_stable_text() {
        assert_eq!(root_query_key().as_str(), ROOT_QUERY);
        assert_eq!(root_mutation_key().as_str(), ROOT_MUTATION);
        assert_eq!(root_subscription_key().as_str(), ROOT_SUBSCRIPTION);
    }
}
