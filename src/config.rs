//! Cache configuration, built with a small `with_*` builder.

use crate::fragment_matcher::{FragmentMatcher, Heuristic};
use crate::id::StoreKey;
use crate::value::StoreValue;
use std::collections::HashMap;
use std::rc::Rc;

/// A custom field resolver consulted when a requested field is absent from its record, keyed on
/// typename + field name. Receives the field's resolved arguments and a `get_cache_key` helper
/// so a resolver can redirect to an existing entity by constructing a [`StoreKey`] from a plain
/// JSON shape.
pub type CacheRedirectResolver =
    Rc<dyn Fn(&serde_json::Value, &dyn Fn(&serde_json::Value) -> Option<StoreKey>) -> Option<StoreValue>>;

/// `typename -> fieldName -> resolver`.
pub type CacheRedirects = HashMap<String, HashMap<String, CacheRedirectResolver>>;

/// The function used to derive a record's store id from a result object.
pub type IdOf = Rc<dyn Fn(&serde_json::Value) -> Option<String>>;

/// Cache-wide configuration, with sensible defaults.
#[derive(Clone)]
pub struct CacheConfig {
    pub(crate) id_of: IdOf,
    pub(crate) add_typename: bool,
    pub(crate) fragment_matcher: Rc<dyn FragmentMatcher>,
    pub(crate) cache_redirects: CacheRedirects,
    pub(crate) result_caching: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            id_of: Rc::new(crate::id_fn::default_id_of),
            add_typename: false,
            fragment_matcher: Rc::new(Heuristic),
            cache_redirects: HashMap::new(),
            result_caching: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_of(mut self, id_of: impl Fn(&serde_json::Value) -> Option<String> + 'static) -> Self {
        self.id_of = Rc::new(id_of);
        self
    }

    pub fn with_add_typename(mut self, add_typename: bool) -> Self {
        self.add_typename = add_typename;
        self
    }

    pub fn with_fragment_matcher(mut self, matcher: impl FragmentMatcher + 'static) -> Self {
        self.fragment_matcher = Rc::new(matcher);
        self
    }

    pub fn with_cache_redirects(mut self, redirects: CacheRedirects) -> Self {
        self.cache_redirects = redirects;
        self
    }

    pub fn with_result_caching(mut self, enabled: bool) -> Self {
        self.result_caching = enabled;
        self
    }

    pub(crate) fn redirect_for(&self, typename: &str, field_name: &str) -> Option<&CacheRedirectResolver> {
        self.cache_redirects.get(typename)?.get(field_name)
    }
}
