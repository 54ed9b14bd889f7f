//! The query writer: normalizes a GraphQL result tree into flat store entries.

use crate::ast::{self, Document, FragmentDefinition, Selection, SelectionSet};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, EventListener};
use crate::fragment_matcher::{FragmentMatcher, MatchResult};
use crate::id::StoreKey;
use crate::record::{StoreFieldKey, StoreRecord};
use crate::store::Store;
use crate::value::{Reference, StoreValue};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

pub struct Writer<'a> {
    store: &'a dyn Store,
    config: &'a CacheConfig,
    listener: Option<&'a dyn EventListener>,
}

impl<'a> Writer<'a> {
    pub fn new(store: &'a dyn Store, config: &'a CacheConfig, listener: Option<&'a dyn EventListener>) -> Self {
        Writer { store, config, listener }
    }

    /// Normalizes `result` against `document` and merges it into the store under `root_id`. On
    /// success, every touched record has been written through [`Store::set`], so dependent reads
    /// and watches are dirtied as a side effect.
    pub fn write(&self, document: &Document, variables: &serde_json::Value, root_id: &StoreKey, result: &serde_json::Value) -> Result<()> {
        let root_set = ast::root_selection_set(document)?;
        let fragments = ast::fragment_definitions(document);
        let mut pending: IndexMap<StoreKey, StoreRecord> = IndexMap::new();
        let mut expanding = HashSet::new();

        self.write_selection_set(root_set, result, root_id, variables, &fragments, &mut pending, &mut expanding, true, root_id.as_str())
            .map_err(|e| Error::write(e.to_string(), format!("{document:?}")))?;

        for (key, record) in pending {
            self.store.set(key, record);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_selection_set(
        &self,
        set: &SelectionSet,
        result: &serde_json::Value,
        key: &StoreKey,
        variables: &serde_json::Value,
        fragments: &HashMap<&str, &FragmentDefinition>,
        pending: &mut IndexMap<StoreKey, StoreRecord>,
        expanding: &mut HashSet<String>,
        is_root: bool,
        path: &str,
    ) -> Result<()> {
        if !pending.contains_key(key) {
            let mut record = self
                .store
                .get_raw(key)
                .map(|r| r.as_ref().clone())
                .unwrap_or_else(|| StoreRecord::new(None));
            if let Some(typename) = ast::typename_of(result) {
                record.typename = Some(typename.to_string());
            }
            pending.insert(key.clone(), record);
        } else if let Some(typename) = ast::typename_of(result) {
            pending.get_mut(key).unwrap().typename = Some(typename.to_string());
        }

        for item in &set.items {
            match item {
                Selection::Field(field) => {
                    if ast::is_excluded(&field.directives, variables) {
                        continue;
                    }
                    let response_key = ast::response_key(field);
                    let store_field_key = ast::store_field_key(field, variables);
                    let field_path = format!("{path}.{response_key}");
                    match result.get(response_key) {
                        None => {
                            crate::event::report(
                                self.listener,
                                Event::new(EventKind::WriterMissingField { path: field_path }),
                            );
                        }
                        Some(value) => {
                            let normalized = self.normalize_value(
                                value,
                                &field.selection_set,
                                key,
                                &store_field_key,
                                variables,
                                fragments,
                                pending,
                                expanding,
                                &field_path,
                            )?;
                            pending.get_mut(key).unwrap().set(store_field_key, normalized);
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let fragment = fragments
                        .get(name)
                        .ok_or_else(|| Error::write(format!("unknown fragment `{name}`"), String::new()))?;
                    if !expanding.insert(name.to_string()) {
                        return Err(Error::circular_query_key());
                    }
                    let type_condition = ast::type_condition_name(&fragment.type_condition);
                    let outcome = self.resolve_fragment_match(type_condition, result, is_root);
                    if !matches!(outcome, MatchResult::NoMatch) {
                        self.write_selection_set(
                            &fragment.selection_set,
                            result,
                            key,
                            variables,
                            fragments,
                            pending,
                            expanding,
                            false,
                            path,
                        )?;
                    }
                    expanding.remove(name);
                }
                Selection::InlineFragment(inline) => {
                    let matched = match &inline.type_condition {
                        None => true,
                        Some(condition) => {
                            let type_condition = ast::type_condition_name(condition);
                            !matches!(self.resolve_fragment_match(type_condition, result, is_root), MatchResult::NoMatch)
                        }
                    };
                    if matched {
                        self.write_selection_set(
                            &inline.selection_set,
                            result,
                            key,
                            variables,
                            fragments,
                            pending,
                            expanding,
                            false,
                            path,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_fragment_match(&self, type_condition: &str, result: &serde_json::Value, is_root: bool) -> MatchResult {
        if is_root {
            return MatchResult::Match;
        }
        self.config.fragment_matcher.matches(type_condition, ast::typename_of(result))
    }

    #[allow(clippy::too_many_arguments)]
    fn normalize_value(
        &self,
        value: &serde_json::Value,
        selection_set: &SelectionSet,
        parent_key: &StoreKey,
        field_key: &StoreFieldKey,
        variables: &serde_json::Value,
        fragments: &HashMap<&str, &FragmentDefinition>,
        pending: &mut IndexMap<StoreKey, StoreRecord>,
        expanding: &mut HashSet<String>,
        path: &str,
    ) -> Result<StoreValue> {
        if selection_set.items.is_empty() {
            return Ok(match value {
                serde_json::Value::Null => StoreValue::Null,
                serde_json::Value::Array(items) => StoreValue::List(items.iter().map(|v| match v {
                    serde_json::Value::Null => StoreValue::Null,
                    other => StoreValue::Json(other.clone()),
                }).collect()),
                other => StoreValue::Json(other.clone()),
            });
        }

        match value {
            serde_json::Value::Null => Ok(StoreValue::Null),
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}.{index}");
                    out.push(self.normalize_object_or_recurse(
                        item, selection_set, parent_key, field_key, index, variables, fragments, pending, expanding, &item_path,
                    )?);
                }
                Ok(StoreValue::List(out))
            }
            serde_json::Value::Object(_) => self.normalize_object_or_recurse(
                value, selection_set, parent_key, field_key, 0, variables, fragments, pending, expanding, path,
            ),
            other => Ok(StoreValue::Scalar(other.clone())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn normalize_object_or_recurse(
        &self,
        value: &serde_json::Value,
        selection_set: &SelectionSet,
        parent_key: &StoreKey,
        field_key: &StoreFieldKey,
        index: usize,
        variables: &serde_json::Value,
        fragments: &HashMap<&str, &FragmentDefinition>,
        pending: &mut IndexMap<StoreKey, StoreRecord>,
        expanding: &mut HashSet<String>,
        path: &str,
    ) -> Result<StoreValue> {
        if !value.is_object() {
            return Ok(StoreValue::Scalar(value.clone()));
        }

        let typename = ast::typename_of(value).map(|s| s.to_string());
        let id = (self.config.id_of)(value);

        let previous_ref = self
            .store
            .get_raw(parent_key)
            .and_then(|r| r.get(field_key).cloned())
            .and_then(|v| match v {
                StoreValue::Reference(r) => Some(r),
                StoreValue::List(items) => items.into_iter().nth(index).and_then(|v| match v {
                    StoreValue::Reference(r) => Some(r),
                    _ => None,
                }),
                _ => None,
            });

        let target_key = match &id {
            Some(id) => StoreKey::from(id.clone()),
            None => {
                if let Some(prev) = &previous_ref {
                    if !prev.generated {
                        return Err(Error::id_downgrade(prev.key.to_string()));
                    }
                }
                StoreKey::from(format!("${}.{}.{}", parent_key.as_str(), field_key.as_str(), index))
            }
        };

        if !pending.contains_key(&target_key) {
            let mut record = self
                .store
                .get_raw(&target_key)
                .map(|r| r.as_ref().clone())
                .unwrap_or_else(|| StoreRecord::new(typename.clone()));
            if id.is_some() {
                if let Some(prev) = &previous_ref {
                    if prev.generated && prev.key != target_key {
                        if let Some(stale) = self.store.get_raw(&prev.key) {
                            record.merge_from(&stale);
                        }
                    }
                }
            }
            pending.insert(target_key.clone(), record);
        }

        self.write_selection_set(selection_set, value, &target_key, variables, fragments, pending, expanding, false, path)?;

        Ok(StoreValue::Reference(match id {
            Some(_) => Reference { key: target_key, typename, generated: false },
            None => Reference::generated(target_key, typename),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::id::root_query_key;
    use crate::store::RootStore;
    use graphql_parser::parse_query;

    fn doc(text: &str) -> Document {
        parse_query::<String>(text).unwrap().into_static()
    }

    #[test]
    fn s1_normalize_and_denormalize_writes_expected_store_shape() {
        let store = RootStore::new();
        let config = CacheConfig::default();
        let writer = Writer::new(&store, &config, None);
        let document = doc("{ author { id __typename name } }");
        let result = serde_json::json!({"author": {"id": "1", "__typename": "A", "name": "X"}});
        writer.write(&document, &serde_json::json!({}), &root_query_key(), &result).unwrap();

        let root = store.get_raw(&root_query_key()).unwrap();
        match root.get(&StoreFieldKey::new("author".into())) {
            Some(StoreValue::Reference(r)) => assert_eq!(r.key.as_str(), "A:1"),
            other => panic!("expected reference, got {other:?}"),
        }
        let entity = store.get_raw(&StoreKey::from("A:1")).unwrap();
        assert_eq!(entity.get(&StoreFieldKey::new("name".into())), Some(&StoreValue::Scalar("X".into())));
    }

    #[test]
    fn s2_aliased_fields_with_args_store_separately() {
        let store = RootStore::new();
        let config = CacheConfig::default();
        let writer = Writer::new(&store, &config, None);
        let document = doc("{ a: f(x: 1) b: f(x: 2) }");
        let result = serde_json::json!({"a": 10, "b": 20});
        writer.write(&document, &serde_json::json!({}), &root_query_key(), &result).unwrap();

        let root = store.get_raw(&root_query_key()).unwrap();
        let a_key = crate::record::canonical_field_key("f", &serde_json::json!({"x": 1}));
        let b_key = crate::record::canonical_field_key("f", &serde_json::json!({"x": 2}));
        assert_eq!(root.get(&a_key), Some(&StoreValue::Scalar(10.into())));
        assert_eq!(root.get(&b_key), Some(&StoreValue::Scalar(20.into())));
    }

    #[test]
    fn writing_no_id_over_a_real_id_is_a_fatal_downgrade() {
        let store = RootStore::new();
        let config = CacheConfig::default();
        let writer = Writer::new(&store, &config, None);
        let document = doc("{ author { id __typename name } }");
        writer
            .write(
                &document,
                &serde_json::json!({}),
                &root_query_key(),
                &serde_json::json!({"author": {"id": "1", "__typename": "A", "name": "X"}}),
            )
            .unwrap();

        let result = writer.write(
            &document,
            &serde_json::json!({}),
            &root_query_key(),
            &serde_json::json!({"author": {"name": "Y"}}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_field_without_excluding_directive_only_warns() {
        let store = RootStore::new();
        let config = CacheConfig::default();
        let writer = Writer::new(&store, &config, None);
        let document = doc("{ author { id __typename name } }");
        let result = writer.write(
            &document,
            &serde_json::json!({}),
            &root_query_key(),
            &serde_json::json!({"author": {"id": "1", "__typename": "A"}}),
        );
        assert!(result.is_ok());
    }
}
