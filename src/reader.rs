//! The query reader / diff engine.

use crate::ast::{self, Document, FragmentDefinition, Selection, SelectionSet};
use crate::config::CacheConfig;
use crate::dependency::{DependencyTag, DependencyTracker};
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, EventListener};
use crate::fragment_matcher::MatchResult;
use crate::id::StoreKey;
use crate::key_index::{CanonicalKey, KeyIndex, KeyPart};
use crate::memo::MemoCache;
use crate::record::StoreRecord;
use crate::store::Store;
use crate::value::StoreValue;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// The denormalized tree handed back to callers. Distinct from
/// [`crate::value::StoreValue`] (the normalized, reference-based representation actually kept in
/// the store): here nested objects and lists are `Rc`-wrapped so that
/// [`ResultValue`]'s `PartialEq` can implement a "referentially equal" comparison (JS `===` on
/// objects/arrays, value equality on scalars) using `Rc::ptr_eq`.
#[derive(Clone, Debug)]
pub enum ResultValue {
    Null,
    Scalar(serde_json::Value),
    Object(Rc<ResultObject>),
    List(Rc<Vec<ResultValue>>),
}

#[derive(Debug, PartialEq)]
pub struct ResultObject {
    pub typename: Option<String>,
    pub fields: IndexMap<String, ResultValue>,
}

impl PartialEq for ResultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResultValue::Null, ResultValue::Null) => true,
            (ResultValue::Scalar(a), ResultValue::Scalar(b)) => a == b,
            (ResultValue::Object(a), ResultValue::Object(b)) => Rc::ptr_eq(a, b),
            (ResultValue::List(a), ResultValue::List(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl ResultValue {
    /// Converts this tree into plain JSON, losing the `Rc` identity information. Used at the
    /// public API boundary, where callers only care about values.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ResultValue::Null => serde_json::Value::Null,
            ResultValue::Scalar(v) => v.clone(),
            ResultValue::Object(obj) => {
                let mut map = serde_json::Map::new();
                for (key, value) in &obj.fields {
                    map.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(map)
            }
            ResultValue::List(items) => serde_json::Value::Array(items.iter().map(ResultValue::to_json).collect()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissingFieldReport {
    pub path: String,
    /// Set when the gap was found underneath a `Heuristic` fragment match: a heuristic outcome
    /// marks any missing fields encountered inside as tolerable.
    pub tolerable: bool,
}

#[derive(Clone, Debug)]
pub struct DiffResult {
    pub result: Option<ResultValue>,
    pub complete: bool,
    pub missing: Vec<MissingFieldReport>,
}

impl fmt::Display for MissingFieldReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (tolerable: {})", self.path, self.tolerable)
    }
}

/// Memoization state for reads against one [`Store`] view. `Cache` owns one `ReadMemo` per
/// distinct tracker it reads against (root store, optimistic stack), since a [`MemoCache`] is
/// tied to a single [`DependencyTracker`] at construction.
pub struct ReadMemo {
    key_index: KeyIndex,
    cache: MemoCache<CanonicalKey, ResultValue>,
}

impl ReadMemo {
    pub fn new(tracker: Rc<DependencyTracker>) -> Self {
        ReadMemo {
            key_index: KeyIndex::new(),
            cache: MemoCache::new(tracker),
        }
    }
}

pub struct Reader<'a> {
    store: &'a dyn Store,
    config: &'a CacheConfig,
    memo: Option<&'a ReadMemo>,
    listener: Option<&'a dyn EventListener>,
}

impl<'a> Reader<'a> {
    pub fn new(store: &'a dyn Store, config: &'a CacheConfig, memo: Option<&'a ReadMemo>) -> Self {
        Reader { store, config, memo, listener: None }
    }

    /// Attaches an [`EventListener`] so tolerable missing-field gaps encountered during this read
    /// are reported the same way the writer reports its own warnings: via a pluggable reporter.
    pub fn with_listener(mut self, listener: Option<&'a dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    fn report_missing(&self, path: &str, tolerable: bool) {
        if tolerable {
            crate::event::report(
                self.listener,
                Event::new(EventKind::TolerableMissingField { path: path.to_string() }),
            );
        }
    }

    /// The reader's public entry. `previous_result`, when supplied, both drives referential
    /// equality recovery and suppresses memoization for this call.
    pub fn diff(
        &self,
        document: &Document,
        variables: &serde_json::Value,
        root_id: &StoreKey,
        previous_result: Option<&ResultValue>,
        return_partial_data: bool,
    ) -> Result<DiffResult> {
        if self.store.get(root_id).is_none() {
            return Ok(DiffResult { result: None, complete: false, missing: Vec::new() });
        }

        let root_set = ast::root_selection_set(document)?;
        let fragments = ast::fragment_definitions(document);
        let missing = RefCell::new(Vec::new());
        let errors: RefCell<Vec<Error>> = RefCell::new(Vec::new());
        let mut expanding = HashSet::new();

        let use_memo = self.memo.is_some() && previous_result.is_none() && self.config.result_caching;

        let result = self.read_object(
            root_set,
            root_id,
            variables,
            &fragments,
            previous_result,
            &missing,
            &errors,
            true,
            root_id.as_str(),
            &mut expanding,
            false,
            use_memo,
        );

        if let Some(error) = errors.into_inner().into_iter().next() {
            return Err(error);
        }

        let missing = missing.into_inner();
        let complete = missing.is_empty();
        if !return_partial_data {
            if let Some(report) = missing.iter().find(|r| !r.tolerable) {
                return Err(Error::missing_field(report.path.clone()));
            }
        }
        Ok(DiffResult { result: Some(result), complete, missing })
    }

    #[allow(clippy::too_many_arguments)]
    fn read_object(
        &self,
        set: &SelectionSet,
        key: &StoreKey,
        variables: &serde_json::Value,
        fragments: &HashMap<&str, &FragmentDefinition>,
        previous: Option<&ResultValue>,
        missing: &RefCell<Vec<MissingFieldReport>>,
        errors: &RefCell<Vec<Error>>,
        is_root: bool,
        path: &str,
        expanding: &mut HashSet<String>,
        tolerable: bool,
        use_memo: bool,
    ) -> ResultValue {
        if use_memo {
            if let Some(memo) = self.memo {
                let canonical = memo.key_index.intern([
                    KeyPart::Ptr(set as *const SelectionSet as usize),
                    KeyPart::Ptr(Rc::as_ptr(&self.config.fragment_matcher) as *const () as usize),
                    KeyPart::Value(variables.clone()),
                    KeyPart::Value(serde_json::Value::String(key.as_str().to_string())),
                ]);
                return memo.cache.get_or_compute(Some(canonical), || {
                    self.build_object(set, key, variables, fragments, None, missing, errors, is_root, path, expanding, tolerable)
                });
            }
        }
        self.build_object(set, key, variables, fragments, previous, missing, errors, is_root, path, expanding, tolerable)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_object(
        &self,
        set: &SelectionSet,
        key: &StoreKey,
        variables: &serde_json::Value,
        fragments: &HashMap<&str, &FragmentDefinition>,
        previous: Option<&ResultValue>,
        missing: &RefCell<Vec<MissingFieldReport>>,
        errors: &RefCell<Vec<Error>>,
        is_root: bool,
        path: &str,
        expanding: &mut HashSet<String>,
        tolerable: bool,
    ) -> ResultValue {
        let Some(record) = self.store.get(key) else {
            self.report_missing(path, tolerable);
            missing.borrow_mut().push(MissingFieldReport { path: path.to_string(), tolerable });
            return ResultValue::Null;
        };

        let previous_object = match previous {
            Some(ResultValue::Object(obj)) => Some(Rc::clone(obj)),
            _ => None,
        };
        let previous_fields = previous_object.as_ref().map(|o| &o.fields);

        let mut fields = IndexMap::new();
        self.read_into_fields(
            set, &record, key, variables, fragments, previous_fields, missing, errors, is_root, path, expanding, tolerable, &mut fields,
        );

        if let Some(previous_object) = &previous_object {
            if previous_object.typename == record.typename
                && previous_object.fields.len() == fields.len()
                && previous_object.fields.iter().zip(fields.iter()).all(|((pk, pv), (k, v))| pk == k && pv == v)
            {
                return ResultValue::Object(Rc::clone(previous_object));
            }
        }

        ResultValue::Object(Rc::new(ResultObject { typename: record.typename.clone(), fields }))
    }

    #[allow(clippy::too_many_arguments)]
    fn read_into_fields(
        &self,
        set: &SelectionSet,
        record: &StoreRecord,
        key: &StoreKey,
        variables: &serde_json::Value,
        fragments: &HashMap<&str, &FragmentDefinition>,
        previous_fields: Option<&IndexMap<String, ResultValue>>,
        missing: &RefCell<Vec<MissingFieldReport>>,
        errors: &RefCell<Vec<Error>>,
        is_root: bool,
        path: &str,
        expanding: &mut HashSet<String>,
        tolerable: bool,
        fields: &mut IndexMap<String, ResultValue>,
    ) {
        for item in &set.items {
            match item {
                Selection::Field(field) => {
                    if ast::is_excluded(&field.directives, variables) {
                        continue;
                    }
                    let response_key = ast::response_key(field);
                    let field_path = format!("{path}.{response_key}");
                    let store_field_key = ast::store_field_key(field, variables);
                    self.store.tracker().record(DependencyTag::Field(key.clone(), store_field_key.clone()));
                    let stored = record.get(&store_field_key).cloned().or_else(|| {
                        self.resolve_redirect(record.typename.as_deref(), field, variables, &field_path)
                    });

                    let Some(stored) = stored else {
                        self.report_missing(&field_path, tolerable);
                        missing.borrow_mut().push(MissingFieldReport { path: field_path, tolerable });
                        continue;
                    };

                    let previous_value = previous_fields.and_then(|m| m.get(response_key));
                    let value = self.read_value(
                        &stored, &field.selection_set, variables, fragments, previous_value, missing, errors, &field_path, expanding, tolerable,
                    );
                    fields.insert(response_key.to_string(), value);
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let Some(fragment) = fragments.get(name) else {
                        errors.borrow_mut().push(Error::no_fragment_name());
                        continue;
                    };
                    if !expanding.insert(name.to_string()) {
                        errors.borrow_mut().push(Error::circular_query_key());
                        continue;
                    }
                    let type_condition = ast::type_condition_name(&fragment.type_condition);
                    let outcome = self.resolve_fragment_match(type_condition, record.typename.as_deref(), is_root);
                    if !matches!(outcome, MatchResult::NoMatch) {
                        let nested_tolerable = tolerable || matches!(outcome, MatchResult::Heuristic);
                        self.read_into_fields(
                            &fragment.selection_set, record, key, variables, fragments, previous_fields, missing, errors, false, path,
                            expanding, nested_tolerable, fields,
                        );
                    }
                    expanding.remove(name);
                }
                Selection::InlineFragment(inline) => {
                    let outcome = match &inline.type_condition {
                        None => MatchResult::Match,
                        Some(condition) => {
                            let type_condition = ast::type_condition_name(condition);
                            self.resolve_fragment_match(type_condition, record.typename.as_deref(), is_root)
                        }
                    };
                    if !matches!(outcome, MatchResult::NoMatch) {
                        let nested_tolerable = tolerable || matches!(outcome, MatchResult::Heuristic);
                        self.read_into_fields(
                            &inline.selection_set, record, key, variables, fragments, previous_fields, missing, errors, false, path,
                            expanding, nested_tolerable, fields,
                        );
                    }
                }
            }
        }
    }

    fn resolve_fragment_match(&self, type_condition: &str, typename: Option<&str>, is_root: bool) -> MatchResult {
        if is_root {
            return MatchResult::Match;
        }
        self.config.fragment_matcher.matches(type_condition, typename)
    }

    fn resolve_redirect(
        &self,
        typename: Option<&str>,
        field: &ast::Field,
        variables: &serde_json::Value,
        _path: &str,
    ) -> Option<StoreValue> {
        let typename = typename?;
        let resolver = self.config.redirect_for(typename, &field.name)?;
        let mut args = serde_json::Map::new();
        for (name, value) in &field.arguments {
            args.insert(name.clone(), ast::resolve_value(value, variables));
        }
        let get_cache_key = |object: &serde_json::Value| (self.config.id_of)(object).map(StoreKey::from);
        resolver(&serde_json::Value::Object(args), &get_cache_key)
    }

    #[allow(clippy::too_many_arguments)]
    fn read_value(
        &self,
        stored: &StoreValue,
        selection_set: &SelectionSet,
        variables: &serde_json::Value,
        fragments: &HashMap<&str, &FragmentDefinition>,
        previous: Option<&ResultValue>,
        missing: &RefCell<Vec<MissingFieldReport>>,
        errors: &RefCell<Vec<Error>>,
        path: &str,
        expanding: &mut HashSet<String>,
        tolerable: bool,
    ) -> ResultValue {
        match stored {
            StoreValue::Null => ResultValue::Null,
            StoreValue::Scalar(v) | StoreValue::Json(v) => ResultValue::Scalar(v.clone()),
            StoreValue::Reference(r) => {
                if selection_set.items.is_empty() {
                    self.report_missing(path, tolerable);
                    missing.borrow_mut().push(MissingFieldReport { path: path.to_string(), tolerable });
                    return ResultValue::Null;
                }
                self.read_object(
                    selection_set, &r.key, variables, fragments, previous, missing, errors, false, path, expanding, tolerable, false,
                )
            }
            StoreValue::List(items) => {
                let previous_list = match previous {
                    Some(ResultValue::List(l)) => Some(Rc::clone(l)),
                    _ => None,
                };
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}.{index}");
                    let previous_item = previous_list.as_ref().and_then(|l| l.get(index));
                    out.push(self.read_value(item, selection_set, variables, fragments, previous_item, missing, errors, &item_path, expanding, tolerable));
                }
                if let Some(previous_list) = &previous_list {
                    if previous_list.len() == out.len() && previous_list.iter().zip(out.iter()).all(|(a, b)| a == b) {
                        return ResultValue::List(Rc::clone(previous_list));
                    }
                }
                ResultValue::List(Rc::new(out))
            }
        }
    }
}
