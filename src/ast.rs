//! Helpers over `graphql_parser::query` AST types shared by the writer and reader.
//! Neither component parses GraphQL text; both consume `Document`s the caller already parsed
//! with `graphql_parser::parse_query`.

use crate::error::{Error, Result};
use crate::record::{canonical_field_key, StoreFieldKey};
use graphql_parser::query as q;
use std::collections::HashMap;

/// This crate only ever deals in the owned-`String` instantiation of the parser's generic AST,
/// so every helper below is written against concrete, non-generic types rather than threading a
/// `Text<'a>` type parameter through the whole crate.
pub type Document = q::Document<'static, String>;
pub type SelectionSet = q::SelectionSet<'static, String>;
pub type Selection = q::Selection<'static, String>;
pub type Field = q::Field<'static, String>;
pub type Directive = q::Directive<'static, String>;
pub type Value = q::Value<'static, String>;
pub type FragmentDefinition = q::FragmentDefinition<'static, String>;

/// Maps every named fragment in `document` to its definition, for spread resolution.
pub fn fragment_definitions(document: &Document) -> HashMap<&str, &FragmentDefinition> {
    document
        .definitions
        .iter()
        .filter_map(|def| match def {
            q::Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
            q::Definition::Operation(_) => None,
        })
        .collect()
}

/// Returns the selection set of the document's single operation (query, mutation, or bare
/// selection set). Documents with more than one operation are outside this crate's scope — the
/// caller is expected to hand in the already-selected operation's document.
pub fn root_selection_set(document: &Document) -> Result<&SelectionSet> {
    document
        .definitions
        .iter()
        .find_map(|def| match def {
            q::Definition::Operation(op) => Some(operation_selection_set(op)),
            q::Definition::Fragment(_) => None,
        })
        .ok_or_else(|| Error::write("document contains no operation".to_string(), format!("{document:?}")))
}

fn operation_selection_set(op: &q::OperationDefinition<'static, String>) -> &SelectionSet {
    match op {
        q::OperationDefinition::SelectionSet(set) => set,
        q::OperationDefinition::Query(query) => &query.selection_set,
        q::OperationDefinition::Mutation(mutation) => &mutation.selection_set,
        q::OperationDefinition::Subscription(subscription) => &subscription.selection_set,
    }
}

/// The name under which a field's result should be placed: its alias if present, else its name.
pub fn response_key(field: &Field) -> &str {
    field.alias.as_deref().unwrap_or(&field.name)
}

/// Resolves a literal/variable AST value against `variables` into plain JSON.
pub fn resolve_value(value: &Value, variables: &serde_json::Value) -> serde_json::Value {
    match value {
        q::Value::Variable(name) => variables.get(name).cloned().unwrap_or(serde_json::Value::Null),
        q::Value::Int(n) => n.as_i64().map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        q::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        q::Value::String(s) => serde_json::Value::String(s.clone()),
        q::Value::Boolean(b) => serde_json::Value::Bool(*b),
        q::Value::Null => serde_json::Value::Null,
        q::Value::Enum(e) => serde_json::Value::String(e.clone()),
        q::Value::List(items) => serde_json::Value::Array(items.iter().map(|v| resolve_value(v, variables)).collect()),
        q::Value::Object(fields) => {
            let mut map = serde_json::Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), resolve_value(value, variables));
            }
            serde_json::Value::Object(map)
        }
    }
}

fn directive_named<'a>(directives: &'a [Directive], name: &str) -> Option<&'a Directive> {
    directives.iter().find(|d| d.name == name)
}

/// Evaluates `@skip`/`@include` against `variables`; `true` means the selection must be ignored.
pub fn is_excluded(directives: &[Directive], variables: &serde_json::Value) -> bool {
    if let Some(skip) = directive_named(directives, "skip") {
        if directive_if_arg(skip, variables) {
            return true;
        }
    }
    if let Some(include) = directive_named(directives, "include") {
        if !directive_if_arg(include, variables) {
            return true;
        }
    }
    false
}

fn directive_if_arg(directive: &Directive, variables: &serde_json::Value) -> bool {
    directive
        .arguments
        .iter()
        .find(|(name, _)| name == "if")
        .map(|(_, value)| resolve_value(value, variables))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Builds the canonical store-field-key for `field`, folding in every directive argument besides
/// `@skip`/`@include`: each remaining directive's arguments nest under an `"@directiveName"` key,
/// so e.g. `@connection(key: "feed")` changes field identity the way Apollo Client's
/// `storeKeyNameFromField` does.
pub fn store_field_key(field: &Field, variables: &serde_json::Value) -> StoreFieldKey {
    let mut args = serde_json::Map::new();
    for (name, value) in &field.arguments {
        args.insert(name.clone(), resolve_value(value, variables));
    }
    for directive in &field.directives {
        if directive.name == "skip" || directive.name == "include" {
            continue;
        }
        let mut directive_args = serde_json::Map::new();
        for (name, value) in &directive.arguments {
            directive_args.insert(name.clone(), resolve_value(value, variables));
        }
        args.insert(format!("@{}", directive.name), serde_json::Value::Object(directive_args));
    }
    canonical_field_key(&field.name, &serde_json::Value::Object(args))
}

pub fn type_condition_name(condition: &q::TypeCondition<'static, String>) -> &str {
    match condition {
        q::TypeCondition::On(name) => name,
    }
}

/// Reads `__typename` out of a plain JSON result object, if present.
pub fn typename_of(result: &serde_json::Value) -> Option<&str> {
    result.get("__typename").and_then(|v| v.as_str())
}

/// Returns a copy of `document` with a `__typename` field selection inserted into every
/// selection set (operations and fragment definitions) that doesn't already request one.
/// Mirrors Apollo Client's `addTypenameToDocument` transform, run once so the writer/reader
/// never need to special-case "was typename requested".
pub fn inject_typename(document: &Document) -> Document {
    let mut document = document.clone();
    for def in &mut document.definitions {
        match def {
            q::Definition::Operation(op) => inject_typename_into_operation(op),
            q::Definition::Fragment(fragment) => inject_typename_into_set(&mut fragment.selection_set),
        }
    }
    document
}

fn inject_typename_into_operation(op: &mut q::OperationDefinition<'static, String>) {
    match op {
        q::OperationDefinition::SelectionSet(set) => inject_typename_into_set(set),
        q::OperationDefinition::Query(query) => inject_typename_into_set(&mut query.selection_set),
        q::OperationDefinition::Mutation(mutation) => inject_typename_into_set(&mut mutation.selection_set),
        q::OperationDefinition::Subscription(subscription) => inject_typename_into_set(&mut subscription.selection_set),
    }
}

fn inject_typename_into_set(set: &mut SelectionSet) {
    if !set.items.is_empty() {
        let already_requested = set.items.iter().any(|item| matches!(item, q::Selection::Field(f) if f.name == "__typename"));
        if !already_requested {
            let pos = q::Pos { line: 0, column: 0 };
            set.items.insert(
                0,
                q::Selection::Field(q::Field {
                    position: pos,
                    alias: None,
                    name: "__typename".to_string(),
                    arguments: Vec::new(),
                    directives: Vec::new(),
                    selection_set: q::SelectionSet { span: (pos, pos), items: Vec::new() },
                }),
            );
        }
    }
    for item in &mut set.items {
        match item {
            q::Selection::Field(field) => inject_typename_into_set(&mut field.selection_set),
            q::Selection::InlineFragment(inline) => inject_typename_into_set(&mut inline.selection_set),
            q::Selection::FragmentSpread(_) => {}
        }
    }
}
