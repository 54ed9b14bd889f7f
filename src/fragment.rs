//! `readFragment`/`writeFragment` support: wraps a standalone fragment definition in a synthetic
//! single-selection query document so the existing writer/reader can run against it unmodified.

use crate::ast::{Document, FragmentDefinition};
use crate::error::{Error, Result};
use graphql_parser::query as q;

/// Builds `{ ...fragmentName }` plus the supplied fragment definition(s), selecting
/// `fragment_name` when more than one definition is present.
pub fn build_document(fragment_defs: Vec<FragmentDefinition>, fragment_name: Option<&str>) -> Result<Document> {
    let name = match fragment_name {
        Some(name) => name.to_string(),
        None => match fragment_defs.as_slice() {
            [single] => single.name.clone(),
            _ => return Err(Error::no_fragment_name()),
        },
    };

    let pos = q::Pos { line: 0, column: 0 };
    let spread = q::FragmentSpread {
        position: pos,
        fragment_name: name,
        directives: Vec::new(),
    };
    let selection_set = q::SelectionSet {
        span: (pos, pos),
        items: vec![q::Selection::FragmentSpread(spread)],
    };
    let query = q::Query {
        position: pos,
        name: None,
        variable_definitions: Vec::new(),
        directives: Vec::new(),
        selection_set,
    };

    let mut definitions: Vec<q::Definition<'static, String>> =
        fragment_defs.into_iter().map(q::Definition::Fragment).collect();
    definitions.push(q::Definition::Operation(q::OperationDefinition::Query(query)));
    Ok(q::Document { definitions })
}

/// Extracts every named fragment definition out of a document the caller parsed containing only
/// fragment(s) (no operation).
pub fn fragment_definitions_from(document: &Document) -> Vec<FragmentDefinition> {
    document
        .definitions
        .iter()
        .filter_map(|def| match def {
            q::Definition::Fragment(fragment) => Some(fragment.clone()),
            q::Definition::Operation(_) => None,
        })
        .collect()
}
