//! The canonical key index.
//!
//! A prefix trie whose edges are labeled by arbitrary values, compared by identity for
//! AST-node-like references and by value for everything else. `intern` returns a stable,
//! cheaply hashable/comparable handle unique to the sequence of parts passed in, generalized to
//! heterogeneous sequences since our keys mix AST pointer identity with plain JSON values. The
//! index never evicts; callers must reuse AST references to benefit.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// One component of a canonical key sequence.
#[derive(Clone)]
pub enum KeyPart {
    /// Compared by pointer identity — used for AST nodes (selection sets, fragment matchers)
    /// that callers are expected to reuse across calls to benefit from interning.
    Ptr(usize),
    /// Compared by value — used for variables JSON, store ids, and other plain data.
    Value(serde_json::Value),
}

impl KeyPart {
    pub fn ptr<T>(rc: &Rc<T>) -> Self {
        KeyPart::Ptr(Rc::as_ptr(rc) as *const () as usize)
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyPart::Ptr(a), KeyPart::Ptr(b)) => a == b,
            (KeyPart::Value(a), KeyPart::Value(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            KeyPart::Ptr(p) => {
                0u8.hash(state);
                p.hash(state);
            }
            KeyPart::Value(v) => {
                1u8.hash(state);
                // serde_json::Value doesn't implement Hash; hash its canonical text form.
                crate::record::canonicalize_json(v).hash(state);
            }
        }
    }
}

/// A stable handle unique to one sequence of [`KeyPart`]s interned through a given
/// [`KeyIndex`]. Cheap to clone, hash, and compare.
#[derive(Clone)]
pub struct CanonicalKey(Rc<()>);

impl PartialEq for CanonicalKey {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for CanonicalKey {}

impl Hash for CanonicalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalKey({:p})", Rc::as_ptr(&self.0))
    }
}

#[derive(Default)]
struct Node {
    children: RefCell<HashMap<KeyPart, Rc<Node>>>,
    sentinel: Rc<()>,
}

/// Interns sequences of [`KeyPart`]s into stable [`CanonicalKey`]s.
pub struct KeyIndex {
    root: Rc<Node>,
}

impl Default for KeyIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyIndex {
    pub fn new() -> Self {
        KeyIndex { root: Rc::new(Node::default()) }
    }

    pub fn intern(&self, parts: impl IntoIterator<Item = KeyPart>) -> CanonicalKey {
        let mut node = Rc::clone(&self.root);
        for part in parts {
            let next = {
                let mut children = node.children.borrow_mut();
                Rc::clone(children.entry(part).or_insert_with(|| Rc::new(Node::default())))
            };
            node = next;
        }
        CanonicalKey(Rc::clone(&node.sentinel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_sequences_intern_to_the_same_key() {
        let index = KeyIndex::new();
        let a = index.intern([KeyPart::Value(serde_json::json!("x")), KeyPart::Value(1.into())]);
        let b = index.intern([KeyPart::Value(serde_json::json!("x")), KeyPart::Value(1.into())]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_sequences_intern_to_different_keys() {
        let index = KeyIndex::new();
        let a = index.intern([KeyPart::Value(1.into())]);
        let b = index.intern([KeyPart::Value(2.into())]);
        assert_ne!(a, b);
    }

    #[test]
    fn pointer_identity_distinguishes_structurally_equal_nodes() {
        let index = KeyIndex::new();
        let doc_a = Rc::new(42u32);
        let doc_b = Rc::new(42u32);
        let a = index.intern([KeyPart::ptr(&doc_a)]);
        let b = index.intern([KeyPart::ptr(&doc_b)]);
        assert_ne!(a, b, "distinct Rc allocations must not alias even with equal contents");
        let a_again = index.intern([KeyPart::ptr(&doc_a)]);
        assert_eq!(a, a_again);
    }

    #[test]
    fn prefix_sharing_does_not_collapse_distinct_suffixes() {
        let index = KeyIndex::new();
        let a = index.intern([KeyPart::Value(1.into()), KeyPart::Value(2.into())]);
        let b = index.intern([KeyPart::Value(1.into())]);
        assert_ne!(a, b);
    }
}
