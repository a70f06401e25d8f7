//! The transient definition tree built while decoding one event, packet
//! context, or header, plus its flattened public form.
//!
//! A [`Definitions`] arena exists only for the lifetime of one top-level
//! decode call. [`crate::codec`] pushes nodes into it as it walks a
//! [`crate::model::Declaration`], resolving variant tags and sequence
//! lengths by climbing `parent` links to find a named sibling already
//! decoded in an ancestor scope. Once decoding finishes, [`Definitions::root_value`]
//! flattens the arena into an owned [`Value`] tree and the arena is
//! discarded — nothing downstream of decode ever walks the arena itself.

use internment::Intern;
use ordered_float::OrderedFloat;

/// A fully decoded, owned value. This is what callers of the public API
/// (`Trace::read_event` and friends) actually see.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    UnsignedInteger(u64),
    SignedInteger(i64),
    Float(OrderedFloat<f64>),
    String(String),
    /// The enum's underlying integer value plus its resolved label, if any.
    Enum(i64, Option<String>),
    Struct(Vec<(Intern<String>, Value)>),
    Array(Vec<Value>),
    Sequence(Vec<Value>),
}

impl Value {
    /// Interprets this value as an integer for tag/length resolution,
    /// following through an `Enum`'s underlying value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::UnsignedInteger(v) => Some(*v as i64),
            Value::SignedInteger(v) => Some(*v),
            Value::Enum(v, _) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UnsignedInteger(v) => Some(*v),
            Value::SignedInteger(v) => Some(*v as u64),
            Value::Enum(v, _) => Some(*v as u64),
            _ => None,
        }
    }

    /// Looks up a named field if this value is a struct.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields
                .iter()
                .find(|(n, _)| n.as_str() == name)
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    Leaf(Value),
    Struct(Vec<usize>),
    Array(Vec<usize>),
    Sequence(Vec<usize>),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub name: Intern<String>,
    pub parent: Option<usize>,
    pub kind: NodeKind,
}

/// An arena of definition nodes built while decoding a single scope (event
/// header, event context, payload, or packet context). Parent links are
/// non-owning back-references into the same `Vec`; the arena itself is the
/// sole owner, so there's no cycle to manage.
#[derive(Clone, Debug, Default)]
pub struct Definitions {
    pub(crate) nodes: Vec<Node>,
}

impl Definitions {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Pushes a leaf (already-decoded scalar) node and returns its index.
    pub(crate) fn push_leaf(
        &mut self,
        name: Intern<String>,
        parent: Option<usize>,
        value: Value,
    ) -> usize {
        self.nodes.push(Node {
            name,
            parent,
            kind: NodeKind::Leaf(value),
        });
        self.nodes.len() - 1
    }

    /// Reserves a composite (struct/array/sequence) node with no children
    /// yet, so its children can reference it as `parent` while being built.
    pub(crate) fn push_placeholder(&mut self, name: Intern<String>, parent: Option<usize>) -> usize {
        self.nodes.push(Node {
            name,
            parent,
            kind: NodeKind::Struct(Vec::new()),
        });
        self.nodes.len() - 1
    }

    pub(crate) fn set_kind(&mut self, index: usize, kind: NodeKind) {
        self.nodes[index].kind = kind;
    }

    /// Climbs from `scope` through ancestor struct scopes looking for a
    /// direct child named `name`. This is the scope-chain resolution used
    /// by variant tags and sequence lengths: CTF resolves a name against
    /// the nearest enclosing struct that declares it, not a single parent.
    pub(crate) fn lookup_name(&self, scope: usize, name: &str) -> Option<&Value> {
        let mut cur = Some(scope);
        while let Some(idx) = cur {
            if let NodeKind::Struct(children) = &self.nodes[idx].kind {
                for &child in children {
                    if self.nodes[child].name.as_str() == name {
                        if let NodeKind::Leaf(v) = &self.nodes[child].kind {
                            return Some(v);
                        }
                        return None;
                    }
                }
            }
            cur = self.nodes[idx].parent;
        }
        None
    }

    /// Flattens the subtree rooted at `index` into an owned [`Value`].
    pub fn to_value(&self, index: usize) -> Value {
        match &self.nodes[index].kind {
            NodeKind::Leaf(v) => v.clone(),
            NodeKind::Struct(children) => Value::Struct(
                children
                    .iter()
                    .map(|&c| (self.nodes[c].name, self.to_value(c)))
                    .collect(),
            ),
            NodeKind::Array(children) => {
                Value::Array(children.iter().map(|&c| self.to_value(c)).collect())
            }
            NodeKind::Sequence(children) => {
                Value::Sequence(children.iter().map(|&c| self.to_value(c)).collect())
            }
        }
    }

}
