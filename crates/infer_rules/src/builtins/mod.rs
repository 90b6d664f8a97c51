//! The standard builtin set.
//!
//! Builtins are grouped by concern; [`register_defaults`] installs all of
//! them into a registry.

pub mod actions;
pub mod arith;
pub mod compare;
pub mod lists;
pub mod strings;
pub mod types;

use std::cmp::Ordering;
use std::sync::Arc;

use infer_graph::{Literal, Node};

use crate::builtin::{Builtin, BuiltinRegistry};

/// Installs every standard builtin.
pub fn register_defaults(registry: &mut BuiltinRegistry) {
    for builtin in compare::builtins()
        .into_iter()
        .chain(arith::builtins())
        .chain(types::builtins())
        .chain(strings::builtins())
        .chain(lists::builtins())
        .chain(actions::builtins())
    {
        registry.register(builtin);
    }
}

/// A numeric literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub(crate) fn of(node: &Node) -> Option<Number> {
        let lit = node.as_literal()?;
        match lit {
            Literal::Float(f) => Some(Number::Float(*f)),
            _ => lit
                .as_integer()
                .map(Number::Int)
                .or_else(|| lit.as_number().map(Number::Float)),
        }
    }

    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub(crate) fn to_node(self) -> Node {
        match self {
            Number::Int(n) => Node::integer(n),
            Number::Float(f) => Node::float(f),
        }
    }

    pub(crate) fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Value equality: numbers compare numerically across types, everything
/// else compares as terms.
pub(crate) fn same_value(a: &Node, b: &Node) -> bool {
    match (Number::of(a), Number::of(b)) {
        (Some(x), Some(y)) => x.compare(y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Orders two values when they are both numbers or both plain strings.
pub(crate) fn compare_values(a: &Node, b: &Node) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) {
        return x.compare(y);
    }
    let (x, y) = (a.as_literal()?, b.as_literal()?);
    match (x.as_string(), y.as_string()) {
        (Some(s), Some(t)) => Some(s.cmp(t)),
        _ if x.datatype() == y.datatype() => Some(x.lexical_form().cmp(&y.lexical_form())),
        _ => None,
    }
}

/// The lexical form of a URI or literal.
pub(crate) fn lexical(node: &Node) -> Option<String> {
    match node {
        Node::Uri(uri) => Some(uri.clone()),
        Node::Literal(lit) => Some(lit.lexical_form()),
        _ => None,
    }
}

pub(crate) fn boxed<B: Builtin + 'static>(builtin: B) -> Arc<dyn Builtin> {
    Arc::new(builtin)
}
