//! Equality and ordering tests.

use std::cmp::Ordering;
use std::sync::Arc;

use infer_graph::Node;

use super::{boxed, compare_values, same_value};
use crate::builtin::{Builtin, RuleContext};

/// A two-argument test over ground values.
struct Comparison {
    name: &'static str,
    test: fn(&Node, &Node) -> bool,
}

impl Builtin for Comparison {
    fn name(&self) -> &str {
        self.name
    }

    fn arg_length(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[Node], _length: usize, _ctx: &mut dyn RuleContext) -> bool {
        match args {
            [a, b] if a.is_ground() && b.is_ground() => (self.test)(a, b),
            _ => false,
        }
    }
}

fn ordered(a: &Node, b: &Node, accept: fn(Ordering) -> bool) -> bool {
    compare_values(a, b).is_some_and(accept)
}

pub(crate) fn builtins() -> Vec<Arc<dyn Builtin>> {
    vec![
        boxed(Comparison {
            name: "equal",
            test: same_value,
        }),
        boxed(Comparison {
            name: "notEqual",
            test: |a, b| !same_value(a, b),
        }),
        boxed(Comparison {
            name: "lessThan",
            test: |a, b| ordered(a, b, Ordering::is_lt),
        }),
        boxed(Comparison {
            name: "greaterThan",
            test: |a, b| ordered(a, b, Ordering::is_gt),
        }),
        boxed(Comparison {
            name: "le",
            test: |a, b| ordered(a, b, Ordering::is_le),
        }),
        boxed(Comparison {
            name: "ge",
            test: |a, b| ordered(a, b, Ordering::is_ge),
        }),
    ]
}
