//! Builtins over RDF collections (`rdf:first` / `rdf:rest` chains ending in
//! `rdf:nil`), read through the inference graph.

use std::collections::HashSet;
use std::sync::Arc;

use infer_graph::{Node, TriplePattern};

use super::{boxed, same_value};
use crate::builtin::{Builtin, RuleContext};

pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";

fn value_of(ctx: &dyn RuleContext, cell: &Node, predicate: &str) -> Option<Node> {
    ctx.find(
        &TriplePattern::subject(cell.clone()).with_predicate(Node::uri(predicate)),
    )
    .into_iter()
    .next()
    .map(|t| t.object)
}

/// Elements of a well-formed list; `None` if the chain is broken or cyclic.
pub(crate) fn elements(ctx: &dyn RuleContext, list: &Node) -> Option<Vec<Node>> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut cell = list.clone();
    while cell.as_uri() != Some(RDF_NIL) {
        if !seen.insert(cell.clone()) {
            return None;
        }
        items.push(value_of(ctx, &cell, RDF_FIRST)?);
        cell = value_of(ctx, &cell, RDF_REST)?;
    }
    Some(items)
}

/// `listContains(list, value)` and its negation.
struct Membership {
    name: &'static str,
    expect: bool,
}

impl Builtin for Membership {
    fn name(&self) -> &str {
        self.name
    }

    fn arg_length(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [list, value] = args else {
            return false;
        };
        if !value.is_ground() {
            return false;
        }
        match elements(ctx, list) {
            Some(items) => items.iter().any(|item| same_value(item, value)) == self.expect,
            None => false,
        }
    }
}

/// `listLength(list, ?length)`.
struct ListLength;

impl Builtin for ListLength {
    fn name(&self) -> &str {
        "listLength"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [list, out] = args else {
            return false;
        };
        match elements(ctx, list) {
            Some(items) => ctx.bind(out, &Node::integer(items.len() as i64)),
            None => false,
        }
    }
}

/// `listEntry(list, index, ?value)`, zero-based.
struct ListEntry;

impl Builtin for ListEntry {
    fn name(&self) -> &str {
        "listEntry"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(3)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [list, index, out] = args else {
            return false;
        };
        let Some(index) = index
            .as_literal()
            .and_then(|l| l.as_integer())
            .and_then(|i| usize::try_from(i).ok())
        else {
            return false;
        };
        match elements(ctx, list).and_then(|items| items.into_iter().nth(index)) {
            Some(item) => ctx.bind(out, &item),
            None => false,
        }
    }
}

pub(crate) fn builtins() -> Vec<Arc<dyn Builtin>> {
    vec![
        boxed(Membership {
            name: "listContains",
            expect: true,
        }),
        boxed(Membership {
            name: "listNotContains",
            expect: false,
        }),
        boxed(ListLength),
        boxed(ListEntry),
    ]
}
