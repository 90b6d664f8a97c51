//! Term kind tests.

use std::sync::Arc;

use infer_graph::Node;

use super::boxed;
use crate::builtin::{Builtin, RuleContext};

struct KindTest {
    name: &'static str,
    test: fn(&Node) -> bool,
}

impl Builtin for KindTest {
    fn name(&self) -> &str {
        self.name
    }

    fn arg_length(&self) -> Option<usize> {
        Some(1)
    }

    fn body_call(&self, args: &[Node], _length: usize, _ctx: &mut dyn RuleContext) -> bool {
        args.first().is_some_and(self.test)
    }
}

/// `isDType(?value, type)`: the value is a literal of the given datatype.
struct IsDatatype;

impl Builtin for IsDatatype {
    fn name(&self) -> &str {
        "isDType"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[Node], _length: usize, _ctx: &mut dyn RuleContext) -> bool {
        match args {
            [Node::Literal(lit), Node::Uri(datatype)] => lit.datatype() == *datatype,
            _ => false,
        }
    }
}

pub(crate) fn builtins() -> Vec<Arc<dyn Builtin>> {
    vec![
        boxed(KindTest {
            name: "bound",
            test: Node::is_ground,
        }),
        boxed(KindTest {
            name: "unbound",
            test: |n| !n.is_ground(),
        }),
        boxed(KindTest {
            name: "isLiteral",
            test: Node::is_literal,
        }),
        boxed(KindTest {
            name: "notLiteral",
            test: |n| n.is_ground() && !n.is_literal(),
        }),
        boxed(KindTest {
            name: "isBNode",
            test: Node::is_blank,
        }),
        boxed(KindTest {
            name: "notBNode",
            test: |n| n.is_ground() && !n.is_blank(),
        }),
        boxed(KindTest {
            name: "isFunctor",
            test: Node::is_functor,
        }),
        boxed(KindTest {
            name: "notFunctor",
            test: |n| n.is_ground() && !n.is_functor(),
        }),
        boxed(IsDatatype),
    ]
}
