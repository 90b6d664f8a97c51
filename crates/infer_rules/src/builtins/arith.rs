//! Arithmetic over numeric literals.
//!
//! Integer inputs give integer results when the operation is exact in
//! integers; any float input gives a float result. The last argument is the
//! output: an unbound variable gets bound, a bound value is checked.

use std::sync::Arc;

use infer_graph::Node;

use super::{boxed, Number};
use crate::builtin::{Builtin, RuleContext};

/// A binary operation `op(a, b, ?result)`.
struct Arithmetic {
    name: &'static str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> Option<f64>,
}

impl Builtin for Arithmetic {
    fn name(&self) -> &str {
        self.name
    }

    fn arg_length(&self) -> Option<usize> {
        Some(3)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [a, b, out] = args else {
            return false;
        };
        let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) else {
            return false;
        };
        let result = match (x, y) {
            (Number::Int(i), Number::Int(j)) => match (self.int_op)(i, j) {
                Some(n) => Some(Number::Int(n)),
                None => (self.float_op)(x.as_f64(), y.as_f64()).map(Number::Float),
            },
            _ => (self.float_op)(x.as_f64(), y.as_f64()).map(Number::Float),
        };
        match result {
            Some(n) => bind_number(ctx, out, n),
            None => false,
        }
    }
}

/// Binds the output, comparing numerically when it is already bound.
fn bind_number(ctx: &mut dyn RuleContext, out: &Node, value: Number) -> bool {
    match Number::of(out) {
        Some(existing) => existing.compare(value) == Some(std::cmp::Ordering::Equal),
        None => ctx.bind(out, &value.to_node()),
    }
}

struct AddOne;

impl Builtin for AddOne {
    fn name(&self) -> &str {
        "addOne"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(2)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [a, out] = args else {
            return false;
        };
        let next = match Number::of(a) {
            Some(Number::Int(n)) => n.checked_add(1).map(Number::Int),
            Some(Number::Float(f)) => Some(Number::Float(f + 1.0)),
            None => None,
        };
        next.is_some_and(|n| bind_number(ctx, out, n))
    }
}

/// `min`/`max` return one of their inputs unchanged.
struct Extremum {
    name: &'static str,
    pick_first: fn(std::cmp::Ordering) -> bool,
}

impl Builtin for Extremum {
    fn name(&self) -> &str {
        self.name
    }

    fn arg_length(&self) -> Option<usize> {
        Some(3)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let [a, b, out] = args else {
            return false;
        };
        let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) else {
            return false;
        };
        let Some(ordering) = x.compare(y) else {
            return false;
        };
        let chosen = if (self.pick_first)(ordering) { a } else { b };
        ctx.bind(out, chosen)
    }
}

pub(crate) fn builtins() -> Vec<Arc<dyn Builtin>> {
    vec![
        boxed(Arithmetic {
            name: "sum",
            int_op: i64::checked_add,
            float_op: |a, b| Some(a + b),
        }),
        boxed(Arithmetic {
            name: "difference",
            int_op: i64::checked_sub,
            float_op: |a, b| Some(a - b),
        }),
        boxed(Arithmetic {
            name: "product",
            int_op: i64::checked_mul,
            float_op: |a, b| Some(a * b),
        }),
        boxed(Arithmetic {
            name: "quotient",
            int_op: |a, b| {
                if b != 0 && a % b == 0 {
                    Some(a / b)
                } else {
                    None
                }
            },
            float_op: |a, b| if b == 0.0 { None } else { Some(a / b) },
        }),
        boxed(Extremum {
            name: "min",
            pick_first: |o| o.is_le(),
        }),
        boxed(Extremum {
            name: "max",
            pick_first: |o| o.is_ge(),
        }),
        boxed(AddOne),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestContext;
    use infer_graph::Node;

    fn out() -> Node {
        Node::var_at("out", 0)
    }

    #[test]
    fn test_sum_binds_integer() {
        let mut ctx = TestContext::new(1);
        assert!(ctx.call("sum", &[Node::integer(2), Node::integer(3), out()]));
        assert_eq!(ctx.value(&out()), Some(Node::integer(5)));
    }

    #[test]
    fn test_mixed_types_give_float() {
        let mut ctx = TestContext::new(1);
        assert!(ctx.call("product", &[Node::integer(2), Node::float(1.5), out()]));
        assert_eq!(ctx.value(&out()), Some(Node::float(3.0)));
    }

    #[test]
    fn test_bound_output_is_checked() {
        let mut ctx = TestContext::new(0);
        assert!(ctx.call("difference", &[Node::integer(5), Node::integer(3), Node::integer(2)]));
        assert!(ctx.call("sum", &[Node::integer(1), Node::integer(1), Node::float(2.0)]));
        assert!(!ctx.call("sum", &[Node::integer(1), Node::integer(1), Node::integer(3)]));
    }

    #[test]
    fn test_quotient() {
        let mut ctx = TestContext::new(1);
        assert!(ctx.call("quotient", &[Node::integer(6), Node::integer(3), out()]));
        assert_eq!(ctx.value(&out()), Some(Node::integer(2)));

        let mut ctx = TestContext::new(1);
        assert!(ctx.call("quotient", &[Node::integer(7), Node::integer(2), out()]));
        assert_eq!(ctx.value(&out()), Some(Node::float(3.5)));

        let mut ctx = TestContext::new(1);
        assert!(!ctx.call("quotient", &[Node::integer(1), Node::integer(0), out()]));
    }

    #[test]
    fn test_min_max_add_one() {
        let mut ctx = TestContext::new(1);
        assert!(ctx.call("min", &[Node::integer(4), Node::float(2.5), out()]));
        assert_eq!(ctx.value(&out()), Some(Node::float(2.5)));

        let mut ctx = TestContext::new(1);
        assert!(ctx.call("max", &[Node::integer(4), Node::float(2.5), out()]));
        assert_eq!(ctx.value(&out()), Some(Node::integer(4)));

        let mut ctx = TestContext::new(1);
        assert!(ctx.call("addOne", &[Node::integer(41), out()]));
        assert_eq!(ctx.value(&out()), Some(Node::integer(42)));
    }

    #[test]
    fn test_non_numeric_fails() {
        let mut ctx = TestContext::new(1);
        assert!(!ctx.call("sum", &[Node::literal("a"), Node::integer(1), out()]));
        assert!(!ctx.call("sum", &[Node::var_at("x", 0), Node::integer(1), Node::integer(2)]));
    }
}
