//! Negation, graph-changing head actions and node generators.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use infer_graph::{Literal, Node, Triple, TriplePattern, XSD};
use log::{info, warn};

use super::boxed;
use crate::builtin::{Builtin, RuleContext};

fn position(node: &Node) -> Option<Node> {
    node.is_ground().then(|| node.clone())
}

/// `noValue(s, p)` / `noValue(s, p, o)`: no visible triple matches.
struct NoValue;

impl Builtin for NoValue {
    fn name(&self) -> &str {
        "noValue"
    }

    fn is_monotonic(&self) -> bool {
        false
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let pattern = match args {
            [s, p] => TriplePattern::new(position(s), position(p), None),
            [s, p, o] => TriplePattern::new(position(s), position(p), position(o)),
            _ => return false,
        };
        ctx.find(&pattern).is_empty()
    }
}

/// Removes the triples matched by the numbered body clauses.
struct RemoveMatched {
    name: &'static str,
    notify: bool,
}

impl RemoveMatched {
    fn targets(args: &[Node], ctx: &dyn RuleContext) -> Vec<Triple> {
        args.iter()
            .filter_map(|a| a.as_literal().and_then(Literal::as_integer))
            .filter_map(|i| usize::try_from(i).ok())
            .filter_map(|i| ctx.matched(i).cloned())
            .collect()
    }
}

impl Builtin for RemoveMatched {
    fn name(&self) -> &str {
        self.name
    }

    fn is_safe(&self) -> bool {
        false
    }

    fn is_monotonic(&self) -> bool {
        false
    }

    fn body_call(&self, _args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        warn!(
            "{} is a head action, ignored in the body of rule {}",
            self.name,
            ctx.rule().label()
        );
        false
    }

    fn head_action(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) {
        for triple in Self::targets(args, ctx) {
            if self.notify {
                ctx.remove(&triple);
            } else {
                ctx.drop_silently(&triple);
            }
        }
    }
}

/// `hide(p)`: triples with this predicate no longer appear in query results.
struct Hide;

impl Builtin for Hide {
    fn name(&self) -> &str {
        "hide"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(1)
    }

    fn is_safe(&self) -> bool {
        false
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        match args.first() {
            Some(predicate) if predicate.is_ground() => {
                if !ctx.is_speculative() {
                    ctx.hide(predicate);
                }
                true
            }
            _ => false,
        }
    }
}

struct Print;

impl Builtin for Print {
    fn name(&self) -> &str {
        "print"
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        if !ctx.is_speculative() {
            let text: Vec<String> = args.iter().map(ToString::to_string).collect();
            info!("{}", text.join(" "));
        }
        true
    }
}

/// `makeTemp(?x)`: binds a fresh blank node.
struct MakeTemp;

impl Builtin for MakeTemp {
    fn name(&self) -> &str {
        "makeTemp"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(1)
    }

    fn is_safe(&self) -> bool {
        false
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        match args.first() {
            Some(out) => ctx.bind(out, &Node::blank()),
            None => false,
        }
    }
}

/// `makeSkolem(?x, v1, ...)`: binds a blank node determined by the values.
struct MakeSkolem;

impl Builtin for MakeSkolem {
    fn name(&self) -> &str {
        "makeSkolem"
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let Some((out, values)) = args.split_first() else {
            return false;
        };
        if !values.iter().all(Node::is_ground) {
            return false;
        }
        let mut hasher = DefaultHasher::new();
        values.hash(&mut hasher);
        ctx.bind(out, &Node::blank_with_id(hasher.finish()))
    }
}

/// `now(?x)`: binds the current time as an `xsd:dateTime` literal.
struct Now;

impl Builtin for Now {
    fn name(&self) -> &str {
        "now"
    }

    fn arg_length(&self) -> Option<usize> {
        Some(1)
    }

    fn body_call(&self, args: &[Node], _length: usize, ctx: &mut dyn RuleContext) -> bool {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let value = Node::Literal(Literal::typed(stamp, format!("{}dateTime", XSD)));
        match args.first() {
            Some(out) => ctx.bind(out, &value),
            None => false,
        }
    }
}

pub(crate) fn builtins() -> Vec<Arc<dyn Builtin>> {
    vec![
        boxed(NoValue),
        boxed(RemoveMatched {
            name: "remove",
            notify: true,
        }),
        boxed(RemoveMatched {
            name: "drop",
            notify: false,
        }),
        boxed(Hide),
        boxed(Print),
        boxed(MakeTemp),
        boxed(MakeSkolem),
        boxed(Now),
    ]
}
