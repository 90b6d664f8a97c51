//! The [`RuleContext`] handed to builtins by both evaluators.

use infer_graph::{Node, Triple, TriplePattern};
use log::warn;

use crate::binding::BindingEnvironment;
use crate::builtin::RuleContext;
use crate::clause::Rule;
use crate::view::UnionView;

/// Graph changes requested by head actions, applied after the firing.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub removed: Vec<Triple>,
    pub dropped: Vec<Triple>,
    pub hidden: Vec<Node>,
}

pub(crate) struct EvalContext<'a, E: BindingEnvironment> {
    env: &'a mut E,
    rule: &'a Rule,
    matches: &'a [Option<Triple>],
    view: UnionView<'a>,
    speculative: bool,
    effects: Effects,
}

impl<'a, E: BindingEnvironment> EvalContext<'a, E> {
    pub fn new(
        env: &'a mut E,
        rule: &'a Rule,
        matches: &'a [Option<Triple>],
        view: UnionView<'a>,
        speculative: bool,
    ) -> Self {
        Self {
            env,
            rule,
            matches,
            view,
            speculative,
            effects: Effects::default(),
        }
    }

    pub fn instantiate(&mut self, pattern: &Triple) -> Triple {
        self.env.instantiate(pattern)
    }

    pub fn into_effects(self) -> Effects {
        self.effects
    }
}

impl<E: BindingEnvironment> RuleContext for EvalContext<'_, E> {
    fn get_binding(&self, node: &Node) -> Option<Node> {
        self.env.get_binding(node)
    }

    fn bind(&mut self, var: &Node, value: &Node) -> bool {
        self.env.bind(var, value)
    }

    fn rule(&self) -> &Rule {
        self.rule
    }

    fn contains(&self, triple: &Triple) -> bool {
        self.view.contains(triple).unwrap_or_else(|e| {
            warn!("lookup failed in rule {}: {}", self.rule.label(), e);
            false
        })
    }

    fn find(&self, pattern: &TriplePattern) -> Vec<Triple> {
        self.view.find(pattern).unwrap_or_else(|e| {
            warn!("lookup failed in rule {}: {}", self.rule.label(), e);
            Vec::new()
        })
    }

    fn matched(&self, position: usize) -> Option<&Triple> {
        self.matches.get(position).and_then(Option::as_ref)
    }

    fn remove(&mut self, triple: &Triple) {
        if !self.speculative {
            self.effects.removed.push(triple.clone());
        }
    }

    fn drop_silently(&mut self, triple: &Triple) {
        if !self.speculative {
            self.effects.dropped.push(triple.clone());
        }
    }

    fn hide(&mut self, predicate: &Node) {
        if !self.speculative {
            self.effects.hidden.push(predicate.clone());
        }
    }

    fn is_speculative(&self) -> bool {
        self.speculative
    }
}
