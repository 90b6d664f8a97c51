//! Compilation of forward rules into an index-based match network.
//!
//! Pattern nodes are shared between all body patterns of the same shape
//! (same constants, same variable co-occurrence). Each pattern node lists
//! its subscribers as `(rule, level)` pairs; a rule's join levels are its
//! body patterns in declaration order.
//!
//! Every level past the first joins on the variables it shares with the
//! levels before it. Token memories are keyed by the values of those
//! variables, so a new triple only meets the partial matches it agrees with.

use std::collections::HashMap;
use std::sync::Arc;

use infer_graph::{Functor, Node, Triple, Var};
use log::debug;

use crate::binding::BindingVector;
use crate::builtin::{BuiltinCall, BuiltinRegistry};
use crate::clause::{ClauseEntry, Rule};
use crate::error::{Error, Result};

/// A head clause, ready to run.
#[derive(Debug)]
pub(crate) enum HeadEntry {
    Assert(Triple),
    Action(BuiltinCall),
}

/// Per-rule compiled data.
#[derive(Debug)]
pub(crate) struct RuleNode {
    pub rule: Arc<Rule>,
    /// `(body position, pattern)` for each join level.
    pub patterns: Vec<(usize, Triple)>,
    /// Variables each level shares with the levels before it.
    pub joins: Vec<Vec<usize>>,
    /// `(body position, call)` for each builtin body clause.
    pub calls: Vec<(usize, BuiltinCall)>,
    pub head: Vec<HeadEntry>,
    /// Uses a builtin whose answer can change as triples are added.
    pub non_monotonic: bool,
    /// Runs a head action that removes triples.
    pub destructive: bool,
}

impl RuleNode {
    /// The match list for a complete token: one entry per body clause.
    pub fn matches(&self, token: &[Triple]) -> Vec<Option<Triple>> {
        let mut matches = vec![None; self.rule.body().len()];
        for ((position, _), fact) in self.patterns.iter().zip(token) {
            matches[*position] = Some(fact.clone());
        }
        matches
    }

    /// Rebuilds the binding environment of a complete token.
    pub fn bindings(&self, token: &[Triple]) -> Result<BindingVector> {
        if token.len() != self.patterns.len() {
            return Err(Error::Invariant(format!(
                "token of length {} for rule {} with {} patterns",
                token.len(),
                self.rule.label(),
                self.patterns.len()
            )));
        }
        let mut env = BindingVector::new(self.rule.num_vars());
        for ((_, pattern), fact) in self.patterns.iter().zip(token) {
            if !env.unify_triple(pattern, fact) {
                return Err(Error::Invariant(format!(
                    "token triple {} does not match {} in rule {}",
                    fact,
                    pattern,
                    self.rule.label()
                )));
            }
        }
        Ok(env)
    }

    /// Join key of `level`: the values `env` gives the variables that level
    /// shares with earlier ones. Empty for the first level and past the last.
    pub fn join_key(&self, level: usize, env: &BindingVector) -> Vec<Node> {
        self.joins
            .get(level)
            .map(|vars| {
                vars.iter()
                    .map(|&index| env.value(index).unwrap_or(Node::Any))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A shared pattern test.
#[derive(Debug)]
pub(crate) struct PatternNode {
    /// The pattern with variables renumbered locally.
    pub shape: Triple,
    /// Distinct variables in the shape.
    pub vars: usize,
    pub subscribers: Vec<(usize, usize)>,
}

/// The compiled form of a forward rule set.
#[derive(Debug)]
pub struct Network {
    pub(crate) rules: Vec<RuleNode>,
    pub(crate) patterns: Vec<PatternNode>,
    by_predicate: HashMap<Node, Vec<usize>>,
    wildcard: Vec<usize>,
    monotonic: bool,
    registry: Arc<BuiltinRegistry>,
}

impl Network {
    /// Validates and compiles forward rules.
    pub fn compile(rules: &[Arc<Rule>], registry: Arc<BuiltinRegistry>) -> Result<Self> {
        let mut network = Network {
            rules: Vec::with_capacity(rules.len()),
            patterns: Vec::new(),
            by_predicate: HashMap::new(),
            wildcard: Vec::new(),
            monotonic: true,
            registry,
        };
        let mut shapes: HashMap<Triple, usize> = HashMap::new();

        for (index, rule) in rules.iter().enumerate() {
            if rule.is_backward() {
                return Err(Error::Config(format!(
                    "backward rule {} cannot be compiled into the forward network",
                    rule.label()
                )));
            }
            rule.validate(&network.registry)?;

            let mut patterns = Vec::new();
            let mut joins = Vec::new();
            let mut seen: Vec<usize> = Vec::new();
            let mut calls = Vec::new();
            for (position, entry) in rule.body().iter().enumerate() {
                match entry {
                    ClauseEntry::Triple(pattern) => {
                        let level = patterns.len();
                        let node = network.pattern_node(&mut shapes, pattern);
                        network.patterns[node].subscribers.push((index, level));
                        patterns.push((position, pattern.clone()));

                        let vars = variables(pattern);
                        joins.push(vars.iter().copied().filter(|v| seen.contains(v)).collect());
                        for var in vars {
                            if !seen.contains(&var) {
                                seen.push(var);
                            }
                        }
                    }
                    ClauseEntry::Functor(f) => calls.push((position, BuiltinCall::new(f.clone()))),
                }
            }
            let head = rule
                .head()
                .iter()
                .map(|entry| match entry {
                    ClauseEntry::Triple(t) => HeadEntry::Assert(t.clone()),
                    ClauseEntry::Functor(f) => HeadEntry::Action(BuiltinCall::new(f.clone())),
                })
                .collect::<Vec<_>>();

            let non_monotonic = calls
                .iter()
                .any(|(_, c)| !network.is_monotonic_call(c.functor()));
            let destructive = head.iter().any(|entry| match entry {
                HeadEntry::Action(c) => !network.is_monotonic_call(c.functor()),
                HeadEntry::Assert(_) => false,
            });
            network.monotonic &= !non_monotonic && !destructive;

            network.rules.push(RuleNode {
                rule: Arc::clone(rule),
                patterns,
                joins,
                calls,
                head,
                non_monotonic,
                destructive,
            });
        }

        debug!(
            "compiled {} rules into {} pattern nodes (monotonic: {})",
            network.rules.len(),
            network.patterns.len(),
            network.monotonic
        );
        Ok(network)
    }

    fn is_monotonic_call(&self, f: &Functor) -> bool {
        self.registry.get(&f.name).is_none_or(|b| b.is_monotonic())
    }

    fn pattern_node(&mut self, shapes: &mut HashMap<Triple, usize>, pattern: &Triple) -> usize {
        let (shape, vars) = shape_of(pattern);
        if let Some(&node) = shapes.get(&shape) {
            return node;
        }
        let node = self.patterns.len();
        match &shape.predicate {
            Node::Variable(_) | Node::Any => self.wildcard.push(node),
            predicate => self
                .by_predicate
                .entry(predicate.clone())
                .or_default()
                .push(node),
        }
        shapes.insert(shape.clone(), node);
        self.patterns.push(PatternNode {
            shape,
            vars,
            subscribers: Vec::new(),
        });
        node
    }

    /// `(rule, level)` pairs whose pattern matches the triple, sorted by rule
    /// declaration order, then level.
    pub(crate) fn activations(&self, triple: &Triple) -> Vec<(usize, usize)> {
        let candidates = self
            .by_predicate
            .get(&triple.predicate)
            .into_iter()
            .flatten()
            .chain(&self.wildcard);
        let mut found: Vec<(usize, usize)> = candidates
            .filter(|&&node| {
                let pattern = &self.patterns[node];
                BindingVector::new(pattern.vars).unify_triple(&pattern.shape, triple)
            })
            .flat_map(|&node| self.patterns[node].subscribers.iter().copied())
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    pub fn registry(&self) -> &BuiltinRegistry {
        &self.registry
    }

    /// `true` if no rule uses negation or removes triples.
    pub fn is_monotonic(&self) -> bool {
        self.monotonic
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// The compiled rules, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter().map(|n| &n.rule)
    }
}

/// Renumbers variables by first occurrence within the pattern and drops
/// their names, so patterns of the same shape compare equal.
pub(crate) fn canonical(pattern: &Triple) -> Triple {
    shape_of(pattern).0
}

/// The canonical shape and its number of distinct variables.
fn shape_of(pattern: &Triple) -> (Triple, usize) {
    let mut local: HashMap<usize, usize> = HashMap::new();
    let shape = pattern.map(|n| renumber(n, &mut local));
    (shape, local.len())
}

/// Variable indexes of a pattern in first-occurrence order, without repeats.
fn variables(pattern: &Triple) -> Vec<usize> {
    fn collect(node: &Node, out: &mut Vec<usize>) {
        match node {
            Node::Variable(v) if !out.contains(&v.index) => out.push(v.index),
            Node::Functor(f) => f.args.iter().for_each(|a| collect(a, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    for node in pattern.nodes() {
        collect(node, &mut out);
    }
    out
}

fn renumber(node: &Node, local: &mut HashMap<usize, usize>) -> Node {
    match node {
        Node::Variable(v) => {
            let next = local.len();
            let index = *local.entry(v.index).or_insert(next);
            Node::Variable(Var {
                name: String::new(),
                index,
            })
        }
        Node::Functor(f) => Node::functor(
            f.name.clone(),
            f.args.iter().map(|a| renumber(a, local)).collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(name: &str) -> Node {
        Node::var(name)
    }

    fn u(name: &str) -> Node {
        Node::uri(name)
    }

    fn compile(rules: Vec<Rule>) -> Result<Network> {
        let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        Network::compile(&rules, Arc::new(BuiltinRegistry::with_defaults()))
    }

    #[test]
    fn test_patterns_shared_by_shape() {
        let network = compile(vec![
            Rule::forward("r1")
                .when(v("a"), u("knows"), v("b"))
                .when(v("b"), u("knows"), v("c"))
                .then(v("a"), u("knows2"), v("c"))
                .build(),
            Rule::forward("r2")
                .when(v("x"), u("knows"), v("y"))
                .then(v("y"), u("knownBy"), v("x"))
                .build(),
        ])
        .unwrap();
        assert_eq!(network.pattern_count(), 1);
        assert_eq!(network.patterns[0].subscribers, vec![(0, 0), (0, 1), (1, 0)]);
        assert!(network.is_monotonic());
    }

    #[test]
    fn test_repeated_variable_is_a_distinct_shape() {
        let network = compile(vec![Rule::forward("r")
            .when(v("a"), u("p"), v("b"))
            .when(v("a"), u("p"), v("a"))
            .then(v("a"), u("q"), v("b"))
            .build()])
        .unwrap();
        assert_eq!(network.pattern_count(), 2);

        let reflexive = Triple::new(u("s"), u("p"), u("s"));
        assert_eq!(network.activations(&reflexive), vec![(0, 0), (0, 1)]);
        let plain = Triple::new(u("s"), u("p"), u("o"));
        assert_eq!(network.activations(&plain), vec![(0, 0)]);
    }

    #[test]
    fn test_functor_object_shape_matches() {
        let network = compile(vec![Rule::forward("first")
            .when(
                v("s"),
                u("has"),
                Node::functor("triple", vec![v("a"), v("b"), v("c")]),
            )
            .then(v("s"), u("first"), v("a"))
            .build()])
        .unwrap();
        assert_eq!(network.patterns[0].vars, 4);

        let fact = Triple::new(
            u("s"),
            u("has"),
            Node::functor("triple", vec![u("x"), u("y"), u("z")]),
        );
        assert_eq!(network.activations(&fact), vec![(0, 0)]);
    }

    #[test]
    fn test_join_variables_per_level() {
        let network = compile(vec![Rule::forward("r")
            .when(v("a"), u("knows"), v("b"))
            .when(v("b"), u("knows"), v("c"))
            .when(v("c"), u("likes"), v("a"))
            .then(v("a"), u("q"), v("c"))
            .build()])
        .unwrap();
        let node = &network.rules[0];
        assert_eq!(node.joins, vec![vec![], vec![1], vec![2, 0]]);

        let mut env = BindingVector::new(3);
        env.unify_triple(
            &node.patterns[2].1,
            &Triple::new(u("carol"), u("likes"), u("alice")),
        );
        assert_eq!(node.join_key(2, &env), vec![u("carol"), u("alice")]);
        assert!(node.join_key(0, &env).is_empty());
        assert!(node.join_key(3, &env).is_empty());
    }

    #[test]
    fn test_wildcard_predicate() {
        let network = compile(vec![Rule::forward("any")
            .when(v("s"), v("p"), u("target"))
            .then(v("s"), u("pointsAt"), u("target"))
            .build()])
        .unwrap();
        let t = Triple::new(u("a"), u("whatever"), u("target"));
        assert_eq!(network.activations(&t), vec![(0, 0)]);
        let miss = Triple::new(u("a"), u("whatever"), u("other"));
        assert!(network.activations(&miss).is_empty());
    }

    #[test]
    fn test_non_monotonic_detection() {
        let network = compile(vec![Rule::forward("default")
            .when(v("x"), u("type"), u("Bird"))
            .when_call("noValue", vec![v("x"), u("flies"), u("false")])
            .then(v("x"), u("flies"), u("true"))
            .build()])
        .unwrap();
        assert!(!network.is_monotonic());
        assert!(network.rules[0].non_monotonic);
        assert!(!network.rules[0].destructive);

        let network = compile(vec![Rule::forward("consume")
            .when(v("x"), u("token"), v("t"))
            .then(v("x"), u("used"), v("t"))
            .then_call("remove", vec![Node::integer(0)])
            .build()])
        .unwrap();
        assert!(network.rules[0].destructive);
    }

    #[test]
    fn test_backward_rule_rejected() {
        let err = compile(vec![Rule::backward("b")
            .then(v("x"), u("p"), v("y"))
            .when(v("x"), u("q"), v("y"))
            .build()])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bindings_rebuilt_from_token() {
        let network = compile(vec![Rule::forward("r")
            .when(v("a"), u("knows"), v("b"))
            .when(v("b"), u("knows"), v("c"))
            .then(v("a"), u("knows2"), v("c"))
            .build()])
        .unwrap();
        let node = &network.rules[0];
        let token = vec![
            Triple::new(u("alice"), u("knows"), u("bob")),
            Triple::new(u("bob"), u("knows"), u("carol")),
        ];
        assert!(node.bindings(&token).is_ok());
        assert_eq!(node.matches(&token).len(), 2);

        let corrupt = vec![
            Triple::new(u("alice"), u("knows"), u("bob")),
            Triple::new(u("dave"), u("knows"), u("carol")),
        ];
        assert!(matches!(node.bindings(&corrupt), Err(Error::Invariant(_))));
        assert!(node.bindings(&token[..1]).is_err());
    }
}
