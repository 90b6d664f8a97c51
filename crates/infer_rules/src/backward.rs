//! Goal-directed evaluation of backward rules
//!
//! Depth-first SLD resolution over the union of the base graph and the
//! deductions. A goal is answered from stored triples and from every
//! backward rule whose head unifies with it; body clauses are solved left to
//! right with a [`BindingStack`] save point per alternative.
//!
//! A goal that reappears (up to variable renaming) on its own proof path is
//! not expanded again. It is answered from stored triples plus the answers
//! tabled for it so far, and the query is repeated until the table stops
//! growing. Only safe builtins are run.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;
use infer_graph::{Triple, TriplePattern};
use log::{debug, trace, warn};

use crate::binding::{unify, unify_full, BindingEnvironment, BindingStack};
use crate::builtin::{BuiltinCall, BuiltinRegistry};
use crate::clause::{renumber_node, ClauseEntry, Rule};
use crate::context::EvalContext;
use crate::error::{Error, Result};
use crate::rete::canonical;
use crate::view::UnionView;

/// Default bound on the proof depth.
pub const DEFAULT_MAX_DEPTH: usize = 100;

enum BodyGoal {
    Pattern(Triple),
    Call(BuiltinCall),
}

struct CompiledRule {
    rule: Arc<Rule>,
    head: Triple,
    body: Vec<BodyGoal>,
}

/// Evaluator for backward rules.
pub struct BackwardEngine {
    rules: Vec<CompiledRule>,
    registry: Arc<BuiltinRegistry>,
    max_depth: usize,
}

impl BackwardEngine {
    /// Validates the rules and prepares them for evaluation.
    pub fn new(rules: &[Arc<Rule>], registry: Arc<BuiltinRegistry>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if !rule.is_backward() {
                return Err(Error::Config(format!(
                    "forward rule {} cannot be evaluated backward",
                    rule.label()
                )));
            }
            rule.validate(&registry)?;
            let head = match rule.head() {
                [ClauseEntry::Triple(head)] => head.clone(),
                _ => {
                    return Err(Error::InvalidRule {
                        rule: rule.label().to_string(),
                        reason: "backward rules have exactly one head triple".into(),
                    })
                }
            };
            let body = rule
                .body()
                .iter()
                .map(|entry| match entry {
                    ClauseEntry::Triple(t) => BodyGoal::Pattern(t.clone()),
                    ClauseEntry::Functor(f) => BodyGoal::Call(BuiltinCall::new(f.clone())),
                })
                .collect();
            compiled.push(CompiledRule {
                rule: Arc::clone(rule),
                head,
                body,
            });
        }
        debug!("prepared {} backward rules", compiled.len());
        Ok(Self {
            rules: compiled,
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        })
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every ground triple matching `goal` that is stored in `view` or
    /// provable by the backward rules, without duplicates.
    ///
    /// Returns [`Error::MaxDepthExceeded`] if a proof needs more than the
    /// configured depth.
    pub fn solve(&self, goal: &Triple, view: UnionView<'_>) -> Result<Vec<Triple>> {
        let mut names = HashMap::new();
        let goal = goal.map(|n| renumber_node(n, &mut names));
        let mut search = Search {
            engine: self,
            view,
            path: Vec::new(),
            table: HashMap::new(),
        };

        let mut rounds = 0;
        loop {
            let known = search.tabled();
            let answers = search.prove(&goal, 0)?;
            if search.tabled() == known {
                trace!("{} answered in {} rounds", goal, rounds + 1);
                return Ok(answers.into_iter().collect());
            }
            rounds += 1;
            if rounds > self.max_depth {
                return Err(Error::MaxDepthExceeded {
                    depth: self.max_depth,
                });
            }
        }
    }
}

struct Search<'a> {
    engine: &'a BackwardEngine,
    view: UnionView<'a>,
    /// Variant keys of the goals being expanded.
    path: Vec<Triple>,
    table: HashMap<Triple, IndexSet<Triple>>,
}

impl Search<'_> {
    fn tabled(&self) -> usize {
        self.table.values().map(IndexSet::len).sum()
    }

    fn prove(&mut self, goal: &Triple, depth: usize) -> Result<IndexSet<Triple>> {
        if depth > self.engine.max_depth {
            return Err(Error::MaxDepthExceeded {
                depth: self.engine.max_depth,
            });
        }

        let mut answers: IndexSet<Triple> = self
            .view
            .find(&TriplePattern::from_triple(goal))?
            .into_iter()
            .filter(|fact| instance_of(goal, fact))
            .collect();

        let key = canonical(goal);
        if self.path.contains(&key) {
            trace!("goal {} repeats on its proof path", goal);
            if let Some(known) = self.table.get(&key) {
                answers.extend(known.iter().filter(|t| instance_of(goal, t)).cloned());
            }
            return Ok(answers);
        }

        self.path.push(key.clone());
        let engine = self.engine;
        for compiled in &engine.rules {
            let Some(env) = unify(goal, &compiled.head, compiled.rule.num_vars()) else {
                continue;
            };
            trace!("expanding {} with {}", goal, compiled.rule.label());
            let mut stack = BindingStack::from(env);
            let mut matches = vec![None; compiled.body.len()];
            self.solve_body(compiled, 0, &mut stack, &mut matches, depth, &mut answers)?;
        }
        self.path.pop();

        self.table
            .entry(key)
            .or_default()
            .extend(answers.iter().cloned());
        Ok(answers)
    }

    fn solve_body(
        &mut self,
        compiled: &CompiledRule,
        index: usize,
        stack: &mut BindingStack,
        matches: &mut [Option<Triple>],
        depth: usize,
        answers: &mut IndexSet<Triple>,
    ) -> Result<()> {
        let Some(goal) = compiled.body.get(index) else {
            let answer = stack.partial_instantiate(&compiled.head);
            if answer.is_ground() {
                answers.insert(answer);
            } else {
                trace!("{} leaves {} unbound", compiled.rule.label(), answer);
            }
            return Ok(());
        };

        match goal {
            BodyGoal::Pattern(pattern) => {
                let subgoal = stack.partial_instantiate(pattern);
                for fact in self.prove(&subgoal, depth + 1)? {
                    stack.push();
                    if stack.unify_triple(pattern, &fact) {
                        matches[index] = Some(fact);
                        self.solve_body(compiled, index + 1, stack, matches, depth, answers)?;
                    }
                    stack.unwind()?;
                }
                matches[index] = None;
            }
            BodyGoal::Call(call) => {
                let registry = &self.engine.registry;
                if let Some(builtin) = call.resolve(registry) {
                    if !builtin.is_safe() {
                        warn!(
                            "{} is not safe for backward evaluation in rule {}",
                            builtin.name(),
                            compiled.rule.label()
                        );
                        return Ok(());
                    }
                }
                stack.push();
                let holds = {
                    let mut ctx =
                        EvalContext::new(&mut *stack, &compiled.rule, &*matches, self.view, true);
                    call.call(registry, &mut ctx)
                };
                if holds {
                    self.solve_body(compiled, index + 1, stack, matches, depth, answers)?;
                }
                stack.unwind()?;
            }
        }
        Ok(())
    }
}

/// `true` if the ground `fact` is an instance of `goal`.
fn instance_of(goal: &Triple, fact: &Triple) -> bool {
    unify_full(goal, fact, 0).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_graph::{Graph, MemoryGraph, Node};

    fn u(name: &str) -> Node {
        Node::uri(name)
    }

    fn v(name: &str) -> Node {
        Node::var(name)
    }

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(u(s), u(p), u(o))
    }

    fn engine(rules: Vec<Rule>) -> BackwardEngine {
        let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        BackwardEngine::new(&rules, Arc::new(BuiltinRegistry::with_defaults())).unwrap()
    }

    fn ancestor_rules() -> Vec<Rule> {
        vec![
            Rule::backward("parent")
                .then(v("x"), u("ancestor"), v("y"))
                .when(v("x"), u("parent"), v("y"))
                .build(),
            Rule::backward("step")
                .then(v("x"), u("ancestor"), v("z"))
                .when(v("x"), u("parent"), v("y"))
                .when(v("y"), u("ancestor"), v("z"))
                .build(),
        ]
    }

    fn family() -> MemoryGraph {
        MemoryGraph::from_triples(vec![
            t("ann", "parent", "bob"),
            t("bob", "parent", "cid"),
            t("cid", "parent", "dee"),
        ])
        .unwrap()
    }

    #[test]
    fn test_bound_subject() {
        let base = family();
        let derived = MemoryGraph::new();
        let engine = engine(ancestor_rules());

        let goal = Triple::new(u("ann"), u("ancestor"), v("who"));
        let mut answers = engine.solve(&goal, UnionView::new(&base, &derived)).unwrap();
        answers.sort_by_key(|t| t.to_string());
        assert_eq!(
            answers,
            vec![
                t("ann", "ancestor", "bob"),
                t("ann", "ancestor", "cid"),
                t("ann", "ancestor", "dee"),
            ]
        );
    }

    #[test]
    fn test_open_recursive_goal_is_complete() {
        let base = family();
        let derived = MemoryGraph::new();
        let engine = engine(ancestor_rules());

        let goal = Triple::new(v("a"), u("ancestor"), v("b"));
        let answers = engine.solve(&goal, UnionView::new(&base, &derived)).unwrap();
        assert_eq!(answers.len(), 6);
        assert!(answers.contains(&t("ann", "ancestor", "dee")));
    }

    #[test]
    fn test_left_recursion_terminates() {
        let base = MemoryGraph::from_triples(vec![t("a", "edge", "b"), t("b", "edge", "a")]).unwrap();
        let derived = MemoryGraph::new();
        let engine = engine(vec![
            Rule::backward("base")
                .then(v("x"), u("path"), v("y"))
                .when(v("x"), u("edge"), v("y"))
                .build(),
            Rule::backward("left")
                .then(v("x"), u("path"), v("z"))
                .when(v("x"), u("path"), v("y"))
                .when(v("y"), u("edge"), v("z"))
                .build(),
        ]);

        let goal = Triple::new(u("a"), u("path"), v("to"));
        let answers = engine.solve(&goal, UnionView::new(&base, &derived)).unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers.contains(&t("a", "path", "a")));
    }

    #[test]
    fn test_builtin_filters_answers() {
        let base = MemoryGraph::from_triples(vec![
            Triple::new(u("ann"), u("age"), Node::integer(30)),
            Triple::new(u("kid"), u("age"), Node::integer(9)),
        ])
        .unwrap();
        let derived = MemoryGraph::new();
        let engine = engine(vec![Rule::backward("adult")
            .then(v("x"), u("type"), u("Adult"))
            .when(v("x"), u("age"), v("a"))
            .when_call("ge", vec![v("a"), Node::integer(18)])
            .build()]);

        let goal = Triple::new(v("who"), u("type"), u("Adult"));
        let answers = engine.solve(&goal, UnionView::new(&base, &derived)).unwrap();
        assert_eq!(answers, vec![t("ann", "type", "Adult")]);
    }

    #[test]
    fn test_depth_bound() {
        let base = MemoryGraph::from_triples(vec![Triple::new(
            u("c"),
            u("count"),
            Node::integer(0),
        )])
        .unwrap();
        let derived = MemoryGraph::new();
        let engine = engine(vec![Rule::backward("succ")
            .then(u("c"), u("count"), v("n"))
            .when(u("c"), u("count"), v("m"))
            .when_call("addOne", vec![v("m"), v("n")])
            .build()])
        .with_max_depth(5);

        let goal = Triple::new(u("c"), u("count"), v("n"));
        let err = engine
            .solve(&goal, UnionView::new(&base, &derived))
            .unwrap_err();
        assert_eq!(err, Error::MaxDepthExceeded { depth: 5 });
    }

    #[test]
    fn test_forward_rule_rejected() {
        let rules = vec![Arc::new(
            Rule::forward("f")
                .when(v("x"), u("p"), v("y"))
                .then(v("y"), u("q"), v("x"))
                .build(),
        )];
        let result = BackwardEngine::new(&rules, Arc::new(BuiltinRegistry::with_defaults()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_answers_are_deduplicated() {
        let mut base = family();
        base.add(t("ann", "ancestor", "bob")).unwrap();
        let derived = MemoryGraph::new();
        let engine = engine(ancestor_rules());

        let goal = t("ann", "ancestor", "bob");
        let answers = engine.solve(&goal, UnionView::new(&base, &derived)).unwrap();
        assert_eq!(answers, vec![t("ann", "ancestor", "bob")]);
    }
}
