//! Rule definitions
//!
//! A rule is an ordered body of clauses (triple patterns or builtin calls)
//! and an ordered head of clauses (triple patterns to assert or builtin
//! actions to run). Rules are immutable once built; variable slot indexes
//! are assigned at construction by order of first occurrence.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use infer_graph::{Functor, Node, Triple, Var};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::binding::BindingEnvironment;
use crate::builtin::BuiltinRegistry;
use crate::error::{Error, Result};

/// One entry of a rule body or head.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClauseEntry {
    /// A triple pattern to match (body) or assert (head).
    Triple(Triple),
    /// A builtin call (body) or action (head).
    Functor(Functor),
}

impl ClauseEntry {
    /// Returns `true` if no variable or wildcard appears in the entry.
    pub fn is_ground(&self) -> bool {
        match self {
            ClauseEntry::Triple(t) => t.is_ground(),
            ClauseEntry::Functor(f) => f.is_ground(),
        }
    }

    /// Returns `true` if every position resolves to a ground term in `env`.
    pub fn is_ground_in(&self, env: &dyn BindingEnvironment) -> bool {
        match self {
            ClauseEntry::Triple(t) => t.nodes().iter().all(|n| env.get_binding(n).is_some()),
            ClauseEntry::Functor(f) => f.args.iter().all(|n| env.get_binding(n).is_some()),
        }
    }

    /// Renaming-insensitive comparison.
    pub fn same_as(&self, other: &ClauseEntry) -> bool {
        match (self, other) {
            (ClauseEntry::Triple(a), ClauseEntry::Triple(b)) => a.same_as(b),
            (ClauseEntry::Functor(a), ClauseEntry::Functor(b)) => a.same_as(b),
            _ => false,
        }
    }

    pub fn as_triple(&self) -> Option<&Triple> {
        match self {
            ClauseEntry::Triple(t) => Some(t),
            ClauseEntry::Functor(_) => None,
        }
    }

    pub fn as_functor(&self) -> Option<&Functor> {
        match self {
            ClauseEntry::Functor(f) => Some(f),
            ClauseEntry::Triple(_) => None,
        }
    }

    fn map_nodes(&self, f: &mut impl FnMut(&Node) -> Node) -> ClauseEntry {
        match self {
            ClauseEntry::Triple(t) => ClauseEntry::Triple(t.map(|n| f(n))),
            ClauseEntry::Functor(func) => ClauseEntry::Functor(Functor::new(
                func.name.clone(),
                func.args.iter().map(|n| f(n)).collect(),
            )),
        }
    }
}

impl fmt::Display for ClauseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseEntry::Triple(t) => write!(f, "{}", t),
            ClauseEntry::Functor(func) => write!(f, "{}", func),
        }
    }
}

/// Which evaluator runs a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// `body -> head`, run incrementally by the match network.
    Forward,
    /// `head <- body`, run on demand when a query matches the head.
    Backward,
}

/// An inference rule.
///
/// # Examples
///
/// ```
/// use infer_graph::Node;
/// use infer_rules::Rule;
///
/// let rule = Rule::forward("knows2")
///     .when(Node::var("a"), Node::uri("knows"), Node::var("b"))
///     .when(Node::var("b"), Node::uri("knows"), Node::var("c"))
///     .then(Node::var("a"), Node::uri("knows2"), Node::var("c"))
///     .build();
///
/// assert_eq!(rule.num_vars(), 3);
/// assert_eq!(
///     rule.to_string(),
///     "[knows2: (?a knows ?b), (?b knows ?c) -> (?a knows2 ?c)]"
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    name: Option<String>,
    body: Vec<ClauseEntry>,
    head: Vec<ClauseEntry>,
    num_vars: usize,
    direction: Direction,
}

impl Rule {
    /// Creates a rule, assigning variable slots by first occurrence (body
    /// first, then head). Variables with the same name share a slot.
    pub fn new(
        name: Option<String>,
        body: Vec<ClauseEntry>,
        head: Vec<ClauseEntry>,
        direction: Direction,
    ) -> Self {
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut renumber = |n: &Node| renumber_node(n, &mut slots);
        // Backward rules bind head variables first, from the goal.
        let (body, head) = match direction {
            Direction::Forward => {
                let body = body.iter().map(|c| c.map_nodes(&mut renumber)).collect();
                let head = head.iter().map(|c| c.map_nodes(&mut renumber)).collect();
                (body, head)
            }
            Direction::Backward => {
                let head: Vec<_> = head.iter().map(|c| c.map_nodes(&mut renumber)).collect();
                let body = body.iter().map(|c| c.map_nodes(&mut renumber)).collect();
                (body, head)
            }
        };
        Self {
            name,
            body,
            head,
            num_vars: slots.len(),
            direction,
        }
    }

    /// Starts building a forward rule.
    pub fn forward(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(Direction::Forward).name(name)
    }

    /// Starts building a backward rule.
    pub fn backward(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(Direction::Backward).name(name)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The rule name, or `"anon"` when unnamed.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anon")
    }

    pub fn body(&self) -> &[ClauseEntry] {
        &self.body
    }

    pub fn head(&self) -> &[ClauseEntry] {
        &self.head
    }

    /// Number of distinct variables, which is the binding environment size.
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_backward(&self) -> bool {
        self.direction == Direction::Backward
    }

    /// The same rule, evaluated by the other engine.
    pub fn with_direction(&self, direction: Direction) -> Rule {
        Rule::new(self.name.clone(), self.body.clone(), self.head.clone(), direction)
    }

    /// Iterates the triple patterns of the body with their body positions.
    pub fn body_patterns(&self) -> impl Iterator<Item = (usize, &Triple)> {
        self.body
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_triple().map(|t| (i, t)))
    }

    /// Iterates the builtin calls of the body with their body positions.
    pub fn body_calls(&self) -> impl Iterator<Item = (usize, &Functor)> {
        self.body
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_functor().map(|f| (i, f)))
    }

    /// Returns `true` if the rule has no triple patterns in its body.
    pub fn is_axiom(&self) -> bool {
        self.body_patterns().next().is_none()
    }

    /// Returns `true` if every clause is ground.
    pub fn is_ground(&self) -> bool {
        self.body.iter().chain(&self.head).all(ClauseEntry::is_ground)
    }

    /// Renaming-insensitive comparison, used to deduplicate rule sets.
    pub fn same_as(&self, other: &Rule) -> bool {
        self.direction == other.direction
            && self.body.len() == other.body.len()
            && self.head.len() == other.head.len()
            && self.body.iter().zip(&other.body).all(|(a, b)| a.same_as(b))
            && self.head.iter().zip(&other.head).all(|(a, b)| a.same_as(b))
    }

    /// Checks the rule against the builtins available to it.
    ///
    /// Unknown builtins in a forward body are allowed (they fail when
    /// invoked); everything else that cannot run is an error.
    pub fn validate(&self, registry: &BuiltinRegistry) -> Result<()> {
        let invalid = |reason: String| Error::InvalidRule {
            rule: self.label().to_string(),
            reason,
        };

        if self.head.is_empty() {
            return Err(invalid("rule has no head".into()));
        }

        for entry in self.body.iter().chain(&self.head) {
            let nested = match entry {
                ClauseEntry::Triple(t) => t
                    .nodes()
                    .iter()
                    .any(|n| n.as_functor().is_some_and(Functor::is_nested)),
                ClauseEntry::Functor(f) => f.is_nested(),
            };
            if nested {
                return Err(invalid(format!("functors may not nest: {}", entry)));
            }
        }

        for (_, call) in self.body_calls() {
            match registry.get(&call.name) {
                Some(builtin) => {
                    check_arity(builtin.arg_length(), call)?;
                    if self.is_backward() && !builtin.is_safe() {
                        return Err(Error::UnsafeBuiltin {
                            name: call.name.clone(),
                            rule: self.label().to_string(),
                        });
                    }
                }
                None if self.is_backward() => {
                    return Err(Error::UnknownBuiltin {
                        name: call.name.clone(),
                        rule: self.label().to_string(),
                    });
                }
                None => warn!(
                    "rule {} calls unregistered builtin {}; the clause will fail",
                    self.label(),
                    call.name
                ),
            }
        }

        for entry in &self.head {
            if let ClauseEntry::Functor(call) = entry {
                if self.is_backward() {
                    return Err(invalid(format!("backward head cannot run {}", call)));
                }
                let builtin = registry.get(&call.name).ok_or_else(|| Error::UnknownBuiltin {
                    name: call.name.clone(),
                    rule: self.label().to_string(),
                })?;
                check_arity(builtin.arg_length(), call)?;
            }
        }

        if self.is_backward() && self.head.len() != 1 {
            return Err(invalid("backward rules have exactly one head triple".into()));
        }

        Ok(())
    }
}

fn check_arity(expected: Option<usize>, call: &Functor) -> Result<()> {
    match expected {
        Some(n) if n != call.arity() => Err(Error::ArityMismatch {
            builtin: call.name.clone(),
            expected: n,
            found: call.arity(),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn renumber_node(node: &Node, slots: &mut HashMap<String, usize>) -> Node {
    match node {
        Node::Variable(v) => {
            let next = slots.len();
            let index = *slots.entry(v.name.clone()).or_insert(next);
            Node::Variable(Var {
                name: v.name.clone(),
                index,
            })
        }
        Node::Functor(f) => Node::Functor(Box::new(Functor::new(
            f.name.clone(),
            f.args.iter().map(|a| renumber_node(a, slots)).collect(),
        ))),
        other => other.clone(),
    }
}

/// Structural equality: two rules that differ only by variable names are not equal.
impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.direction == other.direction && self.body == other.body && self.head == other.head
    }
}

impl Eq for Rule {}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, entries: &[ClauseEntry]) -> fmt::Result {
            for (i, e) in entries.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", e)?;
            }
            Ok(())
        }

        write!(f, "[")?;
        if let Some(name) = &self.name {
            write!(f, "{}: ", name)?;
        }
        match self.direction {
            Direction::Forward => {
                list(f, &self.body)?;
                write!(f, " -> ")?;
                list(f, &self.head)?;
            }
            Direction::Backward => {
                list(f, &self.head)?;
                write!(f, " <- ")?;
                list(f, &self.body)?;
            }
        }
        write!(f, "]")
    }
}

/// Builder for creating rules fluently.
pub struct RuleBuilder {
    name: Option<String>,
    body: Vec<ClauseEntry>,
    head: Vec<ClauseEntry>,
    direction: Direction,
}

impl RuleBuilder {
    pub fn new(direction: Direction) -> Self {
        Self {
            name: None,
            body: Vec::new(),
            head: Vec::new(),
            direction,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a body triple pattern.
    pub fn when(mut self, subject: Node, predicate: Node, object: Node) -> Self {
        self.body
            .push(ClauseEntry::Triple(Triple::new(subject, predicate, object)));
        self
    }

    /// Adds a body builtin call.
    pub fn when_call(mut self, name: impl Into<String>, args: Vec<Node>) -> Self {
        self.body.push(ClauseEntry::Functor(Functor::new(name, args)));
        self
    }

    /// Adds a head triple.
    pub fn then(mut self, subject: Node, predicate: Node, object: Node) -> Self {
        self.head
            .push(ClauseEntry::Triple(Triple::new(subject, predicate, object)));
        self
    }

    /// Adds a head action.
    pub fn then_call(mut self, name: impl Into<String>, args: Vec<Node>) -> Self {
        self.head.push(ClauseEntry::Functor(Functor::new(name, args)));
        self
    }

    pub fn build(self) -> Rule {
        Rule::new(self.name, self.body, self.head, self.direction)
    }
}

/// An ordered, duplicate-free collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// Name of the rule set.
    pub name: String,
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// Creates a new, empty `RuleSet`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Adds a rule. Returns `false` if a rule that is the same up to
    /// variable renaming is already present.
    pub fn add(&mut self, rule: Rule) -> bool {
        if self.rules.iter().any(|r| r.same_as(&rule)) {
            return false;
        }
        self.rules.push(Arc::new(rule));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    /// Rules evaluated by the given engine, in declaration order.
    pub fn by_direction(&self, direction: Direction) -> Vec<Arc<Rule>> {
        self.rules
            .iter()
            .filter(|r| r.direction() == direction)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = RuleSet::new("default");
        for rule in iter {
            set.add(rule);
        }
        set
    }
}
