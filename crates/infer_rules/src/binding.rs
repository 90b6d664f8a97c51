//! Binding environments and unification
//!
//! A binding environment maps a rule's variable slots to terms. Each slot is
//! one of [`Slot::Unbound`], [`Slot::Ground`] or [`Slot::AliasOf`]; an alias
//! points at another slot and is followed until a ground term or an unbound
//! slot is reached. Binding never creates an alias cycle, and dereferencing
//! stops after visiting every slot once, so a corrupted chain reports failure
//! instead of looping.
//!
//! Two flavors are provided:
//! - [`BindingVector`]: a single environment, produced by [`unify`] and used
//!   by forward rule firing.
//! - [`BindingStack`]: an environment with `push`/`unwind`/`commit` for
//!   backtracking search in backward evaluation.

use std::collections::HashMap;

use infer_graph::{Functor, Node, Triple};

use crate::error::{Error, Result};

/// The content of one variable slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Unbound,
    Ground(Node),
    AliasOf(usize),
}

/// Read and write access to variable bindings, shared by both environment
/// flavors and exposed to builtins.
pub trait BindingEnvironment {
    /// Resolves a node against the environment.
    ///
    /// Variables are dereferenced through alias chains; the result is `None`
    /// if the variable is unbound. The wildcard always resolves to `None`.
    /// A functor resolves only if every argument does. Other nodes resolve to
    /// themselves.
    fn get_binding(&self, node: &Node) -> Option<Node>;

    /// Binds `var` to `value`.
    ///
    /// Binding an unbound variable sets it; binding an alias binds the aliased
    /// slot; binding an already bound variable succeeds only if the bound term
    /// unifies with `value`. When `var` is not a variable the call is a
    /// unification check between the two terms.
    fn bind(&mut self, var: &Node, value: &Node) -> bool;

    /// Produces a ground triple, replacing each unresolved variable with a
    /// fresh blank node (and binding it, so later clauses see the same node).
    fn instantiate(&mut self, pattern: &Triple) -> Triple;

    /// Substitutes bound variables, leaving unbound ones in place.
    fn partial_instantiate(&self, pattern: &Triple) -> Triple;
}

enum Deref<'a> {
    Ground(&'a Node),
    Unbound(usize),
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Slots(Vec<Slot>);

impl Slots {
    fn new(size: usize) -> Self {
        Slots(vec![Slot::Unbound; size])
    }

    fn deref(&self, mut index: usize) -> Option<Deref<'_>> {
        for _ in 0..=self.0.len() {
            match self.0.get(index)? {
                Slot::Unbound => return Some(Deref::Unbound(index)),
                Slot::Ground(node) => return Some(Deref::Ground(node)),
                Slot::AliasOf(next) => index = *next,
            }
        }
        None
    }

    fn resolve(&self, node: &Node) -> Option<Node> {
        match node {
            Node::Variable(v) => match self.deref(v.index)? {
                Deref::Ground(g) => self.resolve(g),
                Deref::Unbound(_) => None,
            },
            Node::Any => None,
            Node::Functor(f) => f
                .args
                .iter()
                .map(|a| self.resolve_arg(a))
                .collect::<Option<Vec<_>>>()
                .map(|args| Node::functor(f.name.clone(), args)),
            other => Some(other.clone()),
        }
    }

    /// Functor arguments never resolve to functors.
    fn resolve_arg(&self, node: &Node) -> Option<Node> {
        match node {
            Node::Variable(v) => match self.deref(v.index)? {
                Deref::Ground(g) if !g.is_functor() => Some(g.clone()),
                _ => None,
            },
            Node::Any | Node::Functor(_) => None,
            other => Some(other.clone()),
        }
    }

    fn bind_index(&mut self, index: usize, value: &Node) -> bool {
        let bound = match self.deref(index) {
            None => return false,
            Some(Deref::Ground(g)) => Err(g.clone()),
            Some(Deref::Unbound(target)) => Ok(target),
        };
        let target = match bound {
            Ok(target) => target,
            Err(g) => return self.unify(&g, value),
        };
        match value {
            Node::Variable(v) => {
                let slot = match self.deref(v.index) {
                    None => return false,
                    Some(Deref::Ground(g)) => Slot::Ground(g.clone()),
                    Some(Deref::Unbound(other)) if other == target => return true,
                    Some(Deref::Unbound(other)) => Slot::AliasOf(other),
                };
                self.0[target] = slot;
                true
            }
            Node::Any => true,
            other => {
                self.0[target] = Slot::Ground(other.clone());
                true
            }
        }
    }

    /// Unifies two terms, binding variables on either side. Not atomic:
    /// bindings made before a failure are left in place.
    fn unify(&mut self, a: &Node, b: &Node) -> bool {
        match (a, b) {
            (Node::Any, _) | (_, Node::Any) => true,
            (Node::Variable(v), other) => self.bind_index(v.index, other),
            (other, Node::Variable(v)) => self.bind_index(v.index, other),
            (Node::Functor(f), Node::Functor(g)) => {
                f.name == g.name
                    && f.args.len() == g.args.len()
                    && f.args.iter().zip(&g.args).all(|(x, y)| self.unify(x, y))
            }
            (Node::Functor(_), _) | (_, Node::Functor(_)) => false,
            (x, y) => x == y,
        }
    }

    fn unify_triple(&mut self, pattern: &Triple, fact: &Triple) -> bool {
        self.unify(&pattern.subject, &fact.subject)
            && self.unify(&pattern.predicate, &fact.predicate)
            && self.unify(&pattern.object, &fact.object)
    }

    fn bind_node(&mut self, var: &Node, value: &Node) -> bool {
        match var {
            Node::Variable(v) => self.bind_index(v.index, value),
            other => self.unify(other, value),
        }
    }

    fn instantiate_node(&mut self, node: &Node) -> Node {
        match node {
            Node::Variable(v) => self.resolve(node).unwrap_or_else(|| {
                let fresh = Node::blank();
                self.bind_index(v.index, &fresh);
                fresh
            }),
            Node::Any => Node::blank(),
            Node::Functor(f) => Node::functor(
                f.name.clone(),
                f.args.iter().map(|a| self.instantiate_node(a)).collect(),
            ),
            other => other.clone(),
        }
    }

    fn partial_node(&self, node: &Node) -> Node {
        match node {
            Node::Variable(_) => self.resolve(node).unwrap_or_else(|| node.clone()),
            Node::Functor(f) => Node::functor(
                f.name.clone(),
                f.args.iter().map(|a| self.partial_node(a)).collect(),
            ),
            other => other.clone(),
        }
    }
}

/// A fixed-size environment for one rule activation.
///
/// # Examples
///
/// ```
/// use infer_graph::Node;
/// use infer_rules::{BindingEnvironment, BindingVector};
///
/// let mut env = BindingVector::new(2);
/// let x = Node::var_at("x", 0);
/// let y = Node::var_at("y", 1);
///
/// assert!(env.bind(&x, &y));               // alias x -> y
/// assert!(env.bind(&y, &Node::uri("a")));  // ground y
/// assert_eq!(env.get_binding(&x), Some(Node::uri("a")));
///
/// // rebinding is a unification check, not an overwrite
/// assert!(env.bind(&x, &Node::uri("a")));
/// assert!(!env.bind(&x, &Node::uri("b")));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindingVector {
    slots: Slots,
}

impl BindingVector {
    /// Creates an environment with `size` unbound slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: Slots::new(size),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.0.is_empty()
    }

    /// The raw content of a slot.
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.0.get(index)
    }

    /// Binds a slot by index, reporting an out-of-range index as an error.
    pub fn try_bind(&mut self, index: usize, value: &Node) -> Result<bool> {
        if index >= self.len() {
            return Err(Error::Invariant(format!(
                "slot {} out of range for environment of size {}",
                index,
                self.len()
            )));
        }
        Ok(self.slots.bind_index(index, value))
    }

    /// Unifies a pattern with a triple, binding the pattern's variables.
    pub fn unify_triple(&mut self, pattern: &Triple, fact: &Triple) -> bool {
        self.slots.unify_triple(pattern, fact)
    }

    /// Resolved value of one slot, `None` where unbound or out of range.
    pub fn value(&self, index: usize) -> Option<Node> {
        self.slots.resolve(&Node::var_at("", index))
    }

    /// Resolved value of every slot, `None` where unbound.
    pub fn values(&self) -> Vec<Option<Node>> {
        (0..self.len()).map(|i| self.value(i)).collect()
    }
}

impl BindingEnvironment for BindingVector {
    fn get_binding(&self, node: &Node) -> Option<Node> {
        self.slots.resolve(node)
    }

    fn bind(&mut self, var: &Node, value: &Node) -> bool {
        self.slots.bind_node(var, value)
    }

    fn instantiate(&mut self, pattern: &Triple) -> Triple {
        Triple::new(
            self.slots.instantiate_node(&pattern.subject),
            self.slots.instantiate_node(&pattern.predicate),
            self.slots.instantiate_node(&pattern.object),
        )
    }

    fn partial_instantiate(&self, pattern: &Triple) -> Triple {
        pattern.map(|n| self.slots.partial_node(n))
    }
}

/// An environment with chronological save points for backtracking.
///
/// `push` saves the current bindings, `unwind` restores the last save point
/// and `commit` keeps the current bindings while discarding the save point.
#[derive(Debug, Clone, Default)]
pub struct BindingStack {
    current: Slots,
    saved: Vec<Slots>,
}

impl BindingStack {
    pub fn new(size: usize) -> Self {
        Self {
            current: Slots::new(size),
            saved: Vec::new(),
        }
    }

    /// Saves the current bindings.
    pub fn push(&mut self) {
        self.saved.push(self.current.clone());
    }

    /// Restores the bindings saved by the matching `push`.
    pub fn unwind(&mut self) -> Result<()> {
        self.current = self
            .saved
            .pop()
            .ok_or_else(|| Error::Invariant("unwind without matching push".into()))?;
        Ok(())
    }

    /// Drops the last save point, keeping the current bindings.
    pub fn commit(&mut self) -> Result<()> {
        self.saved
            .pop()
            .map(|_| ())
            .ok_or_else(|| Error::Invariant("commit without matching push".into()))
    }

    /// Number of open save points.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn unify_triple(&mut self, pattern: &Triple, fact: &Triple) -> bool {
        self.current.unify_triple(pattern, fact)
    }
}

impl From<BindingVector> for BindingStack {
    fn from(env: BindingVector) -> Self {
        Self {
            current: env.slots,
            saved: Vec::new(),
        }
    }
}

impl BindingEnvironment for BindingStack {
    fn get_binding(&self, node: &Node) -> Option<Node> {
        self.current.resolve(node)
    }

    fn bind(&mut self, var: &Node, value: &Node) -> bool {
        self.current.bind_node(var, value)
    }

    fn instantiate(&mut self, pattern: &Triple) -> Triple {
        Triple::new(
            self.current.instantiate_node(&pattern.subject),
            self.current.instantiate_node(&pattern.predicate),
            self.current.instantiate_node(&pattern.object),
        )
    }

    fn partial_instantiate(&self, pattern: &Triple) -> Triple {
        pattern.map(|n| self.current.partial_node(n))
    }
}

/// The result of unifying a goal with a rule head.
///
/// Goal and head variables live in separate namespaces; internally goal
/// variables occupy the slots after the head's `num_vars`.
#[derive(Debug, Clone)]
pub struct Unification {
    slots: Slots,
    head_len: usize,
}

impl Unification {
    /// The head-side environment, with aliases into the goal side collapsed
    /// onto head slots.
    pub fn head_env(&self) -> BindingVector {
        let mut out = Slots::new(self.head_len);
        let mut representative: HashMap<usize, usize> = HashMap::new();
        for i in 0..self.head_len {
            let var = Node::var_at("", i);
            out.0[i] = match self.slots.deref(i) {
                Some(Deref::Ground(_)) => match self.slots.resolve(&var) {
                    Some(value) => Slot::Ground(value),
                    None => Slot::Unbound,
                },
                Some(Deref::Unbound(end)) => match representative.get(&end) {
                    Some(&rep) => Slot::AliasOf(rep),
                    None => {
                        representative.insert(end, i);
                        Slot::Unbound
                    }
                },
                None => Slot::Unbound,
            };
        }
        BindingVector { slots: out }
    }

    /// Resolves a goal-side node.
    pub fn goal_binding(&self, node: &Node) -> Option<Node> {
        self.slots.resolve(&shift(node, self.head_len))
    }
}

fn shift(node: &Node, offset: usize) -> Node {
    match node {
        Node::Variable(v) => Node::var_at(v.name.clone(), v.index + offset),
        Node::Functor(f) => Node::Functor(Box::new(Functor::new(
            f.name.clone(),
            f.args.iter().map(|a| shift(a, offset)).collect(),
        ))),
        other => other.clone(),
    }
}

fn max_var(node: &Node) -> Option<usize> {
    match node {
        Node::Variable(v) => Some(v.index),
        Node::Functor(f) => f.args.iter().filter_map(max_var).max(),
        _ => None,
    }
}

/// Unifies a goal with a rule head, keeping both sides observable.
pub fn unify_full(goal: &Triple, head: &Triple, num_vars: usize) -> Option<Unification> {
    let goal_len = goal
        .nodes()
        .iter()
        .filter_map(|n| max_var(n))
        .max()
        .map_or(0, |m| m + 1);
    let mut slots = Slots::new(num_vars + goal_len);
    let goal = goal.map(|n| shift(n, num_vars));
    if !slots.unify_triple(head, &goal) {
        return None;
    }
    Some(Unification {
        slots,
        head_len: num_vars,
    })
}

/// Unifies a goal pattern with a rule head of `num_vars` variables and
/// returns the head-side environment, or `None` if they do not unify.
///
/// ```
/// use infer_graph::{Node, Triple};
/// use infer_rules::{unify, BindingEnvironment};
///
/// let goal = Triple::new(Node::uri("alice"), Node::uri("p"), Node::var_at("y", 0));
/// let head = Triple::new(Node::var_at("a", 0), Node::uri("p"), Node::var_at("a", 0));
///
/// let mut env = unify(&goal, &head, 1).unwrap();
/// assert_eq!(env.get_binding(&Node::var_at("a", 0)), Some(Node::uri("alice")));
/// assert_eq!(env.instantiate(&head).object, Node::uri("alice"));
/// ```
pub fn unify(goal: &Triple, head: &Triple, num_vars: usize) -> Option<BindingVector> {
    unify_full(goal, head, num_vars).map(|u| u.head_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, index: usize) -> Node {
        Node::var_at(name, index)
    }

    fn uri(name: &str) -> Node {
        Node::uri(name)
    }

    #[test]
    fn test_bind_unbound_then_check() {
        let mut env = BindingVector::new(1);
        assert!(env.bind(&var("x", 0), &uri("a")));
        assert!(env.bind(&var("x", 0), &uri("a")));
        assert!(!env.bind(&var("x", 0), &uri("b")));
        assert_eq!(env.get_binding(&var("x", 0)), Some(uri("a")));
    }

    #[test]
    fn test_alias_chain() {
        let mut env = BindingVector::new(3);
        assert!(env.bind(&var("a", 0), &var("b", 1)));
        assert!(env.bind(&var("b", 1), &var("c", 2)));
        assert_eq!(env.slot(0), Some(&Slot::AliasOf(1)));
        assert_eq!(env.get_binding(&var("a", 0)), None);

        assert!(env.bind(&var("a", 0), &uri("z")));
        assert_eq!(env.get_binding(&var("c", 2)), Some(uri("z")));
        assert_eq!(env.get_binding(&var("b", 1)), Some(uri("z")));
    }

    #[test]
    fn test_self_alias_is_noop() {
        let mut env = BindingVector::new(2);
        assert!(env.bind(&var("a", 0), &var("b", 1)));
        assert!(env.bind(&var("b", 1), &var("a", 0)));
        assert!(env.bind(&var("a", 0), &var("a", 0)));
        assert!(env.bind(&var("b", 1), &uri("v")));
        assert_eq!(env.get_binding(&var("a", 0)), Some(uri("v")));
    }

    #[test]
    fn test_alias_cycle_guard() {
        let mut env = BindingVector::new(2);
        env.slots.0[0] = Slot::AliasOf(1);
        env.slots.0[1] = Slot::AliasOf(0);
        assert_eq!(env.get_binding(&var("a", 0)), None);
        assert!(!env.bind(&var("a", 0), &uri("x")));
    }

    #[test]
    fn test_wildcard_never_binds() {
        let mut env = BindingVector::new(1);
        assert_eq!(env.get_binding(&Node::Any), None);
        assert!(env.bind(&var("x", 0), &Node::Any));
        assert_eq!(env.get_binding(&var("x", 0)), None);
    }

    #[test]
    fn test_functor_resolution_all_or_nothing() {
        let mut env = BindingVector::new(2);
        let f = Node::functor("pair", vec![var("a", 0), var("b", 1)]);
        env.bind(&var("a", 0), &uri("x"));
        assert_eq!(env.get_binding(&f), None);

        env.bind(&var("b", 1), &Node::integer(2));
        assert_eq!(
            env.get_binding(&f),
            Some(Node::functor("pair", vec![uri("x"), Node::integer(2)]))
        );
    }

    #[test]
    fn test_out_of_range() {
        let mut env = BindingVector::new(1);
        assert!(!env.bind(&var("x", 5), &uri("a")));
        assert!(matches!(
            env.try_bind(5, &uri("a")),
            Err(Error::Invariant(_))
        ));
        assert_eq!(env.try_bind(0, &uri("a")), Ok(true));
    }

    #[test]
    fn test_instantiate_fills_blanks_consistently() {
        let mut env = BindingVector::new(2);
        env.bind(&var("a", 0), &uri("alice"));
        let pattern = Triple::new(var("a", 0), uri("owns"), var("t", 1));
        let first = env.instantiate(&pattern);
        assert_eq!(first.subject, uri("alice"));
        assert!(first.object.is_blank());

        let again = env.instantiate(&Triple::new(var("t", 1), uri("type"), uri("Thing")));
        assert_eq!(again.subject, first.object);
    }

    #[test]
    fn test_partial_instantiate() {
        let mut env = BindingVector::new(2);
        env.bind(&var("a", 0), &uri("alice"));
        let pattern = Triple::new(var("a", 0), uri("knows"), var("b", 1));
        let partial = env.partial_instantiate(&pattern);
        assert_eq!(partial.subject, uri("alice"));
        assert_eq!(partial.object, var("b", 1));
    }

    #[test]
    fn test_unify_ground_roundtrip() {
        let goal = Triple::new(uri("a"), uri("p"), Node::integer(3));
        let mut env = unify(&goal, &goal, 0).unwrap();
        assert_eq!(env.instantiate(&goal), goal);
    }

    #[test]
    fn test_unify_ground_mismatch() {
        let goal = Triple::new(uri("a"), uri("p"), uri("b"));
        let head = Triple::new(uri("a"), uri("p"), uri("c"));
        assert!(unify(&goal, &head, 0).is_none());
    }

    #[test]
    fn test_unify_aliasing_goal_variables() {
        // goal (?X p ?Y) against head (?A p ?A)
        let goal = Triple::new(var("X", 0), uri("p"), var("Y", 1));
        let head = Triple::new(var("A", 0), uri("p"), var("A", 0));

        let u = unify_full(&goal, &head, 1).unwrap();
        assert_eq!(u.goal_binding(&var("X", 0)), None);

        // X and Y now share a binding: grounding A grounds both
        let mut slots = u.slots.clone();
        assert!(slots.bind_index(0, &uri("v")));
        let grounded = Unification {
            slots,
            head_len: 1,
        };
        assert_eq!(grounded.goal_binding(&var("X", 0)), Some(uri("v")));
        assert_eq!(grounded.goal_binding(&var("Y", 1)), Some(uri("v")));
    }

    #[test]
    fn test_unify_alias_propagates_supplied_value() {
        let goal = Triple::new(uri("alice"), uri("p"), var("Y", 0));
        let head = Triple::new(var("A", 0), uri("p"), var("A", 0));
        let u = unify_full(&goal, &head, 1).unwrap();
        assert_eq!(u.goal_binding(&var("Y", 0)), Some(uri("alice")));
        assert_eq!(
            u.head_env().get_binding(&var("A", 0)),
            Some(uri("alice"))
        );
    }

    #[test]
    fn test_unify_alias_conflict_fails() {
        let goal = Triple::new(uri("alice"), uri("p"), uri("bob"));
        let head = Triple::new(var("A", 0), uri("p"), var("A", 0));
        assert!(unify(&goal, &head, 1).is_none());
    }

    #[test]
    fn test_unify_head_aliases_preserved() {
        // goal (?X p ?X) against head (?A p ?B): A and B must end up aliased
        let goal = Triple::new(var("X", 0), uri("p"), var("X", 0));
        let head = Triple::new(var("A", 0), uri("p"), var("B", 1));
        let mut env = unify(&goal, &head, 2).unwrap();
        assert_eq!(env.slot(0), Some(&Slot::Unbound));
        assert_eq!(env.slot(1), Some(&Slot::AliasOf(0)));
        assert!(env.bind(&var("B", 1), &uri("z")));
        assert_eq!(env.get_binding(&var("A", 0)), Some(uri("z")));
    }

    #[test]
    fn test_unify_functors() {
        let goal = Triple::new(
            uri("s"),
            uri("p"),
            Node::functor("pair", vec![uri("a"), var("Y", 0)]),
        );
        let head = Triple::new(
            var("S", 0),
            uri("p"),
            Node::functor("pair", vec![var("X", 1), Node::integer(2)]),
        );
        let u = unify_full(&goal, &head, 2).unwrap();
        assert_eq!(u.goal_binding(&var("Y", 0)), Some(Node::integer(2)));
        let env = u.head_env();
        assert_eq!(env.get_binding(&var("X", 1)), Some(uri("a")));

        let other_name = Triple::new(
            var("S", 0),
            uri("p"),
            Node::functor("triple", vec![var("X", 1), Node::integer(2)]),
        );
        assert!(unify(&goal, &other_name, 2).is_none());

        let other_arity = Triple::new(
            var("S", 0),
            uri("p"),
            Node::functor("pair", vec![var("X", 1)]),
        );
        assert!(unify(&goal, &other_arity, 2).is_none());

        let not_functor = Triple::new(var("S", 0), uri("p"), uri("x"));
        assert!(unify(&goal, &not_functor, 2).is_none());
    }

    #[test]
    fn test_stack_push_unwind_commit() {
        let mut stack = BindingStack::new(2);
        stack.push();
        assert!(stack.bind(&var("a", 0), &uri("x")));
        assert_eq!(stack.depth(), 1);
        stack.unwind().unwrap();
        assert_eq!(stack.get_binding(&var("a", 0)), None);

        stack.push();
        assert!(stack.bind(&var("a", 0), &uri("y")));
        stack.commit().unwrap();
        assert_eq!(stack.get_binding(&var("a", 0)), Some(uri("y")));
        assert_eq!(stack.depth(), 0);

        assert!(matches!(stack.unwind(), Err(Error::Invariant(_))));
        assert!(stack.commit().is_err());
    }

    #[test]
    fn test_stack_from_vector() {
        let mut env = BindingVector::new(1);
        env.bind(&var("a", 0), &uri("x"));
        let stack = BindingStack::from(env);
        assert_eq!(stack.get_binding(&var("a", 0)), Some(uri("x")));
    }
}
