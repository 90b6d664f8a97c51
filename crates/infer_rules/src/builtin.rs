//! Builtin dispatch
//!
//! Builtins are procedural predicates (in rule bodies) and actions (in rule
//! heads). They are registered by name in a [`BuiltinRegistry`] that is
//! passed explicitly to the reasoner; there is no process-wide registry.
//!
//! A builtin receives its arguments already resolved against the current
//! binding environment: a bound variable arrives as its value, an unbound
//! variable arrives as the variable node itself so the builtin can bind it
//! through the [`RuleContext`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use infer_graph::{Functor, Node, Triple, TriplePattern};
use log::warn;

use crate::clause::Rule;

/// Namespace under which default builtins are published.
pub const BUILTIN_NAMESPACE: &str = "http://infer.rules/builtin#";

/// What a builtin can see and do while it runs.
pub trait RuleContext {
    /// Resolves a node against the current bindings.
    fn get_binding(&self, node: &Node) -> Option<Node>;

    /// Binds a variable, or checks a ground term for unification.
    fn bind(&mut self, var: &Node, value: &Node) -> bool;

    /// The rule being evaluated.
    fn rule(&self) -> &Rule;

    /// Returns `true` if the triple is visible in the inference graph.
    fn contains(&self, triple: &Triple) -> bool;

    /// Triples in the inference graph matching the pattern.
    fn find(&self, pattern: &TriplePattern) -> Vec<Triple>;

    /// The triple matched by the body clause at `position`, if that clause
    /// is a triple pattern.
    fn matched(&self, position: usize) -> Option<&Triple>;

    /// Removes a triple, notifying the network.
    fn remove(&mut self, triple: &Triple);

    /// Removes a triple without notifying the network.
    fn drop_silently(&mut self, triple: &Triple);

    /// Hides a predicate from query results.
    fn hide(&mut self, predicate: &Node);

    /// Returns `true` during re-checks and goal-directed search, where side
    /// effects must not happen.
    fn is_speculative(&self) -> bool;
}

/// A procedural predicate or action callable from a rule.
pub trait Builtin: Send + Sync {
    /// Short name, as written in rules.
    fn name(&self) -> &str;

    /// Full URI of the builtin.
    fn uri(&self) -> String {
        format!("{}{}", BUILTIN_NAMESPACE, self.name())
    }

    /// Expected number of arguments; `None` for variadic builtins.
    fn arg_length(&self) -> Option<usize> {
        None
    }

    /// Safe builtins have no side effects and may run speculatively.
    fn is_safe(&self) -> bool {
        true
    }

    /// Monotonic builtins never change their answer when triples are added.
    fn is_monotonic(&self) -> bool {
        true
    }

    /// Evaluates the builtin as a body clause.
    fn body_call(&self, args: &[Node], length: usize, ctx: &mut dyn RuleContext) -> bool;

    /// Runs the builtin as a head action. Defaults to the body behavior.
    fn head_action(&self, args: &[Node], length: usize, ctx: &mut dyn RuleContext) {
        self.body_call(args, length, ctx);
    }
}

impl fmt::Debug for dyn Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name())
    }
}

/// Builtins available to a reasoner, looked up by name or URI.
///
/// # Examples
///
/// ```
/// use infer_rules::BuiltinRegistry;
///
/// let registry = BuiltinRegistry::with_defaults();
/// assert!(registry.get("sum").is_some());
/// assert!(registry
///     .get("http://infer.rules/builtin#sum")
///     .is_some());
/// assert!(registry.get("frobnicate").is_none());
/// ```
#[derive(Default, Clone)]
pub struct BuiltinRegistry {
    by_name: HashMap<String, Arc<dyn Builtin>>,
    by_uri: HashMap<String, Arc<dyn Builtin>>,
}

impl BuiltinRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the standard builtin set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_defaults(&mut registry);
        registry
    }

    /// Registers a builtin, replacing any previous one with the same name.
    pub fn register(&mut self, builtin: Arc<dyn Builtin>) {
        self.by_uri.insert(builtin.uri(), Arc::clone(&builtin));
        self.by_name.insert(builtin.name().to_string(), builtin);
    }

    /// Looks a builtin up by short name, then by URI.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Builtin>> {
        self.by_name.get(name).or_else(|| self.by_uri.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered short names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("builtins", &self.names())
            .finish()
    }
}

/// A functor clause bound to its builtin on first use.
#[derive(Debug)]
pub struct BuiltinCall {
    functor: Functor,
    resolved: OnceLock<Option<Arc<dyn Builtin>>>,
}

impl BuiltinCall {
    pub fn new(functor: Functor) -> Self {
        Self {
            functor,
            resolved: OnceLock::new(),
        }
    }

    pub fn functor(&self) -> &Functor {
        &self.functor
    }

    /// Resolves the builtin, logging once if it is not registered.
    pub fn resolve(&self, registry: &BuiltinRegistry) -> Option<&Arc<dyn Builtin>> {
        self.resolved
            .get_or_init(|| {
                let found = registry.get(&self.functor.name).cloned();
                if found.is_none() {
                    warn!("no builtin registered under {}", self.functor.name);
                }
                found
            })
            .as_ref()
    }

    /// The call's arguments, resolved against the context.
    pub fn args(&self, ctx: &dyn RuleContext) -> Vec<Node> {
        self.functor
            .args
            .iter()
            .map(|a| ctx.get_binding(a).unwrap_or_else(|| a.clone()))
            .collect()
    }

    /// Evaluates the call as a body clause. Unregistered builtins fail.
    pub fn call(&self, registry: &BuiltinRegistry, ctx: &mut dyn RuleContext) -> bool {
        let Some(builtin) = self.resolve(registry) else {
            return false;
        };
        let args = self.args(ctx);
        builtin.body_call(&args, args.len(), ctx)
    }

    /// Runs the call as a head action.
    pub fn act(&self, registry: &BuiltinRegistry, ctx: &mut dyn RuleContext) {
        if let Some(builtin) = self.resolve(registry) {
            let args = self.args(ctx);
            builtin.head_action(&args, args.len(), ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always;

    impl Builtin for Always {
        fn name(&self) -> &str {
            "always"
        }

        fn arg_length(&self) -> Option<usize> {
            Some(0)
        }

        fn body_call(&self, _args: &[Node], _length: usize, _ctx: &mut dyn RuleContext) -> bool {
            true
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = BuiltinRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Always));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("always"));
        assert!(registry.contains(&format!("{}always", BUILTIN_NAMESPACE)));
        assert_eq!(registry.get("always").unwrap().arg_length(), Some(0));
    }

    #[test]
    fn test_default_registry() {
        let registry = BuiltinRegistry::with_defaults();
        for name in ["equal", "sum", "noValue", "remove", "regex", "listContains"] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(!registry.get("remove").unwrap().is_safe());
        assert!(!registry.get("noValue").unwrap().is_monotonic());
        assert!(registry.get("noValue").unwrap().is_safe());
    }

    #[test]
    fn test_call_resolves_once() {
        let call = BuiltinCall::new(Functor::new("missing", vec![]));
        let registry = BuiltinRegistry::new();
        assert!(call.resolve(&registry).is_none());

        // once resolved, a call keeps its implementation even when asked
        // against a registry that lacks it
        let mut later = BuiltinRegistry::new();
        later.register(Arc::new(Always));
        let call = BuiltinCall::new(Functor::new("always", vec![]));
        assert!(call.resolve(&later).is_some());
        assert!(call.resolve(&registry).is_some());
    }
}
