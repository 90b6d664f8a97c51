//! The reasoner and the inference graphs it produces.
//!
//! A [`Reasoner`] owns a rule set, compiled once for its configured
//! [`InferenceMode`]. Binding it to a base graph yields an [`InfGraph`]:
//! the base plus everything the rules conclude, kept up to date as triples
//! are added or deleted through it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use infer_graph::{Graph, MemoryGraph, Node, Triple, TriplePattern};
use log::{debug, info};
use serde::Serialize;

use crate::backward::BackwardEngine;
use crate::builtin::BuiltinRegistry;
use crate::clause::{Direction, Rule, RuleSet};
use crate::config::{InferenceMode, ReasonerConfig};
use crate::derivation::{Derivation, DerivationLog};
use crate::error::{Error, Result};
use crate::rete::{EngineState, EngineStats, Network, ReteEngine};
use crate::view::UnionView;

/// A compiled rule set, ready to be bound to graphs.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use infer_graph::{MemoryGraph, Node, Triple, TriplePattern};
/// use infer_rules::{BuiltinRegistry, Reasoner, ReasonerConfig, Rule, RuleSet};
///
/// # fn main() -> infer_rules::Result<()> {
/// let rules: RuleSet = vec![Rule::forward("knows2")
///     .when(Node::var("a"), Node::uri("knows"), Node::var("b"))
///     .when(Node::var("b"), Node::uri("knows"), Node::var("c"))
///     .then(Node::var("a"), Node::uri("knows2"), Node::var("c"))
///     .build()]
/// .into_iter()
/// .collect();
///
/// let reasoner = Reasoner::new(rules, Arc::new(BuiltinRegistry::with_defaults()), ReasonerConfig::default())?;
/// let mut graph = reasoner.bind(MemoryGraph::new())?;
/// graph.add(Triple::new(Node::uri("alice"), Node::uri("knows"), Node::uri("bob")))?;
/// graph.add(Triple::new(Node::uri("bob"), Node::uri("knows"), Node::uri("carol")))?;
///
/// let found = graph.find(&TriplePattern::predicate(Node::uri("knows2")))?;
/// assert_eq!(found, vec![Triple::new(Node::uri("alice"), Node::uri("knows2"), Node::uri("carol"))]);
/// # Ok(())
/// # }
/// ```
pub struct Reasoner {
    rules: RuleSet,
    registry: Arc<BuiltinRegistry>,
    config: ReasonerConfig,
    network: Arc<Network>,
    backward: Arc<BackwardEngine>,
}

impl Reasoner {
    /// Validates and compiles the rules for the configured mode.
    pub fn new(
        rules: RuleSet,
        registry: Arc<BuiltinRegistry>,
        config: ReasonerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (network, backward) = compile(&rules, &registry, &config)?;
        info!(
            "reasoner compiled {} rules ({} mode): {} forward, {} backward",
            rules.len(),
            config.mode,
            network.rule_count(),
            backward.rule_count()
        );
        Ok(Self {
            rules,
            registry,
            config,
            network,
            backward,
        })
    }

    /// A reasoner over the default builtins and configuration.
    pub fn with_rules(rules: RuleSet) -> Result<Self> {
        Self::new(
            rules,
            Arc::new(BuiltinRegistry::with_defaults()),
            ReasonerConfig::default(),
        )
    }

    /// Adds a rule and recompiles. Returns `false` if an equivalent rule is
    /// already present. Graphs bound earlier keep the rules they were bound
    /// with.
    pub fn add_rule(&mut self, rule: Rule) -> Result<bool> {
        let mut rules = self.rules.clone();
        if !rules.add(rule) {
            return Ok(false);
        }
        let (network, backward) = compile(&rules, &self.registry, &self.config)?;
        self.rules = rules;
        self.network = network;
        self.backward = backward;
        Ok(true)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BuiltinRegistry> {
        &self.registry
    }

    /// Binds the reasoner to a base graph and computes its closure.
    pub fn bind<G: Graph>(&self, base: G) -> Result<InfGraph<G>> {
        let mut engine = ReteEngine::new(Arc::clone(&self.network));
        engine.set_derivation_logging(self.config.derivation_logging);
        engine.set_trace_firings(self.config.trace_firings);
        engine.set_max_recheck_rounds(self.config.max_recheck_rounds);

        let mut graph = InfGraph {
            base,
            engine,
            backward: Arc::clone(&self.backward),
            mode: self.config.mode,
        };
        graph.engine.initialize(&mut graph.base)?;
        debug!(
            "bound reasoner to {} base triples, {} deductions",
            graph.base.len(),
            graph.engine.deductions().len()
        );
        Ok(graph)
    }
}

impl fmt::Debug for Reasoner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reasoner")
            .field("rules", &self.rules.len())
            .field("config", &self.config)
            .finish()
    }
}

fn compile(
    rules: &RuleSet,
    registry: &Arc<BuiltinRegistry>,
    config: &ReasonerConfig,
) -> Result<(Arc<Network>, Arc<BackwardEngine>)> {
    let (forward, backward): (Vec<Arc<Rule>>, Vec<Arc<Rule>>) = match config.mode {
        InferenceMode::Forward => {
            if let Some(rule) = rules.iter().find(|r| r.is_backward()) {
                return Err(Error::Config(format!(
                    "backward rule {} in a forward-only reasoner",
                    rule.label()
                )));
            }
            (rules.iter().cloned().collect(), Vec::new())
        }
        InferenceMode::Backward => {
            let converted = rules
                .iter()
                .map(|r| match r.direction() {
                    Direction::Backward => Arc::clone(r),
                    Direction::Forward => Arc::new(r.with_direction(Direction::Backward)),
                })
                .collect();
            (Vec::new(), converted)
        }
        InferenceMode::Hybrid => (
            rules.by_direction(Direction::Forward),
            rules.by_direction(Direction::Backward),
        ),
    };
    let network = Network::compile(&forward, Arc::clone(registry))?;
    let backward = BackwardEngine::new(&backward, Arc::clone(registry))?
        .with_max_depth(config.max_backward_depth);
    Ok((Arc::new(network), Arc::new(backward)))
}

/// Counters for an inference graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfStats {
    pub mode: InferenceMode,
    pub base_triples: usize,
    pub deductions: usize,
    /// Conclusions with at least one recorded derivation.
    pub derivations: usize,
    pub backward_rules: usize,
    pub state: EngineState,
    pub engine: EngineStats,
}

/// A base graph together with the conclusions of a rule set.
pub struct InfGraph<G> {
    base: G,
    engine: ReteEngine,
    backward: Arc<BackwardEngine>,
    mode: InferenceMode,
}

impl<G: Graph> InfGraph<G> {
    /// Adds a triple to the base graph; its consequences are derived before
    /// the call returns.
    pub fn add(&mut self, triple: Triple) -> Result<bool> {
        self.engine.add(&mut self.base, triple)
    }

    /// Deletes a triple and withdraws the conclusions that depended on it.
    pub fn delete(&mut self, triple: &Triple) -> Result<bool> {
        self.engine.delete(&mut self.base, triple)
    }

    /// Triples matching the pattern: base triples, forward deductions and
    /// backward answers, without duplicates. Triples whose predicate a rule
    /// has hidden are left out.
    pub fn find(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
        self.ensure_open()?;
        let view = self.view();
        let mut found: IndexSet<Triple> = view.find(pattern)?.into_iter().collect();
        if !self.backward.is_empty() {
            found.extend(self.backward.solve(&goal(pattern), view)?);
        }
        Ok(found
            .into_iter()
            .filter(|t| !self.engine.is_hidden(t))
            .collect())
    }

    pub fn contains(&self, triple: &Triple) -> Result<bool> {
        Ok(self
            .find(&TriplePattern::from_triple(triple))?
            .iter()
            .any(|t| t == triple))
    }

    /// Recorded derivations of a triple. Empty for base triples, and for
    /// every triple while derivation logging is off.
    pub fn get_derivation(&self, triple: &Triple) -> &[Derivation] {
        self.engine.derivations().get(triple)
    }

    pub fn derivations(&self) -> &DerivationLog {
        self.engine.derivations()
    }

    /// Writes the proof tree of a triple.
    pub fn print_trace(&self, triple: &Triple, out: &mut dyn fmt::Write) -> fmt::Result {
        self.engine.derivations().print_trace(triple, out)
    }

    /// The proof tree of a triple as text.
    pub fn explain(&self, triple: &Triple) -> String {
        self.engine.derivations().trace(triple)
    }

    /// Turns derivation recording on or off. Only firings after the call
    /// are recorded; turning it off discards what was recorded.
    pub fn set_derivation_logging(&mut self, enabled: bool) {
        self.engine.set_derivation_logging(enabled);
    }

    /// Replaces the base graph and recomputes the closure with the same
    /// compiled rules. Returns the previous base graph.
    pub fn rebind(&mut self, base: G) -> Result<G> {
        self.ensure_open()?;
        let previous = std::mem::replace(&mut self.base, base);
        self.engine.initialize(&mut self.base)?;
        info!(
            "rebound to {} base triples, {} deductions",
            self.base.len(),
            self.engine.deductions().len()
        );
        Ok(previous)
    }

    /// Recomputes the closure of the current base graph from scratch.
    pub fn reset(&mut self) -> Result<()> {
        self.engine.initialize(&mut self.base)
    }

    pub fn stats(&self) -> InfStats {
        InfStats {
            mode: self.mode,
            base_triples: self.base.len(),
            deductions: self.engine.deductions().len(),
            derivations: self.engine.derivations().len(),
            backward_rules: self.backward.rule_count(),
            state: self.engine.state(),
            engine: self.engine.stats().clone(),
        }
    }

    /// The forward conclusions, including those also present in the base.
    pub fn deductions(&self) -> &MemoryGraph {
        self.engine.deductions()
    }

    pub fn base(&self) -> &G {
        &self.base
    }

    /// Closes the graph and returns the base. Derived state is dropped.
    pub fn into_base(self) -> G {
        self.base
    }

    /// Discards derived state. Every later operation fails with
    /// [`Error::Closed`].
    pub fn close(&mut self) {
        self.engine.close();
    }

    pub fn is_closed(&self) -> bool {
        self.engine.state() == EngineState::Closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn view(&self) -> UnionView<'_> {
        UnionView::new(&self.base, self.engine.deductions())
    }
}

impl<G> fmt::Debug for InfGraph<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfGraph")
            .field("mode", &self.mode)
            .field("state", &self.engine.state())
            .field("deductions", &self.engine.deductions().len())
            .finish()
    }
}

/// A lookup pattern as a goal triple; open positions become wildcards.
fn goal(pattern: &TriplePattern) -> Triple {
    let term = |n: Option<&Node>| n.cloned().unwrap_or(Node::Any);
    Triple::new(
        term(pattern.subject.as_ref()),
        term(pattern.predicate.as_ref()),
        term(pattern.object.as_ref()),
    )
}
