//! Incremental forward chaining
//!
//! The engine keeps, for every compiled rule, a tree of tokens: a token at
//! level `n` extends a token at level `n - 1` with one more matched triple.
//! A parent holds each triple at most once, so a token combination is
//! stored (and fires) at most once however often its triples are announced.
//! Each level is indexed by the join key the next level looks it up with,
//! and every token is indexed by its own triple for retraction.
//!
//! All work runs through two queues: graph events (`Add`/`Delete`) and the
//! conflict queue of complete tokens waiting to fire. Events are drained
//! before anything fires; activations fire in arrival order, with ties from
//! a single event broken by rule declaration order.
//!
//! Truth maintenance keeps the set of firings supporting each conclusion.
//! A conclusion is withdrawn when its last supporting firing is retracted.
//! A conclusion that loses some but not all support is checked once the
//! queues drain: it stays only if one of its remaining firings still rests
//! on base triples, which retracts conclusions that only support each other
//! through a cycle.

mod network;

pub use network::Network;
pub(crate) use network::canonical;

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use infer_graph::{Graph, MemoryGraph, Node, Triple, TriplePattern};
use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::binding::{BindingEnvironment, BindingVector};
use crate::context::EvalContext;
use crate::derivation::{Derivation, DerivationLog};
use crate::error::{Error, Result};
use crate::view::UnionView;
use network::{HeadEntry, RuleNode};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// No pending work.
    Idle,
    /// Draining graph events.
    Propagating,
    /// Running a rule activation.
    Firing,
    /// Torn down; every operation fails.
    Closed,
}

/// Counters describing engine activity since the last (re)bind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Rules compiled into the network.
    pub rules: usize,
    /// Distinct pattern nodes.
    pub pattern_nodes: usize,
    /// Graph events propagated.
    pub events: usize,
    /// Successful firings.
    pub firings: usize,
    /// Activations whose builtin clauses failed.
    pub blocked: usize,
    /// Firings withdrawn after a supporting triple went away.
    pub retractions: usize,
    /// Conclusions checked after losing part of their support.
    pub support_checks: usize,
    /// Conclusions withdrawn because their remaining support was circular.
    pub unfounded: usize,
    /// Non-monotonic re-check passes.
    pub rechecks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Add(Triple),
    Delete(Triple),
}

type TokenId = usize;

#[derive(Debug, Clone)]
enum Firing {
    /// Waiting in the conflict queue.
    Pending,
    /// A builtin clause failed.
    Blocked,
    Fired {
        conclusions: Vec<Triple>,
        /// Predicates this firing hid.
        hidden: Vec<Node>,
        /// Conclusions of destructive rules are kept when the token goes away.
        committed: bool,
    },
}

#[derive(Debug)]
struct Token {
    parent: Option<TokenId>,
    triple: Triple,
    level: usize,
    env: BindingVector,
    /// Index key at this level: the values the next level joins on.
    key: Vec<Node>,
    children: Vec<TokenId>,
}

#[derive(Debug, Default)]
struct RuleMemory {
    tokens: HashMap<TokenId, Token>,
    edges: HashMap<(Option<TokenId>, Triple), TokenId>,
    levels: Vec<HashMap<Vec<Node>, IndexSet<TokenId>>>,
    by_triple: HashMap<Triple, IndexSet<TokenId>>,
    terminal: IndexMap<TokenId, Firing>,
}

impl RuleMemory {
    fn new(levels: usize) -> Self {
        Self {
            levels: (0..levels).map(|_| HashMap::new()).collect(),
            ..Self::default()
        }
    }

    /// Stores a token. Returns `false` if the parent already holds the triple.
    fn insert(
        &mut self,
        id: TokenId,
        parent: Option<TokenId>,
        level: usize,
        triple: Triple,
        env: BindingVector,
        key: Vec<Node>,
    ) -> bool {
        let edge = (parent, triple.clone());
        if self.edges.contains_key(&edge) {
            return false;
        }
        self.edges.insert(edge, id);
        self.levels[level].entry(key.clone()).or_default().insert(id);
        self.by_triple.entry(triple.clone()).or_default().insert(id);
        if let Some(up) = parent.and_then(|p| self.tokens.get_mut(&p)) {
            up.children.push(id);
        }
        self.tokens.insert(
            id,
            Token {
                parent,
                triple,
                level,
                env,
                key,
                children: Vec::new(),
            },
        );
        true
    }

    /// Tokens at `level` stored under `key`.
    fn matching(&self, level: usize, key: &[Node]) -> Vec<TokenId> {
        self.levels[level]
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The triples of a token, first level first. Empty for axioms.
    fn triples(&self, id: TokenId) -> Vec<Triple> {
        let mut out = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            let Some(token) = self.tokens.get(&current) else {
                break;
            };
            out.push(token.triple.clone());
            next = token.parent;
        }
        out.reverse();
        out
    }

    /// Removes every token holding `triple` together with its extensions.
    /// Returns the complete tokens among them with their triples and firing.
    fn remove_holding(&mut self, triple: &Triple) -> Vec<(TokenId, Vec<Triple>, Firing)> {
        let Some(roots) = self.by_triple.get(triple) else {
            return Vec::new();
        };
        let mut doomed: IndexSet<TokenId> = IndexSet::new();
        let mut stack: Vec<TokenId> = roots.iter().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(token) = self.tokens.get(&id) {
                if doomed.insert(id) {
                    stack.extend(token.children.iter().copied());
                }
            }
        }

        let mut broken = Vec::new();
        for &id in &doomed {
            if let Some(firing) = self.terminal.shift_remove(&id) {
                broken.push((id, self.triples(id), firing));
            }
        }
        for id in doomed {
            let Some(token) = self.tokens.remove(&id) else {
                continue;
            };
            self.edges.remove(&(token.parent, token.triple.clone()));
            unindex(&mut self.levels[token.level], &token.key, id);
            unindex(&mut self.by_triple, &token.triple, id);
            if let Some(up) = token.parent.and_then(|p| self.tokens.get_mut(&p)) {
                up.children.retain(|&child| child != id);
            }
        }
        broken
    }
}

fn unindex<K: Hash + Eq>(index: &mut HashMap<K, IndexSet<TokenId>>, key: &K, id: TokenId) {
    if let Some(ids) = index.get_mut(key) {
        ids.shift_remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// Forward-chaining state for one inference graph.
///
/// The base graph is owned by the caller and passed to every operation;
/// derived triples live in the engine's own deductions graph.
pub struct ReteEngine {
    network: Arc<Network>,
    memories: Vec<RuleMemory>,
    next_token: TokenId,
    events: VecDeque<Event>,
    conflict: VecDeque<(usize, TokenId)>,
    /// Supporting `(rule, token)` firings per non-committed conclusion.
    support: HashMap<Triple, IndexSet<(usize, TokenId)>>,
    committed: HashSet<Triple>,
    /// Conclusions that lost part of their support.
    suspects: IndexSet<Triple>,
    deductions: MemoryGraph,
    derivations: DerivationLog,
    logging: bool,
    trace_firings: bool,
    max_recheck_rounds: usize,
    /// Hidden predicates with the number of firings hiding them.
    hidden: HashMap<Node, usize>,
    state: EngineState,
    stats: EngineStats,
}

impl ReteEngine {
    pub fn new(network: Arc<Network>) -> Self {
        let memories = network
            .rules
            .iter()
            .map(|r| RuleMemory::new(r.patterns.len()))
            .collect();
        let stats = EngineStats {
            rules: network.rule_count(),
            pattern_nodes: network.pattern_count(),
            ..EngineStats::default()
        };
        Self {
            network,
            memories,
            next_token: 0,
            events: VecDeque::new(),
            conflict: VecDeque::new(),
            support: HashMap::new(),
            committed: HashSet::new(),
            suspects: IndexSet::new(),
            deductions: MemoryGraph::new(),
            derivations: DerivationLog::new(),
            logging: false,
            trace_firings: false,
            max_recheck_rounds: 64,
            hidden: HashMap::new(),
            state: EngineState::Idle,
            stats,
        }
    }

    /// Enables or disables derivation recording. Disabling drops recorded
    /// derivations.
    pub fn set_derivation_logging(&mut self, enabled: bool) {
        self.logging = enabled;
        if !enabled {
            self.derivations.clear();
        }
    }

    /// Logs every firing at info level instead of debug.
    pub fn set_trace_firings(&mut self, enabled: bool) {
        self.trace_firings = enabled;
    }

    /// Bounds the non-monotonic re-check passes per update.
    pub fn set_max_recheck_rounds(&mut self, rounds: usize) {
        self.max_recheck_rounds = rounds;
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn deductions(&self) -> &MemoryGraph {
        &self.deductions
    }

    pub fn derivations(&self) -> &DerivationLog {
        &self.derivations
    }

    /// Returns `true` if the triple's predicate is hidden by a live firing.
    pub fn is_hidden(&self, triple: &Triple) -> bool {
        self.hidden.contains_key(&triple.predicate)
    }

    /// Live tokens across all memories.
    pub fn token_count(&self) -> usize {
        self.memories.iter().map(|m| m.tokens.len()).sum()
    }

    /// Tears the engine down. Later operations fail with [`Error::Closed`].
    pub fn close(&mut self) {
        self.reset();
        self.state = EngineState::Closed;
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            EngineState::Closed => Err(Error::Closed),
            _ => Ok(()),
        }
    }

    fn reset(&mut self) {
        for (memory, node) in self.memories.iter_mut().zip(&self.network.rules) {
            *memory = RuleMemory::new(node.patterns.len());
        }
        self.events.clear();
        self.conflict.clear();
        self.support.clear();
        self.committed.clear();
        self.suspects.clear();
        self.deductions.clear();
        self.derivations.clear();
        self.hidden.clear();
        self.stats = EngineStats {
            rules: self.network.rule_count(),
            pattern_nodes: self.network.pattern_count(),
            ..EngineStats::default()
        };
    }

    fn next_id(&mut self) -> TokenId {
        let id = self.next_token;
        self.next_token += 1;
        id
    }

    /// Computes the closure of `base` from scratch.
    pub fn initialize(&mut self, base: &mut dyn Graph) -> Result<()> {
        self.ensure_open()?;
        self.reset();
        let facts = base.find(&TriplePattern::any())?;
        debug!("initializing network over {} base triples", facts.len());
        self.events.extend(facts.into_iter().map(Event::Add));
        let network = Arc::clone(&self.network);
        for (index, node) in network.rules.iter().enumerate() {
            if node.patterns.is_empty() {
                let id = self.next_id();
                self.memories[index].terminal.insert(id, Firing::Pending);
                self.conflict.push_back((index, id));
            }
        }
        self.run(base)
    }

    /// Adds a triple to the base graph and brings the closure up to date.
    /// Returns `false` if the base already held it.
    pub fn add(&mut self, base: &mut dyn Graph, triple: Triple) -> Result<bool> {
        self.ensure_open()?;
        let added = base.add(triple.clone())?;
        if added && !self.deductions.contains(&triple)? {
            self.events.push_back(Event::Add(triple));
        }
        self.run(base)?;
        Ok(added)
    }

    /// Deletes a triple and brings the closure up to date.
    ///
    /// A triple held by the base graph stays visible only if the rules still
    /// derive it without its base copy. A triple that is only derived is
    /// withdrawn from the deductions and stays withdrawn until a new firing
    /// asserts it.
    pub fn delete(&mut self, base: &mut dyn Graph, triple: &Triple) -> Result<bool> {
        self.ensure_open()?;
        let removed = if base.delete(triple)? {
            if self.deductions.contains(triple)? {
                self.suspects.insert(triple.clone());
            } else {
                self.events.push_back(Event::Delete(triple.clone()));
            }
            true
        } else if self.deductions.delete(triple)? {
            self.committed.remove(triple);
            self.events.push_back(Event::Delete(triple.clone()));
            true
        } else {
            false
        };
        self.run(base)?;
        Ok(removed)
    }

    /// Announces a triple already present in the store. Announcing the same
    /// triple again has no further effect.
    pub fn propagate_add(&mut self, base: &mut dyn Graph, triple: Triple) -> Result<()> {
        self.ensure_open()?;
        self.events.push_back(Event::Add(triple));
        self.run(base)
    }

    /// Announces that a triple has left the store.
    pub fn propagate_delete(&mut self, base: &mut dyn Graph, triple: Triple) -> Result<()> {
        self.ensure_open()?;
        self.events.push_back(Event::Delete(triple));
        self.run(base)
    }

    fn run(&mut self, base: &mut dyn Graph) -> Result<()> {
        match self.run_to_quiescence(base) {
            Ok(()) => {
                self.state = EngineState::Idle;
                Ok(())
            }
            Err(e) => {
                warn!("inference aborted, closing engine: {}", e);
                self.close();
                Err(e)
            }
        }
    }

    fn run_to_quiescence(&mut self, base: &mut dyn Graph) -> Result<()> {
        let mut rechecks = 0;
        loop {
            if let Some(event) = self.events.pop_front() {
                self.state = EngineState::Propagating;
                self.propagate(base, event)?;
                continue;
            }
            if let Some((rule, id)) = self.conflict.pop_front() {
                self.state = EngineState::Firing;
                self.fire(base, rule, id)?;
                continue;
            }
            if let Some(suspect) = self.suspects.pop() {
                self.check_support(base, suspect)?;
                continue;
            }
            if !self.network.is_monotonic() {
                if rechecks >= self.max_recheck_rounds {
                    warn!(
                        "non-monotonic rules still changing after {} re-checks; stopping",
                        rechecks
                    );
                    break;
                }
                rechecks += 1;
                self.stats.rechecks += 1;
                if self.recheck(base)? {
                    continue;
                }
            }
            break;
        }
        Ok(())
    }

    fn propagate(&mut self, base: &mut dyn Graph, event: Event) -> Result<()> {
        let network = Arc::clone(&self.network);
        match event {
            Event::Add(triple) => {
                if !UnionView::new(&*base, &self.deductions).contains(&triple)? {
                    return Ok(());
                }
                self.stats.events += 1;
                trace!("add {}", triple);
                for (rule, level) in network.activations(&triple) {
                    self.activate(base, &network.rules[rule], rule, level, &triple)?;
                }
            }
            Event::Delete(triple) => {
                if UnionView::new(&*base, &self.deductions).contains(&triple)? {
                    return Ok(());
                }
                self.stats.events += 1;
                trace!("delete {}", triple);
                let mut rules: Vec<usize> = network
                    .activations(&triple)
                    .into_iter()
                    .map(|(rule, _)| rule)
                    .collect();
                rules.dedup();
                for rule in rules {
                    self.retract_tokens(base, rule, &triple)?;
                }
            }
        }
        Ok(())
    }

    /// Joins a new triple at `level` with the tokens of the previous level
    /// that agree on the join variables.
    fn activate(
        &mut self,
        base: &mut dyn Graph,
        node: &RuleNode,
        rule: usize,
        level: usize,
        triple: &Triple,
    ) -> Result<()> {
        let pattern = &node.patterns[level].1;
        let mut alone = BindingVector::new(node.rule.num_vars());
        if !alone.unify_triple(pattern, triple) {
            return Ok(());
        }
        let parents: Vec<Option<TokenId>> = if level == 0 {
            vec![None]
        } else {
            let key = node.join_key(level, &alone);
            self.memories[rule]
                .matching(level - 1, &key)
                .into_iter()
                .map(Some)
                .collect()
        };

        let mut pending = VecDeque::new();
        for parent in parents {
            let Some(id) = parent else {
                pending.push_back((None, level, triple.clone(), alone.clone()));
                continue;
            };
            let Some(token) = self.memories[rule].tokens.get(&id) else {
                continue;
            };
            let mut env = token.env.clone();
            if env.unify_triple(pattern, triple) {
                pending.push_back((parent, level, triple.clone(), env));
            }
        }

        while let Some((parent, level, fact, env)) = pending.pop_front() {
            let id = self.next_token;
            let key = node.join_key(level + 1, &env);
            if !self.memories[rule].insert(id, parent, level, fact, env.clone(), key) {
                continue;
            }
            self.next_token += 1;

            if level + 1 == node.patterns.len() {
                trace!("rule {} ready on token {}", node.rule.label(), id);
                self.memories[rule].terminal.insert(id, Firing::Pending);
                self.conflict.push_back((rule, id));
                continue;
            }

            let next = &node.patterns[level + 1].1;
            let lookup = TriplePattern::from_triple(&env.partial_instantiate(next));
            let facts = UnionView::new(&*base, &self.deductions).find(&lookup)?;
            for fact in facts {
                let mut extended = env.clone();
                if extended.unify_triple(next, &fact) {
                    pending.push_back((Some(id), level + 1, fact, extended));
                }
            }
        }
        Ok(())
    }

    /// Drops every token of `rule` that holds `triple`.
    fn retract_tokens(&mut self, base: &mut dyn Graph, rule: usize, triple: &Triple) -> Result<()> {
        let broken = self.memories[rule].remove_holding(triple);
        for (id, triples, firing) in broken {
            self.retract_firing(base, rule, id, &triples, firing)?;
        }
        Ok(())
    }

    fn retract_firing(
        &mut self,
        base: &mut dyn Graph,
        rule: usize,
        id: TokenId,
        triples: &[Triple],
        firing: Firing,
    ) -> Result<()> {
        let Firing::Fired {
            conclusions,
            hidden,
            committed: false,
        } = firing
        else {
            return Ok(());
        };
        self.stats.retractions += 1;
        let network = Arc::clone(&self.network);
        let node = &network.rules[rule];
        debug!("retracting firing of {}", node.rule.label());

        for predicate in hidden {
            if let Some(count) = self.hidden.get_mut(&predicate) {
                *count -= 1;
                if *count == 0 {
                    self.hidden.remove(&predicate);
                }
            }
        }

        let matches = node.matches(triples);
        for conclusion in conclusions {
            let supporters = self.support.get_mut(&conclusion).ok_or_else(|| {
                Error::Invariant(format!("no support recorded for {}", conclusion))
            })?;
            if !supporters.shift_remove(&(rule, id)) {
                return Err(Error::Invariant(format!(
                    "firing of {} not among the supporters of {}",
                    node.rule.label(),
                    conclusion
                )));
            }
            let unsupported = supporters.is_empty();
            if self.logging {
                self.derivations.remove(&Derivation::new(
                    conclusion.clone(),
                    Arc::clone(&node.rule),
                    matches.clone(),
                ));
            }
            if unsupported {
                self.support.remove(&conclusion);
                if !self.committed.contains(&conclusion) {
                    self.withdraw(base, conclusion)?;
                }
            } else {
                self.suspects.insert(conclusion);
            }
        }
        Ok(())
    }

    fn withdraw(&mut self, base: &dyn Graph, conclusion: Triple) -> Result<()> {
        if self.deductions.delete(&conclusion)? && !base.contains(&conclusion)? {
            self.events.push_back(Event::Delete(conclusion));
        }
        Ok(())
    }

    /// Keeps a conclusion that lost part of its support only if the rest
    /// still rests on base triples.
    fn check_support(&mut self, base: &dyn Graph, triple: Triple) -> Result<()> {
        if self.committed.contains(&triple)
            || base.contains(&triple)?
            || !self.deductions.contains(&triple)?
        {
            return Ok(());
        }
        self.stats.support_checks += 1;
        let mut grounded = HashSet::new();
        if self.grounded(base, &triple, &mut HashSet::new(), &mut grounded)? {
            return Ok(());
        }
        debug!("{} is only supported through itself; withdrawing", triple);
        self.stats.unfounded += 1;
        self.withdraw(base, triple)
    }

    /// `true` if some chain of recorded firings derives `triple` from base or
    /// committed triples without passing through `visiting`.
    fn grounded(
        &self,
        base: &dyn Graph,
        triple: &Triple,
        visiting: &mut HashSet<Triple>,
        known: &mut HashSet<Triple>,
    ) -> Result<bool> {
        if known.contains(triple) || self.committed.contains(triple) || base.contains(triple)? {
            return Ok(true);
        }
        if visiting.contains(triple) || !self.deductions.contains(triple)? {
            return Ok(false);
        }
        let Some(supporters) = self.support.get(triple) else {
            return Ok(false);
        };
        visiting.insert(triple.clone());
        let mut found = false;
        'firings: for &(rule, id) in supporters {
            for antecedent in self.memories[rule].triples(id) {
                if !self.grounded(base, &antecedent, visiting, known)? {
                    continue 'firings;
                }
            }
            found = true;
            break;
        }
        visiting.remove(triple);
        if found {
            known.insert(triple.clone());
        }
        Ok(found)
    }

    fn fire(&mut self, base: &mut dyn Graph, rule: usize, id: TokenId) -> Result<()> {
        if !matches!(
            self.memories[rule].terminal.get(&id),
            Some(Firing::Pending)
        ) {
            return Ok(());
        }
        let network = Arc::clone(&self.network);
        let node = &network.rules[rule];
        let registry = network.registry();
        let triples = self.memories[rule].triples(id);
        let mut env = node.bindings(&triples)?;
        let matches = node.matches(&triples);

        let outcome = {
            let view = UnionView::new(&*base, &self.deductions);
            let mut ctx = EvalContext::new(&mut env, &node.rule, &matches, view, false);
            if node.calls.iter().all(|(_, call)| call.call(registry, &mut ctx)) {
                let mut conclusions: Vec<Triple> = Vec::new();
                for entry in &node.head {
                    match entry {
                        HeadEntry::Assert(pattern) => {
                            let conclusion = ctx.instantiate(pattern);
                            if !conclusions.contains(&conclusion) {
                                conclusions.push(conclusion);
                            }
                        }
                        HeadEntry::Action(call) => call.act(registry, &mut ctx),
                    }
                }
                Some((conclusions, ctx.into_effects()))
            } else {
                None
            }
        };

        let Some((conclusions, effects)) = outcome else {
            self.stats.blocked += 1;
            trace!("rule {} blocked by a builtin clause", node.rule.label());
            self.memories[rule].terminal.insert(id, Firing::Blocked);
            return Ok(());
        };

        self.stats.firings += 1;
        if self.trace_firings {
            info!("fired {} -> {}", node.rule.label(), display(&conclusions));
        } else {
            debug!("fired {} -> {}", node.rule.label(), display(&conclusions));
        }

        let committed = node.destructive;
        for predicate in &effects.hidden {
            *self.hidden.entry(predicate.clone()).or_insert(0) += 1;
        }
        self.memories[rule].terminal.insert(
            id,
            Firing::Fired {
                conclusions: conclusions.clone(),
                hidden: effects.hidden,
                committed,
            },
        );
        for conclusion in conclusions {
            if self.logging {
                self.derivations.record(Derivation::new(
                    conclusion.clone(),
                    Arc::clone(&node.rule),
                    matches.clone(),
                ));
            }
            self.assert_conclusion(base, conclusion, committed, (rule, id))?;
        }

        for triple in effects.removed {
            self.remove_everywhere(base, &triple, true)?;
        }
        for triple in effects.dropped {
            self.remove_everywhere(base, &triple, false)?;
        }
        Ok(())
    }

    fn assert_conclusion(
        &mut self,
        base: &mut dyn Graph,
        conclusion: Triple,
        committed: bool,
        firing: (usize, TokenId),
    ) -> Result<()> {
        if committed {
            self.committed.insert(conclusion.clone());
        } else {
            self.support
                .entry(conclusion.clone())
                .or_default()
                .insert(firing);
        }
        if self.deductions.add(conclusion.clone())? && !base.contains(&conclusion)? {
            self.events.push_back(Event::Add(conclusion));
        }
        Ok(())
    }

    /// Removal requested by a head action; not undone by truth maintenance.
    fn remove_everywhere(&mut self, base: &mut dyn Graph, triple: &Triple, notify: bool) -> Result<()> {
        let in_base = base.delete(triple)?;
        let in_deductions = self.deductions.delete(triple)?;
        self.committed.remove(triple);
        if notify && (in_base || in_deductions) {
            self.events.push_back(Event::Delete(triple.clone()));
        }
        Ok(())
    }

    /// Re-evaluates the builtin clauses of non-monotonic rules. Fired
    /// activations that no longer hold are retracted; blocked ones that now
    /// hold are queued again. Returns `true` if anything changed.
    fn recheck(&mut self, base: &mut dyn Graph) -> Result<bool> {
        let network = Arc::clone(&self.network);
        let mut changed = false;
        for (rule, node) in network.rules.iter().enumerate() {
            if !node.non_monotonic {
                continue;
            }
            let entries: Vec<(TokenId, bool)> = self.memories[rule]
                .terminal
                .iter()
                .filter_map(|(&id, firing)| match firing {
                    Firing::Fired {
                        committed: false, ..
                    } => Some((id, true)),
                    Firing::Blocked => Some((id, false)),
                    _ => None,
                })
                .collect();

            for (id, fired) in entries {
                let triples = self.memories[rule].triples(id);
                let holds = self.holds(base, node, &triples)?;
                if fired && !holds {
                    if let Some(firing) = self.memories[rule].terminal.insert(id, Firing::Blocked) {
                        self.retract_firing(base, rule, id, &triples, firing)?;
                    }
                    changed = true;
                } else if !fired && holds {
                    self.memories[rule].terminal.insert(id, Firing::Pending);
                    self.conflict.push_back((rule, id));
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    /// Speculative evaluation of a rule's builtin clauses: unsafe builtins
    /// are not run again and count as satisfied.
    fn holds(&self, base: &dyn Graph, node: &RuleNode, token: &[Triple]) -> Result<bool> {
        let registry = self.network.registry();
        let mut env = node.bindings(token)?;
        let matches = node.matches(token);
        let view = UnionView::new(base, &self.deductions);
        let mut ctx = EvalContext::new(&mut env, &node.rule, &matches, view, true);
        Ok(node.calls.iter().all(|(_, call)| match call.resolve(registry) {
            Some(builtin) if !builtin.is_safe() => true,
            Some(_) => call.call(registry, &mut ctx),
            None => false,
        }))
    }
}

fn display(triples: &[Triple]) -> String {
    triples
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::BuiltinRegistry;
    use crate::clause::Rule;

    fn u(name: &str) -> Node {
        Node::uri(name)
    }

    fn v(name: &str) -> Node {
        Node::var(name)
    }

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(u(s), u(p), u(o))
    }

    fn engine(rules: Vec<Rule>) -> ReteEngine {
        let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        let network =
            Network::compile(&rules, Arc::new(BuiltinRegistry::with_defaults())).unwrap();
        let mut engine = ReteEngine::new(Arc::new(network));
        engine.set_derivation_logging(true);
        engine
    }

    fn knows2() -> Rule {
        Rule::forward("knows2")
            .when(v("a"), u("knows"), v("b"))
            .when(v("b"), u("knows"), v("c"))
            .then(v("a"), u("knows2"), v("c"))
            .build()
    }

    #[test]
    fn test_closure_and_derivation() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![knows2()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("alice", "knows", "bob")).unwrap();
        engine.add(&mut base, t("bob", "knows", "carol")).unwrap();

        assert_eq!(engine.deductions().triples(), vec![t("alice", "knows2", "carol")]);
        let derivations = engine.derivations().get(&t("alice", "knows2", "carol"));
        assert_eq!(derivations.len(), 1);
        assert_eq!(
            derivations[0].matches,
            vec![Some(t("alice", "knows", "bob")), Some(t("bob", "knows", "carol"))]
        );
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_duplicate_announcement_fires_once() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![knows2()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("alice", "knows", "bob")).unwrap();
        engine.add(&mut base, t("bob", "knows", "carol")).unwrap();
        engine
            .propagate_add(&mut base, t("bob", "knows", "carol"))
            .unwrap();
        engine
            .propagate_add(&mut base, t("alice", "knows", "bob"))
            .unwrap();

        assert_eq!(engine.stats().firings, 1);
        assert_eq!(engine.deductions().len(), 1);
        assert_eq!(engine.derivations().get(&t("alice", "knows2", "carol")).len(), 1);
    }

    #[test]
    fn test_stale_delete_is_ignored() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![knows2()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("alice", "knows", "bob")).unwrap();
        engine.add(&mut base, t("bob", "knows", "carol")).unwrap();

        // still present, so the announcement is stale
        engine
            .propagate_delete(&mut base, t("bob", "knows", "carol"))
            .unwrap();
        assert_eq!(engine.deductions().len(), 1);
    }

    #[test]
    fn test_retraction_removes_tokens() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![knows2()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("alice", "knows", "bob")).unwrap();
        engine.add(&mut base, t("bob", "knows", "carol")).unwrap();
        let tokens = engine.token_count();

        engine.delete(&mut base, &t("bob", "knows", "carol")).unwrap();
        assert!(engine.deductions().is_empty());
        assert!(engine.derivations().is_empty());
        assert!(engine.token_count() < tokens);
        assert_eq!(engine.stats().retractions, 1);
    }

    #[test]
    fn test_axiom_fires_on_initialize() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![Rule::forward("axiom")
            .then(u("Thing"), u("type"), u("Class"))
            .build()]);
        engine.initialize(&mut base).unwrap();
        assert!(engine.deductions().contains(&t("Thing", "type", "Class")).unwrap());

        engine.initialize(&mut base).unwrap();
        assert_eq!(engine.deductions().len(), 1);
    }

    #[test]
    fn test_fresh_blank_for_unbound_head_variable() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![Rule::forward("owner")
            .when(v("x"), u("type"), u("Person"))
            .then(v("x"), u("owns"), v("thing"))
            .then(v("thing"), u("type"), u("Thing"))
            .build()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("alice", "type", "Person")).unwrap();

        let owns = engine
            .deductions()
            .find(&TriplePattern::predicate(u("owns")))
            .unwrap();
        assert_eq!(owns.len(), 1);
        let thing = owns[0].object.clone();
        assert!(thing.is_blank());
        assert!(engine
            .deductions()
            .contains(&Triple::new(thing, u("type"), u("Thing")))
            .unwrap());
    }

    #[test]
    fn test_blocked_by_builtin() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![Rule::forward("adult")
            .when(v("x"), u("age"), v("a"))
            .when_call("ge", vec![v("a"), Node::integer(18)])
            .then(v("x"), u("type"), u("Adult"))
            .build()]);
        engine.initialize(&mut base).unwrap();
        engine
            .add(&mut base, Triple::new(u("kid"), u("age"), Node::integer(9)))
            .unwrap();
        engine
            .add(&mut base, Triple::new(u("ann"), u("age"), Node::integer(30)))
            .unwrap();

        assert_eq!(engine.deductions().triples(), vec![t("ann", "type", "Adult")]);
        assert_eq!(engine.stats().blocked, 1);
    }

    #[test]
    fn test_closed_engine_rejects_work() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![knows2()]);
        engine.initialize(&mut base).unwrap();
        engine.close();
        assert_eq!(engine.state(), EngineState::Closed);
        assert_eq!(
            engine.add(&mut base, t("a", "knows", "b")),
            Err(Error::Closed)
        );
        assert_eq!(engine.initialize(&mut base), Err(Error::Closed));
    }

    #[test]
    fn test_join_memory_keyed_by_shared_variable() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![knows2()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("alice", "knows", "bob")).unwrap();
        engine.add(&mut base, t("carol", "knows", "dan")).unwrap();

        let memory = &engine.memories[0];
        assert_eq!(memory.matching(0, &[u("bob")]).len(), 1);
        assert_eq!(memory.matching(0, &[u("dan")]).len(), 1);
        assert!(memory.matching(0, &[u("alice")]).is_empty());
        assert!(engine.deductions().is_empty());

        engine.add(&mut base, t("bob", "knows", "erin")).unwrap();
        assert_eq!(engine.deductions().triples(), vec![t("alice", "knows2", "erin")]);
        let id = *engine.memories[0].terminal.keys().next().unwrap();
        assert_eq!(
            engine.memories[0].triples(id),
            vec![t("alice", "knows", "bob"), t("bob", "knows", "erin")]
        );
    }

    #[test]
    fn test_functor_object_in_body_pattern() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![Rule::forward("first")
            .when(
                v("s"),
                u("has"),
                Node::functor("triple", vec![v("a"), v("b"), v("c")]),
            )
            .then(v("s"), u("first"), v("a"))
            .build()]);
        engine.initialize(&mut base).unwrap();
        let fact = Triple::new(
            u("s"),
            u("has"),
            Node::functor("triple", vec![u("x"), u("y"), u("z")]),
        );
        engine.add(&mut base, fact).unwrap();
        assert_eq!(engine.deductions().triples(), vec![t("s", "first", "x")]);
    }

    #[test]
    fn test_partial_support_loss_leaves_downstream_alone() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![
            Rule::forward("from-a")
                .when(v("x"), u("a"), v("y"))
                .then(v("x"), u("c"), v("y"))
                .build(),
            Rule::forward("from-b")
                .when(v("x"), u("b"), v("y"))
                .then(v("x"), u("c"), v("y"))
                .build(),
            Rule::forward("tag")
                .when(v("x"), u("c"), v("y"))
                .then(v("x"), u("d"), v("tag"))
                .build(),
        ]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("s", "a", "o")).unwrap();
        engine.add(&mut base, t("s", "b", "o")).unwrap();
        let tagged = engine
            .deductions()
            .find(&TriplePattern::predicate(u("d")))
            .unwrap();
        assert_eq!(engine.stats().firings, 3);

        engine.delete(&mut base, &t("s", "a", "o")).unwrap();
        assert!(engine.deductions().contains(&t("s", "c", "o")).unwrap());
        assert_eq!(
            engine
                .deductions()
                .find(&TriplePattern::predicate(u("d")))
                .unwrap(),
            tagged
        );
        assert_eq!(engine.stats().firings, 3);
        assert_eq!(engine.stats().retractions, 1);
        assert_eq!(engine.stats().unfounded, 0);
    }

    #[test]
    fn test_self_supporting_cycle_withdrawn() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![Rule::forward("symmetric")
            .when(v("x"), u("spouse"), v("y"))
            .then(v("y"), u("spouse"), v("x"))
            .build()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("a", "spouse", "b")).unwrap();
        assert_eq!(engine.deductions().len(), 2);

        engine.delete(&mut base, &t("a", "spouse", "b")).unwrap();
        assert!(engine.deductions().is_empty());
        assert!(engine.support.is_empty());
        assert_eq!(engine.stats().unfounded, 1);
        assert_eq!(engine.token_count(), 0);
    }

    #[test]
    fn test_hide_released_with_its_firing() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![Rule::forward("hide-internal")
            .when(v("x"), u("internal"), v("y"))
            .then(v("x"), u("visible"), v("y"))
            .then_call("hide", vec![u("internal")])
            .build()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("a", "internal", "b")).unwrap();
        engine.add(&mut base, t("c", "internal", "d")).unwrap();
        assert!(engine.is_hidden(&t("x", "internal", "y")));

        engine.delete(&mut base, &t("a", "internal", "b")).unwrap();
        assert!(engine.is_hidden(&t("x", "internal", "y")));

        engine.delete(&mut base, &t("c", "internal", "d")).unwrap();
        assert!(!engine.is_hidden(&t("x", "internal", "y")));
        assert!(engine.deductions().is_empty());
    }

    #[test]
    fn test_invariant_violation_closes_engine() {
        let mut base = MemoryGraph::new();
        let mut engine = engine(vec![knows2()]);
        engine.initialize(&mut base).unwrap();
        engine.add(&mut base, t("x", "knows", "y")).unwrap();
        engine.add(&mut base, t("y", "knows", "z")).unwrap();

        // a fired token whose support was never recorded
        engine.support.clear();
        let err = engine.delete(&mut base, &t("x", "knows", "y")).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
        assert_eq!(engine.state(), EngineState::Closed);
        assert_eq!(engine.add(&mut base, t("a", "knows", "b")), Err(Error::Closed));
    }
}
