//! Derivation tracking
//!
//! A [`Derivation`] records one proof step: the rule that fired and the
//! triples its body patterns matched. Derivations form a DAG (a conclusion
//! can feed later firings, and may support itself through a cycle), so
//! explanation walks it iteratively with a seen-set.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use infer_graph::Triple;
use serde::{Deserialize, Serialize};

use crate::binding::BindingVector;
use crate::clause::{ClauseEntry, Rule};
use crate::error::{Error, Result};

/// One rule firing that produced a conclusion.
#[derive(Debug, Clone)]
pub struct Derivation {
    /// The derived triple.
    pub conclusion: Triple,
    /// The rule that fired.
    pub rule: Arc<Rule>,
    /// Matched triples, one per body clause; builtin positions are `None`.
    pub matches: Vec<Option<Triple>>,
}

impl Derivation {
    pub fn new(conclusion: Triple, rule: Arc<Rule>, matches: Vec<Option<Triple>>) -> Self {
        Self {
            conclusion,
            rule,
            matches,
        }
    }

    /// The matched triples, skipping builtin positions.
    pub fn matched_triples(&self) -> impl DoubleEndedIterator<Item = &Triple> {
        self.matches.iter().flatten()
    }

    /// Re-checks the step: the matches must instantiate the rule body, and
    /// the conclusion must be an instance of one of the head triples under
    /// the resulting bindings.
    pub fn verify(&self) -> bool {
        if self.matches.len() != self.rule.body().len() {
            return false;
        }
        let mut env = BindingVector::new(self.rule.num_vars());
        for (position, pattern) in self.rule.body_patterns() {
            match &self.matches[position] {
                Some(fact) if env.unify_triple(pattern, fact) => {}
                _ => return false,
            }
        }
        self.rule.head().iter().any(|entry| match entry {
            ClauseEntry::Triple(head) => env.clone().unify_triple(head, &self.conclusion),
            ClauseEntry::Functor(_) => false,
        })
    }

    /// A serializable copy of the step.
    pub fn to_record(&self) -> DerivationRecord {
        DerivationRecord {
            conclusion: self.conclusion.clone(),
            rule_name: self.rule.name().map(str::to_string),
            rule: self.rule.to_string(),
            matches: self.matches.clone(),
        }
    }
}

/// Two derivations are equal when they have the same conclusion, rule and
/// matches. The matched triples are compared as values, not as proofs.
impl PartialEq for Derivation {
    fn eq(&self, other: &Self) -> bool {
        self.conclusion == other.conclusion
            && (Arc::ptr_eq(&self.rule, &other.rule) || self.rule == other.rule)
            && self.matches == other.matches
    }
}

impl Eq for Derivation {}

impl Hash for Derivation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.conclusion.hash(state);
        self.matches.hash(state);
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {} [", self.conclusion, self.rule.label())?;
        for (i, m) in self.matched_triples().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", m)?;
        }
        write!(f, "]")
    }
}

/// The serialized form of a [`Derivation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationRecord {
    pub conclusion: Triple,
    pub rule_name: Option<String>,
    /// The rule in text syntax.
    pub rule: String,
    pub matches: Vec<Option<Triple>>,
}

/// A JSON export of a derivation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivationExport {
    pub exported_at: DateTime<Utc>,
    pub derivations: Vec<DerivationRecord>,
}

impl DerivationExport {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }
}

/// Derivations indexed by conclusion, in recording order.
#[derive(Debug, Clone, Default)]
pub struct DerivationLog {
    entries: IndexMap<Triple, Vec<Derivation>>,
}

impl DerivationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a derivation. Returns `false` if an equal one is already known.
    pub fn record(&mut self, derivation: Derivation) -> bool {
        let list = self
            .entries
            .entry(derivation.conclusion.clone())
            .or_default();
        if list.contains(&derivation) {
            return false;
        }
        list.push(derivation);
        true
    }

    /// Forgets a derivation, e.g. after its firing was retracted.
    pub fn remove(&mut self, derivation: &Derivation) -> bool {
        let Some(list) = self.entries.get_mut(&derivation.conclusion) else {
            return false;
        };
        let before = list.len();
        list.retain(|d| d != derivation);
        let removed = list.len() != before;
        if list.is_empty() {
            self.entries.shift_remove(&derivation.conclusion);
        }
        removed
    }

    /// Every known derivation of the triple; empty for base facts.
    pub fn get(&self, triple: &Triple) -> &[Derivation] {
        self.entries.get(triple).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Derivation> {
        self.entries.values().flatten()
    }

    /// Number of conclusions with at least one derivation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn export(&self) -> DerivationExport {
        DerivationExport {
            exported_at: Utc::now(),
            derivations: self.iter().map(Derivation::to_record).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export()).map_err(Error::from)
    }

    /// Writes the derivation tree of `triple`.
    ///
    /// Each conclusion is expanded once per trace; later occurrences are
    /// marked as already shown. Triples without derivations print as facts.
    pub fn print_trace(&self, triple: &Triple, out: &mut dyn fmt::Write) -> fmt::Result {
        enum Frame<'a> {
            Conclusion(Triple, usize),
            Step(&'a Derivation, usize),
        }

        let mut seen: HashSet<Triple> = HashSet::new();
        let mut stack = vec![Frame::Conclusion(triple.clone(), 0)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Conclusion(t, depth) => {
                    let pad = "    ".repeat(depth);
                    let steps = self.get(&t);
                    if steps.is_empty() {
                        writeln!(out, "{}Fact {}", pad, t)?;
                    } else if !seen.insert(t.clone()) {
                        writeln!(out, "{}{} - already shown", pad, t)?;
                    } else {
                        stack.extend(steps.iter().rev().map(|d| Frame::Step(d, depth)));
                    }
                }
                Frame::Step(d, depth) => {
                    let pad = "    ".repeat(depth);
                    writeln!(out, "{}Rule {} concluded {} <-", pad, d.rule.label(), d.conclusion)?;
                    stack.extend(
                        d.matched_triples()
                            .rev()
                            .map(|m| Frame::Conclusion(m.clone(), depth + 1)),
                    );
                }
            }
        }
        Ok(())
    }

    /// [`print_trace`](Self::print_trace) into a string.
    pub fn trace(&self, triple: &Triple) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.print_trace(triple, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_graph::Node;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Node::uri(s), Node::uri(p), Node::uri(o))
    }

    fn knows2() -> Arc<Rule> {
        Arc::new(
            Rule::forward("knows2")
                .when(Node::var("a"), Node::uri("knows"), Node::var("b"))
                .when(Node::var("b"), Node::uri("knows"), Node::var("c"))
                .then(Node::var("a"), Node::uri("knows2"), Node::var("c"))
                .build(),
        )
    }

    fn step(rule: &Arc<Rule>, a: &str, b: &str, c: &str) -> Derivation {
        Derivation::new(
            t(a, "knows2", c),
            Arc::clone(rule),
            vec![Some(t(a, "knows", b)), Some(t(b, "knows", c))],
        )
    }

    #[test]
    fn test_record_deduplicates() {
        let rule = knows2();
        let mut log = DerivationLog::new();
        assert!(log.record(step(&rule, "a", "b", "c")));
        assert!(!log.record(step(&rule, "a", "b", "c")));
        assert!(log.record(step(&rule, "a", "x", "c")));
        assert_eq!(log.get(&t("a", "knows2", "c")).len(), 2);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_remove() {
        let rule = knows2();
        let mut log = DerivationLog::new();
        let d = step(&rule, "a", "b", "c");
        log.record(d.clone());
        assert!(log.remove(&d));
        assert!(!log.remove(&d));
        assert!(log.is_empty());
        assert!(log.get(&t("a", "knows2", "c")).is_empty());
    }

    #[test]
    fn test_verify() {
        let rule = knows2();
        assert!(step(&rule, "a", "b", "c").verify());

        let broken = Derivation::new(
            t("a", "knows2", "c"),
            Arc::clone(&rule),
            vec![Some(t("a", "knows", "b")), Some(t("x", "knows", "c"))],
        );
        assert!(!broken.verify());

        let wrong_conclusion = Derivation::new(
            t("a", "knows2", "z"),
            Arc::clone(&rule),
            vec![Some(t("a", "knows", "b")), Some(t("b", "knows", "c"))],
        );
        assert!(!wrong_conclusion.verify());
    }

    #[test]
    fn test_trace_shared_ancestor_shown_once() {
        // d is derived once and used twice
        let rule = Arc::new(
            Rule::forward("join")
                .when(Node::var("x"), Node::uri("p"), Node::var("y"))
                .when(Node::var("x"), Node::uri("p"), Node::var("y"))
                .then(Node::var("x"), Node::uri("q"), Node::var("y"))
                .build(),
        );
        let shared = t("s", "p", "o");
        let mut log = DerivationLog::new();
        log.record(Derivation::new(
            shared.clone(),
            Arc::clone(&rule),
            vec![Some(t("s", "base", "o")), None],
        ));
        log.record(Derivation::new(
            t("s", "q", "o"),
            Arc::clone(&rule),
            vec![Some(shared.clone()), Some(shared.clone())],
        ));

        let trace = log.trace(&t("s", "q", "o"));
        assert_eq!(trace.matches("Rule join concluded (s p o)").count(), 1);
        assert_eq!(trace.matches("(s p o) - already shown").count(), 1);
        assert!(trace.contains("Fact (s base o)"));
    }

    #[test]
    fn test_trace_cycle_terminates() {
        let rule = Arc::new(
            Rule::forward("sym")
                .when(Node::var("a"), Node::uri("sib"), Node::var("b"))
                .then(Node::var("b"), Node::uri("sib"), Node::var("a"))
                .build(),
        );
        let ab = t("a", "sib", "b");
        let ba = t("b", "sib", "a");
        let mut log = DerivationLog::new();
        log.record(Derivation::new(ab.clone(), Arc::clone(&rule), vec![Some(ba.clone())]));
        log.record(Derivation::new(ba.clone(), Arc::clone(&rule), vec![Some(ab.clone())]));

        let trace = log.trace(&ab);
        assert!(trace.contains("(a sib b) - already shown"));
        assert_eq!(trace.lines().count(), 3);
    }

    #[test]
    fn test_trace_lists_matches_in_body_order() {
        let rule = knows2();
        let mut log = DerivationLog::new();
        log.record(step(&rule, "a", "b", "c"));

        let trace = log.trace(&t("a", "knows2", "c"));
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Rule knows2 concluded (a knows2 c) <-",
                "    Fact (a knows b)",
                "    Fact (b knows c)",
            ]
        );
    }

    #[test]
    fn test_json_export() {
        let rule = knows2();
        let mut log = DerivationLog::new();
        log.record(step(&rule, "a", "b", "c"));

        let json = log.to_json().unwrap();
        let export = DerivationExport::from_json(&json).unwrap();
        assert_eq!(export.derivations.len(), 1);
        assert_eq!(export.derivations[0].rule_name.as_deref(), Some("knows2"));
        assert_eq!(export.derivations[0].conclusion, t("a", "knows2", "c"));
    }
}
