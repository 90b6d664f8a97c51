//! The graph abstraction consumed by the rule engine, and its in-memory implementation.

use crate::{Error, Result, Triple, TripleIndex, TriplePattern};
use log::trace;

/// A triple store that can be searched and updated.
///
/// This is the whole surface the inference engine needs from its base data:
/// pattern lookup, insertion and deletion, each expected to be an indexed
/// operation.
pub trait Graph {
    /// Finds all triples matching the pattern.
    fn find(&self, pattern: &TriplePattern) -> Result<Vec<Triple>>;

    /// Adds a triple. Returns `false` if it was already present.
    fn add(&mut self, triple: Triple) -> Result<bool>;

    /// Deletes a triple. Returns `false` if it was not present.
    fn delete(&mut self, triple: &Triple) -> Result<bool>;

    /// Returns `true` if the exact triple is present.
    fn contains(&self, triple: &Triple) -> Result<bool> {
        Ok(!self.find(&TriplePattern::from_triple(triple))?.is_empty())
    }

    /// Number of triples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Statistics about the contents of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub triple_count: usize,
    pub subject_count: usize,
    pub predicate_count: usize,
    pub object_count: usize,
}

/// An in-memory graph backed by SPO/POS/OSP indexes.
///
/// # Examples
///
/// ```
/// use infer_graph::{Graph, MemoryGraph, Node, Triple, TriplePattern};
///
/// # fn main() -> infer_graph::Result<()> {
/// let mut graph = MemoryGraph::new();
/// graph.add(Triple::new(Node::uri("alice"), Node::uri("knows"), Node::uri("bob")))?;
///
/// let found = graph.find(&TriplePattern::subject(Node::uri("alice")))?;
/// assert_eq!(found.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryGraph {
    index: TripleIndex,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph holding the given triples.
    pub fn from_triples(triples: impl IntoIterator<Item = Triple>) -> Result<Self> {
        let mut graph = Self::new();
        for triple in triples {
            graph.add(triple)?;
        }
        Ok(graph)
    }

    /// All triples in insertion order of their subjects.
    pub fn triples(&self) -> Vec<Triple> {
        self.index.find(&TriplePattern::any())
    }

    /// Removes every triple.
    pub fn clear(&mut self) {
        self.index.clear();
    }

    /// Returns statistics about the graph.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            triple_count: self.index.len(),
            subject_count: self.index.subject_count(),
            predicate_count: self.index.predicate_count(),
            object_count: self.index.object_count(),
        }
    }
}

impl Graph for MemoryGraph {
    fn find(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
        Ok(self.index.find(pattern))
    }

    fn add(&mut self, triple: Triple) -> Result<bool> {
        if !triple.is_ground() {
            return Err(Error::InvalidTriple(triple.to_string()));
        }
        let added = self.index.insert(&triple)?;
        if added {
            trace!("graph add {}", triple);
        }
        Ok(added)
    }

    fn delete(&mut self, triple: &Triple) -> Result<bool> {
        let removed = self.index.remove(triple)?;
        if removed {
            trace!("graph delete {}", triple);
        }
        Ok(removed)
    }

    fn contains(&self, triple: &Triple) -> Result<bool> {
        Ok(self.index.contains(triple))
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Node;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Node::uri(s), Node::uri(p), Node::uri(o))
    }

    #[test]
    fn test_add_and_find() {
        let mut graph = MemoryGraph::new();
        assert!(graph.add(t("a", "p", "b")).unwrap());
        assert!(!graph.add(t("a", "p", "b")).unwrap());
        assert_eq!(graph.len(), 1);
        assert!(graph.contains(&t("a", "p", "b")).unwrap());
    }

    #[test]
    fn test_rejects_variables() {
        let mut graph = MemoryGraph::new();
        let pattern = Triple::new(Node::var("x"), Node::uri("p"), Node::uri("b"));
        assert!(matches!(graph.add(pattern), Err(Error::InvalidTriple(_))));

        let wildcard = Triple::new(Node::uri("a"), Node::Any, Node::uri("b"));
        assert!(graph.add(wildcard).is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_delete() {
        let mut graph = MemoryGraph::from_triples(vec![t("a", "p", "b"), t("a", "q", "c")]).unwrap();
        assert!(graph.delete(&t("a", "p", "b")).unwrap());
        assert!(!graph.delete(&t("a", "p", "b")).unwrap());
        assert_eq!(graph.triples(), vec![t("a", "q", "c")]);
    }

    #[test]
    fn test_stats() {
        let graph = MemoryGraph::from_triples(vec![
            t("alice", "knows", "bob"),
            t("bob", "knows", "carol"),
            t("alice", "name", "x"),
        ])
        .unwrap();
        let stats = graph.stats();
        assert_eq!(stats.triple_count, 3);
        assert_eq!(stats.subject_count, 2);
        assert_eq!(stats.predicate_count, 2);
        assert_eq!(stats.object_count, 3);
    }

    #[test]
    fn test_default_contains_via_find() {
        struct Wrapper(MemoryGraph);
        impl Graph for Wrapper {
            fn find(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
                self.0.find(pattern)
            }
            fn add(&mut self, triple: Triple) -> Result<bool> {
                self.0.add(triple)
            }
            fn delete(&mut self, triple: &Triple) -> Result<bool> {
                self.0.delete(triple)
            }
            fn len(&self) -> usize {
                self.0.len()
            }
        }

        let mut w = Wrapper(MemoryGraph::new());
        w.add(t("a", "p", "b")).unwrap();
        assert!(w.contains(&t("a", "p", "b")).unwrap());
        assert!(!w.contains(&t("a", "p", "c")).unwrap());
    }
}
