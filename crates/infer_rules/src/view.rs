//! Read-only union of the base graph and the deductions.

use indexmap::IndexSet;
use infer_graph::{Graph, MemoryGraph, Result, Triple, TriplePattern};

/// Base facts plus derived facts, as seen by rule matching.
#[derive(Clone, Copy)]
pub struct UnionView<'a> {
    base: &'a dyn Graph,
    deductions: &'a MemoryGraph,
}

impl<'a> UnionView<'a> {
    pub fn new(base: &'a dyn Graph, deductions: &'a MemoryGraph) -> Self {
        Self { base, deductions }
    }

    /// Matching triples from both graphs, base first, without duplicates.
    pub fn find(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
        let mut found: IndexSet<Triple> = self.base.find(pattern)?.into_iter().collect();
        found.extend(self.deductions.find(pattern)?);
        Ok(found.into_iter().collect())
    }

    pub fn contains(&self, triple: &Triple) -> Result<bool> {
        Ok(self.base.contains(triple)? || self.deductions.contains(triple)?)
    }

    pub fn in_base(&self, triple: &Triple) -> Result<bool> {
        self.base.contains(triple)
    }
}
