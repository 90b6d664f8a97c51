//! Infer Graph - term model and triple substrate
//!
//! This crate holds the data the rule engine in `infer_rules` reasons over:
//! the closed [`Node`] term type, [`Triple`]s, lookup [`TriplePattern`]s and
//! the [`Graph`] trait with an indexed in-memory implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Infer Graph                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Terms                               │   │
//! │  │  Uri │ Literal │ Blank │ Variable │ Any │ Functor    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   MemoryGraph                         │   │
//! │  │  ┌─────────┐  ┌─────────┐  ┌─────────┐              │   │
//! │  │  │   SPO   │  │   POS   │  │   OSP   │  Indexes     │   │
//! │  │  └─────────┘  └─────────┘  └─────────┘              │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use infer_graph::{Graph, MemoryGraph, Node, Triple, TriplePattern};
//!
//! let mut graph = MemoryGraph::new();
//! graph.add(Triple::new(
//!     Node::uri("alice"),
//!     Node::uri("knows"),
//!     Node::uri("bob"),
//! ))?;
//!
//! let results = graph.find(&TriplePattern::predicate(Node::uri("knows")))?;
//! assert_eq!(results.len(), 1);
//! # Ok::<(), infer_graph::Error>(())
//! ```

pub mod error;
pub mod graph;
pub mod index;
pub mod literal;
pub mod node;
pub mod query;
pub mod triple;

// Re-exports
pub use error::{Error, Result};
pub use graph::{Graph, GraphStats, MemoryGraph};
pub use index::{IndexType, TripleIndex};
pub use literal::{Literal, XSD};
pub use node::{Functor, Node, Var};
pub use query::TriplePattern;
pub use triple::Triple;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
