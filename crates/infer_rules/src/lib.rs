//! Infer Rules - hybrid rule inference over triple graphs
//!
//! Rules are conjunctions of triple patterns and builtin calls. Forward rules
//! (`body -> head`) are compiled into an incremental match network that keeps
//! the closure of a graph up to date as triples are added and deleted.
//! Backward rules (`head <- body`) are evaluated on demand when the graph is
//! queried, over the base triples and the forward conclusions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Reasoner                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Clause Model                        │   │
//! │  │  Rule │ ClauseEntry │ RuleSet │ Validation           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌─────────────────────────┐   ┌────────────────────────┐   │
//! │  │   Match Network (RETE)  │   │   Backward Engine      │   │
//! │  │  Tokens │ Conflict FIFO │   │  SLD │ Tabling │ Depth │   │
//! │  │  Support │ Rederive     │   │                        │   │
//! │  └─────────────────────────┘   └────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │   Bindings & Unification │ Builtins │ Derivations     │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use infer_graph::{MemoryGraph, Node, Triple};
//! use infer_rules::{Reasoner, ReasonerConfig, Rule, RuleSet, BuiltinRegistry};
//! use std::sync::Arc;
//!
//! # fn main() -> infer_rules::Result<()> {
//! let rules: RuleSet = vec![Rule::forward("knows2")
//!     .when(Node::var("a"), Node::uri("knows"), Node::var("b"))
//!     .when(Node::var("b"), Node::uri("knows"), Node::var("c"))
//!     .then(Node::var("a"), Node::uri("knows2"), Node::var("c"))
//!     .build()]
//! .into_iter()
//! .collect();
//!
//! let reasoner = Reasoner::new(
//!     rules,
//!     Arc::new(BuiltinRegistry::with_defaults()),
//!     ReasonerConfig::explain(),
//! )?;
//! let mut graph = reasoner.bind(MemoryGraph::new())?;
//! graph.add(Triple::new(Node::uri("alice"), Node::uri("knows"), Node::uri("bob")))?;
//! graph.add(Triple::new(Node::uri("bob"), Node::uri("knows"), Node::uri("carol")))?;
//!
//! let derived = Triple::new(Node::uri("alice"), Node::uri("knows2"), Node::uri("carol"));
//! assert!(graph.contains(&derived)?);
//! assert_eq!(graph.get_derivation(&derived).len(), 1);
//!
//! graph.delete(&Triple::new(Node::uri("bob"), Node::uri("knows"), Node::uri("carol")))?;
//! assert!(!graph.contains(&derived)?);
//! # Ok(())
//! # }
//! ```

pub mod backward;
pub mod binding;
pub mod builtin;
pub mod builtins;
pub mod clause;
pub mod config;
mod context;
pub mod derivation;
pub mod error;
pub mod reasoner;
pub mod rete;
pub mod view;

// Re-exports
pub use backward::BackwardEngine;
pub use binding::{
    unify, unify_full, BindingEnvironment, BindingStack, BindingVector, Slot, Unification,
};
pub use builtin::{Builtin, BuiltinCall, BuiltinRegistry, RuleContext, BUILTIN_NAMESPACE};
pub use clause::{ClauseEntry, Direction, Rule, RuleBuilder, RuleSet};
pub use config::{InferenceMode, ReasonerConfig};
pub use derivation::{Derivation, DerivationExport, DerivationLog, DerivationRecord};
pub use error::{Error, Result};
pub use reasoner::{InfGraph, InfStats, Reasoner};
pub use rete::{EngineState, EngineStats, Network, ReteEngine};
pub use view::UnionView;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
