//! The `(subject, predicate, object)` triple.

use crate::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A semantic triple.
///
/// The same type serves as a stored fact (all positions ground) and as a
/// rule pattern (positions may hold variables, wildcards or functors).
///
/// # Examples
///
/// ```
/// use infer_graph::{Node, Triple};
///
/// let fact = Triple::new(Node::uri("alice"), Node::uri("knows"), Node::uri("bob"));
/// assert!(fact.is_ground());
/// assert_eq!(fact.to_string(), "(alice knows bob)");
///
/// let pattern = Triple::new(Node::var("a"), Node::uri("knows"), Node::var("b"));
/// assert!(!pattern.is_ground());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Node,
    pub predicate: Node,
    pub object: Node,
}

impl Triple {
    /// Creates a triple.
    pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Returns `true` if every position is ground.
    pub fn is_ground(&self) -> bool {
        self.subject.is_ground() && self.predicate.is_ground() && self.object.is_ground()
    }

    /// Iterates the three positions in subject, predicate, object order.
    pub fn nodes(&self) -> [&Node; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Rebuilds a triple by mapping every position.
    pub fn map(&self, mut f: impl FnMut(&Node) -> Node) -> Triple {
        Triple::new(f(&self.subject), f(&self.predicate), f(&self.object))
    }

    /// Variable-insensitive comparison, see [`Node::same_as`].
    pub fn same_as(&self, other: &Triple) -> bool {
        self.subject.same_as(&other.subject)
            && self.predicate.same_as(&other.predicate)
            && self.object.same_as(&other.object)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}
