//! Lookup patterns for [`Graph::find`](crate::Graph::find).

use crate::{Node, Triple};

/// A pattern for matching `(Subject, Predicate, Object)` triples.
///
/// Any component can be `None`, which acts as a wildcard that matches any value.
///
/// # Examples
///
/// Match triples with specific subject and predicate:
///
/// ```
/// use infer_graph::{Node, TriplePattern};
///
/// let pattern = TriplePattern::subject(Node::uri("alice"))
///     .with_predicate(Node::uri("knows"));
/// assert!(!pattern.is_exact());
/// ```
///
/// Build a pattern from a rule clause; variables become wildcards:
///
/// ```
/// use infer_graph::{Node, Triple, TriplePattern};
///
/// let clause = Triple::new(Node::var("x"), Node::uri("knows"), Node::var("y"));
/// let pattern = TriplePattern::from_triple(&clause);
/// assert_eq!(pattern.predicate, Some(Node::uri("knows")));
/// assert!(pattern.subject.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriplePattern {
    /// An optional constraint on the triple's subject.
    pub subject: Option<Node>,
    /// An optional constraint on the triple's predicate.
    pub predicate: Option<Node>,
    /// An optional constraint on the triple's object.
    pub object: Option<Node>,
}

impl TriplePattern {
    /// Creates a new pattern that matches any triple.
    pub fn any() -> Self {
        Self::default()
    }

    /// Creates a pattern from three optional constraints.
    pub fn new(subject: Option<Node>, predicate: Option<Node>, object: Option<Node>) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Creates a pattern from a (possibly non-ground) triple.
    ///
    /// Positions that are not ground (variables, wildcards, functors with
    /// variable arguments) become wildcards.
    pub fn from_triple(triple: &Triple) -> Self {
        let constraint = |n: &Node| if n.is_ground() { Some(n.clone()) } else { None };
        Self {
            subject: constraint(&triple.subject),
            predicate: constraint(&triple.predicate),
            object: constraint(&triple.object),
        }
    }

    /// Creates a new pattern that matches a specific subject.
    pub fn subject(subject: Node) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    /// Creates a new pattern that matches a specific predicate.
    pub fn predicate(predicate: Node) -> Self {
        Self {
            predicate: Some(predicate),
            ..Default::default()
        }
    }

    /// Creates a new pattern that matches a specific object.
    pub fn object(object: Node) -> Self {
        Self {
            object: Some(object),
            ..Default::default()
        }
    }

    /// Adds a subject constraint to the pattern.
    pub fn with_subject(mut self, subject: Node) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Adds a predicate constraint to the pattern.
    pub fn with_predicate(mut self, predicate: Node) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Adds an object constraint to the pattern.
    pub fn with_object(mut self, object: Node) -> Self {
        self.object = Some(object);
        self
    }

    /// Returns `true` if the given [`Triple`] matches this pattern.
    pub fn matches(&self, triple: &Triple) -> bool {
        fn check(constraint: &Option<Node>, node: &Node) -> bool {
            constraint.as_ref().map_or(true, |c| c == node)
        }
        check(&self.subject, &triple.subject)
            && check(&self.predicate, &triple.predicate)
            && check(&self.object, &triple.object)
    }

    /// Returns `true` if all components are specified.
    pub fn is_exact(&self) -> bool {
        self.subject.is_some() && self.predicate.is_some() && self.object.is_some()
    }

    /// Returns `true` if the pattern is a wildcard (all components are `None`).
    pub fn is_wildcard(&self) -> bool {
        self.subject.is_none() && self.predicate.is_none() && self.object.is_none()
    }
}

impl From<&Triple> for TriplePattern {
    fn from(triple: &Triple) -> Self {
        Self::from_triple(triple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact() -> Triple {
        Triple::new(Node::uri("alice"), Node::uri("knows"), Node::uri("bob"))
    }

    #[test]
    fn test_pattern_matching() {
        assert!(TriplePattern::any().matches(&fact()));
        assert!(TriplePattern::subject(Node::uri("alice")).matches(&fact()));
        assert!(!TriplePattern::subject(Node::uri("bob")).matches(&fact()));
        assert!(TriplePattern::predicate(Node::uri("knows"))
            .with_object(Node::uri("bob"))
            .matches(&fact()));
    }

    #[test]
    fn test_exact_and_wildcard() {
        assert!(TriplePattern::any().is_wildcard());
        assert!(TriplePattern::from_triple(&fact()).is_exact());
    }

    #[test]
    fn test_from_triple_with_wildcard() {
        let t = Triple::new(Node::Any, Node::uri("p"), Node::var("o"));
        let p = TriplePattern::from(&t);
        assert_eq!(p, TriplePattern::predicate(Node::uri("p")));
    }
}
