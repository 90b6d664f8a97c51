//! Triple indexes for efficient querying
//!
//! Implements SPO, POS, and OSP indexes:
//! - SPO: Find all triples for a subject, or subject+predicate
//! - POS: Find all triples for a predicate, or predicate+object
//! - OSP: Find all triples pointing to an object, or object+subject
//!
//! The maps are insertion ordered so that lookups return triples in a
//! deterministic order.

use crate::{Error, Node, Result, Triple, TriplePattern};
use indexmap::{IndexMap, IndexSet};

type Level = IndexMap<Node, IndexMap<Node, IndexSet<Node>>>;

/// Types of indexes available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// Subject-Predicate-Object index
    SPO,
    /// Predicate-Object-Subject index
    POS,
    /// Object-Subject-Predicate index
    OSP,
}

/// A three-way triple index.
#[derive(Debug, Default, Clone)]
pub struct TripleIndex {
    /// subject -> predicate -> objects
    spo: Level,
    /// predicate -> object -> subjects
    pos: Level,
    /// object -> subject -> predicates
    osp: Level,
    len: usize,
}

fn insert_into(level: &mut Level, a: &Node, b: &Node, c: &Node) -> bool {
    level
        .entry(a.clone())
        .or_default()
        .entry(b.clone())
        .or_default()
        .insert(c.clone())
}

fn remove_from(level: &mut Level, a: &Node, b: &Node, c: &Node) -> bool {
    let Some(second) = level.get_mut(a) else {
        return false;
    };
    let Some(third) = second.get_mut(b) else {
        return false;
    };
    let removed = third.shift_remove(c);
    if third.is_empty() {
        second.shift_remove(b);
    }
    if second.is_empty() {
        level.shift_remove(a);
    }
    removed
}

impl TripleIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple into all indexes. Returns `false` if it was already present.
    pub fn insert(&mut self, triple: &Triple) -> Result<bool> {
        let (s, p, o) = (&triple.subject, &triple.predicate, &triple.object);
        let added = insert_into(&mut self.spo, s, p, o);
        let in_pos = insert_into(&mut self.pos, p, o, s);
        let in_osp = insert_into(&mut self.osp, o, s, p);
        if added != in_pos || added != in_osp {
            return Err(Error::Index(format!("indexes disagree on {}", triple)));
        }
        if added {
            self.len += 1;
        }
        Ok(added)
    }

    /// Remove a triple from all indexes. Returns `false` if it was not present.
    pub fn remove(&mut self, triple: &Triple) -> Result<bool> {
        let (s, p, o) = (&triple.subject, &triple.predicate, &triple.object);
        let removed = remove_from(&mut self.spo, s, p, o);
        let in_pos = remove_from(&mut self.pos, p, o, s);
        let in_osp = remove_from(&mut self.osp, o, s, p);
        if removed != in_pos || removed != in_osp {
            return Err(Error::Index(format!("indexes disagree on {}", triple)));
        }
        if removed {
            self.len -= 1;
        }
        Ok(removed)
    }

    /// Returns `true` if the exact triple is indexed.
    pub fn contains(&self, triple: &Triple) -> bool {
        self.spo
            .get(&triple.subject)
            .and_then(|preds| preds.get(&triple.predicate))
            .is_some_and(|objs| objs.contains(&triple.object))
    }

    /// Picks the index that fits the pattern's bound positions.
    pub fn index_for(pattern: &TriplePattern) -> IndexType {
        match (&pattern.subject, &pattern.predicate, &pattern.object) {
            (Some(_), Some(_), _) | (Some(_), None, None) | (None, None, None) => IndexType::SPO,
            (None, Some(_), _) => IndexType::POS,
            (_, None, Some(_)) => IndexType::OSP,
        }
    }

    /// Finds all triples matching the pattern.
    pub fn find(&self, pattern: &TriplePattern) -> Vec<Triple> {
        let (s, p, o) = (&pattern.subject, &pattern.predicate, &pattern.object);
        match Self::index_for(pattern) {
            IndexType::SPO => scan(&self.spo, s, p, o, |a, b, c| Triple::new(a, b, c)),
            IndexType::POS => scan(&self.pos, p, o, s, |a, b, c| Triple::new(c, a, b)),
            IndexType::OSP => scan(&self.osp, o, s, p, |a, b, c| Triple::new(b, c, a)),
        }
    }

    /// Number of indexed triples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get count of unique subjects
    pub fn subject_count(&self) -> usize {
        self.spo.len()
    }

    /// Get count of unique predicates
    pub fn predicate_count(&self) -> usize {
        self.pos.len()
    }

    /// Get count of unique objects
    pub fn object_count(&self) -> usize {
        self.osp.len()
    }

    /// Clear all indexes
    pub fn clear(&mut self) {
        self.spo.clear();
        self.pos.clear();
        self.osp.clear();
        self.len = 0;
    }
}

/// Walks one index level by level, narrowing wherever a key is bound.
fn scan(
    level: &Level,
    a: &Option<Node>,
    b: &Option<Node>,
    c: &Option<Node>,
    build: impl Fn(Node, Node, Node) -> Triple,
) -> Vec<Triple> {
    let mut out = Vec::new();
    let firsts: Vec<(&Node, &IndexMap<Node, IndexSet<Node>>)> = match a {
        Some(key) => level.get_key_value(key).into_iter().collect(),
        None => level.iter().collect(),
    };
    for (ka, second) in firsts {
        let seconds: Vec<(&Node, &IndexSet<Node>)> = match b {
            Some(key) => second.get_key_value(key).into_iter().collect(),
            None => second.iter().collect(),
        };
        for (kb, third) in seconds {
            match c {
                Some(key) => {
                    if third.contains(key) {
                        out.push(build(ka.clone(), kb.clone(), key.clone()));
                    }
                }
                None => {
                    for kc in third {
                        out.push(build(ka.clone(), kb.clone(), kc.clone()));
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Node::uri(s), Node::uri(p), Node::uri(o))
    }

    fn sample() -> TripleIndex {
        let mut index = TripleIndex::new();
        index.insert(&t("alice", "knows", "bob")).unwrap();
        index.insert(&t("alice", "likes", "carol")).unwrap();
        index.insert(&t("bob", "knows", "carol")).unwrap();
        index
    }

    #[test]
    fn test_insert_duplicate() {
        let mut index = sample();
        assert!(!index.insert(&t("alice", "knows", "bob")).unwrap());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_find_by_each_index() {
        let index = sample();
        let by_subject = index.find(&TriplePattern::subject(Node::uri("alice")));
        assert_eq!(by_subject.len(), 2);

        let by_predicate = index.find(&TriplePattern::predicate(Node::uri("knows")));
        assert_eq!(
            by_predicate,
            vec![t("alice", "knows", "bob"), t("bob", "knows", "carol")]
        );

        let by_object = index.find(&TriplePattern::object(Node::uri("carol")));
        assert_eq!(by_object.len(), 2);

        let object_subject = index.find(
            &TriplePattern::object(Node::uri("carol")).with_subject(Node::uri("bob")),
        );
        assert_eq!(object_subject, vec![t("bob", "knows", "carol")]);
    }

    #[test]
    fn test_index_choice() {
        assert_eq!(
            TripleIndex::index_for(&TriplePattern::predicate(Node::uri("p"))),
            IndexType::POS
        );
        assert_eq!(
            TripleIndex::index_for(&TriplePattern::object(Node::uri("o"))),
            IndexType::OSP
        );
        assert_eq!(
            TripleIndex::index_for(&TriplePattern::any()),
            IndexType::SPO
        );
    }

    #[test]
    fn test_remove_cleans_levels() {
        let mut index = sample();
        assert!(index.remove(&t("alice", "likes", "carol")).unwrap());
        assert!(!index.remove(&t("alice", "likes", "carol")).unwrap());
        assert_eq!(index.len(), 2);
        assert_eq!(index.predicate_count(), 1);
        assert!(!index.contains(&t("alice", "likes", "carol")));
    }

    #[test]
    fn test_counts() {
        let index = sample();
        assert_eq!(index.subject_count(), 2);
        assert_eq!(index.predicate_count(), 2);
        assert_eq!(index.object_count(), 2);
    }
}
