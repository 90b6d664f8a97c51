//! Terms of the graph: URIs, literals, blank nodes, and the rule-only terms
//! (variables, wildcards and functors).
//!
//! Every position of a [`Triple`](crate::Triple) holds a `Node`. Stored data
//! only ever contains ground nodes; variables and the wildcard exist so that
//! rule patterns can share the same representation as facts.

use crate::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A rule variable.
///
/// The `index` is the variable's slot in a binding environment. The `name`
/// is kept for display and for telling apart renamed rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var {
    /// Name as written in the rule, without the leading `?`.
    pub name: String,
    /// Slot index, stable for the lifetime of the rule.
    pub index: usize,
}

/// A named argument list.
///
/// In a rule body or head a functor is a procedural call; as the object of a
/// stored triple it is a structured value. Functors do not nest.
///
/// # Examples
///
/// ```
/// use infer_graph::{Functor, Node};
///
/// let f = Functor::new("pair", vec![Node::uri("a"), Node::integer(1)]);
/// assert!(f.is_ground());
/// assert_eq!(f.to_string(), "pair(a, 1)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Functor {
    /// Functor name, which is also the name of the builtin it calls.
    pub name: String,
    /// Ordered arguments.
    pub args: Vec<Node>,
}

impl Functor {
    /// Creates a functor.
    pub fn new(name: impl Into<String>, args: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` if no argument is a variable or a wildcard.
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Node::is_ground)
    }

    /// Returns `true` if one of the arguments is itself a functor.
    pub fn is_nested(&self) -> bool {
        self.args.iter().any(Node::is_functor)
    }

    /// Compares two functors, treating any variable as equal to any other variable.
    pub fn same_as(&self, other: &Functor) -> bool {
        self.name == other.name
            && self.args.len() == other.args.len()
            && self
                .args
                .iter()
                .zip(&other.args)
                .all(|(a, b)| a.same_as(b))
    }
}

impl fmt::Display for Functor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// A term in a triple or rule pattern.
///
/// # Examples
///
/// ```
/// use infer_graph::Node;
///
/// let alice = Node::uri("alice");
/// assert!(alice.is_ground());
///
/// let x = Node::var("x");
/// assert!(x.is_variable());
/// assert!(!x.is_ground());
///
/// let b1 = Node::blank();
/// let b2 = Node::blank();
/// assert_ne!(b1, b2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    /// A URI reference.
    Uri(String),

    /// A literal value.
    Literal(Literal),

    /// An anonymous node with a unique numeric identifier.
    Blank(u64),

    /// A rule variable.
    Variable(Var),

    /// Matches anything and binds nothing.
    Any,

    /// A functor (procedural call or structured value).
    Functor(Box<Functor>),
}

static BLANK_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Node {
    /// Creates a URI node.
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    /// Creates a plain string literal node.
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(Literal::String(s.into()))
    }

    /// Creates an integer literal node.
    pub fn integer(n: i64) -> Self {
        Self::Literal(Literal::Integer(n))
    }

    /// Creates a float literal node.
    pub fn float(f: f64) -> Self {
        Self::Literal(Literal::Float(f))
    }

    /// Creates a boolean literal node.
    pub fn boolean(b: bool) -> Self {
        Self::Literal(Literal::Boolean(b))
    }

    /// Creates a new, unique blank node.
    ///
    /// Each call returns a process-wide unique identifier.
    pub fn blank() -> Self {
        Self::Blank(BLANK_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Creates a blank node with a specific identifier.
    pub fn blank_with_id(id: u64) -> Self {
        Self::Blank(id)
    }

    /// Creates a variable with a slot index of 0.
    ///
    /// Rule construction renumbers variables by first occurrence, so the
    /// index given here is only a placeholder.
    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(Var {
            name: name.into(),
            index: 0,
        })
    }

    /// Creates a variable with an explicit slot index.
    pub fn var_at(name: impl Into<String>, index: usize) -> Self {
        Self::Variable(Var {
            name: name.into(),
            index,
        })
    }

    /// Creates a functor node.
    pub fn functor(name: impl Into<String>, args: Vec<Node>) -> Self {
        Self::Functor(Box::new(Functor::new(name, args)))
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Self::Uri(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn is_functor(&self) -> bool {
        matches!(self, Self::Functor(_))
    }

    /// Returns `true` if neither this node nor any functor argument is a
    /// variable or a wildcard.
    pub fn is_ground(&self) -> bool {
        match self {
            Self::Variable(_) | Self::Any => false,
            Self::Functor(f) => f.is_ground(),
            _ => true,
        }
    }

    /// Returns the URI if this is a `Uri` node.
    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    /// Returns the literal if this is a `Literal` node.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Returns the variable if this is a `Variable` node.
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Self::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the functor if this is a `Functor` node.
    pub fn as_functor(&self) -> Option<&Functor> {
        match self {
            Self::Functor(f) => Some(f),
            _ => None,
        }
    }

    /// Compares two nodes, treating any variable as equal to any other
    /// variable. Used to compare rules that differ only by variable naming.
    pub fn same_as(&self, other: &Node) -> bool {
        match (self, other) {
            (Self::Variable(_), Self::Variable(_)) => true,
            (Self::Functor(a), Self::Functor(b)) => a.same_as(b),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri(uri) => write!(f, "{}", uri),
            Self::Literal(lit) => write!(f, "{}", lit),
            Self::Blank(id) => write!(f, "_:b{}", id),
            Self::Variable(v) => write!(f, "?{}", v.name),
            Self::Any => write!(f, "*"),
            Self::Functor(func) => write!(f, "{}", func),
        }
    }
}

impl From<Literal> for Node {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}

impl From<Functor> for Node {
    fn from(f: Functor) -> Self {
        Self::Functor(Box::new(f))
    }
}
