//! Literal values that appear in the object position of a triple.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// XML Schema namespace used for datatype URIs.
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// A literal term.
///
/// Two literals are the same term only if they have the same variant and the
/// same value, so `Integer(2)` and `Float(2.0)` are distinct terms. Numeric
/// comparison across variants is available through [`Literal::as_number`].
///
/// # Examples
///
/// ```
/// use infer_graph::Literal;
///
/// let age = Literal::integer(30);
/// assert_eq!(age.as_integer(), Some(30));
/// assert_eq!(age.as_number(), Some(30.0));
///
/// let name = Literal::string("Alice");
/// assert_eq!(name.lexical_form(), "Alice");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    /// A plain UTF-8 string literal.
    String(String),

    /// A 64-bit signed integer literal.
    Integer(i64),

    /// A 64-bit floating-point literal.
    Float(f64),

    /// A boolean literal.
    Boolean(bool),

    /// A literal with an explicit datatype URI, similar to RDF typed literals.
    Typed { value: String, datatype: String },

    /// A string literal with a language tag.
    LangString { value: String, lang: String },
}

impl Literal {
    /// Creates a plain string literal.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Creates an integer literal.
    pub fn integer(n: i64) -> Self {
        Self::Integer(n)
    }

    /// Creates a floating-point literal.
    pub fn float(f: f64) -> Self {
        Self::Float(f)
    }

    /// Creates a boolean literal.
    pub fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Creates a typed literal.
    ///
    /// ```
    /// use infer_graph::Literal;
    ///
    /// let date = Literal::typed("2024-01-01", "http://www.w3.org/2001/XMLSchema#date");
    /// assert_eq!(date.datatype(), "http://www.w3.org/2001/XMLSchema#date");
    /// ```
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Typed {
            value: value.into(),
            datatype: datatype.into(),
        }
    }

    /// Creates a language-tagged string literal.
    pub fn lang_string(value: impl Into<String>, lang: impl Into<String>) -> Self {
        Self::LangString {
            value: value.into(),
            lang: lang.into(),
        }
    }

    /// Returns the string content for `String` and `LangString` literals.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::LangString { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns the value if this is an `Integer` literal, or a typed literal
    /// whose lexical form parses as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Typed { value, datatype } if is_integer_type(datatype) => value.parse().ok(),
            _ => None,
        }
    }

    /// Returns the numeric value of any numeric literal as an `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Typed { value, datatype } if is_numeric_type(datatype) => value.parse().ok(),
            _ => None,
        }
    }

    /// Returns the value if this is a `Boolean` literal.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` for integer, float and numerically typed literals.
    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    /// Returns `true` if the literal holds a whole number (no fractional part
    /// is representable in its type).
    pub fn is_integral(&self) -> bool {
        self.as_integer().is_some()
    }

    /// The lexical form of the literal, without quotes, datatype or language tag.
    pub fn lexical_form(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Typed { value, .. } => value.clone(),
            Self::LangString { value, .. } => value.clone(),
        }
    }

    /// The datatype URI of the literal.
    pub fn datatype(&self) -> String {
        match self {
            Self::String(_) => format!("{}string", XSD),
            Self::Integer(_) => format!("{}integer", XSD),
            Self::Float(_) => format!("{}double", XSD),
            Self::Boolean(_) => format!("{}boolean", XSD),
            Self::Typed { datatype, .. } => datatype.clone(),
            Self::LangString { .. } => {
                "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString".to_string()
            }
        }
    }
}

fn is_integer_type(datatype: &str) -> bool {
    matches!(
        datatype.strip_prefix(XSD),
        Some("integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger")
    )
}

fn is_numeric_type(datatype: &str) -> bool {
    is_integer_type(datatype)
        || matches!(
            datatype.strip_prefix(XSD),
            Some("decimal" | "double" | "float")
        )
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (
                Self::Typed {
                    value: v1,
                    datatype: d1,
                },
                Self::Typed {
                    value: v2,
                    datatype: d2,
                },
            ) => v1 == v2 && d1 == d2,
            (
                Self::LangString { value: v1, lang: l1 },
                Self::LangString { value: v2, lang: l2 },
            ) => v1 == v2 && l1.eq_ignore_ascii_case(l2),
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::String(s) => s.hash(state),
            Self::Integer(n) => n.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Boolean(b) => b.hash(state),
            Self::Typed { value, datatype } => {
                value.hash(state);
                datatype.hash(state);
            }
            Self::LangString { value, lang } => {
                value.hash(state);
                lang.to_ascii_lowercase().hash(state);
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{:?}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Typed { value, datatype } => write!(f, "\"{}\"^^<{}>", value, datatype),
            Self::LangString { value, lang } => write!(f, "\"{}\"@{}", value, lang),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
