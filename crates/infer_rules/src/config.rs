//! Reasoner configuration.
//!
//! # Examples
//!
//! ```
//! use infer_rules::{InferenceMode, ReasonerConfig};
//!
//! let config = ReasonerConfig::from_json(r#"{ "mode": "backward", "max_backward_depth": 32 }"#).unwrap();
//! assert_eq!(config.mode, InferenceMode::Backward);
//! assert_eq!(config.max_backward_depth, 32);
//! assert!(!config.derivation_logging);
//! ```

use serde::{Deserialize, Serialize};

use crate::backward::DEFAULT_MAX_DEPTH;
use crate::error::{Error, Result};

/// Which engine evaluates the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Every rule is compiled into the forward network; backward rules are
    /// rejected.
    Forward,
    /// Every rule is evaluated on demand, when the graph is queried.
    Backward,
    /// Forward rules are maintained eagerly and backward rules answer
    /// queries over the forward closure.
    #[default]
    Hybrid,
}

impl std::fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Settings for a [`Reasoner`](crate::Reasoner) and the graphs bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub mode: InferenceMode,
    /// Record a derivation for every conclusion. Costs memory proportional
    /// to the number of firings.
    pub derivation_logging: bool,
    /// Deepest proof the backward engine will search.
    pub max_backward_depth: usize,
    /// Log every rule firing at info level.
    pub trace_firings: bool,
    /// Re-check passes allowed per update when rules use negation.
    pub max_recheck_rounds: usize,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            mode: InferenceMode::default(),
            derivation_logging: false,
            max_backward_depth: DEFAULT_MAX_DEPTH,
            trace_firings: false,
            max_recheck_rounds: 64,
        }
    }
}

impl ReasonerConfig {
    /// Forward-only evaluation.
    pub fn forward() -> Self {
        Self {
            mode: InferenceMode::Forward,
            ..Self::default()
        }
    }

    /// Query-time evaluation of every rule.
    pub fn backward() -> Self {
        Self {
            mode: InferenceMode::Backward,
            ..Self::default()
        }
    }

    /// Hybrid evaluation with derivations recorded; for tests and debugging.
    pub fn explain() -> Self {
        Self {
            derivation_logging: true,
            trace_firings: true,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_backward_depth == 0 {
            return Err(Error::Config("max_backward_depth must be at least 1".into()));
        }
        Ok(())
    }
}
