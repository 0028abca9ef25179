//! Core types for risk scoring.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Risk level assigned to a question.
///
/// Ordered from least to most severe, so levels compare with `<` and `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Nothing matched
    #[default]
    #[serde(rename = "no_risk_clear", alias = "no_risk")]
    NoRisk,
    /// Weak signal, informational only
    LowRisk,
    /// Worth a caution flag
    MediumRisk,
    /// Strong deception or manipulation signal
    HighRisk,
    /// Hard boundary; the question should not be answered
    EthicalBoundary,
}

impl RiskLevel {
    /// Get the wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoRisk => "no_risk_clear",
            Self::LowRisk => "low_risk",
            Self::MediumRisk => "medium_risk",
            Self::HighRisk => "high_risk",
            Self::EthicalBoundary => "ethical_boundary",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RiskAssessment {
    /// Combined score (0.0 - 1.0)
    pub score: f64,
    /// Level derived from the score
    pub level: RiskLevel,
    /// Highest-contributing reasons, most significant first
    pub reasons: Vec<String>,
    /// Set when a boundary pattern matched
    pub immediate_block: bool,
    /// Categories of the tiers that fired, sorted
    #[serde(default)]
    pub categories: Vec<String>,
}

impl RiskAssessment {
    /// An assessment with no findings.
    pub fn clear(reason: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            level: RiskLevel::NoRisk,
            reasons: vec![reason.into()],
            immediate_block: false,
            categories: Vec::new(),
        }
    }

    /// Whether the question crossed at least the medium threshold.
    pub fn is_elevated(&self) -> bool {
        self.level >= RiskLevel::MediumRisk
    }
}

/// Error types for risk scoring.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// A rule pattern failed to compile
    #[error("Invalid pattern in rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    /// A weight, factor, cap or threshold is out of range
    #[error("Invalid rule table: {0}")]
    InvalidRule(String),

    /// The rule table could not be parsed
    #[error("Rule table parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The rule table file could not be read
    #[error("Rule table IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for risk scoring.
pub type Result<T> = std::result::Result<T, RiskError>;
