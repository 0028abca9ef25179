//! Risk Engine - Heuristic Deception Scoring
//!
//! Scores an oracle question before it is sent, without any knowledge of the
//! ledger:
//!
//! - **Immediate boundary**: High-precision patterns (forged credentials,
//!   undetectable manipulation, detection evasion) block outright
//! - **Weighted heuristic**: Tiered pattern hits plus contextual cues,
//!   `0.7 * pattern + 0.3 * contextual`
//! - **Mitigation**: Inquiry framing dampens the weighted score
//!
//! All patterns, weights and thresholds come from a versioned [`RuleTable`]
//! that can be replaced from YAML.
//!
//! # Example
//!
//! ```ignore
//! use risk_engine::{RiskLevel, RiskScorer};
//!
//! let scorer = RiskScorer::default();
//! let assessment = scorer.assess("How can I forge a document without detection?");
//! assert!(assessment.immediate_block);
//! assert_eq!(assessment.level, RiskLevel::EthicalBoundary);
//! ```

pub mod rules;
pub mod scorer;
pub mod types;

// Re-export main types
pub use rules::{
    BoundaryRule, ContextRule, LevelThresholds, MitigationRule, PatternTier, RuleTable,
    BUILTIN_VERSION,
};
pub use scorer::RiskScorer;
pub use types::*;
