//! Versioned, data-driven rule table.
//!
//! Every pattern, weight, cap and threshold the scorer uses lives here, so a
//! deployment can ship its own table as YAML without touching code. Fields
//! missing from a YAML table keep their built-in values.

use serde::{Deserialize, Serialize};

use crate::types::{Result, RiskError};

/// Version tag of the built-in table.
pub const BUILTIN_VERSION: &str = "2024.1";

/// Phrases that express intent to act rather than curiosity about a topic.
const INTENT: &str = r"(how (to|can i|do i|could i|would i|should i)|help me|teach me|show me|(best |easiest |quickest )?ways? to|i (want|need|plan) to)";

/// Complete scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTable {
    /// Table version, reported alongside assessments
    pub version: String,
    /// Trimmed inputs shorter than this (in characters) are not scored
    pub min_length: usize,
    /// Maximum number of reasons returned
    pub max_reasons: usize,
    /// Score pinned on a boundary match
    pub boundary_score: f64,
    /// Weight of the pattern score in the combined score
    pub pattern_weight: f64,
    /// Weight of the contextual score in the combined score
    pub contextual_weight: f64,
    /// Ceiling for the summed tier hits
    pub pattern_cap: f64,
    /// Ceiling for the summed contextual cues
    pub contextual_cap: f64,
    /// Level thresholds
    pub thresholds: LevelThresholds,
    /// Immediate-block patterns
    pub boundary: Vec<BoundaryRule>,
    /// Weighted pattern tiers
    pub tiers: Vec<PatternTier>,
    /// Additive phrase cues
    pub contextual: Vec<ContextRule>,
    /// Dampening for legitimate inquiry framing
    pub mitigations: Vec<MitigationRule>,
}

/// Score thresholds; a level applies when the score is strictly above it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            high: 0.3,
            medium: 0.1,
            low: 0.02,
        }
    }
}

/// A high-precision pattern that blocks on match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryRule {
    /// Rule identifier
    pub id: String,
    /// Regular expression, matched case-insensitively
    pub pattern: String,
}

/// A tier of patterns that share a weight and category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTier {
    /// Tier name, e.g. `high_risk`
    pub name: String,
    /// Category reported when the tier fires
    pub category: String,
    /// Added to the pattern score once per matching pattern
    pub weight: f64,
    /// Regular expressions, matched case-insensitively
    pub patterns: Vec<String>,
}

/// A phrase cue that adds to the contextual score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRule {
    /// Rule identifier
    pub id: String,
    /// Regular expression, matched case-insensitively
    pub pattern: String,
    /// Added to the contextual score on match
    pub weight: f64,
}

/// Framing that multiplies the weighted score by `factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationRule {
    /// Rule identifier
    pub id: String,
    /// Regular expression, matched case-insensitively
    pub pattern: String,
    /// Multiplier in [0, 1]
    pub factor: f64,
}

impl RuleTable {
    /// Load a table from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: Self = serde_yaml::from_str(yaml)?;
        table.validate()?;
        Ok(table)
    }

    /// Load a table from a YAML file.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check that weights, caps and thresholds are in range.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| -> Result<()> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(RiskError::InvalidRule(format!("{name} must be in [0, 1], got {value}")))
            }
        };

        unit("boundary_score", self.boundary_score)?;
        unit("pattern_weight", self.pattern_weight)?;
        unit("contextual_weight", self.contextual_weight)?;
        unit("pattern_cap", self.pattern_cap)?;
        unit("contextual_cap", self.contextual_cap)?;

        if self.pattern_weight + self.contextual_weight > 1.0 + f64::EPSILON {
            return Err(RiskError::InvalidRule(
                "pattern_weight + contextual_weight must not exceed 1".to_string(),
            ));
        }

        let t = &self.thresholds;
        if !(t.high > t.medium && t.medium > t.low && t.low >= 0.0 && t.high <= 1.0) {
            return Err(RiskError::InvalidRule(format!(
                "thresholds must satisfy 1 >= high > medium > low >= 0, got {}/{}/{}",
                t.high, t.medium, t.low
            )));
        }

        if self.max_reasons == 0 {
            return Err(RiskError::InvalidRule("max_reasons must be at least 1".to_string()));
        }

        for tier in &self.tiers {
            unit(&format!("tier '{}' weight", tier.name), tier.weight)?;
        }
        for rule in &self.contextual {
            unit(&format!("contextual '{}' weight", rule.id), rule.weight)?;
        }
        for rule in &self.mitigations {
            unit(&format!("mitigation '{}' factor", rule.id), rule.factor)?;
        }

        Ok(())
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            version: BUILTIN_VERSION.to_string(),
            min_length: 3,
            max_reasons: 5,
            boundary_score: 0.95,
            pattern_weight: 0.7,
            contextual_weight: 0.3,
            pattern_cap: 1.0,
            contextual_cap: 0.5,
            thresholds: LevelThresholds::default(),
            boundary: default_boundary(),
            tiers: default_tiers(),
            contextual: default_contextual(),
            mitigations: default_mitigations(),
        }
    }
}

fn default_boundary() -> Vec<BoundaryRule> {
    let rule = |id: &str, pattern: String| BoundaryRule {
        id: id.to_string(),
        pattern,
    };

    vec![
        rule(
            "forged_credentials",
            format!(
                r"\b{INTENT}\b.{{0,30}}\b(forge|fake|counterfeit|falsify)\b.{{0,40}}\b(documents?|passports?|ids?|id cards?|signatures?|certificates?|credentials?|diplomas?|degrees?|licen[cs]es?|prescriptions?|receipts?)\b"
            ),
        ),
        rule(
            "undetectable_manipulation",
            r"\b(undetectabl[ey]|untraceabl[ey]|without (them|anyone|anybody) (noticing|knowing|realizing))\b.{0,40}\b(manipulat\w*|deceiv\w*|gaslight\w*|poison\w*|fraud\w*|lie|lies|lying)\b|\b(manipulat\w*|deceiv\w*|gaslight\w*|poison\w*)\b.{0,40}\b(undetectabl[ey]|untraceabl[ey]|without (them|anyone|anybody) (noticing|knowing|realizing))".to_string(),
        ),
        rule(
            "detection_evasion",
            format!(
                r"\b{INTENT}\b.{{0,40}}\b(forge|fake|counterfeit|steal|launder|smuggle|plagiari[sz]e|evade|avoid|bypass|escape|beat|fool)\b.{{0,40}}\b(without (detection|being detected)|detection|law enforcement|the police|forensics?|auditors?|audits?|plagiarism checkers?|lie detectors?|polygraphs?)\b"
            ),
        ),
    ]
}

fn default_tiers() -> Vec<PatternTier> {
    let tier = |name: &str, category: &str, weight: f64, patterns: &[&str]| PatternTier {
        name: name.to_string(),
        category: category.to_string(),
        weight,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    };

    vec![
        tier(
            "high_risk",
            "manipulation",
            0.4,
            &[
                r"\bdeceiv\w*|\bdecept\w*",
                r"\bmanipulat\w*",
                r"\bfraud\w*",
                r"\bscam\w*",
                r"\bforg(e|ed|ery|ing)\b",
                r"\bcounterfeit\w*",
                r"\bblackmail\w*",
                r"\bgaslight\w*",
                r"\bimpersonat\w*",
                r"\bcheat(s|ed|ing)?\b",
            ],
        ),
        tier(
            "medium_risk",
            "deception",
            0.15,
            &[
                r"\b(lie|lies|lied|lying)\b",
                r"\btrick\w*",
                r"\bmislead\w*|\bmisled\b",
                r"\bconceal\w*",
                r"\b(hide|hiding|hidden)\b",
                r"\bfake\w*",
                r"\bexaggerat\w*",
                r"\bbluff\w*",
                r"\bcover[- ]?up\b",
            ],
        ),
        tier(
            "medical_advice",
            "medical_advice",
            0.05,
            &[
                r"\b(diagnos\w*|prescri\w*|dosage|overdose|medication|symptoms?)\b",
            ],
        ),
        tier(
            "financial_prediction",
            "financial_prediction",
            0.05,
            &[
                r"\b(bitcoin|btc|crypto\w*|stock (price|market)|share price|guaranteed returns?)\b",
            ],
        ),
    ]
}

fn default_contextual() -> Vec<ContextRule> {
    let rule = |id: &str, pattern: &str, weight: f64| ContextRule {
        id: id.to_string(),
        pattern: pattern.to_string(),
        weight,
    };

    vec![
        rule(
            "evasion_phrase",
            r"\bwithout (getting|being) caught\b|\bnot get caught\b|\bget away with\b",
            0.3,
        ),
        rule(
            "secrecy",
            r"\bso (that )?no ?(one|body) (knows|finds out|notices)\b|\bkeep it (a )?secret\b",
            0.2,
        ),
        rule(
            "boundary_probe",
            r"\bwhat if i\b.{0,60}\bwould (it|that) be\b",
            0.2,
        ),
        rule(
            "hypothetical_framing",
            r"\bhypothetically\b|\basking for a friend\b",
            0.1,
        ),
        rule(
            "permission_probe",
            r"\bis it (ok|okay|wrong|bad|illegal) (to|if)\b",
            0.1,
        ),
        rule(
            "minimization",
            r"\bjust (this once|a little)\b|\bharmless (lie|trick|prank)\b",
            0.1,
        ),
    ]
}

fn default_mitigations() -> Vec<MitigationRule> {
    let rule = |id: &str, pattern: &str, factor: f64| MitigationRule {
        id: id.to_string(),
        pattern: pattern.to_string(),
        factor,
    };

    vec![
        rule(
            "philosophical_inquiry",
            r"\b(philosoph\w*|ethics|ethical(ly)?|moral(ity|ly)?|kant\w*|virtue|is it ever (right|justified|ethical))\b",
            0.5,
        ),
        rule(
            "factual_inquiry",
            r"\b(history|psychology|science|definition|origins?|etymology) of\b|^(define|explain)\b",
            0.4,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        let table = RuleTable::default();
        assert!(table.validate().is_ok());
        assert_eq!(table.version, BUILTIN_VERSION);
        assert!(table.tiers.iter().any(|t| t.category == "medical_advice"));
    }

    #[test]
    fn test_yaml_roundtrip_preserves_table() {
        let table = RuleTable::default();
        let yaml = table.to_yaml().unwrap();
        assert_eq!(RuleTable::from_yaml(&yaml).unwrap(), table);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
version: "custom-1"
max_reasons: 3
thresholds:
  high: 0.5
  medium: 0.2
  low: 0.05
"#;
        let table = RuleTable::from_yaml(yaml).unwrap();
        assert_eq!(table.version, "custom-1");
        assert_eq!(table.max_reasons, 3);
        assert_eq!(table.thresholds.high, 0.5);
        assert_eq!(table.boundary, RuleTable::default().boundary);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut table = RuleTable::default();
        table.thresholds.medium = 0.4;
        assert!(matches!(table.validate(), Err(RiskError::InvalidRule(_))));

        let mut table = RuleTable::default();
        table.tiers[0].weight = 1.5;
        assert!(table.validate().is_err());

        let mut table = RuleTable::default();
        table.contextual_weight = 0.6;
        assert!(table.validate().is_err());
    }
}
