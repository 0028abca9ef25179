//! Risk scorer.
//!
//! Scoring runs in three stages:
//!
//! 1. Degenerate input (empty or shorter than `min_length`) is cleared
//!    without matching any pattern.
//! 2. Boundary patterns short-circuit to `ethical_boundary` with a pinned
//!    score. Nothing later in the pipeline can lower it.
//! 3. Otherwise tier hits and contextual cues are summed, capped, weighted
//!    and optionally dampened by a mitigation before thresholding.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use tracing::{debug, info};

use crate::rules::RuleTable;
use crate::types::{Result, RiskAssessment, RiskError, RiskLevel};

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    regex: Regex,
    weight: f64,
}

#[derive(Debug, Clone)]
struct CompiledTier {
    name: String,
    category: String,
    weight: f64,
    patterns: Vec<Regex>,
}

/// One scored finding, ordered by contribution then by rule order.
struct Finding {
    contribution: f64,
    order: usize,
    reason: String,
}

/// Scores questions against a compiled [`RuleTable`].
///
/// Pure and deterministic: the same table and input always produce the same
/// assessment.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    table: RuleTable,
    boundary: Vec<CompiledRule>,
    tiers: Vec<CompiledTier>,
    contextual: Vec<CompiledRule>,
    mitigations: Vec<CompiledRule>,
}

impl RiskScorer {
    /// Validate and compile a rule table.
    pub fn new(table: RuleTable) -> Result<Self> {
        table.validate()?;

        let boundary = table
            .boundary
            .iter()
            .map(|r| compile_rule(&r.id, &r.pattern, 0.0))
            .collect::<Result<Vec<_>>>()?;

        let tiers = table
            .tiers
            .iter()
            .map(|tier| {
                let patterns = tier
                    .patterns
                    .iter()
                    .map(|p| compile(&tier.name, p))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledTier {
                    name: tier.name.clone(),
                    category: tier.category.clone(),
                    weight: tier.weight,
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let contextual = table
            .contextual
            .iter()
            .map(|r| compile_rule(&r.id, &r.pattern, r.weight))
            .collect::<Result<Vec<_>>>()?;

        let mitigations = table
            .mitigations
            .iter()
            .map(|r| compile_rule(&r.id, &r.pattern, r.factor))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            version = %table.version,
            boundary = boundary.len(),
            tiers = tiers.len(),
            "Compiled risk rule table"
        );

        Ok(Self {
            table,
            boundary,
            tiers,
            contextual,
            mitigations,
        })
    }

    /// Compile a table loaded from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::new(RuleTable::from_yaml(yaml)?)
    }

    /// Get the rule table.
    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Get the rule table version.
    pub fn version(&self) -> &str {
        &self.table.version
    }

    /// Score a question.
    pub fn assess(&self, question: &str) -> RiskAssessment {
        let text = question.trim().to_lowercase();

        if text.is_empty() {
            return RiskAssessment::clear("empty question");
        }
        let length = text.chars().count();
        if length < self.table.min_length {
            return RiskAssessment::clear(format!(
                "question too short for assessment ({length} < {} chars)",
                self.table.min_length
            ));
        }

        if let Some(assessment) = self.check_boundary(&text) {
            return assessment;
        }

        let mut findings = Vec::new();
        let mut categories = BTreeSet::new();
        let mut order = 0usize;

        let mut pattern_sum = 0.0;
        for tier in &self.tiers {
            for regex in &tier.patterns {
                order += 1;
                if let Some(m) = regex.find(&text) {
                    pattern_sum += tier.weight;
                    categories.insert(tier.category.clone());
                    findings.push(Finding {
                        contribution: tier.weight * self.table.pattern_weight,
                        order,
                        reason: format!("{} pattern '{}' (+{:.2})", tier.name, m.as_str(), tier.weight),
                    });
                }
            }
        }

        let mut context_sum = 0.0;
        for rule in &self.contextual {
            order += 1;
            if rule.regex.is_match(&text) {
                context_sum += rule.weight;
                findings.push(Finding {
                    contribution: rule.weight * self.table.contextual_weight,
                    order,
                    reason: format!("contextual cue {} (+{:.2})", rule.id, rule.weight),
                });
            }
        }

        let pattern_score = pattern_sum.min(self.table.pattern_cap);
        let context_score = context_sum.min(self.table.contextual_cap);
        let mut score =
            self.table.pattern_weight * pattern_score + self.table.contextual_weight * context_score;

        // Only the strongest dampening applies
        let mitigation = if score > 0.0 {
            self.mitigations
                .iter()
                .filter(|r| r.regex.is_match(&text))
                .min_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(Ordering::Equal))
        } else {
            None
        };
        if let Some(rule) = mitigation {
            score *= rule.weight;
        }
        let score = score.clamp(0.0, 1.0);
        let level = self.level_for(score);

        findings.sort_by(|a, b| {
            b.contribution
                .partial_cmp(&a.contribution)
                .unwrap_or(Ordering::Equal)
                .then(a.order.cmp(&b.order))
        });

        let mut reasons: Vec<String> = findings.into_iter().map(|f| f.reason).collect();
        if reasons.is_empty() {
            reasons.push("no risk indicators matched".to_string());
        }
        match mitigation {
            Some(rule) => {
                reasons.truncate(self.table.max_reasons.saturating_sub(1).max(1));
                reasons.push(format!("mitigated by {} (x{:.2})", rule.id, rule.weight));
                reasons.truncate(self.table.max_reasons);
            }
            None => reasons.truncate(self.table.max_reasons),
        }

        debug!(score, level = %level, pattern_score, context_score, "Assessed question");

        RiskAssessment {
            score,
            level,
            reasons,
            immediate_block: false,
            categories: categories.into_iter().collect(),
        }
    }

    /// Map a score onto a level; thresholds are exclusive.
    pub fn level_for(&self, score: f64) -> RiskLevel {
        let t = &self.table.thresholds;
        if score > t.high {
            RiskLevel::HighRisk
        } else if score > t.medium {
            RiskLevel::MediumRisk
        } else if score > t.low {
            RiskLevel::LowRisk
        } else {
            RiskLevel::NoRisk
        }
    }

    fn check_boundary(&self, text: &str) -> Option<RiskAssessment> {
        let matched: Vec<&CompiledRule> = self
            .boundary
            .iter()
            .filter(|r| r.regex.is_match(text))
            .collect();

        if matched.is_empty() {
            return None;
        }

        let ids: Vec<&str> = matched.iter().map(|r| r.id.as_str()).collect();
        info!(rules = ?ids, "Ethical boundary pattern matched");

        let mut reasons: Vec<String> = ids.iter().map(|id| format!("boundary {id}")).collect();
        reasons.truncate(self.table.max_reasons);

        Some(RiskAssessment {
            score: self.table.boundary_score,
            level: RiskLevel::EthicalBoundary,
            reasons,
            immediate_block: true,
            categories: vec!["ethical_boundary".to_string()],
        })
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        // Covered by test_builtin_table_compiles
        Self::new(RuleTable::default()).expect("built-in risk rules compile")
    }
}

fn compile(rule: &str, pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| RiskError::InvalidPattern {
            rule: rule.to_string(),
            source,
        })
}

fn compile_rule(id: &str, pattern: &str, weight: f64) -> Result<CompiledRule> {
    Ok(CompiledRule {
        id: id.to_string(),
        regex: compile(id, pattern)?,
        weight,
    })
}
