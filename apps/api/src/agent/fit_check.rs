//! Fit gate: decides whether a résumé overlaps enough with the role to be worth
//! optimizing. Keyword overlap only, no LLM call.
//!
//! fit_score = 0.6 × required_ratio + 0.3 × keyword_ratio + 0.1 × preferred_ratio

use serde::{Deserialize, Serialize};

use crate::agent::markup::strip_markup;
use crate::agent::models::JobRequirements;
use crate::agent::scoring::round_to;
use crate::agent::state::{DecisionRecord, Node};

const REQUIRED_WEIGHT: f64 = 0.6;
const KEYWORD_WEIGHT: f64 = 0.3;
const PREFERRED_WEIGHT: f64 = 0.1;

/// Score at which the gate is least certain; confidence grows with distance from it.
const AMBIGUITY_MIDPOINT: f64 = 0.35;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Decision boundaries on the weighted fit score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitThresholds {
    /// Below this → `PoorFit`.
    pub poor: f64,
    /// Below this (and at or above `poor`) → `PartialFit`.
    pub partial: f64,
}

impl Default for FitThresholds {
    fn default() -> Self {
        Self {
            poor: 0.25,
            partial: 0.45,
        }
    }
}

impl FitThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.poor) || !(0.0..=1.0).contains(&self.partial) {
            return Err("fit thresholds must be within [0, 1]".to_string());
        }
        if self.poor > self.partial {
            return Err(format!(
                "poor fit threshold ({}) must not exceed partial fit threshold ({})",
                self.poor, self.partial
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitDecision {
    PoorFit,
    PartialFit,
    GoodFit,
}

impl FitDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitDecision::PoorFit => "poor_fit",
            FitDecision::PartialFit => "partial_fit",
            FitDecision::GoodFit => "good_fit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapRatios {
    pub required: f64,
    pub keywords: f64,
    pub preferred: f64,
}

/// Result of the gate. Computed once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitAssessment {
    pub decision: FitDecision,
    pub score: f64,      // 0.0 – 1.0, 3 decimals
    pub confidence: f64, // 0.5 – 0.95, 2 decimals
    pub reason: String,
    pub ratios: OverlapRatios,
    pub matched_required: usize,
    pub required_total: usize,
}

impl FitAssessment {
    /// The single audit record the gate contributes to the decision log.
    pub fn decision_record(&self) -> DecisionRecord {
        DecisionRecord::new(Node::FitCheck, "assessed_role_fit")
            .with("fit_decision", self.decision.as_str())
            .with("fit_score", self.score)
            .with("confidence", self.confidence)
            .with("matched_required_count", self.matched_required)
            .with("required_count", self.required_total)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Core algorithm
// ────────────────────────────────────────────────────────────────────────────

pub fn assess_fit(
    resume: &str,
    requirements: &JobRequirements,
    thresholds: &FitThresholds,
) -> FitAssessment {
    let text = strip_markup(resume).to_lowercase();

    let required = normalize_terms(&requirements.required_skills);
    let preferred = normalize_terms(&requirements.preferred_skills);
    let keywords = normalize_terms(&requirements.key_keywords);

    let matched_required = count_matches(&required, &text);
    let ratios = OverlapRatios {
        required: ratio(matched_required, required.len()),
        keywords: ratio(count_matches(&keywords, &text), keywords.len()),
        preferred: ratio(count_matches(&preferred, &text), preferred.len()),
    };

    let score = round_to(
        REQUIRED_WEIGHT * ratios.required
            + KEYWORD_WEIGHT * ratios.keywords
            + PREFERRED_WEIGHT * ratios.preferred,
        3,
    );

    let (decision, reason) = classify(score, thresholds);
    let confidence = round_to(
        (0.5 + (score - AMBIGUITY_MIDPOINT).abs()).clamp(0.5, 0.95),
        2,
    );

    FitAssessment {
        decision,
        score,
        confidence,
        reason: reason.to_string(),
        ratios,
        matched_required,
        required_total: required.len(),
    }
}

fn classify(score: f64, thresholds: &FitThresholds) -> (FitDecision, &'static str) {
    if score < thresholds.poor {
        (
            FitDecision::PoorFit,
            "Résumé has very little overlap with the core requirements of the role.",
        )
    } else if score < thresholds.partial {
        (
            FitDecision::PartialFit,
            "Résumé partially overlaps with the role requirements; optimization may help.",
        )
    } else {
        (
            FitDecision::GoodFit,
            "Résumé already aligns with the role; optimization should sharpen it further.",
        )
    }
}

fn normalize_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn count_matches(terms: &[String], text: &str) -> usize {
    terms.iter().filter(|t| text.contains(t.as_str())).count()
}

fn ratio(matched: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    matched as f64 / total as f64
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
