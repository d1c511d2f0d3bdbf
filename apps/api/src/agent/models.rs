//! Structured outputs of the LLM-backed steps: job requirements, résumé analysis,
//! and the improvement plan.
//!
//! Every structure has an `unparseable()` constructor. The controller substitutes it
//! when a step's output cannot be parsed, so downstream steps always see a
//! well-defined (if empty) value with `parse_error` set.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Structured requirements extracted from a job posting. Immutable once stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
    #[serde(default)]
    pub key_keywords: Vec<String>,
    /// Minimum years of experience. Accepts `5`, `"5+"`, `"3.5 years"` or null.
    #[serde(default, deserialize_with = "lenient_years")]
    pub experience_years: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parse_error: bool,
}

impl JobRequirements {
    pub fn unparseable() -> Self {
        Self {
            parse_error: true,
            ..Self::default()
        }
    }

    /// Gives the term lists set semantics: trimmed, no empty terms, and no
    /// case-insensitive duplicates (first spelling wins).
    pub fn sanitized(self) -> Self {
        Self {
            required_skills: dedup_terms(self.required_skills),
            preferred_skills: dedup_terms(self.preferred_skills),
            key_keywords: dedup_terms(self.key_keywords),
            ..self
        }
    }
}

fn dedup_terms(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

fn lenient_years<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let leading: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            leading.parse().ok()
        }
        _ => None,
    })
}

/// Gap analysis of the résumé against the requirements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parse_error: bool,
}

impl ResumeAnalysis {
    pub fn unparseable() -> Self {
        Self {
            parse_error: true,
            ..Self::default()
        }
    }
}

/// What to change in the résumé during one iteration. Overwritten every iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImprovementPlan {
    #[serde(default)]
    pub priority_changes: Vec<String>,
    #[serde(default)]
    pub skill_additions: Vec<String>,
    #[serde(default)]
    pub keyword_insertions: Vec<String>,
    #[serde(default)]
    pub section_improvements: Vec<String>,
    #[serde(default)]
    pub expected_score_gain: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parse_error: bool,
}

impl ImprovementPlan {
    pub fn unparseable() -> Self {
        Self {
            reasoning: "LLM response could not be parsed".to_string(),
            parse_error: true,
            ..Self::default()
        }
    }
}
