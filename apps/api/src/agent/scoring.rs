//! ATS Scoring — deterministic 0–100 score of a résumé against job requirements.
//!
//! Default: `KeywordAtsScorer` (pure, no LLM call, bit-for-bit reproducible).
//! The controller holds an `Arc<dyn AtsScorer>` so tests can script score sequences.

use serde::{Deserialize, Serialize};

use crate::agent::models::JobRequirements;

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

/// Per-component points. Each component is rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keywords: f64, // 0 – 40
    pub skills: f64,   // 0 – 30
    pub format: f64,   // 0 – 15
    pub sections: f64, // 0 – 15
}

impl ScoreBreakdown {
    pub fn sum(&self) -> f64 {
        self.keywords + self.skills + self.format + self.sections
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtsScore {
    pub score: f64, // 0 – 100
    pub breakdown: ScoreBreakdown,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Scores résumé text against structured requirements. Must be pure.
pub trait AtsScorer: Send + Sync {
    fn score(&self, resume: &str, requirements: &JobRequirements) -> AtsScore;
}

/// Keyword/format/section scorer. The only production backend.
pub struct KeywordAtsScorer;

impl AtsScorer for KeywordAtsScorer {
    fn score(&self, resume: &str, requirements: &JobRequirements) -> AtsScore {
        score_resume(resume, requirements)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Core scoring algorithm
// ────────────────────────────────────────────────────────────────────────────

const KEYWORD_POINTS: f64 = 40.0;
const SKILL_POINTS: f64 = 30.0;
const SECTION_POINTS: f64 = 15.0;

/// Canonical sections and the headings that count as each one.
const SECTIONS: [&[&str]; 4] = [
    &["experience", "work history"],
    &["skills", "technical skills"],
    &["education", "degree"],
    &["summary", "profile", "objective"],
];

/// Scores `resume` against `requirements`.
///
/// Matching is a case-insensitive substring search over the whole text: no
/// tokenization, no stemming.
pub fn score_resume(resume: &str, requirements: &JobRequirements) -> AtsScore {
    let text = resume.to_lowercase();

    let breakdown = ScoreBreakdown {
        keywords: round_to(coverage(&requirements.key_keywords, &text) * KEYWORD_POINTS, 2),
        skills: round_to(coverage(&requirements.required_skills, &text) * SKILL_POINTS, 2),
        format: round_to(format_points(&text), 2),
        sections: round_to(section_points(&text), 2),
    };

    AtsScore {
        score: total_of(&breakdown),
        breakdown,
    }
}

/// Sums the already-rounded components so that `breakdown.sum() == total`
/// holds exactly below the 100 cap.
fn total_of(breakdown: &ScoreBreakdown) -> f64 {
    round_to(breakdown.sum().min(100.0), 2)
}

/// Fraction of `terms` found in `text`. Zero when there are no terms.
fn coverage(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms
        .iter()
        .filter(|term| text.contains(&term.to_lowercase()))
        .count();
    matched as f64 / terms.len() as f64
}

/// Word-count banding (8 / 4 / 0) + bullets (4) + paragraph breaks (3).
fn format_points(text: &str) -> f64 {
    let word_count = text.split_whitespace().count();

    let mut points = if (300..=1000).contains(&word_count) {
        8.0
    } else if (200..=1200).contains(&word_count) {
        4.0
    } else {
        0.0
    };

    if text.contains(['-', '•', '*']) {
        points += 4.0;
    }

    if text.contains("\n\n") || text.contains("\r\n\r\n") {
        points += 3.0;
    }

    points
}

fn section_points(text: &str) -> f64 {
    let found = SECTIONS
        .iter()
        .filter(|aliases| aliases.iter().any(|alias| text.contains(alias)))
        .count();
    found as f64 / SECTIONS.len() as f64 * SECTION_POINTS
}

/// Rounds half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
