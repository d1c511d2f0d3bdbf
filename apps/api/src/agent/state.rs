//! The aggregate threaded through one optimization run.
//!
//! Steps never touch `RunState` directly. Each returns a `StateUpdate` holding
//! only what it changed and the controller merges it with `RunState::apply`.
//! Score history and the decision log are append-only; there is no update
//! variant that removes from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agent::fit_check::{FitAssessment, FitDecision, FitThresholds};
use crate::agent::models::{ImprovementPlan, JobRequirements, ResumeAnalysis};
use crate::agent::routing::StopReason;
use crate::agent::scoring::{AtsScore, ScoreBreakdown};

// ────────────────────────────────────────────────────────────────────────────
// Configuration carried by a run
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminationConfig {
    pub max_iterations: u32,
    pub target_score: f64,
    pub min_iteration_gain: f64,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            target_score: 75.0,
            min_iteration_gain: 1.0,
        }
    }
}

impl TerminationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.target_score) {
            return Err(format!(
                "target_score must be within [0, 100], got {}",
                self.target_score
            ));
        }
        if !(self.min_iteration_gain >= 0.0) {
            return Err(format!(
                "min_iteration_gain must be non-negative, got {}",
                self.min_iteration_gain
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RejectedPoorFit,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::RejectedPoorFit => "rejected_poor_fit",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Decision log
// ────────────────────────────────────────────────────────────────────────────

/// Pipeline nodes, as named in the decision log and in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    ExtractRequirements,
    AnalyzeResume,
    FitCheck,
    ScoreInitial,
    PlanImprovements,
    ModifyResume,
    ScoreModified,
    Router,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::ExtractRequirements => "extract_requirements",
            Node::AnalyzeResume => "analyze_resume",
            Node::FitCheck => "fit_check",
            Node::ScoreInitial => "score_initial",
            Node::PlanImprovements => "plan_improvements",
            Node::ModifyResume => "modify_resume",
            Node::ScoreModified => "score_modified",
            Node::Router => "router",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry: which node acted, what it did, and node-specific details.
/// Serializes flat: `{"node": "...", "action": "...", ...details}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub node: Node,
    pub action: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl DecisionRecord {
    pub fn new(node: Node, action: impl Into<String>) -> Self {
        Self {
            node,
            action: action.into(),
            details: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Partial updates
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of the rewrite step for the current iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    Text(String),
    /// The rewrite produced nothing usable; the previous rewrite is kept.
    Unusable,
}

/// Outcome of rescoring the current iteration's rewrite.
#[derive(Debug, Clone, PartialEq)]
pub enum Rescore {
    Scored {
        score: AtsScore,
        /// Versus the immediately preceding score (baseline on the first iteration).
        last_iteration_delta: f64,
        /// Versus the baseline.
        improvement_delta: f64,
    },
    Missing,
}

/// The fields one step changed. Anything left `None` is untouched by `apply`.
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub job_requirements: Option<JobRequirements>,
    pub resume_analysis: Option<ResumeAnalysis>,
    pub fit: Option<FitAssessment>,
    pub baseline: Option<AtsScore>,
    pub improvement_plan: Option<ImprovementPlan>,
    pub rewrite: Option<Rewrite>,
    pub rescore: Option<Rescore>,
    /// Ends the run; sets the terminal status.
    pub stop: Option<StopReason>,
    /// Appended to the decision log in order.
    pub decisions: Vec<DecisionRecord>,
}

impl StateUpdate {
    pub fn decision(mut self, record: DecisionRecord) -> Self {
        self.decisions.push(record);
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// The aggregate
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub stop_reason: Option<StopReason>,
    pub job_description: String,
    pub original_resume: String,
    /// Latest usable rewrite.
    pub modified_resume: Option<String>,
    /// Whether the most recent rewrite step produced usable text.
    pub rewrite_usable: bool,

    pub job_requirements: Option<JobRequirements>,
    pub resume_analysis: Option<ResumeAnalysis>,
    pub fit: Option<FitAssessment>,

    pub ats_score_before: Option<f64>,
    pub ats_breakdown_before: Option<ScoreBreakdown>,
    /// Latest successfully rescored value.
    pub ats_score_after: Option<f64>,
    pub ats_breakdown_after: Option<ScoreBreakdown>,
    /// Result of the most recent rescoring step; `None` when its rewrite was unusable.
    pub last_rescore: Option<f64>,
    pub last_iteration_delta: Option<f64>,
    pub improvement_delta: Option<f64>,
    pub score_history: Vec<f64>,

    pub improvement_plan: Option<ImprovementPlan>,
    /// Completed (rescored) iterations.
    pub iteration_count: u32,
    pub decision_log: Vec<DecisionRecord>,

    pub termination: TerminationConfig,
    pub fit_thresholds: FitThresholds,
}

impl RunState {
    pub fn new(
        job_description: impl Into<String>,
        original_resume: impl Into<String>,
        termination: TerminationConfig,
        fit_thresholds: FitThresholds,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            stop_reason: None,
            job_description: job_description.into(),
            original_resume: original_resume.into(),
            modified_resume: None,
            rewrite_usable: false,
            job_requirements: None,
            resume_analysis: None,
            fit: None,
            ats_score_before: None,
            ats_breakdown_before: None,
            ats_score_after: None,
            ats_breakdown_after: None,
            last_rescore: None,
            last_iteration_delta: None,
            improvement_delta: None,
            score_history: Vec::new(),
            improvement_plan: None,
            iteration_count: 0,
            decision_log: Vec::new(),
            termination,
            fit_thresholds,
        }
    }

    pub fn fit_decision(&self) -> Option<FitDecision> {
        self.fit.as_ref().map(|f| f.decision)
    }

    /// The score the next rescore is compared against.
    pub fn previous_score(&self) -> Option<f64> {
        self.score_history.last().copied().or(self.ats_score_before)
    }

    /// Merges a step's partial update into the aggregate.
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            job_requirements,
            resume_analysis,
            fit,
            baseline,
            improvement_plan,
            rewrite,
            rescore,
            stop,
            decisions,
        } = update;

        if let Some(requirements) = job_requirements {
            self.job_requirements = Some(requirements);
        }
        if let Some(analysis) = resume_analysis {
            self.resume_analysis = Some(analysis);
        }
        if let Some(fit) = fit {
            self.fit = Some(fit);
        }
        if let Some(baseline) = baseline {
            self.ats_score_before = Some(baseline.score);
            self.ats_breakdown_before = Some(baseline.breakdown);
        }
        if let Some(plan) = improvement_plan {
            self.improvement_plan = Some(plan);
        }

        match rewrite {
            Some(Rewrite::Text(text)) => {
                self.modified_resume = Some(text);
                self.rewrite_usable = true;
            }
            Some(Rewrite::Unusable) => self.rewrite_usable = false,
            None => {}
        }

        match rescore {
            Some(Rescore::Scored {
                score,
                last_iteration_delta,
                improvement_delta,
            }) => {
                self.ats_score_after = Some(score.score);
                self.ats_breakdown_after = Some(score.breakdown);
                self.last_rescore = Some(score.score);
                self.last_iteration_delta = Some(last_iteration_delta);
                self.improvement_delta = Some(improvement_delta);
                self.score_history.push(score.score);
                self.iteration_count += 1;
            }
            Some(Rescore::Missing) => self.last_rescore = None,
            None => {}
        }

        if let Some(reason) = stop {
            self.status = reason.final_status();
            self.stop_reason = Some(reason);
        }

        self.decision_log.extend(decisions);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn new_state() -> RunState {
        RunState::new(
            "Backend engineer",
            "Rust developer",
            TerminationConfig::default(),
            FitThresholds::default(),
        )
    }

    fn scored(score: f64, last: f64, total: f64) -> Rescore {
        Rescore::Scored {
            score: AtsScore {
                score,
                breakdown: ScoreBreakdown::default(),
            },
            last_iteration_delta: last,
            improvement_delta: total,
        }
    }

    #[test]
    fn test_apply_merges_only_present_fields() {
        let mut state = new_state();
        state.apply(StateUpdate {
            job_requirements: Some(JobRequirements::default()),
            ..Default::default()
        });
        assert!(state.job_requirements.is_some());

        state.apply(StateUpdate::default());
        assert!(state.job_requirements.is_some());
        assert!(state.resume_analysis.is_none());
    }

    #[test]
    fn test_rescore_appends_history_and_counts_iterations() {
        let mut state = new_state();
        state.apply(StateUpdate {
            rescore: Some(scored(60.0, 10.0, 10.0)),
            ..Default::default()
        });
        state.apply(StateUpdate {
            rescore: Some(scored(65.0, 5.0, 15.0)),
            ..Default::default()
        });
        assert_eq!(state.score_history, vec![60.0, 65.0]);
        assert_eq!(state.iteration_count, 2);
        assert_eq!(state.ats_score_after, Some(65.0));
        assert_eq!(state.last_iteration_delta, Some(5.0));
    }

    #[test]
    fn test_missing_rescore_keeps_previous_result() {
        let mut state = new_state();
        state.apply(StateUpdate {
            rescore: Some(scored(60.0, 10.0, 10.0)),
            ..Default::default()
        });
        state.apply(StateUpdate {
            rescore: Some(Rescore::Missing),
            ..Default::default()
        });
        assert_eq!(state.last_rescore, None);
        assert_eq!(state.ats_score_after, Some(60.0));
        assert_eq!(state.iteration_count, 1);
    }

    #[test]
    fn test_unusable_rewrite_keeps_previous_text() {
        let mut state = new_state();
        state.apply(StateUpdate {
            rewrite: Some(Rewrite::Text("v1".to_string())),
            ..Default::default()
        });
        state.apply(StateUpdate {
            rewrite: Some(Rewrite::Unusable),
            ..Default::default()
        });
        assert_eq!(state.modified_resume.as_deref(), Some("v1"));
        assert!(!state.rewrite_usable);
    }

    #[test]
    fn test_previous_score_falls_back_to_baseline() {
        let mut state = new_state();
        assert_eq!(state.previous_score(), None);
        state.apply(StateUpdate {
            baseline: Some(AtsScore {
                score: 40.0,
                breakdown: ScoreBreakdown::default(),
            }),
            ..Default::default()
        });
        assert_eq!(state.previous_score(), Some(40.0));
        state.apply(StateUpdate {
            rescore: Some(scored(55.0, 15.0, 15.0)),
            ..Default::default()
        });
        assert_eq!(state.previous_score(), Some(55.0));
    }

    #[test]
    fn test_decision_log_is_appended_in_order() {
        let mut state = new_state();
        state.apply(
            StateUpdate::default()
                .decision(DecisionRecord::new(Node::ExtractRequirements, "a"))
                .decision(DecisionRecord::new(Node::AnalyzeResume, "b")),
        );
        state.apply(StateUpdate::default().decision(DecisionRecord::new(Node::Router, "c")));
        let actions: Vec<&str> = state.decision_log.iter().map(|d| d.action.as_str()).collect();
        assert_eq!(actions, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_decision_record_serializes_flat() {
        let record = DecisionRecord::new(Node::ScoreModified, "scored_modified_resume")
            .with("score", 71.5)
            .with("delta_vs_previous", 3.25);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["node"], "score_modified");
        assert_eq!(json["action"], "scored_modified_resume");
        assert_eq!(json["score"], 71.5);

        let back: DecisionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_termination_config_validation() {
        assert!(TerminationConfig::default().validate().is_ok());
        let zero = TerminationConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        let over = TerminationConfig {
            target_score: 120.0,
            ..Default::default()
        };
        assert!(over.validate().is_err());
        let negative = TerminationConfig {
            min_iteration_gain: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_stop_sets_terminal_status() {
        let mut state = new_state();
        assert_eq!(state.status, RunStatus::Pending);
        state.apply(StateUpdate {
            stop: Some(StopReason::PoorFit),
            ..Default::default()
        });
        assert_eq!(state.status, RunStatus::RejectedPoorFit);
        assert_eq!(state.stop_reason, Some(StopReason::PoorFit));
    }

    #[test]
    fn test_node_serde_matches_as_str() {
        for node in [Node::ExtractRequirements, Node::PlanImprovements, Node::Router] {
            let json = serde_json::to_value(node).unwrap();
            assert_eq!(json, node.as_str());
        }
    }
}
