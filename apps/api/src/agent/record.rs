//! What a caller gets back from a run, and what gets persisted about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::fit_check::{FitAssessment, FitDecision};
use crate::agent::models::{ImprovementPlan, JobRequirements, ResumeAnalysis};
use crate::agent::routing::StopReason;
use crate::agent::scoring::round_to;
use crate::agent::state::{DecisionRecord, RunState, RunStatus};

/// Caller-facing summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub final_status: RunStatus,
    pub stop_reason: Option<StopReason>,
    pub fit_decision: Option<FitDecision>,
    pub fit: Option<FitAssessment>,
    pub ats_score_before: Option<f64>,
    /// Latest successfully rescored value.
    pub ats_score_after: Option<f64>,
    pub improvement_delta: Option<f64>,
    pub score_history: Vec<f64>,
    pub improvement_plan: Option<ImprovementPlan>,
    pub modified_resume: Option<String>,
    pub decision_log: Vec<DecisionRecord>,
    pub iteration_count: u32,
    pub job_requirements: Option<JobRequirements>,
    pub resume_analysis: Option<ResumeAnalysis>,
}

impl RunOutput {
    pub fn from_state(state: &RunState) -> Self {
        let improvement_delta = match (state.ats_score_before, state.ats_score_after) {
            (Some(before), Some(after)) => Some(round_to(after - before, 2)),
            _ => None,
        };

        Self {
            run_id: state.run_id,
            final_status: state.status,
            stop_reason: state.stop_reason,
            fit_decision: state.fit_decision(),
            fit: state.fit.clone(),
            ats_score_before: state.ats_score_before,
            ats_score_after: state.ats_score_after,
            improvement_delta,
            score_history: state.score_history.clone(),
            improvement_plan: state.improvement_plan.clone(),
            modified_resume: state.modified_resume.clone(),
            decision_log: state.decision_log.clone(),
            iteration_count: state.iteration_count,
            job_requirements: state.job_requirements.clone(),
            resume_analysis: state.resume_analysis.clone(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence record
// ────────────────────────────────────────────────────────────────────────────

/// One stored run. `state` is present once the run reached a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub job_description: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: Option<RunState>,
}

impl RunRecord {
    /// A run that has been accepted and is executing.
    pub fn processing(state: &RunState, created_at: DateTime<Utc>) -> Self {
        Self {
            run_id: state.run_id,
            status: RunStatus::Processing,
            job_description: state.job_description.clone(),
            error_message: None,
            created_at,
            completed_at: None,
            state: None,
        }
    }

    pub fn finished(state: RunState, created_at: DateTime<Utc>) -> Self {
        Self {
            run_id: state.run_id,
            status: state.status,
            job_description: state.job_description.clone(),
            error_message: None,
            created_at,
            completed_at: Some(Utc::now()),
            state: Some(state),
        }
    }

    pub fn failed(
        run_id: Uuid,
        job_description: String,
        error_message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            job_description,
            error_message: Some(error_message),
            created_at,
            completed_at: Some(Utc::now()),
            state: None,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            ats_score_before: self.state.as_ref().and_then(|s| s.ats_score_before),
            ats_score_after: self.state.as_ref().and_then(|s| s.ats_score_after),
            iteration_count: self.state.as_ref().map_or(0, |s| s.iteration_count),
        }
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// List-view projection of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ats_score_before: Option<f64>,
    pub ats_score_after: Option<f64>,
    pub iteration_count: u32,
}
