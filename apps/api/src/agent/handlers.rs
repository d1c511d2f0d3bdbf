//! Axum route handlers for the optimization API.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::events::TracingSink;
use crate::agent::fit_check::{assess_fit, FitAssessment, FitThresholds};
use crate::agent::models::JobRequirements;
use crate::agent::record::{RunOutput, RunRecord, RunSummary};
use crate::agent::scoring::AtsScore;
use crate::agent::state::TerminationConfig;
use crate::agent::steps::LlmSteps;
use crate::agent::workflow::{OptimizationAgent, OptimizeInput};
use crate::errors::AppError;
use crate::state::AppState;

const MIN_JOB_DESCRIPTION_CHARS: usize = 50;
const MIN_RESUME_CHARS: usize = 100;
const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub job_description: String,
    pub resume: String,
    pub max_iterations: Option<u32>,
    pub target_score: Option<f64>,
    pub min_iteration_gain: Option<f64>,
    pub fit_threshold_poor: Option<f64>,
    pub fit_threshold_partial: Option<f64>,
    /// Overrides the server's key for this run only. Never stored.
    pub llm_api_key: Option<String>,
}

impl OptimizeRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.job_description.trim().chars().count() < MIN_JOB_DESCRIPTION_CHARS {
            return Err(AppError::Validation(format!(
                "job_description must be at least {MIN_JOB_DESCRIPTION_CHARS} characters"
            )));
        }
        if self.resume.trim().chars().count() < MIN_RESUME_CHARS {
            return Err(AppError::Validation(format!(
                "resume must be at least {MIN_RESUME_CHARS} characters"
            )));
        }
        Ok(())
    }

    /// Request overrides layered over the server defaults.
    fn into_input(self, defaults: TerminationConfig, thresholds: FitThresholds) -> OptimizeInput {
        OptimizeInput {
            job_description: self.job_description,
            resume_text: self.resume,
            termination: TerminationConfig {
                max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
                target_score: self.target_score.unwrap_or(defaults.target_score),
                min_iteration_gain: self
                    .min_iteration_gain
                    .unwrap_or(defaults.min_iteration_gain),
            },
            fit_thresholds: FitThresholds {
                poor: self.fit_threshold_poor.unwrap_or(thresholds.poor),
                partial: self.fit_threshold_partial.unwrap_or(thresholds.partial),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub resume: String,
    pub requirements: JobRequirements,
}

#[derive(Debug, Deserialize)]
pub struct FitRequest {
    pub resume: String,
    pub requirements: JobRequirements,
    pub thresholds: Option<FitThresholds>,
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<usize>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/optimize
///
/// Runs the full optimization loop inline and returns the run output.
/// The run is persisted as `processing` first, then as its terminal record.
pub async fn handle_optimize(
    State(state): State<AppState>,
    Json(mut request): Json<OptimizeRequest>,
) -> Result<Json<RunOutput>, AppError> {
    request.validate()?;

    let llm = match request.llm_api_key.take() {
        Some(key) => state.llm.with_api_key(key),
        None => state.llm.clone(),
    };
    let steps = LlmSteps::new(llm, state.config.step_models());
    let agent = OptimizationAgent::new(Arc::new(steps), state.scorer.clone())
        .with_step_timeout(state.config.step_timeout);

    let run = agent.prepare(request.into_input(state.config.termination, state.config.fit_thresholds))?;
    let run_id = run.run_id;
    let job_description = run.job_description.clone();
    let created_at = Utc::now();
    state.store.save(&RunRecord::processing(&run, created_at)).await?;
    info!("Accepted optimization run {run_id}");

    match agent.run(run, &TracingSink).await {
        Ok(finished) => {
            let output = RunOutput::from_state(&finished);
            state
                .store
                .save(&RunRecord::finished(finished, created_at))
                .await?;
            Ok(Json(output))
        }
        Err(e) => {
            let record = RunRecord::failed(run_id, job_description, e.to_string(), created_at);
            if let Err(store_err) = state.store.save(&record).await {
                warn!("Failed to persist failed run {run_id}: {store_err:?}");
            }
            Err(e.into())
        }
    }
}

/// POST /api/v1/score
///
/// Deterministic ATS score of a résumé against caller-supplied requirements.
pub async fn handle_score(
    State(state): State<AppState>,
    Json(request): Json<ScoreRequest>,
) -> Result<Json<AtsScore>, AppError> {
    if request.resume.trim().is_empty() {
        return Err(AppError::Validation("resume cannot be empty".to_string()));
    }

    let requirements = request.requirements.sanitized();
    Ok(Json(state.scorer.score(&request.resume, &requirements)))
}

/// POST /api/v1/fit
///
/// Fit gate preview: what the gate would decide for this résumé.
pub async fn handle_fit(
    State(state): State<AppState>,
    Json(request): Json<FitRequest>,
) -> Result<Json<FitAssessment>, AppError> {
    if request.resume.trim().is_empty() {
        return Err(AppError::Validation("resume cannot be empty".to_string()));
    }

    let thresholds = request.thresholds.unwrap_or(state.config.fit_thresholds);
    thresholds.validate().map_err(AppError::Validation)?;

    let requirements = request.requirements.sanitized();
    Ok(Json(assess_fit(&request.resume, &requirements, &thresholds)))
}

/// GET /api/v1/runs/:id
pub async fn handle_get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunRecord>, AppError> {
    let record = state
        .store
        .load(run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {run_id} not found")))?;

    Ok(Json(record))
}

/// GET /api/v1/runs?limit=
///
/// Newest runs first, as summaries.
pub async fn handle_list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<RunSummary>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let records = state.store.list_recent(limit).await?;

    Ok(Json(records.iter().map(RunRecord::summary).collect()))
}
