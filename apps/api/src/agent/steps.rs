//! The four LLM-backed steps of the pipeline, behind one trait.
//!
//! The controller only sees the `ResumeSteps` trait. `LlmSteps` is the production
//! implementation; tests script their own. A step may fail in exactly two ways:
//! `Unparseable` (tolerated, the controller substitutes a default) or
//! `Unavailable` (fatal to the run).

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::agent::models::{ImprovementPlan, JobRequirements, ResumeAnalysis};
use crate::agent::prompts::{
    ANALYSIS_PROMPT_TEMPLATE, MODIFICATION_PROMPT_TEMPLATE, MODIFICATION_SYSTEM,
    PLANNING_PROMPT_TEMPLATE, PLANNING_SYSTEM, REQUIREMENTS_PROMPT_TEMPLATE,
};
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, TRUTHFULNESS_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError, ModelSettings};

#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("unparseable output: {0}")]
    Unparseable(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

impl From<LlmError> for StepError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Parse(_) | LlmError::EmptyContent => StepError::Unparseable(err.to_string()),
            other => StepError::Unavailable(other.to_string()),
        }
    }
}

/// Everything the planner gets to see.
#[derive(Debug, Clone, Copy)]
pub struct PlanningInput<'a> {
    pub requirements: &'a JobRequirements,
    pub analysis: &'a ResumeAnalysis,
    pub current_score: f64,
    pub previous_plan: Option<&'a ImprovementPlan>,
}

#[async_trait]
pub trait ResumeSteps: Send + Sync {
    async fn extract_requirements(&self, job_description: &str)
        -> Result<JobRequirements, StepError>;

    async fn analyze_resume(
        &self,
        resume: &str,
        requirements: &JobRequirements,
    ) -> Result<ResumeAnalysis, StepError>;

    async fn plan_improvements(
        &self,
        input: PlanningInput<'_>,
    ) -> Result<ImprovementPlan, StepError>;

    /// Returns the rewritten résumé as plain text.
    async fn modify_resume(
        &self,
        resume: &str,
        plan: &ImprovementPlan,
    ) -> Result<String, StepError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmSteps
// ────────────────────────────────────────────────────────────────────────────

/// Model settings per step.
#[derive(Debug, Clone)]
pub struct StepModels {
    pub requirements: ModelSettings,
    pub analysis: ModelSettings,
    pub planning: ModelSettings,
    pub modification: ModelSettings,
}

pub struct LlmSteps {
    llm: LlmClient,
    models: StepModels,
}

impl LlmSteps {
    pub fn new(llm: LlmClient, models: StepModels) -> Self {
        Self { llm, models }
    }
}

#[async_trait]
impl ResumeSteps for LlmSteps {
    async fn extract_requirements(
        &self,
        job_description: &str,
    ) -> Result<JobRequirements, StepError> {
        let prompt = fill_template(
            REQUIREMENTS_PROMPT_TEMPLATE,
            &[("job_description", job_description)],
        );
        let requirements: JobRequirements = self
            .llm
            .call_json(&self.models.requirements, &prompt, JSON_ONLY_SYSTEM)
            .await?;
        Ok(requirements.sanitized())
    }

    async fn analyze_resume(
        &self,
        resume: &str,
        requirements: &JobRequirements,
    ) -> Result<ResumeAnalysis, StepError> {
        let requirements_json = to_pretty_json(requirements)?;
        let prompt = fill_template(
            ANALYSIS_PROMPT_TEMPLATE,
            &[("resume", resume), ("requirements_json", &requirements_json)],
        );
        Ok(self
            .llm
            .call_json(&self.models.analysis, &prompt, JSON_ONLY_SYSTEM)
            .await?)
    }

    async fn plan_improvements(
        &self,
        input: PlanningInput<'_>,
    ) -> Result<ImprovementPlan, StepError> {
        let previous_plan_json = match input.previous_plan {
            Some(plan) => to_pretty_json(plan)?,
            None => "null".to_string(),
        };
        let requirements_json = to_pretty_json(input.requirements)?;
        let analysis_json = to_pretty_json(input.analysis)?;
        let current_score = format!("{:.2}", input.current_score);
        let prompt = fill_template(
            PLANNING_PROMPT_TEMPLATE,
            &[
                ("requirements_json", &requirements_json),
                ("analysis_json", &analysis_json),
                ("current_score", &current_score),
                ("previous_plan_json", &previous_plan_json),
                ("truthfulness_instruction", TRUTHFULNESS_INSTRUCTION),
            ],
        );
        Ok(self
            .llm
            .call_json(&self.models.planning, &prompt, PLANNING_SYSTEM)
            .await?)
    }

    async fn modify_resume(
        &self,
        resume: &str,
        plan: &ImprovementPlan,
    ) -> Result<String, StepError> {
        let plan_json = to_pretty_json(plan)?;
        let prompt = fill_template(
            MODIFICATION_PROMPT_TEMPLATE,
            &[
                ("truthfulness_instruction", TRUTHFULNESS_INSTRUCTION),
                ("plan_json", &plan_json),
                ("resume", resume),
            ],
        );
        let text = self
            .llm
            .call_text(&self.models.modification, &prompt, MODIFICATION_SYSTEM)
            .await?;
        debug!(chars = text.len(), "Résumé rewrite received");
        Ok(strip_text_fences(&text).to_string())
    }
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, StepError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| StepError::Unavailable(format!("failed to serialize prompt input: {e}")))
}

/// Substitutes `{name}` placeholders in one pass over the template. Inserted
/// values are never rescanned, and braces that do not name a known
/// placeholder are copied through unchanged.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Models sometimes wrap plain-text answers in a code fence anyway.
fn strip_text_fences(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            // Drop an optional language tag on the opening fence line.
            let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
            body.trim_end().strip_suffix("```").unwrap_or(body).trim()
        }
        None => trimmed,
    }
}
