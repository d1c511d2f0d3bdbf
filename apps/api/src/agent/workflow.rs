//! Optimization loop controller.
//!
//! Flow: extract → analyze → fit gate → initial score →
//!       [plan → modify → rescore → route]* → terminated.
//!
//! The cycle is an explicit phase loop. Each node reads `RunState`, returns a
//! `StateUpdate`, and the controller merges it before moving on, so one run is
//! strictly sequential. Routing after each scoring step lives in `routing`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::agent::events::{EventSink, RunEvent};
use crate::agent::fit_check::{assess_fit, FitThresholds};
use crate::agent::models::{ImprovementPlan, JobRequirements, ResumeAnalysis};
use crate::agent::routing::{route_after_initial_score, route_after_rescore, Route, StopReason};
use crate::agent::scoring::{round_to, AtsScorer};
use crate::agent::state::{
    DecisionRecord, Node, Rescore, Rewrite, RunState, RunStatus, StateUpdate, TerminationConfig,
};
use crate::agent::steps::{PlanningInput, ResumeSteps, StepError};

/// Three 120 s LLM attempts plus 1 s and 2 s backoff.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(363);

// ────────────────────────────────────────────────────────────────────────────
// Errors and inputs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Contract violation in {node}: {field} is missing")]
    ContractViolation { node: Node, field: &'static str },

    #[error("Upstream unavailable in {node}: {message}")]
    Upstream { node: Node, message: String },
}

/// Everything a run is started with.
#[derive(Debug, Clone)]
pub struct OptimizeInput {
    pub job_description: String,
    pub resume_text: String,
    pub termination: TerminationConfig,
    pub fit_thresholds: FitThresholds,
}

impl OptimizeInput {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.job_description.trim().is_empty() {
            return Err(AgentError::InvalidInput(
                "job_description cannot be empty".to_string(),
            ));
        }
        if self.resume_text.trim().is_empty() {
            return Err(AgentError::InvalidInput("resume cannot be empty".to_string()));
        }
        self.termination.validate().map_err(AgentError::InvalidInput)?;
        self.fit_thresholds.validate().map_err(AgentError::InvalidInput)?;
        Ok(())
    }
}

/// A step's output after the controller has classified its failure mode.
enum StepOutput<T> {
    Parsed(T),
    Unparseable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Extracting,
    Analyzing,
    Gating,
    ScoringInitial,
    Planning,
    Modifying,
    Rescoring,
    Terminated(StopReason),
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

pub struct OptimizationAgent {
    steps: Arc<dyn ResumeSteps>,
    scorer: Arc<dyn AtsScorer>,
    step_timeout: Duration,
}

impl OptimizationAgent {
    pub fn new(steps: Arc<dyn ResumeSteps>, scorer: Arc<dyn AtsScorer>) -> Self {
        Self {
            steps,
            scorer,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Validates the input and builds the initial state. The run id is fixed here,
    /// so callers can record a failure against it even if `run` errors.
    pub fn prepare(&self, input: OptimizeInput) -> Result<RunState, AgentError> {
        input.validate()?;
        Ok(RunState::new(
            input.job_description,
            input.resume_text,
            input.termination,
            input.fit_thresholds,
        ))
    }

    /// Drives a prepared state to a terminal status.
    pub async fn run(
        &self,
        mut state: RunState,
        sink: &dyn EventSink,
    ) -> Result<RunState, AgentError> {
        let run_id = state.run_id;
        state.status = RunStatus::Processing;
        sink.emit(&RunEvent::RunStarted { run_id });
        info!(run_id = %run_id, "Optimization run started");

        match self.drive(&mut state, sink).await {
            Ok(reason) => {
                info!(
                    run_id = %run_id,
                    status = state.status.as_str(),
                    reason = reason.as_str(),
                    iterations = state.iteration_count,
                    "Optimization run finished: {:?} → {:?}",
                    state.ats_score_before,
                    state.ats_score_after
                );
                sink.emit(&RunEvent::RunCompleted {
                    run_id,
                    status: state.status,
                });
                Ok(state)
            }
            Err(e) => {
                error!(run_id = %run_id, "Optimization run failed: {e}");
                sink.emit(&RunEvent::RunCompleted {
                    run_id,
                    status: RunStatus::Failed,
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        state: &mut RunState,
        sink: &dyn EventSink,
    ) -> Result<StopReason, AgentError> {
        let mut phase = Phase::Extracting;

        loop {
            phase = match phase {
                Phase::Extracting => {
                    self.started(Node::ExtractRequirements, state, sink);
                    let update = self.extract_node(state).await?;
                    self.completed(Node::ExtractRequirements, update, state, sink);
                    Phase::Analyzing
                }
                Phase::Analyzing => {
                    self.started(Node::AnalyzeResume, state, sink);
                    let update = self.analyze_node(state).await?;
                    self.completed(Node::AnalyzeResume, update, state, sink);
                    Phase::Gating
                }
                Phase::Gating => {
                    self.started(Node::FitCheck, state, sink);
                    let update = self.fit_node(state)?;
                    self.completed(Node::FitCheck, update, state, sink);
                    Phase::ScoringInitial
                }
                Phase::ScoringInitial => {
                    self.started(Node::ScoreInitial, state, sink);
                    let update = self.score_initial_node(state)?;
                    self.completed(Node::ScoreInitial, update, state, sink);
                    self.route(Node::ScoreInitial, route_after_initial_score(state), state)
                }
                Phase::Planning => {
                    self.started(Node::PlanImprovements, state, sink);
                    let update = self.plan_node(state).await?;
                    self.completed(Node::PlanImprovements, update, state, sink);
                    Phase::Modifying
                }
                Phase::Modifying => {
                    self.started(Node::ModifyResume, state, sink);
                    let update = self.modify_node(state).await?;
                    self.completed(Node::ModifyResume, update, state, sink);
                    Phase::Rescoring
                }
                Phase::Rescoring => {
                    self.started(Node::ScoreModified, state, sink);
                    let update = self.score_modified_node(state)?;
                    self.completed(Node::ScoreModified, update, state, sink);
                    self.route(Node::ScoreModified, route_after_rescore(state), state)
                }
                Phase::Terminated(reason) => return Ok(reason),
            };
        }
    }

    fn started(&self, node: Node, state: &RunState, sink: &dyn EventSink) {
        sink.emit(&RunEvent::NodeStarted {
            run_id: state.run_id,
            node,
        });
    }

    fn completed(&self, node: Node, update: StateUpdate, state: &mut RunState, sink: &dyn EventSink) {
        state.apply(update);
        sink.emit(&RunEvent::NodeCompleted {
            run_id: state.run_id,
            node,
        });
    }

    /// Records the routing decision and turns it into the next phase.
    fn route(&self, after: Node, route: Route, state: &mut RunState) -> Phase {
        let record = route.decision_record(after, state);
        match route {
            Route::Plan => {
                state.apply(StateUpdate::default().decision(record));
                Phase::Planning
            }
            Route::Stop(reason) => {
                info!(run_id = %state.run_id, "Terminating after {after}: {}", reason.as_str());
                state.apply(StateUpdate {
                    stop: Some(reason),
                    ..StateUpdate::default().decision(record)
                });
                Phase::Terminated(reason)
            }
        }
    }

    /// Runs one collaborator call under the step timeout and sorts its failure
    /// into tolerated (`Unparseable`) or fatal (`Upstream`).
    async fn invoke<T>(
        &self,
        node: Node,
        call: impl Future<Output = Result<T, StepError>>,
    ) -> Result<StepOutput<T>, AgentError> {
        match tokio::time::timeout(self.step_timeout, call).await {
            Err(_) => Err(AgentError::Upstream {
                node,
                message: format!("timed out after {}s", self.step_timeout.as_secs()),
            }),
            Ok(Err(StepError::Unavailable(message))) => Err(AgentError::Upstream { node, message }),
            Ok(Err(StepError::Unparseable(detail))) => {
                warn!("{node} returned unparseable output, using defaults: {detail}");
                Ok(StepOutput::Unparseable(detail))
            }
            Ok(Ok(value)) => Ok(StepOutput::Parsed(value)),
        }
    }

    // ── Nodes ───────────────────────────────────────────────────────────────

    pub(crate) async fn extract_node(&self, state: &RunState) -> Result<StateUpdate, AgentError> {
        let node = Node::ExtractRequirements;
        let mut update = StateUpdate::default();

        let requirements = match self
            .invoke(node, self.steps.extract_requirements(&state.job_description))
            .await?
        {
            StepOutput::Parsed(requirements) => requirements.sanitized(),
            StepOutput::Unparseable(detail) => {
                update = update.decision(parse_failure(node, detail));
                JobRequirements::unparseable()
            }
        };

        info!(
            "Requirements extracted: {} required, {} preferred, {} keywords",
            requirements.required_skills.len(),
            requirements.preferred_skills.len(),
            requirements.key_keywords.len()
        );
        update = update.decision(
            DecisionRecord::new(node, "extracted_requirements")
                .with("required_count", requirements.required_skills.len())
                .with("preferred_count", requirements.preferred_skills.len())
                .with("keyword_count", requirements.key_keywords.len()),
        );
        update.job_requirements = Some(requirements);
        Ok(update)
    }

    pub(crate) async fn analyze_node(&self, state: &RunState) -> Result<StateUpdate, AgentError> {
        let node = Node::AnalyzeResume;
        let requirements = require(node, "job_requirements", &state.job_requirements)?;
        let mut update = StateUpdate::default();

        let analysis = match self
            .invoke(
                node,
                self.steps.analyze_resume(&state.original_resume, requirements),
            )
            .await?
        {
            StepOutput::Parsed(analysis) => analysis,
            StepOutput::Unparseable(detail) => {
                update = update.decision(parse_failure(node, detail));
                ResumeAnalysis::unparseable()
            }
        };

        update = update.decision(
            DecisionRecord::new(node, "analyzed_resume")
                .with("strength_count", analysis.strengths.len())
                .with("missing_keyword_count", analysis.missing_keywords.len()),
        );
        update.resume_analysis = Some(analysis);
        Ok(update)
    }

    pub(crate) fn fit_node(&self, state: &RunState) -> Result<StateUpdate, AgentError> {
        let requirements = require(Node::FitCheck, "job_requirements", &state.job_requirements)?;
        let fit = assess_fit(&state.original_resume, requirements, &state.fit_thresholds);
        info!(
            run_id = %state.run_id,
            "Fit gate: {} (score {:.3}, confidence {:.2})",
            fit.decision.as_str(),
            fit.score,
            fit.confidence
        );

        let update = StateUpdate::default().decision(fit.decision_record());
        Ok(StateUpdate {
            fit: Some(fit),
            ..update
        })
    }

    pub(crate) fn score_initial_node(&self, state: &RunState) -> Result<StateUpdate, AgentError> {
        let node = Node::ScoreInitial;
        let requirements = require(node, "job_requirements", &state.job_requirements)?;
        let baseline = self.scorer.score(&state.original_resume, requirements);
        info!(run_id = %state.run_id, "Baseline ATS score: {}/100", baseline.score);

        let update = StateUpdate::default().decision(
            DecisionRecord::new(node, "scored_original_resume")
                .with("score", baseline.score)
                .with("breakdown", baseline.breakdown),
        );
        Ok(StateUpdate {
            baseline: Some(baseline),
            ..update
        })
    }

    pub(crate) async fn plan_node(&self, state: &RunState) -> Result<StateUpdate, AgentError> {
        let node = Node::PlanImprovements;
        let requirements = require(node, "job_requirements", &state.job_requirements)?;
        let analysis = require(node, "resume_analysis", &state.resume_analysis)?;
        let baseline = require(node, "ats_score_before", &state.ats_score_before)?;
        let mut update = StateUpdate::default();

        let input = PlanningInput {
            requirements,
            analysis,
            current_score: state.ats_score_after.unwrap_or(*baseline),
            previous_plan: state.improvement_plan.as_ref(),
        };
        let plan = match self.invoke(node, self.steps.plan_improvements(input)).await? {
            StepOutput::Parsed(plan) => plan,
            StepOutput::Unparseable(detail) => {
                update = update.decision(parse_failure(node, detail));
                ImprovementPlan::unparseable()
            }
        };

        update = update.decision(
            DecisionRecord::new(node, "created_improvement_plan")
                .with("iteration", state.iteration_count + 1)
                .with("priority_change_count", plan.priority_changes.len())
                .with("expected_score_gain", plan.expected_score_gain),
        );
        update.improvement_plan = Some(plan);
        Ok(update)
    }

    /// Rewrites the latest usable version, so iterations build on each other.
    pub(crate) async fn modify_node(&self, state: &RunState) -> Result<StateUpdate, AgentError> {
        let node = Node::ModifyResume;
        let plan = require(node, "improvement_plan", &state.improvement_plan)?;
        let source = state
            .modified_resume
            .as_deref()
            .unwrap_or(&state.original_resume);

        let mut update = StateUpdate::default();
        let rewrite = match self.invoke(node, self.steps.modify_resume(source, plan)).await? {
            StepOutput::Parsed(text) if !text.trim().is_empty() => Rewrite::Text(text),
            StepOutput::Parsed(_) => Rewrite::Unusable,
            StepOutput::Unparseable(detail) => {
                update = update.decision(parse_failure(node, detail));
                Rewrite::Unusable
            }
        };

        let record = match &rewrite {
            Rewrite::Text(text) => DecisionRecord::new(node, "resume_modified")
                .with("iteration", state.iteration_count + 1)
                .with("chars", text.chars().count()),
            Rewrite::Unusable => {
                warn!(run_id = %state.run_id, "Rewrite produced no usable text");
                DecisionRecord::new(node, "rewrite_unusable")
                    .with("iteration", state.iteration_count + 1)
            }
        };
        Ok(StateUpdate {
            rewrite: Some(rewrite),
            ..update.decision(record)
        })
    }

    pub(crate) fn score_modified_node(&self, state: &RunState) -> Result<StateUpdate, AgentError> {
        let node = Node::ScoreModified;
        let requirements = require(node, "job_requirements", &state.job_requirements)?;
        let baseline = *require(node, "ats_score_before", &state.ats_score_before)?;

        let modified = match state.modified_resume.as_deref() {
            Some(text) if state.rewrite_usable => text,
            _ => {
                return Ok(StateUpdate {
                    rescore: Some(Rescore::Missing),
                    ..StateUpdate::default().decision(DecisionRecord::new(node, "rewrite_missing"))
                });
            }
        };

        let previous = state.previous_score().unwrap_or(baseline);
        let score = self.scorer.score(modified, requirements);
        let last_iteration_delta = round_to(score.score - previous, 2);
        let improvement_delta = round_to(score.score - baseline, 2);
        info!(
            run_id = %state.run_id,
            "Iteration {} ATS score: {}/100 ({:+} vs previous, {:+} vs baseline)",
            state.iteration_count + 1,
            score.score,
            last_iteration_delta,
            improvement_delta
        );

        let record = DecisionRecord::new(node, "scored_modified_resume")
            .with("iteration", state.iteration_count + 1)
            .with("score", score.score)
            .with("delta_vs_previous", last_iteration_delta)
            .with("delta_vs_baseline", improvement_delta);
        Ok(StateUpdate {
            rescore: Some(Rescore::Scored {
                score,
                last_iteration_delta,
                improvement_delta,
            }),
            ..StateUpdate::default().decision(record)
        })
    }
}

fn require<'a, T>(node: Node, field: &'static str, value: &'a Option<T>) -> Result<&'a T, AgentError> {
    value
        .as_ref()
        .ok_or(AgentError::ContractViolation { node, field })
}

fn parse_failure(node: Node, detail: String) -> DecisionRecord {
    DecisionRecord::new(node, "parse_failure_recovered").with("detail", detail)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::agent::events::{ChannelSink, NoopSink};
    use crate::agent::fit_check::FitDecision;
    use crate::agent::scoring::{AtsScore, KeywordAtsScorer, ScoreBreakdown};

    const RESUME: &str = "Jane Doe\nRust engineer building backend services with Tokio and PostgreSQL.";
    const JOB: &str = "Senior Rust engineer for backend services.";

    /// Collaborators with canned answers. Rewrites are consumed in order; once
    /// the queue is empty every rewrite returns "rewritten".
    #[derive(Default)]
    struct ScriptedSteps {
        requirements: JobRequirements,
        extract_error: Option<StepError>,
        extract_delay: Option<Duration>,
        plan_unparseable: bool,
        rewrites: Mutex<VecDeque<Result<String, StepError>>>,
        rewrite_sources: Mutex<Vec<String>>,
        plans_made: Mutex<u32>,
    }

    impl ScriptedSteps {
        fn matching() -> Self {
            Self {
                requirements: JobRequirements {
                    required_skills: vec!["Rust".to_string()],
                    key_keywords: vec!["backend".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            }
        }

        fn with_rewrites(self, rewrites: Vec<Result<String, StepError>>) -> Self {
            *self.rewrites.lock().unwrap() = rewrites.into();
            self
        }
    }

    #[async_trait]
    impl ResumeSteps for ScriptedSteps {
        async fn extract_requirements(&self, _job: &str) -> Result<JobRequirements, StepError> {
            if let Some(delay) = self.extract_delay {
                tokio::time::sleep(delay).await;
            }
            match &self.extract_error {
                Some(e) => Err(e.clone()),
                None => Ok(self.requirements.clone()),
            }
        }

        async fn analyze_resume(
            &self,
            _resume: &str,
            _requirements: &JobRequirements,
        ) -> Result<ResumeAnalysis, StepError> {
            Ok(ResumeAnalysis {
                strengths: vec!["Rust".to_string()],
                ..Default::default()
            })
        }

        async fn plan_improvements(
            &self,
            _input: PlanningInput<'_>,
        ) -> Result<ImprovementPlan, StepError> {
            *self.plans_made.lock().unwrap() += 1;
            if self.plan_unparseable {
                return Err(StepError::Unparseable("expected value at line 1".to_string()));
            }
            Ok(ImprovementPlan {
                priority_changes: vec!["Quantify backend impact".to_string()],
                expected_score_gain: 5.0,
                reasoning: "More keywords".to_string(),
                ..Default::default()
            })
        }

        async fn modify_resume(
            &self,
            resume: &str,
            _plan: &ImprovementPlan,
        ) -> Result<String, StepError> {
            self.rewrite_sources.lock().unwrap().push(resume.to_string());
            self.rewrites
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("rewritten".to_string()))
        }
    }

    /// Returns scores in order: the first call is the baseline.
    struct ScriptedScorer(Mutex<VecDeque<f64>>);

    impl ScriptedScorer {
        fn new(scores: &[f64]) -> Self {
            Self(Mutex::new(scores.iter().copied().collect()))
        }
    }

    impl AtsScorer for ScriptedScorer {
        fn score(&self, _resume: &str, _requirements: &JobRequirements) -> AtsScore {
            let score = self.0.lock().unwrap().pop_front().unwrap_or(0.0);
            AtsScore {
                score,
                breakdown: ScoreBreakdown {
                    keywords: score,
                    ..Default::default()
                },
            }
        }
    }

    fn agent(steps: ScriptedSteps, scores: &[f64]) -> OptimizationAgent {
        OptimizationAgent::new(Arc::new(steps), Arc::new(ScriptedScorer::new(scores)))
    }

    fn input(termination: TerminationConfig) -> OptimizeInput {
        OptimizeInput {
            job_description: JOB.to_string(),
            resume_text: RESUME.to_string(),
            termination,
            fit_thresholds: FitThresholds::default(),
        }
    }

    fn termination(max_iterations: u32, target_score: f64, min_iteration_gain: f64) -> TerminationConfig {
        TerminationConfig {
            max_iterations,
            target_score,
            min_iteration_gain,
        }
    }

    async fn run(agent: &OptimizationAgent, input: OptimizeInput) -> Result<RunState, AgentError> {
        let state = agent.prepare(input)?;
        agent.run(state, &NoopSink).await
    }

    fn count(state: &RunState, node: Node) -> usize {
        state.decision_log.iter().filter(|d| d.node == node).count()
    }

    fn actions(state: &RunState) -> Vec<&str> {
        state.decision_log.iter().map(|d| d.action.as_str()).collect()
    }

    #[tokio::test]
    async fn test_poor_fit_is_rejected_without_planning() {
        let steps = ScriptedSteps {
            requirements: JobRequirements {
                required_skills: vec![
                    "Kubernetes".to_string(),
                    "FastAPI".to_string(),
                    "PostgreSQL".to_string(),
                ],
                key_keywords: vec!["microservices".to_string(), "backend".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let agent = OptimizationAgent::new(Arc::new(steps), Arc::new(KeywordAtsScorer));
        let mut request = input(TerminationConfig::default());
        request.resume_text =
            "Elementary school teacher with ten years of classroom experience.".to_string();

        let state = run(&agent, request).await.unwrap();

        assert_eq!(state.status, RunStatus::RejectedPoorFit);
        assert_eq!(state.stop_reason, Some(StopReason::PoorFit));
        assert_eq!(state.fit_decision(), Some(FitDecision::PoorFit));
        assert!(state.ats_score_before.is_some());
        assert_eq!(state.ats_score_after, None);
        assert_eq!(state.iteration_count, 0);
        assert_eq!(count(&state, Node::PlanImprovements), 0);
        assert_eq!(count(&state, Node::ModifyResume), 0);
        assert_eq!(
            actions(&state),
            vec![
                "extracted_requirements",
                "analyzed_resume",
                "assessed_role_fit",
                "scored_original_resume",
                "terminate"
            ]
        );
    }

    #[tokio::test]
    async fn test_target_reached_stops_after_one_iteration() {
        let agent = agent(ScriptedSteps::matching(), &[50.0, 80.0, 90.0]);
        let state = run(&agent, input(termination(3, 75.0, 1.0))).await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.stop_reason, Some(StopReason::TargetReached));
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.score_history, vec![80.0]);
        assert_eq!(state.ats_score_before, Some(50.0));
        assert_eq!(state.ats_score_after, Some(80.0));
        assert_eq!(state.improvement_delta, Some(30.0));
        assert_eq!(count(&state, Node::PlanImprovements), 1);
        assert_eq!(state.decision_log.last().unwrap().action, "terminate");
    }

    #[tokio::test]
    async fn test_gain_just_below_minimum_stops() {
        let agent = agent(ScriptedSteps::matching(), &[50.0, 50.99, 60.0]);
        let state = run(&agent, input(termination(3, 75.0, 1.0))).await.unwrap();

        assert_eq!(state.stop_reason, Some(StopReason::DiminishingReturns));
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.score_history, vec![50.99]);
        assert_eq!(state.last_iteration_delta, Some(0.99));
    }

    #[tokio::test]
    async fn test_iterations_never_exceed_maximum() {
        for max_iterations in 1..=4 {
            let agent = agent(ScriptedSteps::matching(), &[40.0, 45.0, 50.0, 55.0, 60.0, 65.0]);
            let state = run(&agent, input(termination(max_iterations, 99.0, 1.0)))
                .await
                .unwrap();

            assert_eq!(state.iteration_count, max_iterations);
            assert_eq!(state.stop_reason, Some(StopReason::MaxIterations));
            assert_eq!(state.score_history.len(), max_iterations as usize);
            assert_eq!(
                count(&state, Node::PlanImprovements),
                max_iterations as usize
            );
        }
    }

    #[tokio::test]
    async fn test_delta_is_measured_against_previous_iteration() {
        let agent = agent(ScriptedSteps::matching(), &[40.0, 50.0, 53.5]);
        let state = run(&agent, input(termination(2, 99.0, 1.0))).await.unwrap();

        assert_eq!(state.score_history, vec![50.0, 53.5]);
        assert_eq!(state.last_iteration_delta, Some(3.5));
        assert_eq!(state.improvement_delta, Some(13.5));

        let rescored: Vec<_> = state
            .decision_log
            .iter()
            .filter(|d| d.action == "scored_modified_resume")
            .collect();
        assert_eq!(rescored[0].details["delta_vs_previous"], 10.0);
        assert_eq!(rescored[1].details["delta_vs_previous"], 3.5);
    }

    #[tokio::test]
    async fn test_each_rewrite_builds_on_the_previous_one() {
        let steps = Arc::new(ScriptedSteps::matching().with_rewrites(vec![
            Ok("version one".to_string()),
            Ok("version two".to_string()),
        ]));
        let agent = OptimizationAgent::new(steps.clone(), Arc::new(ScriptedScorer::new(&[40.0, 50.0, 60.0])));
        let state = run(&agent, input(termination(2, 99.0, 1.0))).await.unwrap();

        assert_eq!(state.modified_resume.as_deref(), Some("version two"));
        let sources = steps.rewrite_sources.lock().unwrap().clone();
        assert_eq!(sources, vec![RESUME.to_string(), "version one".to_string()]);
    }

    #[tokio::test]
    async fn test_unusable_rewrite_terminates_and_keeps_previous_result() {
        let steps = ScriptedSteps::matching().with_rewrites(vec![
            Ok("version one".to_string()),
            Ok("   ".to_string()),
        ]);
        let agent = agent(steps, &[40.0, 50.0, 60.0]);
        let state = run(&agent, input(termination(3, 99.0, 1.0))).await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.stop_reason, Some(StopReason::RewriteMissing));
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.modified_resume.as_deref(), Some("version one"));
        assert_eq!(state.ats_score_after, Some(50.0));
        assert_eq!(state.last_rescore, None);
        assert!(actions(&state).contains(&"rewrite_unusable"));
        assert!(actions(&state).contains(&"rewrite_missing"));
    }

    #[tokio::test]
    async fn test_unparseable_rewrite_counts_as_missing() {
        let steps = ScriptedSteps::matching()
            .with_rewrites(vec![Err(StepError::Unparseable("empty".to_string()))]);
        let agent = agent(steps, &[40.0]);
        let state = run(&agent, input(TerminationConfig::default())).await.unwrap();

        assert_eq!(state.stop_reason, Some(StopReason::RewriteMissing));
        assert_eq!(state.modified_resume, None);
        assert_eq!(state.ats_score_after, None);
        assert_eq!(state.iteration_count, 0);
        let recovered = state
            .decision_log
            .iter()
            .find(|d| d.action == "parse_failure_recovered")
            .unwrap();
        assert_eq!(recovered.node, Node::ModifyResume);
        assert_eq!(recovered.details["detail"], "empty");
        let log = actions(&state);
        assert_eq!(
            log[log.len() - 4..],
            ["parse_failure_recovered", "rewrite_unusable", "rewrite_missing", "terminate"]
        );
    }

    #[tokio::test]
    async fn test_unparseable_plan_degrades_and_continues() {
        let steps = ScriptedSteps {
            plan_unparseable: true,
            ..ScriptedSteps::matching()
        };
        let agent = agent(steps, &[40.0, 80.0]);
        let state = run(&agent, input(TerminationConfig::default())).await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        let plan = state.improvement_plan.as_ref().unwrap();
        assert!(plan.parse_error);
        assert_eq!(plan.reasoning, "LLM response could not be parsed");
        let recovered = state
            .decision_log
            .iter()
            .find(|d| d.action == "parse_failure_recovered")
            .unwrap();
        assert_eq!(recovered.node, Node::PlanImprovements);
    }

    #[tokio::test]
    async fn test_unavailable_upstream_fails_the_run() {
        let steps = ScriptedSteps {
            extract_error: Some(StepError::Unavailable("No LLM API key provided".to_string())),
            ..ScriptedSteps::matching()
        };
        let agent = agent(steps, &[]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let state = agent.prepare(input(TerminationConfig::default())).unwrap();

        let err = agent.run(state, &ChannelSink(tx)).await.unwrap_err();

        match err {
            AgentError::Upstream { node, message } => {
                assert_eq!(node, Node::ExtractRequirements);
                assert_eq!(message, "No LLM API key provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(RunEvent::RunCompleted {
                status: RunStatus::Failed,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_is_upstream_failure() {
        let steps = ScriptedSteps {
            extract_delay: Some(Duration::from_secs(3600)),
            ..ScriptedSteps::matching()
        };
        let agent = agent(steps, &[]).with_step_timeout(Duration::from_secs(5));

        let err = run(&agent, input(TerminationConfig::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Upstream { node: Node::ExtractRequirements, .. }));
        assert!(err.to_string().contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn test_planning_without_upstream_state_is_contract_violation() {
        let agent = agent(ScriptedSteps::matching(), &[]);
        let state = agent.prepare(input(TerminationConfig::default())).unwrap();

        let err = agent.plan_node(&state).await.unwrap_err();

        assert!(matches!(
            err,
            AgentError::ContractViolation {
                node: Node::PlanImprovements,
                field: "job_requirements"
            }
        ));
    }

    #[test]
    fn test_rescore_without_baseline_is_contract_violation() {
        let agent = agent(ScriptedSteps::matching(), &[]);
        let mut state = agent.prepare(input(TerminationConfig::default())).unwrap();
        state.job_requirements = Some(JobRequirements::default());

        let err = agent.score_modified_node(&state).unwrap_err();

        assert!(matches!(
            err,
            AgentError::ContractViolation {
                field: "ats_score_before",
                ..
            }
        ));
    }

    #[test]
    fn test_prepare_rejects_invalid_input() {
        let agent = agent(ScriptedSteps::matching(), &[]);
        assert!(matches!(
            agent.prepare(input(termination(0, 75.0, 1.0))),
            Err(AgentError::InvalidInput(_))
        ));

        let mut blank = input(TerminationConfig::default());
        blank.resume_text = "  \n ".to_string();
        assert!(matches!(agent.prepare(blank), Err(AgentError::InvalidInput(_))));

        let mut inverted = input(TerminationConfig::default());
        inverted.fit_thresholds = FitThresholds {
            poor: 0.6,
            partial: 0.4,
        };
        assert!(matches!(agent.prepare(inverted), Err(AgentError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_events_bracket_every_node() {
        let agent = agent(ScriptedSteps::matching(), &[50.0, 80.0]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let state = agent.prepare(input(TerminationConfig::default())).unwrap();

        agent.run(state, &ChannelSink(tx)).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names.first(), Some(&"run_started"));
        assert_eq!(names.last(), Some(&"run_completed"));
        // extract, analyze, fit, score, plan, modify, rescore
        assert_eq!(names.iter().filter(|n| **n == "node_started").count(), 7);
        assert_eq!(names.iter().filter(|n| **n == "node_completed").count(), 7);
        for pair in names[1..names.len() - 1].chunks(2) {
            assert_eq!(pair, ["node_started", "node_completed"]);
        }
    }

    #[tokio::test]
    async fn test_every_step_and_route_is_logged() {
        let agent = agent(ScriptedSteps::matching(), &[50.0, 60.0, 80.0]);
        let state = run(&agent, input(termination(3, 75.0, 1.0))).await.unwrap();

        assert_eq!(
            actions(&state),
            vec![
                "extracted_requirements",
                "analyzed_resume",
                "assessed_role_fit",
                "scored_original_resume",
                "continue_optimization",
                "created_improvement_plan",
                "resume_modified",
                "scored_modified_resume",
                "continue_optimization",
                "created_improvement_plan",
                "resume_modified",
                "scored_modified_resume",
                "terminate",
            ]
        );
        assert_eq!(count(&state, Node::Router), 3);
    }
}
