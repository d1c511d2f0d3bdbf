//! Decides stop-vs-iterate after each scoring step.
//!
//! Both functions are pure reads of `RunState`; the controller turns the result
//! into a phase transition and a `router` decision record.

use serde::{Deserialize, Serialize};

use crate::agent::fit_check::FitDecision;
use crate::agent::state::{DecisionRecord, Node, RunState, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    PoorFit,
    RewriteMissing,
    MaxIterations,
    TargetReached,
    DiminishingReturns,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::PoorFit => "poor_fit",
            StopReason::RewriteMissing => "rewrite_missing",
            StopReason::MaxIterations => "max_iterations",
            StopReason::TargetReached => "target_reached",
            StopReason::DiminishingReturns => "diminishing_returns",
        }
    }

    /// Terminal status of a run that stops for this reason.
    pub fn final_status(&self) -> RunStatus {
        match self {
            StopReason::PoorFit => RunStatus::RejectedPoorFit,
            _ => RunStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Plan,
    Stop(StopReason),
}

impl Route {
    pub fn decision_record(&self, after: Node, state: &RunState) -> DecisionRecord {
        let record = DecisionRecord::new(Node::Router, match self {
            Route::Plan => "continue_optimization",
            Route::Stop(_) => "terminate",
        })
        .with("after", after.as_str())
        .with("iteration_count", state.iteration_count);

        match self {
            Route::Plan => record,
            Route::Stop(reason) => record.with("reason", reason.as_str()),
        }
    }
}

/// After SCORING_INITIAL: a poor fit ends the run, anything else starts planning.
pub fn route_after_initial_score(state: &RunState) -> Route {
    match state.fit_decision() {
        Some(FitDecision::PoorFit) => Route::Stop(StopReason::PoorFit),
        _ => Route::Plan,
    }
}

/// After RESCORING. Rules are checked in order; the first match wins.
pub fn route_after_rescore(state: &RunState) -> Route {
    let config = &state.termination;

    let Some(latest) = state.last_rescore else {
        return Route::Stop(StopReason::RewriteMissing);
    };

    if state.iteration_count >= config.max_iterations {
        return Route::Stop(StopReason::MaxIterations);
    }

    if latest >= config.target_score {
        return Route::Stop(StopReason::TargetReached);
    }

    if let Some(delta) = state.last_iteration_delta {
        if delta < config.min_iteration_gain {
            return Route::Stop(StopReason::DiminishingReturns);
        }
    }

    Route::Plan
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
