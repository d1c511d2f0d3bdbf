// Résumé optimization agent.
// Deterministic scoring and fit gate, LLM-backed steps, and the
// plan → modify → rescore loop that ties them together.
// All LLM calls go through llm_client via steps::LlmSteps.

pub mod events;
pub mod fit_check;
pub mod handlers;
pub mod markup;
pub mod models;
pub mod prompts;
pub mod record;
pub mod routing;
pub mod scoring;
pub mod state;
pub mod steps;
pub mod store;
pub mod workflow;
