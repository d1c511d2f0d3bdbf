use std::sync::Arc;

use crate::agent::scoring::AtsScorer;
use crate::agent::store::RunStore;
use crate::config::Config;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Postgres when DATABASE_URL is set, in-memory otherwise.
    pub store: Arc<dyn RunStore>,
    pub llm: LlmClient,
    pub config: Config,
    /// Pluggable ATS scorer. Default: KeywordAtsScorer.
    pub scorer: Arc<dyn AtsScorer>,
}
