use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::agent::fit_check::FitThresholds;
use crate::agent::state::TerminationConfig;
use crate::agent::steps::StepModels;
use crate::llm_client::{retry_budget, ModelSettings, DEFAULT_BASE_URL};

const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Per-step model names. Temperatures are fixed per step, except planning.
#[derive(Debug, Clone)]
pub struct ModelNames {
    pub requirements: String,
    pub analysis: String,
    pub planning: String,
    pub modification: String,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if a variable is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// In-memory run store when unset.
    pub database_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_timeout: Duration,
    pub llm_max_tokens: u32,
    /// Planning temperature.
    pub default_temperature: f32,
    pub models: ModelNames,
    pub termination: TerminationConfig,
    pub fit_thresholds: FitThresholds,
    /// Must cover a full LLM call with retries. Defaults to exactly that.
    pub step_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = TerminationConfig::default();
        let thresholds = FitThresholds::default();

        let llm_timeout = Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 120)?);
        let step_timeout = match optional_env("STEP_TIMEOUT_SECS") {
            Some(_) => Duration::from_secs(env_or("STEP_TIMEOUT_SECS", 0)?),
            None => retry_budget(llm_timeout),
        };

        let config = Config {
            database_url: optional_env("DATABASE_URL"),
            port: env_or("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            llm_api_key: optional_env("LLM_API_KEY").or_else(|| optional_env("GROQ_API_KEY")),
            llm_base_url: optional_env("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            llm_timeout,
            llm_max_tokens: env_or("LLM_MAX_TOKENS", 4000)?,
            default_temperature: env_or("DEFAULT_TEMPERATURE", 0.2)?,
            models: ModelNames {
                requirements: model_env("JOB_REQUIREMENTS_MODEL"),
                analysis: model_env("RESUME_ANALYSIS_MODEL"),
                planning: model_env("PLANNING_MODEL"),
                modification: model_env("MODIFICATION_MODEL"),
            },
            termination: TerminationConfig {
                max_iterations: env_or("MAX_ITERATIONS", defaults.max_iterations)?,
                target_score: env_or("TARGET_SCORE", defaults.target_score)?,
                min_iteration_gain: env_or("MIN_ITERATION_GAIN", defaults.min_iteration_gain)?,
            },
            fit_thresholds: FitThresholds {
                poor: env_or("FIT_THRESHOLD_POOR", thresholds.poor)?,
                partial: env_or("FIT_THRESHOLD_PARTIAL", thresholds.partial)?,
            },
            step_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.termination
            .validate()
            .map_err(|e| anyhow!("Invalid termination settings: {e}"))?;
        self.fit_thresholds
            .validate()
            .map_err(|e| anyhow!("Invalid fit thresholds: {e}"))?;
        let budget = retry_budget(self.llm_timeout);
        if self.step_timeout < budget {
            return Err(anyhow!(
                "STEP_TIMEOUT_SECS ({}s) is shorter than one LLM call with retries ({}s at LLM_TIMEOUT_SECS={})",
                self.step_timeout.as_secs(),
                budget.as_secs(),
                self.llm_timeout.as_secs()
            ));
        }
        Ok(())
    }

    pub fn step_models(&self) -> StepModels {
        StepModels {
            requirements: ModelSettings::new(&self.models.requirements, 0.0),
            analysis: ModelSettings::new(&self.models.analysis, 0.0),
            planning: ModelSettings::new(&self.models.planning, self.default_temperature),
            modification: ModelSettings::new(&self.models.modification, 0.3),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn model_env(key: &str) -> String {
    optional_env(key).unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key, optional_env(key), default)
}

fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
    }
}
