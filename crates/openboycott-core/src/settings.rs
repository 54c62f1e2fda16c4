use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::evidence::MAX_WEIGHT;

/// Immutable run configuration, constructed once at startup and shared by every source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutSettings {
    pub gemini: GeminiSettings,
    pub search: SearchSettings,
    pub financial: FinancialSettings,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.0-flash".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub endpoint: String,
    /// Programmable search engine restricted to credible news outlets.
    pub engine_id: String,
    pub max_results: u32,
    pub timeout_secs: u64,
    pub article_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    /// Minimum wall-clock time spent per issue, keeping the search API under 1 req/s.
    pub min_issue_interval_ms: u64,
    /// Local hour at which the free-tier daily quota resets.
    pub quota_reset_hour: u32,
    pub max_article_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://www.googleapis.com/customsearch/v1".into(),
            engine_id: "c1bd8c831439c48db".into(),
            max_results: 10,
            timeout_secs: 30,
            article_timeout_secs: 100,
            max_attempts: 2,
            retry_delay_secs: 20,
            min_issue_interval_ms: 1000,
            quota_reset_hour: 4,
            max_article_chars: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub environmental_weight: f64,
    pub social_weight: f64,
}

impl Default for FinancialSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://financialmodelingprep.com/stable/esg-disclosures".into(),
            timeout_secs: 30,
            environmental_weight: 100.0,
            social_weight: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub backoff_step_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_secs: 60,
            backoff_step_secs: 300,
        }
    }
}

/// Errors emitted while validating loaded settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("search.quota_reset_hour must be within 0..=23 (got {0})")]
    InvalidResetHour(u32),
    #[error("{field} must be at least 1")]
    ZeroAttempts { field: &'static str },
    #[error("search.max_results must be within 1..=10 (got {0})")]
    InvalidResultLimit(u32),
    #[error("{field} must be within 0..={max} (got {value})", max = MAX_WEIGHT)]
    InvalidWeight { field: &'static str, value: f64 },
}

impl ScoutSettings {
    const ENV_PREFIX: &'static str = "OPENBOYCOTT";

    /// Layer an optional settings file under `OPENBOYCOTT_<SECTION>__<FIELD>` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("failed to assemble settings sources")?
            .try_deserialize()
            .context("settings do not match the expected schema")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.search.quota_reset_hour > 23 {
            return Err(SettingsError::InvalidResetHour(
                self.search.quota_reset_hour,
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SettingsError::ZeroAttempts {
                field: "retry.max_attempts",
            });
        }
        if self.search.max_attempts == 0 {
            return Err(SettingsError::ZeroAttempts {
                field: "search.max_attempts",
            });
        }
        if !(1..=10).contains(&self.search.max_results) {
            return Err(SettingsError::InvalidResultLimit(self.search.max_results));
        }
        for (field, value) in [
            ("financial.environmental_weight", self.financial.environmental_weight),
            ("financial.social_weight", self.financial.social_weight),
        ] {
            if !value.is_finite() || !(0.0..=MAX_WEIGHT).contains(&value) {
                return Err(SettingsError::InvalidWeight { field, value });
            }
        }
        Ok(())
    }
}

/// Service name → secret mapping read from a JSON key file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub const GEMINI: &'static str = "gemini";
    pub const GOOGLE_SEARCH: &'static str = "google";
    pub const FINANCIAL: &'static str = "financialmodelingprep";

    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Read the key file; failures propagate since a run without credentials is unusable.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON credentials file at {}", path.display()))
    }

    /// Like [`Credentials::load`], degrading to an empty store.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "continuing without credentials");
                Self::default()
            }
        }
    }

    /// Secret for `service`, ignoring blank values.
    pub fn get(&self, service: &str) -> Option<&str> {
        self.0
            .get(service)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}
