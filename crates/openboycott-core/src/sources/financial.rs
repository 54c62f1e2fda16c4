use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{fixtures, EvidenceSource, SourceEvidence};
use crate::error::FetchError;
use crate::evidence::{EvidenceBundle, Observation};
use crate::http::{build_client, read_json};
use crate::issue::IssueId;
use crate::retry::RetryPolicy;
use crate::settings::FinancialSettings;

const SERVICE: &str = "financial";

/// ESG disclosure scores from Financial Modeling Prep, mapped onto `ENV` and `PAY`.
pub struct FinancialEvidence {
    backend: Backend,
}

enum Backend {
    Live(LiveFinancial),
    Offline,
}

struct LiveFinancial {
    http: Client,
    settings: FinancialSettings,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl FinancialEvidence {
    /// Live source; without an API key every fetch contributes nothing.
    pub fn live(
        settings: &FinancialSettings,
        api_key: Option<&str>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            backend: Backend::Live(LiveFinancial {
                http: build_client(settings.timeout_secs, "financial")?,
                settings: settings.clone(),
                api_key: api_key.map(str::to_string),
                retry,
            }),
        })
    }

    pub fn offline() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }
}

impl LiveFinancial {
    async fn disclosures(&self, symbol: &str, api_key: &str) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(&self.settings.endpoint)
            .query(&[("symbol", symbol), ("apikey", api_key)])
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(SERVICE, err))?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl EvidenceSource for FinancialEvidence {
    fn name(&self) -> &'static str {
        "financial"
    }

    #[instrument(name = "financial_evidence", skip(self))]
    async fn fetch(&self, company: &str) -> SourceEvidence {
        info!("fetching ESG disclosures");
        let live = match &self.backend {
            Backend::Offline => return SourceEvidence::from_bundle(fixtures::financial()),
            Backend::Live(live) => live,
        };
        let Some(api_key) = live.api_key.as_deref() else {
            warn!("no financial data key configured; skipping");
            return SourceEvidence::default();
        };
        let outcome = live
            .retry
            .run("financial disclosures", || Value::Null, || {
                live.disclosures(company, api_key)
            })
            .await;
        match outcome {
            Ok(payload) => SourceEvidence::from_bundle(bundle_from_disclosures(
                &payload,
                &live.settings,
            )),
            Err(err) => {
                warn!(%err, "financial disclosures unavailable");
                SourceEvidence::default()
            }
        }
    }
}

/// Read the newest disclosure row; anything missing or malformed is simply omitted.
fn bundle_from_disclosures(payload: &Value, settings: &FinancialSettings) -> EvidenceBundle {
    let mut bundle = EvidenceBundle::new();
    let Some(row) = payload.as_array().and_then(|rows| rows.first()) else {
        debug!("no disclosure rows returned");
        return bundle;
    };
    let fields = [
        (
            IssueId::Environment,
            "environmentalScore",
            settings.environmental_weight,
        ),
        (IssueId::Pay, "socialScore", settings.social_weight),
    ];
    for (issue, field, weight) in fields {
        let Some(score) = row.get(field).and_then(Value::as_f64) else {
            debug!(field, "disclosure field missing or non-numeric");
            continue;
        };
        match Observation::new(weight, score) {
            Ok(observation) => {
                bundle.insert(issue, vec![observation]);
            }
            Err(err) => warn!(field, %err, "dropping disclosure score"),
        }
    }
    bundle
}
