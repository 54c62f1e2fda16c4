use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::llm::CompetitionResearcher;
use crate::retry::RetryPolicy;

/// Competitive landscape entry stored on a company record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Competitor {
    /// Product-level breakdown returned by live research.
    Product(ProductCompetition),
    /// Bare competitor company name.
    Name(String),
}

/// One of the company's valuable products and its closest alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCompetition {
    pub product_name: String,
    #[serde(default)]
    pub competitor_products: Vec<CompetitorProduct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorProduct {
    pub product_name: String,
    pub parent_company: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub in_person: bool,
}

/// Looks up who a company competes with. Never fails: no data is an empty list.
#[async_trait]
pub trait CompetitorLookup: Send + Sync {
    async fn competitors(&self, company: &str) -> Vec<Competitor>;
}

/// Model-backed lookup wrapped in the shared retry policy.
pub struct ResearchedCompetitors {
    researcher: Arc<dyn CompetitionResearcher>,
    retry: RetryPolicy,
}

impl ResearchedCompetitors {
    pub fn new(researcher: Arc<dyn CompetitionResearcher>, retry: RetryPolicy) -> Self {
        Self { researcher, retry }
    }
}

#[async_trait]
impl CompetitorLookup for ResearchedCompetitors {
    #[instrument(name = "competitors", skip(self))]
    async fn competitors(&self, company: &str) -> Vec<Competitor> {
        info!("researching competitors");
        let outcome = self
            .retry
            .run("competitor research", Vec::new, || {
                self.researcher.competition(company)
            })
            .await;
        match outcome {
            Ok(products) => products.into_iter().map(Competitor::Product).collect(),
            Err(err) => {
                warn!(%err, "competitor research rejected; recording none");
                Vec::new()
            }
        }
    }
}

/// Fixed competitor lists for offline runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineCompetitors;

#[async_trait]
impl CompetitorLookup for OfflineCompetitors {
    async fn competitors(&self, company: &str) -> Vec<Competitor> {
        let names: &[&str] = match company {
            "Apple" => &["Samsung", "Microsoft", "Google"],
            "Google" => &["Microsoft", "Apple", "Amazon"],
            "Meta" => &["Twitter", "TikTok", "LinkedIn"],
            _ => &["Competitor 1", "Competitor 2", "Competitor 3"],
        };
        names
            .iter()
            .map(|name| Competitor::Name(name.to_string()))
            .collect()
    }
}

/// Used when no model credential is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompetitors;

#[async_trait]
impl CompetitorLookup for NoCompetitors {
    async fn competitors(&self, _company: &str) -> Vec<Competitor> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::FetchError;
    use crate::settings::RetrySettings;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyResearcher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CompetitionResearcher for FlakyResearcher {
        async fn competition(&self, _company: &str) -> Result<Vec<ProductCompetition>, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(FetchError::transient("gemini", "connection reset"));
            }
            Ok(vec![ProductCompetition {
                product_name: "Search".into(),
                competitor_products: vec![CompetitorProduct {
                    product_name: "Bing".into(),
                    parent_company: "Microsoft".into(),
                }],
                availability: Some(Availability {
                    online: true,
                    in_person: false,
                }),
            }])
        }
    }

    #[test]
    fn offline_lookup_uses_known_lists() {
        let competitors = futures::executor::block_on(OfflineCompetitors.competitors("Meta"));
        assert_eq!(
            competitors,
            vec![
                Competitor::Name("Twitter".into()),
                Competitor::Name("TikTok".into()),
                Competitor::Name("LinkedIn".into()),
            ]
        );
        let unknown = futures::executor::block_on(OfflineCompetitors.competitors("Temu"));
        assert_eq!(unknown[0], Competitor::Name("Competitor 1".into()));
    }

    #[test]
    fn researched_lookup_retries_transient_failures() {
        let clock = Arc::new(ManualClock::at_timestamp(0));
        let researcher = Arc::new(FlakyResearcher {
            calls: AtomicU32::new(0),
        });
        let lookup = ResearchedCompetitors::new(
            researcher.clone(),
            RetryPolicy::new(&RetrySettings::default(), clock),
        );
        let competitors = futures::executor::block_on(lookup.competitors("Google"));
        assert_eq!(researcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(competitors.len(), 1);
        assert_eq!(
            serde_json::to_value(&competitors[0]).unwrap(),
            json!({
                "product_name": "Search",
                "competitor_products": [{"product_name": "Bing", "parent_company": "Microsoft"}],
                "availability": {"online": true, "in_person": false}
            })
        );
    }

    #[test]
    fn competitor_names_deserialize_untagged() {
        let parsed: Vec<Competitor> =
            serde_json::from_value(json!(["Samsung", {"product_name": "iPhone"}])).unwrap();
        assert_eq!(parsed[0], Competitor::Name("Samsung".into()));
        assert!(matches!(&parsed[1], Competitor::Product(p) if p.product_name == "iPhone"));
    }
}
