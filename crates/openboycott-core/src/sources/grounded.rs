use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{fixtures, EvidenceSource, SourceEvidence};
use crate::evidence::{bundle_from_map, EvidenceMap};
use crate::issue::IssueId;
use crate::llm::GroundedResearcher;
use crate::retry::RetryPolicy;

/// Asks a search-grounded model to rate the company on every issue in one request.
pub struct GroundedModelEvidence {
    backend: Backend,
}

enum Backend {
    Live {
        researcher: Arc<dyn GroundedResearcher>,
        retry: RetryPolicy,
        issues: Vec<IssueId>,
    },
    Offline,
}

impl GroundedModelEvidence {
    pub fn live(researcher: Arc<dyn GroundedResearcher>, retry: RetryPolicy) -> Self {
        Self {
            backend: Backend::Live {
                researcher,
                retry,
                issues: IssueId::ALL.to_vec(),
            },
        }
    }

    pub fn offline() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }
}

#[async_trait]
impl EvidenceSource for GroundedModelEvidence {
    fn name(&self) -> &'static str {
        "grounded"
    }

    #[instrument(name = "grounded_evidence", skip(self))]
    async fn fetch(&self, company: &str) -> SourceEvidence {
        let (researcher, retry, issues) = match &self.backend {
            Backend::Offline => return SourceEvidence::from_bundle(fixtures::grounded(company)),
            Backend::Live {
                researcher,
                retry,
                issues,
            } => (researcher, retry, issues),
        };
        info!("requesting grounded assessment");
        let outcome = retry
            .run("grounded research", EvidenceMap::new, || {
                researcher.research(company, issues)
            })
            .await;
        match outcome {
            Ok(map) => SourceEvidence::from_bundle(bundle_from_map(map)),
            Err(err) => {
                warn!(%err, "grounded research rejected");
                SourceEvidence::default()
            }
        }
    }
}
