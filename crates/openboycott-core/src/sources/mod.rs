//! Evidence sources: each produces a per-issue [`EvidenceBundle`] for one company.
//!
//! Sources never fail. Retries, fallbacks and fatal errors are absorbed at this boundary so
//! the pipeline can continue with whatever evidence remains.

pub mod financial;
pub mod fixtures;
pub mod grounded;
pub mod search;

use async_trait::async_trait;

use crate::evidence::EvidenceBundle;

pub use financial::FinancialEvidence;
pub use grounded::GroundedModelEvidence;
pub use search::SearchEvidence;

/// Whether sources call out to the network or serve fixed substitute data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    #[default]
    Live,
    /// Deterministic fixtures, no network access and no quota consumed.
    Offline,
}

/// What one source learned about one company.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceEvidence {
    pub bundle: EvidenceBundle,
    /// Links consulted while gathering the evidence.
    pub links: Vec<String>,
}

impl SourceEvidence {
    pub fn from_bundle(bundle: EvidenceBundle) -> Self {
        Self {
            bundle,
            links: Vec::new(),
        }
    }
}

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self, company: &str) -> SourceEvidence;
}
