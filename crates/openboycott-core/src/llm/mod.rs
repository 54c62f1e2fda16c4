pub mod gemini;
pub mod tools;

use async_trait::async_trait;

use crate::competitors::ProductCompetition;
use crate::error::FetchError;
use crate::evidence::EvidenceMap;
use crate::issue::IssueId;

pub use gemini::GeminiClient;
pub use tools::ScoringTools;

/// Scores article text about a company on every issue the text discusses.
#[async_trait]
pub trait TextScorer: Send + Sync {
    /// Make a single attempt; retries are the caller's concern.
    async fn score(&self, company: &str, articles: &[String]) -> Result<EvidenceMap, FetchError>;
}

/// Model with live retrieval that self-reports a `(weight, score)` per issue.
#[async_trait]
pub trait GroundedResearcher: Send + Sync {
    async fn research(&self, company: &str, issues: &[IssueId])
        -> Result<EvidenceMap, FetchError>;
}

/// Researches a company's most valuable products and their competitors.
#[async_trait]
pub trait CompetitionResearcher: Send + Sync {
    async fn competition(&self, company: &str) -> Result<Vec<ProductCompetition>, FetchError>;
}
