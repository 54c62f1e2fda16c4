use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::aggregate;
use crate::clock::{Clock, SystemClock};
use crate::competitors::{
    CompetitorLookup, NoCompetitors, OfflineCompetitors, ResearchedCompetitors,
};
use crate::evidence::total_weight;
use crate::llm::{GeminiClient, ScoringTools};
use crate::record::{canonical_name, CompanyRecord};
use crate::retry::RetryPolicy;
use crate::settings::{Credentials, ScoutSettings};
use crate::sources::search::SearchCollaborators;
use crate::sources::{
    EvidenceSource, FetchMode, FinancialEvidence, GroundedModelEvidence, SearchEvidence,
};
use crate::web::{GoogleCustomSearch, HttpPageFetcher, TagStripExtractor};

/// What happened to one company of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CompanyOutcome {
    /// The skip predicate matched; nothing was fetched.
    Skipped,
    /// No source produced weighted evidence.
    Dropped,
    Recorded(Box<CompanyRecord>),
}

/// Runs every evidence source for each company in turn and aggregates the result.
pub struct CompanyPipeline {
    sources: Vec<Box<dyn EvidenceSource>>,
    competitors: Box<dyn CompetitorLookup>,
    clock: Arc<dyn Clock>,
}

impl CompanyPipeline {
    pub fn new(
        sources: Vec<Box<dyn EvidenceSource>>,
        competitors: Box<dyn CompetitorLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sources,
            competitors,
            clock,
        }
    }

    /// Fixture-backed pipeline: no network, no credentials.
    pub fn offline(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            vec![
                Box::new(SearchEvidence::offline()),
                Box::new(FinancialEvidence::offline()),
                Box::new(GroundedModelEvidence::offline()),
            ],
            Box::new(OfflineCompetitors),
            clock,
        )
    }

    /// Wire the live collaborators; sources whose credentials are missing are left out.
    pub fn live(
        settings: &ScoutSettings,
        credentials: &Credentials,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let retry = RetryPolicy::new(&settings.retry, clock.clone());
        let gemini = match credentials.get(Credentials::GEMINI) {
            Some(key) => Some(Arc::new(
                GeminiClient::new(&settings.gemini, key, Arc::new(ScoringTools::default()))?
                    .with_article_limit(settings.search.max_article_chars),
            )),
            None => {
                warn!("no gemini key configured; model-backed sources disabled");
                None
            }
        };

        let mut sources: Vec<Box<dyn EvidenceSource>> = Vec::new();
        match (credentials.get(Credentials::GOOGLE_SEARCH), &gemini) {
            (Some(search_key), Some(gemini)) => {
                let parts = SearchCollaborators {
                    search: Arc::new(GoogleCustomSearch::new(&settings.search, search_key)?),
                    pages: Arc::new(HttpPageFetcher::new(&settings.search)?),
                    extractor: Arc::new(TagStripExtractor),
                    scorer: gemini.clone(),
                    clock: clock.clone(),
                };
                sources.push(Box::new(SearchEvidence::live(
                    parts,
                    &settings.search,
                    retry.clone(),
                )));
            }
            (None, _) => warn!("no google search key configured; search source disabled"),
            (Some(_), None) => debug!("search source needs a scoring model; disabled"),
        }

        let financial_key = credentials.get(Credentials::FINANCIAL);
        if financial_key.is_none() {
            warn!("no financial data key configured; financial source will report nothing");
        }
        sources.push(Box::new(FinancialEvidence::live(
            &settings.financial,
            financial_key,
            retry.clone(),
        )?));

        let competitors: Box<dyn CompetitorLookup> = match gemini {
            Some(gemini) => {
                sources.push(Box::new(GroundedModelEvidence::live(
                    gemini.clone(),
                    retry.clone(),
                )));
                Box::new(ResearchedCompetitors::new(gemini, retry))
            }
            None => Box::new(NoCompetitors),
        };

        Ok(Self::new(sources, competitors, clock))
    }

    pub fn from_mode(
        mode: FetchMode,
        settings: &ScoutSettings,
        credentials: &Credentials,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        match mode {
            FetchMode::Live => Self::live(settings, credentials, clock),
            FetchMode::Offline => Ok(Self::offline(clock)),
        }
    }

    /// Analyze one company. `skip` receives the canonical name.
    #[instrument(skip(self, skip))]
    pub async fn analyze_company(
        &self,
        company: &str,
        skip: &dyn Fn(&str) -> bool,
    ) -> CompanyOutcome {
        let canonical = canonical_name(company);
        if skip(&canonical) {
            info!(%canonical, "skipping company");
            return CompanyOutcome::Skipped;
        }

        let mut bundles = Vec::with_capacity(self.sources.len());
        let mut links = Vec::new();
        for source in &self.sources {
            let evidence = source.fetch(company).await;
            info!(
                source = source.name(),
                issues = evidence.bundle.len(),
                weight = total_weight(&evidence.bundle),
                "source finished"
            );
            bundles.push(evidence.bundle);
            links.extend(evidence.links);
        }

        let metrics = aggregate(&bundles);
        if metrics.is_empty() {
            warn!("no evidence found; dropping company");
            return CompanyOutcome::Dropped;
        }

        let competitors = self.competitors.competitors(company).await;
        let record = CompanyRecord {
            canonical_name: canonical,
            full_name: company.to_string(),
            metrics,
            competitors,
            sources: links,
            timestamp: self.clock.now().timestamp(),
        };
        info!(issues = record.metrics.len(), "company analyzed");
        CompanyOutcome::Recorded(Box::new(record))
    }

    /// Analyze companies in order; `on_record` sees each record as soon as it exists.
    pub async fn analyze(
        &self,
        companies: &[String],
        on_record: &mut dyn FnMut(&str, &CompanyRecord),
        skip: &dyn Fn(&str) -> bool,
    ) -> BTreeMap<String, CompanyRecord> {
        let mut batch = BTreeMap::new();
        for company in companies {
            match self.analyze_company(company, skip).await {
                CompanyOutcome::Recorded(record) => {
                    on_record(&record.canonical_name, &record);
                    batch.insert(record.canonical_name.clone(), *record);
                }
                CompanyOutcome::Skipped | CompanyOutcome::Dropped => {}
            }
        }
        info!(requested = companies.len(), recorded = batch.len(), "batch finished");
        batch
    }
}

/// Build the default pipeline for `mode` on the system clock and analyze `companies`.
pub async fn analyze(
    companies: &[String],
    credentials: &Credentials,
    settings: &ScoutSettings,
    mode: FetchMode,
    on_record: &mut dyn FnMut(&str, &CompanyRecord),
    skip: &dyn Fn(&str) -> bool,
) -> Result<BTreeMap<String, CompanyRecord>> {
    let pipeline = CompanyPipeline::from_mode(mode, settings, credentials, Arc::new(SystemClock))?;
    Ok(pipeline.analyze(companies, on_record, skip).await)
}
