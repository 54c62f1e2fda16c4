use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{fixtures, EvidenceSource, SourceEvidence};
use crate::clock::{duration_until, Clock};
use crate::error::truncate;
use crate::evidence::{EvidenceBundle, EvidenceMap};
use crate::issue::IssueId;
use crate::llm::TextScorer;
use crate::retry::{Classify, ErrorClass, RetryPolicy};
use crate::settings::SearchSettings;
use crate::web::{HtmlTextExtractor, PageFetcher, WebSearch};

/// Collaborators used by a live [`SearchEvidence`].
pub struct SearchCollaborators {
    pub search: Arc<dyn WebSearch>,
    pub pages: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn HtmlTextExtractor>,
    pub scorer: Arc<dyn TextScorer>,
    pub clock: Arc<dyn Clock>,
}

/// News search per issue, article download and model scoring of each article batch.
pub struct SearchEvidence {
    backend: Backend,
}

enum Backend {
    Live(Box<LiveSearch>),
    Offline,
}

struct LiveSearch {
    parts: SearchCollaborators,
    settings: SearchSettings,
    retry: RetryPolicy,
    issues: Vec<IssueId>,
}

/// Articles gathered for one issue.
struct IssueArticles {
    issue: IssueId,
    texts: Vec<String>,
}

impl SearchEvidence {
    pub fn live(parts: SearchCollaborators, settings: &SearchSettings, retry: RetryPolicy) -> Self {
        Self {
            backend: Backend::Live(Box::new(LiveSearch {
                parts,
                settings: settings.clone(),
                retry,
                issues: IssueId::ALL.to_vec(),
            })),
        }
    }

    pub fn offline() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }

    /// Restrict the searched issues; catalogue order is kept regardless of input order.
    pub fn with_issues(mut self, issues: &[IssueId]) -> Self {
        if let Backend::Live(live) = &mut self.backend {
            let mut issues = issues.to_vec();
            issues.sort();
            issues.dedup();
            live.issues = issues;
        }
        self
    }
}

impl LiveSearch {
    /// Result links for one query, honouring the retry delay and the daily quota reset.
    ///
    /// Any failed search gets the delayed retry, rejections included.
    async fn links_for(&self, query: &str) -> Vec<String> {
        let clock = &self.parts.clock;
        for attempt in 0..self.settings.max_attempts {
            if attempt > 0 {
                clock
                    .sleep(Duration::from_secs(self.settings.retry_delay_secs))
                    .await;
            }
            match self.parts.search.search(query).await {
                Ok(links) => return links,
                Err(err) => match err.class() {
                    ErrorClass::RateLimited => {
                        let wait = duration_until(
                            clock.now().naive_local(),
                            self.settings.quota_reset_hour,
                        );
                        warn!(
                            %err,
                            wait = %humantime::format_duration(wait),
                            "search quota exhausted; waiting for reset"
                        );
                        clock.sleep(wait).await;
                    }
                    ErrorClass::Transient | ErrorClass::Fatal => {
                        warn!(%err, attempt, "search failed");
                    }
                },
            }
        }
        Vec::new()
    }

    /// Downloads every link and keeps the non-empty extracted texts.
    async fn articles(&self, links: &[String]) -> Vec<String> {
        let mut texts = Vec::new();
        let mut failures = 0usize;
        for link in links {
            match self.parts.pages.fetch_page(link).await {
                Ok(html) => {
                    let text = self.parts.extractor.extract(&html);
                    if text.is_empty() {
                        debug!(%link, "no readable text");
                        continue;
                    }
                    texts.push(truncate(&text, self.settings.max_article_chars));
                }
                Err(err) => {
                    failures += 1;
                    debug!(%link, %err, "article download failed");
                }
            }
        }
        if failures > 0 {
            warn!(failures, total = links.len(), "some articles could not be downloaded");
        }
        texts
    }

    async fn gather(&self, company: &str) -> (Vec<IssueArticles>, Vec<String>) {
        let clock = &self.parts.clock;
        let interval = Duration::from_millis(self.settings.min_issue_interval_ms);
        let mut batches = Vec::new();
        let mut sources = Vec::new();
        for &issue in &self.issues {
            let started = clock.now();
            let query = format!("{company} {}", issue.description());
            let links = self.links_for(&query).await;
            if links.is_empty() {
                debug!(%issue, "no search results");
            } else {
                let texts = self.articles(&links).await;
                info!(%issue, links = links.len(), articles = texts.len(), "articles gathered");
                sources.extend(links);
                if !texts.is_empty() {
                    batches.push(IssueArticles { issue, texts });
                }
            }
            let elapsed = (clock.now() - started).to_std().unwrap_or_default();
            if let Some(remaining) = interval.checked_sub(elapsed) {
                clock.sleep(remaining).await;
            }
        }
        (batches, sources)
    }

    async fn score(&self, company: &str, batches: Vec<IssueArticles>) -> EvidenceBundle {
        let mut bundle = EvidenceBundle::new();
        for batch in batches {
            let scored = self
                .retry
                .run("article scoring", EvidenceMap::new, || {
                    self.parts.scorer.score(company, &batch.texts)
                })
                .await;
            let scored = match scored {
                Ok(scored) => scored,
                Err(err) => {
                    warn!(issue = %batch.issue, %err, "article scoring rejected");
                    continue;
                }
            };
            debug!(issue = %batch.issue, reported = scored.len(), "article batch scored");
            for (issue, observation) in scored {
                bundle.entry(issue).or_default().push(observation);
            }
        }
        bundle
    }
}

#[async_trait]
impl EvidenceSource for SearchEvidence {
    fn name(&self) -> &'static str {
        "search"
    }

    #[instrument(name = "search_evidence", skip(self))]
    async fn fetch(&self, company: &str) -> SourceEvidence {
        let live = match &self.backend {
            Backend::Offline => return SourceEvidence::from_bundle(fixtures::search(company)),
            Backend::Live(live) => live,
        };
        info!(issues = live.issues.len(), "searching news coverage");
        let (batches, links) = live.gather(company).await;
        let bundle = live.score(company, batches).await;
        SourceEvidence { bundle, links }
    }
}
