use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::tools::{FunctionDeclaration, ScoringTools, LIST_COMPETITION};
use super::{CompetitionResearcher, GroundedResearcher, TextScorer};
use crate::competitors::ProductCompetition;
use crate::error::{truncate, FetchError};
use crate::evidence::{EvidenceMap, Observation, ObservationArgs};
use crate::http::{build_client, read_json};
use crate::issue::IssueId;
use crate::settings::GeminiSettings;

const SERVICE: &str = "gemini";
/// Weight given to scores the model writes as plain text instead of calling functions.
const TEXT_ANSWER_WEIGHT: f64 = 50.0;

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*?\}").expect("static regex is valid"));

/// REST client for Gemini `generateContent`, used for article scoring, grounded research and
/// competitor research.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    url: String,
    api_key: String,
    tools: Arc<ScoringTools>,
    max_article_chars: usize,
}

impl GeminiClient {
    pub fn new(
        settings: &GeminiSettings,
        api_key: &str,
        tools: Arc<ScoringTools>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("Gemini API key must be provided in the credentials file");
        }
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            settings.endpoint.trim_end_matches('/'),
            settings.model
        );
        Ok(Self {
            http: build_client(settings.timeout_secs, "Gemini")?,
            url,
            api_key: api_key.trim().to_string(),
            tools,
            max_article_chars: usize::MAX,
        })
    }

    /// Cap each article's length before it is placed in a prompt.
    pub fn with_article_limit(mut self, max_chars: usize) -> Self {
        self.max_article_chars = max_chars.max(1);
        self
    }

    /// Single attempt; retries belong to the caller's [`RetryPolicy`](crate::retry::RetryPolicy).
    async fn generate(
        &self,
        request: &GenerateRequest<'_>,
    ) -> Result<GenerateResponse, FetchError> {
        let response = self
            .http
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .json(request)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(SERVICE, err))?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl TextScorer for GeminiClient {
    async fn score(&self, company: &str, articles: &[String]) -> Result<EvidenceMap, FetchError> {
        let prompt = article_prompt(company, articles, self.max_article_chars);
        let request = GenerateRequest::new(prompt, &self.tools.article_scoring, false, false);
        let response = self.generate(&request).await?;
        let observations = observations_from_calls(response.function_calls());
        if observations.is_empty() {
            debug!(company, "article scoring returned no function calls");
        }
        Ok(observations)
    }
}

#[async_trait]
impl GroundedResearcher for GeminiClient {
    async fn research(
        &self,
        company: &str,
        issues: &[IssueId],
    ) -> Result<EvidenceMap, FetchError> {
        let request = GenerateRequest::new(
            research_prompt(company, issues),
            &self.tools.research_scoring,
            true,
            false,
        );
        let response = self.generate(&request).await?;
        let observations = observations_from_calls(response.function_calls());
        if !observations.is_empty() {
            return Ok(observations);
        }
        let text = response.text();
        if text.trim().is_empty() {
            debug!(company, "grounded research returned no content");
            return Ok(observations);
        }
        Ok(observations_from_text(&text))
    }
}

#[async_trait]
impl CompetitionResearcher for GeminiClient {
    async fn competition(&self, company: &str) -> Result<Vec<ProductCompetition>, FetchError> {
        let request =
            GenerateRequest::new(competition_prompt(company), &self.tools.competition, true, true);
        let response = self.generate(&request).await?;
        competition_from_calls(response.function_calls())
    }
}

fn article_prompt(company: &str, articles: &[String], max_chars: usize) -> String {
    let formatted: Vec<String> = articles
        .iter()
        .enumerate()
        .map(|(idx, article)| format!("ARTICLE {}: {}", idx + 1, truncate(article, max_chars)))
        .collect();
    format!("COMPANY NAME: {company}\nARTICLE(S): {}", formatted.join(" "))
}

fn research_prompt(company: &str, issues: &[IssueId]) -> String {
    let categories: Vec<String> = issues
        .iter()
        .map(|issue| format!("\"{}\": \"{}\"", issue.code(), issue.description()))
        .collect();
    format!(
        "Research and score the company \"{company}\" in all the specified categories you can \
         find information on. Then, return your confidence and score for each category in the \
         functions.\ncategories:\n{{{}}}",
        categories.join(", ")
    )
}

fn competition_prompt(company: &str) -> String {
    format!(
        "COMPANY NAME: {company}\nList information about the competition for this company's \
         most valuable products or services and compile any data you find in the \
         {LIST_COMPETITION} function. This function must be called exactly once."
    )
}

/// Convert `<ISSUE>_INDEX` calls into observations, dropping anything that fails validation.
fn observations_from_calls<'a>(calls: impl Iterator<Item = &'a FunctionCall>) -> EvidenceMap {
    let mut observations = EvidenceMap::new();
    for call in calls {
        let issue = match IssueId::from_function_name(&call.name) {
            Ok(issue) => issue,
            Err(err) => {
                warn!(%err, "model called an unknown function");
                continue;
            }
        };
        let parsed = serde_json::from_value::<ObservationArgs>(call.args.clone())
            .map_err(|err| err.to_string())
            .and_then(|args| args.into_observation().map_err(|err| err.to_string()));
        match parsed {
            Ok(observation) => {
                observations.insert(issue, observation);
            }
            Err(err) => warn!(%issue, %err, "dropping malformed function arguments"),
        }
    }
    observations
}

/// Lenient fallback for a model that answers `{"ENV": 72, ...}` in prose.
fn observations_from_text(text: &str) -> EvidenceMap {
    let mut observations = EvidenceMap::new();
    let Some(found) = JSON_OBJECT.find(text) else {
        warn!("grounded research answered without functions or a score object");
        return observations;
    };
    let scores: BTreeMap<String, Value> = match json5::from_str(found.as_str()) {
        Ok(scores) => scores,
        Err(err) => {
            warn!(%err, "grounded research score object is not valid JSON5");
            return observations;
        }
    };
    for (key, value) in scores {
        let Ok(issue) = IssueId::from_function_name(&key) else {
            warn!(%key, "ignoring score for unknown issue");
            continue;
        };
        match value
            .as_f64()
            .map(|score| Observation::new(TEXT_ANSWER_WEIGHT, score))
        {
            Some(Ok(observation)) => {
                observations.insert(issue, observation);
            }
            Some(Err(err)) => warn!(%issue, %err, "dropping out-of-range text score"),
            None => warn!(%issue, "dropping non-numeric text score"),
        }
    }
    observations
}

fn competition_from_calls<'a>(
    mut calls: impl Iterator<Item = &'a FunctionCall>,
) -> Result<Vec<ProductCompetition>, FetchError> {
    let Some(call) = calls.find(|call| call.name == LIST_COMPETITION) else {
        return Ok(Vec::new());
    };
    let Some(products) = call.args.get("products") else {
        return Ok(Vec::new());
    };
    serde_json::from_value(products.clone()).map_err(|err| {
        FetchError::transient(SERVICE, format!("malformed {LIST_COMPETITION} arguments: {err}"))
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent>,
    tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
    generation_config: GenerationConfig,
}

impl<'a> GenerateRequest<'a> {
    fn new(
        prompt: String,
        functions: &'a [FunctionDeclaration],
        grounded: bool,
        force_call: bool,
    ) -> Self {
        let mut tools = vec![Tool {
            function_declarations: Some(functions),
            google_search: None,
        }];
        if grounded {
            tools.push(Tool {
                function_declarations: None,
                google_search: Some(GoogleSearch {}),
            });
        }
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            tools,
            tool_config: force_call.then(|| ToolConfig {
                function_calling_config: FunctionCallingConfig { mode: "ANY" },
            }),
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_k: 1,
                top_p: 0.1,
            },
        }
    }
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    function_declarations: Option<&'a [FunctionDeclaration]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<GoogleSearch>,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Serialize)]
struct FunctionCallingConfig {
    mode: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts().filter_map(|part| part.function_call.as_ref())
    }

    fn text(&self) -> String {
        self.parts()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}
