use std::borrow::Cow;

use anyhow::{bail, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::http::{build_client, ensure_success, read_json};
use crate::settings::SearchSettings;

/// Web search returning result links for a free-text query.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, FetchError>;
}

/// Downloads the raw body of a result page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Best-effort plain-text extraction; returns an empty string when nothing is usable.
pub trait HtmlTextExtractor: Send + Sync {
    fn extract(&self, html: &str) -> String;
}

const SEARCH_SERVICE: &str = "search";
const PAGE_SERVICE: &str = "article";

/// Google Programmable Search (Custom Search JSON API) client.
#[derive(Debug, Clone)]
pub struct GoogleCustomSearch {
    http: Client,
    endpoint: String,
    engine_id: String,
    api_key: String,
    max_results: u32,
}

impl GoogleCustomSearch {
    pub fn new(settings: &SearchSettings, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("Google search API key must be provided in the credentials file");
        }
        Ok(Self {
            http: build_client(settings.timeout_secs, "search")?,
            endpoint: settings.endpoint.clone(),
            engine_id: settings.engine_id.clone(),
            api_key: api_key.trim().to_string(),
            max_results: settings.max_results,
        })
    }
}

#[async_trait]
impl WebSearch for GoogleCustomSearch {
    async fn search(&self, query: &str) -> Result<Vec<String>, FetchError> {
        let num = self.max_results.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(SEARCH_SERVICE, err))?;
        let body: SearchResponse = read_json(SEARCH_SERVICE, response).await?;
        if let Some(error) = body.error {
            warn!(code = error.code, message = %error.message, "search API reported an error");
        }
        let links: Vec<String> = body
            .items
            .into_iter()
            .filter_map(|item| item.link)
            .filter(|link| !link.trim().is_empty())
            .take(self.max_results as usize)
            .collect();
        debug!(query, results = links.len(), "search completed");
        Ok(links)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(default)]
    error: Option<SearchApiError>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    link: Option<String>,
}

#[derive(Deserialize)]
struct SearchApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

/// Plain HTTP GET page fetcher with the long article timeout.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    http: Client,
}

impl HttpPageFetcher {
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        Ok(Self {
            http: build_client(settings.article_timeout_secs, "article")?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(PAGE_SERVICE, err))?;
        let response = ensure_success(PAGE_SERVICE, response).await?;
        response
            .text()
            .await
            .map_err(|err| FetchError::from_reqwest(PAGE_SERVICE, err))
    }
}

static HIDDEN_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<(script|style|noscript|template|svg)\b[^>]*>.*?</(script|style|noscript|template|svg)\s*>")
        .expect("static regex is valid")
});
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex is valid"));
static ENTITIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("static regex is valid")
});

/// Regex-based extractor: drops invisible blocks, strips tags, decodes common entities and
/// keeps one trimmed line per text node.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagStripExtractor;

impl HtmlTextExtractor for TagStripExtractor {
    fn extract(&self, html: &str) -> String {
        let visible = HIDDEN_BLOCKS.replace_all(html, "\n");
        let text = TAGS.replace_all(&visible, "\n");
        let decoded = ENTITIES.replace_all(&text, |caps: &regex::Captures<'_>| {
            decode_entity(&caps[1]).unwrap_or_else(|| Cow::Owned(caps[0].to_string()))
        });
        decoded
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn decode_entity(name: &str) -> Option<Cow<'static, str>> {
    let named = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "mdash" => "—",
        "ndash" => "–",
        "hellip" => "…",
        "rsquo" | "lsquo" => "'",
        "rdquo" | "ldquo" => "\"",
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            return char::from_u32(code).map(|ch| Cow::Owned(ch.to_string()));
        }
    };
    Some(Cow::Borrowed(named))
}
