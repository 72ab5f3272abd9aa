use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};
use url::Url;

use super::Endpoint;

static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)</li>").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h2\b[^>]*>(.*?)</h2>").unwrap());
static INPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b[^>]*>").unwrap());
static CLASS_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bclass\s*=\s*"([^"]*)""#).unwrap());
static VALUE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bvalue\s*=\s*"([^"]*)""#).unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to fetch endpoint directory: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("no http(s) endpoints found in {0}")]
    Empty(String),
}

/// A source of candidate endpoints
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    /// Lists candidates. Yielding none is an error, since there is nothing to select from
    async fn discover(&self) -> Result<Vec<Endpoint>, DirectoryError>;
}

/// Scrapes a public node listing, such as <https://ethereumnodes.com/>
///
/// Each `<li>` of the page is expected to hold the provider name in an `<h2>` and the endpoint in
/// an `<input class="endpoint" value="...">`. Items that don't match are ignored
#[derive(Debug)]
pub struct NodesPage {
    url: String,
    client: reqwest::Client,
}

impl NodesPage {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        Ok(Self {
            url: url.to_owned(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl EndpointDirectory for NodesPage {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn discover(&self) -> Result<Vec<Endpoint>, DirectoryError> {
        let html = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let endpoints = parse_nodes_page(&html);
        debug!(found = endpoints.len());

        if endpoints.is_empty() {
            return Err(DirectoryError::Empty(self.url.clone()));
        }

        Ok(endpoints)
    }
}

/// A fixed list of endpoints, usually from configuration
#[derive(Debug, Clone)]
pub struct StaticEndpoints(Vec<Endpoint>);

impl StaticEndpoints {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self(endpoints)
    }
}

#[async_trait]
impl EndpointDirectory for StaticEndpoints {
    async fn discover(&self) -> Result<Vec<Endpoint>, DirectoryError> {
        let endpoints: Vec<_> = self
            .0
            .iter()
            .filter(|e| is_http(&e.url))
            .cloned()
            .collect();

        if endpoints.is_empty() {
            return Err(DirectoryError::Empty("static endpoint list".to_owned()));
        }

        Ok(endpoints)
    }
}

pub(super) fn parse_nodes_page(html: &str) -> Vec<Endpoint> {
    LIST_ITEM
        .captures_iter(html)
        .filter_map(|item| {
            let item = item.get(1)?.as_str();

            let name = HEADING.captures(item)?.get(1)?.as_str();
            let name = TAG.replace_all(name, "");
            let name = name.split_whitespace().collect::<Vec<_>>().join(" ");

            let url = INPUT
                .find_iter(item)
                .map(|input| input.as_str())
                .find(|input| {
                    CLASS_ATTR
                        .captures(input)
                        .and_then(|c| c.get(1))
                        .is_some_and(|c| c.as_str().split_whitespace().any(|c| c == "endpoint"))
                })
                .and_then(|input| VALUE_ATTR.captures(input)?.get(1))
                .map(|v| v.as_str().trim().replace("&amp;", "&"))?;

            (!name.is_empty() && is_http(&url)).then(|| Endpoint::new(name, url))
        })
        .collect()
}

/// Only plain request/response transports. Websocket and IPC endpoints are dropped
fn is_http(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
