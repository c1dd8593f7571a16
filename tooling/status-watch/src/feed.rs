use crate::models::FeedIncident;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("status feed returned non-success status: {0}")]
    Status(reqwest::StatusCode),
    #[error("status feed body could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One poll of the status feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedReport {
    /// Public page advertised by the feed, if any.
    pub page_url: Option<String>,
    pub incidents: Vec<FeedIncident>,
}

#[async_trait::async_trait]
pub trait IncidentFeed {
    async fn fetch_unresolved(&self) -> Result<FeedReport, FeedError>;
}

/// Client for a Statuspage v2 `incidents/unresolved.json` endpoint.
#[derive(Debug, Clone)]
pub struct StatuspageFeed {
    client: Client,
    url: String,
}

impl StatuspageFeed {
    pub fn new(url: String, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl IncidentFeed for StatuspageFeed {
    async fn fetch_unresolved(&self) -> Result<FeedReport, FeedError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }

        let body = response.text().await?;
        parse_report(&body)
    }
}

pub fn parse_report(body: &str) -> Result<FeedReport, FeedError> {
    let document = serde_json::from_str::<UnresolvedIncidentsResponse>(body)?;

    Ok(FeedReport {
        page_url: document
            .page
            .and_then(|page| page.url)
            .filter(|url| !url.trim().is_empty()),
        incidents: document.incidents,
    })
}

#[derive(Debug, Deserialize)]
struct UnresolvedIncidentsResponse {
    #[serde(default)]
    page: Option<PageInfo>,
    incidents: Vec<FeedIncident>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    url: Option<String>,
}
