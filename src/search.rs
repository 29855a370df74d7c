//! Keyword search proxy
//!
//! Turns a free-text query into a list of playable identifiers using the
//! YouTube Data API `search` endpoint. Ranking is whatever the provider
//! returns.

use crate::config::SearchConfig;
use crate::error::{Result, StreamError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const VIDEO_KIND: &str = "youtube#video";

/// One search hit, as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub thumbnail: Option<String>,
    /// Identifier usable with `/stream?id=`
    pub id: String,
}

/// Something that can answer keyword searches
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Search provider backed by the YouTube Data API v3
pub struct YoutubeSearchProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    kind: String,
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YoutubeSearchProvider {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StreamError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(YoutubeSearchProvider {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            max_results: config.max_results,
        })
    }
}

#[async_trait]
impl SearchProvider for YoutubeSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        debug!("Searching for {:?}", query);
        let max_results = self.max_results.to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StreamError::SearchError(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Search provider returned {}", status);
            return Err(StreamError::SearchError(format!(
                "search provider returned {}",
                status
            )));
        }

        let body: SearchListResponse = response
            .json()
            .await
            .map_err(|e| StreamError::SearchError(format!("invalid search response: {}", e)))?;

        Ok(body.items.into_iter().filter_map(to_result).collect())
    }
}

fn to_result(item: SearchItem) -> Option<SearchResult> {
    if item.id.kind != VIDEO_KIND {
        return None;
    }
    let id = item.id.video_id?;
    let snippet = item.snippet?;
    let thumbnails = snippet.thumbnails;
    let thumbnail = thumbnails
        .high
        .or(thumbnails.medium)
        .or(thumbnails.default)
        .map(|t| t.url);

    Some(SearchResult {
        title: snippet.title,
        thumbnail,
        id,
    })
}
