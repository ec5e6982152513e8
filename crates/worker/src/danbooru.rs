//! Danbooru as a [`Source`].

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use accord_core::config::DanbooruCredentials;
use accord_core::Item;

use crate::source::{Source, PAGE_SIZE};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct CountsResponse {
    counts: Counts,
}

#[derive(Debug, Deserialize)]
struct Counts {
    posts: Option<u64>,
}

/// Hidden posts come back without an id or timestamp.
#[derive(Debug, Deserialize)]
struct Post {
    id: Option<u64>,
    created_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone)]
pub struct DanbooruClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<DanbooruCredentials>,
}

impl DanbooruClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Option<DanbooruCredentials>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Client with the default request timeout.
    pub fn with_defaults(
        base_url: impl Into<String>,
        credentials: Option<DanbooruCredentials>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::new(client, base_url, credentials))
    }

    pub fn post_url(&self, id: u64) -> String {
        format!("{}/posts/{}", self.base_url, id)
    }

    fn query(&self, tags: &[String], page: Option<u64>) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(5);
        if let Some(credentials) = &self.credentials {
            query.push(("login", credentials.login.clone()));
            query.push(("api_key", credentials.api_key.clone()));
        }
        query.push(("tags", tags.join(" ")));
        if let Some(page) = page {
            query.push(("page", page.to_string()));
            query.push(("limit", PAGE_SIZE.to_string()));
        }
        query
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, SourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }

        Ok(response.json().await?)
    }

    pub async fn try_count(&self, tags: &[String]) -> Result<u64, SourceError> {
        let body: CountsResponse = self
            .get("/counts/posts.json", &self.query(tags, None))
            .await?;
        Ok(body.counts.posts.unwrap_or(0))
    }

    pub async fn try_fetch_page(&self, tags: &[String], page: u64) -> Result<Vec<Item>, SourceError> {
        let posts: Vec<Post> = self
            .get("/posts.json", &self.query(tags, Some(page)))
            .await?;
        Ok(self.items(posts))
    }

    fn items(&self, posts: Vec<Post>) -> Vec<Item> {
        posts
            .into_iter()
            .filter_map(|post| match (post.id, post.created_at) {
                (Some(id), Some(created_at)) => Some(Item {
                    id,
                    created_at: created_at.with_timezone(&Utc),
                    url: self.post_url(id),
                }),
                _ => {
                    debug!(id = ?post.id, "skipping hidden post");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl Source for DanbooruClient {
    async fn count(&self, tags: &[String]) -> u64 {
        match self.try_count(tags).await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, tags = %tags.join(" "), "post count failed, source may be down");
                0
            }
        }
    }

    async fn fetch_page(&self, tags: &[String], page: u64) -> Vec<Item> {
        match self.try_fetch_page(tags, page).await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, page, tags = %tags.join(" "), "post fetch failed, source may be down");
                Vec::new()
            }
        }
    }
}
