//! CMS write client.
//!
//! Publishing pushes one create-document mutation per blog to the CMS's
//! mutate endpoint. Request building is kept in pure functions so the JSON
//! shape is testable without a network.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;

use crate::db::BlogForOutbox;

#[async_trait]
pub trait CmsService: Send + Sync {
    /// Create the blog document and return the CMS-assigned document id.
    /// `published_at` is Some only when the document goes out published
    /// rather than as an editable draft.
    async fn create_blog_post(
        &self,
        blog: &BlogForOutbox,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<String>;
}

#[derive(Clone)]
pub struct CmsClient {
    http: Client,
    base_url: Url,
    token: String,
    dataset: String,
}

impl fmt::Debug for CmsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsClient")
            .field("base_url", &self.base_url)
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

impl CmsClient {
    pub fn new(base_url: &str, token: String, dataset: String) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid CMS base URL")?;
        let http = Client::builder()
            .user_agent("contentbot/0.1")
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            base_url,
            token,
            dataset,
        })
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("v1/data/mutate/{}", self.dataset))
            .context("invalid CMS base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build CMS request")
    }
}

#[async_trait]
impl CmsService for CmsClient {
    async fn create_blog_post(
        &self,
        blog: &BlogForOutbox,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let body = build_create_post_mutation(blog, published_at)?;
        let request = self.build_request(&body)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach CMS")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from CMS: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("cms error {}: {}", status, body));
        }

        let payload: MutateResponse = res.json().await.context("invalid CMS response JSON")?;
        payload
            .results
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| anyhow!("CMS mutation returned no results"))
    }
}

/// Build the create mutation for one blog document. The rich-text body is
/// stored as serialized JSON and embedded verbatim.
pub fn build_create_post_mutation(
    blog: &BlogForOutbox,
    published_at: Option<DateTime<Utc>>,
) -> Result<Value> {
    let body_blocks: Value = serde_json::from_str(&blog.body_rich_text)
        .context("blog rich-text body is not valid JSON")?;

    let mut doc = json!({
        "_type": "blogPost",
        "title": blog.title,
        "slug": { "_type": "slug", "current": blog.slug },
        "category": blog.category,
        "excerpt": blog.excerpt,
        "readTime": blog.read_time,
        "author": { "_type": "reference", "_ref": blog.author_id },
        "body": body_blocks,
        "tags": blog.tags,
    });
    if let Some(published_at) = published_at {
        doc["publishedAt"] = json!(published_at.to_rfc3339());
    }

    Ok(json!({ "mutations": [{ "create": doc }] }))
}

#[derive(Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutateResult>,
}

#[derive(Deserialize)]
struct MutateResult {
    id: String,
}
