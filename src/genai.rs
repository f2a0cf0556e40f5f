//! Generative-text API client and response post-processing.
//!
//! The model is asked for strict JSON but regularly wraps it in prose or
//! code fences, so parsing always goes through a "find the first JSON
//! payload in the text" step before deserializing.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/";
const MAX_POST_OPTIONS: usize = 4;

static JSON_ARRAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").unwrap());
static JSON_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// One generated post variation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct PostOption {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
}

/// Parsed blog generation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BlogPayload {
    pub title: String,
    pub excerpt: String,
    #[serde(default)]
    pub category: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub linkedin_content: Option<String>,
}

/// Seam for the generative-text API.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Seam for fetching a page's HTML on behalf of a generation request.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
    temperature: f32,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, temperature: f32) -> Self {
        let base_url = Url::parse(GEMINI_API_BASE).expect("valid default Gemini URL");
        Self::with_base_url(api_key, model, temperature, base_url)
    }

    pub fn with_base_url(api_key: String, model: String, temperature: f32, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("contentbot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            model,
            temperature,
        }
    }

    pub fn build_request(&self, prompt: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("v1beta/models/{}:generateContent", self.model))
            .context("invalid Gemini base URL")?;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature, "topP": 0.9 },
        });
        self.http
            .post(endpoint)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .context("failed to build Gemini request")
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self.build_request(prompt)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Gemini")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("gemini error {}: {}", status, body));
        }

        let payload: GenerateContentResponse =
            res.json().await.context("invalid Gemini response JSON")?;
        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(anyhow!("gemini returned an empty candidate"));
        }
        Ok(text)
    }
}

/// Plain reqwest-backed page fetcher for product URLs.
#[derive(Clone)]
pub struct HttpPageFetcher {
    http: Client,
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        let http = Client::builder()
            .user_agent("contentbot/0.1")
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "could not fetch {} ({}); the page may be private or blocked",
                url,
                res.status()
            ));
        }
        res.text().await.context("failed to read page body")
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// ---------------------------------------------------------------------------
// Response post-processing
// ---------------------------------------------------------------------------

/// Parse post variations out of raw model text: take the first JSON array,
/// drop entries without content, cap the count.
pub fn parse_post_options(text: &str) -> Vec<PostOption> {
    let Some(m) = JSON_ARRAY_RE.find(text) else {
        return Vec::new();
    };
    let Ok(raw) = serde_json::from_str::<Vec<Value>>(m.as_str()) else {
        return Vec::new();
    };
    raw.into_iter()
        .take(MAX_POST_OPTIONS)
        .filter_map(|v| {
            let content = v.get("content").and_then(Value::as_str)?.to_string();
            if content.is_empty() {
                return None;
            }
            let hook = v
                .get("hook")
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|h| !h.is_empty());
            Some(PostOption { content, hook })
        })
        .collect()
}

/// Parse a blog payload out of raw model text: take the first JSON object
/// and require the fields the pipeline cannot invent.
pub fn parse_blog_payload(text: &str) -> Result<BlogPayload> {
    let m = JSON_OBJECT_RE
        .find(text)
        .ok_or_else(|| anyhow!("no JSON object in model output"))?;
    let payload: BlogPayload =
        serde_json::from_str(m.as_str()).context("malformed blog payload JSON")?;
    if payload.title.trim().is_empty() {
        return Err(anyhow!("blog payload is missing a title"));
    }
    if payload.excerpt.trim().is_empty() {
        return Err(anyhow!("blog payload is missing an excerpt"));
    }
    if payload.body.trim().is_empty() {
        return Err(anyhow!("blog payload is missing a body"));
    }
    Ok(payload)
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub fn build_product_posts_prompt(product_name: &str, product_url: &str, context: &str) -> String {
    format!(
        "Write 3-4 LinkedIn post variations promoting the product \"{product_name}\" \
         ({product_url}).\n\n{context}\n\n\
         Respond with only a JSON array of objects with keys \"content\" and \"hook\"."
    )
}

pub fn build_news_posts_prompt(news_category: &str, article_title: &str, article_link: &str) -> String {
    format!(
        "Write one LinkedIn post commenting on this {news_category} news article: \
         \"{article_title}\" ({article_link}).\n\n\
         Respond with only a JSON array containing one object with keys \"content\" and \"hook\"."
    )
}

pub fn build_blog_prompt(category: &str, idea_index: i64) -> String {
    format!(
        "PREFERRED_CATEGORY: {category}\n\
         PREFERRED_IDEA_INDEX: {idea_index}\n\
         Brainstorm five article ideas for the category, pick the idea at \
         PREFERRED_IDEA_INDEX, and write the article.\n\
         Respond with only a JSON object with keys \"title\", \"excerpt\", \
         \"category\", \"body\" (markdown), \"tags\" (array of strings), and \
         \"linkedin_content\" (a short promo post for the article)."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_from_wrapped_text() {
        let text = r#"Sure! Here are your posts:
[
  {"content": "First post", "hook": "Hook one"},
  {"content": "Second post"},
  {"content": ""},
  {"content": "Third post", "hook": ""}
]
Hope this helps."#;
        let options = parse_post_options(text);
        assert_eq!(options.len(), 3);
        assert_eq!(options[0].content, "First post");
        assert_eq!(options[0].hook.as_deref(), Some("Hook one"));
        assert_eq!(options[1].hook, None);
        // Empty hooks are dropped, empty contents skip the whole entry.
        assert_eq!(options[2].hook, None);
    }

    #[test]
    fn caps_at_four_options() {
        let text = r#"[
            {"content": "1"}, {"content": "2"}, {"content": "3"},
            {"content": "4"}, {"content": "5"}
        ]"#;
        assert_eq!(parse_post_options(text).len(), 4);
    }

    #[test]
    fn no_array_means_no_options() {
        assert!(parse_post_options("the model refused").is_empty());
        assert!(parse_post_options("[not json").is_empty());
    }

    #[test]
    fn parses_blog_payload() {
        let text = r##"```json
{"title": "On Widgets", "excerpt": "Why widgets matter.", "category": "Product Engineering",
 "body": "# On Widgets\n\nBody.", "tags": ["widgets"], "linkedin_content": "We wrote about widgets."}
```"##;
        let payload = parse_blog_payload(text).unwrap();
        assert_eq!(payload.title, "On Widgets");
        assert_eq!(payload.tags, vec!["widgets"]);
        assert_eq!(
            payload.linkedin_content.as_deref(),
            Some("We wrote about widgets.")
        );
    }

    #[test]
    fn blog_payload_requires_title_and_body() {
        let err = parse_blog_payload(r#"{"title": "", "excerpt": "x", "body": "y"}"#).unwrap_err();
        assert!(err.to_string().contains("title"));
        let err =
            parse_blog_payload(r#"{"title": "t", "excerpt": "x", "body": "  "}"#).unwrap_err();
        assert!(err.to_string().contains("body"));
        assert!(parse_blog_payload("no json here").is_err());
    }

    #[test]
    fn build_request_sets_headers() {
        let client = GeminiClient::new("key".into(), "gemini-3-flash-preview".into(), 0.8);
        let request = client.build_request("hello").unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().path(),
            "/v1beta/models/gemini-3-flash-preview:generateContent"
        );
        let headers = request.headers();
        assert_eq!(
            headers
                .get("x-goog-api-key")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "key"
        );
        assert_eq!(
            headers
                .get("Content-Type")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "application/json"
        );
    }
}
