//! HTTP client and argument helpers for the `birdtag` command.
//!
//! Set BIRDTAG_API_URL (or API_URL) and BIRDTAG_USER. Every request carries
//! the user in the `X-User-Id` header.

use anyhow::{Context, Result};
use birdtag_core::validation::parse_tag_token;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const USER_ID_HEADER: &str = "X-User-Id";

/// API version prefix. Set BIRDTAG_API_VERSION to match the server.
pub fn api_prefix() -> String {
    let version = std::env::var("BIRDTAG_API_VERSION").unwrap_or_else(|_| "v0".to_string());
    format!("/api/{}", version)
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    user: String,
}

#[derive(Debug, Serialize)]
struct TagEditBody<'a> {
    urls: &'a [String],
    media_ids: &'a [String],
    tags: &'a [String],
    operation: i64,
}

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    urls: &'a [String],
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, user: impl Into<String>) -> Result<Self> {
        let user = user.into();
        if user.trim().is_empty() {
            anyhow::bail!("A user identity is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, api_prefix(), path)
    }

    fn with_identity(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(USER_ID_HEADER, self.user.as_str())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self
            .with_identity(request)
            .send()
            .await
            .context("Failed to send request")?;
        read_json(response).await
    }

    /// Intersection search. Each pair is a tag and its minimum count; an
    /// empty count means "at least one".
    pub async fn search(&self, constraints: &[(String, String)]) -> Result<Value> {
        let request = self
            .client
            .get(self.build_url("/media/search"))
            .query(constraints);
        self.send(request).await
    }

    pub async fn tags_of(&self, media_id: &str) -> Result<Value> {
        let request = self
            .client
            .get(self.build_url(&format!("/media/{}/tags", media_id)));
        self.send(request).await
    }

    /// Add (`operation = 1`) or remove (`operation = 0`) tags.
    pub async fn edit_tags(
        &self,
        urls: &[String],
        media_ids: &[String],
        tags: &[String],
        operation: i64,
    ) -> Result<Value> {
        let body = TagEditBody {
            urls,
            media_ids,
            tags,
            operation,
        };
        let request = self.client.post(self.build_url("/tags")).json(&body);
        self.send(request).await
    }

    pub async fn delete_media(&self, urls: &[String]) -> Result<Value> {
        let request = self
            .client
            .delete(self.build_url("/media"))
            .json(&DeleteBody { urls });
        self.send(request).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow::anyhow!(
            "API request failed with status {}: {}",
            status,
            error_text
        ));
    }

    response
        .json()
        .await
        .context("Failed to parse response as JSON")
}

/// Split a `tag=count` argument. A bare `tag` keeps an empty count.
pub fn parse_search_arg(arg: &str) -> Result<(String, String)> {
    let (tag, count) = match arg.split_once('=') {
        Some((tag, count)) => (tag.trim(), count.trim()),
        None => (arg.trim(), ""),
    };
    if tag.is_empty() {
        anyhow::bail!("Missing tag name in '{}'", arg);
    }
    Ok((tag.to_string(), count.to_string()))
}

/// Accept a `tag,count` token only if the server would accept it too.
pub fn parse_edit_tag(arg: &str) -> Result<String> {
    parse_tag_token(arg)
        .map(|token| format!("{},{}", token.tag, token.count))
        .with_context(|| format!("Invalid tag '{}', expected name,count", arg))
}

/// Initialize tracing for the CLI.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
