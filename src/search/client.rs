use super::bulk::{BulkAction, BulkResponse, encode_ndjson};
use super::sink::{DocumentSink, ScrollPage};
use crate::config::SinkConfig;
use crate::error::IndexError;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const SCROLL_KEEP_ALIVE: &str = "1m";

/// HTTP client for an Elasticsearch/OpenSearch compatible engine.
#[derive(Clone)]
pub struct ElasticsearchClient {
    http: Client,
    base_url: String,
    user: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
}

impl ElasticsearchClient {
    pub fn new(config: &SinkConfig) -> Result<Self, IndexError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("search-indexer/0.1")
            .build()
            .map_err(IndexError::SinkHttp)?;

        Ok(Self {
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url_for(path);
        let builder = self.http.request(method, url);
        self.apply_auth(builder)
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(ref key) = self.api_key {
            request.header("Authorization", format!("ApiKey {}", key))
        } else if let Some(ref user) = self.user {
            request.basic_auth(user, self.password.as_deref())
        } else {
            request
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IndexError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        Err(IndexError::sink_status(status, body))
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
    ) -> Result<reqwest::Response, IndexError> {
        let response = self
            .request(method, path)
            .json(payload)
            .send()
            .await
            .map_err(IndexError::SinkHttp)?;

        Self::check(response).await
    }

    /// Whether the engine answers at all; used by the entry point before work starts.
    pub async fn ping(&self) -> Result<(), IndexError> {
        let response = self
            .request(Method::GET, "/")
            .send()
            .await
            .map_err(IndexError::SinkHttp)?;
        Self::check(response).await.map(|_| ())
    }
}

impl DocumentSink for ElasticsearchClient {
    async fn bulk(&self, index: &str, actions: &[BulkAction]) -> Result<BulkResponse, IndexError> {
        if actions.is_empty() {
            return Ok(BulkResponse::default());
        }

        let body = encode_ndjson(actions)?;
        debug!(
            "bulk {}: sending {} actions ({} bytes)",
            index,
            actions.len(),
            body.len()
        );

        let response = self
            .request(Method::POST, &format!("/{}/_bulk", index))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(IndexError::SinkHttp)?;

        let response = Self::check(response).await?;
        let bytes = response.bytes().await.map_err(IndexError::SinkHttp)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn refresh_interval(&self, index: &str) -> Result<Option<String>, IndexError> {
        let response = self
            .request(
                Method::GET,
                &format!("/{}/_settings/index.refresh_interval", index),
            )
            .send()
            .await
            .map_err(IndexError::SinkHttp)?;

        let response = Self::check(response).await?;
        let payload: Value = response.json().await.map_err(IndexError::SinkHttp)?;
        Ok(extract_refresh_interval(&payload))
    }

    async fn put_refresh_interval(&self, index: &str, value: Option<&str>) -> Result<(), IndexError> {
        let payload = json!({ "index": { "refresh_interval": value } });
        debug!("put_settings {}: refresh_interval={:?}", index, value);
        self.send_json(Method::PUT, &format!("/{}/_settings", index), &payload)
            .await?;
        Ok(())
    }

    async fn open_scroll(&self, index: &str, batch_size: usize) -> Result<ScrollPage, IndexError> {
        let payload = json!({
            "size": batch_size,
            "_source": false,
            "sort": ["_doc"],
        });

        let response = self
            .send_json(
                Method::POST,
                &format!("/{}/_search?scroll={}", index, SCROLL_KEEP_ALIVE),
                &payload,
            )
            .await?;

        let page: ScrollResponse = response.json().await.map_err(IndexError::SinkHttp)?;
        Ok(page.into_page())
    }

    async fn continue_scroll(&self, scroll_id: &str) -> Result<ScrollPage, IndexError> {
        let payload = json!({
            "scroll": SCROLL_KEEP_ALIVE,
            "scroll_id": scroll_id,
        });

        let response = self
            .send_json(Method::POST, "/_search/scroll", &payload)
            .await?;

        let page: ScrollResponse = response.json().await.map_err(IndexError::SinkHttp)?;
        Ok(page.into_page())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), IndexError> {
        let payload = json!({ "scroll_id": scroll_id });

        let response = self
            .request(Method::DELETE, "/_search/scroll")
            .json(&payload)
            .send()
            .await
            .map_err(IndexError::SinkHttp)?;

        // An expired context is already gone.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Self::check(response).await.map(|_| ())
    }
}

/// Pull `index.refresh_interval` out of a `_settings` response, which is
/// keyed by the concrete index name (aliases resolve to their target).
fn extract_refresh_interval(payload: &Value) -> Option<String> {
    let settings = payload.as_object()?.values().next()?.get("settings")?;

    let value = settings
        .get("index")
        .and_then(|index| index.get("refresh_interval"))
        .or_else(|| settings.get("index.refresh_interval"))?;

    match value {
        Value::String(interval) => Some(interval.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[derive(Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: ScrollHits,
}

#[derive(Deserialize)]
struct ScrollHits {
    #[serde(default)]
    hits: Vec<ScrollHit>,
}

#[derive(Deserialize)]
struct ScrollHit {
    #[serde(rename = "_id")]
    id: String,
}

impl ScrollResponse {
    fn into_page(self) -> ScrollPage {
        ScrollPage {
            scroll_id: self.scroll_id,
            ids: self.hits.hits.into_iter().map(|hit| hit.id).collect(),
        }
    }
}
