use super::payload;
use super::rate_limit::RateLimiter;
use crate::blocks::Block;
use crate::config::{NotionConfig, SyncConfig};
use crate::store::{PageProperties, RemoteId, RemoteStore};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Block types that are pages in their own right and survive a content clear.
const PRESERVED_BLOCK_TYPES: &[&str] = &["child_page", "child_database"];

/// Notion REST client implementing [`RemoteStore`].
///
/// Every request waits on the shared [`RateLimiter`]. Rate limits, server
/// errors and conflicts are retried with backoff; authentication and
/// validation failures are returned immediately.
///
/// Database entries are found through the `URL` property. Nested pages have
/// no properties besides their title, so each one starts with a
/// [`payload::source_marker`] bookmark and is found by reading it back.
pub struct NotionClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
    notion_version: String,
    parent_page_id: Option<String>,
    fallback_parent_title: String,
    limiter: RateLimiter,
    max_retries: u32,
    base_backoff: Duration,
    /// Source URL of nested pages already read or created, by page id.
    sources: Mutex<HashMap<String, Option<String>>>,
}

impl NotionClient {
    /// Build a client from configuration.
    ///
    /// Fails with [`Error::Config`] when no token is configured.
    pub fn new(notion: &NotionConfig, sync: &SyncConfig) -> Result<Self> {
        let token = notion
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "missing Notion token: set NOTION_TOKEN or notion.token in the config file"
                        .into(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(notion.timeout_secs))
            .user_agent(concat!("pagesync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: notion.api_base.trim_end_matches('/').to_string(),
            token,
            notion_version: notion.notion_version.clone(),
            parent_page_id: notion.parent_page_id.clone(),
            fallback_parent_title: notion.fallback_parent_title.clone(),
            limiter: RateLimiter::per_second(sync.requests_per_second),
            max_retries: sync.max_retries,
            base_backoff: Duration::from_millis(sync.base_backoff_ms),
            sources: Mutex::new(HashMap::new()),
        })
    }

    fn sources(&self) -> Result<MutexGuard<'_, HashMap<String, Option<String>>>> {
        self.sources
            .lock()
            .map_err(|_| Error::Other("source cache lock poisoned".into()))
    }

    fn remember_source(&self, page: &str, url: Option<String>) -> Result<()> {
        self.sources()?.insert(normalize_id(page), url);
        Ok(())
    }

    /// Source URL recorded on a nested page, read from its first block.
    async fn source_of(&self, page: &str) -> Result<Option<String>> {
        let cached = self.sources()?.get(&normalize_id(page)).cloned();
        if let Some(known) = cached {
            return Ok(known);
        }

        let query = [("page_size", "1".to_string())];
        let response = self
            .send_with_query(Method::GET, &format!("blocks/{page}/children"), &query, None)
            .await?;
        let url = response
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(payload::marker_url)
            .map(str::to_string);
        self.remember_source(page, url.clone())?;
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.api_base)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        self.send_with_query(method, path, &[], body).await
    }

    async fn send_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.endpoint(path);
        let mut attempt = 0;

        loop {
            self.limiter.acquire().await;

            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .header("Notion-Version", &self.notion_version);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, path, attempt, "notion request");
            let result = match request.send().await {
                Ok(response) => Self::read_response(response).await,
                Err(err) => Err(Error::Network(err)),
            };

            match result {
                Err(err) if err.is_recoverable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt, &err);
                    warn!(
                        path,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying notion request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                other => return other,
            }
        }
    }

    fn backoff(&self, attempt: u32, err: &Error) -> Duration {
        if let Error::RateLimited {
            retry_after_ms: Some(ms),
        } = err
        {
            return Duration::from_millis(*ms);
        }
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn read_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let retry_after_ms = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000));
        let text = response.text().await?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let code = body
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| text.trim().to_string(), str::to_string);

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
            StatusCode::BAD_REQUEST => Error::Validation(message),
            StatusCode::NOT_FOUND => Error::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { retry_after_ms },
            _ => Error::Remote {
                status: status.as_u16(),
                code,
                message,
            },
        })
    }

    /// Every child block of a block or page, following pagination.
    async fn list_children(&self, id: &RemoteId) -> Result<Vec<Value>> {
        let path = format!("blocks/{id}/children");
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size", "100".to_string())];
            if let Some(cursor) = cursor.take() {
                query.push(("start_cursor", cursor));
            }
            let page = self
                .send_with_query(Method::GET, &path, &query, None)
                .await?;

            if let Some(results) = page.get("results").and_then(Value::as_array) {
                children.extend(results.iter().cloned());
            }
            cursor = page
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            let has_more = page.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            if !has_more || cursor.is_none() {
                return Ok(children);
            }
        }
    }

    async fn search(&self, query: &str, object: &str) -> Result<Vec<Value>> {
        let body = json!({
            "query": query,
            "filter": { "property": "object", "value": object },
            "page_size": 100,
        });
        let response = self.send(Method::POST, "search", Some(&body)).await?;
        Ok(response
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// The page under which site databases live.
    async fn resolve_parent(&self) -> Result<String> {
        if let Some(id) = &self.parent_page_id {
            return Ok(id.clone());
        }

        let wanted = &self.fallback_parent_title;
        let found = self
            .search(wanted, "page")
            .await?
            .into_iter()
            .find(|page| page_title(page).as_deref() == Some(wanted.as_str()))
            .and_then(|page| object_id(&page));

        match found {
            Some(id) => {
                info!(parent = %id, title = %wanted, "using fallback parent page");
                Ok(id)
            },
            None => Err(Error::Config(format!(
                "no destination page: set NOTION_PARENT_PAGE_ID, notion.parent_page_id, \
                 or share a page titled '{wanted}' with the integration"
            ))),
        }
    }
}

#[async_trait]
impl RemoteStore for NotionClient {
    #[instrument(skip(self))]
    async fn ensure_database(&self, title: &str) -> Result<RemoteId> {
        let parent = self.resolve_parent().await?;

        let existing = self
            .search(title, "database")
            .await?
            .into_iter()
            .filter(|db| payload::plain_text(&db["title"]) == title)
            .find(|db| {
                db.pointer("/parent/page_id")
                    .and_then(Value::as_str)
                    .is_none_or(|p| same_id(p, &parent))
            })
            .and_then(|db| object_id(&db));

        if let Some(id) = existing {
            debug!(database = %id, "reusing database");
            return Ok(RemoteId::new(id));
        }

        let body = json!({
            "parent": { "type": "page_id", "page_id": parent },
            "title": payload::rich_text(&crate::blocks::RichText::plain(title)),
            "properties": payload::database_properties(),
        });
        let created = self.send(Method::POST, "databases", Some(&body)).await?;
        let id = object_id(&created)
            .ok_or_else(|| Error::Serialization("database response without id".into()))?;
        info!(database = %id, title, "created database");
        Ok(RemoteId::new(id))
    }

    async fn find_page(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<Option<RemoteId>> {
        match parent {
            None => {
                let body = json!({
                    "filter": {
                        "property": payload::property::URL,
                        "url": { "equals": props.url },
                    },
                    "page_size": 1,
                });
                let response = self
                    .send(Method::POST, &format!("databases/{database}/query"), Some(&body))
                    .await?;
                Ok(response
                    .get("results")
                    .and_then(Value::as_array)
                    .and_then(|results| results.first())
                    .and_then(object_id)
                    .map(RemoteId::new))
            },
            Some(parent) => {
                let mut candidates: Vec<(bool, String)> = self
                    .list_children(parent)
                    .await?
                    .iter()
                    .filter(|block| block["type"] == "child_page")
                    .filter_map(|block| {
                        let title = block.pointer("/child_page/title").and_then(Value::as_str);
                        let id = object_id(block)?;
                        Some((title != Some(props.title.as_str()), id))
                    })
                    .collect();
                // Same-title pages first; renamed pages are still found after them
                candidates.sort_by_key(|(other_title, _)| *other_title);

                for (_, id) in candidates {
                    if self.source_of(&id).await?.as_deref() == Some(props.url.as_str()) {
                        return Ok(Some(RemoteId::new(id)));
                    }
                }
                Ok(None)
            },
        }
    }

    async fn create_page(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<RemoteId> {
        let parent_json = match parent {
            None => json!({ "database_id": database.as_str() }),
            Some(page) => json!({ "page_id": page.as_str() }),
        };
        let mut body = json!({
            "parent": parent_json,
            "properties": payload::page_properties(props, parent.is_some()),
        });
        if parent.is_some() {
            body["children"] = json!([payload::source_marker(&props.url)]);
        }
        let created = self.send(Method::POST, "pages", Some(&body)).await?;
        let id = object_id(&created)
            .ok_or_else(|| Error::Serialization("page response without id".into()))?;
        if parent.is_some() {
            self.remember_source(&id, Some(props.url.clone()))?;
        }
        Ok(RemoteId::new(id))
    }

    async fn update_page(
        &self,
        page: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<()> {
        let body = json!({ "properties": payload::page_properties(props, parent.is_some()) });
        self.send(Method::PATCH, &format!("pages/{page}"), Some(&body))
            .await
            .map(drop)
    }

    async fn clear_content(&self, page: &RemoteId) -> Result<()> {
        let removable: Vec<String> = self
            .list_children(page)
            .await?
            .iter()
            .filter(|block| {
                block["type"]
                    .as_str()
                    .is_some_and(|kind| !PRESERVED_BLOCK_TYPES.contains(&kind))
                    && payload::marker_url(block).is_none()
            })
            .filter_map(object_id)
            .collect();

        debug!(page = %page, blocks = removable.len(), "clearing page content");
        for id in removable {
            self.send(Method::DELETE, &format!("blocks/{id}"), None).await?;
        }
        Ok(())
    }

    async fn append_blocks(&self, page: &RemoteId, blocks: &[Block]) -> Result<()> {
        let body = json!({ "children": payload::children(blocks) });
        self.send(Method::PATCH, &format!("blocks/{page}/children"), Some(&body))
            .await
            .map(drop)
    }
}

fn object_id(value: &Value) -> Option<String> {
    value.get("id").and_then(Value::as_str).map(str::to_string)
}

/// Title of a page object from its `title`-typed property.
fn page_title(page: &Value) -> Option<String> {
    page.get("properties")?
        .as_object()?
        .values()
        .find(|prop| prop["type"] == "title")
        .map(|prop| payload::plain_text(&prop["title"]))
}

fn normalize_id(id: &str) -> String {
    id.replace('-', "").to_ascii_lowercase()
}

/// Compare Notion ids ignoring dashes and case.
fn same_id(a: &str, b: &str) -> bool {
    normalize_id(a) == normalize_id(b)
}
