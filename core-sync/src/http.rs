//! REST implementation of [`RemoteCollection`] over reqwest.
//!
//! One instance per entity collection. Routes:
//!
//! - `POST   {base}/users/{owner}/{collection}`          create
//! - `PUT    {base}/{collection}/{id}`                   update
//! - `DELETE {base}/{collection}/{id}`                   delete
//! - `GET    {base}/users/{owner}/{collection}?limit=N`  list recent
//!
//! Bodies are JSON; responses are expected to be the stored record (or an
//! array of records for listings) carrying an `id` field. An unexpected
//! shape surfaces as a remote error, never a panic.

use crate::error::{Result, SyncError};
use crate::remote::{RemoteCollection, RemoteRecord};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

/// reqwest-backed remote collection for one entity type.
pub struct HttpRemoteCollection {
    client: Client,
    base_url: String,
    /// URL path segment for this entity collection (e.g. "daily-entries").
    collection: String,
    bearer_token: Option<String>,
}

impl HttpRemoteCollection {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            collection: collection.into(),
            bearer_token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn owner_url(&self, owner_id: &str) -> String {
        format!("{}/users/{}/{}", self.base_url, owner_id, self.collection)
    }

    fn record_url(&self, server_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.collection, server_id)
    }

    async fn parse_record(response: reqwest::Response) -> Result<RemoteRecord> {
        let value: Value = check_status(response).await?.json().await?;
        record_from_value(value)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(remote_error(status, &body))
}

fn remote_error(status: StatusCode, body: &str) -> SyncError {
    let detail = if body.is_empty() { "<empty body>" } else { body };
    SyncError::Remote(format!("HTTP {status}: {detail}"))
}

fn record_from_value(value: Value) -> Result<RemoteRecord> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // an empty id is passed through; the engine treats it as a failed call
    Ok(RemoteRecord { id, payload: value })
}

#[async_trait]
impl RemoteCollection for HttpRemoteCollection {
    async fn create(&self, owner_id: &str, payload: Value) -> Result<RemoteRecord> {
        let url = self.owner_url(owner_id);
        debug!(%url, collection = %self.collection, "Remote create");

        let response = self
            .authorized(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;
        Self::parse_record(response).await
    }

    async fn update(&self, server_id: &str, payload: Value) -> Result<RemoteRecord> {
        let url = self.record_url(server_id);
        debug!(%url, collection = %self.collection, "Remote update");

        let response = self
            .authorized(self.client.put(&url))
            .json(&payload)
            .send()
            .await?;
        Self::parse_record(response).await
    }

    async fn delete(&self, server_id: &str) -> Result<()> {
        let url = self.record_url(server_id);
        debug!(%url, collection = %self.collection, "Remote delete");

        let response = self.authorized(self.client.delete(&url)).send().await?;
        // deleting an already-deleted record is a success for at-least-once
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    async fn list_recent(&self, owner_id: &str, limit: u32) -> Result<Vec<RemoteRecord>> {
        let url = self.owner_url(owner_id);
        debug!(%url, collection = %self.collection, limit, "Remote list");

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("limit", limit)])
            .send()
            .await?;

        let value: Value = check_status(response).await?.json().await?;
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(SyncError::Remote(format!(
                    "expected a JSON array of records, got: {other}"
                )))
            }
        };

        items.into_iter().map(record_from_value).collect()
    }
}
