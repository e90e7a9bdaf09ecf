use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ContextKey, Item, ItemId, Lane},
    error::ApiError,
    protocol::{CreateItemRequest, ItemPatch, ListItemsQuery, NewItem, PositionUpdate},
};
use thiserror::Error;
use url::Url;

use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("backend rejected request: {0}")]
    Api(ApiError),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid backend response: {0}")]
    Decode(String),
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

fn request_error(err: reqwest::Error) -> StoreError {
    if err.is_decode() {
        StoreError::Decode(err.to_string())
    } else {
        StoreError::Transport(err.to_string())
    }
}

/// Authoritative remote copy of the board.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list(&self, context: &ContextKey) -> Result<Vec<Item>, StoreError>;
    async fn update_position(
        &self,
        item_id: &ItemId,
        lane: Lane,
        index: usize,
    ) -> Result<(), StoreError>;
    async fn create(&self, context: &ContextKey, item: &NewItem) -> Result<Item, StoreError>;
    async fn update(&self, item_id: &ItemId, patch: &ItemPatch) -> Result<Item, StoreError>;
    async fn delete(&self, item_id: &ItemId) -> Result<(), StoreError>;
}

pub struct MissingItemStore;

#[async_trait]
impl ItemStore for MissingItemStore {
    async fn list(&self, context: &ContextKey) -> Result<Vec<Item>, StoreError> {
        Err(StoreError::Transport(format!(
            "item store unavailable for context {context}"
        )))
    }

    async fn update_position(
        &self,
        item_id: &ItemId,
        _lane: Lane,
        _index: usize,
    ) -> Result<(), StoreError> {
        Err(StoreError::Transport(format!(
            "item store unavailable for item {item_id}"
        )))
    }

    async fn create(&self, context: &ContextKey, _item: &NewItem) -> Result<Item, StoreError> {
        Err(StoreError::Transport(format!(
            "item store unavailable for context {context}"
        )))
    }

    async fn update(&self, item_id: &ItemId, _patch: &ItemPatch) -> Result<Item, StoreError> {
        Err(StoreError::Transport(format!(
            "item store unavailable for item {item_id}"
        )))
    }

    async fn delete(&self, item_id: &ItemId) -> Result<(), StoreError> {
        Err(StoreError::Transport(format!(
            "item store unavailable for item {item_id}"
        )))
    }
}

/// REST implementation of [`ItemStore`].
pub struct HttpItemStore {
    http: Client,
    base_url: Url,
}

impl HttpItemStore {
    pub fn new(server_url: &str) -> Result<Self, StoreError> {
        Self::with_client(server_url, Client::new())
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(request_error)?;
        Self::with_client(&settings.server_url, http)
    }

    pub fn with_client(server_url: &str, http: Client) -> Result<Self, StoreError> {
        let base_url = Url::parse(server_url.trim()).map_err(|e| StoreError::InvalidUrl {
            url: server_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl {
                url: server_url.to_string(),
                reason: "url cannot be used as a base".to_string(),
            });
        }
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "url cannot be used as a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.map_err(request_error)?;
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(StoreError::Api(api_error)),
        Err(_) => Err(StoreError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(request_error)
}

#[async_trait]
impl ItemStore for HttpItemStore {
    async fn list(&self, context: &ContextKey) -> Result<Vec<Item>, StoreError> {
        let response = self
            .http
            .get(self.endpoint(&["items"])?)
            .query(&ListItemsQuery {
                context: context.clone(),
            })
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    async fn update_position(
        &self,
        item_id: &ItemId,
        lane: Lane,
        index: usize,
    ) -> Result<(), StoreError> {
        let response = self
            .http
            .put(self.endpoint(&["items", item_id.as_str(), "position"])?)
            .json(&PositionUpdate { lane, index })
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn create(&self, context: &ContextKey, item: &NewItem) -> Result<Item, StoreError> {
        let response = self
            .http
            .post(self.endpoint(&["items"])?)
            .json(&CreateItemRequest {
                context: context.clone(),
                item: item.clone(),
            })
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    async fn update(&self, item_id: &ItemId, patch: &ItemPatch) -> Result<Item, StoreError> {
        let response = self
            .http
            .patch(self.endpoint(&["items", item_id.as_str()])?)
            .json(patch)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    async fn delete(&self, item_id: &ItemId) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(self.endpoint(&["items", item_id.as_str()])?)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
