//! Webflow-v2-shaped CMS client.
//!
//! Collection reads and writes go through `/collections/{id}` with
//! bearer auth; item payloads travel inside a `fieldData` wrapper.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::CmsConfig;
use crate::domain::FieldSet;
use crate::error::StageError;

use super::{CmsApi, CmsItem, Schema};

const LIST_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ItemEnvelope {
    id: String,

    #[serde(rename = "fieldData")]
    field_data: FieldSet,
}

#[derive(Debug, Deserialize)]
struct ItemListResponse {
    items: Vec<ItemEnvelope>,
}

#[derive(Debug, Serialize)]
struct ItemRequest<'a> {
    #[serde(rename = "fieldData")]
    field_data: &'a FieldSet,
}

impl From<ItemEnvelope> for CmsItem {
    fn from(envelope: ItemEnvelope) -> Self {
        CmsItem {
            id: envelope.id,
            fields: envelope.field_data,
        }
    }
}

pub struct WebflowClient {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
    collection_id: String,
}

impl WebflowClient {
    pub fn new(client: reqwest::Client, config: &CmsConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            collection_id: config.collection_id.clone(),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.api_url, self.collection_id, suffix
        )
    }

    async fn check(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, StageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let mut error = StageError::from_response_status(status, context);
        if let StageError::PublishTransport(ref mut message) = error {
            let snippet: String = body.chars().take(200).collect();
            if !snippet.is_empty() {
                message.push_str(": ");
                message.push_str(&snippet);
            }
        }
        Err(error)
    }
}

#[async_trait]
impl CmsApi for WebflowClient {
    async fn fetch_schema(&self) -> Result<Schema, StageError> {
        let response = self
            .client
            .get(self.collection_url(""))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| StageError::PublishTransport(format!("schema fetch failed: {e}")))?;

        let response = Self::check(response, "schema fetch").await?;
        response
            .json()
            .await
            .map_err(|e| StageError::PublishTransport(format!("schema response malformed: {e}")))
    }

    async fn list_items(&self) -> Result<Vec<CmsItem>, StageError> {
        let mut items = Vec::new();
        let mut offset = 0u32;

        loop {
            let response = self
                .client
                .get(self.collection_url("/items"))
                .bearer_auth(&self.api_token)
                .query(&[("limit", LIST_PAGE_SIZE), ("offset", offset)])
                .send()
                .await
                .map_err(|e| StageError::PublishTransport(format!("item list failed: {e}")))?;

            let response = Self::check(response, "item list").await?;
            let page: ItemListResponse = response.json().await.map_err(|e| {
                StageError::PublishTransport(format!("item list response malformed: {e}"))
            })?;

            let page_len = page.items.len() as u32;
            items.extend(page.items.into_iter().map(CmsItem::from));

            if page_len < LIST_PAGE_SIZE {
                return Ok(items);
            }
            offset += page_len;
        }
    }

    async fn create_item(&self, fields: &FieldSet) -> Result<CmsItem, StageError> {
        let response = self
            .client
            .post(self.collection_url("/items"))
            .bearer_auth(&self.api_token)
            .json(&ItemRequest { field_data: fields })
            .send()
            .await
            .map_err(|e| StageError::PublishTransport(format!("item create failed: {e}")))?;

        let response = Self::check(response, "item create").await?;
        let envelope: ItemEnvelope = response.json().await.map_err(|e| {
            StageError::PublishTransport(format!("item create response malformed: {e}"))
        })?;
        Ok(envelope.into())
    }

    async fn update_item(&self, id: &str, fields: &FieldSet) -> Result<CmsItem, StageError> {
        let response = self
            .client
            .patch(self.collection_url(&format!("/items/{id}")))
            .bearer_auth(&self.api_token)
            .json(&json!({ "fieldData": fields }))
            .send()
            .await
            .map_err(|e| StageError::PublishTransport(format!("item update failed: {e}")))?;

        let response = Self::check(response, "item update").await?;
        let envelope: ItemEnvelope = response.json().await.map_err(|e| {
            StageError::PublishTransport(format!("item update response malformed: {e}"))
        })?;
        Ok(envelope.into())
    }
}
