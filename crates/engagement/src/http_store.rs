use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use shared::{
    error::{ApiError, ApiException, ErrorCode},
    protocol::{DocumentKeysResponse, DocumentUpdate, UpdateOutcome, UpdateResponse},
};
use url::Url;

use crate::store::DocumentStore;

/// [`DocumentStore`] speaking to the engagement server over HTTP.
pub struct HttpDocumentStore {
    http: Client,
    server_url: Url,
}

impl HttpDocumentStore {
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self> {
        let server_url = Url::parse(server_url)
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        if server_url.cannot_be_a_base() {
            return Err(anyhow!("server url '{server_url}' cannot be a base url"));
        }
        Ok(Self { http, server_url })
    }

    fn document_url(&self, collection: &str, key: &str) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["collections", collection, "documents", key]);
        }
        url
    }

    fn collection_url(&self, collection: &str) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["collections", collection, "documents"]);
        }
        url
    }

    pub async fn list_keys(&self, collection: &str) -> Result<Vec<String>> {
        let response = self.http.get(self.collection_url(collection)).send().await?;
        if !response.status().is_success() {
            return Err(api_failure(response).await);
        }
        let body: DocumentKeysResponse = response.json().await?;
        Ok(body.keys)
    }
}

async fn api_failure(response: Response) -> anyhow::Error {
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(api_error) => anyhow::Error::new(ApiException::from(api_error))
            .context(format!("document server answered {status}")),
        Err(_) => anyhow!("document server answered {status}"),
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let response = self
            .http
            .get(self.document_url(collection, key))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            let failure = api_failure(response).await;
            let not_found = failure
                .downcast_ref::<ApiException>()
                .is_some_and(|e| e.code == ErrorCode::NotFound);
            return if not_found { Ok(None) } else { Err(failure) };
        }
        if !response.status().is_success() {
            return Err(api_failure(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn set(&self, collection: &str, key: &str, body: Value) -> Result<()> {
        let response = self
            .http
            .put(self.document_url(collection, key))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_failure(response).await);
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        update: &DocumentUpdate,
    ) -> Result<UpdateOutcome> {
        let response = self
            .http
            .patch(self.document_url(collection, key))
            .json(update)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_failure(response).await);
        }
        let body: UpdateResponse = response.json().await?;
        Ok(body.outcome)
    }
}

#[cfg(test)]
#[path = "tests/http_store_tests.rs"]
mod tests;
