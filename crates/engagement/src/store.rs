use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{Environment, PostKey, StoreEffect, VisitorId},
    protocol::{
        DocumentUpdate, EngagementRecord, FieldOp, Precondition, UpdateOutcome, LIKED_BY_FIELD,
        READ_COUNT_FIELD, UNLIKED_BY_FIELD, VISITED_BY_FIELD,
    },
};
use storage::Storage;
use tracing::warn;

use crate::error::EngagementError;

/// Get / set / atomic-update interface of the backing document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;
    async fn set(&self, collection: &str, key: &str, body: Value) -> Result<()>;
    async fn update(
        &self,
        collection: &str,
        key: &str,
        update: &DocumentUpdate,
    ) -> Result<UpdateOutcome>;
}

#[async_trait]
impl DocumentStore for Storage {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.get_document(collection, key).await
    }

    async fn set(&self, collection: &str, key: &str, body: Value) -> Result<()> {
        self.set_document(collection, key, &body).await
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        update: &DocumentUpdate,
    ) -> Result<UpdateOutcome> {
        self.update_document(collection, key, update).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub collection: String,
}

impl StoreConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    pub fn for_environment(environment: Environment) -> Self {
        Self::new(environment.collection_name())
    }
}

/// Reads and mutates engagement records in one collection.
#[derive(Clone)]
pub struct EngagementStore {
    backend: Arc<dyn DocumentStore>,
    config: StoreConfig,
}

impl EngagementStore {
    pub fn new(backend: Arc<dyn DocumentStore>, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Absent and undecodable records both come back as `Ok(None)`.
    pub async fn fetch(&self, post_key: &PostKey) -> Result<Option<EngagementRecord>, EngagementError> {
        let document = self
            .backend
            .get(self.collection(), post_key.as_str())
            .await
            .map_err(|err| EngagementError::read(post_key, err))?;
        let Some(document) = document else {
            return Ok(None);
        };

        match EngagementRecord::from_document(&document) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                warn!(
                    post_key = %post_key,
                    collection = self.collection(),
                    %error,
                    "engagement: stored record is malformed; treating as absent"
                );
                Ok(None)
            }
        }
    }

    /// Writes a first-view record. Callers check for absence first; a
    /// concurrent initialize resolves last-write-wins on the whole document.
    pub async fn initialize(
        &self,
        post_key: &PostKey,
        viewer: &VisitorId,
    ) -> Result<EngagementRecord, EngagementError> {
        let record = EngagementRecord::first_view(viewer);
        self.backend
            .set(self.collection(), post_key.as_str(), record.to_document())
            .await
            .map_err(|err| EngagementError::write(post_key, err))?;
        Ok(record)
    }

    /// Unconditional increment plus visitor union. The caller must have
    /// checked `visitedBy` first; see [`Self::record_view_once`].
    pub async fn record_view(
        &self,
        post_key: &PostKey,
        viewer: &VisitorId,
    ) -> Result<(), EngagementError> {
        self.mutate(post_key, view_update(viewer)).await.map(|_| ())
    }

    /// Counts the view only if `viewer` is not yet in `visitedBy`, checked by
    /// the store in the same atomic step. Returns whether the view counted.
    pub async fn record_view_once(
        &self,
        post_key: &PostKey,
        viewer: &VisitorId,
    ) -> Result<bool, EngagementError> {
        let update = view_update(viewer).when(Precondition::ArrayExcludes {
            field: VISITED_BY_FIELD.to_string(),
            value: Value::from(viewer.as_str()),
        });
        let outcome = self.mutate(post_key, update).await?;
        Ok(outcome == UpdateOutcome::Applied)
    }

    pub async fn set_like(&self, post_key: &PostKey, viewer: &VisitorId) -> Result<(), EngagementError> {
        self.apply_effect(post_key, viewer, StoreEffect::SetLike).await
    }

    pub async fn set_unlike(&self, post_key: &PostKey, viewer: &VisitorId) -> Result<(), EngagementError> {
        self.apply_effect(post_key, viewer, StoreEffect::SetUnlike).await
    }

    pub async fn clear_like(&self, post_key: &PostKey, viewer: &VisitorId) -> Result<(), EngagementError> {
        self.apply_effect(post_key, viewer, StoreEffect::ClearLike).await
    }

    pub async fn clear_unlike(
        &self,
        post_key: &PostKey,
        viewer: &VisitorId,
    ) -> Result<(), EngagementError> {
        self.apply_effect(post_key, viewer, StoreEffect::ClearUnlike).await
    }

    pub async fn apply_effect(
        &self,
        post_key: &PostKey,
        viewer: &VisitorId,
        effect: StoreEffect,
    ) -> Result<(), EngagementError> {
        let member = viewer.as_str();
        let ops = match effect {
            StoreEffect::SetLike => vec![
                FieldOp::array_union(LIKED_BY_FIELD, member),
                FieldOp::array_remove(UNLIKED_BY_FIELD, member),
            ],
            StoreEffect::SetUnlike => vec![
                FieldOp::array_union(UNLIKED_BY_FIELD, member),
                FieldOp::array_remove(LIKED_BY_FIELD, member),
            ],
            StoreEffect::ClearLike => vec![FieldOp::array_remove(LIKED_BY_FIELD, member)],
            StoreEffect::ClearUnlike => vec![FieldOp::array_remove(UNLIKED_BY_FIELD, member)],
        };
        self.mutate(post_key, DocumentUpdate::new(ops))
            .await
            .map(|_| ())
    }

    async fn mutate(
        &self,
        post_key: &PostKey,
        update: DocumentUpdate,
    ) -> Result<UpdateOutcome, EngagementError> {
        let outcome = self
            .backend
            .update(self.collection(), post_key.as_str(), &update)
            .await
            .map_err(|err| EngagementError::write(post_key, err))?;
        if outcome == UpdateOutcome::Missing {
            return Err(EngagementError::write(post_key, "record does not exist"));
        }
        Ok(outcome)
    }
}

fn view_update(viewer: &VisitorId) -> DocumentUpdate {
    DocumentUpdate::new(vec![
        FieldOp::increment(READ_COUNT_FIELD, 1),
        FieldOp::array_union(VISITED_BY_FIELD, viewer.as_str()),
    ])
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
