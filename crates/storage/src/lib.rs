use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::sync::Mutex;

use shared::protocol::{DocumentUpdate, UpdateOutcome};

mod ops;

pub use ops::apply_update;

/// SQLite-backed document store.
///
/// Documents are JSON objects addressed by `(collection, key)`. Writers go
/// through a single async gate and every update runs in one transaction, so
/// field ops and preconditions are atomic per document.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    write_gate: Arc<Mutex<()>>,
}

/// An update whose ops do not fit the stored document, such as an increment
/// on a string field. Nothing was written.
#[derive(Debug, Error)]
#[error("rejected update on document {collection}/{key}: {reason}")]
pub struct RejectedUpdate {
    pub collection: String,
    pub key: String,
    pub reason: String,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND doc_key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read document {collection}/{key}"))?;

        row.map(|r| -> Result<Value> {
            let raw: String = r.get(0);
            serde_json::from_str(&raw)
                .with_context(|| format!("document {collection}/{key} holds invalid JSON"))
        })
        .transpose()
    }

    /// Replaces the whole document, creating it when absent.
    pub async fn set_document(&self, collection: &str, key: &str, body: &Value) -> Result<()> {
        if !body.is_object() {
            return Err(anyhow!("document {collection}/{key} must be a JSON object"));
        }
        let raw = serde_json::to_string(body)?;

        let _gate = self.write_gate.lock().await;
        sqlx::query(
            "INSERT INTO documents (collection, doc_key, body) VALUES (?, ?, ?)
             ON CONFLICT(collection, doc_key) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(collection)
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write document {collection}/{key}"))?;
        Ok(())
    }

    pub async fn update_document(
        &self,
        collection: &str,
        key: &str,
        update: &DocumentUpdate,
    ) -> Result<UpdateOutcome> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND doc_key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("failed to read document {collection}/{key}"))?;
        let Some(row) = row else {
            return Ok(UpdateOutcome::Missing);
        };

        let raw: String = row.get(0);
        let mut body: Value = serde_json::from_str(&raw)
            .with_context(|| format!("document {collection}/{key} holds invalid JSON"))?;
        let outcome = apply_update(&mut body, update).map_err(|err| RejectedUpdate {
            collection: collection.to_string(),
            key: key.to_string(),
            reason: format!("{err:#}"),
        })?;
        if outcome != UpdateOutcome::Applied {
            return Ok(outcome);
        }

        sqlx::query(
            "UPDATE documents SET body = ?, updated_at = CURRENT_TIMESTAMP
             WHERE collection = ? AND doc_key = ?",
        )
        .bind(serde_json::to_string(&body)?)
        .bind(collection)
        .bind(key)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to write document {collection}/{key}"))?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn list_document_keys(&self, collection: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT doc_key FROM documents WHERE collection = ? ORDER BY doc_key")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to list collection {collection}"))?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
