use std::net::{IpAddr, SocketAddr};

use serde_json::Value;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{DocumentUpdate, UpdateOutcome},
};
use storage::{RejectedUpdate, Storage};
use tracing::{debug, warn};

const MAX_NAME_LEN: usize = 128;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Collection names: 1..=128 of `[A-Za-z0-9_.-]`.
pub fn validate_collection(collection: &str) -> Result<(), ApiError> {
    check_length("collection", collection)?;
    if !collection
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("collection '{collection}' contains characters outside [A-Za-z0-9_.-]"),
        ));
    }
    Ok(())
}

/// Document keys are post keys: any non-empty string up to 128 characters.
pub fn validate_key(key: &str) -> Result<(), ApiError> {
    check_length("document key", key)
}

fn check_length(kind: &str, value: &str) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{kind} must be 1 to {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(())
}

pub async fn get_document(ctx: &ApiContext, collection: &str, key: &str) -> Result<Value, ApiError> {
    validate_collection(collection)?;
    validate_key(key)?;
    ctx.storage
        .get_document(collection, key)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!("document {collection}/{key} not found"),
            )
        })
}

pub async fn put_document(
    ctx: &ApiContext,
    collection: &str,
    key: &str,
    body: &Value,
) -> Result<(), ApiError> {
    validate_collection(collection)?;
    validate_key(key)?;
    if !body.is_object() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "document body must be a JSON object",
        ));
    }
    ctx.storage
        .set_document(collection, key, body)
        .await
        .map_err(internal)
}

pub async fn update_document(
    ctx: &ApiContext,
    collection: &str,
    key: &str,
    update: &DocumentUpdate,
) -> Result<UpdateOutcome, ApiError> {
    validate_collection(collection)?;
    validate_key(key)?;
    if update.ops.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "update must carry at least one operation",
        ));
    }
    if update.ops.iter().any(|op| op.field().is_empty()) {
        return Err(ApiError::new(ErrorCode::Validation, "field names cannot be empty"));
    }

    let outcome = ctx
        .storage
        .update_document(collection, key, update)
        .await
        .map_err(|err| {
            if err.downcast_ref::<RejectedUpdate>().is_some() {
                warn!(%collection, %key, error = %format!("{err:#}"), "update rejected");
                ApiError::new(ErrorCode::Validation, format!("{err:#}"))
            } else {
                internal(err)
            }
        })?;
    debug!(%collection, %key, ?outcome, "document update");
    Ok(outcome)
}

pub async fn list_document_keys(ctx: &ApiContext, collection: &str) -> Result<Vec<String>, ApiError> {
    validate_collection(collection)?;
    ctx.storage
        .list_document_keys(collection)
        .await
        .map_err(internal)
}

/// The peer address, or the first `X-Forwarded-For` entry when the server
/// sits behind a trusted proxy and that entry parses as an address.
pub fn client_address(
    forwarded_for: Option<&str>,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    forwarded_for
        .filter(|_| trust_forwarded_for)
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
