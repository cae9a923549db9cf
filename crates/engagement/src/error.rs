use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngagementError {
    #[error("visitor identity unavailable: {0}")]
    IdentityUnavailable(String),
    #[error("failed to read engagement record for post {post_key}: {reason}")]
    StoreReadFailure { post_key: String, reason: String },
    #[error("failed to write engagement record for post {post_key}: {reason}")]
    StoreWriteFailure { post_key: String, reason: String },
}

impl EngagementError {
    pub(crate) fn read(post_key: &impl ToString, err: impl std::fmt::Display) -> Self {
        Self::StoreReadFailure {
            post_key: post_key.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn write(post_key: &impl ToString, err: impl std::fmt::Display) -> Self {
        Self::StoreWriteFailure {
            post_key: post_key.to_string(),
            reason: format!("{err:#}"),
        }
    }
}
