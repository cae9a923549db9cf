use shared::{
    domain::{PostKey, VisitorId, VoteAction, VoteStatus},
    protocol::EngagementRecord,
};
use tracing::{debug, error, info, warn};

use crate::{error::EngagementError, identity::IdentityResolver, store::EngagementStore};

/// When local vote state changes relative to the store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconciliationPolicy {
    /// Update local state first; a failed write is logged, not rolled back.
    #[default]
    Optimistic,
    /// Update local state only after the write succeeds.
    ConfirmThenCommit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngagementCounts {
    pub reads: u64,
    pub likes: u64,
    pub unlikes: u64,
}

impl EngagementCounts {
    fn from_record(record: &EngagementRecord) -> Self {
        Self {
            reads: record.read_count,
            likes: record.like_count(),
            unlikes: record.unlike_count(),
        }
    }

    fn shift_vote(&mut self, from: VoteStatus, to: VoteStatus) {
        match from {
            VoteStatus::Liked => self.likes = self.likes.saturating_sub(1),
            VoteStatus::Unliked => self.unlikes = self.unlikes.saturating_sub(1),
            VoteStatus::None => {}
        }
        match to {
            VoteStatus::Liked => self.likes += 1,
            VoteStatus::Unliked => self.unlikes += 1,
            VoteStatus::None => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngagementState {
    pub post_key: Option<PostKey>,
    pub visitor: Option<VisitorId>,
    pub vote: VoteStatus,
    pub counts: EngagementCounts,
    pub actions_enabled: bool,
}

/// What the widget renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementView {
    pub reads: u64,
    pub likes: u64,
    pub unlikes: u64,
    pub like_active: bool,
    pub unlike_active: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Actions are disabled; nothing was sent and nothing changed.
    Inert,
    Committed(VoteStatus),
    /// The store write failed. `vote` is the local state left in place.
    Failed {
        error: EngagementError,
        vote: VoteStatus,
    },
}

/// Drives view counting and like/unlike voting for one mounted post.
///
/// Clicks take `&mut self`, so a controller handles them one at a time.
pub struct EngagementController {
    identity: IdentityResolver,
    store: EngagementStore,
    policy: ReconciliationPolicy,
    state: EngagementState,
}

impl EngagementController {
    pub fn new(identity: IdentityResolver, store: EngagementStore) -> Self {
        Self {
            identity,
            store,
            policy: ReconciliationPolicy::default(),
            state: EngagementState::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconciliationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &EngagementState {
        &self.state
    }

    pub fn view(&self) -> EngagementView {
        EngagementView {
            reads: self.state.counts.reads,
            likes: self.state.counts.likes,
            unlikes: self.state.counts.unlikes,
            like_active: self.state.vote == VoteStatus::Liked,
            unlike_active: self.state.vote == VoteStatus::Unliked,
            enabled: self.state.actions_enabled,
        }
    }

    /// Loads `post_key` from scratch, counting a view when `countable`.
    ///
    /// Failures are logged and degrade the widget; they never surface here.
    pub async fn mount(&mut self, post_key: PostKey, countable: bool) -> &EngagementState {
        self.state = EngagementState {
            post_key: Some(post_key.clone()),
            ..EngagementState::default()
        };

        let visitor = match self.identity.resolve().await {
            Ok(visitor) => Some(visitor),
            Err(error) => {
                warn!(
                    post_key = %post_key,
                    %error,
                    "engagement: visitor identity unavailable; actions disabled"
                );
                None
            }
        };

        let record = match self.store.fetch(&post_key).await {
            Ok(record) => record,
            Err(error) => {
                error!(
                    post_key = %post_key,
                    collection = self.store.collection(),
                    %error,
                    "engagement: failed to load record; showing empty counts"
                );
                self.state.actions_enabled = visitor.is_some();
                self.state.visitor = visitor;
                return &self.state;
            }
        };

        let Some(visitor) = visitor else {
            if let Some(record) = &record {
                self.state.counts = EngagementCounts::from_record(record);
            }
            return &self.state;
        };

        match record {
            None if countable => match self.store.initialize(&post_key, &visitor).await {
                Ok(created) => {
                    self.state.counts = EngagementCounts::from_record(&created);
                    info!(post_key = %post_key, "engagement: created record on first view");
                }
                Err(error) => {
                    error!(post_key = %post_key, %error, "engagement: failed to create record");
                }
            },
            None => {}
            Some(record) => {
                self.state.counts = EngagementCounts::from_record(&record);
                self.state.vote = record.vote_of(&visitor);
                if countable && !record.has_visited(&visitor) {
                    match self.store.record_view_once(&post_key, &visitor).await {
                        Ok(true) => self.state.counts.reads += 1,
                        Ok(false) => debug!(
                            post_key = %post_key,
                            "engagement: view already counted by another session"
                        ),
                        Err(error) => {
                            error!(post_key = %post_key, %error, "engagement: failed to record view");
                        }
                    }
                }
            }
        }

        self.state.visitor = Some(visitor);
        self.state.actions_enabled = true;
        &self.state
    }

    pub async fn like(&mut self) -> ToggleOutcome {
        self.toggle(VoteAction::Like).await
    }

    pub async fn unlike(&mut self) -> ToggleOutcome {
        self.toggle(VoteAction::Unlike).await
    }

    async fn toggle(&mut self, action: VoteAction) -> ToggleOutcome {
        let (Some(post_key), Some(visitor)) =
            (self.state.post_key.clone(), self.state.visitor.clone())
        else {
            debug!(?action, "engagement: ignoring click without a resolved visitor");
            return ToggleOutcome::Inert;
        };
        if !self.state.actions_enabled {
            return ToggleOutcome::Inert;
        }

        let previous = self.state.vote;
        let (next, effect) = previous.apply(action);
        if self.policy == ReconciliationPolicy::Optimistic {
            self.commit_vote(previous, next);
        }

        match self.store.apply_effect(&post_key, &visitor, effect).await {
            Ok(()) => {
                if self.policy == ReconciliationPolicy::ConfirmThenCommit {
                    self.commit_vote(previous, next);
                }
                debug!(post_key = %post_key, ?effect, vote = ?next, "engagement: vote stored");
                ToggleOutcome::Committed(next)
            }
            Err(error) => {
                error!(
                    post_key = %post_key,
                    ?effect,
                    policy = ?self.policy,
                    %error,
                    "engagement: failed to store vote"
                );
                ToggleOutcome::Failed {
                    error,
                    vote: self.state.vote,
                }
            }
        }
    }

    fn commit_vote(&mut self, from: VoteStatus, to: VoteStatus) {
        self.state.counts.shift_vote(from, to);
        self.state.vote = to;
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
