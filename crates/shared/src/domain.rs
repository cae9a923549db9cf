use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! key_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

key_newtype!(PostKey);
key_newtype!(VisitorId);

/// Vote held by the current visitor on one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    #[default]
    None,
    Liked,
    Unliked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteAction {
    Like,
    Unlike,
}

/// Store mutation implied by a vote transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEffect {
    SetLike,
    SetUnlike,
    ClearLike,
    ClearUnlike,
}

impl VoteStatus {
    pub fn apply(self, action: VoteAction) -> (VoteStatus, StoreEffect) {
        match (self, action) {
            (VoteStatus::Liked, VoteAction::Like) => (VoteStatus::None, StoreEffect::ClearLike),
            (VoteStatus::Unliked, VoteAction::Unlike) => {
                (VoteStatus::None, StoreEffect::ClearUnlike)
            }
            (_, VoteAction::Like) => (VoteStatus::Liked, StoreEffect::SetLike),
            (_, VoteAction::Unlike) => (VoteStatus::Unliked, StoreEffect::SetUnlike),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn collection_name(self) -> &'static str {
        match self {
            Environment::Development => "posts-dev",
            Environment::Production => "posts-prod",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}
