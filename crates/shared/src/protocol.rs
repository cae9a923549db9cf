use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{VisitorId, VoteStatus};

pub const READ_COUNT_FIELD: &str = "readCount";
pub const LIKED_BY_FIELD: &str = "likedBy";
pub const UNLIKED_BY_FIELD: &str = "unlikedBy";
pub const VISITED_BY_FIELD: &str = "visitedBy";

/// Per-post engagement document as stored in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementRecord {
    pub read_count: u64,
    pub liked_by: Vec<VisitorId>,
    pub unliked_by: Vec<VisitorId>,
    pub visited_by: Vec<VisitorId>,
}

impl EngagementRecord {
    /// Record written on the first countable view of a post.
    pub fn first_view(viewer: &VisitorId) -> Self {
        Self {
            read_count: 1,
            liked_by: Vec::new(),
            unliked_by: Vec::new(),
            visited_by: vec![viewer.clone()],
        }
    }

    /// Strict decode: every field must be present and well typed.
    /// Repeated set members are collapsed, keeping first occurrence order.
    pub fn from_document(document: &Value) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(document.clone())?;
        dedup_in_order(&mut record.liked_by);
        dedup_in_order(&mut record.unliked_by);
        dedup_in_order(&mut record.visited_by);
        Ok(record)
    }

    pub fn to_document(&self) -> Value {
        serde_json::json!({
            READ_COUNT_FIELD: self.read_count,
            LIKED_BY_FIELD: self.liked_by,
            UNLIKED_BY_FIELD: self.unliked_by,
            VISITED_BY_FIELD: self.visited_by,
        })
    }

    pub fn has_visited(&self, visitor: &VisitorId) -> bool {
        self.visited_by.contains(visitor)
    }

    pub fn vote_of(&self, visitor: &VisitorId) -> VoteStatus {
        if self.liked_by.contains(visitor) {
            VoteStatus::Liked
        } else if self.unliked_by.contains(visitor) {
            VoteStatus::Unliked
        } else {
            VoteStatus::None
        }
    }

    pub fn like_count(&self) -> u64 {
        self.liked_by.len() as u64
    }

    pub fn unlike_count(&self) -> u64 {
        self.unliked_by.len() as u64
    }
}

fn dedup_in_order(members: &mut Vec<VisitorId>) {
    let mut seen = std::collections::HashSet::new();
    members.retain(|member| seen.insert(member.clone()));
}

/// One atomic mutation applied to a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldOp {
    Increment { field: String, by: i64 },
    ArrayUnion { field: String, values: Vec<Value> },
    ArrayRemove { field: String, values: Vec<Value> },
}

impl FieldOp {
    pub fn increment(field: &str, by: i64) -> Self {
        FieldOp::Increment {
            field: field.to_string(),
            by,
        }
    }

    pub fn array_union(field: &str, value: impl Into<Value>) -> Self {
        FieldOp::ArrayUnion {
            field: field.to_string(),
            values: vec![value.into()],
        }
    }

    pub fn array_remove(field: &str, value: impl Into<Value>) -> Self {
        FieldOp::ArrayRemove {
            field: field.to_string(),
            values: vec![value.into()],
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldOp::Increment { field, .. }
            | FieldOp::ArrayUnion { field, .. }
            | FieldOp::ArrayRemove { field, .. } => field,
        }
    }
}

/// Guard evaluated by the store in the same transaction as the update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Precondition {
    ArrayExcludes { field: String, value: Value },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<Precondition>,
    pub ops: Vec<FieldOp>,
}

impl DocumentUpdate {
    pub fn new(ops: Vec<FieldOp>) -> Self {
        Self {
            precondition: None,
            ops,
        }
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    Applied,
    PreconditionFailed,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentKeysResponse {
    pub keys: Vec<String>,
}

/// Body returned by the public address lookup service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpLookupResponse {
    pub ip: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_shape_and_collapses_duplicates() {
        let document = serde_json::json!({
            "readCount": 3,
            "likedBy": ["a", "a"],
            "unlikedBy": [],
            "visitedBy": ["a", "b", "c"],
        });
        let record = EngagementRecord::from_document(&document).expect("decode");
        assert_eq!(record.read_count, 3);
        assert_eq!(record.liked_by, vec![VisitorId::new("a")]);
        assert_eq!(record.vote_of(&VisitorId::new("a")), VoteStatus::Liked);
        assert_eq!(record.vote_of(&VisitorId::new("b")), VoteStatus::None);
    }

    #[test]
    fn rejects_missing_or_mistyped_fields() {
        let missing = serde_json::json!({ "readCount": 1, "likedBy": [], "unlikedBy": [] });
        assert!(EngagementRecord::from_document(&missing).is_err());

        let negative = serde_json::json!({
            "readCount": -1, "likedBy": [], "unlikedBy": [], "visitedBy": []
        });
        assert!(EngagementRecord::from_document(&negative).is_err());

        let non_string = serde_json::json!({
            "readCount": 1, "likedBy": [7], "unlikedBy": [], "visitedBy": []
        });
        assert!(EngagementRecord::from_document(&non_string).is_err());
    }

    #[test]
    fn first_view_document_matches_wire_shape() {
        let record = EngagementRecord::first_view(&VisitorId::new("a"));
        assert_eq!(
            record.to_document(),
            serde_json::json!({
                "readCount": 1, "likedBy": [], "unlikedBy": [], "visitedBy": ["a"]
            })
        );
    }

    #[test]
    fn update_wire_form_is_tagged() {
        let update = DocumentUpdate::new(vec![FieldOp::increment(READ_COUNT_FIELD, 1)]).when(
            Precondition::ArrayExcludes {
                field: VISITED_BY_FIELD.to_string(),
                value: Value::from("a"),
            },
        );
        let encoded = serde_json::to_value(&update).expect("encode");
        assert_eq!(encoded["ops"][0]["type"], "increment");
        assert_eq!(encoded["precondition"]["type"], "array_excludes");
    }
}
