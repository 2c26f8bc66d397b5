//! Repository deltas: commits and their operations.

use serde::{Deserialize, Serialize};

use crate::model::identity::Did;

/// What happened to the record at a path within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    /// A new record was written at this path.
    Create,
    /// The record at this path was replaced.
    Update,
    /// The record at this path was removed.
    Delete,
}

impl std::fmt::Display for OpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpAction::Create => "create",
            OpAction::Update => "update",
            OpAction::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One operation within a commit's operation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// What kind of change this operation represents.
    pub action: OpAction,
    /// Repository-relative path, e.g. `app.bsky.feed.post/<rkey>`.
    pub path: String,
    /// The content hash the record at `path` is declared to hash to.
    /// Absent for `delete`.
    pub cid: Option<String>,
}

impl Operation {
    /// The lexicon type id, derived from the collection segment of the
    /// path (the part before the first `/`).
    #[must_use]
    pub fn lexicon_type(&self) -> &str {
        self.path.split('/').next().unwrap_or(&self.path)
    }
}

/// A signed repository delta: a batch of operations against one
/// repository, carried as a CAR blob containing the new subtree.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Monotonic sequence number for this subscription endpoint.
    pub seq: i64,
    /// Wall-clock time the commit was produced, as claimed by the source.
    pub time: chrono::DateTime<chrono::Utc>,
    /// The repository (actor) this commit belongs to.
    pub repo: Did,
    /// The CAR-encoded blob carrying the new subtree for this commit's
    /// operations.
    pub car: Vec<u8>,
    /// Operations in this commit, in the order they must be processed.
    pub ops: Vec<Operation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicon_type_is_the_collection_segment() {
        let op = Operation {
            action: OpAction::Create,
            path: "app.bsky.feed.post/3abcxyz".to_owned(),
            cid: Some("bafy...".to_owned()),
        };
        assert_eq!(op.lexicon_type(), "app.bsky.feed.post");
    }

    #[test]
    fn action_display_matches_wire_form() {
        assert_eq!(OpAction::Create.to_string(), "create");
        assert_eq!(OpAction::Update.to_string(), "update");
        assert_eq!(OpAction::Delete.to_string(), "delete");
    }
}
