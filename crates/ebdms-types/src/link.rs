use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::file::IndexFormat;
use crate::identity::ActorId;
use crate::object::FileId;

/// Identifier of an [`IndexLink`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(uuid::Uuid);

impl LinkId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkState {
    Active,
    Tombstoned,
}

/// Binds one committed INDEX file to exactly one committed primary file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexLink {
    pub link_id: LinkId,
    pub primary_id: FileId,
    pub index_id: FileId,
    pub format: IndexFormat,
    pub state: LinkState,
    pub created_at: DateTime<Utc>,
    pub created_by: ActorId,
    pub tombstoned_at: Option<DateTime<Utc>>,
}

impl IndexLink {
    pub fn new(primary_id: FileId, index_id: FileId, format: IndexFormat, created_by: ActorId) -> Self {
        Self {
            link_id: LinkId::new(),
            primary_id,
            index_id,
            format,
            state: LinkState::Active,
            created_at: Utc::now(),
            created_by,
            tombstoned_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == LinkState::Active
    }

    /// Whether this link touches `file` on either end.
    pub fn involves(&self, file: &FileId) -> bool {
        self.primary_id == *file || self.index_id == *file
    }
}
