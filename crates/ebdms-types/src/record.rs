use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ProjectId;
use crate::object::FileId;

/// Identifier of a [`MetadataRecord`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog entity kinds that may carry file references.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Project,
    Participant,
    Sample,
    Specimen,
    Custom(String),
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => f.write_str("project"),
            Self::Participant => f.write_str("participant"),
            Self::Sample => f.write_str("sample"),
            Self::Specimen => f.write_str("specimen"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A relational-catalog entity that references committed files by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub record_id: RecordId,
    pub project_id: ProjectId,
    pub kind: RecordKind,
    pub label: String,
    pub file_refs: BTreeSet<FileId>,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MetadataRecord {
    pub fn new(project_id: ProjectId, kind: RecordKind, label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            record_id: RecordId::new(),
            project_id,
            kind,
            label: label.into(),
            file_refs: BTreeSet::new(),
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn references(&self, file: &FileId) -> bool {
        self.file_refs.contains(file)
    }
}

/// A research project. Uploads are accepted only while it is active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub end_date: Option<DateTime<Utc>>,
    /// Overrides the configured default storage ceiling, in bytes.
    pub quota_bytes: Option<u64>,
}

impl Project {
    pub fn new(project_id: ProjectId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_id,
            code: code.into(),
            name: name.into(),
            active: true,
            end_date: None,
            quota_bytes: None,
        }
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.active && self.end_date.map_or(true, |end| end > at)
    }
}
