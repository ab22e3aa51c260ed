use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use ebdms_crypto::{CanonicalEncoder, ChainLink, HashChainVerifier};
use ebdms_types::{ActorId, TypeError};
use serde::{Deserialize, Serialize};

/// What happened. Every state transition, access decision, and failure of
/// the registration core maps to exactly one action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UploadBegun,
    UploadStored,
    UploadFailed,
    FileCommitted,
    CommitFailed,
    FileTombstoned,
    TombstoneFailed,
    IndexAttached,
    IndexReplaced,
    IndexRejected,
    AccessGranted,
    AccessDenied,
    FileFetched,
    FetchFailed,
    QuotaExceeded,
    ObjectPurged,
    ProjectRegistered,
    RecordCreated,
    RecordRejected,
    ReferenceAdded,
    ReferenceRejected,
}

impl AuditAction {
    pub const ALL: [AuditAction; 21] = [
        Self::UploadBegun,
        Self::UploadStored,
        Self::UploadFailed,
        Self::FileCommitted,
        Self::CommitFailed,
        Self::FileTombstoned,
        Self::TombstoneFailed,
        Self::IndexAttached,
        Self::IndexReplaced,
        Self::IndexRejected,
        Self::AccessGranted,
        Self::AccessDenied,
        Self::FileFetched,
        Self::FetchFailed,
        Self::QuotaExceeded,
        Self::ObjectPurged,
        Self::ProjectRegistered,
        Self::RecordCreated,
        Self::RecordRejected,
        Self::ReferenceAdded,
        Self::ReferenceRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadBegun => "UPLOAD_BEGUN",
            Self::UploadStored => "UPLOAD_STORED",
            Self::UploadFailed => "UPLOAD_FAILED",
            Self::FileCommitted => "FILE_COMMITTED",
            Self::CommitFailed => "COMMIT_FAILED",
            Self::FileTombstoned => "FILE_TOMBSTONED",
            Self::TombstoneFailed => "TOMBSTONE_FAILED",
            Self::IndexAttached => "INDEX_ATTACHED",
            Self::IndexReplaced => "INDEX_REPLACED",
            Self::IndexRejected => "INDEX_REJECTED",
            Self::AccessGranted => "ACCESS_GRANTED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::FileFetched => "FILE_FETCHED",
            Self::FetchFailed => "FETCH_FAILED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::ObjectPurged => "OBJECT_PURGED",
            Self::ProjectRegistered => "PROJECT_REGISTERED",
            Self::RecordCreated => "RECORD_CREATED",
            Self::RecordRejected => "RECORD_REJECTED",
            Self::ReferenceAdded => "REFERENCE_ADDED",
            Self::ReferenceRejected => "REFERENCE_REJECTED",
        }
    }

    /// Failure and denial actions.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed
                | Self::CommitFailed
                | Self::TombstoneFailed
                | Self::IndexRejected
                | Self::AccessDenied
                | Self::FetchFailed
                | Self::QuotaExceeded
                | Self::RecordRejected
                | Self::ReferenceRejected
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownVariant {
                kind: "audit action",
                value: s.to_string(),
            })
    }
}

/// Kind of entity an entry is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    FileObject,
    MetadataRecord,
    IndexLink,
    Project,
    AuditLog,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileObject => "file_object",
            Self::MetadataRecord => "metadata_record",
            Self::IndexLink => "index_link",
            Self::Project => "project",
            Self::AuditLog => "audit_log",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry to be appended. Sequence, timestamp, and hashes are assigned
/// by the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEvent {
    pub actor_id: ActorId,
    pub action: AuditAction,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(
        actor_id: ActorId,
        action: AuditAction,
        subject_type: SubjectType,
        subject_id: impl ToString,
    ) -> Self {
        Self {
            actor_id,
            action,
            subject_type,
            subject_id: subject_id.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One immutable, hash-chained ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub actor_id: ActorId,
    pub action: AuditAction,
    pub subject_type: SubjectType,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(with = "hex32")]
    pub prev_hash: [u8; 32],
    #[serde(with = "hex32")]
    pub entry_hash: [u8; 32],
}

impl AuditEntry {
    /// Seal `event` as entry `sequence_number` on top of `prev_hash`.
    ///
    /// The timestamp is truncated to microseconds so it survives storage
    /// round trips unchanged.
    pub fn seal(
        event: AuditEvent,
        sequence_number: u64,
        timestamp: DateTime<Utc>,
        prev_hash: [u8; 32],
    ) -> Self {
        let mut entry = Self {
            sequence_number,
            timestamp: timestamp.trunc_subsecs(6),
            actor_id: event.actor_id,
            action: event.action,
            subject_type: event.subject_type,
            subject_id: event.subject_id,
            detail: event.detail,
            prev_hash,
            entry_hash: [0; 32],
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    /// `H(seq ‖ timestamp ‖ actor ‖ action ‖ subject_type ‖ subject_id ‖ detail ‖ prev_hash)`.
    pub fn compute_hash(&self) -> [u8; 32] {
        HashChainVerifier::compute_hash(&self.payload_bytes(), &self.prev_hash)
    }

    pub fn entry_hash_hex(&self) -> String {
        hex::encode(self.entry_hash)
    }
}

impl ChainLink for AuditEntry {
    fn sequence(&self) -> u64 {
        self.sequence_number
    }

    fn entry_hash(&self) -> [u8; 32] {
        self.entry_hash
    }

    fn prev_hash(&self) -> [u8; 32] {
        self.prev_hash
    }

    fn payload_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.sequence_number)
            .i64(self.timestamp.timestamp_micros())
            .str(self.actor_id.as_str())
            .str(self.action.as_str())
            .str(self.subject_type.as_str())
            .str(&self.subject_id)
            .opt_str(self.detail.as_deref())
            .finish()
    }
}

mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(&s).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"32 bytes"))
    }
}
