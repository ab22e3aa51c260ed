use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::{ActorId, ProjectId};
use crate::object::{Checksum, FileId, ObjectKey};

/// Type tag of a payload. Contents are never interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileKind {
    Vcf,
    Bcf,
    Bed,
    Parquet,
    Index,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vcf => "VCF",
            Self::Bcf => "BCF",
            Self::Bed => "BED",
            Self::Parquet => "PARQUET",
            Self::Index => "INDEX",
        }
    }

    /// Primary kinds are the ones an index may point at.
    pub fn is_primary(&self) -> bool {
        !matches!(self, Self::Index)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VCF" => Ok(Self::Vcf),
            "BCF" => Ok(Self::Bcf),
            "BED" => Ok(Self::Bed),
            "PARQUET" => Ok(Self::Parquet),
            "INDEX" => Ok(Self::Index),
            _ => Err(TypeError::UnknownVariant {
                kind: "file kind",
                value: s.to_string(),
            }),
        }
    }
}

/// On-disk format of an index file. Only one active index per format may
/// be attached to a primary file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexFormat {
    Tbi,
    Csi,
    Other(String),
}

impl fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tbi => f.write_str("tbi"),
            Self::Csi => f.write_str("csi"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Declared shape of an INDEX payload: its format and the primary kind it
/// was built for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub format: IndexFormat,
    pub target: FileKind,
}

impl IndexSpec {
    pub fn new(format: IndexFormat, target: FileKind) -> Result<Self, TypeError> {
        if !target.is_primary() {
            return Err(TypeError::InvalidId(
                "an index cannot target another index".into(),
            ));
        }
        Ok(Self { format, target })
    }

    pub fn is_compatible_with(&self, primary: FileKind) -> bool {
        self.target == primary
    }
}

/// Registration state of a [`FileObject`].
///
/// ```text
/// PENDING ──► STORED ──► COMMITTED ──► TOMBSTONED
///    │           │
///    └──► FAILED ◄┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadState {
    Pending,
    Stored,
    Committed,
    Failed,
    Tombstoned,
}

impl UploadState {
    pub const ALL: [UploadState; 5] = [
        UploadState::Pending,
        UploadState::Stored,
        UploadState::Committed,
        UploadState::Failed,
        UploadState::Tombstoned,
    ];

    /// The only edges of the registration state machine.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Pending, Stored)
                | (Pending, Failed)
                | (Stored, Committed)
                | (Stored, Failed)
                | (Committed, Tombstoned)
        )
    }

    /// Check an edge, producing a typed error for illegal ones.
    pub fn transition(&self, next: UploadState) -> Result<UploadState, TypeError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TypeError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Tombstoned)
    }

    /// Only committed files are visible to metadata queries and readers.
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// States whose declared bytes count against the project quota.
    pub fn counts_toward_quota(&self) -> bool {
        matches!(self, Self::Pending | Self::Stored | Self::Committed)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Stored => "STORED",
            Self::Committed => "COMMITTED",
            Self::Failed => "FAILED",
            Self::Tombstoned => "TOMBSTONED",
        };
        f.write_str(s)
    }
}

/// One immutable binary payload tracked through the registration state
/// machine. The catalog row never holds payload bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub file_id: FileId,
    pub object_key: ObjectKey,
    pub project_id: ProjectId,
    pub file_kind: FileKind,
    pub index_spec: Option<IndexSpec>,
    /// Declared size while PENDING; measured size once STORED.
    pub size_bytes: u64,
    pub checksum: Option<Checksum>,
    pub upload_state: UploadState,
    pub created_at: DateTime<Utc>,
    pub created_by: ActorId,
    pub updated_at: DateTime<Utc>,
    /// Row version, bumped on every catalog write.
    pub version: u64,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub tombstone_reason: Option<String>,
}

impl FileObject {
    /// A fresh PENDING row.
    pub fn pending(
        file_id: FileId,
        object_key: ObjectKey,
        project_id: ProjectId,
        file_kind: FileKind,
        declared_size: u64,
        created_by: ActorId,
    ) -> Self {
        let now = Utc::now();
        Self {
            file_id,
            object_key,
            project_id,
            file_kind,
            index_spec: None,
            size_bytes: declared_size,
            checksum: None,
            upload_state: UploadState::Pending,
            created_at: now,
            created_by,
            updated_at: now,
            version: 1,
            metadata: BTreeMap::new(),
            tombstone_reason: None,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.upload_state == UploadState::Committed
    }

    pub fn is_index(&self) -> bool {
        self.file_kind == FileKind::Index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_state() -> impl Strategy<Value = UploadState> {
        prop::sample::select(UploadState::ALL.to_vec())
    }

    #[test]
    fn happy_path_is_legal() {
        let s = UploadState::Pending;
        let s = s.transition(UploadState::Stored).unwrap();
        let s = s.transition(UploadState::Committed).unwrap();
        let s = s.transition(UploadState::Tombstoned).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn failed_only_from_pending_or_stored() {
        assert!(UploadState::Pending.can_transition_to(UploadState::Failed));
        assert!(UploadState::Stored.can_transition_to(UploadState::Failed));
        assert!(!UploadState::Committed.can_transition_to(UploadState::Failed));
        assert!(!UploadState::Tombstoned.can_transition_to(UploadState::Failed));
    }

    #[test]
    fn commit_requires_stored() {
        let err = UploadState::Pending
            .transition(UploadState::Committed)
            .unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidTransition {
                from: "PENDING".into(),
                to: "COMMITTED".into()
            }
        );
    }

    proptest! {
        #[test]
        fn terminal_states_never_move(to in any_state()) {
            prop_assert!(!UploadState::Failed.can_transition_to(to));
            prop_assert!(!UploadState::Tombstoned.can_transition_to(to));
        }

        #[test]
        fn walks_only_visit_the_documented_order(steps in prop::collection::vec(any_state(), 0..16)) {
            // Apply every legal step of a random walk; states visited must
            // appear in non-decreasing order of the chain PENDING < STORED <
            // COMMITTED < TOMBSTONED, with FAILED as an absorbing side exit.
            fn rank(s: UploadState) -> u8 {
                match s {
                    UploadState::Pending => 0,
                    UploadState::Stored => 1,
                    UploadState::Committed => 2,
                    UploadState::Tombstoned => 3,
                    UploadState::Failed => 9,
                }
            }
            let mut current = UploadState::Pending;
            for next in steps {
                if let Ok(moved) = current.transition(next) {
                    prop_assert!(rank(moved) > rank(current));
                    if moved == UploadState::Failed {
                        prop_assert!(matches!(current, UploadState::Pending | UploadState::Stored));
                    }
                    current = moved;
                }
            }
        }
    }

    #[test]
    fn only_committed_is_visible() {
        for state in UploadState::ALL {
            assert_eq!(state.is_visible(), state == UploadState::Committed);
        }
    }

    #[test]
    fn index_spec_checks_target_kind() {
        let spec = IndexSpec::new(IndexFormat::Tbi, FileKind::Bed).unwrap();
        assert!(spec.is_compatible_with(FileKind::Bed));
        assert!(!spec.is_compatible_with(FileKind::Vcf));
        assert!(IndexSpec::new(IndexFormat::Csi, FileKind::Index).is_err());
    }

    #[test]
    fn file_kind_round_trips_through_text() {
        assert_eq!("vcf".parse::<FileKind>().unwrap(), FileKind::Vcf);
        assert_eq!(FileKind::Parquet.to_string(), "PARQUET");
        assert!("fastq".parse::<FileKind>().is_err());
        assert_eq!(serde_json::to_string(&FileKind::Bcf).unwrap(), "\"BCF\"");
    }
}
