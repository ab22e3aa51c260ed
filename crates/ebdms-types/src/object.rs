use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::ProjectId;

/// Stable identifier of a [`FileObject`](crate::FileObject).
///
/// Records and index links refer to files by `FileId` only, never by
/// storage path. UUID v7 keeps identifiers roughly time-ordered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(uuid::Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.short_id())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidId(e.to_string()))
    }
}

/// Path of a payload inside the object store.
///
/// Keys are derived from the file's UUID and partitioned by project and
/// upload date: `<prefix>/<project>/<yyyy>/<mm>/<dd>/<uuid>`. A key is
/// allocated once, at `begin_upload`, and never reused.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn allocate(prefix: &str, project: &ProjectId, file: &FileId, at: DateTime<Utc>) -> Self {
        let prefix = prefix.trim_matches('/');
        let base = format!(
            "{}/{:04}/{:02}/{:02}/{}",
            project,
            at.year(),
            at.month(),
            at.day(),
            file
        );
        if prefix.is_empty() {
            Self(base)
        } else {
            Self(format!("{prefix}/{base}"))
        }
    }

    /// Wrap an existing key (e.g. one read back from a job payload).
    pub fn from_raw(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.trim().is_empty() || key.starts_with('/') {
            return Err(TypeError::InvalidId(format!("invalid object key '{key}'")));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash algorithm used for payload checksums.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload digest tagged with the algorithm that produced it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    digest: [u8; 32],
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: [u8; 32]) -> Self {
        Self { algorithm, digest }
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Parse `<algorithm>:<hex>` or a bare hex digest (assumed SHA-256).
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (algorithm, hex_part) = match s.split_once(':') {
            Some(("sha256", rest)) => (ChecksumAlgorithm::Sha256, rest),
            Some(("blake3", rest)) => (ChecksumAlgorithm::Blake3, rest),
            Some((other, _)) => {
                return Err(TypeError::UnknownVariant {
                    kind: "checksum algorithm",
                    value: other.to_string(),
                })
            }
            None => (ChecksumAlgorithm::Sha256, s),
        };
        let bytes = hex::decode(hex_part).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Ok(Self { algorithm, digest })
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({}:{})", self.algorithm, &self.to_hex()[..8])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_ids_are_unique_and_parse_back() {
        let a = FileId::new();
        let b = FileId::new();
        assert_ne!(a, b);
        let parsed: FileId = a.to_string().parse().unwrap();
        assert_eq!(a, parsed);
    }

    #[test]
    fn object_key_is_date_partitioned() {
        let project = ProjectId::new("PRJ01").unwrap();
        let file = FileId::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let key = ObjectKey::allocate("omics/", &project, &file, at);
        assert_eq!(key.as_str(), format!("omics/PRJ01/2026/03/07/{file}"));

        let bare = ObjectKey::allocate("", &project, &file, at);
        assert!(bare.as_str().starts_with("PRJ01/2026/03/07/"));
    }

    #[test]
    fn raw_keys_must_be_relative() {
        assert!(ObjectKey::from_raw("/abs/path").is_err());
        assert!(ObjectKey::from_raw(" ").is_err());
        assert!(ObjectKey::from_raw("omics/a/b").is_ok());
    }

    #[test]
    fn checksum_display_and_parse() {
        let sum = Checksum::new(ChecksumAlgorithm::Blake3, [0xab; 32]);
        let text = sum.to_string();
        assert!(text.starts_with("blake3:"));
        assert_eq!(Checksum::parse(&text).unwrap(), sum);
    }

    #[test]
    fn bare_hex_defaults_to_sha256() {
        let hex = "00".repeat(32);
        let sum = Checksum::parse(&hex).unwrap();
        assert_eq!(sum.algorithm, ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn checksum_parse_rejects_bad_input() {
        assert!(matches!(
            Checksum::parse("md5:abcd"),
            Err(TypeError::UnknownVariant { .. })
        ));
        assert!(matches!(
            Checksum::parse("sha256:abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        ));
        assert!(matches!(Checksum::parse("zz"), Err(TypeError::InvalidHex(_))));
    }
}
