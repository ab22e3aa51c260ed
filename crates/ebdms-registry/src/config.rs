use std::path::Path;
use std::time::Duration;

use ebdms_gate::GateConfig;
use ebdms_types::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Top-level engine configuration, loadable from TOML.
///
/// Every section has defaults, so an empty document is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub checksum_algorithm: ChecksumAlgorithm,
    /// How many times `commit` rereads and retries after a conflict.
    pub conflict_retries: u32,
    pub quota: QuotaConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub storage: StorageConfig,
    pub gate: GateConfig,
    pub jobs: JobConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checksum_algorithm: ChecksumAlgorithm::default(),
            conflict_retries: 3,
            quota: QuotaConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            storage: StorageConfig::default(),
            gate: GateConfig::default(),
            jobs: JobConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Ceiling applied to projects without their own override. `None`
    /// means unlimited.
    pub default_project_bytes: Option<u64>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_project_bytes: Some(1 << 40),
        }
    }
}

/// Bounded exponential backoff for transient adapter failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry without delay; handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Per-call deadlines for adapter operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub storage_ms: u64,
    pub catalog_ms: u64,
    /// Deadline for streaming an entire payload.
    pub payload_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            storage_ms: 30_000,
            catalog_ms: 5_000,
            payload_ms: 3_600_000,
        }
    }
}

impl TimeoutConfig {
    pub fn storage(&self) -> Duration {
        Duration::from_millis(self.storage_ms)
    }

    pub fn catalog(&self) -> Duration {
        Duration::from_millis(self.catalog_ms)
    }

    pub fn payload(&self) -> Duration {
        Duration::from_millis(self.payload_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    /// First path segment of every allocated object key.
    pub key_prefix: String,
    pub part_size_bytes: usize,
    pub upload_concurrency: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "ebdms-files".into(),
            endpoint: None,
            key_prefix: "files".into(),
            part_size_bytes: ebdms_store::DEFAULT_PART_SIZE,
            upload_concurrency: 4,
        }
    }
}

/// Background job delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Deliveries per job before it is dropped with an error log.
    pub max_deliveries: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { max_deliveries: 5 }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> RegistryResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| RegistryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> RegistryResult<String> {
        toml::to_string_pretty(self).map_err(|e| RegistryError::Config(e.to_string()))
    }

    pub fn validate(&self) -> RegistryResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(RegistryError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(RegistryError::Config(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        if self.timeouts.storage_ms == 0 || self.timeouts.catalog_ms == 0 || self.timeouts.payload_ms == 0 {
            return Err(RegistryError::Config("timeouts must be non-zero".into()));
        }
        if self.storage.part_size_bytes == 0 {
            return Err(RegistryError::Config("storage.part_size_bytes must be non-zero".into()));
        }
        if self.storage.upload_concurrency == 0 {
            return Err(RegistryError::Config(
                "storage.upload_concurrency must be non-zero".into(),
            ));
        }
        if self.storage.key_prefix.is_empty() || self.storage.key_prefix.contains('/') {
            return Err(RegistryError::Config(
                "storage.key_prefix must be a single non-empty path segment".into(),
            ));
        }
        if self.jobs.max_deliveries == 0 {
            return Err(RegistryError::Config("jobs.max_deliveries must be at least 1".into()));
        }
        self.gate.validate()?;
        Ok(())
    }
}
