use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use ebdms_crypto::HashChainVerifier;

use crate::entry::{AuditEntry, AuditEvent};
use crate::error::LedgerError;
use crate::filter::AuditFilter;
use crate::memory::ChainState;
use crate::traits::{AuditReader, AuditWriter};

/// Durable audit ledger backed by a JSON-lines file.
///
/// Each entry is one line, appended and synced before `append` returns.
/// Opening an existing file replays and verifies the whole chain; a broken
/// chain refuses to open rather than extending a tampered history.
pub struct FileAuditLedger {
    path: PathBuf,
    inner: Mutex<FileState>,
}

struct FileState {
    chain: ChainState,
    file: File,
}

impl FileAuditLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            Self::load(&path)?
        } else {
            Vec::new()
        };
        HashChainVerifier::verify_from_genesis(&entries)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = %path.display(), entries = entries.len(), "audit ledger opened");
        Ok(Self {
            path,
            inner: Mutex::new(FileState {
                chain: ChainState { entries },
                file,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Vec<AuditEntry>, LedgerError> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| {
                LedgerError::Serialization(format!("line {}: {e}", line_no + 1))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn state(&self) -> Result<MutexGuard<'_, FileState>, LedgerError> {
        self.inner.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl AuditWriter for FileAuditLedger {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, LedgerError> {
        let mut state = self.state()?;
        let entry = state.chain.next_entry(event);

        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        line.push(b'\n');
        state.file.write_all(&line)?;
        state.file.sync_data()?;

        state.chain.entries.push(entry.clone());
        Ok(entry)
    }
}

impl AuditReader for FileAuditLedger {
    fn head(&self) -> Result<Option<AuditEntry>, LedgerError> {
        Ok(self.state()?.chain.entries.last().cloned())
    }

    fn entry_count(&self) -> Result<u64, LedgerError> {
        Ok(self.state()?.chain.entries.len() as u64)
    }

    fn read_range(&self, from_seq: u64, to_seq: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        self.state()?.chain.range(from_seq, to_seq)
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(self.state()?.chain.entries.clone())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(filter.apply(&self.state()?.chain.entries))
    }
}
