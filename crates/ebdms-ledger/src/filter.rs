use chrono::{DateTime, Utc};
use ebdms_types::ActorId;

use crate::entry::{AuditAction, AuditEntry, SubjectType};

/// Read-only selection over the ledger. All set fields must match; the
/// time range is inclusive on both ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub actor_id: Option<ActorId>,
    pub subject_type: Option<SubjectType>,
    pub subject_id: Option<String>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Return at most this many entries, oldest first.
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn subject(mut self, subject_type: SubjectType, subject_id: impl ToString) -> Self {
        self.subject_type = Some(subject_type);
        self.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor_id.as_ref().map_or(true, |a| *a == entry.actor_id)
            && self.subject_type.map_or(true, |t| t == entry.subject_type)
            && self
                .subject_id
                .as_deref()
                .map_or(true, |id| id == entry.subject_id)
            && self.action.map_or(true, |a| a == entry.action)
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
    }

    /// Apply the filter to entries in sequence order.
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        entries
            .into_iter()
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
