use std::collections::BTreeMap;
use std::fmt;

use ebdms_types::Role;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Privilege, Operation, ResourceType
// ---------------------------------------------------------------------------

/// Privilege levels, totally ordered: `Read < Write < Delete < Admin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Read,
    Write,
    Delete,
    /// Deployment-wide administration, above any per-project role.
    Admin,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Admin => "admin",
        })
    }
}

/// Something an actor asks to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ReadFile,
    RegisterFile,
    CommitFile,
    AttachIndex,
    TombstoneFile,
    ReadRecord,
    UpdateRecord,
    ReadAudit,
    RegisterProject,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Self::ReadFile,
        Self::RegisterFile,
        Self::CommitFile,
        Self::AttachIndex,
        Self::TombstoneFile,
        Self::ReadRecord,
        Self::UpdateRecord,
        Self::ReadAudit,
        Self::RegisterProject,
    ];

    pub fn required_privilege(&self) -> Privilege {
        match self {
            Self::ReadFile | Self::ReadRecord | Self::ReadAudit => Privilege::Read,
            Self::RegisterFile | Self::CommitFile | Self::AttachIndex | Self::UpdateRecord => {
                Privilege::Write
            }
            Self::TombstoneFile => Privilege::Delete,
            Self::RegisterProject => Privilege::Admin,
        }
    }

    /// The resource type this operation naturally acts on.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::ReadFile | Self::RegisterFile | Self::CommitFile | Self::TombstoneFile => {
                ResourceType::FileObject
            }
            Self::AttachIndex => ResourceType::IndexLink,
            Self::ReadRecord | Self::UpdateRecord => ResourceType::MetadataRecord,
            Self::ReadAudit => ResourceType::AuditLog,
            Self::RegisterProject => ResourceType::Project,
        }
    }

    pub fn is_mutating(&self) -> bool {
        self.required_privilege() > Privilege::Read
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::RegisterFile => "register_file",
            Self::CommitFile => "commit_file",
            Self::AttachIndex => "attach_index",
            Self::TombstoneFile => "tombstone_file",
            Self::ReadRecord => "read_record",
            Self::UpdateRecord => "update_record",
            Self::ReadAudit => "read_audit",
            Self::RegisterProject => "register_project",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    FileObject,
    MetadataRecord,
    IndexLink,
    AuditLog,
    Project,
}

impl ResourceType {
    /// Everything held in the catalog; only the audit log is not.
    pub fn is_catalog_data(&self) -> bool {
        !matches!(self, Self::AuditLog)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FileObject => "file_object",
            Self::MetadataRecord => "metadata_record",
            Self::IndexLink => "index_link",
            Self::AuditLog => "audit_log",
            Self::Project => "project",
        })
    }
}

// ---------------------------------------------------------------------------
// PolicyTable
// ---------------------------------------------------------------------------

/// One row of the policy table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: Role,
    pub operation: Operation,
    pub resource_type: ResourceType,
    /// Privilege the role holds for this (operation, resource). The request
    /// passes when this is at least the operation's required privilege.
    pub privilege: Privilege,
}

/// Explicit role/permission table keyed by `(role, operation, resource_type)`.
///
/// Absent keys deny. Serialized as a flat list of [`PolicyRule`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PolicyRule>", into = "Vec<PolicyRule>")]
pub struct PolicyTable {
    rules: BTreeMap<(Role, Operation, ResourceType), Privilege>,
}

impl PolicyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard EBDMS table.
    ///
    /// | role        | ceiling | audit log |
    /// |-------------|---------|-----------|
    /// | viewer      | read    | no        |
    /// | contributor | write   | no        |
    /// | curator     | delete  | no        |
    /// | auditor     | read    | yes       |
    /// | admin       | delete  | yes       |
    ///
    /// No role holds `admin` privilege, so project registration is left to
    /// the superuser bypass unless a deployment grants it explicitly.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for role in Role::ALL {
            let (ceiling, reads_audit) = match role {
                Role::Viewer => (Privilege::Read, false),
                Role::Contributor => (Privilege::Write, false),
                Role::Curator => (Privilege::Delete, false),
                Role::Auditor => (Privilege::Read, true),
                Role::Admin => (Privilege::Delete, true),
            };
            for op in Operation::ALL {
                if op == Operation::ReadAudit && !reads_audit {
                    continue;
                }
                if op.required_privilege() <= ceiling {
                    table.grant(role, op, op.resource_type(), ceiling);
                }
            }
        }
        table
    }

    pub fn grant(
        &mut self,
        role: Role,
        operation: Operation,
        resource_type: ResourceType,
        privilege: Privilege,
    ) -> &mut Self {
        self.rules.insert((role, operation, resource_type), privilege);
        self
    }

    pub fn revoke(&mut self, role: Role, operation: Operation, resource_type: ResourceType) -> &mut Self {
        self.rules.remove(&(role, operation, resource_type));
        self
    }

    /// Privilege held, if the table has a row for the key.
    pub fn lookup(&self, role: Role, operation: Operation, resource_type: ResourceType) -> Option<Privilege> {
        self.rules.get(&(role, operation, resource_type)).copied()
    }

    /// Pure decision: does `role` hold enough privilege for `operation` on
    /// `resource_type`?
    pub fn permits(&self, role: Role, operation: Operation, resource_type: ResourceType) -> bool {
        self.lookup(role, operation, resource_type)
            .is_some_and(|held| held >= operation.required_privilege())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = PolicyRule> + '_ {
        self.rules.iter().map(|(&(role, operation, resource_type), &privilege)| PolicyRule {
            role,
            operation,
            resource_type,
            privilege,
        })
    }
}

impl From<Vec<PolicyRule>> for PolicyTable {
    fn from(rules: Vec<PolicyRule>) -> Self {
        let mut table = Self::empty();
        for r in rules {
            table.grant(r.role, r.operation, r.resource_type, r.privilege);
        }
        table
    }
}

impl From<PolicyTable> for Vec<PolicyRule> {
    fn from(table: PolicyTable) -> Self {
        table.rules().collect()
    }
}

// ---------------------------------------------------------------------------
// MFA
// ---------------------------------------------------------------------------

/// Which operations demand an MFA-verified session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaScope {
    /// Every operation, including audit reads.
    AllOperations,
    /// Anything touching file objects, records, or index links.
    #[default]
    FileAndRecordOperations,
    /// Only operations above read privilege.
    MutatingOnly,
}

/// Deployment-level MFA switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfaPolicy {
    pub enabled: bool,
    pub scope: MfaScope,
}

impl Default for MfaPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: MfaScope::default(),
        }
    }
}

impl MfaPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn requires_mfa(&self, operation: Operation, resource_type: ResourceType) -> bool {
        if !self.enabled {
            return false;
        }
        match self.scope {
            MfaScope::AllOperations => true,
            MfaScope::FileAndRecordOperations => resource_type.is_catalog_data(),
            MfaScope::MutatingOnly => operation.is_mutating(),
        }
    }
}
