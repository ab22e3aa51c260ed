use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, rejecting blank values.
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(TypeError::InvalidId(concat!($label, " must not be empty").into()));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Identity of an authenticated actor, as supplied by the authentication layer.
    ActorId,
    "actor id"
);

string_id!(
    /// Identifier of a research project in the catalog.
    ProjectId,
    "project id"
);

/// Role an actor holds on a project.
///
/// Roles are ordered by the breadth of what they may do, but the gate never
/// relies on that ordering: every decision goes through the policy table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access to files and records.
    Viewer,
    /// May upload and register files.
    Contributor,
    /// May tombstone files and replace indexes.
    Curator,
    /// May read the audit history but not touch files.
    Auditor,
    /// Full control over the project.
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Viewer,
        Role::Contributor,
        Role::Curator,
        Role::Auditor,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Contributor => "contributor",
            Self::Curator => "curator",
            Self::Auditor => "auditor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypeError::UnknownVariant {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// Identity and session facts handed over by the authentication layer.
///
/// The core never authenticates anyone; it trusts this context and records
/// `actor_id` on every audit entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: ActorId,
    /// Whether the session completed a second-factor check.
    pub mfa_verified: bool,
    /// Superusers hold every role on every project. MFA still applies.
    pub superuser: bool,
    /// Role held on each project the actor is a member of.
    pub project_roles: BTreeMap<ProjectId, Role>,
}

impl ActorContext {
    pub fn new(actor_id: ActorId, mfa_verified: bool) -> Self {
        Self {
            actor_id,
            mfa_verified,
            superuser: false,
            project_roles: BTreeMap::new(),
        }
    }

    /// Builder-style helper granting `role` on `project`.
    pub fn with_role(mut self, project: ProjectId, role: Role) -> Self {
        self.project_roles.insert(project, role);
        self
    }

    pub fn as_superuser(mut self) -> Self {
        self.superuser = true;
        self
    }

    pub fn role_on(&self, project: &ProjectId) -> Option<Role> {
        self.project_roles.get(project).copied()
    }
}
