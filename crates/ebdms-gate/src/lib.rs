//! Access policy gate for EBDMS.
//!
//! Every read and write of file objects, metadata records, index links and
//! the audit log is authorized here first. The gate is a fail-fast pipeline:
//!
//! 1. **Membership**: the actor must hold a role on the project.
//! 2. **MFA**: the session must be MFA-verified for operations in scope.
//! 3. **Privilege**: the role must hold enough privilege in the policy table.
//!
//! Superusers skip membership and privilege (configurable) but never MFA.
//! Evaluation is pure; the caller writes the decision to the audit ledger.

pub mod config;
pub mod error;
pub mod gate;
pub mod policy;
pub mod stage;
pub mod stages;

pub use config::GateConfig;
pub use error::GateError;
pub use gate::AccessGate;
pub use policy::{MfaPolicy, MfaScope, Operation, PolicyRule, PolicyTable, Privilege, ResourceType};
pub use stage::{AccessGrant, AccessRequest, GateContext, GateStage, StageDecision, StageResult};
pub use stages::{MembershipStage, MfaStage, PrivilegeStage};
