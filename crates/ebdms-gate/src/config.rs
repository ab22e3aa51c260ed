use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::policy::{MfaPolicy, PolicyTable};

/// Configuration for the access gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub mfa: MfaPolicy,
    /// Role table. Absent keys deny.
    pub policy: PolicyTable,
    /// Whether superusers skip membership and privilege checks. MFA still
    /// applies to them.
    pub superuser_bypass: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mfa: MfaPolicy::default(),
            policy: PolicyTable::standard(),
            superuser_bypass: true,
        }
    }
}

impl GateConfig {
    /// Reject configurations that would deny everything to everyone.
    pub fn validate(&self) -> Result<(), GateError> {
        if self.policy.is_empty() && !self.superuser_bypass {
            return Err(GateError::Config(
                "policy table is empty and superuser bypass is disabled".into(),
            ));
        }
        Ok(())
    }
}
