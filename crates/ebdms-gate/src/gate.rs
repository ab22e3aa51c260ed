use std::time::Instant;

use crate::config::GateConfig;
use crate::error::GateError;
use crate::stage::{AccessGrant, AccessRequest, GateContext, GateStage, StageDecision, StageResult};
use crate::stages::{MembershipStage, MfaStage, PrivilegeStage};

/// The access gate: a fail-fast pipeline of stages every read and write of
/// catalog data passes through.
///
/// Evaluation is pure. Recording the decision in the audit ledger is the
/// caller's job.
pub struct AccessGate {
    stages: Vec<Box<dyn GateStage>>,
    config: GateConfig,
}

impl AccessGate {
    /// Gate with an empty pipeline. An empty pipeline allows everything.
    pub fn new(config: GateConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Membership -> MFA -> Privilege
    pub fn with_default_stages(config: GateConfig) -> Self {
        let mut gate = Self::new(config);
        gate.add_stage(Box::new(MembershipStage));
        gate.add_stage(Box::new(MfaStage));
        gate.add_stage(Box::new(PrivilegeStage));
        gate
    }

    pub fn add_stage(&mut self, stage: Box<dyn GateStage>) {
        self.stages.push(stage);
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run `request` through the pipeline. The first failing stage stops
    /// evaluation and its reason becomes the denial reason.
    pub fn evaluate(&self, request: &AccessRequest<'_>) -> Result<AccessGrant, GateError> {
        let started = Instant::now();
        let mut context = GateContext::new(&self.config);
        let mut denial = None;

        for stage in &self.stages {
            let stage_start = Instant::now();
            let decision = stage.evaluate(request, &context)?;
            let (passed, reason) = match decision {
                StageDecision::Pass => (true, None),
                StageDecision::Fail { reason } => (false, Some(reason)),
            };
            context.previous_stages.push(StageResult {
                stage_name: stage.name().to_string(),
                passed,
                reason: reason.clone(),
                elapsed: stage_start.elapsed(),
            });
            if !passed {
                denial = reason;
                break;
            }
        }

        let allowed = denial.is_none();
        if !allowed {
            tracing::debug!(
                actor = %request.actor.actor_id,
                operation = %request.operation,
                subject_id = request.subject_id,
                reason = denial.as_deref().unwrap_or_default(),
                "access denied"
            );
        }

        Ok(AccessGrant {
            actor_id: request.actor.actor_id.clone(),
            project_id: request.project_id.clone(),
            subject_id: request.subject_id.to_string(),
            operation: request.operation,
            resource_type: request.resource_type,
            allowed,
            reason: denial,
            stage_results: context.previous_stages,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use ebdms_types::{ActorContext, ActorId, ProjectId, Role};

    use super::*;
    use crate::policy::{MfaPolicy, Operation, PolicyTable, ResourceType};

    fn project() -> ProjectId {
        ProjectId::new("p1").unwrap()
    }

    fn actor(role: Option<Role>, mfa: bool) -> ActorContext {
        let ctx = ActorContext::new(ActorId::new("alice").unwrap(), mfa);
        match role {
            Some(role) => ctx.with_role(project(), role),
            None => ctx,
        }
    }

    fn gate() -> AccessGate {
        AccessGate::with_default_stages(GateConfig::default())
    }

    fn check(gate: &AccessGate, actor: &ActorContext, op: Operation) -> AccessGrant {
        let project = project();
        gate.evaluate(&AccessRequest::new(actor, &project, op, "f1"))
            .unwrap()
    }

    // ----- Pipeline -----

    #[test]
    fn default_pipeline_has_three_stages() {
        assert_eq!(gate().stage_count(), 3);
        assert_eq!(AccessGate::new(GateConfig::default()).stage_count(), 0);
    }

    #[test]
    fn member_with_mfa_and_privilege_is_allowed() {
        let grant = check(&gate(), &actor(Some(Role::Viewer), true), Operation::ReadFile);
        assert!(grant.is_allowed());
        assert!(grant.reason.is_none());
        assert_eq!(grant.stage_results.len(), 3);
        assert_eq!(grant.subject_id, "f1");
    }

    #[test]
    fn missing_mfa_denies_before_privilege() {
        let grant = check(&gate(), &actor(Some(Role::Admin), false), Operation::ReadFile);
        assert!(!grant.is_allowed());
        assert_eq!(grant.denied_by(), Some("mfa"));
        // Fail-fast: privilege never ran.
        assert_eq!(grant.stage_results.len(), 2);
    }

    #[test]
    fn non_member_is_denied() {
        let grant = check(&gate(), &actor(None, false), Operation::ReadFile);
        assert_eq!(grant.denied_by(), Some("membership"));
        assert_eq!(grant.stage_results.len(), 1);
        assert!(grant.reason.unwrap().contains("not a member"));
    }

    #[test]
    fn insufficient_role_is_denied() {
        let grant = check(&gate(), &actor(Some(Role::Viewer), true), Operation::RegisterFile);
        assert_eq!(grant.denied_by(), Some("privilege"));

        let grant = check(&gate(), &actor(Some(Role::Contributor), true), Operation::TombstoneFile);
        assert!(!grant.is_allowed());
    }

    #[test]
    fn audit_log_reads_need_auditor_or_admin() {
        let g = gate();
        assert!(!check(&g, &actor(Some(Role::Curator), true), Operation::ReadAudit).is_allowed());
        assert!(check(&g, &actor(Some(Role::Auditor), true), Operation::ReadAudit).is_allowed());
        // Default MFA scope covers catalog data only.
        assert!(check(&g, &actor(Some(Role::Auditor), false), Operation::ReadAudit).is_allowed());
    }

    // ----- Superuser -----

    #[test]
    fn superuser_bypasses_membership_but_not_mfa() {
        let su = actor(None, true).as_superuser();
        assert!(check(&gate(), &su, Operation::TombstoneFile).is_allowed());

        let su_no_mfa = actor(None, false).as_superuser();
        let grant = check(&gate(), &su_no_mfa, Operation::ReadFile);
        assert_eq!(grant.denied_by(), Some("mfa"));
    }

    #[test]
    fn superuser_bypass_can_be_disabled() {
        let config = GateConfig {
            superuser_bypass: false,
            ..GateConfig::default()
        };
        let su = actor(None, true).as_superuser();
        let grant = check(&AccessGate::with_default_stages(config), &su, Operation::ReadFile);
        assert_eq!(grant.denied_by(), Some("membership"));
    }

    // ----- Config -----

    #[test]
    fn disabled_mfa_lets_unverified_members_through() {
        let config = GateConfig {
            mfa: MfaPolicy::disabled(),
            ..GateConfig::default()
        };
        let g = AccessGate::with_default_stages(config);
        assert!(check(&g, &actor(Some(Role::Viewer), false), Operation::ReadFile).is_allowed());
    }

    #[test]
    fn custom_table_is_honored() {
        let mut policy = PolicyTable::empty();
        policy.grant(
            Role::Viewer,
            Operation::ReadFile,
            ResourceType::FileObject,
            crate::policy::Privilege::Read,
        );
        let g = AccessGate::with_default_stages(GateConfig {
            policy,
            ..GateConfig::default()
        });
        let viewer = actor(Some(Role::Viewer), true);
        assert!(check(&g, &viewer, Operation::ReadFile).is_allowed());
        assert!(!check(&g, &viewer, Operation::ReadRecord).is_allowed());
    }

    #[test]
    fn decisions_are_deterministic() {
        let g = gate();
        let a = actor(Some(Role::Contributor), true);
        let first = check(&g, &a, Operation::AttachIndex);
        let second = check(&g, &a, Operation::AttachIndex);
        assert_eq!(first.allowed, second.allowed);
        assert_eq!(first.reason, second.reason);
    }

    // ----- Stage errors -----

    #[test]
    fn privilege_without_membership_stage_is_a_stage_error() {
        let mut g = AccessGate::new(GateConfig::default());
        g.add_stage(Box::new(PrivilegeStage));
        let a = actor(None, true);
        let project = project();
        let err = g
            .evaluate(&AccessRequest::new(&a, &project, Operation::ReadFile, "f1"))
            .unwrap_err();
        assert!(matches!(err, GateError::StageError { ref stage, .. } if stage == "privilege"));
    }

    #[test]
    fn explicit_resource_type_overrides_default() {
        let g = gate();
        let admin = actor(Some(Role::Admin), true);
        let project = project();
        let req = AccessRequest::new(&admin, &project, Operation::ReadFile, "x").on(ResourceType::AuditLog);
        assert!(!g.evaluate(&req).unwrap().is_allowed());
    }
}
