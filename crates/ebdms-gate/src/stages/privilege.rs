use crate::error::GateError;
use crate::stage::{AccessRequest, GateContext, GateStage, StageDecision};

/// Looks the actor's project role up in the policy table.
pub struct PrivilegeStage;

impl GateStage for PrivilegeStage {
    fn name(&self) -> &str {
        "privilege"
    }

    fn evaluate(
        &self,
        request: &AccessRequest<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        if context.bypasses(request) {
            return Ok(StageDecision::Pass);
        }
        // Membership runs earlier; reaching here without a role is a
        // misassembled pipeline, not a denial.
        let role = request.actor.role_on(request.project_id).ok_or_else(|| {
            GateError::stage(
                self.name(),
                format!("no role for {} on {}", request.actor.actor_id, request.project_id),
            )
        })?;

        if context
            .config
            .policy
            .permits(role, request.operation, request.resource_type)
        {
            Ok(StageDecision::Pass)
        } else {
            Ok(StageDecision::fail(format!(
                "role {} lacks {} privilege for {} on {}",
                role,
                request.operation.required_privilege(),
                request.operation,
                request.resource_type
            )))
        }
    }
}
