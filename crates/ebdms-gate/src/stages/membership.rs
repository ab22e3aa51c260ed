use crate::error::GateError;
use crate::stage::{AccessRequest, GateContext, GateStage, StageDecision};

/// The actor must hold a role on the request's project.
pub struct MembershipStage;

impl GateStage for MembershipStage {
    fn name(&self) -> &str {
        "membership"
    }

    fn evaluate(
        &self,
        request: &AccessRequest<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        if context.bypasses(request) {
            return Ok(StageDecision::Pass);
        }
        match request.actor.role_on(request.project_id) {
            Some(_) => Ok(StageDecision::Pass),
            None => Ok(StageDecision::fail(format!(
                "{} is not a member of project {}",
                request.actor.actor_id, request.project_id
            ))),
        }
    }
}
